use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex as RawMutex, channel::Channel, signal::Signal,
};
use heapless::{String, Vec};
use portable_atomic::AtomicU32;

use crate::config::*;
use crate::link::Diagnostics;
use crate::protocol::packets::{self, FirmwareRequest, PrintPausedReason, SbcRequest};
use crate::protocol::{CodecError, PacketHeader, RxBuffer, TxBuffer};

pub type Payload = Vec<u8, IPC_PAYLOAD_MAX>;
pub type FileName = String<64>;

/// Packet another task wants delivered to the SBC.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    ObjectModel(Payload),
    CodeBufferUpdate {
        buffer_space: u16,
    },
    CodeReply {
        message_type: u32,
        text: Payload,
    },
    MacroRequest {
        channel: u8,
        filename: FileName,
        from_code: bool,
    },
    AbortFile {
        channel: u8,
        abort_all: bool,
    },
    PrintPaused {
        file_position: u32,
        reason: PrintPausedReason,
    },
    /// Code the SBC should run on the firmware's behalf.
    DoCode {
        channel: u8,
        code: Payload,
    },
    /// Locked, MacroFileClosed, WaitForAcknowledgement, MessageAcknowledged.
    ChannelEvent {
        request: FirmwareRequest,
        channel: u8,
    },
    FileChunkRequest {
        filename: FileName,
        offset: u32,
        max_length: u32,
    },
    EvaluationError {
        expression: FileName,
        error: FileName,
    },
}

impl Outbound {
    /// Writes the packet into this cycle's transmit buffer.
    ///
    /// `Ok(true)`: fully written. `Ok(false)`: a code reply was cut short and
    /// `self` now holds the rest. `Err`: nothing was written.
    pub fn stage<const N: usize>(&mut self, tx: &mut TxBuffer<N>) -> Result<bool, CodecError> {
        match self {
            Self::ObjectModel(json) => packets::write_object_model(tx, json)?,
            Self::CodeBufferUpdate { buffer_space } => {
                packets::write_code_buffer_update(tx, *buffer_space)?
            }
            Self::CodeReply { message_type, text } => {
                let taken = packets::write_code_reply(tx, *message_type, text)?;
                if taken < text.len() {
                    let rest = text.len() - taken;
                    text.rotate_left(taken);
                    text.truncate(rest);
                    return Ok(false);
                }
            }
            Self::MacroRequest {
                channel,
                filename,
                from_code,
            } => packets::write_macro_request(tx, *channel, filename, *from_code)?,
            Self::AbortFile { channel, abort_all } => {
                packets::write_abort_file(tx, *channel, *abort_all)?
            }
            Self::PrintPaused {
                file_position,
                reason,
            } => packets::write_print_paused(tx, *file_position, *reason)?,
            Self::DoCode { channel, code } => packets::write_do_code(tx, *channel, code)?,
            Self::ChannelEvent { request, channel } => {
                packets::write_code_channel_event(tx, *request, *channel)?
            }
            Self::FileChunkRequest {
                filename,
                offset,
                max_length,
            } => packets::write_file_chunk_request(tx, filename, *offset, *max_length)?,
            Self::EvaluationError { expression, error } => {
                packets::write_evaluation_error(tx, expression, error)?
            }
        }
        Ok(true)
    }
}

/// Packet received from the SBC, body copied out of the receive buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub request: SbcRequest,
    pub id: u16,
    pub payload: Payload,
}

impl Inbound {
    /// Copies the body of the packet `header` was just read for. Unknown
    /// requests and oversized bodies are skipped.
    pub fn capture<const N: usize>(header: &PacketHeader, rx: &mut RxBuffer<N>) -> Option<Self> {
        let request = match SbcRequest::try_from(header.request) {
            Ok(request) => request,
            Err(code) => {
                log_warn!("Skipping unknown SBC request {}", code);
                return None;
            }
        };
        let body = match rx.read_data(header.length as usize) {
            Ok(body) => body,
            Err(e) => {
                log_warn!("Skipping packet {}: {:?}", header.id, e);
                return None;
            }
        };
        match Payload::from_slice(body) {
            Ok(payload) => Some(Self {
                request,
                id: header.id,
                payload,
            }),
            Err(()) => {
                log_warn!("Skipping packet {}: {} bytes", header.id, body.len());
                None
            }
        }
    }
}

/* Link queues */
pub static OUTBOUND_CH: Channel<RawMutex, Outbound, OUTBOUND_CHANNEL_SIZE> = Channel::new();
pub static INBOUND_CH: Channel<RawMutex, Inbound, INBOUND_CHANNEL_SIZE> = Channel::new();

/* Observability */
pub static LINK_DIAGNOSTICS: Signal<RawMutex, Diagnostics> = Signal::new();
pub static CYCLES_COMPLETED: AtomicU32 = AtomicU32::new(0);
