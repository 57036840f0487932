//! On-the-wire structures shared with the SBC.
//!
//! Every structure is `#[repr(C)]`, little-endian and free of implicit
//! padding so it can be moved in and out of the exchange buffers with
//! `bytemuck`.

use bytemuck::{Pod, Zeroable};

use crate::config::{FORMAT_CODE, INVALID_FORMAT_CODE, PROTOCOL_VERSION};

/// Header exchanged once per cycle.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct TransferHeader {
    pub format_code: u32,
    pub protocol_version: u32,
    pub num_packets: u16,
    pub sequence_number: u16,
    pub data_length: u32,
    pub crc_data: u32,
    /// Covers every byte before it. Always the last field.
    pub crc_header: u32,
}

pub const TRANSFER_HEADER_SIZE: usize = core::mem::size_of::<TransferHeader>();
/// Bytes protected by `crc_header`.
pub const TRANSFER_HEADER_CRC_SPAN: usize = TRANSFER_HEADER_SIZE - core::mem::size_of::<u32>();

impl TransferHeader {
    /// Outgoing header before any cycle has been prepared.
    pub const fn outgoing() -> Self {
        Self {
            format_code: FORMAT_CODE,
            protocol_version: PROTOCOL_VERSION,
            num_packets: 0,
            sequence_number: 0,
            data_length: 0,
            crc_data: 0,
            crc_header: 0,
        }
    }

    /// Placeholder stored in the receive slot until the peer's header lands.
    pub const fn invalid(sequence_number: u16) -> Self {
        Self {
            format_code: INVALID_FORMAT_CODE,
            protocol_version: 0,
            num_packets: 0,
            sequence_number,
            data_length: 0,
            crc_data: 0,
            crc_header: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; TRANSFER_HEADER_SIZE] {
        let mut out = [0u8; TRANSFER_HEADER_SIZE];
        out.copy_from_slice(bytemuck::bytes_of(self));
        out
    }

    pub fn from_bytes(bytes: &[u8; TRANSFER_HEADER_SIZE]) -> Self {
        bytemuck::pod_read_unaligned(bytes)
    }
}

/// Framing unit in front of every application packet.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct PacketHeader {
    pub request: u16,
    pub id: u16,
    pub length: u32,
    pub resend_packet_id: u16,
    pub padding: u16,
}

pub const PACKET_HEADER_SIZE: usize = core::mem::size_of::<PacketHeader>();

/// Response word exchanged after the header and data phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferResponse {
    Success,
    BadFormat,
    BadProtocolVersion,
    BadDataLength,
    BadHeaderChecksum,
    BadDataChecksum,
    /// Reserved sentinel: "resynchronise from scratch".
    BadResponse,
    Unknown(u32),
}

pub const RESPONSE_SIZE: usize = core::mem::size_of::<u32>();

impl TransferResponse {
    pub const SUCCESS: u32 = 1;
    pub const BAD_FORMAT: u32 = 2;
    pub const BAD_PROTOCOL_VERSION: u32 = 3;
    pub const BAD_DATA_LENGTH: u32 = 4;
    pub const BAD_HEADER_CHECKSUM: u32 = 5;
    pub const BAD_DATA_CHECKSUM: u32 = 6;
    pub const BAD_RESPONSE: u32 = 0xFFFF_FFFF;

    pub const fn code(self) -> u32 {
        match self {
            Self::Success => Self::SUCCESS,
            Self::BadFormat => Self::BAD_FORMAT,
            Self::BadProtocolVersion => Self::BAD_PROTOCOL_VERSION,
            Self::BadDataLength => Self::BAD_DATA_LENGTH,
            Self::BadHeaderChecksum => Self::BAD_HEADER_CHECKSUM,
            Self::BadDataChecksum => Self::BAD_DATA_CHECKSUM,
            Self::BadResponse => Self::BAD_RESPONSE,
            Self::Unknown(code) => code,
        }
    }

    pub const fn from_code(code: u32) -> Self {
        match code {
            Self::SUCCESS => Self::Success,
            Self::BAD_FORMAT => Self::BadFormat,
            Self::BAD_PROTOCOL_VERSION => Self::BadProtocolVersion,
            Self::BAD_DATA_LENGTH => Self::BadDataLength,
            Self::BAD_HEADER_CHECKSUM => Self::BadHeaderChecksum,
            Self::BAD_DATA_CHECKSUM => Self::BadDataChecksum,
            Self::BAD_RESPONSE => Self::BadResponse,
            other => Self::Unknown(other),
        }
    }

    pub fn to_bytes(self) -> [u8; RESPONSE_SIZE] {
        self.code().to_le_bytes()
    }

    pub fn from_bytes(bytes: [u8; RESPONSE_SIZE]) -> Self {
        Self::from_code(u32::from_le_bytes(bytes))
    }
}

/// Reads the first word of any exchanged region. The peer puts the
/// `BadResponse` sentinel there when it wants to start over.
pub fn leading_word(bytes: &[u8]) -> Option<u32> {
    let word: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(word))
}

pub fn is_resync_request(bytes: &[u8]) -> bool {
    leading_word(bytes) == Some(TransferResponse::BAD_RESPONSE)
}
