//! Frame exchange state machine.
//!
//! One cycle is a header exchange, a response exchange, and when either side
//! has payload, a data exchange plus another response exchange. The machine
//! only decides what goes on the wire next; the [`LinkDriver`] runs the
//! actual exchanges and feeds completions and timeouts back in.
//!
//! [`LinkDriver`]: super::driver::LinkDriver

use embassy_time::Instant;

use super::diagnostics::Diagnostics;
use super::state::{ResetOrigin, SpiState};
use crate::config::{LinkConfig, FORMAT_CODE, PROTOCOL_VERSION, TRANSFER_BUFFER_SIZE};
use crate::protocol::codec::{CodecError, RxBuffer, TxBuffer};
use crate::protocol::crc::{crc32, header_crc, seal_header};
use crate::protocol::wire::{is_resync_request, PacketHeader, TransferHeader, TransferResponse};

/// Buffers for the next exchange, equal in length.
pub struct Armed<'a> {
    /// When the driver must give up waiting and call [`DataTransfer::on_timeout`].
    pub deadline: Option<Instant>,
    pub rx: &'a mut [u8],
    pub tx: &'a [u8],
}

pub struct DataTransfer<const N: usize = TRANSFER_BUFFER_SIZE> {
    config: LinkConfig,
    state: SpiState,

    rx_header: TransferHeader,
    tx_header: TransferHeader,
    rx_response: u32,
    tx_response: u32,
    rx: RxBuffer<N>,
    tx: TxBuffer<N>,

    last_transfer_number: u16,
    last_transfer_time: Instant,
    last_cycle_time: Option<Instant>,

    failed_transfers: u32,
    header_crc_errors: u32,
    data_crc_errors: u32,
}

impl<const N: usize> DataTransfer<N> {
    /// Starts in `ProcessingData` with empty buffers, so the first thing the
    /// owner does is stage outgoing packets and start a transfer.
    pub const fn new(config: LinkConfig) -> Self {
        Self {
            config,
            state: SpiState::ProcessingData,
            rx_header: TransferHeader::invalid(0),
            tx_header: TransferHeader::outgoing(),
            rx_response: 0,
            tx_response: 0,
            rx: RxBuffer::new(),
            tx: TxBuffer::new(),
            last_transfer_number: 0,
            last_transfer_time: Instant::from_ticks(0),
            last_cycle_time: None,
            failed_transfers: 0,
            header_crc_errors: 0,
            data_crc_errors: 0,
        }
    }

    pub fn state(&self) -> SpiState {
        self.state
    }

    pub fn failed_transfers(&self) -> u32 {
        self.failed_transfers
    }

    pub fn last_transfer_number(&self) -> u16 {
        self.last_transfer_number
    }

    pub fn tx_header(&self) -> &TransferHeader {
        &self.tx_header
    }

    pub fn rx_header(&self) -> &TransferHeader {
        &self.rx_header
    }

    /// A cycle completed within the connection timeout.
    pub fn is_connected(&self, now: Instant) -> bool {
        self.last_cycle_time
            .is_some_and(|t| now < t + self.config.connection_timeout)
    }

    /// Buffers to hand to the transport for the current state, or `None`
    /// while the application owns them.
    pub fn arm(&mut self) -> Option<Armed<'_>> {
        let deadline = self.next_deadline();
        let (rx, tx): (&mut [u8], &[u8]) = match self.state {
            SpiState::ProcessingData => return None,
            SpiState::ExchangingHeader => (
                bytemuck::bytes_of_mut(&mut self.rx_header),
                bytemuck::bytes_of(&self.tx_header),
            ),
            SpiState::ExchangingData => {
                let len = self.data_exchange_len();
                (self.rx.receive_region(len), self.tx.exchange_region(len))
            }
            SpiState::ExchangingHeaderResponse
            | SpiState::ExchangingDataResponse
            | SpiState::Resetting => (
                bytemuck::bytes_of_mut(&mut self.rx_response),
                bytemuck::bytes_of(&self.tx_response),
            ),
        };
        Some(Armed { deadline, rx, tx })
    }

    /// Next instant at which [`on_timeout`](Self::on_timeout) will act.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            SpiState::ExchangingHeader => Some(self.connection_deadline()),
            state if state.is_phase_timed() => {
                Some(self.last_transfer_time + self.config.phase_timeout)
            }
            _ => None,
        }
    }

    /// Consumes a finished exchange. Returns `true` exactly when a full cycle
    /// completed; the received packets are then available through
    /// [`cycle`](Self::cycle).
    pub fn on_exchange_complete(&mut self, now: Instant) -> bool {
        self.last_transfer_time = now;

        match self.state {
            SpiState::ExchangingHeader => {
                if is_resync_request(bytemuck::bytes_of(&self.rx_header)) {
                    self.reset_transfer(ResetOrigin::Peer);
                    return false;
                }
                let response = self.validate_header();
                self.exchange_response(response);
            }

            SpiState::ExchangingHeaderResponse => {
                let rx = TransferResponse::from_code(self.rx_response);
                let tx = TransferResponse::from_code(self.tx_response);
                match (rx, tx) {
                    (TransferResponse::Success, TransferResponse::Success) => {
                        if self.rx_header.data_length != 0 || self.tx_header.data_length != 0 {
                            self.exchange_data();
                        } else {
                            return self.finish_cycle(now);
                        }
                    }
                    (TransferResponse::BadResponse, _) => self.reset_transfer(ResetOrigin::Peer),
                    (TransferResponse::BadHeaderChecksum, _)
                    | (_, TransferResponse::BadHeaderChecksum) => self.exchange_header(),
                    _ => {
                        log_warn!("Unexpected header response {:?} (sent {:?})", rx, tx);
                        self.reset_transfer(ResetOrigin::Own);
                    }
                }
            }

            SpiState::ExchangingData => {
                let len = self.data_exchange_len();
                if is_resync_request(self.rx.receive_bytes(len)) {
                    self.reset_transfer(ResetOrigin::Peer);
                    return false;
                }

                let expected = self.rx_header.crc_data;
                let actual = crc32(self.rx.receive_bytes(self.rx_header.data_length as usize));
                if actual != expected {
                    self.data_crc_errors += 1;
                    log_warn!("Bad data CRC (expected {:x}, got {:x})", expected, actual);
                    self.exchange_response(TransferResponse::BadDataChecksum);
                } else {
                    self.exchange_response(TransferResponse::Success);
                }
            }

            SpiState::ExchangingDataResponse => {
                let rx = TransferResponse::from_code(self.rx_response);
                let tx = TransferResponse::from_code(self.tx_response);
                match (rx, tx) {
                    (TransferResponse::Success, TransferResponse::Success) => {
                        return self.finish_cycle(now);
                    }
                    (TransferResponse::BadResponse, _) => self.reset_transfer(ResetOrigin::Peer),
                    // the data goes out again unchanged
                    (TransferResponse::BadDataChecksum, _)
                    | (_, TransferResponse::BadDataChecksum) => self.exchange_data(),
                    _ => {
                        log_warn!("Unexpected data response {:?} (sent {:?})", rx, tx);
                        self.reset_transfer(ResetOrigin::Own);
                    }
                }
            }

            SpiState::Resetting => {
                log_debug!("Reset sent, exchanging header");
                self.exchange_header();
            }

            SpiState::ProcessingData => {
                // Nothing was armed, so the next transfer was never started.
                log_error!("Internal error: exchange completed while processing data");
                self.exchange_header();
            }
        }
        false
    }

    /// Recovery once [`next_deadline`](Self::next_deadline) has passed.
    /// Returns `true` if the in-flight exchange was abandoned, in which case
    /// the transport must be idled and the ready line reset before re-arming.
    pub fn on_timeout(&mut self, now: Instant) -> bool {
        match self.state {
            SpiState::ExchangingHeader if now >= self.connection_deadline() => {
                log_warn!(
                    "SBC not connected (last sequence {}), restarting",
                    self.last_transfer_number
                );
                self.last_transfer_number = 0;
                self.rx_header.sequence_number = 0;
                self.tx_header.sequence_number = 0;
                self.tx.clear();
                self.last_transfer_time = now;
                self.start_next_transfer();
                true
            }
            state
                if state.is_phase_timed()
                    && now >= self.last_transfer_time + self.config.phase_timeout =>
            {
                log_warn!("SPI timeout in {:?}", state);
                self.failed_transfers += 1;
                self.exchange_header();
                true
            }
            _ => false,
        }
    }

    /// Access to the completed cycle. Only available in `ProcessingData`.
    pub fn cycle(&mut self) -> Option<Cycle<'_, N>> {
        if self.state == SpiState::ProcessingData {
            Some(Cycle { transfer: self })
        } else {
            None
        }
    }

    pub fn diagnostics(&self, now: Instant) -> Diagnostics {
        Diagnostics {
            state: self.state,
            failed_transfers: self.failed_transfers,
            since_last_exchange: now.saturating_duration_since(self.last_transfer_time),
            since_last_cycle: self
                .last_cycle_time
                .map(|t| now.saturating_duration_since(t)),
            rx_sequence: self.rx_header.sequence_number,
            tx_sequence: self.tx_header.sequence_number,
            header_crc_errors: self.header_crc_errors,
            data_crc_errors: self.data_crc_errors,
            rx_overruns: 0,
            tx_underruns: 0,
        }
    }

    fn validate_header(&mut self) -> TransferResponse {
        let header = self.rx_header;
        let checksum = header_crc(&header);
        if header.crc_header != checksum {
            self.header_crc_errors += 1;
            log_warn!(
                "Bad header CRC (expected {:x}, got {:x})",
                header.crc_header,
                checksum
            );
            return TransferResponse::BadHeaderChecksum;
        }
        if header.format_code != FORMAT_CODE {
            return TransferResponse::BadFormat;
        }
        if header.protocol_version != PROTOCOL_VERSION {
            return TransferResponse::BadProtocolVersion;
        }
        if header.data_length as usize > N {
            return TransferResponse::BadDataLength;
        }
        TransferResponse::Success
    }

    fn connection_deadline(&self) -> Instant {
        let timeout = self.config.connection_timeout;
        let idle_limit = self.last_transfer_time + timeout * 2;
        match self.last_cycle_time {
            Some(t) if self.last_transfer_number != 0 => t + timeout,
            Some(t) => (t + timeout).max(idle_limit),
            None => idle_limit,
        }
    }

    fn data_exchange_len(&self) -> usize {
        (self.rx_header.data_length.max(self.tx_header.data_length) as usize).min(N)
    }

    fn exchange_header(&mut self) {
        self.state = SpiState::ExchangingHeader;
    }

    fn exchange_response(&mut self, response: TransferResponse) {
        self.tx_response = response.code();
        self.state = if self.state == SpiState::ExchangingHeader {
            SpiState::ExchangingHeaderResponse
        } else {
            SpiState::ExchangingDataResponse
        };
    }

    fn exchange_data(&mut self) {
        self.state = SpiState::ExchangingData;
    }

    fn reset_transfer(&mut self, origin: ResetOrigin) {
        self.failed_transfers += 1;
        match origin {
            ResetOrigin::Own => {
                log_info!("Resetting transfer");
                self.tx_response = TransferResponse::BAD_RESPONSE;
                self.state = SpiState::Resetting;
            }
            ResetOrigin::Peer => {
                log_info!("Resetting transfer due to SBC request");
                self.exchange_header();
            }
        }
    }

    fn finish_cycle(&mut self, now: Instant) -> bool {
        self.rx.begin_reading(self.rx_header.data_length as usize);
        self.tx.clear();
        self.last_cycle_time = Some(now);
        self.state = SpiState::ProcessingData;
        true
    }

    fn start_next_transfer(&mut self) {
        self.last_transfer_number = self.rx_header.sequence_number;
        self.rx_header = TransferHeader::invalid(self.rx_header.sequence_number);

        let header = &mut self.tx_header;
        header.num_packets = self.tx.packet_count();
        header.sequence_number = header.sequence_number.wrapping_add(1);
        header.data_length = self.tx.len() as u32;
        header.crc_data = crc32(self.tx.as_bytes());
        seal_header(header);

        self.exchange_header();
    }
}

/// The application's window onto a completed cycle: packets the SBC sent
/// are read from `rx`, replies are staged in `tx`.
pub struct Cycle<'a, const N: usize> {
    transfer: &'a mut DataTransfer<N>,
}

impl<'a, const N: usize> Cycle<'a, N> {
    pub fn rx_header(&self) -> &TransferHeader {
        &self.transfer.rx_header
    }

    pub fn rx(&mut self) -> &mut RxBuffer<N> {
        &mut self.transfer.rx
    }

    pub fn tx(&mut self) -> &mut TxBuffer<N> {
        &mut self.transfer.tx
    }

    pub fn buffers(&mut self) -> (&mut RxBuffer<N>, &mut TxBuffer<N>) {
        (&mut self.transfer.rx, &mut self.transfer.tx)
    }

    pub fn read_packet(&mut self) -> Result<Option<PacketHeader>, CodecError> {
        self.transfer.rx.read_packet()
    }

    /// Seals the staged packets into a new header and hands the buffers
    /// back to the state machine.
    pub fn start_next_transfer(self) {
        self.transfer.start_next_transfer();
    }
}
