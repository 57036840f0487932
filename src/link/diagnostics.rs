use embassy_time::Duration;

use super::state::SpiState;

/// Snapshot of the link for periodic reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostics {
    pub state: SpiState,
    pub failed_transfers: u32,
    pub since_last_exchange: Duration,
    /// `None` until the first cycle completes.
    pub since_last_cycle: Option<Duration>,
    pub rx_sequence: u16,
    pub tx_sequence: u16,
    pub header_crc_errors: u32,
    pub data_crc_errors: u32,
    pub rx_overruns: u32,
    pub tx_underruns: u32,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Diagnostics {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "state={} failed={} last={}ms seq rx={} tx={} crc hdr={} data={} ovr={} udr={}",
            self.state,
            self.failed_transfers,
            self.since_last_exchange.as_millis(),
            self.rx_sequence,
            self.tx_sequence,
            self.header_crc_errors,
            self.data_crc_errors,
            self.rx_overruns,
            self.tx_underruns,
        )
    }
}
