// Centralize all configuration constants
use embassy_time::Duration;

// Link protocol identity; both peers must agree on these
pub const FORMAT_CODE: u32 = 0x5F;
pub const INVALID_FORMAT_CODE: u32 = 0xC9;
pub const PROTOCOL_VERSION: u32 = 4;

// Exchange buffers
pub const TRANSFER_BUFFER_SIZE: usize = 8192;
pub const PACKET_ALIGNMENT: usize = 4;

// Recovery timers
pub const SPI_TRANSFER_TIMEOUT_MS: u64 = 500;
pub const SPI_CONNECTION_TIMEOUT_MS: u64 = 4000;

// Channel sizes
pub const INBOUND_CHANNEL_SIZE: usize = 8;
pub const OUTBOUND_CHANNEL_SIZE: usize = 8;
pub const IPC_PAYLOAD_MAX: usize = 256;

pub const DIAGNOSTICS_PERIOD_MS: u64 = 5000;

/// Timing knobs of the frame exchange state machine.
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// How long a started phase may wait for its completion.
    pub phase_timeout: Duration,
    /// How long without a completed cycle before the peer counts as gone.
    pub connection_timeout: Duration,
}

impl LinkConfig {
    pub const fn new() -> Self {
        Self {
            phase_timeout: Duration::from_millis(SPI_TRANSFER_TIMEOUT_MS),
            connection_timeout: Duration::from_millis(SPI_CONNECTION_TIMEOUT_MS),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new()
    }
}
