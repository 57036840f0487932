/// Where the frame exchange currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiState {
    ExchangingHeader,
    ExchangingHeaderResponse,
    ExchangingData,
    ExchangingDataResponse,
    /// Cycle done; the application owns the buffers.
    ProcessingData,
    /// Our `BadResponse` is on the wire.
    Resetting,
}

impl SpiState {
    /// States gated by the short phase timeout.
    pub fn is_phase_timed(self) -> bool {
        matches!(
            self,
            Self::ExchangingHeaderResponse
                | Self::ExchangingData
                | Self::ExchangingDataResponse
                | Self::Resetting
        )
    }
}

/// Who asked for a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetOrigin {
    Own,
    Peer,
}
