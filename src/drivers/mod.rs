//! Transport backends for the SBC link.

#[cfg(test)]
pub mod mock;
#[cfg(feature = "stm32")]
pub mod stm32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Received data was lost because the peripheral was not drained in time.
    Overrun,
    /// The peer clocked bytes before transmit data was available.
    Underrun,
    Bus,
}

/// One full-duplex exchange at a time over the SBC bus.
///
/// Errors never abort the protocol; the exchanged bytes are still checked
/// by the state machine and the error is only counted.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Stages `tx` and `rx` (always the same length) with the peripheral and
    /// resolves once the peer has clocked the whole exchange.
    ///
    /// Staging must happen on the first poll, before the ready line is
    /// toggled. Dropping the future stops the exchange.
    async fn exchange(&mut self, rx: &mut [u8], tx: &[u8]) -> Result<(), TransportError>;

    /// Returns the channel to idle after an abandoned exchange.
    fn abort(&mut self);
}
