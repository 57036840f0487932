//! SPI1 slave with DMA on the STM32G0.

use embassy_stm32::{
    mode::Async,
    spi::{Error as SpiError, SpiSlave},
};

use super::{Transport, TransportError};

pub struct SpiSlaveTransport {
    spi: SpiSlave<'static, Async>,
}

impl SpiSlaveTransport {
    pub fn new(spi: SpiSlave<'static, Async>) -> Self {
        Self { spi }
    }
}

impl From<SpiError> for TransportError {
    fn from(e: SpiError) -> Self {
        match e {
            SpiError::Overrun => Self::Overrun,
            _ => Self::Bus,
        }
    }
}

impl Transport for SpiSlaveTransport {
    async fn exchange(&mut self, rx: &mut [u8], tx: &[u8]) -> Result<(), TransportError> {
        self.spi.transfer(rx, tx).await?;
        Ok(())
    }

    fn abort(&mut self) {
        // Dropping the transfer future has already stopped both DMA channels.
        log_debug!("SPI exchange abandoned");
    }
}
