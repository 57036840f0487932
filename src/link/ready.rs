use embedded_hal::digital::v2::OutputPin;

/// Transfer-ready handshake line. Only transitions mean anything to the SBC:
/// every toggle announces a freshly staged exchange.
pub struct ReadyLine<P> {
    pin: P,
    high: bool,
}

impl<P: OutputPin> ReadyLine<P> {
    pub fn new(mut pin: P) -> Self {
        if pin.set_low().is_err() {
            log_error!("Failed to drive transfer ready pin");
        }
        Self { pin, high: false }
    }

    pub fn toggle(&mut self) {
        self.high = !self.high;
        let result = if self.high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if result.is_err() {
            log_error!("Failed to drive transfer ready pin");
        }
    }

    /// Forgets the current level without driving the pin, so the next
    /// [`toggle`](Self::toggle) always leaves the line high.
    pub fn reset(&mut self) {
        self.high = false;
    }

    pub fn is_high(&self) -> bool {
        self.high
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }
}
