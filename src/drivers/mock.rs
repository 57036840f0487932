//! Scripted transport and pin for host tests.

use std::collections::VecDeque;

use core::convert::Infallible;
use embedded_hal::digital::v2::OutputPin;

use super::{Transport, TransportError};

pub enum Step {
    /// Peer clocks these bytes in.
    Reply(Vec<u8>),
    /// Peer clocks these bytes in but the peripheral flags an error.
    Fail(TransportError, Vec<u8>),
    /// Peer never clocks.
    Hang,
}

#[derive(Default)]
pub struct MockTransport {
    script: VecDeque<Step>,
    /// Everything we put on the wire, one entry per exchange.
    pub sent: Vec<Vec<u8>>,
    pub aborts: usize,
}

impl MockTransport {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }
}

fn clock_in(rx: &mut [u8], bytes: &[u8]) {
    let n = bytes.len().min(rx.len());
    rx[..n].copy_from_slice(&bytes[..n]);
}

impl Transport for MockTransport {
    async fn exchange(&mut self, rx: &mut [u8], tx: &[u8]) -> Result<(), TransportError> {
        assert_eq!(rx.len(), tx.len());
        self.sent.push(tx.to_vec());
        match self.script.pop_front() {
            Some(Step::Reply(bytes)) => {
                clock_in(rx, &bytes);
                Ok(())
            }
            Some(Step::Fail(err, bytes)) => {
                clock_in(rx, &bytes);
                Err(err)
            }
            Some(Step::Hang) | None => core::future::pending().await,
        }
    }

    fn abort(&mut self) {
        self.aborts += 1;
    }
}

/// Records every level written.
#[derive(Default)]
pub struct MockPin {
    pub levels: Vec<bool>,
}

impl OutputPin for MockPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.push(true);
        Ok(())
    }
}
