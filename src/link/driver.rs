use core::pin::pin;
use core::task::Poll;

use embassy_futures::poll_once;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Timer};
use embedded_hal::digital::v2::OutputPin;

use super::diagnostics::Diagnostics;
use super::ready::ReadyLine;
use super::state::SpiState;
use super::transfer::{Armed, Cycle, DataTransfer};
use crate::drivers::{Transport, TransportError};

/// Runs the exchanges the state machine asks for over a [`Transport`].
///
/// Single flight: the driver is the only caller of the state machine and
/// never arms a second exchange before the previous one has completed or
/// been abandoned.
pub struct LinkDriver<'a, T, P, const N: usize> {
    transfer: &'a mut DataTransfer<N>,
    transport: T,
    ready: ReadyLine<P>,
    published: Option<&'a Signal<CriticalSectionRawMutex, Diagnostics>>,
    rx_overruns: u32,
    tx_underruns: u32,
}

impl<'a, T: Transport, P: OutputPin, const N: usize> LinkDriver<'a, T, P, N> {
    pub fn new(transfer: &'a mut DataTransfer<N>, transport: T, ready: ReadyLine<P>) -> Self {
        Self {
            transfer,
            transport,
            ready,
            published: None,
            rx_overruns: 0,
            tx_underruns: 0,
        }
    }

    /// Signals a fresh [`Diagnostics`] snapshot after every exchange or
    /// recovery, whether or not a cycle completes.
    pub fn publish_to(
        mut self,
        signal: &'a Signal<CriticalSectionRawMutex, Diagnostics>,
    ) -> Self {
        self.published = Some(signal);
        self
    }

    /// Resolves once a cycle has completed. Returns at once if the last
    /// cycle has not been handed back yet.
    pub async fn wait_cycle(&mut self) {
        while self.transfer.state() != SpiState::ProcessingData {
            self.step().await;
            if let Some(signal) = self.published {
                signal.signal(self.diagnostics(Instant::now()));
            }
        }
    }

    pub fn cycle(&mut self) -> Option<Cycle<'_, N>> {
        self.transfer.cycle()
    }

    pub fn diagnostics(&self, now: Instant) -> Diagnostics {
        Diagnostics {
            rx_overruns: self.rx_overruns,
            tx_underruns: self.tx_underruns,
            ..self.transfer.diagnostics(now)
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn ready(&self) -> &ReadyLine<P> {
        &self.ready
    }

    /// One exchange, or one recovery if its deadline passes first.
    async fn step(&mut self) {
        let Some(Armed { deadline, rx, tx }) = self.transfer.arm() else {
            return;
        };

        let outcome = {
            let mut exchange = pin!(self.transport.exchange(rx, tx));
            // first poll hands the buffers to the peripheral
            let first = poll_once(exchange.as_mut());
            self.ready.toggle();

            match (first, deadline) {
                (Poll::Ready(result), _) => Some(result),
                (Poll::Pending, Some(at)) => match select(exchange.as_mut(), Timer::at(at)).await {
                    Either::First(result) => Some(result),
                    Either::Second(()) => None,
                },
                (Poll::Pending, None) => Some(exchange.as_mut().await),
            }
        };

        let now = Instant::now();
        match outcome {
            Some(result) => {
                if let Err(e) = result {
                    self.record_error(e);
                }
                if self.transfer.on_exchange_complete(now) {
                    log_trace!("Cycle complete");
                }
            }
            None => {
                self.transport.abort();
                if self.transfer.on_timeout(now) {
                    self.ready.reset();
                }
            }
        }
    }

    fn record_error(&mut self, error: TransportError) {
        match error {
            TransportError::Overrun => self.rx_overruns += 1,
            TransportError::Underrun => self.tx_underruns += 1,
            TransportError::Bus => log_warn!("SPI bus error during exchange"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::drivers::mock::{MockPin, MockTransport, Step};
    use crate::link::peer::sbc_header;
    use crate::protocol::wire::{TransferHeader, TransferResponse};
    use embassy_futures::block_on;
    use embassy_time::Duration;

    type DiagnosticsSignal = Signal<CriticalSectionRawMutex, Diagnostics>;

    const N: usize = 128;

    fn config() -> LinkConfig {
        LinkConfig {
            phase_timeout: Duration::from_millis(20),
            connection_timeout: Duration::from_secs(60),
        }
    }

    fn success() -> Vec<u8> {
        TransferResponse::Success.to_bytes().to_vec()
    }

    fn run(
        transfer: &mut DataTransfer<N>,
        script: Vec<Step>,
    ) -> LinkDriver<'_, MockTransport, MockPin, N> {
        let mut driver = LinkDriver::new(
            transfer,
            MockTransport::new(script),
            ReadyLine::new(MockPin::default()),
        );
        block_on(driver.wait_cycle());
        driver.cycle().unwrap().start_next_transfer();
        block_on(driver.wait_cycle());
        driver
    }

    #[test]
    fn test_driver_completes_header_only_cycle() {
        let mut transfer = DataTransfer::<N>::new(config());
        let script = vec![
            Step::Reply(sbc_header(1, &[]).to_bytes().to_vec()),
            Step::Reply(success()),
        ];
        let mut driver = run(&mut transfer, script);

        let sent = &driver.transport().sent;
        assert_eq!(sent.len(), 2);
        let ours = TransferHeader::from_bytes(sent[0].as_slice().try_into().unwrap());
        assert_eq!(ours.sequence_number, 1);
        assert_eq!(sent[1], success());

        // one toggle per staged exchange
        assert_eq!(driver.ready().pin().levels, [false, true, false]);
        assert!(driver.cycle().is_some());
    }

    #[test]
    fn test_driver_recovers_from_silent_peer() {
        let mut transfer = DataTransfer::<N>::new(config());
        let header = sbc_header(1, &[]).to_bytes().to_vec();
        let script = vec![
            Step::Reply(header.clone()),
            Step::Hang,
            Step::Reply(header),
            Step::Reply(success()),
        ];
        let driver = run(&mut transfer, script);

        assert_eq!(driver.transport().aborts, 1);
        assert_eq!(driver.transport().sent.len(), 4);
        assert_eq!(driver.transport().sent[0], driver.transport().sent[2]);
        assert_eq!(driver.diagnostics(Instant::now()).failed_transfers, 1);
        // the reset level is not driven; the following toggle goes high again
        assert_eq!(driver.ready().pin().levels, [false, true, false, true, false]);
    }

    #[test]
    fn test_driver_counts_transport_errors() {
        let mut transfer = DataTransfer::<N>::new(config());
        let script = vec![
            Step::Fail(
                TransportError::Overrun,
                sbc_header(1, &[]).to_bytes().to_vec(),
            ),
            Step::Fail(TransportError::Underrun, success()),
        ];
        let driver = run(&mut transfer, script);

        let diag = driver.diagnostics(Instant::now());
        assert_eq!(diag.state, SpiState::ProcessingData);
        assert_eq!(diag.rx_overruns, 1);
        assert_eq!(diag.tx_underruns, 1);
        assert_eq!(diag.failed_transfers, 0);
    }

    #[test]
    fn test_driver_publishes_diagnostics_while_link_is_down() {
        let signal = DiagnosticsSignal::new();
        let mut transfer = DataTransfer::<N>::new(config());
        transfer.cycle().unwrap().start_next_transfer();

        // header lands, then the SBC goes quiet for good
        let script = vec![Step::Reply(sbc_header(1, &[]).to_bytes().to_vec()), Step::Hang];
        let mut driver = LinkDriver::new(
            &mut transfer,
            MockTransport::new(script),
            ReadyLine::new(MockPin::default()),
        )
        .publish_to(&signal);

        let outcome = block_on(select(
            driver.wait_cycle(),
            Timer::after(Duration::from_millis(100)),
        ));
        assert!(matches!(outcome, Either::Second(())));

        let diag = signal.try_take().expect("snapshot published without a cycle");
        assert_eq!(diag.state, SpiState::ExchangingHeader);
        assert_eq!(diag.failed_transfers, 1);
        assert_eq!(diag.since_last_cycle, None);
        assert_eq!(driver.transport().aborts, 1);
    }

    #[test]
    fn test_driver_restarts_after_connection_loss() {
        let mut transfer = DataTransfer::<N>::new(LinkConfig {
            phase_timeout: Duration::from_millis(20),
            connection_timeout: Duration::from_millis(30),
        });
        let script = vec![
            Step::Reply(sbc_header(7, &[]).to_bytes().to_vec()),
            Step::Reply(success()),
            Step::Hang,
            Step::Reply(sbc_header(1, &[]).to_bytes().to_vec()),
            Step::Reply(success()),
        ];
        // first cycle with the SBC at sequence 7, then it disappears
        let mut driver = run(&mut transfer, script);
        driver.cycle().unwrap().start_next_transfer();
        block_on(driver.wait_cycle());

        let sent = &driver.transport().sent;
        assert_eq!(sent.len(), 5);
        let header =
            |bytes: &Vec<u8>| TransferHeader::from_bytes(bytes.as_slice().try_into().unwrap());
        assert_eq!(header(&sent[0]).sequence_number, 1);
        assert_eq!(header(&sent[2]).sequence_number, 2);
        // numbering restarts once the connection is declared lost
        assert_eq!(header(&sent[3]).sequence_number, 1);
        assert_eq!(header(&sent[3]).data_length, 0);

        assert_eq!(driver.transport().aborts, 1);
        let diag = driver.diagnostics(Instant::now());
        assert_eq!(diag.failed_transfers, 0);
        assert_eq!(diag.rx_sequence, 1);
        assert_eq!(diag.tx_sequence, 1);
        // ready line was reset, so the next toggle drove it high again
        assert_eq!(
            driver.ready().pin().levels,
            [false, true, false, true, true, false]
        );
    }
}
