use crate::config::{LinkConfig, DIAGNOSTICS_PERIOD_MS};
use crate::drivers::stm32::SpiSlaveTransport;
use crate::ipc::{Inbound, Outbound, CYCLES_COMPLETED, INBOUND_CH, LINK_DIAGNOSTICS, OUTBOUND_CH};
use crate::link::{DataTransfer, LinkDriver, ReadyLine};
use crate::protocol::CodecError;
use defmt::*;
use embassy_executor::task;
use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Ticker};
use portable_atomic::Ordering;
use static_cell::ConstStaticCell;

static LINK_STATE: ConstStaticCell<DataTransfer> = ConstStaticCell::new(DataTransfer::new(LinkConfig::new()));

#[task]
pub async fn sbc_link_task(transport: SpiSlaveTransport, transfer_ready: Output<'static>) {
    info!("SBC link task started");
    let mut driver = LinkDriver::new(LINK_STATE.take(), transport, ReadyLine::new(transfer_ready))
        .publish_to(&LINK_DIAGNOSTICS);
    let mut pending: Option<Outbound> = None;

    loop {
        driver.wait_cycle().await;
        CYCLES_COMPLETED.fetch_add(1, Ordering::Relaxed);

        let Some(mut cycle) = driver.cycle() else {
            continue;
        };

        // Hand received packets to their consumers
        loop {
            match cycle.read_packet() {
                Ok(Some(header)) => {
                    if let Some(packet) = Inbound::capture(&header, cycle.rx()) {
                        if INBOUND_CH.try_send(packet).is_err() {
                            warn!("Inbound channel full, dropping packet {}", header.id);
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Malformed packet stream: {:?}", e);
                    break;
                }
            }
        }

        // Stage as much outgoing data as fits
        loop {
            let mut packet = match pending.take() {
                Some(packet) => packet,
                None => match OUTBOUND_CH.try_receive() {
                    Ok(packet) => packet,
                    Err(_) => break,
                },
            };
            match packet.stage(cycle.tx()) {
                Ok(true) => {}
                Ok(false) | Err(CodecError::BufferFull { .. }) => {
                    pending = Some(packet);
                    break;
                }
                Err(e) => warn!("Dropping outbound packet: {:?}", e),
            }
        }

        cycle.start_next_transfer();
    }
}

#[task]
pub async fn link_stats_task() {
    info!("Link stats task started");
    let mut ticker = Ticker::every(Duration::from_millis(DIAGNOSTICS_PERIOD_MS));
    let mut last_cycles = CYCLES_COMPLETED.load(Ordering::Relaxed);

    loop {
        ticker.next().await;

        let cycles = CYCLES_COMPLETED.load(Ordering::Relaxed);
        let rate = cycles.wrapping_sub(last_cycles) * 1000 / DIAGNOSTICS_PERIOD_MS as u32;
        last_cycles = cycles;

        match LINK_DIAGNOSTICS.try_take() {
            Some(diag) => info!("SBC link: {} cycles/s, {}", rate, diag),
            None => warn!("SBC link: no exchange in {}ms", DIAGNOSTICS_PERIOD_MS),
        }
    }
}
