#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use {defmt_rtt as _, panic_probe as _};

use sbc_link::{
    drivers::stm32::SpiSlaveTransport,
    tasks::{link_stats_task, sbc_link_task},
    Board,
};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting sbc-link firmware");
    let board = Board::init();

    spawner
        .spawn(sbc_link_task(
            SpiSlaveTransport::new(board.spi1),
            board.transfer_ready,
        ))
        .unwrap();
    spawner.spawn(link_stats_task()).unwrap();
    info!("SBC link tasks spawned on main executor");

    core::future::pending::<()>().await;
}
