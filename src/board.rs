use embassy_stm32::mode::Async;
use embassy_stm32::spi::SpiSlave;
use embassy_stm32::{
    gpio::{Level, Output, Speed},
    rcc, spi, Config,
};

// ── Board struct ──────────────────────────────────────────
pub struct Board {
    pub spi1: SpiSlave<'static, Async>, // DMA
    pub transfer_ready: Output<'static>,
}

impl Board {
    pub fn init() -> Self {
        let mut config = Config::default();

        // HSI16 -> PLL -> 64MHz SYSCLK
        config.rcc.hsi = Some(rcc::Hsi {
            sys_div: rcc::HsiSysDiv::DIV1,
        });
        config.rcc.pll = Some(rcc::Pll {
            source: rcc::PllSource::HSI,
            prediv: rcc::PllPreDiv::DIV2,   // 16MHz / 2 = 8MHz
            mul: rcc::PllMul::MUL16,        // 8MHz * 16 = 128MHz
            divp: None,
            divq: None,
            divr: Some(rcc::PllRDiv::DIV2), // 128MHz / 2 = 64MHz
        });
        config.rcc.sys = rcc::Sysclk::PLL1_R;
        let p = embassy_stm32::init(config);

        // Low until the first exchange is staged
        let transfer_ready = Output::new(p.PA9, Level::Low, Speed::Low);

        // SPI1 slave (DMA CH5 TX, CH4 RX), mode 0 as the SBC expects
        let mut spi_cfg = spi::ConfigSlave::default();
        spi_cfg.mode = spi::MODE_0;
        let spi1 = SpiSlave::new_hardware_cs(
            p.SPI1,
            p.PA5, p.PA7, p.PA6, p.PA4, // SCK, MOSI, MISO, NSS
            p.DMA1_CH5,          // TX
            p.DMA1_CH4,          // RX
            spi_cfg,
        );

        Self {
            spi1,
            transfer_ready,
        }
    }
}
