#![cfg_attr(not(test), no_std)]

#[macro_use]
mod logging;

pub mod config;
pub mod drivers;
pub mod ipc;
pub mod link;
pub mod protocol;

#[cfg(feature = "stm32")]
pub mod board;
#[cfg(feature = "stm32")]
pub mod tasks;

#[cfg(feature = "stm32")]
pub use board::Board;
pub use link::{Cycle, DataTransfer, LinkDriver};
