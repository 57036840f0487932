pub mod diagnostics;
pub mod driver;
#[cfg(test)]
pub(crate) mod peer;
pub mod ready;
pub mod state;
pub mod transfer;

pub use diagnostics::Diagnostics;
pub use driver::LinkDriver;
pub use ready::ReadyLine;
pub use state::SpiState;
pub use transfer::{Cycle, DataTransfer};
