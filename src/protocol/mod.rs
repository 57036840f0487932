pub mod codec;
pub mod crc;
pub mod packets;
pub mod wire;

pub use codec::{align_up, CodecError, HeaderSlot, PacketSlot, RxBuffer, TxBuffer};
pub use wire::{PacketHeader, TransferHeader, TransferResponse};
