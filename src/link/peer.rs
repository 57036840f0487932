//! SBC side of the link, for tests.

use crate::protocol::codec::TxBuffer;
use crate::protocol::crc::{crc32, seal_header};
use crate::protocol::wire::TransferHeader;

/// A valid header announcing `payload`.
pub fn sbc_header(seq: u16, payload: &[u8]) -> TransferHeader {
    let mut header = TransferHeader {
        sequence_number: seq,
        data_length: payload.len() as u32,
        crc_data: crc32(payload),
        ..TransferHeader::outgoing()
    };
    seal_header(&mut header);
    header
}

/// Frames `(request, data)` pairs the way the SBC packs them.
pub fn sbc_payload(packets: &[(u16, &[u8])]) -> Vec<u8> {
    let mut tx = TxBuffer::<1024>::new();
    for (request, data) in packets {
        tx.write_packet_header(*request, data.len(), 0).unwrap();
        tx.write_data(data).unwrap();
    }
    tx.as_bytes().to_vec()
}
