//! CRC32 used for both the transfer header and the payload.

use crc::{Crc, CRC_32_ISO_HDLC};

use super::wire::{TransferHeader, TRANSFER_HEADER_CRC_SPAN};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Checksum over every header byte except `crc_header` itself.
pub fn header_crc(header: &TransferHeader) -> u32 {
    crc32(&bytemuck::bytes_of(header)[..TRANSFER_HEADER_CRC_SPAN])
}

/// Fills in `crc_header`. Must run after every other field is final.
pub fn seal_header(header: &mut TransferHeader) {
    header.crc_header = header_crc(header);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_values() {
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_header_crc_ignores_its_own_field() {
        let mut header = TransferHeader::outgoing();
        header.data_length = 12;
        let before = header_crc(&header);
        header.crc_header = 0x1234_5678;
        assert_eq!(header_crc(&header), before);

        seal_header(&mut header);
        assert_eq!(header.crc_header, before);
    }

    #[test]
    fn test_any_bit_flip_changes_header_crc() {
        let mut header = TransferHeader::outgoing();
        header.num_packets = 2;
        header.sequence_number = 7;
        header.data_length = 64;
        header.crc_data = 0xA5A5_5A5A;
        seal_header(&mut header);

        let bytes = header.to_bytes();
        for bit in 0..TRANSFER_HEADER_CRC_SPAN * 8 {
            let mut corrupted = bytes;
            corrupted[bit / 8] ^= 1 << (bit % 8);
            let parsed = TransferHeader::from_bytes(&corrupted);
            assert_ne!(header_crc(&parsed), parsed.crc_header, "bit {}", bit);
        }
    }
}
