//! Packet codec: cursor discipline over the fixed exchange buffers.
//!
//! Outgoing packets are appended to a [`TxBuffer`]: every packet header is
//! placed on a [`PACKET_ALIGNMENT`] boundary, while raw data is appended
//! without padding so strings can be concatenated. Incoming packets are
//! walked with an [`RxBuffer`], which consumes the same padding on reads.
//! Neither side knows what the payloads mean.

use core::marker::PhantomData;

use bytemuck::Pod;

use super::wire::{PacketHeader, PACKET_HEADER_SIZE};
use crate::config::PACKET_ALIGNMENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// Not enough room left in the transmit buffer.
    BufferFull { needed: usize, available: usize },
    /// The receive buffer (or current packet) ends before the requested bytes.
    Truncated { needed: usize, available: usize },
    /// A length does not fit the header field that carries it.
    FieldOverflow { length: usize, max: usize },
}

#[inline]
pub const fn align_up(n: usize) -> usize {
    (n + PACKET_ALIGNMENT - 1) & !(PACKET_ALIGNMENT - 1)
}

#[repr(C, align(4))]
struct Aligned<const N: usize>([u8; N]);

/// Location of a written packet header, for patching its length later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSlot {
    offset: usize,
}

/// Location of a written fixed-size header of type `T`.
#[derive(Debug)]
pub struct HeaderSlot<T> {
    offset: usize,
    _marker: PhantomData<T>,
}

impl<T> Clone for HeaderSlot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for HeaderSlot<T> {}

/* ------------------------------------------------------------------------- */
/*  Transmit side                                                            */
/* ------------------------------------------------------------------------- */

pub struct TxBuffer<const N: usize> {
    data: Aligned<N>,
    pos: usize,
    packet_id: u16,
}

impl<const N: usize> TxBuffer<N> {
    pub const fn new() -> Self {
        Self {
            data: Aligned([0; N]),
            pos: 0,
            packet_id: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes written so far, including inner padding.
    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// Packets written in the current cycle.
    pub fn packet_count(&self) -> u16 {
        self.packet_id
    }

    pub fn free_space(&self) -> usize {
        N.saturating_sub(self.pos)
    }

    /// Whether a packet with `payload_len` bytes after its [`PacketHeader`]
    /// still fits. The header and the alignment padding in front of it are
    /// accounted for here; callers pass the payload size only.
    pub fn can_write_packet(&self, payload_len: usize) -> bool {
        align_up(self.pos)
            .checked_add(PACKET_HEADER_SIZE)
            .and_then(|n| n.checked_add(payload_len))
            .is_some_and(|end| end <= N)
    }

    /// Realigns the cursor and appends a packet header with the next id.
    pub fn write_packet_header(
        &mut self,
        request: u16,
        length: usize,
        resend_packet_id: u16,
    ) -> Result<PacketSlot, CodecError> {
        let start = align_up(self.pos);
        self.ensure_room(start, PACKET_HEADER_SIZE)?;
        self.data.0[self.pos..start].fill(0);

        let header = PacketHeader {
            request,
            id: self.packet_id,
            length: length as u32,
            resend_packet_id,
            padding: 0,
        };
        self.data.0[start..start + PACKET_HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));
        self.packet_id = self.packet_id.wrapping_add(1);
        self.pos = start + PACKET_HEADER_SIZE;
        Ok(PacketSlot { offset: start })
    }

    /// Rewrites the `length` of a packet written earlier in this cycle.
    pub fn set_packet_length(&mut self, slot: PacketSlot, length: usize) {
        let mut header: PacketHeader =
            bytemuck::pod_read_unaligned(&self.data.0[slot.offset..slot.offset + PACKET_HEADER_SIZE]);
        header.length = length as u32;
        self.data.0[slot.offset..slot.offset + PACKET_HEADER_SIZE]
            .copy_from_slice(bytemuck::bytes_of(&header));
    }

    /// Appends a fixed-size typed header at the cursor.
    pub fn write_data_header<T: Pod>(&mut self, header: &T) -> Result<HeaderSlot<T>, CodecError> {
        let offset = self.pos;
        self.write_data(bytemuck::bytes_of(header))?;
        Ok(HeaderSlot {
            offset,
            _marker: PhantomData,
        })
    }

    pub fn patch_data_header<T: Pod>(&mut self, slot: HeaderSlot<T>, header: &T) {
        let size = core::mem::size_of::<T>();
        self.data.0[slot.offset..slot.offset + size].copy_from_slice(bytemuck::bytes_of(header));
    }

    /// Appends raw bytes without realigning.
    pub fn write_data(&mut self, data: &[u8]) -> Result<(), CodecError> {
        let dst = self.reserve(data.len())?;
        dst.copy_from_slice(data);
        Ok(())
    }

    /// Hands out the next `len` bytes for in-place filling and advances past them.
    pub fn reserve(&mut self, len: usize) -> Result<&mut [u8], CodecError> {
        let start = self.pos;
        self.ensure_room(start, len)?;
        self.pos = start + len;
        Ok(&mut self.data.0[start..start + len])
    }

    /// Everything written this cycle.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data.0[..self.pos]
    }

    /// The first `len` bytes of the buffer, clamped to capacity.
    pub(crate) fn exchange_region(&self, len: usize) -> &[u8] {
        &self.data.0[..len.min(N)]
    }

    pub(crate) fn clear(&mut self) {
        self.pos = 0;
        self.packet_id = 0;
    }

    fn ensure_room(&self, start: usize, len: usize) -> Result<(), CodecError> {
        let available = N.saturating_sub(start);
        if len > available {
            return Err(CodecError::BufferFull {
                needed: len,
                available,
            });
        }
        Ok(())
    }
}

impl<const N: usize> Default for TxBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/* ------------------------------------------------------------------------- */
/*  Receive side                                                             */
/* ------------------------------------------------------------------------- */

pub struct RxBuffer<const N: usize> {
    data: Aligned<N>,
    pos: usize,
    len: usize,
    packet_end: usize,
}

impl<const N: usize> RxBuffer<N> {
    pub const fn new() -> Self {
        Self {
            data: Aligned([0; N]),
            pos: 0,
            len: 0,
            packet_end: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Declared payload length of the cycle being read.
    pub fn data_length(&self) -> usize {
        self.len
    }

    /// Bytes left in the packet currently being read.
    pub fn remaining(&self) -> usize {
        self.packet_end.saturating_sub(self.pos)
    }

    /// Moves to the next packet and returns its header, or `None` once the
    /// declared payload is used up. Unread bytes of the previous packet are
    /// skipped.
    pub fn read_packet(&mut self) -> Result<Option<PacketHeader>, CodecError> {
        let start = align_up(self.pos.max(self.packet_end));
        if start >= self.len {
            self.pos = start;
            self.packet_end = start;
            return Ok(None);
        }

        let available = self.len - start;
        if available < PACKET_HEADER_SIZE {
            return Err(CodecError::Truncated {
                needed: PACKET_HEADER_SIZE,
                available,
            });
        }

        let header: PacketHeader =
            bytemuck::pod_read_unaligned(&self.data.0[start..start + PACKET_HEADER_SIZE]);
        let body = start + PACKET_HEADER_SIZE;
        let length = header.length as usize;
        if length > self.len - body {
            return Err(CodecError::Truncated {
                needed: length,
                available: self.len - body,
            });
        }

        self.pos = body;
        self.packet_end = body + length;
        Ok(Some(header))
    }

    /// Reads a fixed-size typed header at the cursor.
    pub fn read_data_header<T: Pod>(&mut self) -> Result<T, CodecError> {
        let size = core::mem::size_of::<T>();
        let start = self.take(size)?;
        self.pos = start + size;
        Ok(bytemuck::pod_read_unaligned(&self.data.0[start..start + size]))
    }

    /// Returns the next `len` bytes and advances past them plus the padding
    /// the writer would have added after them.
    pub fn read_data(&mut self, len: usize) -> Result<&[u8], CodecError> {
        let start = self.take(len)?;
        self.pos = start + align_up(len);
        Ok(&self.data.0[start..start + len])
    }

    pub(crate) fn receive_region(&mut self, len: usize) -> &mut [u8] {
        &mut self.data.0[..len.min(N)]
    }

    pub(crate) fn receive_bytes(&self, len: usize) -> &[u8] {
        &self.data.0[..len.min(N)]
    }

    /// Rewinds the cursor for a freshly received payload of `len` bytes.
    pub(crate) fn begin_reading(&mut self, len: usize) {
        self.pos = 0;
        self.packet_end = 0;
        self.len = len.min(N);
    }

    fn take(&self, len: usize) -> Result<usize, CodecError> {
        let available = self.remaining();
        if len > available {
            return Err(CodecError::Truncated {
                needed: len,
                available,
            });
        }
        Ok(self.pos)
    }
}

impl<const N: usize> Default for RxBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
