//! Transient ring-buffer allocator.
//!
//! One large GPU buffer is carved into short-lived allocations that stay
//! alive for at most `frame_queue_depth` frames. Usage and wrap padding are
//! accounted per frame slot so a slot's space is reclaimed wholesale when
//! its frame retires.

use crate::error::ContextError;
use dxmetal_metal::{BufferHandle, MtlBuffer};
use tracing::{error, warn};

/// A per-frame-slot transient allocator over one GPU buffer.
pub struct RingBuffer {
    buffer: BufferHandle,
    capacity: usize,
    reservation_floor: usize,
    position: usize,
    used: Vec<usize>,
    padding: Vec<usize>,
}

impl RingBuffer {
    /// Wraps `buffer` as a ring serving `frame_slots` in-flight frames.
    ///
    /// `reservation_floor` is the minimum contiguous span every allocation
    /// reserves before wrapping; see
    /// [`crate::ContextConfig::transient_reservation_floor`].
    pub fn new(buffer: BufferHandle, frame_slots: usize, reservation_floor: usize) -> RingBuffer {
        let capacity = buffer.length();
        RingBuffer {
            buffer,
            capacity,
            reservation_floor,
            position: 0,
            used: vec![0; frame_slots],
            padding: vec![0; frame_slots],
        }
    }

    /// The underlying GPU buffer.
    pub fn buffer(&self) -> &BufferHandle {
        &self.buffer
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Allocates `size` bytes at `alignment` on behalf of `frame_slot` and
    /// returns the byte offset.
    ///
    /// The allocation never spans the buffer end: when the aligned cursor
    /// plus `max(size, reservation_floor)` passes the end, the tail is
    /// consumed as padding and the allocation restarts at offset zero.
    /// A request larger than the whole ring fails; a live offset there
    /// would alias in-flight data at the buffer head.
    pub fn allocate(
        &mut self,
        frame_slot: usize,
        size: usize,
        alignment: usize,
    ) -> Result<usize, ContextError> {
        debug_assert!(alignment.is_power_of_two());
        let reserved = size.max(self.reservation_floor);
        if reserved > self.capacity {
            error!(
                size,
                capacity = self.capacity,
                "transient allocation exceeds ring capacity"
            );
            return Err(ContextError::TransientAllocationTooLarge {
                size: reserved,
                capacity: self.capacity,
            });
        }

        let mut aligned = (self.position + alignment - 1) & !(alignment - 1);
        let mut pad = aligned - self.position;

        if aligned + reserved > self.capacity {
            // Wrap: everything from the cursor to the end becomes padding.
            pad = self.capacity - self.position;
            aligned = 0;
        }

        self.position = aligned + size;
        self.used[frame_slot] += size;
        self.padding[frame_slot] += pad;
        self.validate_usage();

        Ok(aligned)
    }

    /// Allocates and writes `data` in one step, returning the byte offset.
    pub fn write(
        &mut self,
        frame_slot: usize,
        data: &[u8],
        alignment: usize,
    ) -> Result<usize, ContextError> {
        let offset = self.allocate(frame_slot, data.len(), alignment)?;
        self.buffer.write(offset, data)?;
        Ok(offset)
    }

    /// Reclaims the retiring slot's space and opens accounting for the
    /// upcoming one.
    ///
    /// `current` is the slot whose frame has fully retired on the GPU;
    /// `next` is the slot the new frame will allocate under.
    pub fn on_frame_start(&mut self, current: usize, next: usize) {
        self.used[current] = 0;
        self.padding[next] = 0;
    }

    /// Bytes currently attributed to `frame_slot` (excluding padding).
    pub fn used(&self, frame_slot: usize) -> usize {
        self.used[frame_slot]
    }

    /// Wrap/alignment padding currently attributed to `frame_slot`.
    pub fn padding(&self, frame_slot: usize) -> usize {
        self.padding[frame_slot]
    }

    // Soft invariant: everything attributed across slots fits the ring.
    // Overcommit means in-flight frames may read overwritten data; the
    // renderer keeps going, so this only warns.
    fn validate_usage(&self) {
        let total: usize = self
            .used
            .iter()
            .zip(self.padding.iter())
            .map(|(u, p)| u + p)
            .sum();
        if total > self.capacity {
            warn!(
                total,
                capacity = self.capacity,
                "transient ring overcommitted, rendering artifacts expected"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxmetal_metal::testing::RecordingDevice;
    use dxmetal_metal::{MtlDevice, StorageMode};

    fn ring(capacity: usize, floor: usize) -> RingBuffer {
        let device = RecordingDevice::new();
        let buffer = device
            .new_buffer(capacity, StorageMode::Shared)
            .expect("ring buffer");
        RingBuffer::new(buffer, 3, floor)
    }

    fn alloc(ring: &mut RingBuffer, slot: usize, size: usize, alignment: usize) -> usize {
        ring.allocate(slot, size, alignment).expect("allocate")
    }

    #[test]
    fn allocations_are_aligned_and_sequential() {
        let mut ring = ring(4096, 0);

        assert_eq!(alloc(&mut ring, 0, 100, 256), 0);
        // Cursor is at 100; the next 256-aligned offset is 256.
        assert_eq!(alloc(&mut ring, 0, 10, 256), 256);
        assert_eq!(alloc(&mut ring, 0, 10, 2), 266);

        assert_eq!(ring.used(0), 120);
        assert_eq!(ring.padding(0), 156);
    }

    #[test]
    fn wrapping_allocation_never_spans_the_end() {
        let mut ring = ring(1024, 0);

        assert_eq!(alloc(&mut ring, 0, 1000, 4), 0);
        // 64 bytes do not fit in the 24-byte tail; the tail becomes padding.
        assert_eq!(alloc(&mut ring, 0, 64, 4), 0);
        assert_eq!(ring.used(0), 1064);
        assert_eq!(ring.padding(0), 24);
    }

    #[test]
    fn reservation_floor_forces_early_wrap() {
        let mut ring = ring(1024, 512);

        assert_eq!(alloc(&mut ring, 0, 600, 4), 0);
        // 16 bytes would fit the tail, but the floor reserves 512.
        assert_eq!(alloc(&mut ring, 0, 16, 4), 0);
        assert_eq!(ring.padding(0), 1024 - 600);
    }

    #[test]
    fn frame_start_reclaims_retired_slot() {
        let mut ring = ring(1024, 0);

        alloc(&mut ring, 0, 100, 4);
        alloc(&mut ring, 1, 200, 4);
        ring.on_frame_start(0, 2);

        assert_eq!(ring.used(0), 0);
        assert_eq!(ring.used(1), 200);
        assert_eq!(ring.used(2), 0);
        assert_eq!(ring.padding(2), 0);
    }

    #[test]
    fn usage_survives_multiple_frame_cycles() {
        let mut ring = ring(4096, 0);

        // Simulate several frames of allocate + retire across 3 slots.
        for frame in 0..12usize {
            let slot = frame % 3;
            let next = (frame + 1) % 3;
            for _ in 0..4 {
                alloc(&mut ring, slot, 300, 16);
            }
            assert_eq!(ring.used(slot), 1200);
            ring.on_frame_start(slot, next);
            assert_eq!(ring.used(slot), 0);
        }
    }

    #[test]
    fn oversized_allocation_is_rejected() {
        let mut ring = ring(256, 0);

        assert!(matches!(
            ring.allocate(0, 512, 4),
            Err(ContextError::TransientAllocationTooLarge { size: 512, capacity: 256 })
        ));
        // Nothing was handed out or accounted.
        assert_eq!(ring.used(0), 0);
        assert_eq!(ring.padding(0), 0);
        assert_eq!(alloc(&mut ring, 0, 64, 4), 0);
    }

    #[test]
    fn reservation_floor_counts_against_the_capacity_check() {
        let mut ring = ring(256, 1024);
        assert!(ring.allocate(0, 16, 4).is_err());
    }

    #[test]
    fn write_copies_into_the_backing_buffer() {
        let mut ring = ring(1024, 0);
        let offset = ring.write(0, &[7u8; 32], 256).expect("write");
        assert_eq!(offset, 0);
        assert_eq!(ring.buffer().read(0, 32).expect("read"), vec![7u8; 32]);
    }
}
