//! Context construction parameters.

/// Tuning knobs for a [`crate::Context`].
///
/// The defaults carry the tuning the renderer shipped with; they are
/// fields rather than constants so integrations can size the transient
/// rings for their workload.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Capacity of the transient ring buffer backing constant data and
    /// dynamic geometry, in bytes.
    pub transient_ring_capacity: usize,
    /// Capacity of the occlusion-query result ring buffer, in bytes.
    pub query_ring_capacity: usize,
    /// Alignment of constant-buffer allocations in the transient ring.
    pub constant_alignment: usize,
    /// Alignment of query-result slots in the query ring.
    pub query_alignment: usize,
    /// Minimum bytes kept contiguous by every transient allocation.
    ///
    /// Shaders may declare a constant buffer larger than the data the
    /// engine actually binds; reserving this floor keeps such tail reads
    /// inside the ring. Allocations smaller than the floor wrap as if they
    /// were this large.
    pub transient_reservation_floor: usize,
    /// Number of frames that may be in flight at once.
    pub frame_queue_depth: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            transient_ring_capacity: 16 * 1024 * 1024,
            query_ring_capacity: 32 * 1024,
            constant_alignment: 256,
            query_alignment: 8,
            transient_reservation_floor: 1424,
            frame_queue_depth: 3,
        }
    }
}
