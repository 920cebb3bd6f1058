//! Telemetry counters for the draw orchestrator. Cheap to update on the
//! submission thread, snapshot whenever profiling wants them.

/// Counters over the lifetime of a [`crate::Draw`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    /// Flushes forced by a state change while a batch was pending.
    pub state_flushes: u64,
    /// Batches submitted as draw calls.
    pub batches_drawn: u64,
    /// Total vertices covered by those draw calls.
    pub vertices_drawn: u64,
    /// Out-of-band frame submissions forced by vertex-region exhaustion.
    pub forced_frame_submissions: u64,
}
