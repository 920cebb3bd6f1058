//! Orchestrator configuration.

/// Tunables for a [`crate::Draw`] instance. The defaults comfortably cover
/// the capability combinations a single guest title exercises; the cache
/// bounds exist so a pathological caller degrades to eviction instead of
/// unbounded growth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawConfig {
    /// Maximum compiled pipelines kept alive; least-recently-used entries
    /// are evicted past this.
    pub max_pipelines: usize,
    /// Maximum cached bind groups.
    pub max_bind_groups: usize,
    /// Frame-in-flight slots; one vertex-storage region is allocated per
    /// slot and never aliased.
    pub frame_slots: usize,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            max_pipelines: 512,
            max_bind_groups: 256,
            frame_slots: 3,
        }
    }
}
