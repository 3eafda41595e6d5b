//! Snapshot -> fixed-length state vector

use te_common::NetworkStateSnapshot;

/// Encodes snapshots into `state_size`-long vectors.
///
/// Layout: up to `state_size / 3` link utilizations, then up to that many
/// flow counts, then queue depths, zero-padded on the right. Missing or
/// short series just leave more zeros; encoding never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateVectorBuilder {
    state_size: usize,
}

impl StateVectorBuilder {
    /// Builder producing vectors of length `state_size`
    pub fn new(state_size: usize) -> Self {
        Self { state_size }
    }

    /// Output length
    pub fn state_size(&self) -> usize {
        self.state_size
    }

    /// Values taken from each segment
    #[inline]
    pub fn segment_len(&self) -> usize {
        self.state_size / 3
    }

    /// Encode one snapshot
    pub fn build(&self, snapshot: &NetworkStateSnapshot) -> Vec<f64> {
        let seg = self.segment_len();
        let mut state = Vec::with_capacity(self.state_size.max(3 * seg));
        for series in [
            &snapshot.link_utilizations,
            &snapshot.flow_counts,
            &snapshot.queue_depths,
        ] {
            state.extend(series.iter().take(seg).copied());
        }
        state.resize(self.state_size, 0.0);
        state
    }
}
