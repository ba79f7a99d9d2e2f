//! Replay detection: correlation of SWR firing order against place order.
//!
//! ```text
//! swrs ──► correlation::correlate_events  (per trajectory, shared RNG)
//!             │
//!             └─► classify::ReplayClassification
//!                   ├─ replays(traj)          percentile ≤ sig ∨ ≥ 100 − sig
//!                   └─ exclusive(category)    both / only familiar / only shortcut
//! ```
pub mod classify;
pub mod correlation;

pub use classify::{is_significant, ReplayClassification};
pub use correlation::{correlate_event, correlate_events, firing_sequence, EventCorrelation};

use crate::config::AnalysisConfig;
use crate::ensemble::{NeuronEnsemble, PlaceOrder};
use crate::epoch::Epoch;
use crate::task::Trajectory;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::debug;

/// Correlation results and classification of every SWR of a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplayAnalysis {
    pub correlations: BTreeMap<Trajectory, Vec<EventCorrelation>>,
    pub classification: ReplayClassification,
}

/// Test every event against every trajectory that has a place order.
///
/// Trajectories are processed in [`Trajectory::ALL`] order and events in
/// ascending order, so the result is reproducible from the RNG seed.
pub fn detect_replays<R: Rng + ?Sized>(
    ensemble: &NeuronEnsemble,
    orders: &BTreeMap<Trajectory, PlaceOrder>,
    swrs: &Epoch,
    cfg: &AnalysisConfig,
    rng: &mut R,
) -> ReplayAnalysis {
    let mut correlations = BTreeMap::new();
    for traj in Trajectory::ALL {
        let Some(order) = orders.get(&traj) else { continue };
        let events = correlate_events(ensemble, order, swrs, cfg, rng);
        debug!(
            trajectory = traj.name(),
            events = events.len(),
            defined = events.iter().filter(|e| e.is_defined()).count(),
            "correlated SWRs"
        );
        correlations.insert(traj, events);
    }
    let classification = ReplayClassification::from_correlations(&correlations, cfg.significant);
    ReplayAnalysis { correlations, classification }
}
