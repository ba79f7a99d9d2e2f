//! Replay classification from shuffle percentiles.
use super::correlation::EventCorrelation;
use crate::epoch::Epoch;
use crate::swr::select_events;
use crate::task::{Exclusivity, Trajectory};
use std::collections::BTreeMap;

/// Two-tailed significance: `percentile ≤ threshold` or
/// `percentile ≥ 100 − threshold`.  NaN is never significant.
#[inline]
pub fn is_significant(percentile: f64, threshold: f64) -> bool {
    percentile <= threshold || percentile >= 100.0 - threshold
}

/// Replay membership of every event of a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplayClassification {
    n_events: usize,
    /// Ascending event indices that replay each trajectory.
    replays: BTreeMap<Trajectory, Vec<usize>>,
    /// Ascending event indices per exclusivity category.  The categories
    /// are pairwise disjoint.
    exclusive: BTreeMap<Exclusivity, Vec<usize>>,
}

impl ReplayClassification {
    /// Classify events given one correlation result per event per
    /// trajectory.  A trajectory missing from `correlations` replays nothing.
    pub fn from_correlations(
        correlations: &BTreeMap<Trajectory, Vec<EventCorrelation>>,
        threshold: f64,
    ) -> Self {
        let n_events = correlations.values().map(Vec::len).max().unwrap_or(0);
        let flags: BTreeMap<Trajectory, Vec<bool>> = Trajectory::ALL
            .into_iter()
            .map(|traj| {
                let mut f = vec![false; n_events];
                if let Some(events) = correlations.get(&traj) {
                    for (i, ev) in events.iter().enumerate() {
                        f[i] = is_significant(ev.percentile, threshold);
                    }
                }
                (traj, f)
            })
            .collect();

        let replays = flags
            .iter()
            .map(|(&traj, f)| {
                let idx = f.iter().enumerate().filter(|(_, r)| **r).map(|(i, _)| i).collect();
                (traj, idx)
            })
            .collect();

        let mut exclusive: BTreeMap<Exclusivity, Vec<usize>> =
            Exclusivity::ALL.into_iter().map(|c| (c, Vec::new())).collect();
        let familiar = &flags[&Trajectory::Familiar];
        let shortcut = &flags[&Trajectory::Shortcut];
        for i in 0..n_events {
            if let Some(cat) = Exclusivity::classify(familiar[i], shortcut[i]) {
                exclusive.entry(cat).or_default().push(i);
            }
        }

        Self { n_events, replays, exclusive }
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    pub fn replays(&self, traj: Trajectory) -> &[usize] {
        self.replays.get(&traj).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn exclusive(&self, category: Exclusivity) -> &[usize] {
        self.exclusive.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Exclusivity category of event `idx`, if it replays anything.
    pub fn category_of(&self, idx: usize) -> Option<Exclusivity> {
        let f = self.replays(Trajectory::Familiar).binary_search(&idx).is_ok();
        let s = self.replays(Trajectory::Shortcut).binary_search(&idx).is_ok();
        Exclusivity::classify(f, s)
    }

    /// Events that replay `traj`, as an epoch.
    pub fn replay_epoch(&self, swrs: &Epoch, traj: Trajectory) -> Epoch {
        select_events(swrs, self.replays(traj))
    }

    pub fn exclusive_epoch(&self, swrs: &Epoch, category: Exclusivity) -> Epoch {
        select_events(swrs, self.exclusive(category))
    }
}
