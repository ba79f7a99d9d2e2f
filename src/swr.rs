//! Sharp-wave-ripple candidate loading and filtering.
//!
//! Candidate boundaries come from an external ripple detector as parallel
//! start/stop arrays.  They are
//!
//! 1. validated (fail fast: a malformed detector output aborts the session),
//! 2. merged so overlapping detections become one event,
//! 3. intersected with the valid recording window,
//! 4. optionally stripped of events shorter than a minimum duration.
use crate::epoch::Epoch;
use crate::error::{Error, Result};
use crate::stats::rate;
use crate::task::{Phase, PhaseEpochs};
use std::collections::BTreeMap;
use tracing::debug;

/// Validate raw detector output.
///
/// # Errors
///
/// [`Error::MalformedInput`] for mismatched array lengths, non-finite values
/// or an inverted interval.  No event is silently dropped.
pub fn candidates_from_arrays(starts: &[f64], stops: &[f64]) -> Result<Epoch> {
    Epoch::from_pairs(starts, stops).map_err(|e| match e {
        Error::MalformedInput { reason, .. } => Error::malformed("SWR candidates", reason),
        other => other,
    })
}

/// Merge, restrict to `valid` and drop events shorter than `min_duration`.
///
/// The result is disjoint and chronologically ordered.  A `min_duration` of
/// `0.0` keeps every event of the intersection.
pub fn filter_candidates(raw: &Epoch, valid: &Epoch, min_duration: f64) -> Epoch {
    let merged = raw.merge();
    let inside = merged.intersect(&valid.merge());
    let (starts, stops): (Vec<f64>, Vec<f64>) =
        inside.iter().filter(|(s, e)| e - s >= min_duration).unzip();
    debug!(
        raw = raw.len(),
        merged = merged.len(),
        in_window = inside.len(),
        kept = starts.len(),
        "filtered SWR candidates"
    );
    // Sub-intervals of an already valid epoch.
    Epoch::from_pairs(&starts, &stops).unwrap_or_default()
}

/// Indices of the events whose centre lies inside each phase.
///
/// Every event belongs to at most one phase.  A centre on the boundary
/// shared by two phases goes to the earlier one.
pub fn events_by_phase(swrs: &Epoch, phases: &PhaseEpochs) -> BTreeMap<Phase, Vec<usize>> {
    let mut by_phase: BTreeMap<Phase, Vec<usize>> =
        phases.iter().map(|(phase, _)| (phase, Vec::new())).collect();
    for (i, c) in swrs.centers().into_iter().enumerate() {
        if let Some((phase, _)) = phases.iter().find(|(_, epoch)| epoch.contains(c)) {
            by_phase.entry(phase).or_default().push(i);
        }
    }
    by_phase
}

/// Sub-epoch made of the given event indices.
pub fn select_events(swrs: &Epoch, indices: &[usize]) -> Epoch {
    let (starts, stops): (Vec<f64>, Vec<f64>) = indices
        .iter()
        .filter_map(|&i| swrs.get(i))
        .flat_map(|e| e.iter().collect::<Vec<_>>())
        .unzip();
    Epoch::from_pairs(&starts, &stops).unwrap_or_default()
}

/// Count and timing of SWRs within one phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwrPhaseSummary {
    pub count: usize,
    /// Sum of event durations in seconds.
    pub total_duration: f64,
    /// `None` when the phase has no events.
    pub mean_duration: Option<f64>,
    /// Events per second of phase time; `None` for a zero-length phase.
    pub rate: Option<f64>,
}

/// Per-phase SWR summaries in chronological phase order.
pub fn phase_summaries(swrs: &Epoch, phases: &PhaseEpochs) -> BTreeMap<Phase, SwrPhaseSummary> {
    let durations = swrs.durations();
    events_by_phase(swrs, phases)
        .into_iter()
        .map(|(phase, idx)| {
            let total: f64 = idx.iter().map(|&i| durations[i]).sum();
            let count = idx.len();
            let summary = SwrPhaseSummary {
                count,
                total_duration: total,
                mean_duration: (count > 0).then(|| total / count as f64),
                rate: rate(count, phases.get(phase).total_duration()),
            };
            (phase, summary)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phases() -> PhaseEpochs {
        let starts: Vec<f64> = (0..7).map(|i| i as f64 * 10.0).collect();
        let stops: Vec<f64> = starts.iter().map(|s| s + 10.0).collect();
        PhaseEpochs::from_bounds(&starts, &stops).unwrap()
    }

    #[test]
    fn malformed_detector_output_is_fatal() {
        let err = candidates_from_arrays(&[1.0, 2.0], &[1.5]).unwrap_err();
        match err {
            Error::MalformedInput { what, .. } => assert_eq!(what, "SWR candidates"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(candidates_from_arrays(&[2.0], &[1.0]).is_err());
    }

    #[test]
    fn overlapping_candidates_merge() {
        let raw = candidates_from_arrays(&[1.0, 1.05, 3.0], &[1.1, 1.2, 3.1]).unwrap();
        let valid = Epoch::interval(0.0, 70.0).unwrap();
        let swrs = filter_candidates(&raw, &valid, 0.02);
        assert_eq!(swrs.len(), 2);
        approx::assert_abs_diff_eq!(swrs.stops()[0], 1.2);
    }

    #[test]
    fn events_outside_recording_are_clipped_or_dropped() {
        let raw = candidates_from_arrays(&[-1.0, 69.95, 80.0], &[0.5, 70.5, 81.0]).unwrap();
        let valid = Epoch::interval(0.0, 70.0).unwrap();
        let swrs = filter_candidates(&raw, &valid, 0.02);
        assert_eq!(swrs.len(), 2);
        assert_eq!(swrs.starts()[0], 0.0);
        assert_eq!(swrs.stops()[1], 70.0);
    }

    #[test]
    fn short_events_dropped() {
        let raw = candidates_from_arrays(&[1.0, 2.0], &[1.01, 2.1]).unwrap();
        let valid = Epoch::interval(0.0, 10.0).unwrap();
        assert_eq!(filter_candidates(&raw, &valid, 0.02).len(), 1);
    }

    #[test]
    fn default_config_keeps_short_events() {
        let raw = candidates_from_arrays(&[10.0], &[10.015]).unwrap();
        let valid = Epoch::interval(0.0, 100.0).unwrap();
        let cfg = crate::config::AnalysisConfig::default();
        let swrs = filter_candidates(&raw, &valid, cfg.min_swr_duration);
        assert_eq!(swrs.len(), 1);
        approx::assert_abs_diff_eq!(swrs.durations()[0], 0.015, epsilon = 1e-12);
    }

    #[test]
    fn boundary_event_counted_once() {
        let swrs = candidates_from_arrays(&[9.95, 19.9], &[10.05, 20.1]).unwrap();
        let by_phase = events_by_phase(&swrs, &phases());
        assert_eq!(by_phase[&Phase::PreRecord], vec![0]);
        assert_eq!(by_phase[&Phase::Phase1], vec![1]);
        assert!(by_phase[&Phase::PauseA].is_empty());
        let total: usize = by_phase.values().map(Vec::len).sum();
        assert_eq!(total, swrs.len());

        let summaries = phase_summaries(&swrs, &phases());
        let counted: usize = summaries.values().map(|s| s.count).sum();
        assert_eq!(counted, 2);
    }

    #[test]
    fn phase_assignment_by_center() {
        let swrs = candidates_from_arrays(&[1.0, 9.95, 45.0], &[1.1, 10.15, 45.1]).unwrap();
        let by_phase = events_by_phase(&swrs, &phases());
        assert_eq!(by_phase[&Phase::PreRecord], vec![0]);
        assert_eq!(by_phase[&Phase::Phase1], vec![1]);
        assert_eq!(by_phase[&Phase::PauseB], vec![2]);
        assert!(by_phase[&Phase::Phase3].is_empty());
    }

    #[test]
    fn summaries_guard_empty_phases() {
        let swrs = candidates_from_arrays(&[1.0, 2.0], &[1.1, 2.3]).unwrap();
        let s = phase_summaries(&swrs, &phases());
        let pre = s[&Phase::PreRecord];
        assert_eq!(pre.count, 2);
        approx::assert_abs_diff_eq!(pre.mean_duration.unwrap(), 0.2, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(pre.rate.unwrap(), 0.2, epsilon = 1e-12);
        let post = s[&Phase::PostRecord];
        assert_eq!(post.count, 0);
        assert_eq!(post.mean_duration, None);
        assert_eq!(post.rate, Some(0.0));
    }

    #[test]
    fn select_events_by_index() {
        let swrs = candidates_from_arrays(&[1.0, 2.0, 3.0], &[1.1, 2.1, 3.1]).unwrap();
        let sel = select_events(&swrs, &[0, 2]);
        assert_eq!(sel.starts(), &[1.0, 3.0]);
        assert!(select_events(&swrs, &[]).is_empty());
    }
}
