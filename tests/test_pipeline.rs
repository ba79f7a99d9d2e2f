mod common;

use approx::assert_abs_diff_eq;
use common::*;
use ndarray::Array2;
use swrdecode::tuning::linear_tuning_curves;
use swrdecode::{
    analyze_session, run_inputs, AnalysisConfig, Epoch, Error, Exclusivity, Phase, Trajectory,
    TuningCurves,
};

fn cfg() -> AnalysisConfig {
    AnalysisConfig { n_shuffles: 100, seed: 11, ..Default::default() }
}

#[test]
fn forward_events_replay_the_familiar_route() {
    let input = synthetic_session("R001-d1");
    let out = analyze_session(&input, &cfg(), 0).unwrap();

    assert_eq!(out.swrs.len(), 24);
    assert_eq!(out.kept_neurons.len(), N_CELLS);

    let familiar = &out.replay.correlations[&Trajectory::Familiar];
    for &t0 in &forward_event_starts() {
        let idx = out.swrs.starts().iter().position(|&s| s == t0).unwrap();
        assert_abs_diff_eq!(familiar[idx].correlation, 1.0, epsilon = 1e-12);
        assert_eq!(out.replay.classification.category_of(idx), Some(Exclusivity::OnlyFamiliar));
    }
    assert!(out.replay_epoch(Trajectory::Familiar).len() >= forward_event_starts().len());
}

#[test]
fn exclusivity_partitions_replays() {
    let out = analyze_session(&synthetic_session("R001-d1"), &cfg(), 0).unwrap();
    let cls = &out.replay.classification;
    let mut seen = vec![0usize; out.swrs.len()];
    for cat in Exclusivity::ALL {
        for &i in cls.exclusive(cat) {
            seen[i] += 1;
        }
    }
    assert!(seen.iter().all(|&n| n <= 1));
    let union: usize = seen.iter().sum();
    assert!(union <= out.swrs.len());
    let any_replay = (0..out.swrs.len())
        .filter(|i| {
            cls.replays(Trajectory::Familiar).contains(i)
                || cls.replays(Trajectory::Shortcut).contains(i)
        })
        .count();
    assert_eq!(union, any_replay);
}

#[test]
fn replay_proportions_by_phase() {
    let out = analyze_session(&synthetic_session("R001-d1"), &cfg(), 0).unwrap();
    let counts = &out.metrics.replay_counts;

    let pause_a = &counts[&Phase::PauseA];
    assert_eq!(pause_a.n_swrs, 16);
    assert!(pause_a.replays[&Trajectory::Familiar] >= 8);

    assert_eq!(counts[&Phase::PauseB].n_swrs, 8);
    assert_abs_diff_eq!(counts[&Phase::PauseB].proportion(Trajectory::Familiar).unwrap(), 1.0);
    assert_eq!(counts[&Phase::Phase1].proportion(Trajectory::Familiar), None);

    let summary = &out.swr_summary[&Phase::PauseB];
    assert_eq!(summary.count, 8);
    assert_abs_diff_eq!(summary.mean_duration.unwrap(), EVENT_LEN, epsilon = 1e-9);
}

#[test]
fn likelihood_curves_follow_replay_content() {
    let out = analyze_session(&synthetic_session("R001-d1"), &cfg(), 0).unwrap();
    let familiar = &out.metrics.likelihood[&Trajectory::Familiar];
    for phase in Phase::ALL {
        assert_eq!(familiar[&phase].len(), 100);
    }
    let pause_b = &familiar[&Phase::PauseB];
    assert!(pause_b.iter().any(|v| v.is_finite()));
    let finite_sum: f64 = pause_b.iter().filter(|v| v.is_finite()).sum();
    assert_abs_diff_eq!(finite_sum, 1.0, epsilon = 1e-6);
    assert!(familiar[&Phase::Phase1].iter().all(|v| v.is_nan()));
}

#[test]
fn decoding_error_is_small_while_running() {
    let out = analyze_session(&synthetic_session("R001-d1"), &cfg(), 0).unwrap();
    let err = &out.metrics.errors[&Trajectory::Familiar];
    assert!(err.len() > 100, "only {} aligned bins", err.len());
    assert!(err.mean() < 10.0, "mean error {}", err.mean());
    assert!(err.median() <= err.mean() + 10.0);
    let binned = err.binned(&cfg().position_edges());
    assert_eq!(binned.len(), 100);
}

#[test]
fn tuning_curves_estimated_from_running() {
    let input = synthetic_session("R001-d1");
    let cfg = cfg();
    let task = input.phases.get(Phase::Phase1).join(input.phases.get(Phase::Phase2));
    let running = input.position.running_epochs(cfg.speed_threshold, cfg.speed_smoothing);
    let running = running.intersect(&task);
    assert!(!running.is_empty());

    let tc = linear_tuning_curves(&input.ensemble, &input.position, &running, &cfg).unwrap();
    assert_eq!(tc.n_neurons(), N_CELLS);
    assert_eq!(tc.n_bins(), 100);
    for cell in 0..N_CELLS {
        let centre = field_centre(cell) as usize;
        let far = (centre + 30) % 100;
        let rates = tc.neuron(cell);
        assert!(rates[centre] > 20.0, "cell {cell}: {} at its centre", rates[centre]);
        assert_abs_diff_eq!(rates[far], 0.0, epsilon = 1e-9);
    }
}

#[test]
fn empty_swr_epoch_gives_empty_replays() {
    let mut input = synthetic_session("R001-d1");
    input.swr_candidates = Epoch::empty();
    let out = analyze_session(&input, &cfg(), 0).unwrap();
    assert!(out.swrs.is_empty());
    for traj in Trajectory::ALL {
        assert!(out.replay_epoch(traj).is_empty());
        for curve in out.metrics.likelihood[&traj].values() {
            assert_eq!(curve.len(), 100);
            assert!(curve.iter().all(|v| v.is_nan()));
        }
    }
    for cat in Exclusivity::ALL {
        assert!(out.exclusive_epoch(cat).is_empty());
    }
}

#[test]
fn same_seed_same_result() {
    let input = synthetic_session("R001-d1");
    let a = analyze_session(&input, &cfg(), 3).unwrap();
    let b = analyze_session(&input, &cfg(), 3).unwrap();
    assert_eq!(a.replay.correlations, b.replay.correlations);
    assert_eq!(a.replay.classification, b.replay.classification);
}

#[test]
fn failing_session_does_not_abort_batch() {
    let good = synthetic_session("R001-d1");
    let mut bad = synthetic_session("R002-d1");
    let short = TuningCurves::new(Array2::zeros((N_CELLS, 50)), 50).unwrap();
    bad.tuning.insert(Trajectory::Shortcut, short);
    let also_good = synthetic_session("R003-d1");

    let report = run_inputs(&[good, bad, also_good], &cfg());
    assert_eq!(report.outputs.len(), 2);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.session, "R002-d1");
    assert_eq!(failure.stage, "tuning curves");
    assert!(matches!(failure.error, Error::BinMismatch { expected: 100, got: 50 }));

    assert_eq!(report.group.sessions, vec!["R001-d1", "R003-d1"]);
    let pause_b = &report.group.replay_counts[&Phase::PauseB];
    assert_eq!(pause_b.n_swrs, 16);
}
