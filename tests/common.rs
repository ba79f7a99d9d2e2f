use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::PathBuf;
use swrdecode::{
    Epoch, NeuronEnsemble, PhaseEpochs, Position, SessionInput, SpikeTrain, Trajectory,
    TuningCurves,
};

/// Seconds per phase; phases are back to back from t = 0.
pub const PHASE_LEN: f64 = 100.0;
/// Position samples per second.
pub const POSITION_RATE: f64 = 30.0;
pub const N_CELLS: usize = 10;
/// Half width of a place field, in position units.
pub const FIELD_HALF_WIDTH: f64 = 8.0;

/// Permutation of field centres used for the shortcut trajectory.
const SHORTCUT_PERM: [usize; N_CELLS] = [3, 7, 0, 9, 5, 1, 8, 2, 6, 4];

#[allow(unused)]
pub fn field_centre(cell: usize) -> f64 {
    5.0 + 10.0 * cell as f64
}

#[allow(unused)]
pub fn phases() -> PhaseEpochs {
    let starts: Vec<f64> = (0..7).map(|i| i as f64 * PHASE_LEN).collect();
    let stops: Vec<f64> = starts.iter().map(|s| s + PHASE_LEN).collect();
    PhaseEpochs::from_bounds(&starts, &stops).unwrap()
}

/// Task phases are 1, 3 and 5 (phase1, phase2, phase3).
fn is_task_phase(t: f64) -> bool {
    let idx = (t / PHASE_LEN).floor() as i64;
    matches!(idx, 1 | 3 | 5)
}

/// Back-and-forth laps at 20 units/s during task phases, parked at the
/// track centre otherwise.
#[allow(unused)]
pub fn linear_position() -> Position {
    let n = (7.0 * PHASE_LEN * POSITION_RATE) as usize;
    let time: Vec<f64> = (0..n).map(|i| i as f64 / POSITION_RATE).collect();
    let x: Vec<f64> = time
        .iter()
        .map(|&t| {
            if !is_task_phase(t) {
                return 50.0;
            }
            let lap = (t - (t / PHASE_LEN).floor() * PHASE_LEN) % 10.0;
            if lap < 5.0 { 20.0 * lap } else { 100.0 - 20.0 * (lap - 5.0) }
        })
        .collect();
    Position::linear(time, x).unwrap()
}

fn gaussian_curves(centres: &[f64]) -> TuningCurves {
    let rates = Array2::from_shape_fn((centres.len(), 100), |(n, b)| {
        let z = (b as f64 + 0.5 - centres[n]) / (FIELD_HALF_WIDTH / 2.0);
        15.0 * (-0.5 * z * z).exp()
    });
    TuningCurves::new(rates, 100).unwrap()
}

#[allow(unused)]
pub fn tuning_curves() -> BTreeMap<Trajectory, TuningCurves> {
    let familiar: Vec<f64> = (0..N_CELLS).map(field_centre).collect();
    let shortcut: Vec<f64> = SHORTCUT_PERM.iter().map(|&p| field_centre(p)).collect();
    let mut out = BTreeMap::new();
    out.insert(Trajectory::Familiar, gaussian_curves(&familiar));
    out.insert(Trajectory::Shortcut, gaussian_curves(&shortcut));
    out
}

/// Start times of the forward (familiar-ordered) events in each pause.
#[allow(unused)]
pub fn forward_event_starts() -> Vec<f64> {
    [2.0, 4.0]
        .iter()
        .flat_map(|&p| (0..8).map(move |k| p * PHASE_LEN + 10.0 + 5.0 * k as f64))
        .collect()
}

/// Start times of events whose firing order is scrambled.
#[allow(unused)]
pub fn scrambled_event_starts() -> Vec<f64> {
    (0..8).map(|k| 2.0 * PHASE_LEN + 60.0 + 5.0 * k as f64).collect()
}

pub const EVENT_LEN: f64 = 0.12;

/// Place cells that fire on every position sample inside their field while
/// running, plus one spike each inside every replay event.
#[allow(unused)]
pub fn ensemble(position: &Position) -> NeuronEnsemble {
    let mut spikes: Vec<Vec<f64>> = vec![Vec::new(); N_CELLS];
    for (&t, &x) in position.time().iter().zip(position.x().iter()) {
        if !is_task_phase(t) {
            continue;
        }
        for (cell, train) in spikes.iter_mut().enumerate() {
            if (x - field_centre(cell)).abs() < FIELD_HALF_WIDTH {
                train.push(t + 0.001 * cell as f64);
            }
        }
    }
    for t0 in forward_event_starts() {
        for (cell, train) in spikes.iter_mut().enumerate() {
            train.push(t0 + 0.01 * (cell + 1) as f64);
        }
    }
    for (k, t0) in scrambled_event_starts().into_iter().enumerate() {
        for (cell, train) in spikes.iter_mut().enumerate() {
            let slot = (cell * 7 + k * 3) % N_CELLS;
            train.push(t0 + 0.01 * (slot + 1) as f64);
        }
    }
    NeuronEnsemble::new(
        spikes
            .into_iter()
            .enumerate()
            .map(|(i, s)| SpikeTrain::new(format!("cell_{i}"), s).unwrap())
            .collect(),
    )
}

#[allow(unused)]
pub fn swr_candidates() -> Epoch {
    let starts: Vec<f64> =
        forward_event_starts().into_iter().chain(scrambled_event_starts()).collect();
    let stops: Vec<f64> = starts.iter().map(|s| s + EVENT_LEN).collect();
    Epoch::from_pairs(&starts, &stops).unwrap()
}

/// A complete synthetic session with place cells and replay events.
#[allow(unused)]
pub fn synthetic_session(name: &str) -> SessionInput {
    let position = linear_position();
    SessionInput {
        name: name.to_string(),
        swr_candidates: swr_candidates(),
        ensemble: ensemble(&position),
        tuning: tuning_curves(),
        position,
        phases: phases(),
    }
}

/// A fresh, empty scratch directory unique to this test process.
#[allow(unused)]
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("swrdecode-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
