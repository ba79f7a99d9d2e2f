//! Per-session pipeline and the parallel batch runner.
//!
//! ```text
//! SessionInput ─┬─ swr::filter_candidates          raw SWRs ∩ recording window
//!               ├─ NeuronEnsemble::filter_by_rate  drop interneurons / sparse cells
//!               ├─ replay::detect_replays          per trajectory, seeded RNG
//!               ├─ decode::decode_epoch            running epochs → decoding error
//!               ├─ decode::decode_epoch            SWRs → likelihood by phase
//!               └─ aggregate::replay_proportions
//!                    │
//!                    └─→ SessionOutput
//! ```
//!
//! Sessions share nothing mutable, so a batch runs them in parallel and
//! stacks the results in the declared order afterwards.
use crate::aggregate::{
    likelihood_by_phase, replay_proportions, DecodingError, GroupSummary, SessionMetrics,
};
use crate::config::AnalysisConfig;
use crate::decode::{decode_epoch, decode_location, DecodedPosition, Posterior};
use crate::ensemble::{NeuronEnsemble, PlaceOrder, TuningCurves};
use crate::epoch::Epoch;
use crate::error::{Error, Result};
use crate::io::{SafeTensors, StWriter};
use crate::replay::{detect_replays, EventCorrelation, ReplayAnalysis};
use crate::signal::{Position, SpikeTrain};
use crate::swr::{
    candidates_from_arrays, events_by_phase, filter_candidates, phase_summaries, SwrPhaseSummary,
};
use crate::task::{Exclusivity, Phase, PhaseEpochs, Trajectory};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ── Input ────────────────────────────────────────────────────────────────────

/// Everything the pipeline consumes for one recording session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInput {
    pub name: String,
    /// Raw SWR candidates from the ripple detector.
    pub swr_candidates: Epoch,
    pub ensemble: NeuronEnsemble,
    /// One `[N, B]` matrix per trajectory, rows in ensemble order.
    pub tuning: BTreeMap<Trajectory, TuningCurves>,
    /// Linearised position.
    pub position: Position,
    pub phases: PhaseEpochs,
}

impl SessionInput {
    /// Read a session directory:
    ///
    /// | file                         | tensors                              |
    /// |------------------------------|--------------------------------------|
    /// | `swrs.safetensors`           | `start`, `stop`                      |
    /// | `spikes.safetensors`         | `times` (flat), `offsets` (`N + 1`)  |
    /// | `tuning_curves.safetensors`  | `familiar`, `shortcut` (`[N, B]`)    |
    /// | `position.safetensors`       | `time`, `linear`                     |
    /// | `phases.safetensors`         | `start`, `stop` (7 each)             |
    pub fn load(dir: &Path) -> Result<Self> {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());

        let swrs = SafeTensors::read(&dir.join("swrs.safetensors"))?;
        let swr_candidates = candidates_from_arrays(&swrs.f64("start")?, &swrs.f64("stop")?)?;

        let spikes = SafeTensors::read(&dir.join("spikes.safetensors"))?;
        let ensemble = ragged_trains(&spikes.f64("times")?, &spikes.i64("offsets")?)?;

        let tc = SafeTensors::read(&dir.join("tuning_curves.safetensors"))?;
        let mut tuning = BTreeMap::new();
        for traj in Trajectory::ALL {
            let rates = tc.f64_arr2(traj.name())?;
            let n_bins = rates.ncols();
            tuning.insert(traj, TuningCurves::new(rates, n_bins)?);
        }

        let pos = SafeTensors::read(&dir.join("position.safetensors"))?;
        let position = Position::linear(pos.f64("time")?, pos.f64("linear")?)?;

        let ph = SafeTensors::read(&dir.join("phases.safetensors"))?;
        let phases = PhaseEpochs::from_bounds(&ph.f64("start")?, &ph.f64("stop")?)?;

        Ok(Self { name, swr_candidates, ensemble, tuning, position, phases })
    }

    /// Write the session in the layout [`SessionInput::load`] reads.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

        let mut w = StWriter::new();
        w.add_f64_vec("start", self.swr_candidates.starts());
        w.add_f64_vec("stop", self.swr_candidates.stops());
        w.write(&dir.join("swrs.safetensors"))?;

        let mut times = Vec::new();
        let mut offsets = vec![0i64];
        for train in self.ensemble.trains() {
            times.extend_from_slice(train.times());
            offsets.push(times.len() as i64);
        }
        let mut w = StWriter::new();
        w.add_f64_vec("times", &times);
        w.add_i64("offsets", &offsets, &[offsets.len()]);
        w.write(&dir.join("spikes.safetensors"))?;

        let mut w = StWriter::new();
        for (traj, tc) in &self.tuning {
            w.add_f64_arr2(traj.name(), tc.rates());
        }
        w.write(&dir.join("tuning_curves.safetensors"))?;

        let mut w = StWriter::new();
        w.add_f64_vec("time", self.position.time());
        w.add_f64_vec("linear", &self.position.x().to_vec());
        w.write(&dir.join("position.safetensors"))?;

        let (starts, stops): (Vec<f64>, Vec<f64>) = self
            .phases
            .iter()
            .map(|(_, e)| (e.start().unwrap_or(f64::NAN), e.stop().unwrap_or(f64::NAN)))
            .unzip();
        let mut w = StWriter::new();
        w.add_f64_vec("start", &starts);
        w.add_f64_vec("stop", &stops);
        w.write(&dir.join("phases.safetensors"))
    }
}

/// Split a flat spike-time array at `offsets` (`N + 1` entries, starting at
/// 0 and ending at `times.len()`).
fn ragged_trains(times: &[f64], offsets: &[i64]) -> Result<NeuronEnsemble> {
    let bad = |reason: &str| Err(Error::malformed("spike offsets", reason));
    if offsets.first() != Some(&0) || offsets.last() != Some(&(times.len() as i64)) {
        return bad("must start at 0 and end at the number of spikes");
    }
    if offsets.windows(2).any(|w| w[1] < w[0]) {
        return bad("must be non-decreasing");
    }
    let trains = offsets
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            let spikes = times[w[0] as usize..w[1] as usize].to_vec();
            SpikeTrain::new(format!("neuron_{i}"), spikes)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(NeuronEnsemble::new(trains))
}

// ── Output ───────────────────────────────────────────────────────────────────

/// Everything the pipeline produces for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutput {
    pub name: String,
    /// Filtered SWR events.
    pub swrs: Epoch,
    pub swr_summary: BTreeMap<Phase, SwrPhaseSummary>,
    /// Indices (into the input ensemble) of the neurons that passed the
    /// rate filter.
    pub kept_neurons: Vec<usize>,
    pub replay: ReplayAnalysis,
    /// Decoded position during running, per trajectory.
    pub decoded: BTreeMap<Trajectory, DecodedPosition>,
    /// Posterior over position during running, valid bins only.
    pub run_posterior: BTreeMap<Trajectory, Posterior>,
    /// Posterior over position during SWRs, valid bins only.
    pub swr_posterior: BTreeMap<Trajectory, Posterior>,
    pub metrics: SessionMetrics,
}

impl SessionOutput {
    /// Replay epochs of `traj`.
    pub fn replay_epoch(&self, traj: Trajectory) -> Epoch {
        self.replay.classification.replay_epoch(&self.swrs, traj)
    }

    pub fn exclusive_epoch(&self, category: Exclusivity) -> Epoch {
        self.replay.classification.exclusive_epoch(&self.swrs, category)
    }

    /// All outputs as named tensors.
    pub fn to_writer(&self, cfg: &AnalysisConfig) -> StWriter {
        let mut w = StWriter::new();
        w.add_f64_vec("swr_start", self.swrs.starts());
        w.add_f64_vec("swr_stop", self.swrs.stops());
        w.add_indices("kept_neurons", &self.kept_neurons);

        let n_events = self.swrs.len();
        for (traj, events) in &self.replay.correlations {
            let t = traj.name();
            let column = |f: fn(&EventCorrelation) -> f64| -> Vec<f64> {
                events.iter().map(f).collect()
            };
            w.add_f64_vec(&format!("{t}_correlation"), &column(|e| e.correlation));
            w.add_f64_vec(&format!("{t}_pvalue"), &column(|e| e.p_value));
            w.add_f64_vec(&format!("{t}_percentile"), &column(|e| e.percentile));
            let shuffled: Vec<f64> = events.iter().flat_map(|e| e.shuffled.iter().copied()).collect();
            w.add_f64(&format!("{t}_shuffled"), &shuffled, &[n_events, cfg.n_shuffles + 1]);
        }
        for traj in Trajectory::ALL {
            w.add_indices(&format!("{}_replays", traj.name()), self.replay.classification.replays(traj));
        }
        for cat in Exclusivity::ALL {
            w.add_indices(&format!("{}_replays", cat.name()), self.replay.classification.exclusive(cat));
        }

        for (traj, decoded) in &self.decoded {
            w.add_f64_vec(&format!("{}_decoded_time", traj.name()), &decoded.time);
            w.add_f64_vec(&format!("{}_decoded_x", traj.name()), &decoded.x);
        }
        let posteriors = [("run", &self.run_posterior), ("swr", &self.swr_posterior)];
        for (epoch, by_traj) in posteriors {
            for (traj, post) in by_traj {
                let t = traj.name();
                w.add_f64_arr2(&format!("{t}_{epoch}_likelihood"), post.prob());
                w.add_f64_vec(&format!("{t}_{epoch}_likelihood_time"), post.time());
            }
        }
        let edges = cfg.position_edges();
        for (traj, err) in &self.metrics.errors {
            w.add_f64_vec(&format!("{}_error", traj.name()), &err.error);
            w.add_f64_vec(&format!("{}_error_binned", traj.name()), &err.binned(&edges).to_vec());
        }
        for (traj, by_phase) in &self.metrics.likelihood {
            for (phase, curve) in by_phase {
                w.add_f64_vec(&format!("{}_{}_likelihood", traj.name(), phase.name()), &curve.to_vec());
            }
        }
        for (phase, counts) in &self.metrics.replay_counts {
            let mut row = vec![counts.n_swrs as i64];
            row.extend(Trajectory::ALL.iter().map(|t| counts.replays.get(t).copied().unwrap_or(0) as i64));
            row.extend(Exclusivity::ALL.iter().map(|c| counts.exclusive.get(c).copied().unwrap_or(0) as i64));
            w.add_i64(&format!("{}_replay_counts", phase.name()), &row, &[row.len()]);
        }
        w
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// A session that could not be analysed, with the stage that failed.
#[derive(Debug, thiserror::Error)]
#[error("session '{session}' failed during {stage}: {error}")]
pub struct SessionFailure {
    pub session: String,
    pub stage: &'static str,
    #[source]
    pub error: Error,
}

/// Seed of the shuffle RNG for the session at `index` in the declared list.
///
/// SplitMix64 finaliser over the configured seed and the index, so
/// neighbouring sessions get unrelated streams.
pub fn session_seed(seed: u64, index: usize) -> u64 {
    let mut z = seed ^ (index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Run the full pipeline on one session.
///
/// `index` is the session's position in the declared session list and
/// selects its RNG stream.
pub fn analyze_session(
    input: &SessionInput,
    cfg: &AnalysisConfig,
    index: usize,
) -> std::result::Result<SessionOutput, SessionFailure> {
    let fail = |stage: &'static str| {
        let session = input.name.clone();
        move |error: Error| SessionFailure { session, stage, error }
    };

    let valid = input.phases.all();
    let swrs = filter_candidates(&input.swr_candidates, &valid, cfg.min_swr_duration);
    let swr_summary = phase_summaries(&swrs, &input.phases);
    let by_phase = events_by_phase(&swrs, &input.phases);

    let (ensemble, kept_neurons) =
        input.ensemble.filter_by_rate(&valid, cfg.max_mean_rate, cfg.min_n_spikes);
    let tuning = select_tuning(input, &kept_neurons, cfg).map_err(fail("tuning curves"))?;
    let orders: BTreeMap<Trajectory, PlaceOrder> =
        tuning.iter().map(|(&t, tc)| (t, PlaceOrder::from_tuning_curves(tc))).collect();

    let mut rng = ChaCha8Rng::seed_from_u64(session_seed(cfg.seed, index));
    let replay = detect_replays(&ensemble, &orders, &swrs, cfg, &mut rng);

    let task_time = Phase::ALL
        .into_iter()
        .filter(|p| p.is_task())
        .fold(Epoch::empty(), |acc, p| acc.join(input.phases.get(p)))
        .merge();
    let running = input
        .position
        .running_epochs(cfg.speed_threshold, cfg.speed_smoothing)
        .intersect(&task_time);

    let mut decoded = BTreeMap::new();
    let mut run_posteriors = BTreeMap::new();
    let mut swr_posteriors = BTreeMap::new();
    let mut metrics = SessionMetrics::default();
    for (&traj, tc) in &tuning {
        let run_posterior = decode_epoch(&ensemble, tc, &running, cfg).map_err(fail("decoding"))?;
        let run_decoded = decode_location(&run_posterior, cfg);
        metrics.errors.insert(traj, DecodingError::align(&run_decoded, &input.position, &running));
        decoded.insert(traj, run_decoded);
        run_posteriors.insert(traj, run_posterior);

        let swr_posterior = decode_epoch(&ensemble, tc, &swrs, cfg).map_err(fail("decoding"))?;
        let curves = likelihood_by_phase(
            &swr_posterior,
            &swrs,
            replay.classification.replays(traj),
            &by_phase,
        );
        metrics.likelihood.insert(traj, curves);
        swr_posteriors.insert(traj, swr_posterior);
    }
    metrics.replay_counts = replay_proportions(&replay.classification, &by_phase);

    info!(
        session = %input.name,
        swrs = swrs.len(),
        neurons = ensemble.len(),
        familiar = replay.classification.replays(Trajectory::Familiar).len(),
        shortcut = replay.classification.replays(Trajectory::Shortcut).len(),
        "session analysed"
    );

    Ok(SessionOutput {
        name: input.name.clone(),
        swrs,
        swr_summary,
        kept_neurons,
        replay,
        decoded,
        run_posterior: run_posteriors,
        swr_posterior: swr_posteriors,
        metrics,
    })
}

/// Tuning-curve rows of the kept neurons, checked against each other and
/// the configured bin count.
fn select_tuning(
    input: &SessionInput,
    kept: &[usize],
    cfg: &AnalysisConfig,
) -> Result<BTreeMap<Trajectory, TuningCurves>> {
    let mut out = BTreeMap::new();
    for (&traj, tc) in &input.tuning {
        if tc.n_bins() != cfg.n_position_bins {
            return Err(Error::BinMismatch { expected: cfg.n_position_bins, got: tc.n_bins() });
        }
        if tc.n_neurons() != input.ensemble.len() {
            return Err(Error::malformed(
                format!("{traj} tuning curves"),
                format!("{} rows for {} neurons", tc.n_neurons(), input.ensemble.len()),
            ));
        }
        out.insert(traj, tc.select(kept));
    }
    if let Some(first) = out.values().next() {
        first.ensure_compatible(out.values())?;
    }
    Ok(out)
}

// ── Batch ────────────────────────────────────────────────────────────────────

/// Result of a batch run.
#[derive(Debug)]
pub struct BatchReport {
    /// Successful sessions, in declared order.
    pub outputs: Vec<SessionOutput>,
    pub failures: Vec<SessionFailure>,
    pub group: GroupSummary,
}

/// Load and analyse every session directory in parallel.
///
/// A failing session is reported and does not stop the others.
pub fn run_batch(dirs: &[PathBuf], cfg: &AnalysisConfig) -> BatchReport {
    let results: Vec<std::result::Result<SessionOutput, SessionFailure>> = dirs
        .par_iter()
        .enumerate()
        .map(|(index, dir)| {
            let input = SessionInput::load(dir).map_err(|error| SessionFailure {
                session: dir.display().to_string(),
                stage: "loading",
                error,
            })?;
            analyze_session(&input, cfg, index)
        })
        .collect();
    collect_report(results, cfg)
}

/// Analyse already loaded sessions in parallel.
pub fn run_inputs(inputs: &[SessionInput], cfg: &AnalysisConfig) -> BatchReport {
    let results = inputs
        .par_iter()
        .enumerate()
        .map(|(index, input)| analyze_session(input, cfg, index))
        .collect();
    collect_report(results, cfg)
}

fn collect_report(
    results: Vec<std::result::Result<SessionOutput, SessionFailure>>,
    cfg: &AnalysisConfig,
) -> BatchReport {
    let mut outputs = Vec::new();
    let mut failures = Vec::new();
    for r in results {
        match r {
            Ok(out) => outputs.push(out),
            Err(f) => {
                warn!(session = %f.session, stage = f.stage, error = %f.error, "session failed");
                failures.push(f);
            }
        }
    }
    let group = GroupSummary::from_sessions(
        outputs.iter().map(|o| (o.name.as_str(), &o.metrics)),
        cfg.n_position_bins,
    );
    BatchReport { outputs, failures, group }
}
