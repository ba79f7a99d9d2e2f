/// session_steps: load one session, run each pipeline stage separately and
/// write every intermediate array to a safetensors file for inspection.
///
/// Output keys:
///   swr_raw_{start,stop}            [S_raw]  f64  detector candidates
///   swr_{start,stop}                [S]      f64  after merge / window / duration
///   kept_neurons                    [N]      i64  rate-filtered ensemble
///   {traj}_place_order              [K]      i64  ensemble indices by peak bin
///   {traj}_percentile               [S]      f64  shuffle percentile per event
///   {traj}_replays                  [R]      i64  replay event indices
///   running_{start,stop}            [M]      f64  running epochs in the recording
///   {traj}_run_posterior            [T, B]   f64  posterior during running
///   {traj}_swr_posterior            [U, B]   f64  posterior during SWRs
///   estimated_tc                    [N, B]   f64  tuning curves from position
use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::path::PathBuf;

use swrdecode::{
    decode::decode_epoch,
    replay::detect_replays,
    session::session_seed,
    swr::filter_candidates,
    tuning::linear_tuning_curves,
    AnalysisConfig, ArtifactStore, Epoch, PlaceOrder, SessionInput, StWriter, Trajectory,
};

#[derive(Parser, Debug)]
#[command(name = "session_steps")]
struct Args {
    /// Session directory.
    #[arg(long)]
    session: PathBuf,

    /// Output safetensors path.
    #[arg(long)]
    output: PathBuf,

    /// Number of shuffles.
    #[arg(long, default_value_t = 1000)]
    shuffles: usize,

    /// RNG seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
    let cfg = AnalysisConfig { n_shuffles: args.shuffles, seed: args.seed, ..Default::default() };
    cfg.validate()?;

    // ── 1. Load ────────────────────────────────────────────────────────────
    let t_load = now();
    let input = SessionInput::load(&args.session)
        .with_context(|| format!("loading {}", args.session.display()))?;
    let ms_load = t_load.elapsed().as_secs_f64() * 1000.0;
    let name = input.name.clone();
    let mut steps: ArtifactStore<Epoch> = ArtifactStore::new();

    // ── 2. SWR candidates ──────────────────────────────────────────────────
    let t_swr = now();
    let valid = input.phases.all();
    let swrs = filter_candidates(&input.swr_candidates, &valid, cfg.min_swr_duration);
    steps.insert(&name, "swrs", swrs)?;
    let ms_swr = t_swr.elapsed().as_secs_f64() * 1000.0;

    // ── 3. Ensemble filter ─────────────────────────────────────────────────
    let t_ens = now();
    let (ensemble, kept) =
        input.ensemble.filter_by_rate(&valid, cfg.max_mean_rate, cfg.min_n_spikes);
    for (traj, tc) in &input.tuning {
        if tc.n_neurons() != input.ensemble.len() {
            bail!("{traj}: {} tuning curves for {} neurons", tc.n_neurons(), input.ensemble.len());
        }
    }
    let tuning: BTreeMap<Trajectory, _> =
        input.tuning.iter().map(|(&t, tc)| (t, tc.select(&kept))).collect();
    let orders: BTreeMap<Trajectory, PlaceOrder> =
        tuning.iter().map(|(&t, tc)| (t, PlaceOrder::from_tuning_curves(tc))).collect();
    let ms_ens = t_ens.elapsed().as_secs_f64() * 1000.0;

    // ── 4. Replay ──────────────────────────────────────────────────────────
    let t_rep = now();
    let swrs = steps.get(&name, "swrs")?;
    let mut rng = ChaCha8Rng::seed_from_u64(session_seed(cfg.seed, 0));
    let replay = detect_replays(&ensemble, &orders, swrs, &cfg, &mut rng);
    let ms_rep = t_rep.elapsed().as_secs_f64() * 1000.0;

    // ── 5. Decode ──────────────────────────────────────────────────────────
    let t_dec = now();
    let running = input
        .position
        .running_epochs(cfg.speed_threshold, cfg.speed_smoothing)
        .intersect(&valid);
    let mut posteriors = Vec::new();
    for (&traj, tc) in &tuning {
        let run = decode_epoch(&ensemble, tc, &running, &cfg)?;
        let swr = decode_epoch(&ensemble, tc, swrs, &cfg)?;
        posteriors.push((traj, run, swr));
    }
    let ms_dec = t_dec.elapsed().as_secs_f64() * 1000.0;

    // ── 6. Tuning-curve estimate ───────────────────────────────────────────
    let t_tc = now();
    let estimated = linear_tuning_curves(&ensemble, &input.position, &running, &cfg)?;
    let ms_tc = t_tc.elapsed().as_secs_f64() * 1000.0;

    eprintln!(
        "TIMING load={ms_load:.4}ms swr={ms_swr:.4}ms ensemble={ms_ens:.4}ms \
         replay={ms_rep:.4}ms decode={ms_dec:.4}ms tc={ms_tc:.4}ms",
    );
    eprintln!(
        "  {name}: {} SWRs  {}/{} neurons  {} running epochs",
        swrs.len(),
        ensemble.len(),
        input.ensemble.len(),
        running.len()
    );

    // ── 7. Write output ────────────────────────────────────────────────────
    eprintln!("Writing → {}", args.output.display());
    let mut w = StWriter::new();
    w.add_f64_vec("swr_raw_start", input.swr_candidates.starts());
    w.add_f64_vec("swr_raw_stop", input.swr_candidates.stops());
    w.add_f64_vec("swr_start", swrs.starts());
    w.add_f64_vec("swr_stop", swrs.stops());
    w.add_indices("kept_neurons", &kept);
    for (traj, order) in &orders {
        w.add_indices(&format!("{}_place_order", traj.name()), order.order());
    }
    for (traj, events) in &replay.correlations {
        let pct: Vec<f64> = events.iter().map(|e| e.percentile).collect();
        w.add_f64_vec(&format!("{}_percentile", traj.name()), &pct);
        w.add_indices(&format!("{}_replays", traj.name()), replay.classification.replays(*traj));
    }
    w.add_f64_vec("running_start", running.starts());
    w.add_f64_vec("running_stop", running.stops());
    for (traj, run, swr) in &posteriors {
        w.add_f64_arr2(&format!("{}_run_posterior", traj.name()), run.prob());
        w.add_f64_vec(&format!("{}_run_posterior_time", traj.name()), run.time());
        w.add_f64_arr2(&format!("{}_swr_posterior", traj.name()), swr.prob());
        w.add_f64_vec(&format!("{}_swr_posterior_time", traj.name()), swr.time());
    }
    w.add_f64_arr2("estimated_tc", estimated.rates());
    w.write(&args.output)?;

    eprintln!("Done.");
    Ok(())
}

/// Return `std::time::Instant::now()` (used for internal timing).
#[inline(always)]
fn now() -> std::time::Instant {
    std::time::Instant::now()
}
