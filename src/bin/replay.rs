use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use swrdecode::{run_batch, AnalysisConfig, DiskStore, Phase, StWriter, Trajectory};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "swr-replay", about = "SWR replay detection and Bayesian decoding")]
struct Args {
    /// Session directories, in the order used for seeding and aggregation
    #[arg(long, num_args = 1.., required = true)]
    sessions: Vec<PathBuf>,

    /// Output directory (one sub-directory per session plus `group/`)
    #[arg(long)]
    output: PathBuf,

    /// Smoke run with 2 shuffles instead of 1000
    #[arg(long)]
    fast: bool,

    /// Override the shuffle RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// JSON file overriding any configuration field
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log per-stage details
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut cfg = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if args.fast {
        cfg.n_shuffles = AnalysisConfig::fast().n_shuffles;
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    cfg.validate().context("invalid configuration")?;

    info!(sessions = args.sessions.len(), shuffles = cfg.n_shuffles, "starting batch");
    let report = run_batch(&args.sessions, &cfg);

    let store = DiskStore::new(&args.output);
    for out in &report.outputs {
        let path = store
            .write(&out.name, "replay", &out.to_writer(&cfg))
            .with_context(|| format!("writing results of {}", out.name))?;
        println!("{}: {} SWRs → {}", out.name, out.swrs.len(), path.display());
    }

    let group = &report.group;
    let mut w = StWriter::new();
    for traj in Trajectory::ALL {
        let t = traj.name();
        if let Some(err) = group.errors.get(&traj) {
            w.add_f64_vec(&format!("{t}_error"), &err.error);
            w.add_f64_vec(&format!("{t}_error_binned"), &err.binned(&cfg.position_edges()).to_vec());
            println!("{t}: decoding error mean {:.2} median {:.2}", err.mean(), err.median());
        }
        for phase in Phase::ALL {
            if let Some(curve) = group.likelihood.get(&traj).and_then(|m| m.get(&phase)) {
                w.add_f64_vec(&format!("{t}_{}_likelihood", phase.name()), &curve.to_vec());
            }
        }
    }
    for (phase, counts) in &group.replay_counts {
        let props: Vec<f64> = Trajectory::ALL
            .iter()
            .map(|&t| counts.proportion(t).unwrap_or(f64::NAN))
            .collect();
        w.add_f64_vec(&format!("{}_replay_proportion", phase.name()), &props);
    }
    store.write("group", "summary", &w).context("writing group summary")?;

    for f in &report.failures {
        error!("{f}");
    }
    if !report.failures.is_empty() {
        bail!("{} of {} sessions failed", report.failures.len(), args.sessions.len());
    }
    Ok(())
}
