//! # swrdecode — sharp-wave-ripple replay detection and Bayesian decoding
//!
//! `swrdecode` analyses hippocampal recordings from a spatial shortcut task.
//! For every recording session it finds sharp-wave-ripple (SWR) events,
//! tests whether the firing order inside each event replays the place-field
//! order of a trajectory, and decodes position from spike counts.
//!
//! ## Pipeline overview
//!
//! ```text
//! session directory (*.safetensors)
//!   │
//!   ├─ swr::filter_candidates      merge → ∩ recording window → drop < 20 ms
//!   ├─ ensemble::filter_by_rate    ≤ 5 Hz mean rate, ≥ 100 spikes
//!   ├─ replay::detect_replays      Spearman(firing order, place order)
//!   │                              + 1000-shuffle percentile, 5 % two-tailed
//!   ├─ decode::decode_epoch        10 ms bins · 50 ms window · Poisson posterior
//!   └─ aggregate                   decoding error · likelihood by phase
//!        │                         · replay proportions by phase
//!        └─→ SessionOutput ──(all sessions)──→ GroupSummary
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use swrdecode::{analyze_session, AnalysisConfig, SessionInput, Trajectory};
//! use std::path::Path;
//!
//! let input = SessionInput::load(Path::new("data/R063-2015-03-20")).unwrap();
//! let cfg   = AnalysisConfig::default();
//! let out   = analyze_session(&input, &cfg, 0).unwrap();
//!
//! println!("{} SWRs", out.swrs.len());
//! println!("{} familiar replays", out.replay_epoch(Trajectory::Familiar).len());
//! ```
//!
//! ## Running individual steps
//!
//! ```no_run
//! use swrdecode::{AnalysisConfig, Epoch, NeuronEnsemble, PlaceOrder, TuningCurves};
//! use swrdecode::replay::correlate_events;
//! use swrdecode::decode::{decode_epoch, decode_location};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! # fn demo(ensemble: NeuronEnsemble, tc: TuningCurves, swrs: Epoch) -> swrdecode::Result<()> {
//! let cfg = AnalysisConfig::default();
//! let order = PlaceOrder::from_tuning_curves(&tc);
//! let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
//!
//! let events = correlate_events(&ensemble, &order, &swrs, &cfg, &mut rng);
//! let posterior = decode_epoch(&ensemble, &tc, &swrs, &cfg)?;
//! let decoded = decode_location(&posterior, &cfg);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod decode;
pub mod ensemble;
pub mod epoch;
pub mod error;
pub mod filter;
pub mod io;
pub mod replay;
pub mod session;
pub mod signal;
pub mod stats;
pub mod swr;
pub mod task;
pub mod tuning;

// ── Crate-root re-exports ─────────────────────────────────────────────────

pub use aggregate::{DecodingError, GroupSummary, ReplayCounts, SessionMetrics};
pub use cache::{ArtifactStore, DiskStore};
pub use config::AnalysisConfig;
pub use decode::{DecodedPosition, Posterior};
pub use ensemble::{NeuronEnsemble, PlaceOrder, TuningCurves};
pub use epoch::Epoch;
pub use error::{Error, Result};
pub use io::{SafeTensors, StWriter};
pub use replay::{EventCorrelation, ReplayAnalysis, ReplayClassification};
pub use session::{
    analyze_session, run_batch, run_inputs, BatchReport, SessionFailure, SessionInput,
    SessionOutput,
};
pub use signal::{AnalogSignal, Position, SpikeTrain};
pub use stats::PercentileKind;
pub use task::{Exclusivity, Phase, PhaseEpochs, Trajectory};
