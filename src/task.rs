//! Closed vocabularies of the shortcut task: trajectories, replay
//! exclusivity categories and experimental phases.
use crate::epoch::Epoch;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// A route through the maze whose place-field order can be replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Trajectory {
    /// The familiar U-shaped route.
    Familiar,
    /// The novel shortcut opened in phase 3.
    Shortcut,
}

impl Trajectory {
    pub const ALL: [Trajectory; 2] = [Trajectory::Familiar, Trajectory::Shortcut];

    pub fn name(self) -> &'static str {
        match self {
            Trajectory::Familiar => "familiar",
            Trajectory::Shortcut => "shortcut",
        }
    }
}

/// Mutually exclusive replay categories over both trajectories.
///
/// Events that replay neither trajectory have no category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Exclusivity {
    Both,
    OnlyFamiliar,
    OnlyShortcut,
}

impl Exclusivity {
    pub const ALL: [Exclusivity; 3] =
        [Exclusivity::Both, Exclusivity::OnlyFamiliar, Exclusivity::OnlyShortcut];

    pub fn name(self) -> &'static str {
        match self {
            Exclusivity::Both => "both",
            Exclusivity::OnlyFamiliar => "only_familiar",
            Exclusivity::OnlyShortcut => "only_shortcut",
        }
    }

    /// Category of an event from its per-trajectory replay flags.
    pub fn classify(familiar: bool, shortcut: bool) -> Option<Exclusivity> {
        match (familiar, shortcut) {
            (true, true) => Some(Exclusivity::Both),
            (true, false) => Some(Exclusivity::OnlyFamiliar),
            (false, true) => Some(Exclusivity::OnlyShortcut),
            (false, false) => None,
        }
    }
}

/// Named epochs of one recording session, in chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    PreRecord,
    Phase1,
    PauseA,
    Phase2,
    PauseB,
    Phase3,
    PostRecord,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::PreRecord,
        Phase::Phase1,
        Phase::PauseA,
        Phase::Phase2,
        Phase::PauseB,
        Phase::Phase3,
        Phase::PostRecord,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::PreRecord => "prerecord",
            Phase::Phase1 => "phase1",
            Phase::PauseA => "pauseA",
            Phase::Phase2 => "phase2",
            Phase::PauseB => "pauseB",
            Phase::Phase3 => "phase3",
            Phase::PostRecord => "postrecord",
        }
    }

    /// Track-running phases (as opposed to rest and sleep boxes).
    pub fn is_task(self) -> bool {
        matches!(self, Phase::Phase1 | Phase::Phase2 | Phase::Phase3)
    }
}

impl fmt::Display for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Exclusivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One epoch per [`Phase`].
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseEpochs {
    epochs: BTreeMap<Phase, Epoch>,
}

impl PhaseEpochs {
    /// Build from one `(start, stop)` pair per phase, in [`Phase::ALL`] order.
    ///
    /// # Errors
    ///
    /// [`Error::UnexpectedPhaseCount`] unless exactly seven pairs are given;
    /// [`Error::MalformedInput`] for an invalid interval.
    pub fn from_bounds(starts: &[f64], stops: &[f64]) -> Result<Self> {
        if starts.len() != Phase::ALL.len() || stops.len() != Phase::ALL.len() {
            return Err(Error::UnexpectedPhaseCount {
                expected: Phase::ALL.len(),
                got: starts.len().max(stops.len()),
            });
        }
        let mut epochs = BTreeMap::new();
        for (i, phase) in Phase::ALL.into_iter().enumerate() {
            epochs.insert(phase, Epoch::interval(starts[i], stops[i])?);
        }
        Ok(Self { epochs })
    }

    pub fn get(&self, phase: Phase) -> &Epoch {
        // Every phase is inserted by the only constructor.
        &self.epochs[&phase]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Phase, &Epoch)> {
        self.epochs.iter().map(|(&p, e)| (p, e))
    }

    /// The valid recording window: union of all phases, merged.
    pub fn all(&self) -> Epoch {
        self.epochs
            .values()
            .fold(Epoch::empty(), |acc, e| acc.join(e))
            .merge()
    }
}
