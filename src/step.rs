// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provisioning step model.
//!
//! A __step__ is one named unit of provisioning work. It carries everything
//! the sequencer needs to decide what to do with it: whether it is enabled,
//! what it depends on, how to tell that it is already done, what to do
//! otherwise, and whether its failure should stop the whole run.
//!
//! Steps are built once before a run starts, and are never modified while
//! the run is in progress.

use crate::{
    backup::BackupError,
    exec::{ExecError, Executor},
    fragment::FragmentError,
    guard::Guard,
    host::{git::RemoteError, HostError},
};

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

/// Named group of steps sharing one enable flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Command line tools and provisioning repository.
    Bootstrap,

    /// Package manager itself.
    Homebrew,

    /// First package installation phase, needs no credentials.
    Packages,

    /// Second package installation phase, needs authentication.
    PrivatePackages,

    /// Shell fragments and host startup file.
    Shell,

    /// Git identity.
    Git,

    /// Dotfiles repository and deployed files.
    Dotfiles,

    /// Editor extensions.
    Editor,

    /// System preference defaults.
    Defaults,
}

impl Phase {
    /// Stable name of phase.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Homebrew => "homebrew",
            Self::Packages => "packages",
            Self::PrivatePackages => "private-packages",
            Self::Shell => "shell",
            Self::Git => "git",
            Self::Dotfiles => "dotfiles",
            Self::Editor => "editor",
            Self::Defaults => "defaults",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name())
    }
}

/// What happens to the run when a step's action fails.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Fatality {
    /// Abort remaining steps.
    Fatal,

    /// Record failure and continue.
    #[default]
    NonFatal,
}

/// Precondition a step needs before its action may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    /// Another step earlier in the sequence.
    Step(&'static str),

    /// The authentication gate.
    Authentication,
}

/// Classification of a step after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Action was invoked (or would be, in preview) and succeeded.
    Applied,

    /// Step was disabled.
    SkippedByFlag,

    /// Dependency of step was not met.
    SkippedDependencyUnmet,

    /// Guard found nothing to do.
    AlreadySatisfied,

    /// Action was invoked and failed.
    Failed,
}

impl Outcome {
    /// Stable name of outcome.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::SkippedByFlag => "skipped-by-flag",
            Self::SkippedDependencyUnmet => "skipped-dependency-unmet",
            Self::AlreadySatisfied => "already-satisfied",
            Self::Failed => "failed",
        }
    }

    /// Check if a step with this outcome satisfies steps depending on it.
    ///
    /// A step disabled by flag counts as satisfied: switching it off means
    /// the user takes care of it.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, Self::Applied | Self::AlreadySatisfied | Self::SkippedByFlag)
    }
}

impl Display for Outcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name())
    }
}

/// Side effect of a step.
pub type Action<'a> = Box<dyn Fn(&Executor) -> Result<(), StepError> + 'a>;

/// One independently gated unit of provisioning work.
pub struct Step<'a> {
    name: &'static str,
    phase: Phase,
    enabled: bool,
    depends_on: Option<Dependency>,
    guard: Guard<'a>,
    action: Action<'a>,
    fatality: Fatality,
    remedy: String,
}

impl<'a> Step<'a> {
    /// Construct new enabled, non-fatal step without dependencies whose
    /// guard never considers it done.
    pub fn new(
        name: &'static str,
        phase: Phase,
        action: impl Fn(&Executor) -> Result<(), StepError> + 'a,
    ) -> Self {
        Self {
            name,
            phase,
            enabled: true,
            depends_on: None,
            guard: Guard::never(),
            action: Box::new(action),
            fatality: Fatality::NonFatal,
            remedy: format!("rerun dotstrap to retry {name}"),
        }
    }

    /// Set whether step is enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set dependency of step.
    pub fn depends_on(mut self, dependency: Dependency) -> Self {
        self.depends_on = Some(dependency);
        self
    }

    /// Set idempotency guard of step.
    pub fn guarded_by(mut self, guard: Guard<'a>) -> Self {
        self.guard = guard;
        self
    }

    /// Mark step as fatal.
    pub fn fatal(mut self) -> Self {
        self.fatality = Fatality::Fatal;
        self
    }

    /// Set remediation hint shown when step fails or is skipped.
    pub fn remedy(mut self, remedy: impl Into<String>) -> Self {
        self.remedy = remedy.into();
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dependency(&self) -> Option<Dependency> {
        self.depends_on
    }

    pub fn guard(&self) -> &Guard<'a> {
        &self.guard
    }

    pub fn fatality(&self) -> Fatality {
        self.fatality
    }

    pub fn remedy_hint(&self) -> &str {
        &self.remedy
    }

    /// Invoke action of step.
    ///
    /// # Errors
    ///
    /// - Return [`StepError`] if the action fails.
    pub fn run(&self, exec: &Executor) -> Result<(), StepError> {
        (self.action)(exec)
    }
}

impl Debug for Step<'_> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("Step")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("enabled", &self.enabled)
            .field("depends_on", &self.depends_on)
            .field("fatality", &self.fatality)
            .finish_non_exhaustive()
    }
}

/// Step action error types.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Fragment(#[from] FragmentError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Source file of step cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Step cannot complete for a reason of its own.
    #[error("{0}")]
    Message(String),
}
