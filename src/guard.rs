// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Idempotency guards.
//!
//! A __guard__ tells a step whether its work is already done. Guards inspect
//! the observable end state of the machine, e.g., "does this file already
//! hold exactly this content", rather than remembering whether a step ran
//! before. Manual edits and external changes are thus detected correctly.
//!
//! Guards must be free of side effects and cheap. A guard that cannot make
//! up its mind resolves to [`Verdict::Unknown`], which the sequencer treats
//! exactly like [`Verdict::Unsatisfied`]: the action is attempted.

use std::{
    fmt::Display,
    fs::{self, read_to_string},
    io::ErrorKind,
    path::Path,
};

/// Result of evaluating a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// End state already holds.
    Satisfied,

    /// End state does not hold.
    Unsatisfied,

    /// End state could not be determined.
    Unknown(String),
}

impl Verdict {
    /// Check if end state holds for sure.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }

    /// Convert boolean answer into verdict.
    pub fn from_bool(satisfied: bool) -> Self {
        if satisfied {
            Self::Satisfied
        } else {
            Self::Unsatisfied
        }
    }

    /// Combine verdicts such that all of them must be satisfied.
    ///
    /// The first verdict that is not satisfied wins.
    pub fn all(verdicts: impl IntoIterator<Item = Verdict>) -> Self {
        verdicts
            .into_iter()
            .find(|verdict| !verdict.is_satisfied())
            .unwrap_or(Self::Satisfied)
    }
}

impl<E: Display> From<Result<bool, E>> for Verdict {
    fn from(result: Result<bool, E>) -> Self {
        match result {
            Ok(satisfied) => Self::from_bool(satisfied),
            Err(error) => Self::Unknown(error.to_string()),
        }
    }
}

/// Idempotency guard of a step.
pub struct Guard<'a> {
    check: Box<dyn Fn() -> Verdict + 'a>,
}

impl<'a> Guard<'a> {
    /// Construct new guard from a checking function.
    pub fn new(check: impl Fn() -> Verdict + 'a) -> Self {
        Self {
            check: Box::new(check),
        }
    }

    /// Guard that never considers its step done.
    pub fn never() -> Self {
        Self::new(|| Verdict::Unsatisfied)
    }

    /// Evaluate guard against current machine state.
    pub fn evaluate(&self) -> Verdict {
        (self.check)()
    }
}

impl std::fmt::Debug for Guard<'_> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.write_str("Guard")
    }
}

/// Check that file exists holding exactly the expected bytes.
pub fn file_has_content(path: &Path, expected: impl AsRef<[u8]>) -> Verdict {
    match fs::read(path) {
        Ok(content) => Verdict::from_bool(content == expected.as_ref()),
        Err(err) if err.kind() == ErrorKind::NotFound => Verdict::Unsatisfied,
        Err(err) => Verdict::Unknown(format!("cannot read {:?}: {err}", path.display())),
    }
}

/// Check that file exists and contains target text somewhere.
pub fn file_contains(path: &Path, needle: &str) -> Verdict {
    match read_to_string(path) {
        Ok(content) => Verdict::from_bool(content.contains(needle)),
        Err(err) if err.kind() == ErrorKind::NotFound => Verdict::Unsatisfied,
        Err(err) => Verdict::Unknown(format!("cannot read {:?}: {err}", path.display())),
    }
}
