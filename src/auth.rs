// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Authentication gate.
//!
//! Some steps need access to a privileged package source, e.g., a private
//! tap that is only reachable with GitHub credentials. The gate answers
//! "may those steps run?" exactly once per run and remembers the answer.
//!
//! The gate never prompts in a non-interactive session. It simply reports
//! that authentication is missing, and the sequencer skips dependent steps
//! with a warning instead of failing the run.

use crate::{exec::Executor, host::PrivilegedSource};

use std::cell::OnceCell;
use tracing::{debug, info, warn};

/// Cached authentication state for one run.
pub struct AuthGate<'a> {
    source: &'a dyn PrivilegedSource,
    interactive: bool,
    state: OnceCell<bool>,
}

impl<'a> AuthGate<'a> {
    /// Construct new gate in front of a privileged source.
    pub fn new(source: &'a dyn PrivilegedSource, interactive: bool) -> Self {
        Self {
            source,
            interactive,
            state: OnceCell::new(),
        }
    }

    /// Make sure the privileged source is usable.
    ///
    /// Already authenticated sources pass without prompting. Otherwise an
    /// interactive session attempts to log in, while a non-interactive one
    /// fails right away. The answer is cached for the rest of the run.
    ///
    /// In preview mode the login is only journaled, and assumed to succeed.
    pub fn ensure_authenticated(&self, exec: &Executor) -> bool {
        *self.state.get_or_init(|| self.resolve(exec))
    }

    fn resolve(&self, exec: &Executor) -> bool {
        let name = self.source.name();
        if self.source.status() {
            debug!("already authenticated to {name}");
            return true;
        }

        if !self.interactive {
            warn!("not authenticated to {name}, and session is non-interactive");
            return false;
        }

        info!("authentication to {name} required");
        match self.source.interactive_login(exec) {
            Ok(()) if exec.is_preview() => true,
            Ok(()) => self.source.status(),
            Err(error) => {
                warn!("login to {name} failed: {error}");
                false
            }
        }
    }

    /// Credential of privileged source, if the gate let us through.
    pub fn token(&self) -> Option<String> {
        match self.state.get() {
            Some(true) => self.source.token(),
            _ => None,
        }
    }

    /// Name of privileged source behind gate.
    pub fn source_name(&self) -> &str {
        self.source.name()
    }
}

impl std::fmt::Debug for AuthGate<'_> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("AuthGate")
            .field("source", &self.source.name())
            .field("interactive", &self.interactive)
            .field("state", &self.state.get())
            .finish()
    }
}
