// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! GitHub authentication through the GitHub CLI.

use crate::{
    exec::{CommandLine, Executor},
    host::{PrivilegedSource, Result},
};

/// GitHub account managed by `gh`.
#[derive(Debug, Clone)]
pub struct GithubCli {
    hostname: String,
}

impl GithubCli {
    /// Construct new handle for target GitHub host.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }

    fn auth(&self, action: &str) -> CommandLine {
        CommandLine::new("gh")
            .args(["auth", action, "--hostname"])
            .arg(&self.hostname)
    }
}

impl Default for GithubCli {
    fn default() -> Self {
        Self::new("github.com")
    }
}

impl PrivilegedSource for GithubCli {
    fn name(&self) -> &str {
        &self.hostname
    }

    fn status(&self) -> bool {
        self.auth("status").succeeds()
    }

    fn interactive_login(&self, exec: &Executor) -> Result<()> {
        exec.interactive(&self.auth("login").args(["--git-protocol", "https"]))?;
        Ok(())
    }

    fn token(&self) -> Option<String> {
        self.auth("token")
            .stdout()
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    }
}
