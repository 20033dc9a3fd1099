// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Homebrew package source.
//!
//! Packages are described by Brewfile manifests, and installed through
//! `brew bundle`. Dotstrap never asks brew to upgrade anything, only to make
//! sure that what the manifest lists is present.

use crate::{
    exec::{CommandLine, ExecError, Executor},
    host::{HostError, PackageSource, Result},
};

use std::path::{Path, PathBuf};
use tracing::instrument;

/// Official Homebrew installation script.
pub const INSTALL_SCRIPT_URL: &str =
    "https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh";

/// Homebrew installed under a fixed prefix.
#[derive(Debug, Clone)]
pub struct Homebrew {
    prefix: PathBuf,
    interactive: bool,
}

impl Homebrew {
    /// Construct new Homebrew handle for target prefix.
    pub fn new(prefix: impl Into<PathBuf>, interactive: bool) -> Self {
        Self {
            prefix: prefix.into(),
            interactive,
        }
    }

    /// Path to brew binary.
    pub fn brew(&self) -> PathBuf {
        self.prefix.join("bin").join("brew")
    }

    fn bundle(&self, action: &str, manifest: &Path) -> CommandLine {
        CommandLine::new(self.brew())
            .args(["bundle", action, "--no-upgrade", "--file"])
            .arg(manifest)
    }
}

impl PackageSource for Homebrew {
    fn is_available(&self) -> bool {
        CommandLine::new(self.brew()).arg("--version").succeeds()
    }

    #[instrument(skip(self, exec), level = "debug")]
    fn install_manager(&self, exec: &Executor) -> Result<()> {
        let mut cmd = CommandLine::new("/bin/bash")
            .arg("-c")
            .arg(format!("/bin/bash -c \"$(curl -fsSL {INSTALL_SCRIPT_URL})\""));
        if !self.interactive {
            cmd = cmd.env("NONINTERACTIVE", "1");
        }
        exec.interactive(&cmd)?;

        if !exec.is_preview() && !self.is_available() {
            return Err(HostError::Missing {
                tool: self.brew().display().to_string(),
            });
        }

        Ok(())
    }

    #[instrument(skip(self, exec), level = "debug")]
    fn update_catalog(&self, exec: &Executor) -> Result<()> {
        exec.command(&CommandLine::new(self.brew()).arg("update"))?;
        Ok(())
    }

    fn check_satisfied(&self, manifest: &Path) -> Result<bool> {
        if !manifest.is_file() {
            return Err(HostError::Missing {
                tool: format!("manifest {}", manifest.display()),
            });
        }

        match self.bundle("check", manifest).output() {
            Ok(_) => Ok(true),
            // INVARIANT: brew bundle check exits non-zero when anything is missing.
            Err(ExecError::Syscall { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self, exec, token), level = "debug")]
    fn install(&self, exec: &Executor, manifest: &Path, token: Option<&str>) -> Result<()> {
        let mut cmd = self.bundle("install", manifest);
        if let Some(token) = token {
            cmd = cmd.env("HOMEBREW_GITHUB_API_TOKEN", token);
        }
        exec.interactive(&cmd)?;

        Ok(())
    }
}
