// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Visual Studio Code extensions.

use crate::{
    exec::{CommandLine, Executor},
    host::{ExtensionHost, Result},
};

use std::{collections::BTreeSet, ffi::OsString};

/// Extensions managed through the `code` command.
#[derive(Debug, Clone)]
pub struct VsCode {
    program: OsString,
}

impl VsCode {
    /// Construct new handle using target editor command.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for VsCode {
    fn default() -> Self {
        Self::new("code")
    }
}

impl ExtensionHost for VsCode {
    fn list_installed(&self) -> Result<BTreeSet<String>> {
        let listing = CommandLine::new(&self.program)
            .arg("--list-extensions")
            .stdout()?;

        Ok(parse_listing(&listing))
    }

    fn install(&self, exec: &Executor, extension: &str) -> Result<()> {
        exec.command(
            &CommandLine::new(&self.program)
                .args(["--install-extension", extension]),
        )?;

        Ok(())
    }
}

// INVARIANT: Extension identifiers are case-insensitive.
fn parse_listing(listing: &str) -> BTreeSet<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_lowercase)
        .collect()
}
