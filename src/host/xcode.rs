// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Xcode command line tools.

use crate::{
    exec::{CommandLine, Executor},
    host::{HostError, Result, ToolchainProbe},
};

/// Command line tools managed by `xcode-select`.
#[derive(Debug, Default, Clone)]
pub struct XcodeSelect;

impl ToolchainProbe for XcodeSelect {
    fn command_line_tools_installed(&self) -> bool {
        CommandLine::new("xcode-select").arg("-p").succeeds()
    }

    fn install_command_line_tools(&self, exec: &Executor) -> Result<()> {
        exec.command(&CommandLine::new("xcode-select").arg("--install"))?;

        // INVARIANT: Installer runs in its own window, and outlives this call.
        if !exec.is_preview() && !self.command_line_tools_installed() {
            return Err(HostError::Pending {
                what: "command line tools installation".into(),
            });
        }

        Ok(())
    }
}
