// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host preconditions.
//!
//! Checked once before any step runs. A host that fails them is never
//! touched.

use crate::exec::{CommandLine, ExecError};

/// Operating system dotstrap provisions.
pub const SUPPORTED_OS: &str = "macos";

/// Check that host can be provisioned at all.
///
/// # Errors
///
/// - Return [`PreflightError::UnsupportedPlatform`] if `os` is not macOS.
/// - Return [`PreflightError::RunningAsRoot`] if `uid` belongs to root.
pub fn check_host(os: &str, uid: u32) -> Result<()> {
    if os != SUPPORTED_OS {
        return Err(PreflightError::UnsupportedPlatform { os: os.to_string() });
    }

    if uid == 0 {
        return Err(PreflightError::RunningAsRoot);
    }

    Ok(())
}

/// Determine user ID of current process.
///
/// # Errors
///
/// - Return [`PreflightError::Exec`] if `id` cannot be run.
/// - Return [`PreflightError::InvalidUid`] if `id` prints garbage.
pub fn current_uid() -> Result<u32> {
    let output = CommandLine::new("id").arg("-u").stdout()?;
    output
        .trim()
        .parse()
        .map_err(|_| PreflightError::InvalidUid { output })
}

/// Precondition error types.
#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("dotstrap only provisions {SUPPORTED_OS}, not {os}")]
    UnsupportedPlatform { os: String },

    #[error("dotstrap must not run as root, run it as the user being provisioned")]
    RunningAsRoot,

    #[error("cannot make sense of user id {output:?}")]
    InvalidUid { output: String },

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Friendly result alias :3
pub type Result<T, E = PreflightError> = std::result::Result<T, E>;
