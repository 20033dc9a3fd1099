// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host capabilities.
//!
//! Dotstrap does not reimplement the tools it provisions with. Package
//! installation, preference storage, editor extensions, and remote
//! repositories are all reached through the narrow capability traits in this
//! module. Each trait splits cleanly into read-only queries, which steps use
//! as guards, and side effects, which always take the [`Executor`] so that
//! preview mode can intercept them.
//!
//! Real implementations live in the submodules and shell out to the actual
//! tools (or use libgit2 for git). Tests swap in fakes.

pub mod defaults;
pub mod git;
pub mod github;
pub mod homebrew;
pub mod vscode;
pub mod xcode;

pub use defaults::{MacDefaults, PrefValue};
pub use git::{Git2Identity, Git2Remote, RemoteError};
pub use github::GithubCli;
pub use homebrew::Homebrew;
pub use vscode::VsCode;
pub use xcode::XcodeSelect;

use crate::exec::{ExecError, Executor};

use std::{collections::BTreeSet, path::Path};

/// Package manager able to install a manifest of packages.
pub trait PackageSource {
    /// Check if package manager itself is installed.
    fn is_available(&self) -> bool;

    /// Install package manager itself.
    fn install_manager(&self, exec: &Executor) -> Result<()>;

    /// Refresh package catalog.
    fn update_catalog(&self, exec: &Executor) -> Result<()>;

    /// Check if every package of manifest is installed.
    fn check_satisfied(&self, manifest: &Path) -> Result<bool>;

    /// Install every package of manifest, optionally with a credential for
    /// private sources.
    fn install(&self, exec: &Executor, manifest: &Path, token: Option<&str>) -> Result<()>;
}

/// Privileged resource that requires authentication.
pub trait PrivilegedSource {
    /// Human readable name of source.
    fn name(&self) -> &str;

    /// Check if user is authenticated right now.
    fn status(&self) -> bool;

    /// Authenticate interactively.
    fn interactive_login(&self, exec: &Executor) -> Result<()>;

    /// Credential for source, if authenticated.
    fn token(&self) -> Option<String>;
}

/// Remote repository access.
pub trait RemoteRepository {
    /// Check if repository is already cloned at destination.
    fn is_cloned(&self, dest: &Path) -> bool;

    /// Clone repository from URL into destination.
    fn clone_to(&self, exec: &Executor, url: &str, dest: &Path) -> Result<(), RemoteError>;

    /// Check if checkout at destination already matches the tip of its
    /// upstream branch, without fetching anything.
    fn is_current(&self, dest: &Path) -> Result<bool, RemoteError>;

    /// Fast-forward repository at destination to its upstream.
    fn pull(&self, exec: &Executor, dest: &Path) -> Result<(), RemoteError>;
}

/// Operating system preference store.
pub trait PreferenceStore {
    /// Read current value of key, or `None` if key is not set.
    fn read(&self, domain: &str, key: &str) -> Result<Option<String>>;

    /// Write value of key.
    fn write(&self, exec: &Executor, domain: &str, key: &str, value: &PrefValue) -> Result<()>;

    /// Delete key.
    fn delete(&self, exec: &Executor, domain: &str, key: &str) -> Result<()>;
}

/// Editor that hosts extensions.
pub trait ExtensionHost {
    /// List identifiers of installed extensions, lowercased.
    fn list_installed(&self) -> Result<BTreeSet<String>>;

    /// Install extension.
    fn install(&self, exec: &Executor, extension: &str) -> Result<()>;
}

/// User level configuration of git.
pub trait IdentityStore {
    /// Read configuration value, or `None` if unset.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set configuration value.
    fn set(&self, exec: &Executor, key: &str, value: &str) -> Result<()>;
}

/// Base developer toolchain of the operating system.
pub trait ToolchainProbe {
    /// Check if command line tools are installed.
    fn command_line_tools_installed(&self) -> bool;

    /// Start installation of command line tools.
    fn install_command_line_tools(&self, exec: &Executor) -> Result<()>;
}

/// Host capability error types.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Tool invocation fails.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Git configuration access fails.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Home directory cannot be determined.
    #[error(transparent)]
    NoWayHome(#[from] crate::path::NoWayHome),

    /// Tool has no usable installation.
    #[error("{tool} is not installed")]
    Missing { tool: String },

    /// Operation was started, but finishes outside of dotstrap.
    #[error("{what} has not finished yet")]
    Pending { what: String },
}

/// Friendly result alias :3
pub type Result<T, E = HostError> = std::result::Result<T, E>;
