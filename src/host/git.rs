// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git access through libgit2.
//!
//! Covers the remote repositories dotstrap clones and updates (the
//! provisioning repository and the dotfiles repository), as well as the
//! user's global git identity.
//!
//! Updates are fast-forward only. A checkout that has diverged from its
//! upstream is left alone, and reported as an error for the user to sort
//! out by hand.

use crate::{
    exec::Executor,
    host::{IdentityStore, RemoteRepository, Result as HostResult},
    path::home_dir,
};

use auth_git2::{GitAuthenticator, Prompter};
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    Config, Direction, ErrorCode, FetchOptions, RemoteCallbacks, Repository,
};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{
    path::{Path, PathBuf},
    time,
};
use tracing::{debug, info, instrument};

/// Remote repository access through libgit2.
///
/// Credentials are requested interactively through the progress bar when a
/// remote asks for them.
#[derive(Debug, Default, Clone)]
pub struct Git2Remote;

impl Git2Remote {
    /// Run remote operation with credential prompts and a progress bar.
    fn with_fetch_options<T>(
        &self,
        label: &str,
        operation: impl FnOnce(FetchOptions<'_>) -> Result<T>,
    ) -> Result<T> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(label.to_string());
        bar.enable_steady_tick(time::Duration::from_millis(100));

        let prompter = IndicatifPrompter::new(bar.clone());
        let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
        let config = Config::open_default()?;

        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                prompter.bar.set_length(progress.total_objects() as u64);
                prompter.bar.set_position(progress.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let result = operation(fo);
        bar.finish_and_clear();

        result
    }
}

impl RemoteRepository for Git2Remote {
    fn is_cloned(&self, dest: &Path) -> bool {
        Repository::open(dest).is_ok_and(|repo| !repo.is_bare())
    }

    #[instrument(skip(self, exec), level = "debug")]
    fn clone_to(&self, exec: &Executor, url: &str, dest: &Path) -> Result<()> {
        exec.perform(format!("clone {url} into {}", dest.display()), || {
            self.with_fetch_options(url, |fo| {
                RepoBuilder::new().fetch_options(fo).clone(url, dest)?;
                Ok(())
            })?;
            info!("cloned {url} into {:?}", dest.display());

            Ok(())
        })
    }

    #[instrument(skip(self), level = "debug")]
    fn is_current(&self, dest: &Path) -> Result<bool> {
        let repo = Repository::open(dest)?;
        let head = repo.head()?;
        let (Some(refname), Some(local)) = (head.name().filter(|_| head.is_branch()), head.target())
        else {
            return Err(RemoteError::DetachedHead {
                path: dest.to_path_buf(),
            });
        };

        // INVARIANT: Guards never prompt, only stored credentials are tried.
        let authenticator = GitAuthenticator::default()
            .try_password_prompt(0)
            .prompt_ssh_key_password(false);
        let config = Config::open_default()?;
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));

        let mut remote = repo.find_remote("origin")?;
        let connection = remote.connect_auth(Direction::Fetch, Some(rc), None)?;
        let upstream = connection
            .list()?
            .iter()
            .find(|advertised| advertised.name() == refname)
            .map(|advertised| advertised.oid());
        debug!("{refname} is {local} locally, {upstream:?} upstream");

        Ok(upstream == Some(local))
    }

    #[instrument(skip(self, exec), level = "debug")]
    fn pull(&self, exec: &Executor, dest: &Path) -> Result<()> {
        exec.perform(format!("fast-forward {}", dest.display()), || {
            let repo = Repository::open(dest)?;
            let head = repo.head()?;
            let branch = head
                .shorthand()
                .filter(|_| head.is_branch())
                .map(ToString::to_string)
                .ok_or_else(|| RemoteError::DetachedHead {
                    path: dest.to_path_buf(),
                })?;

            let label = format!("{} ({branch})", dest.display());
            self.with_fetch_options(&label, |mut fo| {
                repo.find_remote("origin")?
                    .fetch(&[branch.as_str()], Some(&mut fo), None)?;
                Ok(())
            })?;

            let fetch_head = repo.find_reference("FETCH_HEAD")?;
            let upstream = repo.reference_to_annotated_commit(&fetch_head)?;
            let (analysis, _) = repo.merge_analysis(&[&upstream])?;

            if analysis.is_up_to_date() {
                debug!("{:?} is up to date", dest.display());
                return Ok(());
            }

            if !analysis.is_fast_forward() {
                return Err(RemoteError::Diverged {
                    path: dest.to_path_buf(),
                    branch,
                });
            }

            let refname = format!("refs/heads/{branch}");
            repo.find_reference(&refname)?
                .set_target(upstream.id(), "dotstrap: fast-forward")?;
            repo.set_head(&refname)?;
            repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
            info!("fast-forwarded {:?} to {}", dest.display(), upstream.id());

            Ok(())
        })
    }
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

/// Global git configuration of the current user.
#[derive(Debug, Default, Clone)]
pub struct Git2Identity;

impl Git2Identity {
    fn global_path() -> HostResult<PathBuf> {
        match Config::find_global() {
            Ok(path) => Ok(path),
            Err(_) => Ok(home_dir()?.join(".gitconfig")),
        }
    }
}

impl IdentityStore for Git2Identity {
    fn get(&self, key: &str) -> HostResult<Option<String>> {
        let config = Config::open_default()?;
        match config.get_string(key) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, exec: &Executor, key: &str, value: &str) -> HostResult<()> {
        let path = Self::global_path()?;
        exec.perform(
            format!("set {key} = {value:?} in {}", path.display()),
            || {
                let mut config = Config::open(&path)?;
                config.set_str(key, value)?;
                Ok(())
            },
        )
    }
}

/// Remote repository error types.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Checkout is not on a branch, so there is nothing to fast-forward.
    #[error("repository at {:?} has a detached HEAD", path.display())]
    DetachedHead { path: PathBuf },

    /// Local branch and upstream have diverged.
    #[error("branch {branch} at {:?} cannot be fast-forwarded", path.display())]
    Diverged { path: PathBuf, branch: String },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = RemoteError> = std::result::Result<T, E>;
