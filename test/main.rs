// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use dotstrap::{
    host::{
        ExtensionHost, HostError, IdentityStore, PackageSource, PrefValue, PreferenceStore,
        PrivilegedSource, RemoteError, RemoteRepository, ToolchainProbe,
    },
    install_steps, AuthGate, Executor, Host, Profile, RunFlags, RunReport, Sequencer,
};

use anyhow::Result;
use git2::{IndexEntry, IndexTime, Repository, RepositoryInitOptions};
use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

/// Simulated machine implementing every host capability.
///
/// Effects only change state when the executor actually runs them, so a
/// preview run leaves the machine exactly as it was.
#[derive(Debug, Default)]
pub(crate) struct FakeMachine {
    pub(crate) brew_installed: Cell<bool>,
    pub(crate) brew_install_fails: Cell<bool>,
    pub(crate) manifests: RefCell<BTreeSet<PathBuf>>,
    pub(crate) tokens: RefCell<Vec<Option<String>>>,
    pub(crate) authenticated: Cell<bool>,
    pub(crate) remote_files: RefCell<Vec<(PathBuf, String)>>,
    pub(crate) pulls: Cell<usize>,
    pub(crate) upstream_ahead: Cell<bool>,
    pub(crate) prefs: RefCell<BTreeMap<(String, String), String>>,
    pub(crate) extensions: RefCell<BTreeSet<String>>,
    pub(crate) extension_install_fails: Cell<bool>,
    pub(crate) git_config: RefCell<BTreeMap<String, String>>,
    pub(crate) clt_installed: Cell<bool>,
    pub(crate) clt_install_fails: Cell<bool>,
}

impl FakeMachine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Files the remote repository hands out when cloned, relative to the
    /// checkout.
    pub(crate) fn with_remote_file(self, path: impl Into<PathBuf>, content: &str) -> Self {
        self.remote_files
            .borrow_mut()
            .push((path.into(), content.to_string()));
        self
    }

    pub(crate) fn host(&self) -> Host<'_> {
        Host {
            packages: self,
            remote: self,
            prefs: self,
            editor: self,
            identity: self,
            toolchain: self,
        }
    }

    /// Run install sequence against this machine.
    pub(crate) fn provision(&self, profile: &Profile, flags: &RunFlags) -> RunReport {
        let gate = AuthGate::new(self, flags.is_interactive());
        let exec = Executor::new(flags.mode());
        let report = Sequencer::new(install_steps(profile, flags, self.host(), &gate))
            .with_gate(&gate)
            .run(&exec);

        report
    }
}

impl PackageSource for FakeMachine {
    fn is_available(&self) -> bool {
        self.brew_installed.get()
    }

    fn install_manager(&self, exec: &Executor) -> Result<(), HostError> {
        exec.perform("install homebrew", || {
            if self.brew_install_fails.get() {
                return Err(HostError::Missing {
                    tool: "brew".into(),
                });
            }
            self.brew_installed.set(true);
            Ok(())
        })
    }

    fn update_catalog(&self, exec: &Executor) -> Result<(), HostError> {
        exec.perform("update homebrew", || Ok(()))
    }

    fn check_satisfied(&self, manifest: &Path) -> Result<bool, HostError> {
        if !self.brew_installed.get() {
            return Err(HostError::Missing {
                tool: "brew".into(),
            });
        }
        Ok(self.manifests.borrow().contains(manifest))
    }

    fn install(&self, exec: &Executor, manifest: &Path, token: Option<&str>) -> Result<(), HostError> {
        exec.perform(format!("install bundle {}", manifest.display()), || {
            self.manifests.borrow_mut().insert(manifest.to_path_buf());
            self.tokens.borrow_mut().push(token.map(ToString::to_string));
            Ok(())
        })
    }
}

impl PrivilegedSource for FakeMachine {
    fn name(&self) -> &str {
        "github.com"
    }

    fn status(&self) -> bool {
        self.authenticated.get()
    }

    fn interactive_login(&self, exec: &Executor) -> Result<(), HostError> {
        exec.perform("log in to github.com", || {
            self.authenticated.set(true);
            Ok(())
        })
    }

    fn token(&self) -> Option<String> {
        self.authenticated.get().then(|| "gho_fake".to_string())
    }
}

impl RemoteRepository for FakeMachine {
    fn is_cloned(&self, dest: &Path) -> bool {
        dest.join(".git").is_dir()
    }

    fn clone_to(&self, exec: &Executor, url: &str, dest: &Path) -> Result<(), RemoteError> {
        exec.perform(format!("clone {url} into {}", dest.display()), || {
            // INVARIANT: Fixture setup on real filesystem, failures are test bugs.
            fs::create_dir_all(dest.join(".git")).expect("create checkout");
            for (path, content) in self.remote_files.borrow().iter() {
                let path = dest.join(path);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).expect("create checkout directory");
                }
                fs::write(path, content).expect("write checkout file");
            }
            Ok(())
        })
    }

    fn is_current(&self, _: &Path) -> Result<bool, RemoteError> {
        Ok(!self.upstream_ahead.get())
    }

    fn pull(&self, exec: &Executor, dest: &Path) -> Result<(), RemoteError> {
        exec.perform(format!("fast-forward {}", dest.display()), || {
            self.pulls.set(self.pulls.get() + 1);
            self.upstream_ahead.set(false);
            Ok(())
        })
    }
}

impl PreferenceStore for FakeMachine {
    fn read(&self, domain: &str, key: &str) -> Result<Option<String>, HostError> {
        Ok(self
            .prefs
            .borrow()
            .get(&(domain.to_string(), key.to_string()))
            .cloned())
    }

    fn write(
        &self,
        exec: &Executor,
        domain: &str,
        key: &str,
        value: &PrefValue,
    ) -> Result<(), HostError> {
        exec.perform(format!("write default {domain} {key} {value}"), || {
            let raw = match value {
                PrefValue::Bool(true) => "1".to_string(),
                PrefValue::Bool(false) => "0".to_string(),
                PrefValue::Int(value) => value.to_string(),
                PrefValue::Text(value) => value.clone(),
            };
            self.prefs
                .borrow_mut()
                .insert((domain.to_string(), key.to_string()), raw);
            Ok(())
        })
    }

    fn delete(&self, exec: &Executor, domain: &str, key: &str) -> Result<(), HostError> {
        exec.perform(format!("delete default {domain} {key}"), || {
            self.prefs
                .borrow_mut()
                .remove(&(domain.to_string(), key.to_string()));
            Ok(())
        })
    }
}

impl ExtensionHost for FakeMachine {
    fn list_installed(&self) -> Result<BTreeSet<String>, HostError> {
        Ok(self.extensions.borrow().clone())
    }

    fn install(&self, exec: &Executor, extension: &str) -> Result<(), HostError> {
        exec.perform(format!("install extension {extension}"), || {
            if self.extension_install_fails.get() {
                return Err(HostError::Missing {
                    tool: "code".into(),
                });
            }
            self.extensions
                .borrow_mut()
                .insert(extension.to_lowercase());
            Ok(())
        })
    }
}

impl IdentityStore for FakeMachine {
    fn get(&self, key: &str) -> Result<Option<String>, HostError> {
        Ok(self.git_config.borrow().get(key).cloned())
    }

    fn set(&self, exec: &Executor, key: &str, value: &str) -> Result<(), HostError> {
        exec.perform(format!("set {key} = {value:?}"), || {
            self.git_config
                .borrow_mut()
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }
}

impl ToolchainProbe for FakeMachine {
    fn command_line_tools_installed(&self) -> bool {
        self.clt_installed.get()
    }

    fn install_command_line_tools(&self, exec: &Executor) -> Result<(), HostError> {
        exec.perform("install command line tools", || {
            if self.clt_install_fails.get() {
                return Err(HostError::Pending {
                    what: "command line tools".into(),
                });
            }
            self.clt_installed.set(true);
            Ok(())
        })
    }
}

/// Non-bare repository with helpers to commit files without a work tree.
pub(crate) struct RepoFixture {
    repo: Repository,
}

impl RepoFixture {
    pub(crate) fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(path.as_ref(), &opts)?;
        Self::with_identity(repo)
    }

    pub(crate) fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_identity(Repository::open(path.as_ref())?)
    }

    fn with_identity(repo: Repository) -> Result<Self> {
        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        Ok(Self { repo })
    }

    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<()> {
        let entry = IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: contents.as_ref().len() as u32,
            id: self.repo.blob(contents.as_ref().as_bytes())?,
            flags: 0,
            flags_extended: 0,
            path: filename
                .as_ref()
                .as_os_str()
                .to_string_lossy()
                .into_owned()
                .into_bytes(),
        };

        // INVARIANT: Always use new tree produced by index after staging new entry.
        let mut index = self.repo.index()?;
        index.add_frombuffer(&entry, contents.as_ref().as_bytes())?;
        let tree = self.repo.find_tree(index.write_tree()?)?;

        let signature = self.repo.signature()?;
        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents = parent.iter().collect::<Vec<_>>();

        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            format!("chore: add {:?}", filename.as_ref()).as_ref(),
            &tree,
            &parents,
        )?;

        Ok(())
    }
}
