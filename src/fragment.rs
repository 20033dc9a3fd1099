// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Shell configuration fragments.
//!
//! Dotstrap never patches the user's shell startup file line by line.
//! Instead, each piece of shell configuration it owns lives in its own small
//! __fragment__ file inside a managed directory. The host startup file, e.g.,
//! `~/.zshrc`, gets exactly one block that sources every fragment in that
//! directory.
//!
//! # Fragment Layout
//!
//! Fragment files are named `NN-name.zsh`, where `NN` is a two digit load
//! order no greater than [`MAX_ORDER`]. Lexicographic order of file names is the order the shell sources
//! them in. Thus, the fragment that activates the package manager gets a
//! lower number than any fragment that relies on paths it adds.
//!
//! Fragment content is fully owned by dotstrap. It is regenerated wholesale
//! from the profile on every write, so identical input always produces
//! byte-for-byte identical files.
//!
//! # Host Sourcing Block
//!
//! The sourcing block is delimited by marker comments. Presence of the
//! opening marker is what counts as "already sourced", so anything the user
//! writes elsewhere in the host file is left alone.

use crate::{
    backup::{overwrite_with_backup, BackupError},
    exec::{ExecError, Executor},
    guard::{file_contains, file_has_content, Verdict},
};

use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info, instrument};

/// File extension of fragment files.
pub const FRAGMENT_EXTENSION: &str = "zsh";

/// Highest load order that still fits the two digit file name prefix.
pub const MAX_ORDER: u8 = 99;

/// Opening marker of the host sourcing block.
pub const BLOCK_BEGIN: &str = "# >>> dotstrap fragments >>>";

/// Closing marker of the host sourcing block.
pub const BLOCK_END: &str = "# <<< dotstrap fragments <<<";

/// Identifier of a fragment, doubling as its file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FragmentId {
    order: u8,
    name: String,
}

impl FragmentId {
    /// Construct new fragment identifier.
    pub fn new(order: u8, name: impl Into<String>) -> Self {
        Self {
            order,
            name: name.into(),
        }
    }

    /// Load order of fragment.
    pub fn order(&self) -> u8 {
        self.order
    }

    /// Logical name of fragment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check that identifier maps to a file name that sorts by load order,
    /// and parses back into itself.
    ///
    /// # Errors
    ///
    /// - Return [`FragmentError::InvalidId`] if order exceeds [`MAX_ORDER`],
    ///   or name is empty or holds a path separator.
    pub fn validate(&self) -> Result<()> {
        let file_name = self.to_string();
        let valid = self.order <= MAX_ORDER
            && !self.name.contains(std::path::is_separator)
            && file_name.parse::<FragmentId>().is_ok_and(|id| &id == self);
        if !valid {
            return Err(FragmentError::InvalidId { file_name });
        }

        Ok(())
    }
}

impl Display for FragmentId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{:02}-{}.{FRAGMENT_EXTENSION}", self.order, self.name)
    }
}

impl FromStr for FragmentId {
    type Err = FragmentError;

    fn from_str(file_name: &str) -> Result<Self, Self::Err> {
        let invalid = || FragmentError::InvalidId {
            file_name: file_name.to_string(),
        };
        let stem = file_name
            .strip_suffix(FRAGMENT_EXTENSION)
            .and_then(|stem| stem.strip_suffix('.'))
            .ok_or_else(invalid)?;
        let (order, name) = stem.split_once('-').ok_or_else(invalid)?;
        if order.len() != 2 || name.is_empty() {
            return Err(invalid());
        }
        let order = order.parse::<u8>().map_err(|_| invalid())?;

        Ok(Self::new(order, name))
    }
}

/// Fragment identifier along with its generated content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub id: FragmentId,
    pub content: String,
}

impl Fragment {
    /// Construct new fragment.
    pub fn new(id: FragmentId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }
}

/// Manage fragment directory and host sourcing block.
#[derive(Debug, Clone)]
pub struct FragmentManager {
    dir: PathBuf,
    host: PathBuf,
}

impl FragmentManager {
    /// Construct new fragment manager.
    ///
    /// Fragments live in `dir`, and `host` is the shell startup file that
    /// must source them.
    pub fn new(dir: impl Into<PathBuf>, host: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            host: host.into(),
        }
    }

    /// Path to managed fragment directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path to host startup file.
    pub fn host(&self) -> &Path {
        &self.host
    }

    /// Path of target fragment file.
    pub fn path_of(&self, id: &FragmentId) -> PathBuf {
        self.dir.join(id.to_string())
    }

    fn ensure_dir(&self, exec: &Executor) -> Result<()> {
        if !self.dir.is_dir() {
            exec.create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    /// Regenerate fragment file with given content.
    ///
    /// Creates the managed directory if it is missing.
    ///
    /// # Errors
    ///
    /// - Return [`FragmentError::InvalidId`] if identifier cannot be used as
    ///   a fragment file name.
    /// - Return [`FragmentError::Exec`] if directory creation or write fails.
    #[instrument(skip(self, exec, content), level = "debug")]
    pub fn write_fragment(&self, exec: &Executor, id: &FragmentId, content: &str) -> Result<()> {
        id.validate()?;
        self.ensure_dir(exec)?;
        exec.write_file(&self.path_of(id), content)?;
        Ok(())
    }

    /// Bring managed directory in line with declared fragments.
    ///
    /// Creates the directory if it is missing, rewrites every fragment whose
    /// content drifted, and prunes fragments that are no longer declared.
    /// Fragments that are already current are left untouched.
    ///
    /// # Errors
    ///
    /// - Return [`FragmentError::InvalidId`] if any identifier cannot be used
    ///   as a fragment file name.
    /// - Return [`FragmentError::DuplicateId`] if two fragments share an
    ///   identifier.
    /// - Return [`FragmentError::Exec`] if directory creation, write, or
    ///   removal fails.
    /// - Return [`FragmentError::Glob`] if directory cannot be listed.
    pub fn sync(&self, exec: &Executor, fragments: &[Fragment]) -> Result<()> {
        check_ids(fragments.iter().map(|fragment| &fragment.id))?;

        // INVARIANT: Directory is created once, even in preview where it never appears.
        self.ensure_dir(exec)?;
        for fragment in fragments {
            if !file_has_content(&self.path_of(&fragment.id), &fragment.content).is_satisfied() {
                exec.write_file(&self.path_of(&fragment.id), &fragment.content)?;
            }
        }
        self.prune(exec, fragments)?;

        Ok(())
    }

    /// List fragments currently present in managed directory.
    ///
    /// Files that do not follow the fragment naming scheme are ignored.
    ///
    /// # Errors
    ///
    /// - Return [`FragmentError::Pattern`] if directory path cannot be
    ///   turned into a glob pattern.
    /// - Return [`FragmentError::Glob`] if directory cannot be listed.
    pub fn list(&self) -> Result<Vec<FragmentId>> {
        let pattern = format!(
            "{}/*.{FRAGMENT_EXTENSION}",
            glob::Pattern::escape(&self.dir.to_string_lossy())
        );

        let mut ids = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry?;
            let Some(file_name) = path.file_name().map(|name| name.to_string_lossy()) else {
                continue;
            };
            match file_name.parse::<FragmentId>() {
                Ok(id) => ids.push(id),
                Err(err) => debug!("{err}"),
            }
        }
        ids.sort();

        Ok(ids)
    }

    /// Remove fragment files that are not part of `keep`.
    ///
    /// Returns identifiers of removed fragments.
    ///
    /// # Errors
    ///
    /// - Return [`FragmentError::Glob`] if directory cannot be listed.
    /// - Return [`FragmentError::Exec`] if removal fails.
    pub fn prune(&self, exec: &Executor, keep: &[Fragment]) -> Result<Vec<FragmentId>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        for id in self.list()? {
            if keep.iter().all(|fragment| fragment.id != id) {
                info!("remove stale fragment {id}");
                exec.remove_file(&self.path_of(&id))?;
                removed.push(id);
            }
        }

        Ok(removed)
    }

    /// Check that managed directory holds exactly the given fragments.
    pub fn is_current(&self, fragments: &[Fragment]) -> Verdict {
        if self.dir.is_dir() {
            match self.list() {
                Ok(ids) if ids.iter().any(|id| fragments.iter().all(|f| &f.id != id)) => {
                    return Verdict::Unsatisfied;
                }
                Ok(_) => {}
                Err(err) => return Verdict::Unknown(err.to_string()),
            }
        }

        Verdict::all(
            fragments
                .iter()
                .map(|fragment| file_has_content(&self.path_of(&fragment.id), &fragment.content)),
        )
    }

    /// Render sourcing block for host startup file.
    pub fn sourcing_block(&self) -> String {
        format!(
            "{BLOCK_BEGIN}\n\
             for fragment in \"{}\"/*.{FRAGMENT_EXTENSION}; do\n  \
             [ -r \"$fragment\" ] && source \"$fragment\"\n\
             done\n\
             unset fragment\n\
             {BLOCK_END}\n",
            self.dir.display()
        )
    }

    /// Check whether host startup file already sources the managed directory.
    pub fn host_sources(&self) -> Verdict {
        file_contains(&self.host, &self.sourcing_block())
    }

    /// Ensure host startup file contains exactly one current sourcing block.
    ///
    /// Appends the block when the opening marker is absent, and rewrites it
    /// in place when it no longer matches, e.g., because the fragment
    /// directory moved. The original host file is backed up the first time
    /// it is modified. Returns true if the host file was modified.
    ///
    /// # Errors
    ///
    /// - Return [`FragmentError::ReadHost`] if host file cannot be read.
    /// - Return [`FragmentError::UnterminatedBlock`] if opening marker has no
    ///   closing marker after it.
    /// - Return [`FragmentError::Backup`] if backup or write fails.
    #[instrument(skip(self, exec), level = "debug")]
    pub fn ensure_host_sources(&self, exec: &Executor) -> Result<bool> {
        let mut content = match read_to_string(&self.host) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(FragmentError::ReadHost {
                    source: err,
                    path: self.host.clone(),
                })
            }
        };

        let block = self.sourcing_block();
        if let Some(begin) = content.find(BLOCK_BEGIN) {
            let end = content[begin..]
                .find(BLOCK_END)
                .map(|end| begin + end + BLOCK_END.len())
                .ok_or_else(|| FragmentError::UnterminatedBlock {
                    path: self.host.clone(),
                })?;
            let end = end + usize::from(content[end..].starts_with('\n'));

            if content[begin..end] == block {
                debug!("{:?} already sources fragments", self.host.display());
                return Ok(false);
            }

            info!("refresh stale sourcing block in {:?}", self.host.display());
            content.replace_range(begin..end, &block);
            overwrite_with_backup(exec, &self.host, &content)?;
            return Ok(true);
        }

        if !content.is_empty() {
            if !content.ends_with('\n') {
                content.push('\n');
            }
            content.push('\n');
        }
        content.push_str(&block);
        overwrite_with_backup(exec, &self.host, &content)?;

        Ok(true)
    }
}

/// Check that every identifier is usable and appears only once.
///
/// # Errors
///
/// - Return [`FragmentError::InvalidId`] if any identifier is unusable.
/// - Return [`FragmentError::DuplicateId`] on the first repeated identifier.
pub fn check_ids<'i>(ids: impl IntoIterator<Item = &'i FragmentId>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        id.validate()?;
        if !seen.insert(id) {
            return Err(FragmentError::DuplicateId {
                file_name: id.to_string(),
            });
        }
    }

    Ok(())
}

/// Fragment management error types.
#[derive(Debug, thiserror::Error)]
pub enum FragmentError {
    /// File name does not follow fragment naming scheme.
    #[error("{file_name:?} is not a valid fragment file name")]
    InvalidId { file_name: String },

    /// Host startup file cannot be read.
    #[error("failed to read host file {:?}", path.display())]
    ReadHost {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Two fragments would be written to the same file.
    #[error("fragment {file_name:?} is declared more than once")]
    DuplicateId { file_name: String },

    /// Host startup file has an opening marker without a closing one.
    #[error("sourcing block in {:?} is missing its closing marker", path.display())]
    UnterminatedBlock { path: PathBuf },

    /// Fragment directory path is not a valid pattern.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Fragment directory cannot be listed.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    /// Backing up host startup file fails.
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// Fragment effect fails.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Friendly result alias :3
pub type Result<T, E = FragmentError> = std::result::Result<T, E>;
