// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup-on-first-write policy.
//!
//! Before dotstrap overwrites a file that the user already had, the original
//! file is copied next to it with a fixed `.dotstrap-backup` suffix. This
//! happens at most once per file. The presence of the backup is the only
//! record that it was taken, so later runs never stack backups on top of
//! each other, and never replace the user's pre-dotstrap original.

use crate::exec::{ExecError, Executor};

use std::{
    ffi::OsString,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::info;

/// Suffix appended to the file name of a backup.
pub const BACKUP_SUFFIX: &str = ".dotstrap-backup";

/// Outcome of [`backup_if_needed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Backup was taken just now.
    Created(PathBuf),

    /// Backup from an earlier run already exists.
    AlreadyBackedUp(PathBuf),

    /// Target is missing, or already holds the incoming content.
    NotNeeded,
}

/// Determine backup path of target file.
pub fn backup_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(ToOwned::to_owned)
        .unwrap_or_else(OsString::new);
    name.push(BACKUP_SUFFIX);
    target.with_file_name(name)
}

/// Back up target file if it holds foreign content that is about to be
/// replaced by `incoming`, and no backup was taken before.
///
/// # Errors
///
/// - Return [`BackupError::Read`] if target exists but cannot be read.
/// - Return [`BackupError::Exec`] if backup copy fails.
pub fn backup_if_needed(
    exec: &Executor,
    target: &Path,
    incoming: impl AsRef<[u8]>,
) -> Result<BackupOutcome> {
    let current = match fs::read(target) {
        Ok(current) => current,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BackupOutcome::NotNeeded),
        Err(err) => {
            return Err(BackupError::Read {
                source: err,
                path: target.to_path_buf(),
            })
        }
    };

    if current == incoming.as_ref() {
        return Ok(BackupOutcome::NotNeeded);
    }

    let backup = backup_path(target);

    // INVARIANT: Existing backup is never replaced, even if target changed since.
    if backup.symlink_metadata().is_ok() {
        return Ok(BackupOutcome::AlreadyBackedUp(backup));
    }

    info!("back up {:?} to {:?}", target.display(), backup.display());
    exec.copy_file(target, &backup)?;

    Ok(BackupOutcome::Created(backup))
}

/// Overwrite target file with content, backing up foreign content first.
///
/// Creates missing parent directories of the target.
///
/// # Errors
///
/// - Return [`BackupError::Read`] if target exists but cannot be read.
/// - Return [`BackupError::Exec`] if backup, directory creation, or write
///   fails.
pub fn overwrite_with_backup(
    exec: &Executor,
    target: &Path,
    contents: impl AsRef<[u8]>,
) -> Result<BackupOutcome> {
    let outcome = backup_if_needed(exec, target, contents.as_ref())?;
    if let Some(parent) = target.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if !parent.is_dir() {
            exec.create_dir_all(parent)?;
        }
    }
    exec.write_file(target, contents)?;

    Ok(outcome)
}

/// Backup policy error types.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Existing target file cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Backup or write effect fails.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Friendly result alias :3
pub type Result<T, E = BackupError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::Mode;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{read_to_string, write};

    #[test]
    fn backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/home/user/.zshrc")),
            PathBuf::from("/home/user/.zshrc.dotstrap-backup")
        );
    }

    #[sealed_test]
    fn missing_target_needs_no_backup() -> anyhow::Result<()> {
        let exec = Executor::new(Mode::Execute);
        let outcome = overwrite_with_backup(&exec, Path::new("dir/rc"), "managed\n")?;

        assert_eq!(outcome, BackupOutcome::NotNeeded);
        assert_eq!(read_to_string("dir/rc")?, "managed\n");
        assert!(!Path::new("dir/rc.dotstrap-backup").exists());

        Ok(())
    }

    #[sealed_test]
    fn foreign_content_is_backed_up_exactly_once() -> anyhow::Result<()> {
        let exec = Executor::new(Mode::Execute);
        let target = Path::new("rc");
        write(target, "original\n")?;

        let outcome = overwrite_with_backup(&exec, target, "managed v1\n")?;
        assert_eq!(outcome, BackupOutcome::Created(backup_path(target)));

        // User edits the managed file, then dotstrap runs again.
        write(target, "edited by hand\n")?;
        let outcome = overwrite_with_backup(&exec, target, "managed v2\n")?;
        assert_eq!(outcome, BackupOutcome::AlreadyBackedUp(backup_path(target)));

        let outcome = overwrite_with_backup(&exec, target, "managed v2\n")?;
        assert_eq!(outcome, BackupOutcome::NotNeeded);

        assert_eq!(read_to_string(backup_path(target))?, "original\n");
        assert_eq!(read_to_string(target)?, "managed v2\n");
        let backups = std::fs::read_dir(".")?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(BACKUP_SUFFIX))
            .count();
        assert_eq!(backups, 1);

        Ok(())
    }

    #[sealed_test]
    fn binary_target_is_backed_up() -> anyhow::Result<()> {
        let exec = Executor::new(Mode::Execute);
        let target = Path::new("icon.bin");
        write(target, b"\xff\xfe\x00\x80")?;

        let outcome = overwrite_with_backup(&exec, target, b"\x00\x01")?;
        assert_eq!(outcome, BackupOutcome::Created(backup_path(target)));
        assert_eq!(std::fs::read(backup_path(target))?, b"\xff\xfe\x00\x80");
        assert_eq!(std::fs::read(target)?, b"\x00\x01");

        let outcome = overwrite_with_backup(&exec, target, b"\x00\x01")?;
        assert_eq!(outcome, BackupOutcome::NotNeeded);

        Ok(())
    }

    #[sealed_test]
    fn preview_takes_no_backup() -> anyhow::Result<()> {
        let exec = Executor::new(Mode::Preview);
        let target = Path::new("rc");
        write(target, "original\n")?;

        let outcome = overwrite_with_backup(&exec, target, "managed\n")?;
        assert_eq!(outcome, BackupOutcome::Created(backup_path(target)));
        assert!(!backup_path(target).exists());
        assert_eq!(read_to_string(target)?, "original\n");

        Ok(())
    }
}
