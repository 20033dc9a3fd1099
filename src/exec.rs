// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Action execution seam.
//!
//! Every side effect dotstrap performs goes through an [`Executor`]. An
//! executor runs in one of two modes: [`Mode::Execute`] performs the effect,
//! while [`Mode::Preview`] only records a human readable description of it.
//! Both modes record what they did (or would do) into a __journal__, which
//! the sequencer collects per step for the end-of-run report.
//!
//! Read-only queries, e.g., asking the package manager whether a manifest is
//! already installed, do not go through the executor. They are issued
//! directly through [`CommandLine::output`] and friends, because they must
//! behave the same way in both modes.

use std::{
    cell::RefCell,
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info};

/// Execution mode of an [`Executor`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Perform side effects.
    #[default]
    Execute,

    /// Describe side effects without performing them.
    Preview,
}

impl Display for Mode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Execute => fmt.write_str("execute"),
            Self::Preview => fmt.write_str("preview"),
        }
    }
}

/// Single execution seam for side effects.
#[derive(Debug, Default)]
pub struct Executor {
    mode: Mode,
    journal: RefCell<Vec<String>>,
}

impl Executor {
    /// Construct new executor in target mode.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            journal: RefCell::new(Vec::new()),
        }
    }

    /// Current execution mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Check if executor only previews side effects.
    pub fn is_preview(&self) -> bool {
        self.mode == Mode::Preview
    }

    /// Perform a side effect described by `intent`.
    ///
    /// The intent is journaled in both modes. The effect itself is only
    /// invoked in [`Mode::Execute`].
    ///
    /// # Errors
    ///
    /// - Return whatever error the effect itself produces.
    pub fn perform<F, E>(&self, intent: impl Into<String>, effect: F) -> Result<(), E>
    where
        F: FnOnce() -> Result<(), E>,
    {
        let intent = intent.into();
        self.journal.borrow_mut().push(intent.clone());
        match self.mode {
            Mode::Preview => {
                info!("would {intent}");
                Ok(())
            }
            Mode::Execute => {
                debug!("{intent}");
                effect()
            }
        }
    }

    /// Drain journaled intents recorded so far.
    pub fn take_journal(&self) -> Vec<String> {
        self.journal.take()
    }

    /// Run command without attaching it to the terminal.
    ///
    /// Output is captured and logged at debug level.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Spawn`] if command cannot be started.
    /// - Return [`ExecError::Syscall`] if command exits unsuccessfully.
    pub fn command(&self, cmd: &CommandLine) -> Result<()> {
        self.perform(format!("run {cmd}"), || {
            let output = cmd.output()?;
            if !output.is_empty() {
                debug!("{output}");
            }
            Ok(())
        })
    }

    /// Run command attached to the terminal, blocking until it exits.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Spawn`] if command cannot be started.
    /// - Return [`ExecError::Syscall`] if command exits unsuccessfully.
    pub fn interactive(&self, cmd: &CommandLine) -> Result<()> {
        self.perform(format!("run {cmd} interactively"), || cmd.run_interactive())
    }

    /// Write full file content, replacing whatever was there.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Write`] if file cannot be written.
    pub fn write_file(&self, path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
        self.perform(format!("write {}", path.display()), || {
            fs::write(path, contents.as_ref()).map_err(|err| ExecError::Write {
                source: err,
                path: path.to_path_buf(),
            })
        })
    }

    /// Copy file from one path to another.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Copy`] if file cannot be copied.
    pub fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        self.perform(
            format!("copy {} to {}", from.display(), to.display()),
            || {
                fs::copy(from, to)
                    .map(|_| ())
                    .map_err(|err| ExecError::Copy {
                        source: err,
                        from: from.to_path_buf(),
                        to: to.to_path_buf(),
                    })
            },
        )
    }

    /// Remove file.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Remove`] if file cannot be removed.
    pub fn remove_file(&self, path: &Path) -> Result<()> {
        self.perform(format!("remove {}", path.display()), || {
            fs::remove_file(path).map_err(|err| ExecError::Remove {
                source: err,
                path: path.to_path_buf(),
            })
        })
    }

    /// Create directory along with any missing parents.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::CreateDir`] if directory cannot be created.
    pub fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.perform(format!("create directory {}", path.display()), || {
            mkdirp::mkdirp(path)
                .map(|_| ())
                .map_err(|err| ExecError::CreateDir {
                    source: err,
                    path: path.to_path_buf(),
                })
        })
    }
}

/// External command invocation.
///
/// Environment variables handed to a command are considered secret, and are
/// never rendered into logs or journals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl CommandLine {
    /// Construct new command invocation of target program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Append argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append listing of arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set environment variable for command.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.envs(self.envs.iter().map(|(key, value)| (key, value)));
        command
    }

    /// Run command to completion, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Spawn`] if command cannot be started.
    /// - Return [`ExecError::Syscall`] if command exits unsuccessfully.
    pub fn output(&self) -> Result<String> {
        let output = self.to_command().output().map_err(|err| ExecError::Spawn {
            source: err,
            command: self.to_string(),
        })?;
        let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
        let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
        let mut message = String::new();

        if !stdout.is_empty() {
            message.push_str(stdout.as_str());
        }

        if !stderr.is_empty() {
            if !message.is_empty() && !message.ends_with('\n') {
                message.push('\n');
            }
            message.push_str(stderr.as_str());
        }

        // INVARIANT: Chomp trailing newlines.
        let message = message.trim_end_matches(['\r', '\n']).to_string();

        if !output.status.success() {
            return Err(ExecError::Syscall {
                command: self.to_string(),
                message,
            });
        }

        Ok(message)
    }

    /// Run command to completion, returning only its standard output.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Spawn`] if command cannot be started.
    /// - Return [`ExecError::Syscall`] if command exits unsuccessfully.
    pub fn stdout(&self) -> Result<String> {
        let output = self.to_command().output().map_err(|err| ExecError::Spawn {
            source: err,
            command: self.to_string(),
        })?;

        if !output.status.success() {
            return Err(ExecError::Syscall {
                command: self.to_string(),
                message: String::from_utf8_lossy(output.stderr.as_slice())
                    .trim_end()
                    .to_string(),
            });
        }

        Ok(String::from_utf8_lossy(output.stdout.as_slice())
            .trim_end()
            .to_string())
    }

    /// Check whether command exits successfully.
    ///
    /// A command that cannot be started counts as unsuccessful.
    pub fn succeeds(&self) -> bool {
        self.to_command()
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Run command attached to the current terminal.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Spawn`] if command cannot be started.
    /// - Return [`ExecError::Syscall`] if command exits unsuccessfully.
    pub fn run_interactive(&self) -> Result<()> {
        let status = self
            .to_command()
            .spawn()
            .and_then(|mut child| child.wait())
            .map_err(|err| ExecError::Spawn {
                source: err,
                command: self.to_string(),
            })?;

        if !status.success() {
            return Err(ExecError::Syscall {
                command: self.to_string(),
                message: format!("exited with {status}"),
            });
        }

        Ok(())
    }
}

impl Display for CommandLine {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for (key, _) in &self.envs {
            write!(fmt, "{}=*** ", key.to_string_lossy())?;
        }
        fmt.write_str(&self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(fmt, " {}", quote(arg))?;
        }

        Ok(())
    }
}

fn quote(arg: &OsStr) -> String {
    let arg = arg.to_string_lossy();
    if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '$') {
        format!("{arg:?}")
    } else {
        arg.into_owned()
    }
}

/// Execution error types.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Command cannot be started.
    #[error("failed to start {command}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Command exited unsuccessfully.
    #[error("command {command} failed:\n{message}")]
    Syscall { command: String, message: String },

    /// File cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File cannot be copied.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// File cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ExecError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn preview_journals_without_side_effects() -> anyhow::Result<()> {
        let exec = Executor::new(Mode::Preview);
        let dir = Path::new("nested/dir");
        let file = dir.join("file.txt");

        exec.create_dir_all(dir)?;
        exec.write_file(&file, "hello")?;
        exec.command(&CommandLine::new("false"))?;

        assert!(!dir.exists());
        assert_eq!(
            exec.take_journal(),
            vec![
                "create directory nested/dir".to_string(),
                "write nested/dir/file.txt".to_string(),
                "run false".to_string(),
            ]
        );
        assert!(exec.take_journal().is_empty());

        Ok(())
    }

    #[sealed_test]
    fn execute_performs_and_journals() -> anyhow::Result<()> {
        let exec = Executor::new(Mode::Execute);
        let dir = Path::new("nested/dir");
        let file = dir.join("file.txt");

        exec.create_dir_all(dir)?;
        exec.write_file(&file, "hello")?;
        exec.copy_file(&file, &dir.join("copy.txt"))?;

        assert_eq!(fs::read_to_string(dir.join("copy.txt"))?, "hello");
        assert_eq!(exec.take_journal().len(), 3);

        Ok(())
    }

    #[test]
    fn failed_command_reports_syscall_error() {
        let exec = Executor::new(Mode::Execute);
        let result = exec.command(&CommandLine::new("false"));
        assert!(matches!(result, Err(ExecError::Syscall { .. })));
    }

    #[test]
    fn command_line_display_hides_environment_values() {
        let cmd = CommandLine::new("brew")
            .args(["bundle", "install", "--file", "/tmp/my Brewfile"])
            .env("HOMEBREW_GITHUB_API_TOKEN", "hunter2");

        assert_eq!(
            cmd.to_string(),
            r#"HOMEBREW_GITHUB_API_TOKEN=*** brew bundle install --file "/tmp/my Brewfile""#
        );
    }
}
