// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the provisioning profile to simplify the process of
//! serialization and deserialization, along with the immutable run flags
//! built from the command line. File I/O is left to the caller to figure
//! out.

use crate::{
    catalog::{GNU_TOOLS_FRAGMENT, HOMEBREW_FRAGMENT},
    exec::Mode,
    fragment::{check_ids, FragmentId},
    host::PrefValue,
    step::Phase,
};

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Provisioning profile layout.
///
/// A __profile__ describes the workstation dotstrap should produce. Every
/// section besides `homebrew` and `shell` is optional. Leaving a section out
/// switches off the steps that would act on it.
#[derive(Debug, Default, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Package manager and package manifests.
    pub homebrew: HomebrewSettings,

    /// Shell fragments and host startup file.
    pub shell: ShellSettings,

    /// Git identity to configure globally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitIdentity>,

    /// Dotfiles repository to clone and deploy from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dotfiles: Option<DotfilesSettings>,

    /// Editor extensions to install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<EditorSettings>,

    /// System preference defaults.
    #[serde(default, rename = "default", skip_serializing_if = "Vec::is_empty")]
    pub defaults: Vec<PreferenceDefault>,
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut profile: Profile = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        let homebrew = &mut profile.homebrew;
        homebrew.prefix = expand(&homebrew.prefix)?;
        homebrew.phase_one = expand(&homebrew.phase_one)?;
        if let Some(phase_two) = &homebrew.phase_two {
            homebrew.phase_two = Some(expand(phase_two)?);
        }

        profile.shell.host_rc = expand(&profile.shell.host_rc)?;
        profile.shell.fragment_dir = expand(&profile.shell.fragment_dir)?;

        if let Some(dotfiles) = &mut profile.dotfiles {
            dotfiles.path = expand(&dotfiles.path)?;
            for file in &mut dotfiles.files {
                file.target = expand(&file.target)?;
            }
        }

        // INVARIANT: Declared fragments never clash with each other or with generated ones.
        let generated = [HOMEBREW_FRAGMENT, GNU_TOOLS_FRAGMENT]
            .map(|(order, name)| FragmentId::new(order, name));
        let declared = profile
            .shell
            .fragments
            .iter()
            .map(|setting| FragmentId::new(setting.order, setting.name.as_str()))
            .collect::<Vec<_>>();
        check_ids(generated.iter().chain(&declared)).map_err(|err| ConfigError::Fragment {
            reason: err.to_string(),
        })?;

        Ok(profile)
    }
}

impl Display for Profile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Homebrew settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct HomebrewSettings {
    /// Installation prefix of Homebrew.
    #[serde(default = "default_prefix")]
    pub prefix: PathBuf,

    /// Manifest of first phase packages, installable without credentials.
    pub phase_one: PathBuf,

    /// Manifest of second phase packages, needing authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_two: Option<PathBuf>,

    /// GNU packages whose unprefixed binaries go first on `PATH`.
    #[serde(default)]
    pub gnu_tools: Vec<String>,
}

impl Default for HomebrewSettings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            phase_one: PathBuf::from("~/.dotstrap/Brewfile"),
            phase_two: None,
            gnu_tools: ["coreutils", "findutils", "gnu-sed", "gnu-tar", "grep"]
                .map(String::from)
                .to_vec(),
        }
    }
}

fn default_prefix() -> PathBuf {
    PathBuf::from("/opt/homebrew")
}

/// Shell settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ShellSettings {
    /// Shell startup file that must source fragments.
    pub host_rc: PathBuf,

    /// Managed directory holding fragments.
    pub fragment_dir: PathBuf,

    /// Additional fragments declared by user.
    #[serde(default, rename = "fragment", skip_serializing_if = "Vec::is_empty")]
    pub fragments: Vec<FragmentSetting>,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            host_rc: PathBuf::from("~/.zshrc"),
            fragment_dir: PathBuf::from("~/.config/dotstrap/zsh"),
            fragments: Vec::new(),
        }
    }
}

/// User declared shell fragment.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct FragmentSetting {
    /// Load order from 0 to 99, lower loads first.
    pub order: u8,

    /// Logical name of fragment.
    pub name: String,

    /// Content of fragment.
    pub content: String,
}

/// Git identity.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

/// Dotfiles settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DotfilesSettings {
    /// Remote URL to clone dotfiles from.
    pub url: String,

    /// Local checkout of dotfiles repository.
    pub path: PathBuf,

    /// Files to deploy out of checkout.
    #[serde(default, rename = "file", skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<DotfileLink>,
}

/// File deployed from dotfiles checkout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DotfileLink {
    /// Path relative to dotfiles checkout.
    pub source: PathBuf,

    /// Absolute deployment target.
    pub target: PathBuf,
}

/// Editor settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct EditorSettings {
    /// Extension identifiers to install.
    pub extensions: Vec<String>,
}

/// Preference default to enforce.
///
/// Leaving `value` out means the key must not be set at all.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PreferenceDefault {
    pub domain: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<PrefValue>,
}

fn expand(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Immutable flags of one run.
///
/// Built once from the command line before any step runs, and handed to
/// the step catalogue by reference.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunFlags {
    mode: Mode,
    interactive: bool,
    skipped: BTreeSet<Phase>,
}

impl RunFlags {
    /// Construct new flags with every phase enabled.
    pub fn new(mode: Mode, interactive: bool) -> Self {
        Self {
            mode,
            interactive,
            skipped: BTreeSet::new(),
        }
    }

    /// Disable target phase.
    pub fn skip(mut self, phase: Phase) -> Self {
        self.skipped.insert(phase);
        self
    }

    /// Disable target phase if `skip` is true.
    pub fn skip_if(self, skip: bool, phase: Phase) -> Self {
        if skip {
            self.skip(phase)
        } else {
            self
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Check if target phase is enabled.
    pub fn is_enabled(&self, phase: Phase) -> bool {
        !self.skipped.contains(&phase)
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Shell fragment cannot be managed as declared.
    #[error("invalid shell fragment: {reason}")]
    Fragment { reason: String },

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("HOME", "/home/blah"), ("BREWFILES", "/srv/brew")])]
    fn deserialize_profile() -> anyhow::Result<()> {
        let result: Profile = indoc! {r#"
            [homebrew]
            phase_one = "$BREWFILES/Brewfile"
            phase_two = "$BREWFILES/Brewfile.private"
            gnu_tools = ["coreutils"]

            [shell]
            host_rc = "~/.zshrc"
            fragment_dir = "~/.config/dotstrap/zsh"

            [[shell.fragment]]
            order = 30
            name = "aliases"
            content = "alias ll='ls -l'\n"

            [git]
            name = "John Doe"
            email = "john@doe.com"

            [dotfiles]
            url = "https://blah.org/dotfiles.git"
            path = "~/.dotfiles"

            [[dotfiles.file]]
            source = "vim/vimrc"
            target = "~/.vimrc"

            [editor]
            extensions = ["rust-lang.rust-analyzer"]

            [[default]]
            domain = "com.apple.dock"
            key = "autohide"
            value = true

            [[default]]
            domain = "com.apple.dock"
            key = "tilesize"
            value = 36

            [[default]]
            domain = "com.apple.finder"
            key = "FXPreferredViewStyle"
        "#}
        .parse()?;

        let expect = Profile {
            homebrew: HomebrewSettings {
                prefix: "/opt/homebrew".into(),
                phase_one: "/srv/brew/Brewfile".into(),
                phase_two: Some("/srv/brew/Brewfile.private".into()),
                gnu_tools: vec!["coreutils".into()],
            },
            shell: ShellSettings {
                host_rc: "/home/blah/.zshrc".into(),
                fragment_dir: "/home/blah/.config/dotstrap/zsh".into(),
                fragments: vec![FragmentSetting {
                    order: 30,
                    name: "aliases".into(),
                    content: "alias ll='ls -l'\n".into(),
                }],
            },
            git: Some(GitIdentity {
                name: "John Doe".into(),
                email: "john@doe.com".into(),
            }),
            dotfiles: Some(DotfilesSettings {
                url: "https://blah.org/dotfiles.git".into(),
                path: "/home/blah/.dotfiles".into(),
                files: vec![DotfileLink {
                    source: "vim/vimrc".into(),
                    target: "/home/blah/.vimrc".into(),
                }],
            }),
            editor: Some(EditorSettings {
                extensions: vec!["rust-lang.rust-analyzer".into()],
            }),
            defaults: vec![
                PreferenceDefault {
                    domain: "com.apple.dock".into(),
                    key: "autohide".into(),
                    value: Some(PrefValue::Bool(true)),
                },
                PreferenceDefault {
                    domain: "com.apple.dock".into(),
                    key: "tilesize".into(),
                    value: Some(PrefValue::Int(36)),
                },
                PreferenceDefault {
                    domain: "com.apple.finder".into(),
                    key: "FXPreferredViewStyle".into(),
                    value: None,
                },
            ],
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test(env = [("HOME", "/home/blah")])]
    fn default_profile_parses_back() -> anyhow::Result<()> {
        let rendered = Profile::default().to_string();
        let result: Profile = rendered.parse()?;

        assert_eq!(result.shell.host_rc, PathBuf::from("/home/blah/.zshrc"));
        assert_eq!(result.homebrew.phase_one, PathBuf::from("/home/blah/.dotstrap/Brewfile"));
        assert_eq!(result.homebrew.gnu_tools, Profile::default().homebrew.gnu_tools);
        assert!(result.git.is_none());

        Ok(())
    }

    #[test]
    fn missing_shell_section_is_rejected() {
        let result = "[homebrew]\nphase_one = \"/Brewfile\"\n".parse::<Profile>();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[test]
    fn unmanageable_fragments_are_rejected() {
        let fragment = |order: u8, name: &str| {
            format!(
                "[homebrew]\nphase_one = \"/Brewfile\"\n\n\
                 [shell]\nhost_rc = \"/zshrc\"\nfragment_dir = \"/zsh\"\n\n\
                 [[shell.fragment]]\norder = {order}\nname = \"{name}\"\ncontent = \"\"\n"
            )
        };

        assert!(fragment(99, "late").parse::<Profile>().is_ok());
        for (order, name) in [(100, "late"), (0, "homebrew"), (10, "gnu-tools"), (5, "")] {
            let result = fragment(order, name).parse::<Profile>();
            assert!(
                matches!(result, Err(ConfigError::Fragment { .. })),
                "{order}-{name} was accepted"
            );
        }
    }

    #[test]
    fn duplicate_fragments_are_rejected() {
        let result = indoc! {r#"
            [homebrew]
            phase_one = "/Brewfile"

            [shell]
            host_rc = "/zshrc"
            fragment_dir = "/zsh"

            [[shell.fragment]]
            order = 30
            name = "aliases"
            content = "alias ll='ls -l'"

            [[shell.fragment]]
            order = 30
            name = "aliases"
            content = "alias la='ls -a'"
        "#}
        .parse::<Profile>();

        assert!(matches!(result, Err(ConfigError::Fragment { .. })));
    }

    #[test]
    fn run_flags_gate_phases() {
        let flags = RunFlags::new(Mode::Preview, false)
            .skip(Phase::Editor)
            .skip_if(false, Phase::Shell);

        assert!(!flags.is_enabled(Phase::Editor));
        assert!(flags.is_enabled(Phase::Shell));
        assert_eq!(flags.mode(), Mode::Preview);
        assert!(!flags.is_interactive());
    }
}
