// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Step catalogue.
//!
//! The provisioning sequence is plain data: an ordered list of [`Step`]s
//! built once from the profile, the run flags, and the host capabilities.
//! Nothing here runs anything by itself. The sequencer evaluates the list.
//!
//! # Install Sequence
//!
//! | step                 | phase            | fatal | depends on         |
//! |----------------------|------------------|-------|--------------------|
//! | `homebrew`           | homebrew         | yes   |                    |
//! | `packages-phase-one` | packages         | yes   | homebrew           |
//! | `shell-fragments`    | shell            | no    |                    |
//! | `shell-host-sources` | shell            | no    | shell-fragments    |
//! | `git-identity`       | git              | no    |                    |
//! | `dotfiles-clone`     | dotfiles         | no    |                    |
//! | `dotfiles-deploy`    | dotfiles         | no    | dotfiles-clone     |
//! | `packages-phase-two` | private-packages | no    | authentication     |
//! | `editor-extensions`  | editor           | no    | packages-phase-one |
//! | `macos-defaults`     | defaults         | no    |                    |
//!
//! Steps whose profile section is absent are disabled, just as if their
//! phase had been skipped on the command line.

use crate::{
    auth::AuthGate,
    backup::overwrite_with_backup,
    config::{DotfilesSettings, GitIdentity, PreferenceDefault, Profile, RunFlags},
    exec::Executor,
    fragment::{Fragment, FragmentId, FragmentManager},
    guard::{file_has_content, Guard, Verdict},
    host::{
        ExtensionHost, IdentityStore, PackageSource, PreferenceStore, RemoteRepository,
        ToolchainProbe,
    },
    step::{Dependency, Phase, Step, StepError},
};

use std::{
    collections::BTreeSet,
    fmt::{Debug, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// First line of every generated shell fragment.
pub const GENERATED_HEADER: &str = "# Generated by dotstrap. Do not edit.\n";

/// Load order and name of the fragment activating Homebrew.
pub const HOMEBREW_FRAGMENT: (u8, &str) = (0, "homebrew");

/// Load order and name of the fragment putting GNU tools first on `PATH`.
pub const GNU_TOOLS_FRAGMENT: (u8, &str) = (10, "gnu-tools");

/// Capabilities of the machine being provisioned.
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub packages: &'a dyn PackageSource,
    pub remote: &'a dyn RemoteRepository,
    pub prefs: &'a dyn PreferenceStore,
    pub editor: &'a dyn ExtensionHost,
    pub identity: &'a dyn IdentityStore,
    pub toolchain: &'a dyn ToolchainProbe,
}

impl Debug for Host<'_> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("Host").finish_non_exhaustive()
    }
}

/// File name of the profile inside the provisioning repository.
pub const PROFILE_FILE: &str = "profile.toml";

/// Repository holding the provisioning profile and manifests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningSource {
    pub url: String,
    pub dest: PathBuf,
}

impl ProvisioningSource {
    /// Path of the profile inside the checkout.
    pub fn profile_path(&self) -> PathBuf {
        self.dest.join(PROFILE_FILE)
    }

    /// Profile the install sequence can run against once bootstrap is done.
    ///
    /// Returns `None` in preview when the checkout does not exist yet,
    /// because the clone that would produce it was only previewed.
    pub fn install_profile(&self, exec: &Executor) -> Option<PathBuf> {
        let path = self.profile_path();
        (!exec.is_preview() || path.exists()).then_some(path)
    }
}

/// Build the bootstrap sequence.
///
/// Makes sure the base toolchain exists, then clones or fast-forwards the
/// provisioning repository unless it already matches its upstream. Both steps are fatal, because nothing else can
/// work without them.
pub fn bootstrap_steps<'a>(source: &'a ProvisioningSource, host: Host<'a>) -> Vec<Step<'a>> {
    let command_line_tools = Step::new("command-line-tools", Phase::Bootstrap, move |exec| {
        host.toolchain.install_command_line_tools(exec)?;
        Ok(())
    })
    .guarded_by(Guard::new(move || {
        Verdict::from_bool(host.toolchain.command_line_tools_installed())
    }))
    .fatal()
    .remedy("finish the Command Line Tools installer, then rerun dotstrap bootstrap");

    let provisioning_repo = Step::new("provisioning-repo", Phase::Bootstrap, move |exec| {
        if host.remote.is_cloned(&source.dest) {
            host.remote.pull(exec, &source.dest)?;
        } else {
            host.remote.clone_to(exec, &source.url, &source.dest)?;
        }
        Ok(())
    })
    .depends_on(Dependency::Step("command-line-tools"))
    .guarded_by(Guard::new(move || {
        if host.remote.is_cloned(&source.dest) {
            host.remote.is_current(&source.dest).into()
        } else {
            Verdict::Unsatisfied
        }
    }))
    .fatal()
    .remedy(format!(
        "make sure {} is reachable and {:?} has no local commits, then rerun dotstrap bootstrap",
        source.url,
        source.dest.display()
    ));

    vec![command_line_tools, provisioning_repo]
}

/// Build the install sequence.
pub fn install_steps<'a>(
    profile: &'a Profile,
    flags: &RunFlags,
    host: Host<'a>,
    gate: &'a AuthGate<'a>,
) -> Vec<Step<'a>> {
    let shell = FragmentManager::new(&profile.shell.fragment_dir, &profile.shell.host_rc);

    vec![
        homebrew(flags, host),
        packages_phase_one(profile, flags, host),
        shell_fragments_step(profile, shell.clone(), flags),
        shell_host_sources(shell, flags),
        git_identity(profile.git.as_ref(), flags, host),
        dotfiles_clone(profile.dotfiles.as_ref(), flags, host),
        dotfiles_deploy(profile.dotfiles.as_ref(), flags),
        packages_phase_two(profile.homebrew.phase_two.as_deref(), flags, host, gate),
        editor_extensions(profile, flags, host),
        macos_defaults(&profile.defaults, flags, host),
    ]
}

/// Shell fragments generated from profile, in load order.
pub fn shell_fragments(profile: &Profile) -> Vec<Fragment> {
    let prefix = profile.homebrew.prefix.display();
    let mut fragments = vec![Fragment::new(
        FragmentId::new(HOMEBREW_FRAGMENT.0, HOMEBREW_FRAGMENT.1),
        format!("{GENERATED_HEADER}eval \"$({prefix}/bin/brew shellenv)\"\n"),
    )];

    if !profile.homebrew.gnu_tools.is_empty() {
        let mut content = GENERATED_HEADER.to_string();
        for tool in &profile.homebrew.gnu_tools {
            content.push_str(&format!(
                "export PATH=\"{prefix}/opt/{tool}/libexec/gnubin:$PATH\"\n"
            ));
        }
        fragments.push(Fragment::new(FragmentId::new(GNU_TOOLS_FRAGMENT.0, GNU_TOOLS_FRAGMENT.1), content));
    }

    for setting in &profile.shell.fragments {
        let mut content = format!("{GENERATED_HEADER}{}", setting.content);
        if !content.ends_with('\n') {
            content.push('\n');
        }
        fragments.push(Fragment::new(
            FragmentId::new(setting.order, setting.name.as_str()),
            content,
        ));
    }

    fragments.sort_by(|a, b| a.id.cmp(&b.id));
    fragments
}

fn absent<'a>(name: &'static str, phase: Phase) -> Step<'a> {
    debug!("profile leaves nothing for {name} to do");
    Step::new(name, phase, |_| Ok(())).enabled(false)
}

fn homebrew<'a>(flags: &RunFlags, host: Host<'a>) -> Step<'a> {
    Step::new("homebrew", Phase::Homebrew, move |exec| {
        host.packages.install_manager(exec)?;
        Ok(())
    })
    .enabled(flags.is_enabled(Phase::Homebrew))
    .guarded_by(Guard::new(move || {
        Verdict::from_bool(host.packages.is_available())
    }))
    .fatal()
    .remedy("install Homebrew by hand from https://brew.sh, then rerun dotstrap")
}

fn packages_phase_one<'a>(profile: &'a Profile, flags: &RunFlags, host: Host<'a>) -> Step<'a> {
    let manifest = profile.homebrew.phase_one.as_path();

    Step::new("packages-phase-one", Phase::Packages, move |exec| {
        host.packages.update_catalog(exec)?;
        host.packages.install(exec, manifest, None)?;
        Ok(())
    })
    .enabled(flags.is_enabled(Phase::Packages))
    .depends_on(Dependency::Step("homebrew"))
    .guarded_by(Guard::new(move || {
        host.packages.check_satisfied(manifest).into()
    }))
    .fatal()
    .remedy(format!(
        "run `brew bundle install --file {}` by hand",
        manifest.display()
    ))
}

fn shell_fragments_step<'a>(profile: &Profile, shell: FragmentManager, flags: &RunFlags) -> Step<'a> {
    let fragments = shell_fragments(profile);
    let check = (shell.clone(), fragments.clone());

    Step::new("shell-fragments", Phase::Shell, move |exec| {
        shell.sync(exec, &fragments)?;
        Ok(())
    })
    .enabled(flags.is_enabled(Phase::Shell))
    .guarded_by(Guard::new(move || check.0.is_current(&check.1)))
    .remedy(format!(
        "make sure {:?} is writable",
        profile.shell.fragment_dir.display()
    ))
}

fn shell_host_sources<'a>(shell: FragmentManager, flags: &RunFlags) -> Step<'a> {
    let remedy = format!(
        "add a block sourcing {:?}/*.zsh to {:?} by hand",
        shell.dir().display(),
        shell.host().display()
    );
    let check = shell.clone();

    Step::new("shell-host-sources", Phase::Shell, move |exec| {
        shell.ensure_host_sources(exec)?;
        Ok(())
    })
    .enabled(flags.is_enabled(Phase::Shell))
    .depends_on(Dependency::Step("shell-fragments"))
    .guarded_by(Guard::new(move || check.host_sources()))
    .remedy(remedy)
}

fn identity_pairs(identity: &GitIdentity) -> [(&'static str, &str); 2] {
    [
        ("user.name", identity.name.as_str()),
        ("user.email", identity.email.as_str()),
    ]
}

fn git_identity<'a>(identity: Option<&'a GitIdentity>, flags: &RunFlags, host: Host<'a>) -> Step<'a> {
    let Some(identity) = identity else {
        return absent("git-identity", Phase::Git);
    };

    Step::new("git-identity", Phase::Git, move |exec| {
        for (key, value) in identity_pairs(identity) {
            if host.identity.get(key).ok().flatten().as_deref() != Some(value) {
                host.identity.set(exec, key, value)?;
            }
        }
        Ok(())
    })
    .enabled(flags.is_enabled(Phase::Git))
    .guarded_by(Guard::new(move || {
        Verdict::all(identity_pairs(identity).map(|(key, value)| {
            Verdict::from(
                host.identity
                    .get(key)
                    .map(|current| current.as_deref() == Some(value)),
            )
        }))
    }))
    .remedy(format!(
        "run `git config --global user.name {:?}` and `git config --global user.email {:?}`",
        identity.name, identity.email
    ))
}

fn dotfiles_clone<'a>(
    dotfiles: Option<&'a DotfilesSettings>,
    flags: &RunFlags,
    host: Host<'a>,
) -> Step<'a> {
    let Some(dotfiles) = dotfiles else {
        return absent("dotfiles-clone", Phase::Dotfiles);
    };

    Step::new("dotfiles-clone", Phase::Dotfiles, move |exec| {
        host.remote.clone_to(exec, &dotfiles.url, &dotfiles.path)?;
        Ok(())
    })
    .enabled(flags.is_enabled(Phase::Dotfiles))
    .guarded_by(Guard::new(move || {
        Verdict::from_bool(host.remote.is_cloned(&dotfiles.path))
    }))
    .remedy(format!(
        "run `git clone {} {}` by hand",
        dotfiles.url,
        dotfiles.path.display()
    ))
}

fn deployed(dotfiles: &DotfilesSettings) -> Verdict {
    Verdict::all(dotfiles.files.iter().map(|link| {
        let source = dotfiles.path.join(&link.source);
        match fs::read(&source) {
            Ok(content) => file_has_content(&link.target, content),
            Err(err) => Verdict::Unknown(format!("cannot read {:?}: {err}", source.display())),
        }
    }))
}

fn deploy(exec: &Executor, dotfiles: &DotfilesSettings) -> Result<(), StepError> {
    for link in &dotfiles.files {
        let source = dotfiles.path.join(&link.source);
        match fs::read(&source) {
            Ok(content) => {
                if !file_has_content(&link.target, &content).is_satisfied() {
                    overwrite_with_backup(exec, &link.target, &content)?;
                }
            }
            // INVARIANT: Checkout may only exist in preview, since cloning was previewed too.
            Err(_) if exec.is_preview() => exec.perform(
                format!("deploy {} to {}", source.display(), link.target.display()),
                || Ok::<(), StepError>(()),
            )?,
            Err(err) => return Err(StepError::Read { source: err, path: source }),
        }
    }

    Ok(())
}

fn dotfiles_deploy<'a>(dotfiles: Option<&'a DotfilesSettings>, flags: &RunFlags) -> Step<'a> {
    let Some(dotfiles) = dotfiles.filter(|dotfiles| !dotfiles.files.is_empty()) else {
        return absent("dotfiles-deploy", Phase::Dotfiles);
    };

    Step::new("dotfiles-deploy", Phase::Dotfiles, move |exec| deploy(exec, dotfiles))
        .enabled(flags.is_enabled(Phase::Dotfiles))
        .depends_on(Dependency::Step("dotfiles-clone"))
        .guarded_by(Guard::new(move || deployed(dotfiles)))
        .remedy(format!(
            "copy files out of {:?} by hand, originals are kept as *.dotstrap-backup",
            dotfiles.path.display()
        ))
}

fn packages_phase_two<'a>(
    manifest: Option<&'a Path>,
    flags: &RunFlags,
    host: Host<'a>,
    gate: &'a AuthGate<'a>,
) -> Step<'a> {
    let Some(manifest) = manifest else {
        return absent("packages-phase-two", Phase::PrivatePackages);
    };

    Step::new("packages-phase-two", Phase::PrivatePackages, move |exec| {
        let token = gate.token();
        host.packages.install(exec, manifest, token.as_deref())?;
        Ok(())
    })
    .enabled(flags.is_enabled(Phase::PrivatePackages))
    .depends_on(Dependency::Authentication)
    .guarded_by(Guard::new(move || {
        host.packages.check_satisfied(manifest).into()
    }))
    .remedy(format!(
        "run `gh auth login`, then `brew bundle install --file {}`",
        manifest.display()
    ))
}

fn missing_extensions<'e>(host: Host<'_>, wanted: &'e [String]) -> Vec<&'e str> {
    let installed = host.editor.list_installed().unwrap_or_else(|err| {
        debug!("cannot list installed extensions: {err}");
        BTreeSet::new()
    });

    wanted
        .iter()
        .filter(|extension| !installed.contains(&extension.to_lowercase()))
        .map(String::as_str)
        .collect()
}

fn editor_extensions<'a>(profile: &'a Profile, flags: &RunFlags, host: Host<'a>) -> Step<'a> {
    let Some(extensions) = profile
        .editor
        .as_ref()
        .map(|editor| editor.extensions.as_slice())
        .filter(|extensions| !extensions.is_empty())
    else {
        return absent("editor-extensions", Phase::Editor);
    };

    Step::new("editor-extensions", Phase::Editor, move |exec| {
        let mut failed = Vec::new();
        for extension in missing_extensions(host, extensions) {
            if let Err(err) = host.editor.install(exec, extension) {
                warn!("cannot install extension {extension}: {err}");
                failed.push(extension);
            }
        }

        if !failed.is_empty() {
            return Err(StepError::Message(format!(
                "failed to install extensions: {}",
                failed.join(", ")
            )));
        }

        Ok(())
    })
    .enabled(flags.is_enabled(Phase::Editor))
    .depends_on(Dependency::Step("packages-phase-one"))
    .guarded_by(Guard::new(move || {
        host.editor
            .list_installed()
            .map(|installed| {
                extensions
                    .iter()
                    .all(|extension| installed.contains(&extension.to_lowercase()))
            })
            .into()
    }))
    .remedy("run `code --install-extension <id>` for each missing extension")
}

fn default_holds(host: Host<'_>, default: &PreferenceDefault) -> Verdict {
    host.prefs
        .read(&default.domain, &default.key)
        .map(|current| match (&default.value, current) {
            (Some(value), Some(current)) => value.matches(&current),
            (None, None) => true,
            _ => false,
        })
        .into()
}

fn macos_defaults<'a>(defaults: &'a [PreferenceDefault], flags: &RunFlags, host: Host<'a>) -> Step<'a> {
    if defaults.is_empty() {
        return absent("macos-defaults", Phase::Defaults);
    }

    Step::new("macos-defaults", Phase::Defaults, move |exec| {
        for default in defaults {
            if default_holds(host, default).is_satisfied() {
                continue;
            }

            match &default.value {
                Some(value) => host.prefs.write(exec, &default.domain, &default.key, value)?,
                None => host.prefs.delete(exec, &default.domain, &default.key)?,
            }
        }
        Ok(())
    })
    .enabled(flags.is_enabled(Phase::Defaults))
    .guarded_by(Guard::new(move || {
        Verdict::all(defaults.iter().map(|default| default_holds(host, default)))
    }))
    .remedy("apply the remaining defaults with `defaults write` by hand")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{DotfileLink, FragmentSetting},
        exec::Mode,
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[test]
    fn fragments_follow_load_order() {
        let mut profile = Profile::default();
        profile.homebrew.gnu_tools = vec!["coreutils".into(), "gnu-sed".into()];
        profile.shell.fragments = vec![FragmentSetting {
            order: 5,
            name: "aliases".into(),
            content: "alias ll='ls -l'".into(),
        }];

        let fragments = shell_fragments(&profile);
        let names = fragments
            .iter()
            .map(|fragment| fragment.id.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["00-homebrew.zsh", "05-aliases.zsh", "10-gnu-tools.zsh"]);

        let expect = indoc! {r#"
            # Generated by dotstrap. Do not edit.
            export PATH="/opt/homebrew/opt/coreutils/libexec/gnubin:$PATH"
            export PATH="/opt/homebrew/opt/gnu-sed/libexec/gnubin:$PATH"
        "#};
        assert_eq!(fragments[2].content, expect);
        assert_eq!(
            fragments[1].content,
            "# Generated by dotstrap. Do not edit.\nalias ll='ls -l'\n"
        );
    }

    #[test]
    fn gnu_tools_fragment_is_omitted_without_tools() {
        let mut profile = Profile::default();
        profile.homebrew.gnu_tools.clear();

        let fragments = shell_fragments(&profile);
        assert_eq!(fragments.len(), 1);
        assert_eq!(
            fragments[0].content,
            "# Generated by dotstrap. Do not edit.\neval \"$(/opt/homebrew/bin/brew shellenv)\"\n"
        );
    }

    #[sealed_test]
    fn binary_dotfiles_converge() -> anyhow::Result<()> {
        std::fs::create_dir_all("dots/icons")?;
        std::fs::write("dots/icons/icon.bin", b"\xff\xfe\x00\x80")?;
        std::fs::write("icon.bin", b"\x00")?;
        let dotfiles = DotfilesSettings {
            url: "https://example.com/dotfiles.git".into(),
            path: "dots".into(),
            files: vec![DotfileLink {
                source: "icons/icon.bin".into(),
                target: "icon.bin".into(),
            }],
        };
        let exec = Executor::new(Mode::Execute);

        assert_eq!(deployed(&dotfiles), Verdict::Unsatisfied);
        deploy(&exec, &dotfiles)?;
        assert_eq!(deployed(&dotfiles), Verdict::Satisfied);
        assert_eq!(std::fs::read("icon.bin")?, b"\xff\xfe\x00\x80");
        assert_eq!(std::fs::read("icon.bin.dotstrap-backup")?, b"\x00");

        exec.take_journal();
        deploy(&exec, &dotfiles)?;
        assert!(exec.take_journal().is_empty());

        Ok(())
    }
}
