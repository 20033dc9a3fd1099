// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotstrap::{
    bootstrap_steps,
    host::{
        Git2Identity, Git2Remote, GithubCli, Homebrew, MacDefaults, RemoteRepository, VsCode,
        XcodeSelect,
    },
    install_steps,
    keepalive::{acquire_privilege, KeepAlive, SUDO_REFRESH_PERIOD},
    path::{default_profile_path, default_provisioning_dir},
    preflight::{check_host, current_uid},
    AuthGate, Executor, Host, Mode, Phase, Profile, ProvisioningSource, RunFlags, Sequencer,
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use inquire::Confirm;
use std::{
    fs::read_to_string,
    io::IsTerminal,
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "dotstrap [options] <dotstrap-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<i32> {
        match self.command {
            Command::Install(opts) => {
                preflight()?;
                run_install(&self.global, &opts.skip, None)
            }
            Command::Bootstrap(opts) => {
                preflight()?;
                run_bootstrap(&self.global, opts)
            }
            Command::Init(opts) => run_init(&self.global, opts).map(|()| 0),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Provision workstation from profile.
    #[command(override_usage = "dotstrap install [options]")]
    Install(InstallOptions),

    /// Install base toolchain, fetch provisioning repository, then provision.
    #[command(override_usage = "dotstrap bootstrap [options] [--repo <url>] [--dest <path>]")]
    Bootstrap(BootstrapOptions),

    /// Write starter profile.
    #[command(override_usage = "dotstrap init [options] [<path>]")]
    Init(InitOptions),
}

#[derive(Args, Clone, Debug)]
struct GlobalOptions {
    /// Describe every action without performing any of them.
    #[arg(long, visible_alias = "dry-run", global = true)]
    pub preview: bool,

    /// Trace every action in detail.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Never prompt, skip whatever needs a prompt instead.
    #[arg(long, global = true)]
    pub non_interactive: bool,

    /// Path to provisioning profile.
    #[arg(long, value_name = "path", global = true)]
    pub profile: Option<PathBuf>,
}

#[derive(Args, Clone, Debug, Default)]
struct SkipOptions {
    /// Do not install Homebrew.
    #[arg(long)]
    pub skip_homebrew: bool,

    /// Do not install first phase packages.
    #[arg(long)]
    pub skip_packages: bool,

    /// Do not install second phase packages from private sources.
    #[arg(long)]
    pub skip_private_packages: bool,

    /// Do not touch shell configuration.
    #[arg(long)]
    pub skip_shell: bool,

    /// Do not configure git identity.
    #[arg(long)]
    pub skip_git: bool,

    /// Do not clone or deploy dotfiles.
    #[arg(long)]
    pub skip_dotfiles: bool,

    /// Do not install editor extensions.
    #[arg(long)]
    pub skip_editor: bool,

    /// Do not write system preference defaults.
    #[arg(long)]
    pub skip_defaults: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallOptions {
    #[command(flatten)]
    pub skip: SkipOptions,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct BootstrapOptions {
    /// URL of provisioning repository, needed unless it is already cloned.
    #[arg(long, value_name = "url")]
    pub repo: Option<String>,

    /// Where provisioning repository lives, defaults to ~/.dotstrap.
    #[arg(long, value_name = "path")]
    pub dest: Option<PathBuf>,

    #[command(flatten)]
    pub skip: SkipOptions,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Overwrite existing profile without asking.
    #[arg(short, long)]
    pub force: bool,

    /// Where to write profile, defaults to standard profile path.
    #[arg(value_name = "path")]
    pub path: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.global.verbose { "debug" } else { "info" };
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match cli.run().await {
        Ok(code) => exit(code),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

fn run_flags(global: &GlobalOptions, skip: &SkipOptions) -> RunFlags {
    let mode = if global.preview {
        Mode::Preview
    } else {
        Mode::Execute
    };
    let interactive = !global.non_interactive && std::io::stdin().is_terminal();

    RunFlags::new(mode, interactive)
        .skip_if(skip.skip_homebrew, Phase::Homebrew)
        .skip_if(skip.skip_packages, Phase::Packages)
        .skip_if(skip.skip_private_packages, Phase::PrivatePackages)
        .skip_if(skip.skip_shell, Phase::Shell)
        .skip_if(skip.skip_git, Phase::Git)
        .skip_if(skip.skip_dotfiles, Phase::Dotfiles)
        .skip_if(skip.skip_editor, Phase::Editor)
        .skip_if(skip.skip_defaults, Phase::Defaults)
}

fn preflight() -> Result<()> {
    check_host(std::env::consts::OS, current_uid()?)?;
    Ok(())
}

fn load_profile(path: &Path) -> Result<Profile> {
    let data = read_to_string(path)
        .with_context(|| format!("cannot read profile {:?}, try `dotstrap init`", path.display()))?;
    let profile = data
        .parse::<Profile>()
        .with_context(|| format!("invalid profile {:?}", path.display()))?;

    Ok(profile)
}

fn keep_privileges(flags: &RunFlags) -> Result<Option<KeepAlive>> {
    let needs_sudo = flags.is_enabled(Phase::Homebrew) || flags.is_enabled(Phase::Packages);
    if flags.mode() == Mode::Preview || !needs_sudo {
        return Ok(None);
    }

    if !flags.is_interactive() {
        warn!("non-interactive session, relying on cached or passwordless sudo");
        return Ok(None);
    }

    info!("administrator privileges are needed to install packages");
    acquire_privilege().context("administrator privileges refused")?;

    Ok(Some(KeepAlive::sudo(SUDO_REFRESH_PERIOD)))
}

fn run_install(global: &GlobalOptions, skip: &SkipOptions, fallback: Option<&Path>) -> Result<i32> {
    let flags = run_flags(global, skip);

    let path = match (&global.profile, fallback) {
        (Some(path), _) => path.clone(),
        (None, Some(path)) => path.to_path_buf(),
        (None, None) => default_profile_path()?,
    };
    let profile = load_profile(&path)?;
    let _keepalive = keep_privileges(&flags)?;

    let homebrew = Homebrew::new(&profile.homebrew.prefix, flags.is_interactive());
    let remote = Git2Remote;
    let prefs = MacDefaults;
    let editor = VsCode::default();
    let identity = Git2Identity;
    let toolchain = XcodeSelect;
    let github = GithubCli::default();
    let host = Host {
        packages: &homebrew,
        remote: &remote,
        prefs: &prefs,
        editor: &editor,
        identity: &identity,
        toolchain: &toolchain,
    };

    let gate = AuthGate::new(&github, flags.is_interactive());
    let exec = Executor::new(flags.mode());
    let report = Sequencer::new(install_steps(&profile, &flags, host, &gate))
        .with_gate(&gate)
        .run(&exec);
    println!("{report}");

    Ok(report.exit_code())
}

fn run_bootstrap(global: &GlobalOptions, opts: BootstrapOptions) -> Result<i32> {
    let flags = run_flags(global, &opts.skip);

    let dest = match opts.dest {
        Some(dest) => dest,
        None => default_provisioning_dir()?,
    };
    let remote = Git2Remote;
    let url = match opts.repo {
        Some(url) => url,
        None if remote.is_cloned(&dest) => String::new(),
        None => bail!(
            "no provisioning repository at {:?}, pass --repo <url> to clone one",
            dest.display()
        ),
    };
    let source = ProvisioningSource { url, dest };

    let homebrew = Homebrew::new("/opt/homebrew", flags.is_interactive());
    let prefs = MacDefaults;
    let editor = VsCode::default();
    let identity = Git2Identity;
    let toolchain = XcodeSelect;
    let host = Host {
        packages: &homebrew,
        remote: &remote,
        prefs: &prefs,
        editor: &editor,
        identity: &identity,
        toolchain: &toolchain,
    };

    let exec = Executor::new(flags.mode());
    let report = Sequencer::new(bootstrap_steps(&source, host)).run(&exec);
    println!("{report}");
    if report.is_aborted() {
        return Ok(report.exit_code());
    }

    let profile = source.install_profile(&exec);
    if global.profile.is_none() && profile.is_none() {
        info!(
            "install sequence runs against {:?} once it is cloned",
            source.profile_path().display()
        );
        return Ok(report.exit_code());
    }

    run_install(global, &opts.skip, profile.as_deref())
}

fn run_init(global: &GlobalOptions, opts: InitOptions) -> Result<()> {
    let path = match opts.path.or_else(|| global.profile.clone()) {
        Some(path) => path,
        None => default_profile_path()?,
    };

    if path.exists() && !opts.force {
        if global.non_interactive || !std::io::stdin().is_terminal() {
            bail!("{:?} already exists, pass --force to overwrite it", path.display());
        }

        let overwrite = Confirm::new(&format!("overwrite existing profile {:?}?", path.display()))
            .with_default(false)
            .prompt()?;
        if !overwrite {
            info!("keep existing profile {:?}", path.display());
            return Ok(());
        }
    }

    let exec = Executor::new(if global.preview {
        Mode::Preview
    } else {
        Mode::Execute
    });
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty() && !parent.is_dir());
    if let Some(parent) = parent {
        exec.create_dir_all(parent)?;
    }
    exec.write_file(&path, &Profile::default().to_string())?;
    info!("starter profile written to {:?}", path.display());

    Ok(())
}
