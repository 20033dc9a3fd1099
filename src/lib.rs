// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Idempotent workstation provisioning.
//!
//! Dotstrap provisions a developer workstation through an ordered list of
//! __steps__. Each step can be switched off by a flag, knows how to detect
//! that its work is already done, and routes every side effect through a
//! single [`Executor`] so that a preview run forecasts a real run exactly.
//!
//! Re-running dotstrap is the retry mechanism. Nothing is rolled back when a
//! run stops half way, because every step can tell whether it still has
//! anything left to do.

pub mod auth;
pub mod backup;
pub mod catalog;
pub mod config;
pub mod exec;
pub mod fragment;
pub mod guard;
pub mod host;
pub mod keepalive;
pub mod path;
pub mod preflight;
pub mod sequencer;
pub mod step;

pub use auth::AuthGate;
pub use catalog::{bootstrap_steps, install_steps, Host, ProvisioningSource};
pub use config::{Profile, RunFlags};
pub use exec::{CommandLine, Executor, Mode};
pub use sequencer::{RunReport, Sequencer};
pub use step::{Dependency, Fatality, Outcome, Phase, Step};
