// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Phase sequencer.
//!
//! The sequencer walks an ordered list of steps exactly once. For each step
//! it checks, in this order:
//!
//! 1. Is the step enabled? If not, it is skipped by flag.
//! 2. Is its dependency met? If not, it is skipped with a warning.
//! 3. Does its guard report the work as done? If so, it is already satisfied.
//! 4. Otherwise its action runs, and the step is applied or failed.
//!
//! The sequencer is the only place that decides whether a failure stops the
//! run. Steps are never reordered, and never retried within one run.

use crate::{
    auth::AuthGate,
    exec::{Executor, Mode},
    guard::Verdict,
    step::{Dependency, Fatality, Outcome, Phase, Step},
};

use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{debug, error, info, instrument, warn};

/// Run an ordered list of steps.
#[derive(Debug)]
pub struct Sequencer<'a> {
    steps: Vec<Step<'a>>,
    gate: Option<&'a AuthGate<'a>>,
}

impl<'a> Sequencer<'a> {
    /// Construct new sequencer over target steps.
    pub fn new(steps: Vec<Step<'a>>) -> Self {
        Self { steps, gate: None }
    }

    /// Attach authentication gate for steps that depend on it.
    ///
    /// Without a gate, authentication dependencies are never met.
    pub fn with_gate(mut self, gate: &'a AuthGate<'a>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Steps in run order.
    pub fn steps(&self) -> &[Step<'a>] {
        &self.steps
    }

    /// Run every step in order.
    ///
    /// Returns the report of the run. A fatal failure stops the run, leaving
    /// later steps without a record.
    #[instrument(skip(self, exec), fields(mode = %exec.mode()), level = "debug")]
    pub fn run(&self, exec: &Executor) -> RunReport {
        let mut report = RunReport::new(exec.mode());

        for step in &self.steps {
            // INVARIANT: Journal only holds what the current step did.
            let _ = exec.take_journal();
            let record = self.run_step(step, exec, &report);
            let abort = record.outcome == Outcome::Failed && step.fatality() == Fatality::Fatal;
            report.records.push(record);

            if abort {
                error!("fatal step {} failed, aborting run", step.name());
                report.aborted = Some(step.name().to_string());
                break;
            }
        }

        report
    }

    fn run_step(&self, step: &Step<'a>, exec: &Executor, report: &RunReport) -> StepRecord {
        let name = step.name();

        if !step.is_enabled() {
            debug!("skip {name}: disabled");
            return StepRecord::new(step, Outcome::SkippedByFlag);
        }

        if let Some(reason) = self.unmet_dependency(step, exec, report) {
            warn!("skip {name}: {reason}; {}", step.remedy_hint());
            return StepRecord::new(step, Outcome::SkippedDependencyUnmet)
                .with_detail(reason)
                .with_journal(exec.take_journal());
        }

        match step.guard().evaluate() {
            Verdict::Satisfied => {
                info!("{name}: already satisfied");
                return StepRecord::new(step, Outcome::AlreadySatisfied);
            }
            Verdict::Unsatisfied => {}
            Verdict::Unknown(reason) => debug!("{name}: cannot tell if satisfied ({reason})"),
        }

        info!("{name}: applying");
        match step.run(exec) {
            Ok(()) => StepRecord::new(step, Outcome::Applied).with_journal(exec.take_journal()),
            Err(error) => {
                match step.fatality() {
                    Fatality::Fatal => error!("{name} failed: {error}"),
                    Fatality::NonFatal => warn!("{name} failed: {error}"),
                }
                warn!("to complete {name}: {}", step.remedy_hint());
                StepRecord::new(step, Outcome::Failed)
                    .with_detail(error.to_string())
                    .with_journal(exec.take_journal())
            }
        }
    }

    fn unmet_dependency(&self, step: &Step<'a>, exec: &Executor, report: &RunReport) -> Option<String> {
        match step.dependency()? {
            Dependency::Step(other) => match report.outcome_of(other) {
                Some(outcome) if outcome.satisfies_dependents() => None,
                Some(outcome) => Some(format!("depends on {other}, which was {outcome}")),
                None => Some(format!("depends on {other}, which did not run")),
            },
            Dependency::Authentication => match self.gate {
                Some(gate) if gate.ensure_authenticated(exec) => None,
                Some(gate) => Some(format!("not authenticated to {}", gate.source_name())),
                None => Some("no authentication gate available".to_string()),
            },
        }
    }
}

/// Record of one step in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub name: String,
    pub phase: Phase,
    pub outcome: Outcome,
    pub remedy: String,
    pub detail: Option<String>,
    pub journal: Vec<String>,
}

impl StepRecord {
    fn new(step: &Step<'_>, outcome: Outcome) -> Self {
        Self {
            name: step.name().to_string(),
            phase: step.phase(),
            outcome,
            remedy: step.remedy_hint().to_string(),
            detail: None,
            journal: Vec::new(),
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn with_journal(mut self, journal: Vec<String>) -> Self {
        self.journal = journal;
        self
    }
}

/// Ordered report of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    mode: Mode,
    records: Vec<StepRecord>,
    aborted: Option<String>,
}

impl RunReport {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            records: Vec::new(),
            aborted: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Records in step order.
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Outcome of named step, if it ran.
    pub fn outcome_of(&self, name: &str) -> Option<Outcome> {
        self.records
            .iter()
            .find(|record| record.name == name)
            .map(|record| record.outcome)
    }

    /// Names of steps with target outcome.
    pub fn with_outcome(&self, outcome: Outcome) -> Vec<&str> {
        self.records
            .iter()
            .filter(|record| record.outcome == outcome)
            .map(|record| record.name.as_str())
            .collect()
    }

    /// Name of fatal step that aborted the run.
    pub fn aborted_at(&self) -> Option<&str> {
        self.aborted.as_deref()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Process exit code for this run.
    ///
    /// Non-fatal failures do not affect the exit code.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.is_aborted())
    }
}

impl Display for RunReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "dotstrap run summary ({}):", self.mode)?;
        for record in &self.records {
            write!(fmt, "  {:<26}{}", record.outcome.name(), record.name)?;
            if let Some(detail) = &record.detail {
                write!(fmt, ": {}", detail.lines().next().unwrap_or_default())?;
            }
            writeln!(fmt)?;

            if matches!(
                record.outcome,
                Outcome::Failed | Outcome::SkippedDependencyUnmet
            ) {
                writeln!(fmt, "      remedy: {}", record.remedy)?;
            }

            if self.mode == Mode::Preview {
                for intent in &record.journal {
                    writeln!(fmt, "      would {intent}")?;
                }
            }
        }

        if let Some(step) = &self.aborted {
            writeln!(fmt, "run aborted at {step}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{guard::Guard, step::StepError};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};

    fn outcomes(report: &RunReport) -> Vec<(&str, Outcome)> {
        report
            .records()
            .iter()
            .map(|record| (record.name.as_str(), record.outcome))
            .collect()
    }

    #[test]
    fn steps_run_in_order_and_stop_at_fatal_failure() {
        let calls = RefCell::new(Vec::new());
        let steps = vec![
            Step::new("one", Phase::Homebrew, |_| {
                calls.borrow_mut().push("one");
                Ok(())
            }),
            Step::new("two", Phase::Packages, |_| {
                calls.borrow_mut().push("two");
                Err(StepError::Message("boom".into()))
            })
            .fatal(),
            Step::new("three", Phase::Shell, |_| {
                calls.borrow_mut().push("three");
                Ok(())
            }),
        ];

        let report = Sequencer::new(steps).run(&Executor::new(Mode::Execute));

        assert_eq!(*calls.borrow(), vec!["one", "two"]);
        assert_eq!(
            outcomes(&report),
            vec![("one", Outcome::Applied), ("two", Outcome::Failed)]
        );
        assert_eq!(report.aborted_at(), Some("two"));
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn non_fatal_failure_continues() {
        let steps = vec![
            Step::new("one", Phase::Editor, |_| Err(StepError::Message("boom".into()))),
            Step::new("two", Phase::Defaults, |_| Ok(())),
        ];

        let report = Sequencer::new(steps).run(&Executor::new(Mode::Execute));

        assert_eq!(
            outcomes(&report),
            vec![("one", Outcome::Failed), ("two", Outcome::Applied)]
        );
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn disabled_step_never_evaluates_guard_or_action() {
        let touched = Cell::new(false);
        let steps = vec![Step::new("one", Phase::Shell, |_| {
            touched.set(true);
            Ok(())
        })
        .guarded_by(Guard::new(|| {
            touched.set(true);
            Verdict::Unsatisfied
        }))
        .enabled(false)];

        let report = Sequencer::new(steps).run(&Executor::new(Mode::Execute));

        assert!(!touched.get());
        assert_eq!(outcomes(&report), vec![("one", Outcome::SkippedByFlag)]);
    }

    #[test]
    fn unknown_guard_attempts_action() {
        let ran = Cell::new(false);
        let steps = vec![
            Step::new("one", Phase::Git, |_| {
                ran.set(true);
                Ok(())
            })
            .guarded_by(Guard::new(|| Verdict::Unknown("lookup failed".into()))),
            Step::new("two", Phase::Git, |_| Ok(())).guarded_by(Guard::new(|| Verdict::Satisfied)),
        ];

        let report = Sequencer::new(steps).run(&Executor::new(Mode::Execute));

        assert!(ran.get());
        assert_eq!(
            outcomes(&report),
            vec![("one", Outcome::Applied), ("two", Outcome::AlreadySatisfied)]
        );
    }

    #[test]
    fn failed_dependency_skips_dependent() {
        let steps = vec![
            Step::new("clone", Phase::Dotfiles, |_| Err(StepError::Message("offline".into()))),
            Step::new("deploy", Phase::Dotfiles, |_| Ok(())).depends_on(Dependency::Step("clone")),
            Step::new("later", Phase::Dotfiles, |_| Ok(())).depends_on(Dependency::Step("missing")),
        ];

        let report = Sequencer::new(steps).run(&Executor::new(Mode::Execute));

        assert_eq!(
            outcomes(&report),
            vec![
                ("clone", Outcome::Failed),
                ("deploy", Outcome::SkippedDependencyUnmet),
                ("later", Outcome::SkippedDependencyUnmet),
            ]
        );
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn authentication_dependency_without_gate_is_unmet() {
        let steps = vec![Step::new("private", Phase::PrivatePackages, |_| Ok(()))
            .depends_on(Dependency::Authentication)];

        let report = Sequencer::new(steps).run(&Executor::new(Mode::Execute));

        assert_eq!(outcomes(&report), vec![("private", Outcome::SkippedDependencyUnmet)]);
    }

    #[test]
    fn preview_report_lists_intents() {
        let steps = vec![
            Step::new("write", Phase::Shell, |exec| {
                exec.write_file(std::path::Path::new("/nonexistent/rc"), "x")?;
                Ok(())
            }),
            Step::new("done", Phase::Shell, |_| Ok(())).guarded_by(Guard::new(|| Verdict::Satisfied)),
        ];

        let report = Sequencer::new(steps).run(&Executor::new(Mode::Preview));

        let expect = indoc! {"
            dotstrap run summary (preview):
              applied                   write
                  would write /nonexistent/rc
              already-satisfied         done
        "};
        assert_eq!(report.to_string(), expect);
    }
}
