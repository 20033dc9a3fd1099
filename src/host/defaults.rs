// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! macOS preference defaults.
//!
//! Preferences are read and written through the `defaults` command. Reading
//! a key that is not set makes `defaults` fail with a "does not exist"
//! message, which is the only failure we treat as a definite answer. Any
//! other failure leaves the state undetermined.

use crate::{
    exec::{CommandLine, ExecError, Executor},
    host::{PreferenceStore, Result},
};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Typed preference value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl PrefValue {
    /// Type flag and value arguments for `defaults write`.
    pub fn write_args(&self) -> [String; 2] {
        match self {
            Self::Bool(value) => ["-bool".into(), value.to_string()],
            Self::Int(value) => ["-int".into(), value.to_string()],
            Self::Text(value) => ["-string".into(), value.clone()],
        }
    }

    /// Check if raw output of `defaults read` represents this value.
    pub fn matches(&self, raw: &str) -> bool {
        let raw = raw.trim();
        match self {
            Self::Bool(value) => match raw {
                "1" | "true" | "YES" => *value,
                "0" | "false" | "NO" => !*value,
                _ => false,
            },
            Self::Int(value) => raw.parse::<i64>().is_ok_and(|raw| raw == *value),
            Self::Text(value) => raw == value,
        }
    }
}

impl Display for PrefValue {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Bool(value) => write!(fmt, "{value}"),
            Self::Int(value) => write!(fmt, "{value}"),
            Self::Text(value) => write!(fmt, "{value:?}"),
        }
    }
}

/// Preference store backed by the `defaults` command.
#[derive(Debug, Default, Clone)]
pub struct MacDefaults;

impl PreferenceStore for MacDefaults {
    fn read(&self, domain: &str, key: &str) -> Result<Option<String>> {
        match CommandLine::new("defaults").args(["read", domain, key]).stdout() {
            Ok(value) => Ok(Some(value)),
            Err(ExecError::Syscall { message, .. }) if message.contains("does not exist") => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, exec: &Executor, domain: &str, key: &str, value: &PrefValue) -> Result<()> {
        exec.command(
            &CommandLine::new("defaults")
                .args(["write", domain, key])
                .args(value.write_args()),
        )?;

        Ok(())
    }

    fn delete(&self, exec: &Executor, domain: &str, key: &str) -> Result<()> {
        exec.command(&CommandLine::new("defaults").args(["delete", domain, key]))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case(PrefValue::Bool(true), "1", true; "bool true")]
    #[test_case(PrefValue::Bool(false), "0\n", true; "bool false")]
    #[test_case(PrefValue::Bool(true), "0", false; "bool mismatch")]
    #[test_case(PrefValue::Int(36), "36", true; "int")]
    #[test_case(PrefValue::Int(36), "thirty six", false; "int garbage")]
    #[test_case(PrefValue::Text("Nlsv".into()), "Nlsv", true; "text")]
    #[test]
    fn pref_value_matches_defaults_output(value: PrefValue, raw: &str, expect: bool) {
        assert_eq!(value.matches(raw), expect);
    }

    #[test]
    fn write_args_carry_type_flag() {
        assert_eq!(PrefValue::Bool(true).write_args(), ["-bool".to_string(), "true".to_string()]);
        assert_eq!(PrefValue::Int(2).write_args(), ["-int".to_string(), "2".to_string()]);
    }
}
