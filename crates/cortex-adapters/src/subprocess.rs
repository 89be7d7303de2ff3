use std::process::Command;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Invokes an external CLI with `--json` and parses its stdout.
///
/// The wire contract: stdout is a UTF-8 JSON value per the CLI's
/// documented schemas, empty stdout means "no results", and stderr is
/// preserved in error messages.
#[derive(Debug, Clone)]
pub struct CliRunner {
    bin: String,
    base_args: Vec<String>,
}

impl CliRunner {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            base_args: Vec::new(),
        }
    }

    /// Arguments prepended to every invocation (e.g. `--account <id>`).
    pub fn with_base_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    /// Run and parse stdout as `T`. Returns Ok(None) on empty stdout.
    pub fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<Option<T>> {
        let stdout = self.run_raw(args)?;
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str(trimmed).map_err(|err| {
            Error::Decode(format!(
                "{} {}: invalid JSON output: {err}",
                self.bin,
                args.join(" ")
            ))
        })?;
        Ok(Some(value))
    }

    fn run_raw(&self, args: &[&str]) -> Result<String> {
        let mut command = Command::new(&self.bin);
        command.args(&self.base_args);
        command.args(args);
        command.arg("--json");

        let output = command.output().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::Environment(format!("upstream binary not found: {}", self.bin))
            } else {
                Error::Upstream(format!("failed to spawn {}: {err}", self.bin))
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Upstream(format!(
                "{} {} exited with {}: {}",
                self.bin,
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| Error::Decode(format!("{}: stdout was not UTF-8", self.bin)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_environment_error() {
        let runner = CliRunner::new("definitely-not-a-real-binary-cortex");
        let result: Result<Option<serde_json::Value>> = runner.run_json(&["anything"]);
        assert!(matches!(result, Err(Error::Environment(_))));
    }

    #[test]
    #[cfg(unix)]
    fn test_empty_stdout_is_no_results() {
        let runner = CliRunner::new("true");
        let result: Option<serde_json::Value> = runner.run_json(&[]).unwrap();
        assert!(result.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn test_nonzero_exit_preserves_stderr() {
        let runner = CliRunner::new("sh");
        let result: Result<Option<serde_json::Value>> =
            runner.run_json(&["-c", "echo boom >&2; exit 3"]);
        match result {
            Err(Error::Upstream(msg)) => assert!(msg.contains("boom"), "{msg}"),
            other => panic!("expected upstream error, got {other:?}"),
        }
    }
}
