//! [`CommandRunner`]: runs each step as a child process.

use std::{process::Stdio, time::Duration};

use churn_core::steps::{Step, StepOutcome, StepRunner};

use crate::config::StepsConfig;

/// Lines of stderr kept in a failure reason.
const STDERR_TAIL_LINES: usize = 20;

/// Runs the configured program for a step and waits, up to the configured
/// timeout, for it to exit. Only the exit status is interpreted.
#[derive(Debug, Clone)]
pub struct CommandRunner {
  steps: StepsConfig,
}

impl CommandRunner {
  pub fn new(steps: StepsConfig) -> Self { Self { steps } }

  fn timeout(&self) -> Duration { self.steps.timeout() }
}

fn tail(bytes: &[u8], lines: usize) -> String {
  let text = String::from_utf8_lossy(bytes);
  let all: Vec<&str> = text.lines().collect();
  all[all.len().saturating_sub(lines)..].join("\n")
}

impl StepRunner for CommandRunner {
  fn run(&self, step: Step) -> impl Future<Output = StepOutcome> + Send + '_ {
    async move {
      let command = self.steps.command(step);
      let child = tokio::process::Command::new(&command.program)
        .args(&command.args)
        .current_dir(&self.steps.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
      let child = match child {
        Ok(child) => child,
        Err(error) => {
          tracing::warn!(%step, program = %command.program, %error, "step could not be started");
          return StepOutcome::failed(format!("could not start {}: {error}", command.program));
        }
      };

      tracing::info!(%step, program = %command.program, "step started");
      // Dropping the wait future on timeout drops the child, which kills it.
      let output = match tokio::time::timeout(self.timeout(), child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(error)) => {
          tracing::warn!(%step, %error, "waiting for step failed");
          return StepOutcome::failed(error.to_string());
        }
        Err(_) => {
          tracing::warn!(%step, after = ?self.timeout(), "step timed out and was killed");
          return StepOutcome::TimedOut {
            after: self.timeout(),
          };
        }
      };

      if !output.stdout.is_empty() {
        tracing::debug!(%step, stdout = %String::from_utf8_lossy(&output.stdout), "step output");
      }
      let stderr = tail(&output.stderr, STDERR_TAIL_LINES);
      if !stderr.is_empty() {
        tracing::warn!(%step, %stderr, "step wrote to stderr");
      }

      if output.status.success() {
        tracing::info!(%step, "step succeeded");
        StepOutcome::Succeeded
      } else {
        let reason = if stderr.is_empty() {
          format!("exited with {}", output.status)
        } else {
          format!("exited with {}: {stderr}", output.status)
        };
        StepOutcome::Failed { reason }
      }
    }
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::config::StepCommand;

  fn runner(program: &str, args: &[&str], timeout_secs: u64) -> CommandRunner {
    let command = StepCommand {
      program: program.to_owned(),
      args:    args.iter().map(|a| (*a).to_owned()).collect(),
    };
    CommandRunner::new(StepsConfig {
      timeout_secs,
      predict: command,
      ..StepsConfig::default()
    })
  }

  #[tokio::test]
  async fn zero_exit_succeeds() {
    let outcome = runner("sh", &["-c", "echo fine"], 10).run(Step::Predict).await;
    assert_eq!(outcome, StepOutcome::Succeeded);
  }

  #[tokio::test]
  async fn nonzero_exit_fails_with_stderr() {
    let outcome = runner("sh", &["-c", "echo broken >&2; exit 3"], 10)
      .run(Step::Predict)
      .await;
    let StepOutcome::Failed { reason } = outcome else {
      panic!("expected failure, got {outcome:?}");
    };
    assert!(reason.contains("broken"), "{reason}");
  }

  #[tokio::test]
  async fn missing_program_fails() {
    let outcome = runner("/nonexistent/churnflow-step", &[], 10).run(Step::Predict).await;
    assert!(matches!(outcome, StepOutcome::Failed { .. }));
  }

  #[tokio::test]
  async fn slow_step_times_out() {
    let outcome = runner("sleep", &["5"], 0).run(Step::Predict).await;
    assert_eq!(
      outcome,
      StepOutcome::TimedOut {
        after: Duration::ZERO,
      }
    );
  }

  #[test]
  fn tail_keeps_last_lines() {
    assert_eq!(tail(b"a\nb\nc\n", 2), "b\nc");
    assert_eq!(tail(b"", 2), "");
  }
}
