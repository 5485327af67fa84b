//! Command execution abstraction for testability
//!
//! This module provides a trait-based abstraction for command execution,
//! enabling dependency injection and mocking for tests.

use anyhow::Result;
use std::process::Output;
use std::time::Duration;

/// Abstraction for command execution, enabling mocking in tests
pub trait CommandExecutor: Send + Sync {
    /// Run a command with optional timeout, failing on a non-zero exit code
    fn run_command(&self, program: &str, args: &[&str], timeout: Option<Duration>) -> Result<Output>;

    /// Run a command and return stdout as string
    fn run_command_stdout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<String>;

    /// Run a shell command; the exit status is left for the caller to inspect
    fn run_shell_command(
        &self,
        command: &str,
        env: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<Output>;
}

/// Default implementation using real subprocess calls
#[derive(Debug, Clone, Default)]
pub struct RealExecutor;

impl RealExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealExecutor {
    fn run_command(&self, program: &str, args: &[&str], timeout: Option<Duration>) -> Result<Output> {
        super::command::run_command(program, args, timeout)
    }

    fn run_command_stdout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<String> {
        super::command::run_command_stdout(program, args, timeout)
    }

    fn run_shell_command(
        &self,
        command: &str,
        env: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<Output> {
        super::command::run_shell_command(command, env, timeout)
    }
}

/// A mock executor for testing that records calls and returns configured responses
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;
    use std::sync::{Arc, Mutex};

    /// Recorded command invocation
    #[derive(Clone, Debug)]
    pub struct CommandCall {
        pub program: String,
        pub args: Vec<String>,
        pub env: Vec<(String, String)>,
    }

    /// Response configuration for mock
    #[derive(Clone, Debug)]
    pub enum MockResponse {
        Success { stdout: String, stderr: String },
        Failure { stderr: String, exit_code: i32 },
        Timeout,
    }

    impl Default for MockResponse {
        fn default() -> Self {
            MockResponse::Success {
                stdout: String::new(),
                stderr: String::new(),
            }
        }
    }

    /// Mock executor for testing
    ///
    /// Shell commands are keyed by their full command line, everything else
    /// by program name.
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded command invocations
        pub calls: Arc<Mutex<Vec<CommandCall>>>,
        responses: Arc<Mutex<HashMap<String, MockResponse>>>,
        default_response: Arc<Mutex<MockResponse>>,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure a response for a specific program (or shell command line)
        pub fn expect(self, program: &str, response: MockResponse) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(program.to_string(), response);
            self
        }

        /// Set the default response for unconfigured programs
        pub fn with_default_response(self, response: MockResponse) -> Self {
            *self.default_response.lock().unwrap() = response;
            self
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<CommandCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Check if a program was called
        pub fn was_called(&self, program: &str) -> bool {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .any(|c| c.program == program)
        }

        /// Get number of calls to a specific program
        pub fn call_count(&self, program: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.program == program)
                .count()
        }

        fn record_call(&self, program: &str, args: &[&str], env: &[(&str, &str)]) {
            self.calls.lock().unwrap().push(CommandCall {
                program: program.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                env: env
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            });
        }

        fn get_response(&self, key: &str) -> MockResponse {
            self.responses
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .unwrap_or_else(|| self.default_response.lock().unwrap().clone())
        }

        fn output(status: ExitStatus, stdout: String, stderr: String) -> Output {
            Output {
                status,
                stdout: stdout.into_bytes(),
                stderr: stderr.into_bytes(),
            }
        }
    }

    impl CommandExecutor for MockExecutor {
        fn run_command(
            &self,
            program: &str,
            args: &[&str],
            _timeout: Option<Duration>,
        ) -> Result<Output> {
            self.record_call(program, args, &[]);
            match self.get_response(program) {
                MockResponse::Success { stdout, stderr } => {
                    Ok(Self::output(ExitStatus::from_raw(0), stdout, stderr))
                }
                MockResponse::Failure { stderr, exit_code } => {
                    anyhow::bail!("Command failed with exit code {:?}: {}", Some(exit_code), stderr)
                }
                MockResponse::Timeout => anyhow::bail!("Command timed out"),
            }
        }

        fn run_command_stdout(
            &self,
            program: &str,
            args: &[&str],
            timeout: Option<Duration>,
        ) -> Result<String> {
            let output = self.run_command(program, args, timeout)?;
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        }

        fn run_shell_command(
            &self,
            command: &str,
            env: &[(&str, &str)],
            timeout: Option<Duration>,
        ) -> Result<Output> {
            self.record_call("sh", &["-c", command], env);
            match self.get_response(command) {
                MockResponse::Success { stdout, stderr } => {
                    Ok(Self::output(ExitStatus::from_raw(0), stdout, stderr))
                }
                MockResponse::Failure { stderr, exit_code } => Ok(Self::output(
                    ExitStatus::from_raw(exit_code << 8),
                    String::new(),
                    stderr,
                )),
                MockResponse::Timeout => anyhow::bail!(
                    "Command timed out after {} seconds",
                    timeout.map(|t| t.as_secs()).unwrap_or_default()
                ),
            }
        }
    }
}
