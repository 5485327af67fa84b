//! Condition gate - shell commands deciding whether a run happens
//!
//! - skip: any command exiting 0 turns the run into an intentional no-op
//! - run: every command must exit 0, otherwise the run is aborted
//! - terminate: executed after the run with the generation path exported

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::ConditionsConfig;
use crate::utils::CommandExecutor;

/// Environment variable carrying the current generation path to terminate commands
pub const CURRENT_DIR_ENV: &str = "DUMP_MANAGER_CURRENT_DIR";

/// Pre- and post-run decisions made outside the dump engine
pub trait ConditionGate {
    /// True if the run should be skipped (successfully)
    fn check_skip(&self) -> bool;

    /// True if the run may start
    fn check_run(&self) -> bool;

    /// Run the post-run commands; true if all of them succeeded
    fn execute_terminate(&self, generation: &Path) -> bool;
}

/// Gate that never skips, always runs, and has nothing to terminate
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConditions;

impl ConditionGate for NoConditions {
    fn check_skip(&self) -> bool {
        false
    }

    fn check_run(&self) -> bool {
        true
    }

    fn execute_terminate(&self, _generation: &Path) -> bool {
        true
    }
}

/// Gate backed by the `[conditions]` shell commands
pub struct ShellConditions {
    executor: Arc<dyn CommandExecutor>,
    config: ConditionsConfig,
}

impl ShellConditions {
    pub fn new(executor: Arc<dyn CommandExecutor>, config: ConditionsConfig) -> Self {
        Self { executor, config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    /// Run one command, returning whether it exited 0
    fn passes(&self, kind: &str, command: &str, env: &[(&str, &str)]) -> bool {
        let output = match self.executor.run_shell_command(command, env, Some(self.timeout())) {
            Ok(output) => output,
            Err(e) => {
                error!("{} condition failed: '{}': {:#}", kind, command, e);
                return false;
            }
        };

        let code = output.status.code();
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            debug!("{} condition passed: '{}' (exit code: 0)", kind, command);
            for line in stdout.lines() {
                debug!("  stdout: {}", line);
            }
            for line in stderr.lines() {
                debug!("  stderr: {}", line);
            }
            true
        } else {
            error!("{} condition failed: '{}' (exit code: {:?})", kind, command, code);
            for line in stdout.lines() {
                error!("  stdout: {}", line);
            }
            for line in stderr.lines() {
                error!("  stderr: {}", line);
            }
            false
        }
    }
}

impl ConditionGate for ShellConditions {
    fn check_skip(&self) -> bool {
        for command in &self.config.skip {
            if self.passes("Skip", command, &[]) {
                info!("Skip condition met: '{}'", command);
                return true;
            }
        }
        false
    }

    fn check_run(&self) -> bool {
        if self.config.run.is_empty() {
            return true;
        }

        let all_passed = self.config.run.iter().all(|command| self.passes("Run", command, &[]));
        if all_passed {
            info!("All run conditions passed");
        }
        all_passed
    }

    fn execute_terminate(&self, generation: &Path) -> bool {
        let generation = generation.to_string_lossy();
        let env = [(CURRENT_DIR_ENV, generation.as_ref())];

        // Every command runs, even after a failure
        let mut all_succeeded = true;
        for command in &self.config.terminate {
            if self.passes("Terminate", command, &env) {
                info!("Terminate condition succeeded: '{}'", command);
            } else {
                all_succeeded = false;
            }
        }

        if all_succeeded && !self.config.terminate.is_empty() {
            info!("All terminate conditions succeeded");
        }
        all_succeeded
    }
}
