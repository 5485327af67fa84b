//! Metrics sink - reports the run outcome to Zabbix
//!
//! Uses `zabbix_sender` through the command executor. Sending is
//! fire-and-forget for the caller: failures are returned so they can be
//! logged, but never change the run's exit status.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ZabbixConfig;
use crate::scheduler::BackupResult;
use crate::utils::CommandExecutor;

/// Largest text value a Zabbix item accepts
pub const MAX_VALUE_BYTES: usize = 65536;

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Receives the final result of a run plus its log
pub trait MetricsSink {
    fn send(&self, result: &BackupResult, log_file: &Path) -> Result<()>;
}

/// Sends the summary and the log text as one Zabbix item value
pub struct ZabbixSender {
    executor: Arc<dyn CommandExecutor>,
    config: ZabbixConfig,
}

impl ZabbixSender {
    pub fn new(executor: Arc<dyn CommandExecutor>, config: ZabbixConfig) -> Self {
        Self { executor, config }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.item_key.is_empty()
    }

    fn send_value(&self, value: &str) -> Result<()> {
        let agent_conf = self.config.agent_conf.to_string_lossy();
        let args = [
            "-c",
            agent_conf.as_ref(),
            "-k",
            self.config.item_key.as_str(),
            "-o",
            value,
        ];

        self.executor
            .run_command(&self.config.sender_bin, &args, Some(SEND_TIMEOUT))
            .with_context(|| format!("Failed to send item '{}' to Zabbix", self.config.item_key))?;
        Ok(())
    }
}

impl MetricsSink for ZabbixSender {
    fn send(&self, result: &BackupResult, log_file: &Path) -> Result<()> {
        if !self.is_enabled() {
            debug!("Zabbix item key not configured, not sending");
            return Ok(());
        }

        let log = match fs::read(log_file) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read log file {:?}", log_file))
            }
        };

        let value = report_value(result, &log, log_file);
        debug!("Sending {} bytes to Zabbix item '{}'", value.len(), self.config.item_key);
        self.send_value(&value)
    }
}

/// Summary line plus log, cut at a line boundary to fit a Zabbix item
pub fn report_value(result: &BackupResult, log: &str, log_file: &Path) -> String {
    let content = format!("Summary: {}\n{}", result, log);
    if content.len() < MAX_VALUE_BYTES {
        return content;
    }

    let trailer = format!(
        "\n** Zabbix item value has been truncated because it exceeds {} bytes.**\n\
         ** Refer to {} on the monitored host to get the full report.**\n",
        MAX_VALUE_BYTES,
        log_file.display()
    );
    let budget = MAX_VALUE_BYTES.saturating_sub(trailer.len());

    let mut truncated = String::with_capacity(MAX_VALUE_BYTES);
    for line in content.lines() {
        if truncated.len() + line.len() + 1 > budget {
            break;
        }
        truncated.push_str(line);
        truncated.push('\n');
    }
    truncated.push_str(&trailer);
    truncated
}
