pub mod conditions;
pub mod logging;
pub mod metrics;

pub use conditions::{ConditionGate, NoConditions, ShellConditions};
pub use metrics::{MetricsSink, ZabbixSender};
