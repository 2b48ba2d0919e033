// ABOUTME: Operator notification side channel used when a supervised task dies
// ABOUTME: Defines the OperatorNotifier trait, a logging fallback, and report formatting

use anyhow::Result;
use async_trait::async_trait;

use crate::error::TaskFailure;

/// Delivers plain-text reports to the people running the relay.
///
/// Implementations should try every recipient and not stop at the first
/// failure; the supervisor ignores whatever they return beyond logging it.
#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<()>;
}

/// Fallback notifier when no operator channel is configured: the report only
/// goes to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl OperatorNotifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        tracing::error!(report = %text, "Operator report (no operator channel configured)");
        Ok(())
    }
}

/// Human-readable report for a dead task.
///
/// Failed tasks list their cause chain, one cause per line. Captured
/// backtraces are left to the log.
pub fn format_failure_report(failure: &TaskFailure) -> String {
    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    let detail = match failure {
        TaskFailure::Failed { error, .. } => error
            .chain()
            .enumerate()
            .map(|(i, cause)| match i {
                0 => cause.to_string(),
                _ => format!("caused by: {}", cause),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        TaskFailure::Panicked { message, .. } => format!("panic: {}", message),
        TaskFailure::Exited { .. } => "task returned without error".to_string(),
    };
    format!(
        "shoal relay is shutting down\ntask: {}\nat: {}\n\n{}",
        failure.task(),
        now,
        detail
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_for_failed_task_lists_causes() {
        let failure = TaskFailure::Failed {
            task: "telegram-driver".to_string(),
            error: anyhow::anyhow!("connection refused").context("long polling stopped"),
        };
        let report = format_failure_report(&failure);
        assert!(report.contains("task: telegram-driver"));
        assert!(report.contains("long polling stopped"));
        assert!(report.contains("caused by: connection refused"));
    }

    #[test]
    fn test_report_for_failed_task_omits_backtrace() {
        // Only takes effect if nothing in this process has captured one yet
        std::env::set_var("RUST_LIB_BACKTRACE", "1");
        let failure = TaskFailure::Failed {
            task: "console-inbound".to_string(),
            error: anyhow::anyhow!("event stream ended"),
        };
        let report = format_failure_report(&failure);
        assert!(!report.contains("Stack backtrace"));
        assert!(report.ends_with("event stream ended"));
        assert!(report.len() < 4096);
    }

    #[test]
    fn test_report_for_panic_and_exit() {
        let panicked = TaskFailure::Panicked {
            task: "router".to_string(),
            message: "index out of bounds".to_string(),
        };
        assert!(format_failure_report(&panicked).contains("panic: index out of bounds"));

        let exited = TaskFailure::Exited {
            task: "console-inbound".to_string(),
        };
        assert!(format_failure_report(&exited).contains("returned without error"));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify("report").await.is_ok());
    }
}
