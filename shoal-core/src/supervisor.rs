// ABOUTME: Fail-fast supervisor for the relay's long-lived worker tasks
// ABOUTME: First task to finish (error, panic, or clean exit) triggers operator report and exit

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::error::TaskFailure;
use crate::notify::{format_failure_report, OperatorNotifier};

/// Default bound on how long the operator notification may hold up exit
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Boxed body of an async worker task
pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

enum TaskBody {
    Async(TaskFuture),
    Blocking(Box<dyn FnOnce() -> anyhow::Result<()> + Send>),
}

/// A named unit of work handed to the supervisor.
///
/// Worker tasks are expected to run forever. Returning at all, even with
/// `Ok(())`, counts as a death.
pub struct WorkerTask {
    name: String,
    body: TaskBody,
}

impl WorkerTask {
    /// A task driven by the async runtime
    pub fn spawn<F>(name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: TaskBody::Async(Box::pin(future)),
        }
    }

    /// A task that blocks its thread, run on the blocking pool.
    /// Blocking tasks cannot be aborted; they stop when the process exits.
    pub fn blocking<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: TaskBody::Blocking(Box::new(body)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for WorkerTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.body {
            TaskBody::Async(_) => "async",
            TaskBody::Blocking(_) => "blocking",
        };
        f.debug_struct("WorkerTask")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

/// All-or-nothing supervisor.
///
/// Tasks are never restarted: a relay with a dead leg is in an unknown state,
/// so the whole process goes down with it.
pub struct Supervisor {
    tasks: Vec<WorkerTask>,
    notifier: Arc<dyn OperatorNotifier>,
    notify_timeout: Duration,
}

impl Supervisor {
    pub fn new(notifier: Arc<dyn OperatorNotifier>) -> Self {
        Self {
            tasks: Vec::new(),
            notifier,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn add(&mut self, task: WorkerTask) {
        self.tasks.push(task);
    }

    pub fn extend(&mut self, tasks: impl IntoIterator<Item = WorkerTask>) {
        self.tasks.extend(tasks);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Names of the tasks that will be started, in submission order
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(WorkerTask::name).collect()
    }

    /// Start every task and wait for the first one to finish.
    ///
    /// The first completion wins; it is logged, reported to the operator
    /// (bounded by the notify timeout, errors ignored), the remaining async
    /// tasks are aborted, and the failure is returned. Later completions are
    /// never reported.
    pub async fn watch(self) -> TaskFailure {
        let Supervisor {
            tasks,
            notifier,
            notify_timeout,
        } = self;

        let mut set = JoinSet::new();
        let mut names = HashMap::new();

        for task in tasks {
            let handle = match task.body {
                TaskBody::Async(future) => set.spawn(future),
                TaskBody::Blocking(body) => set.spawn_blocking(body),
            };
            tracing::debug!(task = %task.name, "Started supervised task");
            names.insert(handle.id(), task.name);
        }

        tracing::info!(tasks = names.len(), "Supervisor running");

        let failure = match set.join_next_with_id().await {
            Some(Ok((id, Ok(())))) => TaskFailure::Exited {
                task: task_name(&names, id),
            },
            Some(Ok((id, Err(error)))) => TaskFailure::Failed {
                task: task_name(&names, id),
                error,
            },
            Some(Err(join_err)) => {
                let task = task_name(&names, join_err.id());
                if join_err.is_panic() {
                    TaskFailure::Panicked {
                        task,
                        message: panic_message(join_err.into_panic()),
                    }
                } else {
                    TaskFailure::Failed {
                        task,
                        error: anyhow::anyhow!("task was cancelled"),
                    }
                }
            }
            None => TaskFailure::Exited {
                task: "supervisor".to_string(),
            },
        };

        tracing::error!(task = %failure.task(), error = %failure, "Supervised task died");
        crate::metrics::record_task_death(failure.task());

        let report = format_failure_report(&failure);
        match tokio::time::timeout(notify_timeout, notifier.notify(&report)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to notify operators"),
            Err(_) => tracing::warn!(
                timeout_secs = notify_timeout.as_secs(),
                "Operator notification timed out"
            ),
        }

        set.abort_all();
        failure
    }

    /// Run until the first task dies, then terminate the process with
    /// status 1. Never returns.
    ///
    /// `process::exit` skips destructors, so anything that must be dropped
    /// before exit (log flush guards) is handed over as `keep_alive`.
    pub async fn run_all<G>(self, keep_alive: G) -> ! {
        let failure = self.watch().await;
        tracing::error!(task = %failure.task(), "Relay leg lost, exiting");
        drop(keep_alive);
        std::process::exit(1)
    }
}

fn task_name(names: &HashMap<tokio::task::Id, String>, id: tokio::task::Id) -> String {
    names
        .get(&id)
        .cloned()
        .unwrap_or_else(|| format!("task-{}", id))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::testing::RecordingNotifier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingNotifier;

    #[async_trait]
    impl OperatorNotifier for FailingNotifier {
        async fn notify(&self, _text: &str) -> anyhow::Result<()> {
            anyhow::bail!("telegram unreachable")
        }
    }

    struct HangingNotifier;

    #[async_trait]
    impl OperatorNotifier for HangingNotifier {
        async fn notify(&self, _text: &str) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn explode() -> anyhow::Result<()> {
        panic!("unexpected state")
    }

    fn forever(name: &str) -> WorkerTask {
        WorkerTask::spawn(name, async {
            std::future::pending::<()>().await;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_failed_task_is_reported_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut sup = Supervisor::new(notifier.clone());
        sup.add(forever("a"));
        sup.add(WorkerTask::spawn("b", async { anyhow::bail!("boom") }));
        sup.add(forever("c"));

        let failure = sup.watch().await;

        assert!(matches!(failure, TaskFailure::Failed { ref task, .. } if task == "b"));
        let reports = notifier.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].contains("task: b"));
        assert!(reports[0].contains("boom"));
    }

    #[tokio::test]
    async fn test_only_first_of_several_failures_is_reported() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut sup = Supervisor::new(notifier.clone());
        for i in 0..5 {
            sup.add(WorkerTask::spawn(format!("t{}", i), async move {
                anyhow::bail!("failure {}", i)
            }));
        }

        let _ = sup.watch().await;
        assert_eq!(notifier.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_clean_exit_counts_as_death() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut sup = Supervisor::new(notifier.clone());
        sup.add(forever("driver"));
        sup.add(WorkerTask::spawn("outbound", async { Ok(()) }));

        let failure = sup.watch().await;
        assert!(matches!(failure, TaskFailure::Exited { ref task } if task == "outbound"));
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut sup = Supervisor::new(notifier.clone());
        sup.add(forever("steady"));
        sup.add(WorkerTask::spawn("crashy", async { explode() }));

        let failure = sup.watch().await;
        match failure {
            TaskFailure::Panicked { task, message } => {
                assert_eq!(task, "crashy");
                assert_eq!(message, "unexpected state");
            }
            other => panic!("expected panic failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blocking_task_failure() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut sup = Supervisor::new(notifier.clone());
        sup.add(forever("async-leg"));
        sup.add(WorkerTask::blocking("legacy-loop", || {
            std::thread::sleep(Duration::from_millis(10));
            anyhow::bail!("socket closed")
        }));

        let failure = sup.watch().await;
        assert_eq!(failure.task(), "legacy-loop");
        assert!(failure.to_string().contains("socket closed"));
    }

    #[tokio::test]
    async fn test_remaining_tasks_stop_after_death() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let notifier = Arc::new(RecordingNotifier::default());
        let mut sup = Supervisor::new(notifier);

        let counter = Arc::clone(&ticks);
        sup.add(WorkerTask::spawn("ticker", async move {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }));
        sup.add(WorkerTask::spawn("fails", async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            anyhow::bail!("leg lost")
        }));

        let _ = sup.watch().await;
        // Let any in-flight abort settle before sampling
        tokio::time::sleep(Duration::from_millis(10)).await;
        let after = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after);
    }

    #[tokio::test]
    async fn test_notifier_error_does_not_block_shutdown() {
        let mut sup = Supervisor::new(Arc::new(FailingNotifier));
        sup.add(WorkerTask::spawn("x", async { anyhow::bail!("dead") }));
        let failure = sup.watch().await;
        assert_eq!(failure.task(), "x");
    }

    #[tokio::test]
    async fn test_hanging_notifier_is_bounded() {
        let mut sup = Supervisor::new(Arc::new(HangingNotifier))
            .with_notify_timeout(Duration::from_millis(50));
        sup.add(WorkerTask::spawn("x", async { anyhow::bail!("dead") }));

        let failure = tokio::time::timeout(Duration::from_secs(5), sup.watch())
            .await
            .expect("watch should finish despite a hanging notifier");
        assert_eq!(failure.task(), "x");
    }

    #[tokio::test]
    async fn test_empty_supervisor_dies_immediately() {
        let notifier = Arc::new(RecordingNotifier::default());
        let sup = Supervisor::new(notifier.clone());
        assert!(sup.is_empty());

        let failure = sup.watch().await;
        assert_eq!(failure.task(), "supervisor");
        assert_eq!(notifier.reports().len(), 1);
    }

    #[test]
    fn test_task_names_in_submission_order() {
        let mut sup = Supervisor::new(Arc::new(crate::notify::LogNotifier));
        sup.extend(vec![forever("one"), forever("two")]);
        assert_eq!(sup.len(), 2);
        assert_eq!(sup.task_names(), vec!["one", "two"]);
    }
}
