// Scheduled Executor for periodic tasks
// Fixed-interval ticker with a watch-channel shutdown signal

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// A trait for tasks that run periodically
pub trait ScheduledTask: Send + Sync + 'static {
    /// Execute the task
    /// Returns Ok(()) on success, Err on failure
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>>;

    /// Check if the task should terminate
    /// Default: never terminate (run forever)
    fn should_terminate(&self) -> bool {
        false
    }
}

/// Blanket implementation for Arc<T> where T: ScheduledTask
/// This allows passing Arc-wrapped tasks directly to the executor
impl<T: ScheduledTask> ScheduledTask for Arc<T> {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        (**self).run()
    }

    fn should_terminate(&self) -> bool {
        (**self).should_terminate()
    }
}

/// Stops a running executor. Cloneable; any clone may signal.
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Scheduled executor for running periodic tasks
pub struct ScheduledExecutor {
    interval: Duration,
    task_name: String,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ScheduledExecutor {
    /// Create a new scheduled executor
    ///
    /// # Arguments
    /// * `task_name` - Name of the task (for logging)
    /// * `interval` - Interval between executions
    pub fn new(task_name: impl Into<String>, interval: Duration) -> Self {
        let (sender, _) = watch::channel(false);
        Self { task_name: task_name.into(), interval, shutdown: Arc::new(sender) }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { sender: self.shutdown.clone() }
    }

    /// Run the task every `interval` until shut down.
    ///
    /// The first run happens one interval after start. Ticks that fall due while a
    /// run is still in progress are skipped, not queued. A shutdown signal also
    /// cancels a run that is in flight.
    pub async fn start<T>(self, task: T)
    where
        T: ScheduledTask,
    {
        let task_name = self.task_name.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tracing::info!(
            "Starting scheduled task '{}' with interval: {:?}",
            task_name,
            self.interval
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown_rx.borrow() || task.should_terminate() {
                tracing::info!("Scheduled task '{}' is shutting down", task_name);
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!("Executing scheduled task '{}'", task_name);

                    tokio::select! {
                        result = task.run() => match result {
                            Ok(()) => {
                                tracing::debug!("Scheduled task '{}' completed successfully", task_name);
                            },
                            Err(e) => {
                                tracing::error!("Scheduled task '{}' failed: {}", task_name, e);
                            },
                        },
                        _ = shutdown_rx.changed() => {
                            tracing::info!("Scheduled task '{}' cancelled mid-run", task_name);
                        },
                    }
                },
                _ = shutdown_rx.changed() => {},
            }
        }

        tracing::info!("Scheduled task '{}' stopped", task_name);
    }
}
