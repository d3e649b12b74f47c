use super::context::JobContext;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub enum JobSchedule {
    /// Every `Duration`, first run one period after startup.
    Interval(Duration),
    /// Whenever the event fires, never on a timer.
    Hook(HookEvent),
    Combined {
        interval: Duration,
        hooks: Vec<HookEvent>,
    },
}

impl JobSchedule {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            JobSchedule::Interval(every) | JobSchedule::Combined { interval: every, .. } => {
                Some(*every)
            }
            JobSchedule::Hook(_) => None,
        }
    }

    pub fn listens_to(&self, event: HookEvent) -> bool {
        match self {
            JobSchedule::Hook(hook) => *hook == event,
            JobSchedule::Combined { hooks, .. } => hooks.contains(&event),
            JobSchedule::Interval(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    /// Fired once when the scheduler starts.
    OnStartup,
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HookEvent::OnStartup => "on_startup",
        })
    }
}

/// What the scheduler does with a running job when asked to shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownBehavior {
    /// Its cancellation token is cancelled at shutdown.
    #[default]
    Cancellable,
    /// Awaited before shutdown completes.
    WaitForCompletion,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found")]
    NotFound,
    #[error("Job is already running")]
    AlreadyRunning,
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Job was cancelled")]
    Cancelled,
}

/// Periodic server-side work, such as refreshing expiring OAuth tokens.
///
/// `execute` runs on a blocking thread; async work goes through
/// [`JobContext::block_on`].
pub trait BackgroundJob: Send + Sync {
    /// Stable key, used in logs and metrics labels.
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn schedule(&self) -> JobSchedule;

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::default()
    }

    /// Long runs should poll `ctx.is_cancelled()` and return
    /// [`JobError::Cancelled`].
    fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
