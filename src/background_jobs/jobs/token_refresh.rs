//! Periodic refresh of access tokens that are about to expire.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
    HookEvent,
};
use std::time::Duration;
use tracing::{info, warn};

pub struct TokenRefreshJob {
    interval: Duration,
}

impl TokenRefreshJob {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackgroundJob for TokenRefreshJob {
    fn id(&self) -> &'static str {
        "token_refresh"
    }

    fn name(&self) -> &'static str {
        "Token Refresh"
    }

    fn description(&self) -> &'static str {
        "Refresh provider access tokens expiring soon"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Combined {
            interval: self.interval,
            hooks: vec![HookEvent::OnStartup],
        }
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::WaitForCompletion
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let report = ctx
            .block_on(ctx.token_manager.refresh_expiring())
            .map_err(|e| JobError::ExecutionFailed(format!("{:#}", e)))?;

        for error in &report.errors {
            warn!("{}", error);
        }
        info!(
            "Token refresh processed {} accounts: {} successful, {} failed",
            report.processed(),
            report.successful,
            report.failed
        );
        Ok(())
    }
}
