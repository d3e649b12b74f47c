use crate::oauth::TokenLifecycleManager;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    pub token_manager: Arc<TokenLifecycleManager>,

    runtime: Handle,
}

impl JobContext {
    /// Must be called from within the runtime the jobs will block on.
    pub fn new(
        cancellation_token: CancellationToken,
        token_manager: Arc<TokenLifecycleManager>,
    ) -> Self {
        Self {
            cancellation_token,
            token_manager,
            runtime: Handle::current(),
        }
    }

    pub fn with_cancellation_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            ..self.clone()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Runs `future` to completion on the server runtime. Only valid from the
    /// blocking thread a job executes on.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
