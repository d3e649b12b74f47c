use super::account_store::AccountStore;
use super::models::{OAuthAccountRecord, RefreshReport, RefreshedToken, TokenGrant, TokenState};
use super::token_client::TokenEndpoint;
use crate::catalog::{ApiError, TokenProvider};
use crate::config::TokenSettings;
use crate::rate_limit::{RateLimiter, RetryPolicy};
use crate::server::metrics;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Keeps every linked account's access token usable.
///
/// Tokens close to expiry are refreshed inline by [`access_token`](Self::access_token)
/// and ahead of time by [`refresh_expiring`](Self::refresh_expiring). A failed
/// refresh is recorded on the account and is terminal: the account keeps
/// answering `RefreshFailed` until the user signs in again.
pub struct TokenLifecycleManager {
    store: Arc<dyn AccountStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    settings: TokenSettings,
    provider: String,
    refresh_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    refreshing: Mutex<HashSet<String>>,
}

/// Removes the user from the in-flight set when the refresh ends.
struct RefreshingGuard<'a> {
    refreshing: &'a Mutex<HashSet<String>>,
    user_id: String,
}

/// When the token stored after waiting for the refresh lock is kept as is.
#[derive(Debug, Clone, Copy)]
enum ReuseWhen<'a> {
    AtLeastSecondsLeft(i64),
    /// Any unexpired token other than the one the provider rejected.
    Differs(&'a str),
}

impl ReuseWhen<'_> {
    fn accepts(&self, token: &str, seconds_left: i64) -> bool {
        match *self {
            ReuseWhen::AtLeastSecondsLeft(min) => seconds_left >= min,
            ReuseWhen::Differs(rejected) => token != rejected && seconds_left > 0,
        }
    }
}

impl Drop for RefreshingGuard<'_> {
    fn drop(&mut self) {
        self.refreshing.lock().unwrap().remove(&self.user_id);
    }
}

impl TokenLifecycleManager {
    pub fn new(
        store: Arc<dyn AccountStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        settings: TokenSettings,
        provider: &str,
    ) -> Self {
        Self {
            store,
            endpoint,
            limiter,
            retry,
            settings,
            provider: provider.to_string(),
            refresh_locks: Mutex::new(HashMap::new()),
            refreshing: Mutex::new(HashSet::new()),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Stores the tokens of a fresh sign-in, clearing any earlier refresh failure.
    pub fn record_grant(&self, user_id: &str, grant: &TokenGrant) -> anyhow::Result<()> {
        self.store
            .upsert_grant(user_id, &self.provider, grant, now_epoch())?;
        info!("Stored {} tokens for user {}", self.provider, user_id);
        Ok(())
    }

    /// A usable access token, refreshed first when it expires within the
    /// foreground threshold.
    pub async fn access_token(&self, user_id: &str) -> Result<String, ApiError> {
        let account = self.usable_account(user_id)?;
        let threshold = self.settings.foreground_refresh_threshold_secs as i64;
        if account.seconds_left(now_epoch()) >= threshold {
            if let Some(token) = account.access_token {
                return Ok(token);
            }
        }
        self.refresh_account(user_id, ReuseWhen::AtLeastSecondsLeft(threshold), "inline")
            .await
    }

    /// Refreshes regardless of expiry after the provider rejected `rejected`,
    /// unless another caller already replaced it.
    pub async fn force_refresh(&self, user_id: &str, rejected: &str) -> Result<String, ApiError> {
        self.usable_account(user_id)?;
        self.refresh_account(user_id, ReuseWhen::Differs(rejected), "forced")
            .await
    }

    /// Refreshes every account expiring within the background threshold.
    pub async fn refresh_expiring(&self) -> anyhow::Result<RefreshReport> {
        let threshold = self.settings.background_refresh_threshold_secs as i64;
        let accounts = self
            .store
            .expiring_before(&self.provider, now_epoch() + threshold)?;
        debug!("{} accounts due for token refresh", accounts.len());

        let mut report = RefreshReport::default();
        for account in accounts {
            match self
                .refresh_account(
                    &account.user_id,
                    ReuseWhen::AtLeastSecondsLeft(threshold),
                    "background",
                )
                .await
            {
                Ok(_) => report.successful += 1,
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(format!(
                        "Failed to refresh token for user {}: {}",
                        account.user_id, e
                    ));
                }
            }
        }
        if report.processed() > 0 {
            info!(
                "Token refresh run: {} successful, {} failed",
                report.successful, report.failed
            );
        }
        Ok(report)
    }

    pub fn state(&self, user_id: &str) -> anyhow::Result<TokenState> {
        let Some(account) = self.store.get_account(user_id, &self.provider)? else {
            return Ok(TokenState::NoAccount);
        };
        if self.refreshing.lock().unwrap().contains(user_id) {
            return Ok(TokenState::Refreshing);
        }
        if account.refresh_error.is_some() {
            return Ok(TokenState::RefreshFailed);
        }
        if account.is_signed_out() {
            return Ok(TokenState::SignedOut);
        }
        let left = account.seconds_left(now_epoch());
        Ok(if left <= 0 {
            TokenState::Expired
        } else if left < self.settings.background_refresh_threshold_secs as i64 {
            TokenState::ExpiringSoon
        } else {
            TokenState::Valid
        })
    }

    /// Drops the stored tokens. Returns false when the user had no account.
    pub fn sign_out(&self, user_id: &str) -> anyhow::Result<bool> {
        let cleared = self
            .store
            .clear_tokens(user_id, &self.provider, now_epoch())?;
        if cleared {
            info!("User {} signed out of {}", user_id, self.provider);
        }
        Ok(cleared)
    }

    /// The user's id at the provider, as needed to create playlists on their behalf.
    pub fn provider_account_id(&self, user_id: &str) -> Result<String, ApiError> {
        Ok(self.usable_account(user_id)?.provider_account_id)
    }

    /// A [`TokenProvider`] bound to one user.
    pub fn session(self: &Arc<Self>, user_id: &str) -> AccountSession {
        AccountSession {
            manager: Arc::clone(self),
            user_id: user_id.to_string(),
        }
    }

    fn usable_account(&self, user_id: &str) -> Result<OAuthAccountRecord, ApiError> {
        let account = self
            .store
            .get_account(user_id, &self.provider)?
            .ok_or_else(|| {
                ApiError::RefreshFailed(format!("no {} account linked", self.provider))
            })?;
        if let Some(error) = &account.refresh_error {
            return Err(ApiError::RefreshFailed(error.clone()));
        }
        if account.is_signed_out() {
            return Err(ApiError::RefreshFailed("signed out".to_string()));
        }
        Ok(account)
    }

    fn refresh_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.refresh_locks.lock().unwrap();
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    /// Refreshes unless the stored token satisfies `reuse`. Concurrent callers
    /// for the same user wait for the refresh in flight and then reuse its result.
    async fn refresh_account(
        &self,
        user_id: &str,
        reuse: ReuseWhen<'_>,
        trigger: &'static str,
    ) -> Result<String, ApiError> {
        let lock = self.refresh_lock(user_id);
        let _serialized = lock.lock().await;

        let account = self.usable_account(user_id)?;
        let now = now_epoch();
        if let Some(token) = &account.access_token {
            if reuse.accepts(token, account.seconds_left(now)) {
                debug!("Token of user {} was refreshed meanwhile", user_id);
                return Ok(token.clone());
            }
        }
        let Some(refresh_token) = account.refresh_token.as_deref() else {
            return match account.access_token {
                Some(token) if account.seconds_left(now) > 0 && trigger != "forced" => Ok(token),
                _ => Err(ApiError::RefreshFailed("no refresh token".to_string())),
            };
        };

        self.refreshing.lock().unwrap().insert(user_id.to_string());
        let _refreshing = RefreshingGuard {
            refreshing: &self.refreshing,
            user_id: user_id.to_string(),
        };

        match self.exchange(refresh_token).await {
            Ok(refreshed) => {
                self.store
                    .apply_refresh(user_id, &self.provider, &refreshed, now_epoch())?;
                metrics::record_token_refresh(trigger, "success");
                debug!("Refreshed token of user {} ({})", user_id, trigger);
                Ok(refreshed.access_token)
            }
            Err(e) => {
                let message = match e {
                    ApiError::RefreshFailed(message) => message,
                    other => other.to_string(),
                };
                error!("Failed to refresh token for user {}: {}", user_id, message);
                metrics::record_token_refresh(trigger, "failed");
                if let Err(store_err) =
                    self.store
                        .mark_refresh_failed(user_id, &self.provider, &message, now_epoch())
                {
                    error!(
                        "Failed to record refresh failure for user {}: {:#}",
                        user_id, store_err
                    );
                }
                Err(ApiError::RefreshFailed(message))
            }
        }
    }

    async fn exchange(&self, refresh_token: &str) -> Result<RefreshedToken, ApiError> {
        let mut retry_count = 0;
        loop {
            self.limiter.acquire().await;
            match self.endpoint.refresh(refresh_token).await {
                Ok(refreshed) => return Ok(refreshed),
                Err(e) if self.retry.should_retry(&e, retry_count) => {
                    let delay = e
                        .retry_after()
                        .unwrap_or_else(|| self.retry.backoff(retry_count));
                    warn!(
                        "Token endpoint failed ({}), retry {}/{} in {:?}",
                        e,
                        retry_count + 1,
                        self.retry.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Credentials of one signed-in user, refreshed through the manager.
pub struct AccountSession {
    manager: Arc<TokenLifecycleManager>,
    user_id: String,
}

impl AccountSession {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[async_trait]
impl TokenProvider for AccountSession {
    async fn access_token(&self) -> Result<String, ApiError> {
        self.manager.access_token(&self.user_id).await
    }

    async fn force_refresh(&self, rejected: &str) -> Result<String, ApiError> {
        self.manager.force_refresh(&self.user_id, rejected).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::oauth::SqliteAccountStore;
    use crate::rate_limit::RateLimiterConfig;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Token endpoint answering from a script; succeeds with a numbered token
    /// once the script is empty.
    #[derive(Default)]
    pub struct FakeTokenEndpoint {
        script: Mutex<VecDeque<Result<RefreshedToken, ApiError>>>,
        calls: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl FakeTokenEndpoint {
        pub fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn push(&self, result: Result<RefreshedToken, ApiError>) {
            self.script.lock().unwrap().push_back(result);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TokenEndpoint for FakeTokenEndpoint {
        async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ApiError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(refresh_token.to_string());
                calls.len()
            };
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(RefreshedToken {
                    access_token: format!("refreshed-{}", n),
                    expires_in: 3600,
                    token_type: Some("Bearer".to_string()),
                    scope: None,
                    refresh_token: None,
                })
            })
        }
    }

    pub fn manager_with(
        endpoint: Arc<FakeTokenEndpoint>,
    ) -> (Arc<TokenLifecycleManager>, Arc<SqliteAccountStore>) {
        let store = Arc::new(SqliteAccountStore::in_memory().unwrap());
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            permits: 100,
            window: Duration::from_secs(1),
        }));
        let manager = Arc::new(TokenLifecycleManager::new(
            store.clone(),
            endpoint,
            limiter,
            RetryPolicy::no_retries(),
            TokenSettings::default(),
            "spotify",
        ));
        (manager, store)
    }

    pub fn grant_expiring_in(seconds: i64) -> TokenGrant {
        TokenGrant {
            provider_account_id: "acct".to_string(),
            access_token: "initial".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: now_epoch() + seconds,
            token_type: Some("Bearer".to_string()),
            scope: None,
        }
    }

    #[tokio::test]
    async fn valid_token_is_returned_without_refresh() {
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let (manager, _) = manager_with(endpoint.clone());
        manager.record_grant("u1", &grant_expiring_in(3600)).unwrap();

        assert_eq!(manager.access_token("u1").await.unwrap(), "initial");
        assert!(endpoint.calls().is_empty());
        assert_eq!(manager.state("u1").unwrap(), TokenState::Valid);
    }

    #[tokio::test]
    async fn token_near_expiry_is_refreshed_inline() {
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let (manager, store) = manager_with(endpoint.clone());
        manager.record_grant("u1", &grant_expiring_in(60)).unwrap();

        assert_eq!(manager.access_token("u1").await.unwrap(), "refreshed-1");
        assert_eq!(endpoint.calls(), vec!["refresh-1"]);

        let account = store.get_account("u1", "spotify").unwrap().unwrap();
        assert!(account.expires_at >= now_epoch() + 3500);
        assert_eq!(account.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(manager.access_token("u1").await.unwrap(), "refreshed-1");
        assert_eq!(endpoint.calls().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let endpoint = Arc::new(FakeTokenEndpoint::slow(Duration::from_millis(50)));
        let (manager, _) = manager_with(endpoint.clone());
        manager.record_grant("u1", &grant_expiring_in(-10)).unwrap();

        let (a, b, c) = tokio::join!(
            manager.access_token("u1"),
            manager.access_token("u1"),
            manager.access_token("u1"),
        );
        assert_eq!(a.unwrap(), "refreshed-1");
        assert_eq!(b.unwrap(), "refreshed-1");
        assert_eq!(c.unwrap(), "refreshed-1");
        assert_eq!(endpoint.calls().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_rejections_share_one_refresh() {
        let endpoint = Arc::new(FakeTokenEndpoint::slow(Duration::from_millis(50)));
        let (manager, _) = manager_with(endpoint.clone());
        manager.record_grant("u1", &grant_expiring_in(3600)).unwrap();

        let (a, b) = tokio::join!(
            manager.force_refresh("u1", "initial"),
            manager.force_refresh("u1", "initial"),
        );
        assert_eq!(a.unwrap(), "refreshed-1");
        assert_eq!(b.unwrap(), "refreshed-1");
        assert_eq!(endpoint.calls().len(), 1);

        // A rejection of the refreshed token refreshes again.
        assert_eq!(
            manager.force_refresh("u1", "refreshed-1").await.unwrap(),
            "refreshed-2"
        );
    }

    #[tokio::test]
    async fn failed_refresh_is_terminal() {
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        endpoint.push(Err(ApiError::RefreshFailed("invalid_grant".to_string())));
        let (manager, _) = manager_with(endpoint.clone());
        manager.record_grant("u1", &grant_expiring_in(-10)).unwrap();

        let err = manager.access_token("u1").await.unwrap_err();
        assert_eq!(err, ApiError::RefreshFailed("invalid_grant".to_string()));
        assert_eq!(manager.state("u1").unwrap(), TokenState::RefreshFailed);

        let err = manager.access_token("u1").await.unwrap_err();
        assert!(matches!(err, ApiError::RefreshFailed(_)));
        assert!(manager.force_refresh("u1", "initial").await.is_err());
        assert_eq!(endpoint.calls().len(), 1);

        // A new sign-in recovers the account.
        manager.record_grant("u1", &grant_expiring_in(3600)).unwrap();
        assert_eq!(manager.access_token("u1").await.unwrap(), "initial");
    }

    #[tokio::test]
    async fn transient_failure_after_retries_is_terminal_too() {
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        endpoint.push(Err(ApiError::TransientNetwork("reset".to_string())));
        let (manager, _) = manager_with(endpoint.clone());
        manager.record_grant("u1", &grant_expiring_in(-10)).unwrap();

        let err = manager.access_token("u1").await.unwrap_err();
        assert!(matches!(err, ApiError::RefreshFailed(ref m) if m.contains("reset")));
        assert_eq!(manager.state("u1").unwrap(), TokenState::RefreshFailed);
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_stored() {
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        endpoint.push(Ok(RefreshedToken {
            access_token: "a2".to_string(),
            expires_in: 3600,
            token_type: None,
            scope: None,
            refresh_token: Some("refresh-2".to_string()),
        }));
        let (manager, store) = manager_with(endpoint.clone());
        manager.record_grant("u1", &grant_expiring_in(0)).unwrap();

        manager.force_refresh("u1", "initial").await.unwrap();
        let account = store.get_account("u1", "spotify").unwrap().unwrap();
        assert_eq!(account.refresh_token.as_deref(), Some("refresh-2"));
    }

    #[tokio::test]
    async fn background_run_reports_per_account_outcomes() {
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let (manager, _) = manager_with(endpoint.clone());
        manager.record_grant("ok", &grant_expiring_in(600)).unwrap();
        manager.record_grant("bad", &grant_expiring_in(-600)).unwrap();
        manager.record_grant("fresh", &grant_expiring_in(7200)).unwrap();
        // Accounts are refreshed most-expired first.
        endpoint.push(Err(ApiError::RefreshFailed("invalid_grant".to_string())));

        let report = manager.refresh_expiring().await.unwrap();
        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.processed(), 2);
        assert_eq!(
            report.errors,
            vec!["Failed to refresh token for user bad: Token refresh failed: invalid_grant"]
        );
        assert_eq!(manager.state("fresh").unwrap(), TokenState::Valid);

        // Failed accounts are not picked up again.
        let report = manager.refresh_expiring().await.unwrap();
        assert_eq!(report.processed(), 0);
    }

    #[tokio::test]
    async fn states_follow_lifecycle() {
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let (manager, _) = manager_with(endpoint);
        assert_eq!(manager.state("u1").unwrap(), TokenState::NoAccount);

        manager.record_grant("u1", &grant_expiring_in(600)).unwrap();
        assert_eq!(manager.state("u1").unwrap(), TokenState::ExpiringSoon);
        manager.record_grant("u1", &grant_expiring_in(-1)).unwrap();
        assert_eq!(manager.state("u1").unwrap(), TokenState::Expired);

        assert!(manager.sign_out("u1").unwrap());
        assert_eq!(manager.state("u1").unwrap(), TokenState::SignedOut);
        assert!(matches!(
            manager.access_token("u1").await,
            Err(ApiError::RefreshFailed(_))
        ));
    }

    #[tokio::test]
    async fn unknown_user_has_no_token() {
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let (manager, _) = manager_with(endpoint.clone());
        let session = manager.session("ghost");
        assert!(matches!(
            session.access_token().await,
            Err(ApiError::RefreshFailed(_))
        ));
        assert!(endpoint.calls().is_empty());
    }
}
