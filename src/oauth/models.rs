use serde::{Deserialize, Serialize};

/// Stored credentials of one user at one provider. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthAccountRecord {
    pub user_id: String,
    pub provider: String,
    pub provider_account_id: String,
    /// `None` once the user signed out.
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    /// Set when a refresh failed. Cleared only by a new sign-in.
    pub refresh_error: Option<String>,
    pub updated_at: i64,
}

impl OAuthAccountRecord {
    pub fn is_signed_out(&self) -> bool {
        self.access_token.is_none()
    }

    pub fn seconds_left(&self, now: i64) -> i64 {
        self.expires_at - now
    }
}

/// Tokens obtained from a fresh sign-in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenGrant {
    pub provider_account_id: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Successful answer of the token endpoint to a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    /// Providers may rotate the refresh token. When absent the stored one stays valid.
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    NoAccount,
    Valid,
    ExpiringSoon,
    Refreshing,
    Expired,
    RefreshFailed,
    SignedOut,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshReport {
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl RefreshReport {
    pub fn processed(&self) -> usize {
        self.successful + self.failed
    }
}
