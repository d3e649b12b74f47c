//! OAuth credentials of signed-in users and their refresh lifecycle.

mod account_store;
mod manager;
mod models;
mod schema;
mod token_client;

pub use account_store::{AccountStore, SqliteAccountStore};
pub use manager::{AccountSession, TokenLifecycleManager};
pub use models::{OAuthAccountRecord, RefreshReport, RefreshedToken, TokenGrant, TokenState};
pub use schema::ACCOUNTS_VERSIONED_SCHEMAS;
pub use token_client::{OAuthTokenClient, TokenEndpoint, DEFAULT_TOKEN_URL};

pub const SPOTIFY_PROVIDER: &str = "spotify";

#[cfg(test)]
pub(crate) use manager::tests::{grant_expiring_in, manager_with, FakeTokenEndpoint};
