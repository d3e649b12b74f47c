pub mod token_refresh;

pub use token_refresh::TokenRefreshJob;
