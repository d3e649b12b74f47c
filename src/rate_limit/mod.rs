mod retry_policy;
mod token_bucket;

pub use retry_policy::RetryPolicy;
pub use token_bucket::{RateLimiter, RateLimiterConfig, RateLimiterStats};
