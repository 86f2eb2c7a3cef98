pub mod cache;
pub mod client;
pub mod error;
pub mod rate_limit;
pub mod retry;
pub mod scope;

pub use cache::ResponseCache;
pub use client::{ApiRequest, HttpClient};
pub use error::HttpError;
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use scope::RequestScope;
