//! Weather and places provider clients with request governance.
//!
//! Both clients route every call through a [`RequestGovernor`]: a
//! fixed-window rate limit, linear-backoff retries, and coalescing of
//! identical in-flight requests. Responses are mapped into the normalized
//! types in [`types`].

pub mod convert;
pub mod governor;
mod http;
pub mod places;
pub mod rate_limit;
pub mod retry;
pub mod transform;
pub mod types;
pub mod weather;

pub use convert::{SpeedUnit, TemperatureUnit};
pub use governor::{RequestGovernor, RequestKey};
pub use places::PlacesClient;
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use transform::daily_summaries;
pub use types::*;
pub use weather::WeatherClient;

pub use tokio_util::sync::CancellationToken;
