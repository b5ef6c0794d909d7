//! Core library for the `weather` CLI.
//!
//! This crate defines:
//! - The registered-city directory and query resolution
//! - The on-disk response cache and the cache-first fetch service
//! - Configuration, API key handling and errors
//! - Summaries computed from raw OpenWeather payloads
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod api_key;
pub mod cache;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod query;
pub mod report;
pub mod service;

pub use api_key::ApiKey;
pub use cache::{CacheEntry, CacheKey, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use directory::{LocationDirectory, LocationEntry};
pub use error::WeatherError;
pub use http::{HttpFetcher, RawResponse, ReqwestFetcher};
pub use query::{Query, QueryKind, QueryResolver, Target};
pub use service::WeatherService;
