pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod ingest;
pub mod monitoring;
pub mod prompt;
pub mod providers;
pub mod service;
pub mod vector_store;

pub use cache::{Cache, CacheKey, Domain};
pub use context::AppContext;
pub use service::{Answer, QueryService, RequestOptions, ServiceError};
