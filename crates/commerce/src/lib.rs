//! Target commerce API client
//!
//! - [`CommerceApi`]: the trait the migration engine talks to
//! - [`HttpCommerceClient`]: REST + GraphQL client over reqwest
//! - [`InMemoryCommerceStore`]: in-process store for dry runs

pub mod api;
pub mod client;
pub mod error;
pub mod memory;
pub mod types;

pub use api::CommerceApi;
pub use client::{CommerceClientConfig, HttpCommerceClient};
pub use error::{CommerceApiError, CommerceResult};
pub use memory::InMemoryCommerceStore;
pub use types::{BulkJobState, BulkJobStatus, RateLimitSnapshot, CALL_LIMIT_HEADER};
