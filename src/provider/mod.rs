//! Activity Provider protocol: wire contract and HTTP client.

pub mod client;
pub mod contract;

pub use client::{HttpProviderClient, ProviderClient};
pub use contract::{AnalyticsContract, AnalyticsRow, MetricSample, MetricSpec};
