//! Service plumbing shared by CRM binaries: env config, tracing, request
//! middleware and serialization helpers.

pub mod config;
pub mod middleware;
pub mod serde;
pub mod tracing;
