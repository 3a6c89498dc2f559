//! Auth types shared across CRM services.
//!
//! Provides JWT claim types and validation, the bearer-token `Identity` extractor,
//! and the permission gate.

pub mod gate;
pub mod identity;
pub mod token;
