//! Domain types shared across all CRM services.
//!
//! Pure types with no framework dependencies: roles, permissions, phone numbers.

pub mod permission;
pub mod phone;
pub mod user;
