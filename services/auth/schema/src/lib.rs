//! sea-orm entities owned by the auth service.

pub mod otp_attempts;
pub mod otp_requests;
pub mod users;
