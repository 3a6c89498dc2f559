pub mod login;
pub mod otp;
pub mod ratelimit;
pub mod token;
