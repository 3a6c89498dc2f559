mod helpers;

mod login_test;
mod otp_test;
mod token_test;
