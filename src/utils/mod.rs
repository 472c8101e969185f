pub mod extract;
pub mod geo;
pub mod jwt;
pub mod otp;
pub mod response;
