pub mod buyer;
pub mod driver;
pub mod otp;
pub mod passenger;
pub mod payment_method;
pub mod points_transaction;
pub mod rating;
pub mod trip;
pub mod user;
pub mod vehicle;
