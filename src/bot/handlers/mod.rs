pub mod admin;
pub mod auth_code;
pub mod balance;
pub mod reports;
pub mod start;
