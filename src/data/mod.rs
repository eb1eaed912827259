//! Database models and schema.

pub mod events;
pub mod flags;
pub mod health;
pub mod kv;
pub mod models;
pub mod payments;
pub mod prices;
pub mod reports;
pub mod users;
