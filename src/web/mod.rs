//! HTTP surface: the YooKassa webhook plus health and status probes.

pub mod middleware;
pub mod routes;
pub mod status;
pub mod webhook;

pub use routes::create_router;
