//! Balance top-ups through YooKassa.

pub mod cache;
pub mod service;
pub mod yookassa;

pub use service::PaymentService;
