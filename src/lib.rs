//! Telegram bot selling Wildberries card-comparison reports, with a YooKassa
//! payment webhook and a browser-automation worker behind a shared queue.

pub mod app;
pub mod bot;
pub mod cli;
pub mod config;
pub mod data;
pub mod fmt;
pub mod json;
pub mod logging;
pub mod payment;
pub mod queue;
pub mod scraper;
pub mod services;
pub mod state;
pub mod telegram;
pub mod utils;
pub mod web;
