//! Shared fixtures for integration tests.
//!
//! Everything here is wired to nothing real: the database pool is lazy and
//! points at a port nobody listens on, so handlers that reach for it fail
//! fast instead of hanging on a connect.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use url::Url;

use cardcompare::config::Config;
use cardcompare::payment::PaymentService;
use cardcompare::payment::yookassa::YookassaClient;
use cardcompare::queue;
use cardcompare::scraper::{AuthCodeGateway, WbClient};
use cardcompare::state::AppState;
use cardcompare::telegram::TelegramClient;

pub fn test_config() -> Config {
    Config {
        bot_token: "12345:TEST".into(),
        admin_ids: "42".into(),
        admin_telegram_id: 42,
        database_url: "postgres://postgres@127.0.0.1:1/cardcompare_test".into(),
        port: 0,
        wb_phone: "+70000000000".into(),
        wb_headless: true,
        wb_state_file: PathBuf::from("storage/wb_state.json"),
        wb_downloads_path: PathBuf::from("storage/downloads"),
        wb_state_save_interval: Duration::from_secs(300),
        webdriver_url: "http://127.0.0.1:4444".into(),
        yookassa_shop_id: "000000".into(),
        yookassa_secret_key: "test_secret".into(),
        yookassa_return_url: "https://t.me/test_bot".into(),
        yookassa_receipt_email: "test@example.com".into(),
        shutdown_timeout: Duration::from_secs(5),
        log_level: "info".into(),
    }
}

pub fn test_state() -> AppState {
    let config = Arc::new(test_config());

    let connect_options =
        PgConnectOptions::from_str(&config.database_url).expect("test database url");
    let db_pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(250))
        .connect_lazy_with(connect_options);

    let telegram = Arc::new(TelegramClient::new(&config.bot_token));
    let yookassa = YookassaClient::new(
        config.yookassa_shop_id.clone(),
        config.yookassa_secret_key.clone(),
        config.yookassa_return_url.clone(),
        config.yookassa_receipt_email.clone(),
    );
    let payments = Arc::new(PaymentService::new(
        db_pool.clone(),
        yookassa,
        telegram.clone(),
    ));
    let wb_client = Arc::new(WbClient::new(
        config.wb_phone.clone(),
        config.wb_headless,
        Url::parse(&config.webdriver_url).expect("test webdriver url"),
        config.wb_state_file.clone(),
        config.wb_downloads_path.clone(),
    ));
    // Receivers are dropped: nothing in these tests runs the worker side.
    let (report_queue, _receivers) = queue::channel();

    AppState::new(
        db_pool,
        config,
        telegram,
        report_queue,
        payments,
        wb_client,
        AuthCodeGateway::new(),
    )
}
