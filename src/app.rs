//! Application assembly: config, database, clients, services.

use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::ConnectOptions;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use url::Url;

use crate::cli::ServiceName;
use crate::config::Config;
use crate::data::flags;
use crate::payment::PaymentService;
use crate::payment::yookassa::YookassaClient;
use crate::queue::{self, ReportQueueReceivers};
use crate::scraper::{AuthCodeGateway, WbClient};
use crate::services::bot::BotService;
use crate::services::manager::ServiceManager;
use crate::services::scraper::ScraperService;
use crate::services::signals::handle_shutdown_signals;
use crate::services::web::WebService;
use crate::state::AppState;
use crate::telegram::TelegramClient;
use crate::utils::fmt_duration;

/// How often expired payment links are evicted from the invoice cache.
const INVOICE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct App {
    config: Arc<Config>,
    app_state: AppState,
    /// Consumed when the scraper service is registered.
    receivers: Option<ReportQueueReceivers>,
    service_manager: ServiceManager,
}

impl App {
    /// Create a new App instance with all components initialized.
    pub async fn new() -> Result<Self, anyhow::Error> {
        let config = Arc::new(Config::load().context("failed to load config")?);

        let slow_threshold = Duration::from_millis(500);
        let connect_options = sqlx::postgres::PgConnectOptions::from_str(&config.database_url)
            .context("failed to parse DATABASE_URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(4)
            .acquire_slow_threshold(slow_threshold)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("failed to create database pool")?;

        info!(
            min_connections = 0,
            max_connections = 4,
            acquire_timeout = "4s",
            idle_timeout = "2m",
            max_lifetime = "30m",
            acquire_slow_threshold = fmt_duration(slow_threshold),
            "database pool established"
        );

        info!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("failed to run database migrations")?;
        info!("database migrations completed");

        // Storage directories are created best-effort; a report task will
        // surface the real error if the filesystem is actually broken.
        if let Err(e) = tokio::fs::create_dir_all(&config.wb_downloads_path).await {
            warn!(
                path = %config.wb_downloads_path.display(),
                error = %e,
                "could not create downloads directory"
            );
        }
        if let Some(parent) = config.wb_state_file.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            warn!(path = %parent.display(), error = %e, "could not create state directory");
        }

        if flags::wb_use_mock(&db_pool).await {
            warn!("wb_use_mock flag is on, reports will use the bundled fixture");
        }
        if flags::compare_cards_mock(&db_pool).await {
            warn!("compare_cards_mock flag is on, comparisons will reuse an existing one");
        }

        let telegram = Arc::new(TelegramClient::new(&config.bot_token));

        let webdriver_url =
            Url::parse(&config.webdriver_url).context("failed to parse WEBDRIVER_URL")?;
        let wb_client = Arc::new(WbClient::new(
            config.wb_phone.clone(),
            config.wb_headless,
            webdriver_url,
            config.wb_state_file.clone(),
            config.wb_downloads_path.clone(),
        ));

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

        let (report_queue, receivers) = queue::channel();

        let app_state = AppState::new(
            db_pool,
            config.clone(),
            telegram,
            report_queue,
            payments,
            wb_client,
            AuthCodeGateway::new(),
        );
        app_state.spawn_invoice_cache_sweep(INVOICE_SWEEP_INTERVAL);

        Ok(App {
            config,
            app_state,
            receivers: Some(receivers),
            service_manager: ServiceManager::new(),
        })
    }

    /// Register the enabled services with the manager.
    pub fn setup_services(&mut self, services: &[ServiceName]) -> Result<(), anyhow::Error> {
        if services.contains(&ServiceName::Web) {
            let web_service = Box::new(WebService::new(self.config.port, self.app_state.clone()));
            self.service_manager
                .register_service(ServiceName::Web.as_str(), web_service);
        }

        if services.contains(&ServiceName::Bot) {
            let bot_service = Box::new(BotService::new(self.app_state.clone()));
            self.service_manager
                .register_service(ServiceName::Bot.as_str(), bot_service);
        }

        if services.contains(&ServiceName::Scraper) {
            let receivers = self
                .receivers
                .take()
                .context("scraper service registered twice")?;
            let scraper_service = Box::new(ScraperService::new(self.app_state.clone(), receivers));
            self.service_manager
                .register_service(ServiceName::Scraper.as_str(), scraper_service);
        }

        if !self.service_manager.has_services() {
            return Err(anyhow::anyhow!("no services enabled"));
        }

        Ok(())
    }

    /// Start all registered services.
    pub fn start_services(&mut self) {
        self.service_manager.spawn_all();
    }

    /// Run the application until a shutdown signal or service exit.
    pub async fn run(self) -> ExitCode {
        handle_shutdown_signals(self.service_manager, self.config.shutdown_timeout).await
    }
}
