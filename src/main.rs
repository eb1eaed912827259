use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use cardcompare::app::App;
use cardcompare::cli::{Args, ServiceName};
use cardcompare::config::Config;
use cardcompare::logging::setup_logging;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    // Every deployment runs all three services in one process.
    let enabled_services = ServiceName::all();

    // Logging comes up before App::new so startup failures are never silently
    // dropped; the config is reloaded inside App::new with the same sources.
    let early_config = Config::load().expect("failed to load config for logging setup");
    setup_logging(&early_config, args.tracing);

    let mut app = App::new().await.expect("failed to initialize application");

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) { "development" } else { "production" },
        services = ?enabled_services,
        "starting cardcompare"
    );

    app.setup_services(&enabled_services)
        .expect("failed to set up services");
    app.start_services();

    app.run().await
}
