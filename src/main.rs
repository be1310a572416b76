//! podlab binary.
//!
//! ```text
//! RUST_LOG=info APP_NAME=demo SHUTDOWN_DELAY=5 cargo run
//! curl localhost:3000/healthz
//! curl 'localhost:3000/start-hog?mb=20'
//! ```

use podlab::{
    App, Config, HealthState, ResourcePressureSimulator, Server, ShutdownDelay,
    ShutdownSequencer, SignalListener,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let delay = match config.shutdown.delay {
        ShutdownDelay::After(d) => format!("{}s", d.as_secs()),
        ShutdownDelay::Never => "never".to_owned(),
    };
    info!(
        app_name = %config.app_name,
        hostname = %config.hostname,
        bind_addr = %config.bind_addr,
        shutdown_delay = %delay,
        unready_on_shutdown = config.shutdown.unready_on_shutdown,
        "starting podlab"
    );

    // Before binding, so a SIGTERM during startup is not missed.
    let signals = SignalListener::install()?;

    let health = HealthState::new();
    let app = App::new(&config, health.clone(), ResourcePressureSimulator::new());
    let server = Server::bind(&config.bind_addr).await?.start(app.router());

    let exit = ShutdownSequencer::new(config.shutdown, health)
        .run(signals.recv(), server)
        .await;

    info!(signal = %exit.signal, drained_cleanly = exit.drained_cleanly, "podlab exited");
    Ok(())
}
