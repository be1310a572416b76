//! # podlab
//!
//! A workload that misbehaves on request, for testing how an orchestrator
//! treats it.
//!
//! ## What it simulates
//!
//! - **Probe failures**: flip liveness and readiness at runtime and watch
//!   restarts and endpoint removal happen.
//! - **Memory pressure**: allocate real, committed memory in one shot or at
//!   a steady rate until the pod is OOM-killed or evicted.
//! - **Shutdown behaviour**: on SIGTERM optionally go unready, wait a
//!   configurable delay (or forever), then drain connections and exit.
//!
//! ## Pieces
//!
//! - [`HealthState`]: the two probe flags.
//! - [`ResourcePressureSimulator`]: the memory hog.
//! - [`ShutdownSequencer`]: the termination state machine.
//! - [`Server`] / [`Router`]: a small hyper-based transport.
//! - [`App`]: the HTTP endpoints wiring them together.
//!
//! ## Wiring
//!
//! ```rust,no_run
//! use podlab::{App, Config, HealthState, ResourcePressureSimulator, Server,
//!              ShutdownSequencer, SignalListener};
//!
//! # async fn run() -> Result<(), podlab::Error> {
//! let config = Config::from_env();
//! let health = HealthState::new();
//! let signals = SignalListener::install()?;
//!
//! let app = App::new(&config, health.clone(), ResourcePressureSimulator::new());
//! let server = Server::bind(&config.bind_addr).await?.start(app.router());
//!
//! ShutdownSequencer::new(config.shutdown, health)
//!     .run(signals.recv(), server)
//!     .await;
//! # Ok(())
//! # }
//! ```

mod app;
mod config;
mod error;
mod handler;
mod health;
mod method;
mod pressure;
mod request;
mod response;
mod router;
mod server;
mod shutdown;
mod status;

pub use app::App;
pub use config::{Config, ShutdownConfig, ShutdownDelay};
pub use error::Error;
pub use handler::Handler;
pub use health::HealthState;
pub use method::Method;
pub use pressure::{BLOCK_SIZE, ResourcePressureSimulator, StopOutcome, TICK_INTERVAL};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{Server, ServerHandle};
pub use shutdown::{DRAIN_TIMEOUT, Exit, Phase, ShutdownSequencer, Signal, SignalListener, Transport};
pub use status::Status;
