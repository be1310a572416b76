//! The podlab route table.
//!
//! | Path | Effect |
//! |---|---|
//! | `/` | greeting |
//! | `/healthz` | `200 ALIVE` or `500 NOT ALIVE` |
//! | `/ready` | `200 READY` or `503 NOT READY` |
//! | `/toggle-alive`, `/toggle-ready` | flip a flag, body has the new value |
//! | `/start-hog?mb=N` | allocate N MB per second in the background (default 5) |
//! | `/stop-hog` | stop the background allocation |
//! | `/reset-hog` | release everything allocated so far |
//! | `/hog?mb=N` | allocate N MB once (default 10) |
//!
//! All endpoints are `GET`, answer in plain text, and name the pod so you can
//! tell replicas apart behind a Service.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::handler::Handler;
use crate::health::HealthState;
use crate::pressure::{ResourcePressureSimulator, StopOutcome};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::status::Status;

const DEFAULT_HOG_MB: i64 = 10;
const DEFAULT_START_HOG_MB: i64 = 5;

/// State shared by every handler.
pub struct App {
    app_name: String,
    hostname: String,
    health: HealthState,
    pressure: ResourcePressureSimulator,
}

impl App {
    pub fn new(config: &Config, health: HealthState, pressure: ResourcePressureSimulator) -> Self {
        Self {
            app_name: config.app_name.clone(),
            hostname: config.hostname.clone(),
            health,
            pressure,
        }
    }

    /// Builds the router serving every podlab endpoint.
    pub fn router(self) -> Router {
        let app = Arc::new(self);
        Router::new()
            .get("/",             route(&app, Self::root))
            .get("/healthz",      route(&app, Self::healthz))
            .get("/ready",        route(&app, Self::ready))
            .get("/toggle-alive", route(&app, Self::toggle_alive))
            .get("/toggle-ready", route(&app, Self::toggle_ready))
            .get("/start-hog",    route(&app, Self::start_hog))
            .get("/stop-hog",     route(&app, Self::stop_hog))
            .get("/reset-hog",    route(&app, Self::reset_hog))
            .get("/hog",          route(&app, Self::hog))
    }

    fn root(&self, req: &Request) -> Response {
        info!(peer = %req.peer(), "request to /");
        Response::text(format!("Hello from {} on Pod {}\n", self.app_name, self.hostname))
    }

    fn healthz(&self, req: &Request) -> Response {
        info!(peer = %req.peer(), "request to /healthz");
        if self.health.is_alive() {
            Response::text("ALIVE\n")
        } else {
            Response::builder()
                .status(Status::InternalServerError)
                .text("NOT ALIVE\n")
        }
    }

    fn ready(&self, req: &Request) -> Response {
        info!(peer = %req.peer(), "request to /ready");
        if self.health.is_ready() {
            Response::text("READY\n")
        } else {
            Response::builder()
                .status(Status::ServiceUnavailable)
                .text("NOT READY\n")
        }
    }

    fn toggle_alive(&self, _req: &Request) -> Response {
        let alive = self.health.toggle_alive();
        info!(alive, "toggled liveness");
        Response::text(format!("Liveness is now: {alive} for Pod {}\n", self.hostname))
    }

    fn toggle_ready(&self, _req: &Request) -> Response {
        let ready = self.health.toggle_ready();
        info!(ready, "toggled readiness");
        Response::text(format!("Readiness is now: {ready} for Pod {}\n", self.hostname))
    }

    fn start_hog(&self, req: &Request) -> Response {
        let result = megabytes(req, DEFAULT_START_HOG_MB)
            .and_then(|mb| self.pressure.start_continuous(mb).map(|()| mb));

        match result {
            Ok(mb) => Response::text(format!(
                "Started allocating {mb} MiB per second on pod {}.\n",
                self.hostname
            )),
            Err(Error::AlreadyRunning) => Response::text(format!(
                "Already hogging memory on pod {}. Stop first or keep going.\n",
                self.hostname
            )),
            Err(e) => bad_request(&e),
        }
    }

    fn stop_hog(&self, _req: &Request) -> Response {
        let body = match self.pressure.stop_continuous() {
            StopOutcome::Stopped => format!("Stopped hogging memory on pod {}.\n", self.hostname),
            StopOutcome::AlreadyStopping => {
                format!("Already stopping, hogging ends on the next tick on pod {}.\n", self.hostname)
            }
            StopOutcome::NotRunning => format!("Not currently hogging on pod {}.\n", self.hostname),
        };
        Response::text(body)
    }

    fn reset_hog(&self, _req: &Request) -> Response {
        self.pressure.reset();
        Response::text(format!(
            "Memory allocations reset on pod {}. (Chunks cleared.)\n",
            self.hostname
        ))
    }

    fn hog(&self, req: &Request) -> Response {
        let result = megabytes(req, DEFAULT_HOG_MB)
            .and_then(|mb| self.pressure.one_shot_allocate(mb).map(|total| (mb, total)));

        match result {
            Ok((mb, total)) => Response::text(format!(
                "Allocated {mb} MiB in one shot on pod {}. Total chunks: {total}\n",
                self.hostname
            )),
            Err(e) => bad_request(&e),
        }
    }
}

/// Adapts a plain `&App` method into a router handler.
fn route(app: &Arc<App>, f: fn(&App, &Request) -> Response) -> impl Handler + use<> {
    let app = Arc::clone(app);
    move |req: Request| {
        let app = Arc::clone(&app);
        async move { f(&app, &req) }
    }
}

/// The `mb` query parameter. Absent or empty means `default`; range checks
/// are left to the simulator.
fn megabytes(req: &Request, default: i64) -> Result<i64, Error> {
    match req.query("mb") {
        None | Some("") => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::InvalidArgument(raw.to_owned())),
    }
}

fn bad_request(e: &Error) -> Response {
    warn!(error = %e, "rejected hog request");
    Response::builder()
        .status(Status::BadRequest)
        .text("Invalid mb parameter. Must be > 0.\n")
}
