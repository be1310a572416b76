//! Graceful shutdown sequencing.
//!
//! When the kubelet deletes a pod it sends SIGTERM, waits
//! `terminationGracePeriodSeconds`, then sends SIGKILL. The sequencer plays
//! out one configurable version of what a workload does in between:
//!
//! ```text
//! Idle → SignalReceived → (MarkingUnready) → Delaying → Draining → Exited
//!                                          ↘ Stuck (never left)
//! ```
//!
//! - **MarkingUnready** (if enabled) flips readiness off so the endpoints
//!   controller stops routing here while the pod still serves.
//! - **Delaying** stands in for in-flight work finishing.
//! - **Stuck** is entered instead of Delaying when the delay is "never": the
//!   pod keeps answering probes and ignores the signal until SIGKILL.
//! - **Draining** asks the transport to close down within [`DRAIN_TIMEOUT`].
//!   A timeout is logged and exit proceeds anyway.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{ShutdownConfig, ShutdownDelay};
use crate::error::Error;
use crate::health::HealthState;

/// Budget for draining in-flight connections.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the sequencer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SignalReceived,
    MarkingUnready,
    Delaying,
    /// Simulated hung shutdown. Never left.
    Stuck,
    Draining,
    Exited,
}

/// Something that can stop serving within a time budget.
pub trait Transport {
    /// Stop accepting work and finish in-flight work within `timeout`.
    /// Returns [`Error::DrainTimeout`] if the budget ran out.
    fn drain(self, timeout: Duration) -> impl Future<Output = Result<(), Error>> + Send;
}

/// A termination request from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Interrupt,
}

impl Signal {
    pub fn name(self) -> &'static str {
        match self {
            Self::Terminate => "SIGTERM",
            Self::Interrupt => "SIGINT",
        }
    }

    /// POSIX signal number.
    pub fn number(self) -> i32 {
        match self {
            Self::Terminate => 15,
            Self::Interrupt => 2,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Registered handlers for SIGTERM and SIGINT (Ctrl-C only on Windows).
///
/// Install at startup so a signal that arrives before [`recv`](Self::recv) is
/// polled is not lost.
pub struct SignalListener {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
}

impl SignalListener {
    #[cfg(unix)]
    pub fn install() -> Result<Self, Error> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> Result<Self, Error> {
        Ok(Self {})
    }

    /// Resolves on the first termination signal.
    #[cfg(unix)]
    pub async fn recv(mut self) -> Signal {
        tokio::select! {
            _ = self.terminate.recv() => Signal::Terminate,
            _ = self.interrupt.recv() => Signal::Interrupt,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(self) -> Signal {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to wait for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
        Signal::Interrupt
    }
}

/// How the sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exit {
    pub signal: Signal,
    /// `false` if the drain budget ran out and connections were dropped.
    pub drained_cleanly: bool,
}

/// Runs the shutdown sequence once.
pub struct ShutdownSequencer {
    config: ShutdownConfig,
    health: HealthState,
    drain_timeout: Duration,
    phase: watch::Sender<Phase>,
}

impl ShutdownSequencer {
    pub fn new(config: ShutdownConfig, health: HealthState) -> Self {
        Self {
            config,
            health,
            drain_timeout: DRAIN_TIMEOUT,
            phase: watch::Sender::new(Phase::Idle),
        }
    }

    /// Overrides [`DRAIN_TIMEOUT`].
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Follows phase changes.
    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Waits for `termination`, then runs the sequence to the end.
    ///
    /// Returns once the transport has drained (or timed out); the caller is
    /// expected to exit the process. With [`ShutdownDelay::Never`] this never
    /// returns, and `transport` keeps serving.
    pub async fn run<T>(self, termination: impl Future<Output = Signal>, transport: T) -> Exit
    where
        T: Transport,
    {
        let signal = termination.await;
        self.enter(Phase::SignalReceived);
        info!(
            signal = signal.name(),
            number = signal.number(),
            "received signal, starting graceful shutdown"
        );

        if self.config.unready_on_shutdown {
            self.enter(Phase::MarkingUnready);
            self.health.force_unready();
            info!("unready on shutdown, readiness now false");
        }

        match self.config.delay {
            ShutdownDelay::Never => {
                self.enter(Phase::Stuck);
                warn!("shutdown delay is negative, simulating a stuck pod and blocking forever");
                match std::future::pending::<Infallible>().await {}
            }
            ShutdownDelay::After(delay) => {
                self.enter(Phase::Delaying);
                info!(?delay, "sleeping before shutting down");
                tokio::time::sleep(delay).await;
            }
        }

        self.enter(Phase::Draining);
        let drained_cleanly = match transport.drain(self.drain_timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!("server forced to shut down: {e}");
                false
            }
        };

        self.enter(Phase::Exited);
        info!(drained_cleanly, "cleanup complete, exiting");
        Exit { signal, drained_cleanly }
    }

    fn enter(&self, phase: Phase) {
        self.phase.send_replace(phase);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::oneshot;

    use super::*;

    /// A transport that takes `takes` to drain.
    struct FakeTransport {
        takes: Duration,
        drained: Arc<AtomicBool>,
    }

    impl Transport for FakeTransport {
        fn drain(self, timeout: Duration) -> impl Future<Output = Result<(), Error>> + Send {
            async move {
                if self.takes > timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(Error::DrainTimeout(timeout));
                }
                tokio::time::sleep(self.takes).await;
                self.drained.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn transport(takes: Duration) -> (FakeTransport, Arc<AtomicBool>) {
        let drained = Arc::new(AtomicBool::new(false));
        (FakeTransport { takes, drained: Arc::clone(&drained) }, drained)
    }

    fn config(unready_on_shutdown: bool, delay: ShutdownDelay) -> ShutdownConfig {
        ShutdownConfig { unready_on_shutdown, delay }
    }

    fn termination() -> (oneshot::Sender<Signal>, impl Future<Output = Signal>) {
        let (tx, rx) = oneshot::channel();
        (tx, async move { rx.await.unwrap_or(Signal::Terminate) })
    }

    #[tokio::test(start_paused = true)]
    async fn idle_until_signal() {
        let health = HealthState::new();
        let seq = ShutdownSequencer::new(ShutdownConfig::default(), health.clone());
        let phase = seq.phase();
        let (_tx, signal) = termination();
        let (transport, drained) = transport(Duration::ZERO);

        let run = tokio::spawn(seq.run(signal, transport));
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(*phase.borrow(), Phase::Idle);
        assert!(health.is_ready());
        assert!(!drained.load(Ordering::SeqCst));
        assert!(!run.is_finished());
        run.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn marks_unready_before_delay_then_drains_and_exits() {
        let health = HealthState::new();
        let seq = ShutdownSequencer::new(
            config(true, ShutdownDelay::After(Duration::from_secs(2))),
            health.clone(),
        );
        let phase = seq.phase();
        let (tx, signal) = termination();
        let (transport, drained) = transport(Duration::from_millis(100));

        let run = tokio::spawn(seq.run(signal, transport));
        tx.send(Signal::Terminate).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*phase.borrow(), Phase::Delaying);
        assert!(!health.is_ready());
        assert!(health.is_alive());
        assert!(!drained.load(Ordering::SeqCst));

        let exit = tokio::time::timeout(Duration::from_secs(2) + DRAIN_TIMEOUT, run)
            .await
            .expect("sequencer should exit within delay + drain budget")
            .unwrap();

        assert_eq!(exit, Exit { signal: Signal::Terminate, drained_cleanly: true });
        assert_eq!(*phase.borrow(), Phase::Exited);
        assert!(drained.load(Ordering::SeqCst));
        assert!(health.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_untouched_when_not_configured() {
        let health = HealthState::new();
        let seq = ShutdownSequencer::new(
            config(false, ShutdownDelay::After(Duration::ZERO)),
            health.clone(),
        );
        let (tx, signal) = termination();
        let (transport, _) = transport(Duration::ZERO);

        let run = tokio::spawn(seq.run(signal, transport));
        tx.send(Signal::Interrupt).unwrap();
        let exit = run.await.unwrap();

        assert_eq!(exit.signal, Signal::Interrupt);
        assert!(health.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_timeout_is_reported_not_fatal() {
        let seq = ShutdownSequencer::new(
            config(true, ShutdownDelay::After(Duration::ZERO)),
            HealthState::new(),
        )
        .with_drain_timeout(Duration::from_secs(1));
        let phase = seq.phase();
        let (tx, signal) = termination();
        let (transport, drained) = transport(Duration::from_secs(30));

        let run = tokio::spawn(seq.run(signal, transport));
        tx.send(Signal::Terminate).unwrap();
        let exit = run.await.unwrap();

        assert!(!exit.drained_cleanly);
        assert!(!drained.load(Ordering::SeqCst));
        assert_eq!(*phase.borrow(), Phase::Exited);
    }

    #[tokio::test(start_paused = true)]
    async fn never_delay_gets_stuck_forever() {
        let health = HealthState::new();
        let seq = ShutdownSequencer::new(config(true, ShutdownDelay::Never), health.clone());
        let phase = seq.phase();
        let (tx, signal) = termination();
        let (transport, drained) = transport(Duration::ZERO);

        let run = tokio::spawn(seq.run(signal, transport));
        tx.send(Signal::Terminate).unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;

        assert_eq!(*phase.borrow(), Phase::Stuck);
        assert!(!run.is_finished());
        assert!(!drained.load(Ordering::SeqCst));
        assert!(!health.is_ready());
        assert!(health.is_alive());
        run.abort();
    }

    #[test]
    fn signal_descriptions() {
        assert_eq!(Signal::Terminate.to_string(), "SIGTERM");
        assert_eq!(Signal::Terminate.number(), 15);
        assert_eq!(Signal::Interrupt.name(), "SIGINT");
        assert_eq!(Signal::Interrupt.number(), 2);
    }
}
