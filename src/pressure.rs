//! Memory pressure on demand.
//!
//! The simulator holds a growing list of 1 MB blocks. Blocks are added either
//! in one shot or by a background loop that appends a fixed number per tick
//! until stopped. They are only ever released all together, by [`reset`].
//!
//! Every mutation of the block list and of the `running` flag happens under a
//! single mutex, whether it comes from a request handler or the tick loop. A
//! reported block count therefore always matches the memory actually held.
//!
//! [`reset`]: ResourcePressureSimulator::reset

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::Error;

/// Bytes per block. One "mb" on the control endpoints is one block.
pub const BLOCK_SIZE: usize = 1_000_000;

/// How often the continuous loop allocates.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

// Largest request whose bytes are addressable at all. Anything below this
// is attempted block by block until the container runs out of memory.
const MAX_BLOCKS: usize = isize::MAX as usize / BLOCK_SIZE;

// Zero-filled allocations can be served by lazily mapped pages that never
// count against the container's memory limit.
const FILL: u8 = 1;

struct MemoryBlock(Box<[u8]>);

impl MemoryBlock {
    fn filled() -> Self {
        Self(vec![FILL; BLOCK_SIZE].into_boxed_slice())
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Default)]
struct State {
    blocks: Vec<MemoryBlock>,
    running: bool,
    // Present from a successful start until the first stop. Consumed on send,
    // so the loop can never be signalled twice.
    stop: Option<oneshot::Sender<()>>,
}

impl State {
    // One block at a time: memory is committed as the list grows, and no
    // up-front reservation can fail before a single page is touched.
    fn append(&mut self, count: usize) -> usize {
        for _ in 0..count {
            self.blocks.push(MemoryBlock::filled());
        }
        self.blocks.len()
    }

    fn held_bytes(&self) -> usize {
        self.blocks.iter().map(MemoryBlock::len).sum()
    }
}

/// What [`ResourcePressureSimulator::stop_continuous`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The loop was signalled. It exits on its next wake.
    Stopped,
    /// A stop was already sent and the loop has not exited yet.
    AlreadyStopping,
    /// No loop was running.
    NotRunning,
}

/// Allocates and holds memory blocks. Clones share the same blocks.
#[derive(Clone)]
pub struct ResourcePressureSimulator {
    state: Arc<Mutex<State>>,
    interval: Duration,
}

impl ResourcePressureSimulator {
    pub fn new() -> Self {
        Self::with_interval(TICK_INTERVAL)
    }

    /// A simulator whose continuous loop ticks every `interval`.
    pub fn with_interval(interval: Duration) -> Self {
        Self { state: Arc::default(), interval }
    }

    /// Appends `megabytes` blocks and returns the new total block count.
    pub fn one_shot_allocate(&self, megabytes: i64) -> Result<usize, Error> {
        let count = blocks_for(megabytes)?;
        let mut state = lock(&self.state);
        let total = state.append(count);
        let held_bytes = state.held_bytes();
        drop(state);
        info!(mb = count, total_chunks = total, held_bytes, "allocated in one shot");
        Ok(total)
    }

    /// Starts the background loop, appending `megabytes` blocks per tick.
    ///
    /// The first tick fires one interval after the call. A second start while
    /// a loop is active is rejected with [`Error::AlreadyRunning`]; it is not
    /// queued and the active loop keeps its rate.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_continuous(&self, megabytes: i64) -> Result<(), Error> {
        let per_tick = blocks_for(megabytes)?;

        let stop = {
            let mut state = lock(&self.state);
            if state.running {
                return Err(Error::AlreadyRunning);
            }
            let (tx, rx) = oneshot::channel();
            state.running = true;
            state.stop = Some(tx);
            rx
        };

        info!(mb = per_tick, interval = ?self.interval, "started continuous allocation");
        tokio::spawn(hog_loop(Arc::downgrade(&self.state), per_tick, self.interval, stop));
        Ok(())
    }

    /// Signals the background loop to stop. Does not wait for it to exit.
    pub fn stop_continuous(&self) -> StopOutcome {
        let mut state = lock(&self.state);
        if !state.running {
            return StopOutcome::NotRunning;
        }
        match state.stop.take() {
            Some(tx) => {
                // The loop holds the receiver until it sees this send.
                let _ = tx.send(());
                StopOutcome::Stopped
            }
            None => StopOutcome::AlreadyStopping,
        }
    }

    /// Drops every held block. A running loop keeps appending afterwards.
    pub fn reset(&self) {
        let released = std::mem::take(&mut lock(&self.state).blocks);
        info!(released_chunks = released.len(), "memory allocations reset");
    }

    pub fn block_count(&self) -> usize {
        lock(&self.state).blocks.len()
    }

    /// Whether a continuous loop is active (including one told to stop that
    /// has not woken yet).
    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }
}

impl Default for ResourcePressureSimulator {
    fn default() -> Self {
        Self::new()
    }
}

// Holds the state weakly: once every simulator handle is gone the stop sender
// inside `State` drops with it, and the loop ends on the next poll.
async fn hog_loop(
    state: Weak<Mutex<State>>,
    per_tick: usize,
    period: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            // A dropped sender counts as a stop too.
            _ = &mut stop => {
                if let Some(state) = state.upgrade() {
                    let mut guard = lock(&state);
                    guard.running = false;
                    guard.stop = None;
                }
                info!("stopped hogging");
                return;
            }

            _ = ticker.tick() => {
                let Some(state) = state.upgrade() else {
                    debug!("simulator dropped, ending allocation loop");
                    return;
                };
                let mut guard = lock(&state);
                let total = guard.append(per_tick);
                let held_bytes = guard.held_bytes();
                drop(guard);
                debug!(mb = per_tick, total_chunks = total, held_bytes, "allocated this tick");
            }
        }
    }
}

// Poison is ignored: a panic mid-append leaves at worst a short tick.
fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn blocks_for(megabytes: i64) -> Result<usize, Error> {
    match usize::try_from(megabytes) {
        Ok(count) if (1..=MAX_BLOCKS).contains(&count) => Ok(count),
        _ => Err(Error::InvalidArgument(megabytes.to_string())),
    }
}
