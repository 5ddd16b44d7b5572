//! Poll loop
//!
//! A fixed-interval task that drains whatever telemetry is already
//! buffered, feeds it through the engine, and goes back to sleep. A tick
//! never waits for data that has not arrived yet.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::protocol::ChannelReader;

/// Upper bound on lines handled in one tick
pub const MAX_LINES_PER_TICK: usize = 256;

/// Poll loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollState {
    /// Waiting for the next tick
    Idle,
    /// Draining buffered input
    Polling,
    /// Shut down; the channel is closed
    Stopped,
}

/// What one poll tick did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Lines read from the channel
    pub lines: usize,
    /// Metric values stored
    pub updates: usize,
    /// Values that matched a pattern but did not parse
    pub skipped: usize,
    /// Lines discarded before classification (too long)
    pub dropped: usize,
    /// Read failure that ended the tick early
    pub error: Option<String>,
}

/// Periodic ingestion driver
pub struct PollLoop {
    engine: Arc<Engine>,
    reader: ChannelReader,
    state: PollState,
}

impl PollLoop {
    /// Drive `reader` into `engine`; the engine mirrors the reader's state
    pub fn new(engine: Arc<Engine>, reader: ChannelReader) -> Self {
        engine.set_connection_state(reader.state().clone());
        Self {
            engine,
            reader,
            state: PollState::Idle,
        }
    }

    /// Open the configured serial port. A failed open still yields a loop;
    /// it just never reads anything.
    pub fn connect(engine: Arc<Engine>, config: &EngineConfig) -> Self {
        let reader = ChannelReader::open(&config.port, config.baud_rate, config.read_timeout());
        Self::new(engine, reader)
    }

    /// Current lifecycle state
    pub fn state(&self) -> PollState {
        self.state
    }

    /// Engine fed by this loop
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Run a single tick
    pub fn poll_once(&mut self) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        if self.state == PollState::Stopped || !self.reader.is_open() {
            return outcome;
        }

        self.state = PollState::Polling;
        while outcome.lines + outcome.dropped < MAX_LINES_PER_TICK {
            match self.reader.has_pending_data() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    outcome.error = Some(e.to_string());
                    break;
                }
            }

            match self.reader.read_line() {
                Ok(line) => {
                    outcome.lines += 1;
                    let result = self.engine.ingest_line(&line);
                    outcome.updates += result.applied;
                    outcome.skipped += result.rejected;
                }
                Err(e) if e.is_line_local() => {
                    tracing::warn!("Dropped line: {e}");
                    outcome.dropped += 1;
                }
                Err(e) => {
                    outcome.error = Some(e.to_string());
                    break;
                }
            }
        }

        if let Some(reason) = &outcome.error {
            tracing::warn!("Read error: {reason}");
        }
        self.engine.finish_tick(outcome.updates, outcome.error.clone());
        self.state = PollState::Idle;
        outcome
    }

    /// Close the channel and stop for good
    pub fn stop(&mut self) {
        if self.state == PollState::Stopped {
            return;
        }
        self.reader.close();
        self.engine.set_connection_state(self.reader.state().clone());
        self.state = PollState::Stopped;
        self.engine.notify_stopped();
        tracing::info!("Poll loop stopped");
    }

    /// Drive the loop on the tokio runtime every `interval`
    pub fn spawn(mut self, interval: Duration) -> PollHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!("Polling every {}ms", interval.as_millis());

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        self.poll_once();
                    }
                }
            }

            self.stop();
            self
        });

        PollHandle { cancel, task }
    }
}

/// Handle to a spawned poll loop
pub struct PollHandle {
    cancel: CancellationToken,
    task: JoinHandle<PollLoop>,
}

impl PollHandle {
    /// Stop after the current tick and wait for the channel to close
    pub async fn stop(self) -> Result<PollLoop, tokio::task::JoinError> {
        self.cancel.cancel();
        self.task.await
    }
}
