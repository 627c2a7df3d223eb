// src/projector.rs

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A fixed point on the synthetic progress scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub percent: u8,
    pub label: String,
}

impl Checkpoint {
    pub fn new(percent: u8, label: impl Into<String>) -> Self {
        Self { percent, label: label.into() }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("checkpoint table is empty")]
    Empty,
    #[error("checkpoint {percent}% does not follow {previous}%")]
    NotIncreasing { previous: u8, percent: u8 },
    #[error("last checkpoint must be 100%, found {0}%")]
    MissingCompletion(u8),
    #[error("checkpoint table needs at least one stage below 100%")]
    NoStages,
}

/// Ordered checkpoints, strictly increasing and ending at 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Checkpoint>", into = "Vec<Checkpoint>")]
pub struct CheckpointTable {
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointTable {
    pub fn new(checkpoints: Vec<Checkpoint>) -> Result<Self, CheckpointError> {
        let last = checkpoints.last().ok_or(CheckpointError::Empty)?;
        if last.percent != 100 {
            return Err(CheckpointError::MissingCompletion(last.percent));
        }
        if checkpoints.len() < 2 {
            return Err(CheckpointError::NoStages);
        }
        for pair in checkpoints.windows(2) {
            if pair[1].percent <= pair[0].percent {
                return Err(CheckpointError::NotIncreasing {
                    previous: pair[0].percent,
                    percent: pair[1].percent,
                });
            }
        }
        Ok(Self { checkpoints })
    }

    /// Stage shown the moment an upload is submitted.
    pub fn first(&self) -> &Checkpoint {
        &self.checkpoints[0]
    }

    /// The 100% entry, reserved for a confirmed result.
    pub fn completion(&self) -> &Checkpoint {
        &self.checkpoints[self.checkpoints.len() - 1]
    }

    /// Highest value the projection may reach on its own.
    pub fn cap(&self) -> &Checkpoint {
        &self.checkpoints[self.checkpoints.len() - 2]
    }

    /// Checkpoints emitted by ticks: everything after the first, below 100.
    pub fn projected(&self) -> &[Checkpoint] {
        &self.checkpoints[1..self.checkpoints.len() - 1]
    }

    /// Label of the highest checkpoint at or below `percent`.
    pub fn label_for(&self, percent: u8) -> Option<&str> {
        self.checkpoints
            .iter()
            .take_while(|c| c.percent <= percent)
            .last()
            .map(|c| c.label.as_str())
    }
}

impl TryFrom<Vec<Checkpoint>> for CheckpointTable {
    type Error = CheckpointError;

    fn try_from(checkpoints: Vec<Checkpoint>) -> Result<Self, Self::Error> {
        Self::new(checkpoints)
    }
}

impl From<CheckpointTable> for Vec<Checkpoint> {
    fn from(table: CheckpointTable) -> Self {
        table.checkpoints
    }
}

impl Default for CheckpointTable {
    /// Stages of the backend's analysis pipeline, in the order it runs them.
    fn default() -> Self {
        let checkpoints = [
            (5, "Uploading manuscript"),
            (15, "Researching subject"),
            (25, "Reviewing subject research"),
            (40, "Analyzing story cases"),
            (55, "Analyzing arguments"),
            (70, "Assessing development"),
            (80, "Aggregating content"),
            (88, "Moderating content"),
            (95, "Analyzing language"),
            (100, "Processing complete"),
        ]
        .into_iter()
        .map(|(percent, label)| Checkpoint::new(percent, label))
        .collect();
        Self { checkpoints }
    }
}

/// Timer-driven source of synthetic progress.
///
/// The backend gives no progress signal, so elapsed time is mapped onto the
/// checkpoint table instead. Ticks stop at the cap; only a real result may
/// report 100%.
#[derive(Debug, Clone)]
pub struct ProgressProjector {
    table: Arc<CheckpointTable>,
    tick_interval: Duration,
}

impl ProgressProjector {
    pub fn new(table: CheckpointTable, tick_interval: Duration) -> Self {
        Self {
            table: Arc::new(table),
            tick_interval,
        }
    }

    pub fn table(&self) -> &CheckpointTable {
        &self.table
    }

    /// Starts ticking. `on_tick` receives each projected checkpoint in order,
    /// one per interval, beginning one interval after the call.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<F>(&self, mut on_tick: F) -> ProjectorHandle
    where
        F: FnMut(Checkpoint) + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let table = self.table.clone();
        let period = self.tick_interval;

        debug!(interval_ms = period.as_millis() as u64, "projector started");
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for checkpoint in table.projected() {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => return,
                    _ = interval.tick() => {}
                }
                on_tick(checkpoint.clone());
            }
            debug!(percent = table.cap().percent, "projector holding at cap");
        });

        ProjectorHandle { token, task }
    }
}

/// Running projection. Dropping the handle stops it.
#[derive(Debug)]
pub struct ProjectorHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ProjectorHandle {
    /// Cancels further ticks. Calling it again, or after the sequence ran out, does nothing.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
            debug!("projector stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the timer task has finished, by exhaustion or cancellation.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ProjectorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
