// src/orchestrator.rs

use crate::config::{ClientConfig, UploadLimits};
use crate::manuscript::{self, ValidationError, NO_FILE_MESSAGE};
use crate::models::{Navigation, SelectedFile, UploadEnvelope, UploadResult, UploadSnapshot, UploadStatus};
use crate::projector::{Checkpoint, ProgressProjector, ProjectorHandle};
use crate::transport::{TransportClient, TransportError, UploadTransport};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

/// Shown when a failure carries no usable detail.
pub const GENERIC_FAILURE: &str = "Upload failed";

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("an upload is already in flight")]
    Busy,
    #[error("cannot {action} while {from:?}")]
    InvalidTransition {
        from: UploadStatus,
        action: &'static str,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to build transport: {0}")]
    ClientBuild(#[source] TransportError),
}

/// Signals for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Progress { percent: u8, label: String },
    /// Open the detail view for the uploaded book.
    Navigate(Navigation),
    Failed { message: String },
}

struct Attempt {
    /// Bumped on every submit and teardown; outcomes of older generations are dropped.
    generation: u64,
    state: UploadSnapshot,
    projector: Option<ProjectorHandle>,
}

struct Inner {
    transport: Arc<dyn UploadTransport>,
    projector: ProgressProjector,
    limits: UploadLimits,
    attempt: Mutex<Attempt>,
    snapshots: watch::Sender<UploadSnapshot>,
    events: broadcast::Sender<UploadEvent>,
    /// Cancelled once the last orchestrator handle is dropped.
    shutdown: CancellationToken,
}

/// Owns the single upload attempt of a client session.
///
/// Every state change goes through this type. Callers read snapshots through
/// [`snapshot`](Self::snapshot) or [`watch`](Self::watch) and listen for
/// navigation on [`subscribe`](Self::subscribe).
#[derive(Clone)]
pub struct UploadOrchestrator {
    inner: Arc<Inner>,
    _owner: Arc<DropGuard>,
}

impl UploadOrchestrator {
    pub fn new(transport: Arc<dyn UploadTransport>, config: &ClientConfig) -> Self {
        let (snapshots, _) = watch::channel(UploadSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shutdown = CancellationToken::new();
        Self {
            _owner: Arc::new(shutdown.clone().drop_guard()),
            inner: Arc::new(Inner {
                transport,
                projector: config.projector.build(),
                limits: config.limits.clone(),
                attempt: Mutex::new(Attempt {
                    generation: 0,
                    state: UploadSnapshot::default(),
                    projector: None,
                }),
                snapshots,
                events,
                shutdown,
            }),
        }
    }

    /// Orchestrator backed by the HTTP transport.
    pub fn from_config(config: &ClientConfig) -> Result<Self, OrchestratorError> {
        let transport = TransportClient::new(config).map_err(OrchestratorError::ClientBuild)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<UploadSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.inner.events.subscribe()
    }

    /// Inspects a manuscript on disk, then selects it.
    pub async fn select_path(&self, path: &Path) -> Result<(), OrchestratorError> {
        if self.snapshot().status == UploadStatus::InFlight {
            return Err(OrchestratorError::Busy);
        }
        match manuscript::inspect(path, &self.inner.limits).await {
            Ok(file) => self.select_file(Some(file)).await,
            Err(e) => {
                let mut attempt = self.inner.attempt.lock().await;
                if attempt.state.status == UploadStatus::InFlight {
                    return Err(OrchestratorError::Busy);
                }
                info!(path = %path.display(), error = %e, "manuscript rejected");
                attempt.state.validation_error = Some(e.to_string());
                self.inner.publish(&attempt);
                Err(e.into())
            }
        }
    }

    /// Chooses the file for the next submit. `None` only records a validation message.
    pub async fn select_file(&self, file: Option<SelectedFile>) -> Result<(), OrchestratorError> {
        let mut attempt = self.inner.attempt.lock().await;
        if attempt.state.status == UploadStatus::InFlight {
            warn!("file selection ignored while an upload is in flight");
            return Err(OrchestratorError::Busy);
        }
        let Some(file) = file else {
            attempt.state.validation_error = Some(NO_FILE_MESSAGE.to_string());
            self.inner.publish(&attempt);
            return Err(ValidationError::NoFileSelected.into());
        };

        info!(file = %file.name, size = file.size, "file selected");
        attempt.state = UploadSnapshot {
            status: UploadStatus::Ready,
            file: Some(file),
            ..UploadSnapshot::default()
        };
        self.inner.publish(&attempt);
        Ok(())
    }

    /// Starts uploading the selected file. Returns once the attempt is in flight;
    /// the outcome arrives through snapshots and events.
    pub async fn submit(&self) -> Result<(), OrchestratorError> {
        let mut attempt = self.inner.attempt.lock().await;
        match attempt.state.status {
            UploadStatus::InFlight => {
                warn!("submit ignored while an upload is in flight");
                return Err(OrchestratorError::Busy);
            }
            UploadStatus::Succeeded => {
                return Err(OrchestratorError::InvalidTransition {
                    from: UploadStatus::Succeeded,
                    action: "submit",
                });
            }
            UploadStatus::Idle | UploadStatus::Ready | UploadStatus::Failed => {}
        }

        let Some(file) = attempt.state.file.clone() else {
            attempt.state.status = UploadStatus::Failed;
            attempt.state.error_message = Some(NO_FILE_MESSAGE.to_string());
            attempt.state.result = None;
            attempt.state.progress_percent = 0;
            attempt.state.stage_label.clear();
            self.inner.publish(&attempt);
            self.inner.emit(UploadEvent::Failed {
                message: NO_FILE_MESSAGE.to_string(),
            });
            return Err(ValidationError::NoFileSelected.into());
        };

        attempt.generation += 1;
        let generation = attempt.generation;
        let first = self.inner.projector.table().first().clone();
        attempt.state = UploadSnapshot {
            status: UploadStatus::InFlight,
            file: Some(file.clone()),
            progress_percent: first.percent,
            stage_label: first.label.clone(),
            ..UploadSnapshot::default()
        };

        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        attempt.projector = Some(self.inner.projector.start(move |checkpoint| {
            let _ = tick_tx.send(checkpoint);
        }));
        self.inner.publish(&attempt);
        drop(attempt);

        info!(file = %file.name, generation, "upload submitted");
        self.inner.emit(UploadEvent::Progress {
            percent: first.percent,
            label: first.label,
        });

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.drive(generation, file, tick_rx).await;
        });
        Ok(())
    }

    /// Clears a finished or unsubmitted attempt.
    pub async fn reset(&self) -> Result<(), OrchestratorError> {
        let mut attempt = self.inner.attempt.lock().await;
        if attempt.state.status == UploadStatus::InFlight {
            return Err(OrchestratorError::Busy);
        }
        self.inner.clear(&mut attempt);
        Ok(())
    }

    /// Leaves the upload screen: stops the projector and forgets the attempt,
    /// even mid-flight. The request itself runs to completion; its outcome is discarded.
    pub async fn teardown(&self) {
        let mut attempt = self.inner.attempt.lock().await;
        if attempt.state.status == UploadStatus::InFlight {
            info!(generation = attempt.generation, "abandoning in-flight upload");
        }
        self.inner.clear(&mut attempt);
    }
}

impl Inner {
    fn publish(&self, attempt: &Attempt) {
        self.snapshots.send_replace(attempt.state.clone());
    }

    fn emit(&self, event: UploadEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn clear(&self, attempt: &mut Attempt) {
        if let Some(projector) = attempt.projector.take() {
            projector.stop();
        }
        attempt.generation += 1;
        attempt.state = UploadSnapshot::default();
        self.publish(attempt);
    }

    /// Runs one attempt: forwards ticks until the transport answers. The
    /// transport branch is polled first, so a result always beats a tick that
    /// became ready at the same moment. Gives up when every handle is gone.
    async fn drive(
        self: Arc<Self>,
        generation: u64,
        file: SelectedFile,
        mut ticks: mpsc::UnboundedReceiver<Checkpoint>,
    ) {
        let transport = self.transport.clone();
        let upload = transport.upload(&file);
        tokio::pin!(upload);

        let mut ticking = true;
        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.abandon(generation).await;
                    return;
                }
                outcome = &mut upload => break outcome,
                tick = ticks.recv(), if ticking => match tick {
                    Some(checkpoint) => self.apply_tick(generation, checkpoint).await,
                    None => ticking = false,
                },
            }
        };
        self.resolve(generation, outcome).await;
    }

    async fn abandon(&self, generation: u64) {
        let mut attempt = self.attempt.lock().await;
        if attempt.generation != generation {
            return;
        }
        info!(generation, "orchestrator dropped, abandoning upload");
        if let Some(projector) = attempt.projector.take() {
            projector.stop();
        }
        attempt.generation += 1;
    }

    async fn apply_tick(&self, generation: u64, checkpoint: Checkpoint) {
        let mut attempt = self.attempt.lock().await;
        if attempt.generation != generation || attempt.state.status != UploadStatus::InFlight {
            debug!(percent = checkpoint.percent, "discarding stale tick");
            return;
        }
        if checkpoint.percent <= attempt.state.progress_percent {
            return;
        }
        let label = self
            .projector
            .table()
            .label_for(checkpoint.percent)
            .unwrap_or(&checkpoint.label)
            .to_string();
        debug!(percent = checkpoint.percent, %label, "projected progress");
        attempt.state.progress_percent = checkpoint.percent;
        attempt.state.stage_label = label.clone();
        self.publish(&attempt);
        drop(attempt);

        self.emit(UploadEvent::Progress {
            percent: checkpoint.percent,
            label,
        });
    }

    async fn resolve(&self, generation: u64, outcome: Result<UploadEnvelope, TransportError>) {
        let mut attempt = self.attempt.lock().await;
        if attempt.generation != generation {
            info!(generation, "discarding outcome of abandoned upload");
            return;
        }
        if let Some(projector) = attempt.projector.take() {
            projector.stop();
        }

        match outcome {
            Ok(envelope) => {
                let result = UploadResult::from(envelope);
                let completion = self.projector.table().completion();
                info!(filename = %result.filename, "upload succeeded");

                attempt.state.status = UploadStatus::Succeeded;
                attempt.state.file = None;
                attempt.state.progress_percent = 100;
                attempt.state.stage_label = completion.label.clone();
                attempt.state.error_message = None;
                attempt.state.result = Some(result.clone());
                self.publish(&attempt);
                drop(attempt);

                self.emit(UploadEvent::Progress {
                    percent: 100,
                    label: completion.label.clone(),
                });
                self.emit(UploadEvent::Navigate(Navigation::to_book(result)));
            }
            Err(err) => {
                let message = if err.detail.trim().is_empty() {
                    GENERIC_FAILURE.to_string()
                } else {
                    err.detail.clone()
                };
                warn!(kind = %err.kind, %message, "upload failed");

                attempt.state.status = UploadStatus::Failed;
                attempt.state.progress_percent = 0;
                attempt.state.stage_label.clear();
                attempt.state.error_message = Some(message.clone());
                attempt.state.result = None;
                self.publish(&attempt);
                drop(attempt);

                self.emit(UploadEvent::Failed { message });
            }
        }
    }
}
