pub mod config;
pub mod manuscript;
pub mod models;
pub mod orchestrator;
pub mod projector;
pub mod transport;

/// Convenient type alias exposing common structs.
pub mod prelude {
    pub use crate::config::{ClientConfig, ConfigError, ProjectorConfig, UploadLimits};
    pub use crate::manuscript::ValidationError;
    pub use crate::models::{
        Analysis, CharacterProfile, Navigation, SelectedFile, UploadEnvelope, UploadResult,
        UploadSnapshot, UploadStatus,
    };
    pub use crate::orchestrator::{OrchestratorError, UploadEvent, UploadOrchestrator};
    pub use crate::projector::{Checkpoint, CheckpointTable, ProgressProjector, ProjectorHandle};
    pub use crate::transport::{TransportClient, TransportError, TransportErrorKind, UploadTransport};
}
