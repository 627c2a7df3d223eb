use crate::config::UploadLimits;
use crate::models::SelectedFile;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const NO_FILE_MESSAGE: &str = "Please select a file first";

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{}", NO_FILE_MESSAGE)]
    NoFileSelected,
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("file is empty: {}", .0.display())]
    Empty(PathBuf),
    #[error("file is {size} bytes, the limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("invalid file type. Allowed types: {}", .allowed.join(", "))]
    UnsupportedType { allowed: Vec<String> },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Checks a manuscript on disk against the upload limits and describes it for the transport.
pub async fn inspect(path: &Path, limits: &UploadLimits) -> Result<SelectedFile, ValidationError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ValidationError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_file() {
        return Err(ValidationError::NotAFile(path.to_path_buf()));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ValidationError::NotAFile(path.to_path_buf()))?;
    let file = SelectedFile::new(path, name, metadata.len());

    let allowed = file
        .extension()
        .map(|ext| limits.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
        .unwrap_or(false);
    if !allowed {
        return Err(ValidationError::UnsupportedType {
            allowed: limits.allowed_extensions.clone(),
        });
    }
    if file.size == 0 {
        return Err(ValidationError::Empty(path.to_path_buf()));
    }
    if file.size > limits.max_upload_bytes {
        return Err(ValidationError::TooLarge {
            size: file.size,
            limit: limits.max_upload_bytes,
        });
    }
    Ok(file)
}
