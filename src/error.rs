use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the composition pipeline.
///
/// `Input` covers missing or unreadable source files; every other variant is
/// a composition failure. A job aborts on the first error and any partially
/// written output file must be treated as invalid.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("input file missing or unreadable: {}", .path.display())]
    Input { path: PathBuf },

    #[error("failed to probe {}: {}", .path.display(), .reason)]
    Probe { path: PathBuf, reason: String },

    #[error("scaled visual {scaled_w}x{scaled_h} does not fit the {canvas_w}x{canvas_h} canvas")]
    SourceExceedsCanvas {
        scaled_w: u32,
        scaled_h: u32,
        canvas_w: u32,
        canvas_h: u32,
    },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("job cancelled before it started")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from credential acquisition. Always fatal to the calling upload;
/// no retry loop wraps credential handling beyond the single refresh attempt.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential store failure: {0}")]
    Store(String),

    #[error("token refresh rejected: {0}")]
    Refresh(String),

    #[error("interactive authorization failed: {0}")]
    Consent(String),

    #[error("service rejected the credential: {0}")]
    Rejected(String),

    #[error("token endpoint unreachable: {0}")]
    Network(#[from] reqwest::Error),
}

/// Errors from the chunked upload protocol.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("source file missing or unreadable: {}", .path.display())]
    Input { path: PathBuf },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("upload session could not be opened: {0}")]
    Session(String),

    #[error("chunk transfer failed: {0}")]
    Transfer(String),

    #[error("unexpected service response: {0}")]
    Protocol(String),

    #[error("job cancelled before it started")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from persisted settings and the key/value config file.
///
/// Load-side failures are non-fatal by policy: callers fall back to defaults
/// and log instead of aborting startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("width and height must be greater than zero")]
    InvalidResolution,

    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
