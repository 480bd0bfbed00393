//! Loopcast
//!
//! Turns an audio track plus a looping image/animation into an H.264/AAC
//! video via an external ffmpeg invocation, then optionally publishes the
//! file to a remote video-hosting service over a resumable chunked upload.
//! Invoked as a library by a UI layer that supplies job parameters and polls
//! the progress channels; no interface of its own.

pub mod auth;
pub mod composer;
pub mod config;
pub mod error;
pub mod probe;
pub mod progress;
pub mod scheduler;
pub mod upload;

// Re-export main types for easy access
pub use crate::auth::{ConsentFlow, Credential, CredentialConfig, CredentialManager, CredentialStore};
pub use crate::composer::{compute_layout, ConversionJob, Layout, MediaComposer};
pub use crate::config::{ApiKeys, Settings};
pub use crate::error::{AuthError, ComposeError, ConfigError, UploadError};
pub use crate::probe::MediaProbe;
pub use crate::progress::{progress_channel, ProgressEvent, ProgressReceiver, ProgressSender};
pub use crate::scheduler::{ConversionHandle, JobScheduler, UploadHandle};
pub use crate::upload::{parse_tags, Privacy, ResumableUploader, UploadJob, VideoId};
