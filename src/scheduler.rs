use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::{CredentialConfig, CredentialManager};
use crate::composer::{ConversionJob, MediaComposer};
use crate::error::{ComposeError, UploadError};
use crate::progress::{progress_channel, ProgressReceiver};
use crate::upload::{ResumableUploader, UploadJob, VideoId};

/// A launched composition job: its progress stream, a cancellation token,
/// and the handle carrying the terminal result.
///
/// Cancellation is plumbed through but only honored before the worker
/// starts; a running job goes to completion or failure.
pub struct ConversionHandle {
    pub progress: ProgressReceiver,
    pub cancel: CancellationToken,
    pub task: JoinHandle<Result<(), ComposeError>>,
}

/// A launched upload job. Same shape as [`ConversionHandle`].
pub struct UploadHandle {
    pub progress: ProgressReceiver,
    pub cancel: CancellationToken,
    pub task: JoinHandle<Result<VideoId, UploadError>>,
}

/// Launches composition and upload workers as independent background tasks.
/// Never blocks the caller; all coupling back to the interactive side goes
/// through the progress channel.
pub struct JobScheduler;

impl JobScheduler {
    /// Spawn a composition worker for `job`.
    pub fn spawn_conversion(job: ConversionJob) -> ConversionHandle {
        Self::spawn_conversion_with_cancel(job, CancellationToken::new())
    }

    pub fn spawn_conversion_with_cancel(
        job: ConversionJob,
        cancel: CancellationToken,
    ) -> ConversionHandle {
        let (tx, rx) = progress_channel();
        let worker_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            if worker_cancel.is_cancelled() {
                tx.fail();
                return Err(ComposeError::Cancelled);
            }

            info!("🚀 Composition started: {}", job.output_path.display());
            MediaComposer::new().compose(&job, &tx).await
        });

        ConversionHandle {
            progress: rx,
            cancel,
            task,
        }
    }

    /// Spawn an upload worker: acquire a valid credential, then run the
    /// chunked transfer. A credential failure is fatal to the job.
    pub fn spawn_upload(
        job: UploadJob,
        config: CredentialConfig,
        manager: CredentialManager,
        uploader: ResumableUploader,
    ) -> UploadHandle {
        Self::spawn_upload_with_cancel(job, config, manager, uploader, CancellationToken::new())
    }

    pub fn spawn_upload_with_cancel(
        job: UploadJob,
        config: CredentialConfig,
        manager: CredentialManager,
        uploader: ResumableUploader,
        cancel: CancellationToken,
    ) -> UploadHandle {
        let (tx, rx) = progress_channel();
        let worker_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            if worker_cancel.is_cancelled() {
                tx.fail();
                return Err(UploadError::Cancelled);
            }

            info!("🚀 Upload started: {}", job.source_path.display());
            let credential = match manager.get_valid_credential(&config).await {
                Ok(credential) => credential,
                Err(e) => {
                    tx.fail();
                    return Err(UploadError::Auth(e));
                }
            };

            uploader.upload(&job, &credential, &tx).await
        });

        UploadHandle {
            progress: rx,
            cancel,
            task,
        }
    }
}
