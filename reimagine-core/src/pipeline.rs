//! The session pipeline: one photo in, one reimagined photo out.
//!
//! Steps run strictly in order and each is followed by a notification to the
//! originating connection:
//!
//! 1. decode the embedded image, create the staging directory, stage it
//! 2. describe it with the vision service
//! 3. generate a new image from the description
//! 4. download and transcode the generated image
//! 5. deliver the transcoded image
//!
//! Only the network calls and the transcode are hard dependencies. Staging
//! writes are best-effort: a failed write is logged and reported to the
//! client, and the session carries on with the data it holds in memory.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::embed::{EmbeddedImage, encode_data_url};
use crate::error::{PipelineError, SessionError};
use crate::message::{DescriptionKind, Outbound};
use crate::services::{DescribeImage, FetchImage, GenerateImage, RasterFormat, transcode};
use crate::staging::{Artifact, SessionDir, SessionId, Staging};

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Apply the literal-use wrapping to generation prompts.
    pub literal_prompt: bool,
    /// Format delivered to the client.
    pub output_format: RasterFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            literal_prompt: true,
            output_format: RasterFormat::Jpeg,
        }
    }
}

/// What a finished session leaves behind.
#[derive(Debug)]
pub struct SessionOutcome {
    pub session: SessionId,
    /// Staging directory, `None` when it could not be created.
    pub dir: Option<PathBuf>,
    /// Background write of the transcoded artifact. Fire-and-forget: its
    /// failures are only logged. Dropping the handle detaches the task.
    pub persistence: Option<JoinHandle<()>>,
}

/// Shared, read-only orchestrator. One instance serves every connection.
pub struct Pipeline {
    staging: Arc<Staging>,
    vision: Arc<dyn DescribeImage>,
    generator: Arc<dyn GenerateImage>,
    fetcher: Arc<dyn FetchImage>,
    config: PipelineConfig,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("staging", &self.staging.root())
            .field("config", &self.config)
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        staging: Arc<Staging>,
        vision: Arc<dyn DescribeImage>,
        generator: Arc<dyn GenerateImage>,
        fetcher: Arc<dyn FetchImage>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            staging,
            vision,
            generator,
            fetcher,
            config,
        }
    }

    pub fn staging(&self) -> &Arc<Staging> {
        &self.staging
    }

    /// Run one session for `data_url`, sending progress to `tx`.
    ///
    /// An aborting error has already been reported to the client when this
    /// returns `Err`; the value is handed back for the caller's logs.
    pub async fn run(
        &self,
        data_url: &str,
        tx: mpsc::Sender<Outbound>,
    ) -> Result<SessionOutcome, SessionError> {
        let allocated = self.staging.allocate();
        let span = info_span!("session", session = %allocated);
        self.run_session(allocated, data_url, tx).instrument(span).await
    }

    async fn run_session(
        &self,
        allocated: SessionId,
        data_url: &str,
        tx: mpsc::Sender<Outbound>,
    ) -> Result<SessionOutcome, SessionError> {
        info!("session started");

        let image = match EmbeddedImage::parse(data_url) {
            Ok(image) => image,
            Err(e) => return Err(Notifier::new(allocated, tx).abort(e.into()).await),
        };

        let dir = match self.staging.create(allocated).await {
            Ok(dir) => Some(dir),
            Err(e) => {
                error!(error = %e, "failed to create staging directory");
                None
            }
        };
        let session = dir.as_ref().map_or(allocated, SessionDir::id);
        let notify = Notifier::new(session, tx);
        if dir.is_none() {
            notify.error("Error saving image: staging directory unavailable").await;
        }

        match self.convert(&image, dir.as_ref(), &notify).await {
            Ok(persistence) => {
                info!("session finished");
                Ok(SessionOutcome {
                    session,
                    dir: dir.map(|d| d.path().to_path_buf()),
                    persistence,
                })
            }
            Err(e) => Err(notify.abort(e).await),
        }
    }

    async fn convert(
        &self,
        image: &EmbeddedImage,
        dir: Option<&SessionDir>,
        notify: &Notifier,
    ) -> Result<Option<JoinHandle<()>>, PipelineError> {
        // 1. incoming
        let saved = stage(dir, Artifact::Incoming(image.extension()), &image.bytes, "image", notify).await;
        notify
            .status(if saved { "Image received and saved" } else { "Image received" })
            .await;

        // 2. description
        debug!(image_bytes = image.bytes.len(), "starting image description");
        let description = self
            .vision
            .describe(image)
            .await
            .map_err(PipelineError::Description)?;
        stage(dir, Artifact::RawDescription, description.text.as_bytes(), "description", notify).await;
        notify.description(DescriptionKind::Raw, &description.text).await;

        // 3. generation
        debug!(literal = self.config.literal_prompt, "starting image generation");
        let generated = self
            .generator
            .generate(&description.text, self.config.literal_prompt)
            .await
            .map_err(PipelineError::Generation)?
            .into_iter()
            .next()
            .ok_or(PipelineError::NoGenerationResults)?;
        let revised = generated
            .revised_prompt
            .as_deref()
            .unwrap_or(&description.text);
        stage(dir, Artifact::ProcessedDescription, revised.as_bytes(), "revised prompt", notify).await;
        notify.description(DescriptionKind::Revised, revised).await;

        // 4. fetch + transcode
        let fetched = self
            .fetcher
            .fetch(&generated.url)
            .await
            .map_err(PipelineError::Fetch)?;
        let native = image::guess_format(&fetched)
            .ok()
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("png");
        stage(dir, Artifact::Generated(native), &fetched, "generated image", notify).await;

        let format = self.config.output_format;
        let transcoded = Bytes::from(transcode(fetched, format).await?);
        let persistence = dir.cloned().map(|dir| {
            let contents = transcoded.clone();
            tokio::spawn(
                async move {
                    if let Err(e) = dir.write(Artifact::Transcoded(format.extension()), &contents).await {
                        warn!(error = %e, "failed to stage transcoded image");
                    }
                }
                .in_current_span(),
            )
        });
        notify.status("Image generated").await;

        // 5. delivery
        notify.image(encode_data_url(format.mime(), &transcoded)).await;
        Ok(persistence)
    }
}

/// Best-effort artifact write. Returns whether the artifact was staged.
async fn stage(
    dir: Option<&SessionDir>,
    artifact: Artifact,
    contents: &[u8],
    what: &str,
    notify: &Notifier,
) -> bool {
    let Some(dir) = dir else {
        return false;
    };
    match dir.write(artifact, contents).await {
        Ok(_) => true,
        Err(e) => {
            error!(error = %e, artifact = ?artifact, "failed to stage artifact");
            notify.error(format!("Error saving {what}")).await;
            false
        }
    }
}

/// Sends messages for one session to its connection. A closed connection is
/// not an error: the session keeps running and its messages are dropped.
struct Notifier {
    session: SessionId,
    tx: mpsc::Sender<Outbound>,
}

impl Notifier {
    fn new(session: SessionId, tx: mpsc::Sender<Outbound>) -> Self {
        Self { session, tx }
    }

    async fn send(&self, message: Outbound) {
        if self.tx.send(message).await.is_err() {
            debug!("connection closed; notification dropped");
        }
    }

    async fn status(&self, body: impl Into<String>) {
        self.send(Outbound::Status {
            session: self.session,
            body: body.into(),
        })
        .await;
    }

    async fn description(&self, kind: DescriptionKind, body: &str) {
        self.send(Outbound::Description {
            session: self.session,
            kind,
            body: body.to_owned(),
        })
        .await;
    }

    async fn image(&self, data: String) {
        self.send(Outbound::Image {
            session: self.session,
            data,
        })
        .await;
    }

    async fn error(&self, body: impl Into<String>) {
        self.send(Outbound::Error {
            session: Some(self.session),
            body: body.into(),
        })
        .await;
    }

    /// Report an aborting failure and turn it into a [`SessionError`].
    async fn abort(self, source: PipelineError) -> SessionError {
        error!(error = %source, "session aborted");
        self.error(source.to_string()).await;
        SessionError {
            session: self.session,
            source,
        }
    }
}
