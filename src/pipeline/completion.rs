//! Request pipeline: decode, normalize, infer, render, export.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::image::{self, Artifact, ArtifactKind, Size};
use crate::model::{
    Checkpoint, CheckpointLoader, Device, DevicePreference, LoaderOptions, ModelHandle,
    DEFAULT_CHECKPOINT,
};

use super::inference::infer;

/// Configuration for the image completion pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the ONNX checkpoint.
    pub checkpoint_path: PathBuf,

    /// Fixed spatial size the model was trained on.
    pub model_input_size: Size,

    /// Size of the display copy and the preview artifact.
    pub preview_size: Size,

    /// Prefix for artifact filenames.
    pub filename_prefix: String,

    /// Device the model may run on.
    pub device: DevicePreference,

    /// Number of concurrent forward passes the model supports.
    pub sessions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT),
            model_input_size: Size::new(128, 128),
            preview_size: Size::new(300, 300),
            filename_prefix: "pixelrnn".to_string(),
            device: DevicePreference::Auto,
            sessions: 1,
        }
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("model_input_size", self.model_input_size),
            ("preview_size", self.preview_size),
        ] {
            if size.is_empty() {
                return Err(Error::InvalidParameter {
                    name: name.to_string(),
                    reason: format!("must be non-zero, got {size}"),
                });
            }
        }

        if self.sessions == 0 {
            return Err(Error::InvalidParameter {
                name: "sessions".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        let prefix_ok = !self.filename_prefix.is_empty()
            && self
                .filename_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !prefix_ok {
            return Err(Error::InvalidParameter {
                name: "filename_prefix".to_string(),
                reason: "must be non-empty and use only [A-Za-z0-9_-]".to_string(),
            });
        }

        Ok(())
    }

    /// Loader options derived from this configuration.
    #[must_use]
    pub const fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            device: self.device,
            sessions: self.sessions,
        }
    }
}

/// Whether the pipeline can serve requests, and why not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    Ready { device: Device, epoch: Option<u64> },
    Missing { path: PathBuf },
    Failed { reason: String },
}

/// Artifacts and statistics of one successful request.
#[derive(Debug, Clone)]
pub struct Completion {
    pub preview: Artifact,
    pub full_resolution: Artifact,
    pub comparison: Artifact,
    /// Upload dimensions before any resize.
    pub original_size: Size,
    pub model_input_size: Size,
    /// Wall time of the forward pass.
    pub inference_time: Duration,
}

impl Completion {
    /// All artifacts in download order: full resolution, preview, comparison.
    #[must_use]
    pub const fn artifacts(&self) -> [&Artifact; 3] {
        [&self.full_resolution, &self.preview, &self.comparison]
    }
}

/// Image completion pipeline around one loaded model.
///
/// `process` takes `&self`; share the pipeline across threads with `Arc`.
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    model: Option<ModelHandle>,
    status: ModelStatus,
}

impl Pipeline {
    /// Create a pipeline, loading the checkpoint named by the configuration.
    ///
    /// The model comes from the process-wide [`CheckpointLoader::shared`]
    /// loader, so pipelines built with the same device and session options
    /// share one loaded model. A missing or unloadable checkpoint does not
    /// fail construction; it leaves the pipeline unavailable (see
    /// [`Pipeline::status`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let loader = CheckpointLoader::shared(config.loader_options());
        Self::with_loader(config, &loader)
    }

    /// Create a pipeline using a shared loader, so repeated construction reuses the model.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_loader(config: Config, loader: &CheckpointLoader) -> Result<Self> {
        config.validate()?;

        tracing::info!("Initializing pipeline with config: {config:?}");

        let (model, status) = match loader.load(&config.checkpoint_path) {
            Ok(Checkpoint::Ready(handle)) => {
                let status = ModelStatus::Ready {
                    device: handle.device(),
                    epoch: handle.metadata().epoch,
                };
                (Some(handle), status)
            }
            Ok(Checkpoint::Missing { path }) => {
                tracing::warn!("Model not available; train and export it to {}", path.display());
                (None, ModelStatus::Missing { path })
            }
            Err(err) => {
                tracing::error!("{err}");
                (
                    None,
                    ModelStatus::Failed {
                        reason: err.to_string(),
                    },
                )
            }
        };

        Ok(Self {
            config,
            model,
            status,
        })
    }

    /// Create a pipeline around an already-loaded model.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_model(config: Config, model: ModelHandle) -> Result<Self> {
        config.validate()?;

        let status = ModelStatus::Ready {
            device: model.device(),
            epoch: model.metadata().epoch,
        };

        Ok(Self {
            config,
            model: Some(model),
            status,
        })
    }

    /// Whether a model is loaded and requests can be served.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    #[must_use]
    pub const fn status(&self) -> &ModelStatus {
        &self.status
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Reconstruct an uploaded image and export all artifacts.
    ///
    /// # Errors
    ///
    /// Returns an error if no model is loaded, the bytes are not a supported
    /// image, or inference, rendering, or encoding fails. Errors only affect
    /// this request.
    pub fn process(&self, bytes: &[u8]) -> Result<Completion> {
        // Gate 1: model ready
        let model = self.model.as_ref().ok_or_else(|| Error::ModelUnavailable {
            reason: match &self.status {
                ModelStatus::Missing { path } => {
                    format!("no checkpoint at {}, train the model first", path.display())
                }
                ModelStatus::Failed { reason } => reason.clone(),
                ModelStatus::Ready { .. } => "model not loaded".to_string(),
            },
        })?;

        // Gate 2: input valid
        let (input, tensor) =
            image::normalize(bytes, self.config.model_input_size, self.config.preview_size)?;
        let original_size = input.original_size();

        tracing::info!("Processing {original_size} image");

        let start = Instant::now();
        let output = infer(model, &tensor)?;
        let inference_time = start.elapsed();

        let rendered = image::render(
            &output,
            original_size,
            self.config.preview_size,
            input.display(),
        )?;

        let prefix = &self.config.filename_prefix;
        let completion = Completion {
            preview: image::export(ArtifactKind::Preview, &rendered.preview, prefix)?,
            full_resolution: image::export(
                ArtifactKind::FullResolution,
                &rendered.full_resolution,
                prefix,
            )?,
            comparison: image::export(ArtifactKind::Comparison, &rendered.comparison, prefix)?,
            original_size,
            model_input_size: self.config.model_input_size,
            inference_time,
        };

        tracing::info!(
            elapsed_secs = inference_time.as_secs_f64(),
            "Processing complete"
        );

        Ok(completion)
    }
}
