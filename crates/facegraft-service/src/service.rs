//! Facade tying sessions, the engine and the codec together.
//!
//! The transport layer hands in photos as they arrive per user; every
//! second photo completes a pair and triggers a swap under the configured
//! wall-clock budget.

use crate::codec;
use crate::config::ServiceConfig;
use crate::engine::{spawn_engine, EngineError, EngineHandle};
use crate::session::{SessionError, SessionProgress, SessionStore, UserId};
use facegraft_core::{build_locator, CompositeResult, LocatorKind, SwapConfig, SwapFailure, SwapPipeline, SwapState};
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("could not decode photo: {0}")]
    Decode(#[source] image::ImageError),
    #[error("could not encode result: {0}")]
    Encode(#[source] image::ImageError),
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
    #[error("session: {0}")]
    Session(#[from] SessionError),
    #[error("configuration: {0}")]
    Config(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of handing one photo to the service.
#[derive(Debug)]
pub enum Submission {
    /// First photo of a pair stored.
    AwaitingDonor,
    Swapped(CompositeResult),
    /// The pair was processed but no composite could be made.
    Failed(SwapFailure),
}

impl Submission {
    /// Controller state this submission left the user's pair in.
    pub fn state(&self) -> SwapState {
        match self {
            Submission::AwaitingDonor => SwapState::AwaitingPair,
            Submission::Swapped(_) => SwapState::Succeeded,
            Submission::Failed(failure) => failure.state(),
        }
    }
}

pub struct SwapService {
    sessions: SessionStore,
    engine: EngineHandle,
    budget: Duration,
}

impl SwapService {
    /// Load tuning, build the pipeline and start the engine workers.
    pub fn start(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let swap_config = load_swap_config(config)?;
        let pipeline = build_pipeline(config, &swap_config)?;
        let engine = spawn_engine(Arc::new(pipeline), config.engine_workers, config.queue_depth)?;
        Ok(Self::new(
            engine,
            SessionStore::new(config.session_ttl(), config.max_sessions),
            config.swap_budget(),
        ))
    }

    pub fn new(engine: EngineHandle, sessions: SessionStore, budget: Duration) -> Self {
        Self {
            sessions,
            engine,
            budget,
        }
    }

    /// Add a decoded photo to `user`'s session, swapping when it completes a pair.
    pub async fn submit_photo(&self, user: UserId, photo: RgbImage) -> Result<Submission, ServiceError> {
        let pair = match self.sessions.push(user, photo)? {
            SessionProgress::AwaitingDonor => {
                let submission = Submission::AwaitingDonor;
                tracing::debug!(user, state = ?submission.state(), "first photo stored");
                return Ok(submission);
            }
            SessionProgress::Complete(pair) => pair,
        };

        match self.engine.swap(pair, self.budget).await {
            Ok(result) => Ok(Submission::Swapped(result)),
            Err(EngineError::Swap(failure)) => {
                tracing::info!(user, state = ?failure.state(), "swap produced no composite");
                Ok(Submission::Failed(failure))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Decode compressed photo bytes, then [`SwapService::submit_photo`].
    ///
    /// Undecodable bytes are rejected without touching the session.
    pub async fn submit_photo_bytes(&self, user: UserId, bytes: &[u8]) -> Result<Submission, ServiceError> {
        let photo = codec::decode_photo(bytes).map_err(ServiceError::Decode)?;
        tracing::debug!(user, width = photo.width(), height = photo.height(), "photo decoded");
        self.submit_photo(user, photo).await
    }

    pub fn reset(&self, user: UserId) -> bool {
        self.sessions.reset(user)
    }

    pub fn purge_expired(&self) -> usize {
        self.sessions.purge_expired()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

/// PNG bytes of a finished composite.
pub fn encode_result(result: &CompositeResult) -> Result<Vec<u8>, ServiceError> {
    codec::encode_png(&result.image).map_err(ServiceError::Encode)
}

/// Read the optional TOML file and apply environment overrides.
pub fn load_swap_config(config: &ServiceConfig) -> Result<SwapConfig, ServiceError> {
    let mut swap = match &config.config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let parsed = SwapConfig::from_toml_str(&text).map_err(|e| ServiceError::Config(e.to_string()))?;
            tracing::info!(path = %path.display(), "engine configuration loaded");
            parsed
        }
        None => SwapConfig::default(),
    };
    config.overrides.apply(&mut swap);
    swap.validate().map_err(|e| ServiceError::Config(e.to_string()))?;
    Ok(swap)
}

/// Build the pipeline for the configured detector and alignment.
///
/// A missing or unreadable SCRFD model degrades to the cascade detector.
pub fn build_pipeline(config: &ServiceConfig, swap: &SwapConfig) -> Result<SwapPipeline, ServiceError> {
    let model = match config.detector {
        LocatorKind::Scrfd => {
            let path = config.scrfd_model_path();
            match std::fs::read(&path) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "SCRFD model unreadable");
                    None
                }
            }
        }
        LocatorKind::Cascade => None,
    };

    let locator =
        build_locator(config.detector, model.as_deref(), swap.locator.clone()).map_err(|e| ServiceError::Config(e.to_string()))?;
    let pipeline = SwapPipeline::new(locator, swap)
        .map_err(|e| ServiceError::Config(e.to_string()))?
        .with_normalizer(config.alignment.build());

    tracing::info!(
        detector = pipeline.locator().name(),
        alignment = ?config.alignment,
        "pipeline ready"
    );
    Ok(pipeline)
}
