//! facegraft-service: orchestration around the compositing engine.
//!
//! Owns per-user photo sessions, runs the CPU-bound pipeline on dedicated
//! worker threads behind an async handle with a wall-clock budget, and
//! converts between compressed photo bytes and pixel grids.

pub mod codec;
pub mod config;
pub mod engine;
pub mod service;
pub mod session;

pub use config::{ServiceConfig, TuningOverrides};
pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use service::{build_pipeline, encode_result, load_swap_config, ServiceError, Submission, SwapService};
pub use session::{PhotoPair, SessionError, SessionProgress, SessionStore, UserId};
