//! Poster composition engine: turns structured event and speaker data into
//! branded, print-ready poster images.
//!
//! The pipeline extracts entities from free-form text, resolves required
//! assets against a media repository (batched, TTL-cached, single-flight),
//! validates prerequisites, solves a deterministic layout with font-size
//! search, composites on the CPU, and uploads the results, all under one
//! wall-clock deadline.

#![forbid(unsafe_code)]

pub mod assets;
pub mod config;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod layout;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod services;
pub mod text;
pub mod validate;

pub use config::EngineConfig;
pub use error::{PosterError, PosterResult};
pub use model::{
    EventDetails, Poster, PosterKind, PosterRequest, ResolutionStatus, ResolvedAsset, RunReport,
    RunStatus, Speaker, ValidationReport,
};
pub use pipeline::PosterPipeline;
