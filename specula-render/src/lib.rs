//! Platform-independent screen-space reflection pipeline.
//!
//! Builds a Hi-Z depth chain, ray-marches reflections through it, resolves and
//! temporally accumulates the hits, blurs them with a dual-filter pyramid and
//! composites the result onto the camera colour. Every frame is recorded into
//! one ordered [`commands::CommandList`] and handed to an [`backend::SsrBackend`].

pub mod backend;
pub mod blur;
pub mod commands;
pub mod error;
pub mod feature;
pub mod frame;
pub mod hiz;
pub mod jitter;
pub mod pipeline;
pub mod recording;
pub mod report;
pub mod resources;
pub mod settings;
mod stages;
pub mod targets;
pub mod temporal;
pub mod texture_size;

pub use backend::{SsrBackend, TextureId};
pub use commands::{Command, CommandList, FrameBindings};
pub use error::SsrError;
pub use feature::{CameraId, SsrFeature};
pub use frame::{BlueNoise, CameraFrame};
pub use pipeline::{CameraPass, Phase, SsrPipeline};
pub use recording::RecordingBackend;
pub use report::{FrameReport, SkipReason, Stage, StageStatus};
pub use settings::{DebugMode, LayerMask, RenderEvent, SsrSettings};
pub use targets::{TargetDesc, TargetFormat, TargetKey};
pub use texture_size::TextureSize;
