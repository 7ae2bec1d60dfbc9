//! Specula wgpu backend.
//!
//! Executes the command lists recorded by `specula-render` on a wgpu device:
//! pooled render targets, lazily built pipelines, naga-validated WGSL kernels
//! and a host-supplied geometry source for the ray march.

pub mod backend;
pub mod geometry;
pub mod passes;
pub mod pipeline;
pub mod render_targets;
pub mod renderer;
pub mod shader_library;

pub use backend::WgpuSsrBackend;
pub use geometry::GeometrySource;
pub use renderer::{GpuContext, SsrRenderer};
pub use shader_library::ShaderLibrary;
