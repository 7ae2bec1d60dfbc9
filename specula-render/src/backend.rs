//! Seam between the backend-agnostic pipeline and a GPU implementation.

use specula_gpu_shared::shaders::{ComputeKernel, ShaderPass};

use crate::commands::CommandList;
use crate::error::SsrError;
use crate::targets::{TargetDesc, TargetKey};

/// Opaque backend texture handle. Host textures (camera colour, depth,
/// G-buffer, blue noise) are imported into the backend and get one as well.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

impl std::fmt::Display for TextureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

pub trait SsrBackend {
    /// Whether the device can create and use a target with this description
    /// (render attachment, storage write or storage read-write as requested).
    fn supports_target(&self, desc: &TargetDesc) -> bool;

    /// Allocates immediately. The handle is valid until a `Release` command
    /// for it is submitted or [`SsrBackend::release_target`] is called.
    fn allocate_target(&mut self, key: TargetKey, desc: &TargetDesc) -> Result<TextureId, SsrError>;

    /// Release outside of a command list, e.g. a stale target at setup.
    fn release_target(&mut self, id: TextureId);

    fn has_shader_pass(&self, pass: ShaderPass) -> bool;

    /// Declared work-group size of a kernel, `None` if the kernel is missing.
    fn kernel_group_size(&self, kernel: ComputeKernel) -> Option<[u32; 3]>;

    /// Executes the recorded commands in order. `Release` commands of the list
    /// are honoured even when submission fails.
    fn submit(&mut self, commands: CommandList) -> Result<(), SsrError>;
}
