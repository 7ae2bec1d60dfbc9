//! Ordered frame commands.
//!
//! A frame is recorded into one [`CommandList`] and submitted once. Releases of
//! stage-local targets are commands too, so a release always follows the last
//! use of the target in submission order.

use specula_gpu_shared::shaders::{ComputeKernel, ShaderPass};
use specula_gpu_shared::uniforms::{DualBlurParams, HiZParams, SsrFrameUniforms};

use crate::backend::TextureId;
use crate::settings::LayerMask;
use crate::texture_size::TextureSize;

/// Named textures visible to fullscreen and geometry passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameBindings {
    pub source: Option<TextureId>,
    pub camera_depth: Option<TextureId>,
    pub gbuffer: [Option<TextureId>; 3],
    pub hiz: Option<TextureId>,
    pub hit_data: Option<TextureId>,
    pub hit_mask: Option<TextureId>,
    pub resolved: Option<TextureId>,
    pub taa_current: Option<TextureId>,
    pub taa_history: Option<TextureId>,
    pub blue_noise: Option<TextureId>,
}

impl FrameBindings {
    /// `(binding slot, texture)` for every named texture slot of group 0. The
    /// blit source slot is filled per command.
    pub fn slots(&self) -> [(u32, Option<TextureId>); 12] {
        use specula_gpu_shared::shaders::bindings as b;
        [
            (b::CAMERA_DEPTH, self.camera_depth),
            (b::GBUFFER[0], self.gbuffer[0]),
            (b::GBUFFER[1], self.gbuffer[1]),
            (b::GBUFFER[2], self.gbuffer[2]),
            (b::HIZ_DEPTH, self.hiz),
            (b::HIT_DATA, self.hit_data),
            (b::HIT_MASK, self.hit_mask),
            (b::RESOLVED, self.resolved),
            (b::TAA_CURRENT, self.taa_current),
            (b::TAA_HISTORY, self.taa_history),
            (b::BLUE_NOISE, self.blue_noise),
            (b::SOURCE_COLOR, self.source),
        ]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortingCriteria {
    #[default]
    RenderQueue,
    Unsorted,
}

/// Which renderers the geometry pass draws and in what order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RendererFilter {
    pub layer_mask: LayerMask,
    pub sorting: SortingCriteria,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KernelParams {
    HiZ(HiZParams),
    DualBlur(DualBlurParams),
}

impl KernelParams {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            KernelParams::HiZ(p) => bytemuck::bytes_of(p),
            KernelParams::DualBlur(p) => bytemuck::bytes_of(p),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Opens a named profiler scope.
    BeginSample(String),
    EndSample(String),
    SetFrameUniforms(Box<SsrFrameUniforms>),
    /// Fullscreen write into mip 0 of `target`. Without a pass this is a plain
    /// copy of `source`; with a pass, `source` (if any) is bound as the blit
    /// source next to the frame bindings.
    Blit {
        source: Option<TextureId>,
        target: TextureId,
        pass: Option<ShaderPass>,
        bindings: FrameBindings,
    },
    CopyTexture {
        source: TextureId,
        source_mip: u32,
        target: TextureId,
        target_mip: u32,
        size: TextureSize,
    },
    Dispatch {
        kernel: ComputeKernel,
        source: TextureId,
        source_mip: u32,
        target: TextureId,
        params: KernelParams,
        groups: [u32; 3],
    },
    /// Geometry draw with an override pass into two colour targets. The depth
    /// attachment is the depth companion of `color_targets[0]`.
    DrawRenderers {
        pass: ShaderPass,
        color_targets: [TextureId; 2],
        filter: RendererFilter,
        bindings: FrameBindings,
    },
    Release(TextureId),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandList {
    label: String,
    commands: Vec<Command>,
}

impl CommandList {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn begin_sample(&mut self, name: &str) {
        self.push(Command::BeginSample(name.to_string()));
    }

    pub fn end_sample(&mut self, name: &str) {
        self.push(Command::EndSample(name.to_string()));
    }

    pub fn release(&mut self, id: TextureId) {
        self.push(Command::Release(id));
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Dispatched kernels in order.
    pub fn dispatches(&self) -> Vec<ComputeKernel> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Dispatch { kernel, .. } => Some(*kernel),
                _ => None,
            })
            .collect()
    }

    /// Passes used by blits and geometry draws in order.
    pub fn passes(&self) -> Vec<ShaderPass> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Blit { pass, .. } => *pass,
                Command::DrawRenderers { pass, .. } => Some(*pass),
                _ => None,
            })
            .collect()
    }
}

impl IntoIterator for CommandList {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

impl<'a> IntoIterator for &'a CommandList {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

/// Work-group counts covering `size` with ceiling division.
pub fn dispatch_groups(size: TextureSize, group_size: [u32; 3]) -> [u32; 3] {
    [
        size.width.div_ceil(group_size[0].max(1)),
        size.height.div_ceil(group_size[1].max(1)),
        1,
    ]
}
