//! WGSL sources of the SSR passes and compute kernels.
//!
//! Every module is parsed and validated with naga when it is added, and its
//! entry points are reflected so the backend can answer which passes exist and
//! what work-group size each kernel declares without touching the device.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use specula_gpu_shared::shaders::{ComputeKernel, ComputeModule, ShaderPass};

pub const SSR_FILE: &str = "ssr.wgsl";
pub const HIZ_FILE: &str = "hiz.wgsl";
pub const DUAL_BLUR_FILE: &str = "dual_blur.wgsl";

const BUILTIN_SSR: &str = include_str!("../shaders/ssr.wgsl");
const BUILTIN_HIZ: &str = include_str!("../shaders/hiz.wgsl");
const BUILTIN_DUAL_BLUR: &str = include_str!("../shaders/dual_blur.wgsl");

/// A validated WGSL module and its entry points.
#[derive(Clone, Debug)]
pub struct ReflectedModule {
    pub label: String,
    pub source: String,
    vertex_entries: HashSet<String>,
    fragment_entries: HashSet<String>,
    compute_entries: HashMap<String, [u32; 3]>,
}

impl ReflectedModule {
    pub fn parse(label: &str, source: &str) -> Result<Self, String> {
        let module = naga::front::wgsl::parse_str(source)
            .map_err(|e| format!("{label}: WGSL parse failed: {}", e.emit_to_string(source)))?;
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| format!("{label}: validation failed: {}", e.emit_to_string(source)))?;

        let mut vertex_entries = HashSet::new();
        let mut fragment_entries = HashSet::new();
        let mut compute_entries = HashMap::new();
        for ep in &module.entry_points {
            match ep.stage {
                naga::ShaderStage::Vertex => {
                    vertex_entries.insert(ep.name.clone());
                }
                naga::ShaderStage::Fragment => {
                    fragment_entries.insert(ep.name.clone());
                }
                naga::ShaderStage::Compute => {
                    compute_entries.insert(ep.name.clone(), ep.workgroup_size);
                }
            }
        }

        Ok(Self {
            label: label.to_string(),
            source: source.to_string(),
            vertex_entries,
            fragment_entries,
            compute_entries,
        })
    }

    pub fn has_vertex(&self, entry: &str) -> bool {
        self.vertex_entries.contains(entry)
    }

    pub fn has_fragment(&self, entry: &str) -> bool {
        self.fragment_entries.contains(entry)
    }

    pub fn workgroup_size(&self, entry: &str) -> Option<[u32; 3]> {
        self.compute_entries.get(entry).copied()
    }
}

/// The SSR pass module plus the two compute modules. Any of them may be absent;
/// the pipeline then skips the stages that need it.
#[derive(Clone, Debug, Default)]
pub struct ShaderLibrary {
    ssr: Option<ReflectedModule>,
    hiz: Option<ReflectedModule>,
    dual_blur: Option<ReflectedModule>,
}

impl ShaderLibrary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reference kernels shipped with this crate.
    pub fn builtin() -> Result<Self, String> {
        Self::empty()
            .with_ssr(BUILTIN_SSR)?
            .with_hiz(BUILTIN_HIZ)?
            .with_dual_blur(BUILTIN_DUAL_BLUR)
    }

    pub fn with_ssr(mut self, source: &str) -> Result<Self, String> {
        self.ssr = Some(ReflectedModule::parse(SSR_FILE, source)?);
        Ok(self)
    }

    pub fn with_hiz(mut self, source: &str) -> Result<Self, String> {
        self.hiz = Some(ReflectedModule::parse(HIZ_FILE, source)?);
        Ok(self)
    }

    pub fn with_dual_blur(mut self, source: &str) -> Result<Self, String> {
        self.dual_blur = Some(ReflectedModule::parse(DUAL_BLUR_FILE, source)?);
        Ok(self)
    }

    /// Loads `ssr.wgsl`, `hiz.wgsl` and `dual_blur.wgsl` from `dir`. Missing
    /// files leave their module empty; files that fail validation are errors.
    pub fn from_dir(dir: &Path) -> Result<Self, String> {
        let read = |name: &str| -> Result<Option<String>, String> {
            let path = dir.join(name);
            if !path.exists() {
                log::warn!(
                    "SSR shader {} not found, dependent stages will be skipped",
                    path.display()
                );
                return Ok(None);
            }
            std::fs::read_to_string(&path)
                .map(Some)
                .map_err(|e| format!("failed to read {}: {e}", path.display()))
        };

        let mut library = Self::empty();
        if let Some(source) = read(SSR_FILE)? {
            library = library.with_ssr(&source)?;
        }
        if let Some(source) = read(HIZ_FILE)? {
            library = library.with_hiz(&source)?;
        }
        if let Some(source) = read(DUAL_BLUR_FILE)? {
            library = library.with_dual_blur(&source)?;
        }
        log::info!(
            "SSR shader library loaded from {}: {} passes, {} kernels",
            dir.display(),
            ShaderPass::ALL.iter().filter(|p| library.has_pass(**p)).count(),
            ComputeKernel::ALL
                .iter()
                .filter(|k| library.kernel_group_size(**k).is_some())
                .count()
        );
        Ok(library)
    }

    pub fn ssr(&self) -> Option<&ReflectedModule> {
        self.ssr.as_ref()
    }

    pub fn compute(&self, module: ComputeModule) -> Option<&ReflectedModule> {
        match module {
            ComputeModule::HiZ => self.hiz.as_ref(),
            ComputeModule::DualBlur => self.dual_blur.as_ref(),
        }
    }

    /// Whether the SSR module declares the entry points of `pass`.
    pub fn has_pass(&self, pass: ShaderPass) -> bool {
        let Some(module) = &self.ssr else {
            return false;
        };
        module.has_fragment(pass.fragment_entry())
            && pass.vertex_entry().map_or(true, |entry| module.has_vertex(entry))
    }

    pub fn kernel_group_size(&self, kernel: ComputeKernel) -> Option<[u32; 3]> {
        self.compute(kernel.module())?
            .workgroup_size(kernel.entry_point())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIZ_8X4: &str = r#"
@group(0) @binding(1) var source_tex: texture_2d<f32>;
@group(0) @binding(2) var target_tex: texture_storage_2d<r32float, write>;

@compute @workgroup_size(8, 4, 1)
fn GetHiZ(@builtin(global_invocation_id) id: vec3<u32>) {
    let d = textureLoad(source_tex, vec2<i32>(id.xy) * 2, 0).r;
    textureStore(target_tex, vec2<i32>(id.xy), vec4<f32>(d, 0.0, 0.0, 0.0));
}
"#;

    const RESOLVE_ONLY: &str = r#"
@fragment
fn fs_resolve(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(uv, 0.0, 1.0);
}
"#;

    #[test]
    fn test_reflects_workgroup_size() {
        let library = ShaderLibrary::empty().with_hiz(HIZ_8X4).unwrap();
        assert_eq!(library.kernel_group_size(ComputeKernel::GetHiZ), Some([8, 4, 1]));
        assert_eq!(library.kernel_group_size(ComputeKernel::DualBlurDownSample), None);
    }

    #[test]
    fn test_pass_presence_follows_entries() {
        let library = ShaderLibrary::empty().with_ssr(RESOLVE_ONLY).unwrap();
        assert!(library.has_pass(ShaderPass::Resolve));
        assert!(!library.has_pass(ShaderPass::Composite));
        assert!(!library.has_pass(ShaderPass::RayMarch));
    }

    #[test]
    fn test_invalid_wgsl_is_rejected() {
        let err = ShaderLibrary::empty()
            .with_hiz("@compute @workgroup_size(8) fn GetHiZ( {")
            .unwrap_err();
        assert!(err.starts_with(HIZ_FILE), "{err}");
    }

    #[test]
    fn test_builtin_library_is_complete() {
        let library = ShaderLibrary::builtin().unwrap();
        for pass in ShaderPass::ALL {
            assert!(library.has_pass(pass), "{pass} missing");
        }
        for kernel in ComputeKernel::ALL {
            assert_eq!(library.kernel_group_size(kernel), Some([8, 8, 1]), "{kernel}");
        }
    }

    #[test]
    fn test_builtin_ray_march_walks_hiz_mips() {
        assert!(BUILTIN_SSR.contains("textureNumLevels(hiz_depth)"));
        assert!(BUILTIN_SSR.contains("hiz_level(p.xy, level)"));
        let library = ShaderLibrary::builtin().unwrap();
        assert!(library.has_pass(ShaderPass::RayMarch));
    }

    #[test]
    fn test_shared_utility_shaders_validate() {
        use specula_gpu_shared::shaders;

        let vert =
            ReflectedModule::parse("fullscreen", shaders::FULLSCREEN_TRIANGLE_VERT).unwrap();
        assert!(vert.has_vertex(shaders::FULLSCREEN_VERT_ENTRY));
        let blit = ReflectedModule::parse("blit", shaders::BLIT_FRAG).unwrap();
        assert!(blit.has_fragment(shaders::BLIT_FRAG_ENTRY));
    }

    #[test]
    fn test_missing_dir_yields_empty_library() {
        let dir = std::env::temp_dir().join("specula-no-such-shader-dir");
        let library = ShaderLibrary::from_dir(&dir).unwrap();
        assert!(library.ssr().is_none());
        assert!(library.kernel_group_size(ComputeKernel::GetHiZ).is_none());
    }
}
