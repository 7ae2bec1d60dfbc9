//! Device setup and the per-camera driver pairing [`SsrFeature`] with the
//! wgpu backend.

use std::sync::Arc;

use specula_render::{CameraFrame, CameraId, FrameReport, SsrError, SsrFeature, SsrSettings};

use crate::backend::WgpuSsrBackend;
use crate::shader_library::ShaderLibrary;

/// Fails when the adapter cannot copy into depth textures, which hosts that
/// upload CPU depth through `Queue::write_texture` rely on.
pub fn check_depth_upload(caps: &wgpu::DownlevelCapabilities) -> Result<(), String> {
    if caps
        .flags
        .contains(wgpu::DownlevelFlags::DEPTH_TEXTURE_AND_BUFFER_COPIES)
    {
        Ok(())
    } else {
        Err("Adapter cannot copy into depth textures (DEPTH_TEXTURE_AND_BUFFER_COPIES)".into())
    }
}

pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Adapter and device without a surface. Adapter-specific format features
    /// are enabled when offered so the blur can use read-write half-float
    /// storage.
    pub fn new_headless() -> Result<Self, String> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or("Failed to find suitable GPU adapter")?;

        let optional_features =
            adapter.features() & wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Specula SSR Device"),
                required_features: optional_features,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| format!("Failed to create device: {e}"))?;

        if optional_features.is_empty() {
            log::info!("Adapter-specific format features unavailable; blur may degrade");
        }

        Ok(Self {
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    pub fn check_depth_upload(&self) -> Result<(), String> {
        check_depth_upload(&self.adapter.get_downlevel_capabilities())
    }
}

/// One backend shared by every camera, one isolated pipeline per camera.
pub struct SsrRenderer {
    backend: WgpuSsrBackend,
    feature: SsrFeature,
}

impl SsrRenderer {
    pub fn new(context: &GpuContext, library: ShaderLibrary, settings: SsrSettings) -> Self {
        let backend = WgpuSsrBackend::new(
            &context.adapter,
            context.device.clone(),
            context.queue.clone(),
            library,
        );
        Self {
            backend,
            feature: SsrFeature::new(settings),
        }
    }

    pub fn backend(&self) -> &WgpuSsrBackend {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut WgpuSsrBackend {
        &mut self.backend
    }

    pub fn feature(&self) -> &SsrFeature {
        &self.feature
    }

    pub fn set_settings(&mut self, settings: SsrSettings) {
        self.feature.set_settings(settings);
    }

    pub fn render_camera(
        &mut self,
        camera: CameraId,
        frame: &CameraFrame,
    ) -> Result<FrameReport, SsrError> {
        self.feature.render_camera(&mut self.backend, camera, frame)
    }

    /// Releases the camera's targets, history included, and returns the freed
    /// textures to the pool.
    pub fn remove_camera(&mut self, camera: CameraId) -> bool {
        self.feature.remove_camera(&mut self.backend, camera)
    }

    pub fn release_all(&mut self) {
        self.feature.release_all(&mut self.backend);
        self.backend.trim_pool();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_upload_follows_downlevel_flags() {
        assert!(check_depth_upload(&wgpu::DownlevelCapabilities::default()).is_ok());

        let caps = wgpu::DownlevelCapabilities {
            flags: wgpu::DownlevelFlags::all()
                - wgpu::DownlevelFlags::DEPTH_TEXTURE_AND_BUFFER_COPIES,
            ..Default::default()
        };
        let err = check_depth_upload(&caps).unwrap_err();
        assert!(err.contains("DEPTH_TEXTURE_AND_BUFFER_COPIES"), "{err}");
    }
}
