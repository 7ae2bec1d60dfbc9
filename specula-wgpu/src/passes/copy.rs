//! Texture-to-texture copies between mips of same-format targets.

use specula_render::TextureSize;

/// Copy `size` texels from `source` mip `source_mip` into `target` mip
/// `target_mip`.
pub fn copy_texture_mip(
    encoder: &mut wgpu::CommandEncoder,
    source: &wgpu::Texture,
    source_mip: u32,
    target: &wgpu::Texture,
    target_mip: u32,
    size: TextureSize,
) {
    encoder.copy_texture_to_texture(
        wgpu::ImageCopyTexture {
            texture: source,
            mip_level: source_mip,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyTexture {
            texture: target,
            mip_level: target_mip,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        },
    );
}
