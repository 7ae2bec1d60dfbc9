//! Ray-march geometry pass: scene renderers drawn with the SSR override
//! material into the hit data and hit mask targets.

use specula_render::commands::RendererFilter;

use crate::geometry::GeometrySource;

pub struct RayMarchTargets<'a> {
    pub hit_data: &'a wgpu::TextureView,
    pub hit_mask: &'a wgpu::TextureView,
    pub depth: &'a wgpu::TextureView,
}

pub fn render_ray_march_pass(
    encoder: &mut wgpu::CommandEncoder,
    targets: RayMarchTargets<'_>,
    pipeline: &wgpu::RenderPipeline,
    frame_bind_group: &wgpu::BindGroup,
    geometry: &dyn GeometrySource,
    filter: &RendererFilter,
) {
    let clear = wgpu::Operations {
        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
        store: wgpu::StoreOp::Store,
    };
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("SSR Ray March Pass"),
        color_attachments: &[
            Some(wgpu::RenderPassColorAttachment {
                view: targets.hit_data,
                resolve_target: None,
                ops: clear,
            }),
            Some(wgpu::RenderPassColorAttachment {
                view: targets.hit_mask,
                resolve_target: None,
                ops: clear,
            }),
        ],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: targets.depth,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Discard,
            }),
            stencil_ops: None,
        }),
        ..Default::default()
    });

    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, frame_bind_group, &[]);
    geometry.draw_filtered(&mut pass, filter);
}
