//! Scene geometry seam for the ray-march draw.
//!
//! The pipeline never sees individual renderers. The host supplies a
//! [`GeometrySource`] that binds per-object data in group 1 and issues draws
//! for every visible renderer passing the filter.

use specula_render::commands::RendererFilter;

pub trait GeometrySource {
    /// Vertex buffer layouts consumed by `vs_ray_march`, in slot order.
    fn vertex_layouts(&self) -> &[wgpu::VertexBufferLayout<'static>];

    /// Layout of the per-object bind group set at group 1.
    fn object_bind_group_layout(&self) -> &wgpu::BindGroupLayout;

    /// Draws the renderers matching `filter` in the requested order. Group 0
    /// and the pipeline are already set.
    fn draw_filtered(&self, pass: &mut wgpu::RenderPass<'_>, filter: &RendererFilter);
}
