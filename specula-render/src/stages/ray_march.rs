use specula_gpu_shared::shaders::ShaderPass;

use crate::commands::{Command, RendererFilter, SortingCriteria};
use crate::error::SsrError;
use crate::frame::FrameContext;
use crate::report::{Stage, StageStatus};
use crate::targets::TargetKey;

pub const RAY_MARCH_SAMPLE: &str = "SSR Ray March";

/// Geometry draw with the ray-march pass into hit data and hit mask at once.
pub fn ray_march(ctx: &mut FrameContext<'_>) -> Result<StageStatus, SsrError> {
    require!(ctx.upstream(Stage::HiZ));
    let hit_data = require!(ctx.target(TargetKey::HitData));
    let hit_mask = require!(ctx.target(TargetKey::HitMask));
    require!(ctx.pass(ShaderPass::RayMarch));

    ctx.commands.begin_sample(RAY_MARCH_SAMPLE);
    ctx.commands.push(Command::DrawRenderers {
        pass: ShaderPass::RayMarch,
        color_targets: [hit_data, hit_mask],
        filter: RendererFilter {
            layer_mask: ctx.settings.layer_mask,
            sorting: SortingCriteria::RenderQueue,
        },
        bindings: ctx.bindings,
    });
    ctx.commands.end_sample(RAY_MARCH_SAMPLE);

    ctx.bindings.hit_data = Some(hit_data);
    ctx.bindings.hit_mask = Some(hit_mask);
    Ok(StageStatus::Completed)
}
