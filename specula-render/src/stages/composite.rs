use specula_gpu_shared::shaders::ShaderPass;

use crate::commands::Command;
use crate::error::SsrError;
use crate::frame::FrameContext;
use crate::report::{SkipReason, Stage, StageStatus};
use crate::targets::TargetKey;

/// Pass 7 into the combine target, then back onto the camera colour.
pub fn composite(ctx: &mut FrameContext<'_>) -> Result<StageStatus, SsrError> {
    if ctx.bindings.taa_current.is_none() {
        return Ok(StageStatus::Skipped(SkipReason::UpstreamSkipped(Stage::Temporal)));
    }
    require!(ctx.upstream(Stage::CopySource));
    let combine = require!(ctx.target(TargetKey::Combine));
    require!(ctx.pass(ShaderPass::Composite));

    ctx.commands.push(Command::Blit {
        source: None,
        target: combine,
        pass: Some(ShaderPass::Composite),
        bindings: ctx.bindings,
    });
    ctx.commands.push(Command::Blit {
        source: Some(combine),
        target: ctx.camera.color,
        pass: None,
        bindings: ctx.bindings,
    });
    Ok(StageStatus::Completed)
}
