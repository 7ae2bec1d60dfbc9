//! Resolve and temporal accumulation.

use specula_gpu_shared::shaders::ShaderPass;

use crate::commands::Command;
use crate::error::SsrError;
use crate::frame::FrameContext;
use crate::report::{Stage, StageStatus};
use crate::targets::TargetKey;

/// Pass 5: reflected colour into the downsampled resolved target.
pub fn resolve(ctx: &mut FrameContext<'_>) -> Result<StageStatus, SsrError> {
    require!(ctx.upstream(Stage::RayMarch));
    require!(ctx.upstream(Stage::CopySource));
    let resolved = require!(ctx.target(TargetKey::Resolved));
    require!(ctx.pass(ShaderPass::Resolve));

    ctx.commands.push(Command::Blit {
        source: None,
        target: resolved,
        pass: Some(ShaderPass::Resolve),
        bindings: ctx.bindings,
    });
    ctx.bindings.resolved = Some(resolved);
    Ok(StageStatus::Completed)
}

/// Resolved colour into the current TAA target, blended against history with
/// pass 6, then copied into history. The blend reads the resolved and history
/// targets; the current TAA target is only written.
///
/// When the blend pass is missing the resolved colour is still forwarded and
/// history is left untouched. The caller commits the camera matrix only when
/// this returns `Completed`.
pub fn temporal(ctx: &mut FrameContext<'_>) -> Result<StageStatus, SsrError> {
    require!(ctx.upstream(Stage::Resolve));
    let resolved = require!(ctx.target(TargetKey::Resolved));
    let current = require!(ctx.target(TargetKey::TaaCurrent));

    ctx.commands.push(Command::Blit {
        source: Some(resolved),
        target: current,
        pass: None,
        bindings: ctx.bindings,
    });
    ctx.bindings.taa_current = Some(current);

    let history = require!(ctx.target(TargetKey::TaaHistory));
    if let Err(reason) = ctx.pass(ShaderPass::TemporalBlend) {
        return Ok(StageStatus::Skipped(reason));
    }

    ctx.bindings.taa_history = Some(history);
    let mut blend_bindings = ctx.bindings;
    blend_bindings.taa_current = None;
    ctx.commands.push(Command::Blit {
        source: None,
        target: current,
        pass: Some(ShaderPass::TemporalBlend),
        bindings: blend_bindings,
    });
    ctx.commands.push(Command::CopyTexture {
        source: current,
        source_mip: 0,
        target: history,
        target_mip: 0,
        size: ctx.sizes.taa,
    });
    Ok(StageStatus::Completed)
}
