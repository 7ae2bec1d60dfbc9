use crate::commands::Command;
use crate::error::SsrError;
use crate::frame::FrameContext;
use crate::report::{SkipReason, Stage, StageStatus};
use crate::settings::DebugMode;

/// Writes the selected ray-march buffer straight into the camera target.
pub fn debug_view(ctx: &mut FrameContext<'_>) -> Result<StageStatus, SsrError> {
    let Some(pass) = ctx.settings.debug_mode.shader_pass() else {
        return Ok(StageStatus::Skipped(SkipReason::Disabled));
    };
    require!(ctx.upstream(Stage::RayMarch));
    require!(ctx.pass(pass));

    let source = match ctx.settings.debug_mode {
        DebugMode::HitMask => ctx.bindings.hit_mask,
        _ => ctx.bindings.hit_data,
    };

    ctx.commands.push(Command::Blit {
        source,
        target: ctx.camera.color,
        pass: Some(pass),
        bindings: ctx.bindings,
    });
    Ok(StageStatus::Completed)
}
