//! Scene colour copy, depth copy and the Hi-Z reduction chain.

use specula_gpu_shared::shaders::{ComputeKernel, ShaderPass};

use crate::commands::{dispatch_groups, Command, KernelParams};
use crate::error::SsrError;
use crate::frame::FrameContext;
use crate::hiz;
use crate::report::{Stage, StageStatus};
use crate::targets::{StorageAccess, TargetDesc, TargetFormat, TargetKey};

/// Camera colour into the source target, before anything writes the camera.
pub fn copy_source(ctx: &mut FrameContext<'_>) -> Result<StageStatus, SsrError> {
    let source = require!(ctx.target(TargetKey::Source));

    ctx.commands.push(Command::Blit {
        source: Some(ctx.camera.color),
        target: source,
        pass: None,
        bindings: ctx.bindings,
    });
    ctx.bindings.source = Some(source);
    Ok(StageStatus::Completed)
}

/// Shader pass 0 writes scene depth into mip 0 of the Hi-Z target.
pub fn copy_depth(ctx: &mut FrameContext<'_>) -> Result<StageStatus, SsrError> {
    let hiz = require!(ctx.target(TargetKey::HiZ));
    require!(ctx.pass(ShaderPass::CopyDepth));

    ctx.commands.push(Command::Blit {
        source: None,
        target: hiz,
        pass: Some(ShaderPass::CopyDepth),
        bindings: ctx.bindings,
    });
    Ok(StageStatus::Completed)
}

/// `GetHiZ` per level into scratch targets, each copied into its mip of the
/// Hi-Z target. Scratch levels are released after the last copy.
pub fn build_hiz(ctx: &mut FrameContext<'_>) -> Result<StageStatus, SsrError> {
    require!(ctx.upstream(Stage::CopyDepth));
    let hiz = require!(ctx.target(TargetKey::HiZ));
    let group_size = require!(ctx.kernel(ComputeKernel::GetHiZ));

    let base = match ctx.resources.desc(TargetKey::HiZ) {
        Some(desc) => desc.size,
        None => return Err(SsrError::MissingTarget(TargetKey::HiZ)),
    };
    let levels = hiz::plan_levels(base);

    let descs: Vec<(TargetKey, TargetDesc)> = levels
        .iter()
        .map(|level| {
            (
                TargetKey::HiZLevel(level.index as u8),
                TargetDesc::storage(level.size, TargetFormat::R32Float, StorageAccess::WriteOnly),
            )
        })
        .collect();
    require!(ctx.check_supported(&descs));

    let mut scratch = Vec::with_capacity(levels.len());
    let mut last = hiz;
    for (level, (key, desc)) in levels.iter().zip(descs) {
        let target = ctx.allocate_transient(key, desc)?;
        ctx.commands.push(Command::Dispatch {
            kernel: ComputeKernel::GetHiZ,
            source: last,
            source_mip: 0,
            target,
            params: KernelParams::HiZ(level.params()),
            groups: dispatch_groups(level.size, group_size),
        });
        ctx.commands.push(Command::CopyTexture {
            source: target,
            source_mip: 0,
            target: hiz,
            target_mip: level.index,
            size: level.size,
        });
        scratch.push(target);
        last = target;
    }

    for id in scratch {
        ctx.commands.release(id);
    }

    ctx.bindings.hiz = Some(hiz);
    Ok(StageStatus::Completed)
}
