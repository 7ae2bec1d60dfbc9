//! Dual-filter blur of the temporal result.

use specula_gpu_shared::shaders::ComputeKernel;

use crate::backend::TextureId;
use crate::blur::{lerp_params, sample_params, BlurPlan, PingPong};
use crate::commands::{dispatch_groups, Command, KernelParams};
use crate::error::SsrError;
use crate::frame::FrameContext;
use crate::report::{SkipReason, Stage, StageStatus};
use crate::targets::TargetKey;
use crate::texture_size::TextureSize;

pub const BLUR_SAMPLE: &str = "SSR Blur";

struct Kernels {
    down: [u32; 3],
    up: [u32; 3],
    lerp: [u32; 3],
}

fn sample(
    ctx: &mut FrameContext<'_>,
    kernel: ComputeKernel,
    group_size: [u32; 3],
    (source, source_size): (TextureId, TextureSize),
    (target, target_size): (TextureId, TextureSize),
) {
    ctx.commands.push(Command::Dispatch {
        kernel,
        source,
        source_mip: 0,
        target,
        params: KernelParams::DualBlur(sample_params(source_size, target_size, 1.0)),
        groups: dispatch_groups(target_size, group_size),
    });
}

fn lerp(
    ctx: &mut FrameContext<'_>,
    group_size: [u32; 3],
    source: TextureId,
    target: TextureId,
    size: TextureSize,
    ratio: f32,
) {
    ctx.commands.push(Command::Dispatch {
        kernel: ComputeKernel::LerpDownUpTex,
        source,
        source_mip: 0,
        target,
        params: KernelParams::DualBlur(lerp_params(size, ratio)),
        groups: dispatch_groups(size, group_size),
    });
}

/// Blurs the current TAA target in place. History keeps the unblurred result
/// because the temporal copy was recorded before this stage.
pub fn blur(ctx: &mut FrameContext<'_>) -> Result<StageStatus, SsrError> {
    if !ctx.settings.blur_enabled() {
        return Ok(StageStatus::Skipped(SkipReason::Disabled));
    }
    let Some(input) = ctx.bindings.taa_current else {
        return Ok(StageStatus::Skipped(SkipReason::UpstreamSkipped(Stage::Temporal)));
    };
    let kernels = Kernels {
        down: require!(ctx.kernel(ComputeKernel::DualBlurDownSample)),
        up: require!(ctx.kernel(ComputeKernel::DualBlurUpSample)),
        lerp: require!(ctx.kernel(ComputeKernel::LerpDownUpTex)),
    };

    let plan = BlurPlan::new(ctx.settings.effective_blur_radius(), ctx.sizes.taa);
    let n = plan.down_sample_count as usize;

    let descs = plan.targets();
    require!(ctx.check_supported(&descs));

    // ids[0] is the output, ids[k] pyramid level k
    let mut ids = Vec::with_capacity(plan.sizes.len());
    let mut intermediate = None;
    for (key, desc) in descs {
        let id = ctx.allocate_transient(key, desc)?;
        if key == TargetKey::BlurIntermediate {
            intermediate = Some(id);
        } else {
            ids.push(id);
        }
    }
    let sizes = &plan.sizes;

    ctx.commands.begin_sample(BLUR_SAMPLE);

    let mut last = (input, sizes[0]);
    for level in 1..sizes.len() {
        let target = (ids[level], sizes[level]);
        sample(ctx, ComputeKernel::DualBlurDownSample, kernels.down, last, target);
        last = target;
    }

    match intermediate {
        None => {
            sample(
                ctx,
                ComputeKernel::DualBlurUpSample,
                kernels.up,
                (ids[1], sizes[1]),
                (ids[0], sizes[0]),
            );
            lerp(ctx, kernels.lerp, input, ids[0], sizes[0], plan.offset_ratio);
            ctx.commands.release(ids[1]);
        }
        Some(intermediate) => {
            // The smallest upsample lands next to level n and the two are
            // blended by the fractional radius. The blend result replaces
            // level n for the rest of the chain.
            let mut pair = PingPong::new(ids[n], intermediate);
            sample(
                ctx,
                ComputeKernel::DualBlurUpSample,
                kernels.up,
                (ids[n + 1], sizes[n + 1]),
                (pair.back(), sizes[n]),
            );
            lerp(ctx, kernels.lerp, pair.front(), pair.back(), sizes[n], plan.offset_ratio);
            pair.swap();
            ctx.commands.release(ids[n + 1]);

            for level in (1..=n).rev() {
                let source = if level == n { pair.front() } else { ids[level] };
                sample(
                    ctx,
                    ComputeKernel::DualBlurUpSample,
                    kernels.up,
                    (source, sizes[level]),
                    (ids[level - 1], sizes[level - 1]),
                );
                ctx.commands.release(source);
            }
            ctx.commands.release(pair.back());
        }
    }

    ctx.commands.push(Command::CopyTexture {
        source: ids[0],
        source_mip: 0,
        target: input,
        target_mip: 0,
        size: sizes[0],
    });
    ctx.commands.release(ids[0]);
    ctx.commands.end_sample(BLUR_SAMPLE);

    Ok(StageStatus::Completed)
}
