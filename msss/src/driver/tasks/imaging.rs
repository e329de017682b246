//! Tasks: imaging. These run one beam at a time; the imager uses every
//! core on its own.

use super::{RunCtx, log_task_error};
use crate::driver::items::{BaselineLimited, BeamItem, Imaged, Masked, NoiseEstimated};
use crate::pipeline::PipelineTask;
use crate::stages::{ImageRequest, estimate_noise, image, make_mask};
use async_trait::async_trait;
use msss_shared::errors::MsssResult;

/// Derive the clean threshold from the noise of a dirty image.
pub struct NoiseTask {
    pub item: BeamItem<BaselineLimited>,
}

#[async_trait]
impl PipelineTask<RunCtx> for NoiseTask {
    type Output = BeamItem<NoiseEstimated>;

    async fn run(self, ctx: RunCtx) -> MsssResult<BeamItem<NoiseEstimated>> {
        let task_name = self.name();
        let config = &ctx.config;
        let noise = estimate_noise(
            &ctx.stages,
            &config.noise.parset,
            self.item.limited_ms(),
            config.max_baseline,
            config.noise.box_size,
            config.awimager_initscript.as_deref(),
        )
        .await
        .inspect_err(|e| log_task_error(&task_name, e))?;

        let threshold = config.noise.multiplier * noise;
        tracing::info!(beam = self.item.kind().index, threshold, "Clean threshold");
        Ok(self.item.noise_estimated(threshold))
    }

    fn name(&self) -> String {
        format!("noise:SAP00{}", self.item.kind().index)
    }
}

/// Build the clean mask from the beam's pointing sky model.
pub struct MaskTask {
    pub item: BeamItem<NoiseEstimated>,
}

#[async_trait]
impl PipelineTask<RunCtx> for MaskTask {
    type Output = BeamItem<Masked>;

    async fn run(self, ctx: RunCtx) -> MsssResult<BeamItem<Masked>> {
        let task_name = self.name();
        let config = &ctx.config;
        let mask = make_mask(
            &ctx.stages,
            &config.image,
            self.item.limited_ms(),
            &self.item.kind().skymodel,
            &config.make_mask_executable,
            config.awimager_initscript.as_deref(),
        )
        .await
        .inspect_err(|e| log_task_error(&task_name, e))?;
        Ok(self.item.masked(mask))
    }

    fn name(&self) -> String {
        format!("mask:SAP00{}", self.item.kind().index)
    }
}

/// Make the deliverable image.
pub struct ImageTask {
    pub item: BeamItem<Masked>,
}

#[async_trait]
impl PipelineTask<RunCtx> for ImageTask {
    type Output = BeamItem<Imaged>;

    async fn run(self, ctx: RunCtx) -> MsssResult<BeamItem<Imaged>> {
        let task_name = self.name();
        let config = &ctx.config;
        image(
            &ctx.stages,
            &config.image,
            ImageRequest {
                ms: self.item.limited_ms(),
                mask: self.item.mask(),
                threshold: self.item.threshold(),
                wmax: config.max_baseline,
                output: &self.item.kind().output_image,
            },
            config.awimager_initscript.as_deref(),
        )
        .await
        .inspect_err(|e| log_task_error(&task_name, e))?;
        Ok(self.item.imaged())
    }

    fn name(&self) -> String {
        format!("image:SAP00{}", self.item.kind().index)
    }
}
