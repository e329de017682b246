//! Tasks: calibrator subbands.

use super::{RunCtx, log_task_error};
use crate::driver::items::Subband;
use crate::pipeline::PipelineTask;
use crate::scratch::ScratchFile;
use crate::stages::{calibrate_standalone, clip_parmdb};
use async_trait::async_trait;
use msss_shared::errors::MsssResult;
use std::path::PathBuf;
use std::sync::Arc;

/// Solve for the calibrator subband against its own sky model.
pub struct CalibrateTask {
    pub subband: Subband,
    pub skymodel: PathBuf,
    /// The `calcal.parset` subset, shared by all subbands of the phase.
    pub parset: Arc<ScratchFile>,
    pub log_dir: PathBuf,
}

#[async_trait]
impl PipelineTask<RunCtx> for CalibrateTask {
    type Output = Subband;

    async fn run(self, ctx: RunCtx) -> MsssResult<Subband> {
        let task_name = self.name();
        calibrate_standalone(
            &ctx.stages,
            self.parset.path(),
            &self.subband.path,
            &self.skymodel,
            &self.log_dir,
        )
        .await
        .inspect_err(|e| log_task_error(&task_name, e))?;
        Ok(self.subband)
    }

    fn name(&self) -> String {
        format!("calibrate:{}", self.subband)
    }
}

/// Clip the instrument database of a calibrated subband.
pub struct ClipTask {
    pub subband: Subband,
}

#[async_trait]
impl PipelineTask<RunCtx> for ClipTask {
    type Output = Subband;

    async fn run(self, ctx: RunCtx) -> MsssResult<Subband> {
        let task_name = self.name();
        let clip = &ctx.config.pdbclip;
        clip_parmdb(&ctx.stages, &clip.executable, clip.sigma, &self.subband.path)
            .await
            .inspect_err(|e| log_task_error(&task_name, e))?;
        Ok(self.subband)
    }

    fn name(&self) -> String {
        format!("clip:{}", self.subband)
    }
}
