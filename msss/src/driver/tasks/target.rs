//! Tasks: target beams, from solution transfer to the deliverable
//! measurement set.

use super::{RunCtx, log_task_error};
use crate::driver::items::{
    BaselineLimited, BeamItem, Calibrated, Combined, PhaseCalibrated, StationsStripped, Subband,
};
use crate::pipeline::PipelineTask;
use crate::scratch::ScratchFile;
use crate::stages::constants::names;
use crate::stages::{
    calibrate_standalone, combine, find_bad_stations, limit_baselines, strip_stations,
    transfer_calibration,
};
use async_trait::async_trait;
use msss_shared::errors::MsssResult;
use std::path::PathBuf;
use std::sync::Arc;

/// Apply one calibrator subband's solutions to the matching target subband.
pub struct TransferTask {
    pub beam: usize,
    pub calibrator: Subband,
    pub target: Subband,
    /// The `transfer.parset` subset, shared by all pairs of the phase.
    pub parset: Arc<ScratchFile>,
    /// Calibrator output directory; the transfer runs from here.
    pub log_dir: PathBuf,
}

#[async_trait]
impl PipelineTask<RunCtx> for TransferTask {
    /// Beam index and the now-calibrated target subband.
    type Output = (usize, Subband);

    async fn run(self, ctx: RunCtx) -> MsssResult<(usize, Subband)> {
        let task_name = self.name();
        transfer_calibration(
            &ctx.stages,
            &self.calibrator.path,
            &self.target.path,
            self.parset.path(),
            &ctx.config.transfer.skymodel,
            &self.log_dir,
        )
        .await
        .inspect_err(|e| log_task_error(&task_name, e))?;
        Ok((self.beam, self.target))
    }

    fn name(&self) -> String {
        format!("transfer:SAP00{}:{}", self.beam, self.target)
    }
}

/// Merge the calibrated subbands of one beam.
pub struct CombineTask {
    pub item: BeamItem<Calibrated>,
}

#[async_trait]
impl PipelineTask<RunCtx> for CombineTask {
    type Output = BeamItem<Combined>;

    async fn run(self, ctx: RunCtx) -> MsssResult<BeamItem<Combined>> {
        let task_name = self.name();
        let inputs: Vec<PathBuf> = self
            .item
            .subbands()
            .iter()
            .map(|subband| subband.path.clone())
            .collect();
        let combined = combine(&ctx.stages, &ctx.config.combine, &inputs)
            .await
            .inspect_err(|e| log_task_error(&task_name, e))?;
        Ok(self.item.combined(combined))
    }

    fn name(&self) -> String {
        format!("combine:SAP00{}", self.item.kind().index)
    }
}

/// Phase-only self-calibration of a combined beam.
pub struct PhaseOnlyTask {
    pub item: BeamItem<Combined>,
    pub parset: Arc<ScratchFile>,
}

#[async_trait]
impl PipelineTask<RunCtx> for PhaseOnlyTask {
    type Output = BeamItem<PhaseCalibrated>;

    async fn run(self, ctx: RunCtx) -> MsssResult<BeamItem<PhaseCalibrated>> {
        let task_name = self.name();
        let beam = self.item.kind();
        calibrate_standalone(
            &ctx.stages,
            self.parset.path(),
            self.item.combined_ms(),
            &beam.skymodel,
            &beam.output_dir,
        )
        .await
        .inspect_err(|e| log_task_error(&task_name, e))?;
        Ok(self.item.phase_calibrated())
    }

    fn name(&self) -> String {
        format!("phaseonly:SAP00{}", self.item.kind().index)
    }
}

/// Write the deliverable measurement set without the bad stations.
pub struct StripTask {
    pub item: BeamItem<PhaseCalibrated>,
}

#[async_trait]
impl PipelineTask<RunCtx> for StripTask {
    type Output = BeamItem<StationsStripped>;

    async fn run(self, ctx: RunCtx) -> MsssResult<BeamItem<StationsStripped>> {
        let task_name = self.name();
        let msin = self.item.combined_ms();
        let output_ms = &self.item.kind().output_ms;

        let stripped = async {
            let bad = find_bad_stations(&ctx.stages, msin).await?;
            strip_stations(&ctx.stages, msin, output_ms, &bad).await
        };
        stripped
            .await
            .inspect_err(|e| log_task_error(&task_name, e))?;
        Ok(self.item.stations_stripped())
    }

    fn name(&self) -> String {
        format!("strip:SAP00{}", self.item.kind().index)
    }
}

/// Reference the short baselines of the deliverable for imaging.
pub struct LimitTask {
    pub item: BeamItem<StationsStripped>,
}

#[async_trait]
impl PipelineTask<RunCtx> for LimitTask {
    type Output = BeamItem<BaselineLimited>;

    async fn run(self, ctx: RunCtx) -> MsssResult<BeamItem<BaselineLimited>> {
        let task_name = self.name();
        let limited = ctx.stages.scratch.product(names::LIMITED_MS)?;
        limit_baselines(
            &ctx.stages,
            self.item.output_ms(),
            limited.path(),
            ctx.config.max_baseline,
        )
        .await
        .inspect_err(|e| log_task_error(&task_name, e))?;
        Ok(self.item.baseline_limited(limited))
    }

    fn name(&self) -> String {
        format!("limit:SAP00{}", self.item.kind().index)
    }
}
