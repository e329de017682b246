//! Pipeline driver.
//!
//! Locates the inputs, runs every pre-flight check, then executes the
//! phases in their fixed order:
//!
//! 1. stage inputs (copy or flag) - parallel
//! 2. calibrate calibrator subbands - parallel
//! 3. clip calibrator instrument databases - parallel
//! 4. transfer solutions to every target subband - parallel
//! 5. combine target subbands per beam - parallel
//! 6. phase-only calibration per beam - parallel
//! 7. strip bad stations into the deliverable - parallel
//! 8. limit baselines - parallel
//! 9. noise estimate - serial
//! 10. mask - serial
//! 11. image - serial
//!
//! A failing phase stops the run; the next phase never starts.

pub mod config;
pub mod inputs;
pub mod items;
pub mod tasks;

pub use config::PipelineConfig;

use crate::pipeline::{PipelineExecutor, PipelineMetrics, Stage};
use crate::stages::StageContext;
use crate::stages::constants::flagging;
use inputs::{
    calibrator_skymodel, check_pairing, discover_subbands, ensure_absent, ensure_directory,
    ensure_present, pointing_skymodel,
};
use items::{
    Beam, BeamItem, Calibrated, Calibrator, CalibratorItem, Flagged, Imaged, Raw, Subband, WorkItem,
};
use msss_shared::errors::{MsssError, MsssResult};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tasks::{
    CalibrateTask, ClipTask, CombineTask, ImageTask, LimitTask, MaskTask, NoiseTask,
    PhaseOnlyTask, RunCtx, StageInputTask, StripTask, TransferTask,
};
use tracing::Instrument;
use uuid::Uuid;

/// Runtime settings that do not come from the parset.
#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Worker pool width; available cores when unset.
    pub jobs: Option<usize>,
    /// Installation root holding the default flagging strategy.
    pub lofar_root: Option<PathBuf>,
}

/// Deliverables of one beam.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamProducts {
    pub beam: usize,
    pub measurement_set: PathBuf,
    pub image: PathBuf,
}

/// Outcome of a successful run.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub beams: Vec<BeamProducts>,
    pub metrics: PipelineMetrics,
}

/// Inputs that passed the pre-flight checks.
struct Prepared {
    calibrator: CalibratorItem<Raw>,
    beams: Vec<BeamItem<Raw>>,
    strategy: Option<PathBuf>,
}

pub struct Driver {
    config: Arc<PipelineConfig>,
    stages: StageContext,
    options: DriverOptions,
}

impl Driver {
    pub fn new(config: PipelineConfig, stages: StageContext, options: DriverOptions) -> Self {
        Self {
            config: Arc::new(config),
            stages,
            options,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self) -> MsssResult<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("run", run_id = %run_id);
        async {
            tracing::info!(
                cal_obsid = %self.config.layout.cal_obsid,
                target_obsid = %self.config.layout.target_obsid,
                n_beams = self.config.layout.n_beams,
                "Starting imaging run"
            );
            let prepared = self.prepare().await?;
            let mut executor = match self.options.jobs {
                Some(jobs) => PipelineExecutor::new(jobs),
                None => PipelineExecutor::with_available_cores(),
            };
            tracing::info!(width = executor.width(), "Worker pool ready");

            let imaged = self.execute(prepared, &mut executor).await?;
            let metrics = executor.finish();
            metrics.log_summary();

            Ok(RunSummary {
                run_id: run_id.clone(),
                beams: imaged
                    .iter()
                    .map(|item| BeamProducts {
                        beam: item.kind().index,
                        measurement_set: item.output_ms().to_path_buf(),
                        image: item.output_image().to_path_buf(),
                    })
                    .collect(),
                metrics,
            })
        }
        .instrument(span)
        .await
    }

    /// Locate inputs and check everything that can be checked before any
    /// external tool runs.
    async fn prepare(&self) -> MsssResult<Prepared> {
        let layout = &self.config.layout;
        let tables = &self.stages.tables;

        let cal_subbands = discover_subbands(&layout.input_dir, &layout.cal_obsid, 0)?;
        if cal_subbands.is_empty() {
            return Err(MsssError::Path(format!(
                "no calibrator subbands for {} under {}",
                layout.cal_obsid,
                layout.input_dir.display()
            )));
        }

        let mut beams = Vec::new();
        for index in 0..layout.n_beams {
            let subbands = discover_subbands(&layout.input_dir, &layout.target_obsid, index)?;
            check_pairing(&cal_subbands, &subbands, index)?;

            let output_dir = self.config.beam_dir(index);
            let output_ms = output_dir.join(format!("{}.MS", layout.target_obsid));
            let output_image = output_dir.join(format!("{}.img", layout.target_obsid));
            ensure_absent(&output_ms)?;
            ensure_absent(&output_image)?;

            let (ra, dec) = tables.reference_direction(&subbands[0].path).await?;
            let skymodel = pointing_skymodel(&layout.skymodel_dir, ra, dec);
            ensure_present(&skymodel, "beam sky model")?;

            beams.push(WorkItem::new(
                Beam {
                    index,
                    obsid: layout.target_obsid.clone(),
                    output_dir,
                    output_ms,
                    output_image,
                    skymodel,
                },
                subbands,
            ));
        }

        let cal_dir = self.config.calibrator_dir();
        let mut skymodels = BTreeMap::new();
        for subband in &cal_subbands {
            let target = tables.observation_target(&subband.path).await?;
            let skymodel = calibrator_skymodel(&layout.skymodel_dir, &target);
            ensure_present(&skymodel, "calibrator sky model")?;
            if let Some(name) = subband.path.file_name() {
                ensure_absent(&cal_dir.join(name))?;
            }
            skymodels.insert(subband.id, skymodel);
        }

        ensure_present(&self.config.transfer.skymodel, "transfer sky model")?;
        if let Some(script) = &self.config.awimager_initscript {
            ensure_present(script, "awimager init script")?;
        }
        let strategy = self.flagging_strategy()?;
        if let Some(strategy) = &strategy {
            ensure_present(strategy, "flagging strategy")?;
        }

        ensure_directory(&cal_dir)?;
        for beam in &beams {
            ensure_directory(&beam.kind().output_dir)?;
        }

        tracing::info!(
            subbands = cal_subbands.len(),
            beams = beams.len(),
            flagging = strategy.is_some(),
            "Inputs located and checked"
        );
        Ok(Prepared {
            calibrator: WorkItem::new(
                Calibrator {
                    obsid: layout.cal_obsid.clone(),
                    output_dir: cal_dir,
                    skymodels,
                },
                cal_subbands,
            ),
            beams,
            strategy,
        })
    }

    fn flagging_strategy(&self) -> MsssResult<Option<PathBuf>> {
        let Some(flag) = &self.config.flag else {
            return Ok(None);
        };
        if let Some(strategy) = &flag.strategy {
            return Ok(Some(strategy.clone()));
        }
        match &self.options.lofar_root {
            Some(root) => Ok(Some(root.join(flagging::DEFAULT_STRATEGY))),
            None => Err(MsssError::Config(
                "flagging needs flag.strategy or an installation root (LOFARROOT)".into(),
            )),
        }
    }

    async fn execute(
        &self,
        prepared: Prepared,
        executor: &mut PipelineExecutor,
    ) -> MsssResult<Vec<BeamItem<Imaged>>> {
        let ctx = RunCtx {
            stages: self.stages.clone(),
            config: Arc::clone(&self.config),
        };
        let Prepared {
            calibrator,
            beams,
            strategy,
        } = prepared;
        let per_item = calibrator.subbands().len();

        // Stage inputs: calibrator into the output tree, targets into
        // per-beam scratch.
        let strategy = strategy.map(Arc::new);
        let workspaces = beams
            .iter()
            .map(|_| self.stages.scratch.dir())
            .collect::<MsssResult<Vec<_>>>()?;
        let mut staging = Vec::new();
        for subband in calibrator.subbands() {
            staging.push(StageInputTask {
                subband: subband.clone(),
                dest_dir: calibrator.kind().output_dir.clone(),
                strategy: strategy.clone(),
            });
        }
        for (beam, workspace) in beams.iter().zip(&workspaces) {
            for subband in beam.subbands() {
                staging.push(StageInputTask {
                    subband: subband.clone(),
                    dest_dir: workspace.path().to_path_buf(),
                    strategy: strategy.clone(),
                });
            }
        }
        let mut staged = executor
            .execute(Stage::parallel("stage_inputs", staging), &ctx)
            .await?
            .into_iter();
        let calibrator = calibrator.flagged(staged.by_ref().take(per_item).collect(), None);
        let beams: Vec<_> = beams
            .into_iter()
            .zip(workspaces)
            .map(|(beam, workspace)| {
                beam.flagged(staged.by_ref().take(per_item).collect(), Some(workspace))
            })
            .collect();

        // Calibrator solutions.
        let calcal = Arc::new(self.config.calcal.write_scratch(&self.stages.scratch)?);
        let calibrate: Vec<_> = calibrator
            .subbands()
            .iter()
            .map(|subband| {
                let skymodel = calibrator
                    .kind()
                    .skymodels
                    .get(&subband.id)
                    .cloned()
                    .ok_or_else(|| {
                        MsssError::Internal(format!("no sky model resolved for {}", subband))
                    })?;
                Ok(CalibrateTask {
                    subband: subband.clone(),
                    skymodel,
                    parset: Arc::clone(&calcal),
                    log_dir: calibrator.kind().output_dir.clone(),
                })
            })
            .collect::<MsssResult<_>>()?;
        let calibrated = executor
            .execute(Stage::parallel("calibrate_calibrator", calibrate), &ctx)
            .await?;
        drop(calcal);

        let clip = calibrated
            .into_iter()
            .map(|subband| ClipTask { subband })
            .collect();
        let clipped = executor
            .execute(Stage::parallel("clip_calibrator", clip), &ctx)
            .await?;
        let calibrator = calibrator.calibrated(clipped);

        // Transfer, over every beam and subband pair at once.
        let transfer_parset = Arc::new(
            self.config
                .transfer
                .parset
                .write_scratch(&self.stages.scratch)?,
        );
        let mut transfer = Vec::new();
        for beam in &beams {
            for (cal, target) in calibrator.subbands().iter().zip(beam.subbands()) {
                transfer.push(TransferTask {
                    beam: beam.kind().index,
                    calibrator: cal.clone(),
                    target: target.clone(),
                    parset: Arc::clone(&transfer_parset),
                    log_dir: calibrator.kind().output_dir.clone(),
                });
            }
        }
        let transferred = executor
            .execute(Stage::parallel("transfer_calibration", transfer), &ctx)
            .await?;
        drop(transfer_parset);
        let beams = regroup(beams, transferred)?;

        let combine = beams.into_iter().map(|item| CombineTask { item }).collect();
        let combined = executor
            .execute(Stage::parallel("combine", combine), &ctx)
            .await?;

        let phaseonly_parset = Arc::new(
            self.config
                .phaseonly
                .parset
                .write_scratch(&self.stages.scratch)?,
        );
        let phaseonly = combined
            .into_iter()
            .map(|item| PhaseOnlyTask {
                item,
                parset: Arc::clone(&phaseonly_parset),
            })
            .collect();
        let phase_calibrated = executor
            .execute(Stage::parallel("phase_only_calibration", phaseonly), &ctx)
            .await?;
        drop(phaseonly_parset);

        let strip = phase_calibrated
            .into_iter()
            .map(|item| StripTask { item })
            .collect();
        let stripped = executor
            .execute(Stage::parallel("strip_bad_stations", strip), &ctx)
            .await?;

        let limit = stripped.into_iter().map(|item| LimitTask { item }).collect();
        let limited = executor
            .execute(Stage::parallel("limit_baselines", limit), &ctx)
            .await?;

        let noise = limited.into_iter().map(|item| NoiseTask { item }).collect();
        let estimated = executor
            .execute(Stage::sequential("estimate_noise", noise), &ctx)
            .await?;

        let mask = estimated.into_iter().map(|item| MaskTask { item }).collect();
        let masked = executor
            .execute(Stage::sequential("make_mask", mask), &ctx)
            .await?;

        let image = masked.into_iter().map(|item| ImageTask { item }).collect();
        executor
            .execute(Stage::sequential("image", image), &ctx)
            .await
    }
}

/// Reattach transferred subbands to their beams.
fn regroup(
    beams: Vec<BeamItem<Flagged>>,
    transferred: Vec<(usize, Subband)>,
) -> MsssResult<Vec<BeamItem<Calibrated>>> {
    let mut by_beam: BTreeMap<usize, Vec<Subband>> = BTreeMap::new();
    for (beam, subbands) in transferred {
        by_beam.entry(beam).or_default().push(subbands);
    }
    beams
        .into_iter()
        .map(|beam| {
            let index = beam.kind().index;
            let subbands = by_beam.remove(&index).ok_or_else(|| {
                MsssError::Internal(format!("no subbands returned for beam {}", index))
            })?;
            Ok(beam.calibrated(subbands))
        })
        .collect()
}
