//! Pipeline tasks of the imaging run.
//!
//! Each task owns its input (a subband, a subband pair, or a beam work
//! item), calls one stage function, and returns the output for the next
//! phase.

mod calibrator;
mod imaging;
mod staging;
mod target;

pub use calibrator::{CalibrateTask, ClipTask};
pub use imaging::{ImageTask, MaskTask, NoiseTask};
pub use staging::StageInputTask;
pub use target::{CombineTask, LimitTask, PhaseOnlyTask, StripTask, TransferTask};

use super::config::PipelineConfig;
use crate::stages::StageContext;
use msss_shared::errors::MsssError;
use std::sync::Arc;

/// Shared context handed to every task of a run.
#[derive(Clone)]
pub struct RunCtx {
    pub stages: StageContext,
    pub config: Arc<PipelineConfig>,
}

pub(crate) fn log_task_error(task: &str, e: &MsssError) {
    tracing::error!(task, error = %e, "Task failed");
}
