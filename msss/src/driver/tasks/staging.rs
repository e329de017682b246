//! Task: stage one input subband into the work area.

use super::{RunCtx, log_task_error};
use crate::driver::inputs::copy_tree;
use crate::driver::items::Subband;
use crate::pipeline::PipelineTask;
use crate::stages::flag_and_compress;
use async_trait::async_trait;
use msss_shared::errors::{MsssError, MsssResult};
use std::path::PathBuf;
use std::sync::Arc;

/// Copy a subband into `dest_dir`, or flag it into there when a strategy
/// is given.
pub struct StageInputTask {
    pub subband: Subband,
    pub dest_dir: PathBuf,
    pub strategy: Option<Arc<PathBuf>>,
}

#[async_trait]
impl PipelineTask<RunCtx> for StageInputTask {
    type Output = Subband;

    async fn run(self, ctx: RunCtx) -> MsssResult<Subband> {
        let task_name = self.name();
        let file_name = self.subband.path.file_name().ok_or_else(|| {
            MsssError::Path(format!("no file name in {}", self.subband.path.display()))
        })?;
        let dest = self.dest_dir.join(file_name);

        let result = match (&self.strategy, &ctx.config.flag) {
            (Some(strategy), Some(flag)) => flag_and_compress(
                &ctx.stages,
                &flag.parset,
                strategy,
                &self.subband.path,
                &dest,
            )
            .await
            .map(|_| ()),
            _ => copy_tree(self.subband.path.clone(), dest.clone()).await,
        };
        result.inspect_err(|e| log_task_error(&task_name, e))?;

        Ok(self.subband.moved_to(dest))
    }

    fn name(&self) -> String {
        format!("stage_input:{}", self.subband.path.display())
    }
}
