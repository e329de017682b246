//! Stage functions.
//!
//! Each stage wraps one or more external tools behind a typed input/output
//! contract. Parsets handed to a tool are patched copies written to scratch
//! and released as soon as the tool returns, whether or not it succeeded.

pub mod constants;

mod baselines;
mod calibrate;
mod combine;
mod flag;
mod image;
mod mask;
mod noise;
mod stations;

pub use baselines::limit_baselines;
pub use calibrate::{calibrate_standalone, clip_parmdb, transfer_calibration};
pub use combine::combine;
pub use flag::flag_and_compress;
pub use image::{ImageRequest, image};
pub use mask::make_mask;
pub use noise::{estimate_noise, population_std};
pub use stations::{find_bad_stations, parse_stats_table, strip_stations};

use crate::parset::ParameterSet;
use crate::process::{SharedRunner, StageInvocation};
use crate::scratch::ScratchContext;
use crate::tables::SharedTables;
use constants::executables;
use msss_shared::errors::MsssResult;
use std::path::Path;

/// Collaborators every stage needs. Cheap to clone.
#[derive(Clone)]
pub struct StageContext {
    pub scratch: ScratchContext,
    pub runner: SharedRunner,
    pub tables: SharedTables,
}

impl StageContext {
    pub fn new(scratch: ScratchContext, runner: SharedRunner, tables: SharedTables) -> Self {
        Self {
            scratch,
            runner,
            tables,
        }
    }
}

/// Run NDPPP on a patched copy of `parset`.
pub(crate) async fn run_ndppp(
    ctx: &StageContext,
    parset: &ParameterSet,
    overrides: &[(&str, String)],
) -> MsssResult<()> {
    let patched = parset.patch(overrides, &ctx.scratch)?;
    ctx.runner
        .run(&StageInvocation::new(executables::NDPPP).path_arg(patched.path()))
        .await
}

/// Run awimager on a patched copy of `parset`.
pub(crate) async fn run_awimager(
    ctx: &StageContext,
    parset: &ParameterSet,
    overrides: &[(&str, String)],
    initscript: Option<&Path>,
) -> MsssResult<()> {
    let patched = parset.patch(overrides, &ctx.scratch)?;
    ctx.runner
        .run(
            &StageInvocation::new(executables::AWIMAGER)
                .path_arg(patched.path())
                .initscript(initscript),
        )
        .await
}

pub(crate) fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockRunner, MockTables};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_patched_parset_released_after_failure() {
        let root = TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new().fail_on(executables::NDPPP));
        let ctx = StageContext::new(
            ScratchContext::new(root.path()).unwrap(),
            runner.clone(),
            Arc::new(MockTables::new()),
        );
        let parset = ParameterSet::from_pairs([("msin", "a"), ("msout", "b")]);

        let err = run_ndppp(&ctx, &parset, &[("msout", "/x/out.MS".to_string())])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            msss_shared::errors::MsssError::ProcessFailure { .. }
        ));
        let seen = runner.parsets_of(executables::NDPPP);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("msout"), Some("/x/out.MS"));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
