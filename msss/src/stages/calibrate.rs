use super::StageContext;
use super::constants::{executables, names};
use crate::process::StageInvocation;
use msss_shared::errors::MsssResult;
use std::path::Path;

/// Solve for calibration in place with `calibrate-stand-alone`.
///
/// `log_dir` becomes the tool's working directory.
pub async fn calibrate_standalone(
    ctx: &StageContext,
    parset: &Path,
    ms: &Path,
    skymodel: &Path,
    log_dir: &Path,
) -> MsssResult<()> {
    tracing::info!(ms = %ms.display(), skymodel = %skymodel.display(), "Calibrating");
    ctx.runner
        .run(
            &StageInvocation::new(executables::CALIBRATE)
                .path_arg(ms)
                .path_arg(parset)
                .path_arg(skymodel)
                .current_dir(log_dir),
        )
        .await
}

/// Clip outliers from the instrument database of `ms`.
pub async fn clip_parmdb(
    ctx: &StageContext,
    executable: &str,
    sigma: f64,
    ms: &Path,
) -> MsssResult<()> {
    ctx.runner
        .run(
            &StageInvocation::new(executable)
                .arg("--auto")
                .arg(format!("--sigma={:.6}", sigma))
                .path_arg(&ms.join(names::INSTRUMENT)),
        )
        .await
}

/// Apply the solutions of calibrator subband `cal` to target subband
/// `target`.
///
/// The exported solutions live in scratch for the duration of the call.
/// Both tools run from `log_dir`, so relative paths in `parset` resolve
/// against it.
pub async fn transfer_calibration(
    ctx: &StageContext,
    cal: &Path,
    target: &Path,
    parset: &Path,
    skymodel: &Path,
    log_dir: &Path,
) -> MsssResult<()> {
    tracing::info!(from = %cal.display(), to = %target.display(), "Transferring solutions");
    let parmdb = ctx.scratch.product(names::PARMDB)?;

    ctx.runner
        .run(
            &StageInvocation::new(executables::PARMEXPORTCAL)
                .key_value("in", format!("{}/{}/", cal.display(), names::INSTRUMENT))
                .key_value("out", parmdb.path().display())
                .current_dir(log_dir),
        )
        .await?;
    ctx.runner
        .run(
            &StageInvocation::new(executables::CALIBRATE)
                .arg("--parmdb")
                .path_arg(parmdb.path())
                .path_arg(target)
                .path_arg(parset)
                .path_arg(skymodel)
                .current_dir(log_dir),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratch::ScratchContext;
    use crate::testing::{MockRunner, MockTables};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(root: &TempDir, runner: Arc<MockRunner>) -> StageContext {
        StageContext::new(
            ScratchContext::new(root.path()).unwrap(),
            runner,
            Arc::new(MockTables::new()),
        )
    }

    #[tokio::test]
    async fn test_calibrate_argument_order() {
        let root = TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new());
        let ctx = context(&root, runner.clone());

        calibrate_standalone(
            &ctx,
            Path::new("/scratch/calcal"),
            Path::new("/out/cal/SB000.MS"),
            Path::new("/sky/3c196.skymodel"),
            Path::new("/out/cal"),
        )
        .await
        .unwrap();

        let calls = runner.invocations_of(executables::CALIBRATE);
        assert_eq!(
            calls[0].args,
            vec!["/out/cal/SB000.MS", "/scratch/calcal", "/sky/3c196.skymodel"]
        );
        assert_eq!(calls[0].current_dir.as_deref(), Some(Path::new("/out/cal")));
    }

    #[tokio::test]
    async fn test_clip_formats_sigma() {
        let root = TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new());
        let ctx = context(&root, runner.clone());

        clip_parmdb(&ctx, "pdbclip.py", 3.0, Path::new("/out/cal/SB000.MS"))
            .await
            .unwrap();

        let calls = runner.invocations_of("pdbclip.py");
        assert_eq!(
            calls[0].args,
            vec!["--auto", "--sigma=3.000000", "/out/cal/SB000.MS/instrument"]
        );
    }

    #[tokio::test]
    async fn test_transfer_exports_then_applies() {
        let root = TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new());
        let ctx = context(&root, runner.clone());

        transfer_calibration(
            &ctx,
            Path::new("/out/cal/SB000.MS"),
            Path::new("/scratch/beam0/SB000.MS"),
            Path::new("/scratch/transfer"),
            Path::new("/sky/transfer.skymodel"),
            Path::new("/out/cal"),
        )
        .await
        .unwrap();

        let export = &runner.invocations_of(executables::PARMEXPORTCAL)[0];
        assert_eq!(export.key_value_arg("in"), Some("/out/cal/SB000.MS/instrument/"));
        assert_eq!(export.current_dir.as_deref(), Some(Path::new("/out/cal")));
        let parmdb = export.key_value_arg("out").unwrap().to_string();

        let apply = &runner.invocations_of(executables::CALIBRATE)[0];
        assert_eq!(apply.arg_at(0), Some("--parmdb"));
        assert_eq!(apply.arg_at(1), Some(parmdb.as_str()));
        assert_eq!(apply.arg_at(2), Some("/scratch/beam0/SB000.MS"));
        assert_eq!(apply.current_dir.as_deref(), Some(Path::new("/out/cal")));
        assert!(!Path::new(&parmdb).exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
