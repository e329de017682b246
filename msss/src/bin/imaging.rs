//! msss-imaging: run the multi-beam imaging pipeline.
//!
//! ```bash
//! TMPDIR=/scratch LOFARROOT=/opt/lofar msss-imaging imaging.parset
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use msss::process::SystemRunner;
use msss::stages::StageContext;
use msss::tables::TaqlTables;
use msss::{Driver, DriverOptions, ParameterSet, PipelineConfig, ScratchContext};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "msss-imaging", version, about = "Calibrate and image a multi-beam observation")]
struct Args {
    /// Top-level parameter set
    parset: PathBuf,

    /// Node-local scratch directory
    #[arg(long, env = "TMPDIR")]
    scratch_dir: PathBuf,

    /// Installation root holding the default flagging strategy
    #[arg(long, env = "LOFARROOT")]
    lofar_root: Option<PathBuf>,

    /// Concurrent external tools (default: available cores)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    msss::init_logging(args.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let parset = ParameterSet::load(&args.parset)
        .with_context(|| format!("Failed to read {}", args.parset.display()))?;
    let config = PipelineConfig::from_parset(&parset).context("Invalid pipeline parset")?;
    let scratch = ScratchContext::new(&args.scratch_dir).context("Invalid scratch directory")?;

    let runner = SystemRunner::shared();
    let tables = Arc::new(TaqlTables::new(runner.clone(), &config.taql_executable));
    let stages = StageContext::new(scratch, runner, tables);
    let driver = Driver::new(
        config,
        stages,
        DriverOptions {
            jobs: args.jobs,
            lofar_root: args.lofar_root,
        },
    );

    let summary = driver.run().await.context("Imaging pipeline failed")?;
    for beam in &summary.beams {
        tracing::info!(
            beam = beam.beam,
            ms = %beam.measurement_set.display(),
            image = %beam.image.display(),
            "Beam complete"
        );
    }
    tracing::info!(run_id = %summary.run_id, "Run complete");
    Ok(())
}
