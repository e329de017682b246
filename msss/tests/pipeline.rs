//! End-to-end runs of the driver against mock tools and tables.

use msss::stages::StageContext;
use msss::stages::constants::executables;
use msss::testing::{MockRunner, MockTable, MockTables};
use msss::{Driver, DriverOptions, MsssError, ParameterSet, PipelineConfig, ScratchContext};
use std::f64::consts::FRAC_PI_4;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const CAL: &str = "L100";
const TARGET: &str = "L101";

struct Fixture {
    input: TempDir,
    output: TempDir,
    skymodels: TempDir,
    scratch: TempDir,
}

impl Fixture {
    fn new(n_beams: usize, cal_subbands: &[u32], target_subbands: &[u32]) -> Self {
        let fixture = Self {
            input: TempDir::new().unwrap(),
            output: TempDir::new().unwrap(),
            skymodels: TempDir::new().unwrap(),
            scratch: TempDir::new().unwrap(),
        };
        for sb in cal_subbands {
            fixture.make_subband(CAL, 0, *sb);
        }
        for beam in 0..n_beams {
            for sb in target_subbands {
                fixture.make_subband(TARGET, beam, *sb);
            }
        }
        for name in [
            "3c196.skymodel",
            "90.00_45.00.skymodel",
            "transfer.skymodel",
            "init.sh",
        ] {
            std::fs::write(fixture.skymodels.path().join(name), "").unwrap();
        }
        fixture
    }

    fn make_subband(&self, obsid: &str, beam: usize, sb: u32) {
        let ms = self
            .input
            .path()
            .join(obsid)
            .join(format!("{}_SAP00{}_SB{:03}_uv.MS.dppp", obsid, beam, sb));
        std::fs::create_dir_all(ms.join("ANTENNA")).unwrap();
        std::fs::write(ms.join("table.dat"), b"visibilities").unwrap();
    }

    fn parset_text(&self, n_beams: usize) -> String {
        let sky = self.skymodels.path().display();
        format!(
            r#"
input_dir = {input}
output_dir = {output}
skymodel_dir = {sky}
cal_obsid = {CAL}
target_obsid = {TARGET}
n_beams = {n_beams}
calcal.parset.Strategy.Steps = [solve, correct]
pdbclip.executable = pdbclip.py
pdbclip.sigma = 3
transfer.parset.Strategy.Steps = [correct]
transfer.skymodel = {sky}/transfer.skymodel
combine.parset.msin = []
combine.parset.msout = ""
combine.parset.steps = []
phaseonly.parset.Strategy.Steps = [solve, correct]
limit.max_baseline = 3000
noise.parset.ms = ""
noise.parset.image = ""
noise.parset.wmax = 0
noise.parset.npix = 256
noise.multiplier = 5
noise.box_size = 25
image.parset.ms = ""
image.parset.mask = ""
image.parset.threshold = 0Jy
image.parset.image = ""
image.parset.wmax = 0
image.parset.cellsize = 60arcsec
image.parset.npix = 1024
image.parset.stokes = I
make_mask.executable = msss_mask.py
awimager.initscript = {sky}/init.sh
"#,
            input = self.input.path().display(),
            output = self.output.path().display(),
        )
    }

    fn config(&self, text: &str) -> PipelineConfig {
        let parset = ParameterSet::parse(text, Path::new("pipeline.parset")).unwrap();
        PipelineConfig::from_parset(&parset).unwrap()
    }

    fn driver(
        &self,
        config: PipelineConfig,
        runner: Arc<MockRunner>,
        tables: Arc<MockTables>,
        options: DriverOptions,
    ) -> Driver {
        let stages = StageContext::new(
            ScratchContext::new(self.scratch.path()).unwrap(),
            runner,
            tables,
        );
        Driver::new(config, stages, options)
    }

    fn beam_dir(&self, beam: usize) -> PathBuf {
        self.output
            .path()
            .join("target")
            .join(TARGET)
            .join(format!("SAP00{}", beam))
    }

    fn calibrator_dir(&self) -> PathBuf {
        self.output.path().join("calibrator").join(CAL)
    }

    fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.path()).unwrap().count()
    }
}

fn jobs(n: usize) -> DriverOptions {
    DriverOptions {
        jobs: Some(n),
        lofar_root: None,
    }
}

#[tokio::test]
async fn test_single_beam_run() {
    let fixture = Fixture::new(1, &[0, 1, 2], &[0, 1, 2]);
    let runner = Arc::new(
        MockRunner::new()
            .with_delay(Duration::from_millis(5))
            .with_stats_table("# station\n0 CS001 1.0 False\n1 CS002 7.5 True\n2 RS106 0.9 False\n"),
    );
    let tables = Arc::new(MockTables::new());
    let config = fixture.config(&fixture.parset_text(1));
    let driver = fixture.driver(config, runner.clone(), tables.clone(), jobs(2));

    let summary = driver.run().await.unwrap();

    let output_ms = fixture.beam_dir(0).join("L101.MS");
    let output_image = fixture.beam_dir(0).join("L101.img");
    assert_eq!(summary.beams.len(), 1);
    assert_eq!(summary.beams[0].measurement_set, output_ms);
    assert_eq!(summary.beams[0].image, output_image);
    assert!(output_ms.exists());
    assert!(output_image.exists());

    // Each calibrator subband is calibrated exactly once.
    let cal_dir = fixture.calibrator_dir();
    let mut calibrated: Vec<String> = runner
        .invocations_of(executables::CALIBRATE)
        .iter()
        .filter_map(|inv| inv.arg_at(0).map(str::to_string))
        .filter(|ms| Path::new(ms).starts_with(&cal_dir))
        .collect();
    assert_eq!(calibrated.len(), 3);
    calibrated.sort();
    calibrated.dedup();
    assert_eq!(calibrated.len(), 3);
    for inv in runner.invocations_of(executables::CALIBRATE).iter().take(3) {
        assert_eq!(inv.current_dir.as_deref(), Some(cal_dir.as_path()));
    }

    // Three transfers, one phase-only run.
    assert_eq!(runner.invocations_of(executables::PARMEXPORTCAL).len(), 3);
    assert_eq!(runner.invocations_of(executables::CALIBRATE).len(), 7);
    assert_eq!(runner.invocations_of("pdbclip.py").len(), 3);

    assert!(runner.peak_concurrency() <= 2);
    for stage in &summary.metrics.stages {
        assert!(stage.peak_parallelism <= 2, "stage {} too wide", stage.name);
    }

    let order: Vec<&str> = summary.metrics.stages.iter().map(|s| s.name).collect();
    assert_eq!(
        order,
        vec![
            "stage_inputs",
            "calibrate_calibrator",
            "clip_calibrator",
            "transfer_calibration",
            "combine",
            "phase_only_calibration",
            "strip_bad_stations",
            "limit_baselines",
            "estimate_noise",
            "make_mask",
            "image",
        ]
    );

    // The deliverable carries no row touching the bad station.
    let delivered = tables.table(&output_ms).unwrap();
    assert!(!delivered.rows.is_empty());
    for row in &delivered.rows {
        assert_ne!(delivered.antenna_names[row.antenna1], "CS002");
        assert_ne!(delivered.antenna_names[row.antenna2], "CS002");
    }

    // The combiner saw all three staged subbands.
    let combine = &runner.parsets_of(executables::NDPPP)[0];
    assert_eq!(combine.get_string_vec("msin").unwrap().len(), 3);

    // Checkerboard noise is close to 1 Jy; the threshold is five times it.
    let image = runner.parsets_of(executables::AWIMAGER).pop().unwrap();
    let threshold: f64 = image
        .get("threshold")
        .and_then(|t| t.strip_suffix("Jy"))
        .unwrap()
        .parse()
        .unwrap();
    assert!((threshold - 5.0).abs() < 1e-3, "threshold {threshold}");
    assert_eq!(image.get("image"), output_image.to_str());
    for inv in runner.invocations_of(executables::AWIMAGER) {
        assert!(inv.initscript.is_some());
    }

    assert!(cal_dir.join("L100_SAP000_SB000_uv.MS.dppp/table.dat").exists());
    assert_eq!(fixture.scratch_entries(), 0);
}

#[tokio::test]
async fn test_existing_output_fails_preflight() {
    let fixture = Fixture::new(1, &[0, 1, 2], &[0, 1, 2]);
    std::fs::create_dir_all(fixture.beam_dir(0).join("L101.MS")).unwrap();
    let runner = Arc::new(MockRunner::new());
    let config = fixture.config(&fixture.parset_text(1));
    let driver = fixture.driver(config, runner.clone(), Arc::new(MockTables::new()), jobs(2));

    let err = driver.run().await.unwrap_err();

    assert!(matches!(err, MsssError::Path(_)), "got {err:?}");
    assert!(runner.invocations().is_empty());
    assert!(!fixture.calibrator_dir().exists());
    assert_eq!(fixture.scratch_entries(), 0);
}

#[tokio::test]
async fn test_mismatched_subbands_fail_preflight() {
    let fixture = Fixture::new(1, &[0, 1, 2], &[0, 1, 3]);
    let runner = Arc::new(MockRunner::new());
    let config = fixture.config(&fixture.parset_text(1));
    let driver = fixture.driver(config, runner.clone(), Arc::new(MockTables::new()), jobs(2));

    let err = driver.run().await.unwrap_err();

    assert!(matches!(err, MsssError::DataShape(_)), "got {err:?}");
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn test_missing_skymodel_fails_preflight() {
    let fixture = Fixture::new(1, &[0, 1], &[0, 1]);
    std::fs::remove_file(fixture.skymodels.path().join("3c196.skymodel")).unwrap();
    let runner = Arc::new(MockRunner::new());
    let config = fixture.config(&fixture.parset_text(1));
    let driver = fixture.driver(config, runner.clone(), Arc::new(MockTables::new()), jobs(2));

    let err = driver.run().await.unwrap_err();
    assert!(err.to_string().contains("3c196.skymodel"));
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn test_tool_failure_stops_the_run() {
    let fixture = Fixture::new(2, &[0, 1, 2], &[0, 1, 2]);
    let runner = Arc::new(MockRunner::new().fail_on(executables::PARMEXPORTCAL));
    let config = fixture.config(&fixture.parset_text(2));
    let driver = fixture.driver(config, runner.clone(), Arc::new(MockTables::new()), jobs(2));

    let err = driver.run().await.unwrap_err();

    assert!(matches!(
        err,
        MsssError::ProcessFailure { ref executable, code: Some(1) } if executable == "parmexportcal"
    ));
    // Combining never starts.
    assert!(runner.invocations_of(executables::NDPPP).is_empty());
    assert!(!fixture.beam_dir(0).join("L101.MS").exists());
    assert_eq!(fixture.scratch_entries(), 0);
}

#[tokio::test]
async fn test_two_beams_share_calibrator() {
    let fixture = Fixture::new(2, &[0, 1, 2], &[0, 1, 2]);
    let runner = Arc::new(MockRunner::new().with_delay(Duration::from_millis(2)));
    let config = fixture.config(&fixture.parset_text(2));
    let driver = fixture.driver(config, runner.clone(), Arc::new(MockTables::new()), jobs(4));

    let summary = driver.run().await.unwrap();

    assert_eq!(summary.beams.len(), 2);
    for beam in 0..2 {
        assert!(fixture.beam_dir(beam).join("L101.MS").exists());
        assert!(fixture.beam_dir(beam).join("L101.img").exists());
    }
    assert_eq!(runner.invocations_of(executables::PARMEXPORTCAL).len(), 6);
    assert_eq!(runner.invocations_of(executables::NDPPP).len(), 2);

    let transfer = summary.metrics.stage("transfer_calibration").unwrap();
    assert_eq!(transfer.tasks.len(), 6);
    assert!(transfer.peak_parallelism <= 4);
    let image = summary.metrics.stage("image").unwrap();
    assert_eq!(image.peak_parallelism, 1);
    assert_eq!(fixture.scratch_entries(), 0);
}

#[tokio::test]
async fn test_each_beam_self_calibrates_against_its_own_pointing() {
    let fixture = Fixture::new(2, &[0, 1], &[0, 1]);
    let offset_pointing = fixture.skymodels.path().join("45.00_45.00.skymodel");
    std::fs::write(&offset_pointing, "").unwrap();
    let tables = Arc::new(MockTables::new());
    tables.insert(
        fixture.input.path().join(TARGET).join("L101_SAP001_SB000_uv.MS.dppp"),
        MockTable::default().with_reference_direction(FRAC_PI_4, FRAC_PI_4),
    );
    let runner = Arc::new(MockRunner::new());
    let config = fixture.config(&format!(
        "{}phaseonly.skymodel = {}/3c196.skymodel\n",
        fixture.parset_text(2),
        fixture.skymodels.path().display()
    ));
    let driver = fixture.driver(config, runner.clone(), tables, jobs(2));

    driver.run().await.unwrap();

    let calls = runner.invocations_of(executables::CALIBRATE);
    let expected = [
        fixture.skymodels.path().join("90.00_45.00.skymodel"),
        offset_pointing,
    ];
    for (beam, skymodel) in expected.iter().enumerate() {
        let beam_dir = fixture.beam_dir(beam);
        let phase_only: Vec<_> = calls
            .iter()
            .filter(|inv| inv.current_dir.as_deref() == Some(beam_dir.as_path()))
            .collect();
        assert_eq!(phase_only.len(), 1, "beam {beam}");
        assert_eq!(phase_only[0].arg_at(2), skymodel.to_str(), "beam {beam}");
    }

    // Solution transfer runs from the calibrator directory.
    let cal_dir = fixture.calibrator_dir();
    let transfers: Vec<_> = calls
        .iter()
        .filter(|inv| inv.arg_at(0) == Some("--parmdb"))
        .collect();
    assert_eq!(transfers.len(), 4);
    let exports = runner.invocations_of(executables::PARMEXPORTCAL);
    for inv in transfers.into_iter().chain(exports.iter()) {
        assert_eq!(inv.current_dir.as_deref(), Some(cal_dir.as_path()));
    }
}

#[tokio::test]
async fn test_flagging_uses_installed_strategy() {
    let fixture = Fixture::new(1, &[0, 1], &[0, 1]);
    let lofar_root = TempDir::new().unwrap();
    let strategy = lofar_root.path().join("share/rfistrategies/LBAdefault");
    std::fs::create_dir_all(strategy.parent().unwrap()).unwrap();
    std::fs::write(&strategy, "").unwrap();

    let text = format!(
        "{}\nflag.parset.msin = \"\"\nflag.parset.msout = \"\"\nflag.parset.aoflagger.strategy = \"\"\nflag.parset.steps = [aoflagger, avg]\n",
        fixture.parset_text(1)
    );
    let runner = Arc::new(MockRunner::new());
    let driver = fixture.driver(
        fixture.config(&text),
        runner.clone(),
        Arc::new(MockTables::new()),
        DriverOptions {
            jobs: Some(2),
            lofar_root: Some(lofar_root.path().to_path_buf()),
        },
    );

    driver.run().await.unwrap();

    let ndppp = runner.parsets_of(executables::NDPPP);
    // two calibrator and two target subbands flagged, one combine
    assert_eq!(ndppp.len(), 5);
    for flagged in &ndppp[..4] {
        assert_eq!(flagged.get("aoflagger.strategy"), strategy.to_str());
    }
    let in_output_tree = ndppp[..4]
        .iter()
        .filter(|p| Path::new(p.get("msout").unwrap()).starts_with(fixture.calibrator_dir()))
        .count();
    assert_eq!(in_output_tree, 2);
    assert_eq!(fixture.scratch_entries(), 0);
}

#[tokio::test]
async fn test_flagging_without_strategy_is_a_config_error() {
    let fixture = Fixture::new(1, &[0], &[0]);
    let text = format!(
        "{}\nflag.parset.msin = \"\"\nflag.parset.msout = \"\"\nflag.parset.aoflagger.strategy = \"\"\n",
        fixture.parset_text(1)
    );
    let runner = Arc::new(MockRunner::new());
    let driver = fixture.driver(
        fixture.config(&text),
        runner.clone(),
        Arc::new(MockTables::new()),
        jobs(1),
    );

    let err = driver.run().await.unwrap_err();
    assert!(matches!(err, MsssError::Config(_)));
    assert!(runner.invocations().is_empty());
}
