//! Test doubles for the external collaborators.
//!
//! [`MockRunner`] stands in for the external tools. It records every
//! invocation, keeps a copy of every parset it was handed, and writes the
//! outputs each tool declares so downstream stages find them on disk.
//! [`MockTables`] is an in-memory measurement-set store that applies row
//! filters with their real semantics.

use crate::parset::ParameterSet;
use crate::process::{ProcessRunner, StageInvocation};
use crate::stages::constants::{executables, names};
use crate::tables::{CopyMode, ImageWindow, RowFilter, TableAccessor, VisRow};
use async_trait::async_trait;
use msss_shared::errors::{MsssError, MsssResult};
use ndarray::{Array2, s};
use std::collections::{HashMap, HashSet};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn create_output(path: &Path) -> MsssResult<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        MsssError::Storage(format!("mock output {}: {}", path.display(), e))
    })
}

/// Default station table written by the mock statistics plotter.
pub const DEFAULT_STATS_TABLE: &str = "# station statistics\n0 CS001 0.9 1.1 False\n1 CS002 1.0 0.9 False\n";

/// Scripted [`ProcessRunner`].
pub struct MockRunner {
    invocations: Mutex<Vec<StageInvocation>>,
    parsets: Mutex<Vec<(String, ParameterSet)>>,
    failing: HashSet<String>,
    capture_output: HashMap<String, String>,
    stats_table: Option<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            parsets: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            capture_output: HashMap::new(),
            stats_table: Some(DEFAULT_STATS_TABLE.to_string()),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Make every call of `executable` exit with status 1.
    pub fn fail_on(mut self, executable: &str) -> Self {
        self.failing.insert(executable.to_string());
        self
    }

    /// Stdout returned by `capture` for `executable`.
    pub fn with_capture_output(mut self, executable: &str, output: &str) -> Self {
        self.capture_output
            .insert(executable.to_string(), output.to_string());
        self
    }

    /// Station table the statistics plotter writes.
    pub fn with_stats_table(mut self, table: &str) -> Self {
        self.stats_table = Some(table.to_string());
        self
    }

    /// Make the statistics plotter exit cleanly without writing a table.
    pub fn without_stats_table(mut self) -> Self {
        self.stats_table = None;
        self
    }

    /// Time every invocation takes.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn invocations(&self) -> Vec<StageInvocation> {
        lock(&self.invocations).clone()
    }

    pub fn invocations_of(&self, executable: &str) -> Vec<StageInvocation> {
        lock(&self.invocations)
            .iter()
            .filter(|inv| inv.executable == executable)
            .cloned()
            .collect()
    }

    /// Parsets handed to `executable`, read while the call was running.
    pub fn parsets_of(&self, executable: &str) -> Vec<ParameterSet> {
        lock(&self.parsets)
            .iter()
            .filter(|(exe, _)| exe == executable)
            .map(|(_, parset)| parset.clone())
            .collect()
    }

    /// Most invocations that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self, invocation: &StageInvocation) -> MsssResult<()> {
        lock(&self.invocations).push(invocation.clone());
        if let Some(parset) = self.parset_argument(invocation)? {
            lock(&self.parsets).push((invocation.executable.clone(), parset));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&invocation.executable) {
            return Err(MsssError::ProcessFailure {
                executable: invocation.executable.clone(),
                code: Some(1),
            });
        }
        Ok(())
    }

    /// NDPPP and awimager take a parset file as their only argument.
    fn parset_argument(&self, invocation: &StageInvocation) -> MsssResult<Option<ParameterSet>> {
        let takes_parset = matches!(
            invocation.executable.as_str(),
            executables::NDPPP | executables::AWIMAGER
        );
        match invocation.arg_at(0) {
            Some(arg) if takes_parset && invocation.args.len() == 1 && !arg.contains('=') => {
                ParameterSet::load(arg).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn simulate(&self, invocation: &StageInvocation) -> MsssResult<()> {
        match invocation.executable.as_str() {
            executables::NDPPP => {
                if let Some(parset) = self.parset_argument(invocation)? {
                    if let Some(msout) = parset.get("msout").filter(|v| !v.is_empty()) {
                        create_output(Path::new(msout))?;
                    }
                }
            }
            executables::AWIMAGER => {
                let image = match invocation.key_value_arg("image") {
                    Some(image) => Some(image.to_string()),
                    None => self
                        .parset_argument(invocation)?
                        .and_then(|parset| parset.get("image").map(str::to_string)),
                };
                if let Some(image) = image.filter(|v| !v.is_empty()) {
                    create_output(Path::new(&image))?;
                }
            }
            executables::MAKESOURCEDB | executables::PARMEXPORTCAL => {
                if let Some(out) = invocation.key_value_arg("out") {
                    create_output(Path::new(out))?;
                }
            }
            executables::ASCIISTATS => {
                if let (Some(ms), Some(dir)) = (flag_value(invocation, "-i"), flag_value(invocation, "-r")) {
                    let basename = Path::new(ms)
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    create_output(Path::new(dir))?;
                    let stats = Path::new(dir).join(format!("{}{}", basename, names::STATS_SUFFIX));
                    std::fs::write(&stats, "")?;
                }
            }
            executables::STATSPLOT => {
                if let (Some(prefix), Some(table)) = (flag_value(invocation, "-o"), &self.stats_table) {
                    std::fs::write(format!("{}{}", prefix, names::STATS_TABLE_SUFFIX), table)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Argument following `flag`.
fn flag_value<'a>(invocation: &'a StageInvocation, flag: &str) -> Option<&'a str> {
    invocation
        .args
        .iter()
        .position(|arg| arg == flag)
        .and_then(|i| invocation.arg_at(i + 1))
}

#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(&self, invocation: &StageInvocation) -> MsssResult<()> {
        self.enter(invocation).await?;
        self.simulate(invocation)
    }

    async fn capture(&self, invocation: &StageInvocation) -> MsssResult<String> {
        self.enter(invocation).await?;
        Ok(self
            .capture_output
            .get(&invocation.executable)
            .cloned()
            .unwrap_or_default())
    }
}

/// One in-memory measurement set.
#[derive(Debug, Clone, PartialEq)]
pub struct MockTable {
    pub antenna_names: Vec<String>,
    pub rows: Vec<VisRow>,
    /// `(ra, dec)` in radians.
    pub reference_direction: (f64, f64),
    pub target: String,
}

impl MockTable {
    /// Table pointing at (90, 45) degrees and observing "3C 196".
    pub fn new(antenna_names: Vec<String>, rows: Vec<VisRow>) -> Self {
        Self {
            antenna_names,
            rows,
            reference_direction: (FRAC_PI_2, FRAC_PI_4),
            target: "3C 196".to_string(),
        }
    }

    pub fn with_reference_direction(mut self, ra: f64, dec: f64) -> Self {
        self.reference_direction = (ra, dec);
        self
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = target.to_string();
        self
    }
}

impl Default for MockTable {
    fn default() -> Self {
        let names = vec!["CS001".to_string(), "CS002".to_string(), "RS106".to_string()];
        let rows = vec![
            VisRow { antenna1: 0, antenna2: 1, uvw: [120.0, 40.0, 1.0] },
            VisRow { antenna1: 0, antenna2: 2, uvw: [2500.0, 900.0, 3.0] },
            VisRow { antenna1: 1, antenna2: 2, uvw: [2380.0, 860.0, 2.0] },
        ];
        Self::new(names, rows)
    }
}

/// A recorded `copy_filtered` call.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyRecord {
    pub msin: PathBuf,
    pub msout: PathBuf,
    pub filter: RowFilter,
    pub mode: CopyMode,
}

/// In-memory [`TableAccessor`].
///
/// Paths that were never inserted or produced by a copy resolve to the
/// fallback table, so tool outputs the store never saw still answer
/// queries.
pub struct MockTables {
    tables: Mutex<HashMap<PathBuf, MockTable>>,
    fallback: MockTable,
    image_plane: Option<Array2<f64>>,
    copies: Mutex<Vec<CopyRecord>>,
    windows: Mutex<Vec<ImageWindow>>,
}

impl Default for MockTables {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTables {
    pub fn new() -> Self {
        Self::with_fallback(MockTable::default())
    }

    pub fn with_fallback(fallback: MockTable) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            fallback,
            image_plane: None,
            copies: Mutex::new(Vec::new()),
            windows: Mutex::new(Vec::new()),
        }
    }

    /// Pixels every image returns for its noise plane. Without one, windows
    /// are a unit-amplitude checkerboard.
    pub fn with_image_plane(mut self, plane: Array2<f64>) -> Self {
        self.image_plane = Some(plane);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, table: MockTable) {
        lock(&self.tables).insert(path.into(), table);
    }

    pub fn table(&self, path: &Path) -> Option<MockTable> {
        lock(&self.tables).get(path).cloned()
    }

    pub fn copies(&self) -> Vec<CopyRecord> {
        lock(&self.copies).clone()
    }

    pub fn windows(&self) -> Vec<ImageWindow> {
        lock(&self.windows).clone()
    }

    fn resolve(&self, path: &Path) -> MockTable {
        self.table(path).unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl TableAccessor for MockTables {
    async fn reference_direction(&self, ms: &Path) -> MsssResult<(f64, f64)> {
        Ok(self.resolve(ms).reference_direction)
    }

    async fn observation_target(&self, ms: &Path) -> MsssResult<String> {
        Ok(self.resolve(ms).target)
    }

    async fn copy_filtered(
        &self,
        msin: &Path,
        msout: &Path,
        filter: &RowFilter,
        mode: CopyMode,
    ) -> MsssResult<()> {
        let source = self.resolve(msin);
        let rows = source
            .rows
            .iter()
            .filter(|row| filter.accepts(row, &source.antenna_names))
            .copied()
            .collect();
        create_output(msout)?;
        self.insert(msout, MockTable { rows, ..source });
        lock(&self.copies).push(CopyRecord {
            msin: msin.to_path_buf(),
            msout: msout.to_path_buf(),
            filter: filter.clone(),
            mode,
        });
        Ok(())
    }

    async fn image_window(&self, image: &Path, window: ImageWindow) -> MsssResult<Array2<f64>> {
        lock(&self.windows).push(window);
        match &self.image_plane {
            Some(plane) => {
                let (rows, cols) = plane.dim();
                if window.end() > rows || window.end() > cols {
                    return Err(MsssError::Table(format!(
                        "window {:?} outside {}",
                        window,
                        image.display()
                    )));
                }
                Ok(plane
                    .slice(s![window.start..window.end(), window.start..window.end()])
                    .to_owned())
            }
            None => Ok(Array2::from_shape_fn((window.size, window.size), |(i, j)| {
                if (i + j) % 2 == 0 { 1.0 } else { -1.0 }
            })),
        }
    }
}
