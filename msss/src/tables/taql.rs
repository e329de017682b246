//! Table access through the casacore `taql` command-line tool.
//!
//! Queries use Python style (0-based, C-order axes), matching the indices
//! used everywhere else in the pipeline. Values are read back from the
//! tool's stdout with headers suppressed.

use super::{CopyMode, ImageWindow, RowFilter, TableAccessor};
use crate::process::{SharedRunner, StageInvocation};
use async_trait::async_trait;
use msss_shared::errors::{MsssError, MsssResult};
use ndarray::Array2;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub const DEFAULT_TAQL_EXECUTABLE: &str = "taql";

/// [`TableAccessor`] backed by the `taql` executable.
pub struct TaqlTables {
    runner: SharedRunner,
    executable: String,
}

impl TaqlTables {
    pub fn new(runner: SharedRunner, executable: impl Into<String>) -> Self {
        Self {
            runner,
            executable: executable.into(),
        }
    }

    fn invocation(&self, query: String) -> StageInvocation {
        StageInvocation::new(&self.executable)
            .arg("-noph")
            .arg(format!("using style python {}", query))
    }

    async fn query(&self, query: String) -> MsssResult<String> {
        self.runner.capture(&self.invocation(query)).await
    }

    async fn query_floats(&self, query: String) -> MsssResult<Vec<f64>> {
        let output = self.query(query).await?;
        Ok(parse_floats(&output))
    }
}

fn quoted(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

/// Lines carrying values, without the row-count summary taql prints.
fn value_lines(output: &str) -> impl Iterator<Item = &str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains("result of"))
}

fn parse_floats(output: &str) -> Vec<f64> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let number = NUMBER.get_or_init(|| {
        Regex::new(r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?|[-+]?(?:nan|inf)")
            .unwrap_or_else(|e| unreachable!("invalid number pattern: {e}"))
    });
    value_lines(output)
        .flat_map(|line| number.find_iter(line))
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

fn strip_value(value: &str) -> &str {
    value
        .trim_matches(|c: char| c == '[' || c == ']' || c.is_whitespace())
        .trim_matches(|c| c == '"' || c == '\'')
}

#[async_trait]
impl TableAccessor for TaqlTables {
    async fn reference_direction(&self, ms: &Path) -> MsssResult<(f64, f64)> {
        let values = self
            .query_floats(format!(
                "select REFERENCE_DIR from {} limit 1",
                quoted(&ms.join("FIELD"))
            ))
            .await?;
        match values.as_slice() {
            [ra, dec, ..] => Ok((*ra, *dec)),
            _ => Err(MsssError::Table(format!(
                "no REFERENCE_DIR in {}/FIELD",
                ms.display()
            ))),
        }
    }

    async fn observation_target(&self, ms: &Path) -> MsssResult<String> {
        let output = self
            .query(format!(
                "select LOFAR_TARGET from {} limit 1",
                quoted(&ms.join("OBSERVATION"))
            ))
            .await?;
        value_lines(&output)
            .next()
            .and_then(|line| line.split(',').next())
            .map(|first| strip_value(first).to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                MsssError::Table(format!("no LOFAR_TARGET in {}/OBSERVATION", ms.display()))
            })
    }

    async fn copy_filtered(
        &self,
        msin: &Path,
        msout: &Path,
        filter: &RowFilter,
        mode: CopyMode,
    ) -> MsssResult<()> {
        let mut query = format!("select from {}", quoted(msin));
        if let Some(predicate) = filter.to_taql() {
            query.push_str(&format!(" where {}", predicate));
        }
        query.push_str(&format!(" giving {}", quoted(msout)));
        if mode == CopyMode::Deep {
            query.push_str(" as plain");
        }
        self.runner.run(&self.invocation(query)).await
    }

    async fn image_window(&self, image: &Path, window: ImageWindow) -> MsssResult<Array2<f64>> {
        let values = self
            .query_floats(format!(
                "select map[0, {plane}, {start}:{end}, {start}:{end}] from {image}",
                plane = window.plane,
                start = window.start,
                end = window.end(),
                image = quoted(image),
            ))
            .await?;
        let expected = window.size * window.size;
        if values.len() != expected {
            return Err(MsssError::Table(format!(
                "expected {} pixels from {}, got {}",
                expected,
                image.display(),
                values.len()
            )));
        }
        Array2::from_shape_vec((window.size, window.size), values)
            .map_err(|e| MsssError::Table(format!("bad image window shape: {}", e)))
    }
}
