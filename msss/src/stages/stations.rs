//! Bad-station detection and removal.

use super::StageContext;
use super::constants::{executables, names};
use crate::process::StageInvocation;
use crate::tables::{CopyMode, RowFilter};
use msss_shared::errors::{MsssError, MsssResult};
use std::path::Path;

/// Run the station statistics tools on `ms` and return the stations they
/// mark as bad.
///
/// Statistics are written to a private scratch directory, so concurrent
/// calls never see each other's tables.
pub async fn find_bad_stations(ctx: &StageContext, ms: &Path) -> MsssResult<Vec<String>> {
    let statsdir = ctx.scratch.dir()?;
    let basename = ms
        .file_name()
        .ok_or_else(|| MsssError::Path(format!("no file name in {}", ms.display())))?;

    ctx.runner
        .run(
            &StageInvocation::new(executables::ASCIISTATS)
                .arg("-i")
                .path_arg(ms)
                .arg("-r")
                .path_arg(statsdir.path()),
        )
        .await?;

    let mut statsfile = basename.to_os_string();
    statsfile.push(names::STATS_SUFFIX);
    let prefix = statsdir.join(names::STATS_PREFIX);
    ctx.runner
        .run(
            &StageInvocation::new(executables::STATSPLOT)
                .arg("-i")
                .path_arg(&statsdir.join(statsfile))
                .arg("-o")
                .path_arg(&prefix),
        )
        .await?;

    let table = statsdir.join(format!("{}{}", names::STATS_PREFIX, names::STATS_TABLE_SUFFIX));
    let text = tokio::fs::read_to_string(&table)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MsssError::Parse {
                path: table.clone(),
                line: 0,
                message: "statistics table was not produced".into(),
            },
            _ => MsssError::Io(e),
        })?;
    let bad = parse_stats_table(&text, &table)?;
    tracing::info!(ms = %ms.display(), bad = ?bad, "Found bad stations");
    Ok(bad)
}

/// Parse a whitespace-separated station table.
///
/// Blank lines and `#` comments are skipped. Every other row must have at
/// least two columns and end in `True` or `False`; rows ending in `True`
/// contribute their second column.
pub fn parse_stats_table(text: &str, origin: &Path) -> MsssResult<Vec<String>> {
    let mut bad = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() < 2 {
            return Err(MsssError::parse(origin, index + 1, "expected at least two columns"));
        }
        match columns[columns.len() - 1] {
            "True" => bad.push(columns[1].to_string()),
            "False" => {}
            other => {
                return Err(MsssError::parse(
                    origin,
                    index + 1,
                    format!("expected True or False in last column, got {:?}", other),
                ));
            }
        }
    }
    Ok(bad)
}

/// Deep-copy `msin` to `msout` without any row touching `stations`.
///
/// An empty station list copies everything.
pub async fn strip_stations(
    ctx: &StageContext,
    msin: &Path,
    msout: &Path,
    stations: &[String],
) -> MsssResult<()> {
    ctx.tables
        .copy_filtered(msin, msout, &RowFilter::exclude_stations(stations), CopyMode::Deep)
        .await
}
