use super::StageContext;
use crate::tables::{CopyMode, RowFilter};
use msss_shared::errors::{MsssError, MsssResult};
use std::path::Path;

/// Shallow-copy the rows of `msin` whose projected baseline is strictly
/// shorter than `max_baseline` metres.
pub async fn limit_baselines(
    ctx: &StageContext,
    msin: &Path,
    msout: &Path,
    max_baseline: f64,
) -> MsssResult<()> {
    if max_baseline.is_nan() || max_baseline <= 0.0 {
        return Err(MsssError::Config(format!(
            "maximum baseline must be positive, got {}",
            max_baseline
        )));
    }
    ctx.tables
        .copy_filtered(
            msin,
            msout,
            &RowFilter::MaxBaseline(max_baseline),
            CopyMode::Shallow,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratch::ScratchContext;
    use crate::tables::VisRow;
    use crate::testing::{MockRunner, MockTable, MockTables};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_limit_excludes_boundary() {
        let root = TempDir::new().unwrap();
        let tables = Arc::new(MockTables::new());
        let rows = vec![
            VisRow { antenna1: 0, antenna2: 1, uvw: [600.0, 800.0, 5.0] },
            VisRow { antenna1: 0, antenna2: 2, uvw: [600.0, 799.0, 5.0] },
            VisRow { antenna1: 1, antenna2: 2, uvw: [2000.0, 0.0, 0.0] },
        ];
        tables.insert("/in.MS", MockTable::new(vec!["A".into(), "B".into(), "C".into()], rows));
        let ctx = StageContext::new(
            ScratchContext::new(root.path()).unwrap(),
            Arc::new(MockRunner::new()),
            tables.clone(),
        );

        let msout = root.path().join("limited.MS");
        limit_baselines(&ctx, Path::new("/in.MS"), &msout, 1000.0)
            .await
            .unwrap();

        let limited = tables.table(&msout).unwrap();
        assert_eq!(limited.rows.len(), 1);
        assert_eq!(limited.rows[0].antenna2, 2);
        assert_eq!(tables.copies()[0].mode, CopyMode::Shallow);
    }

    #[tokio::test]
    async fn test_limit_rejects_non_positive_baseline() {
        let root = TempDir::new().unwrap();
        let ctx = StageContext::new(
            ScratchContext::new(root.path()).unwrap(),
            Arc::new(MockRunner::new()),
            Arc::new(MockTables::new()),
        );
        assert!(
            limit_baselines(&ctx, Path::new("/in.MS"), Path::new("/out.MS"), 0.0)
                .await
                .is_err()
        );
    }
}
