use super::{StageContext, display, run_ndppp};
use crate::parset::ParameterSet;
use msss_shared::errors::MsssResult;
use std::path::{Path, PathBuf};

/// Flag and compress `msin` into `msout` with NDPPP.
///
/// `parset` must define `msin`, `msout` and `aoflagger.strategy`. Returns
/// the path NDPPP was told to write.
pub async fn flag_and_compress(
    ctx: &StageContext,
    parset: &ParameterSet,
    strategy: &Path,
    msin: &Path,
    msout: &Path,
) -> MsssResult<PathBuf> {
    tracing::debug!(msin = %msin.display(), msout = %msout.display(), "Flagging subband");
    run_ndppp(
        ctx,
        parset,
        &[
            ("msin", display(msin)),
            ("msout", display(msout)),
            ("aoflagger.strategy", display(strategy)),
        ],
    )
    .await?;
    Ok(msout.to_path_buf())
}
