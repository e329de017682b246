use super::{StageContext, display, run_awimager};
use crate::parset::ParameterSet;
use msss_shared::errors::MsssResult;
use std::path::{Path, PathBuf};

/// Inputs of the final imaging call for one beam.
#[derive(Debug, Clone, Copy)]
pub struct ImageRequest<'a> {
    pub ms: &'a Path,
    pub mask: &'a Path,
    /// Clean threshold in Jy.
    pub threshold: f64,
    pub wmax: f64,
    pub output: &'a Path,
}

/// Clean-image `request.ms` into `request.output`.
///
/// `parset` must define `ms`, `mask`, `threshold`, `image` and `wmax`.
pub async fn image(
    ctx: &StageContext,
    parset: &ParameterSet,
    request: ImageRequest<'_>,
    initscript: Option<&Path>,
) -> MsssResult<PathBuf> {
    tracing::info!(image = %request.output.display(), threshold = request.threshold, "Making image");
    run_awimager(
        ctx,
        parset,
        &[
            ("ms", display(request.ms)),
            ("mask", display(request.mask)),
            ("threshold", format!("{:.6}Jy", request.threshold)),
            ("image", display(request.output)),
            ("wmax", request.wmax.to_string()),
        ],
        initscript,
    )
    .await?;
    Ok(request.output.to_path_buf())
}
