//! Noise estimate from a dirty image.

use super::constants::{names, noise::NOISE_STOKES_PLANE};
use super::{StageContext, display, run_awimager};
use crate::parset::ParameterSet;
use crate::tables::ImageWindow;
use msss_shared::errors::{MsssError, MsssResult};
use ndarray::Array2;
use std::path::Path;

/// Image `ms` into scratch and measure the noise in the central
/// `2 * box_size` pixel square of plane [`NOISE_STOKES_PLANE`].
///
/// `parset` must define `ms`, `image`, `wmax` and `npix`. The diagnostic
/// image is removed before returning.
pub async fn estimate_noise(
    ctx: &StageContext,
    parset: &ParameterSet,
    ms: &Path,
    wmax: f64,
    box_size: usize,
    initscript: Option<&Path>,
) -> MsssResult<f64> {
    let npix = parset.get_float("npix")?;
    let fits = box_size
        .checked_mul(2)
        .is_some_and(|side| npix.is_finite() && side as f64 <= npix);
    if !fits {
        return Err(MsssError::Config(format!(
            "noise box of half-width {} does not fit an image of {} pixels",
            box_size, npix
        )));
    }

    let image = ctx.scratch.product(names::NOISE_IMAGE)?;
    run_awimager(
        ctx,
        parset,
        &[
            ("ms", display(ms)),
            ("image", display(image.path())),
            ("wmax", wmax.to_string()),
        ],
        initscript,
    )
    .await?;

    let window = ImageWindow::centred(NOISE_STOKES_PLANE, npix as usize, box_size);
    let pixels = ctx.tables.image_window(image.path(), window).await?;
    let noise = population_std(&pixels).ok_or_else(|| {
        MsssError::DataShape(format!("empty noise window in {}", image.path().display()))
    })?;
    tracing::info!(ms = %ms.display(), noise, "Estimated image noise");
    Ok(noise)
}

/// Standard deviation with divisor N.
pub fn population_std(pixels: &Array2<f64>) -> Option<f64> {
    if pixels.is_empty() {
        return None;
    }
    Some(pixels.std(0.0))
}
