use super::StageContext;
use super::constants::{executables, names};
use crate::parset::ParameterSet;
use crate::process::StageInvocation;
use crate::scratch::ScratchProduct;
use msss_shared::errors::MsssResult;
use std::path::Path;

const EMPTY_IMAGE_OPERATION: &str = "empty";

/// Build a clean mask for `ms` from the sources in `skymodel`.
///
/// An empty image is made with the geometry of the imaging parset
/// (`cellsize`, `npix`, `stokes`), the sky model is converted to a source
/// database, and `executable` paints the sources into the image. Only the
/// mask image survives the call.
pub async fn make_mask(
    ctx: &StageContext,
    parset: &ParameterSet,
    ms: &Path,
    skymodel: &Path,
    executable: &str,
    initscript: Option<&Path>,
) -> MsssResult<ScratchProduct> {
    let cellsize = parset.get_string("cellsize")?;
    let npix = parset.get_float("npix")?;
    let stokes = parset.get_string("stokes")?;

    let mask = ctx.scratch.product(names::MASK_IMAGE)?;
    let sourcedb = ctx.scratch.product(names::MASK_SOURCEDB)?;

    ctx.runner
        .run(
            &StageInvocation::new(executables::AWIMAGER)
                .key_value("cellsize", &cellsize)
                .key_value("ms", ms.display())
                .key_value("npix", npix as i64)
                .key_value("operation", EMPTY_IMAGE_OPERATION)
                .key_value("image", mask.path().display())
                .key_value("stokes", &stokes)
                .initscript(initscript),
        )
        .await?;
    ctx.runner
        .run(
            &StageInvocation::new(executables::MAKESOURCEDB)
                .key_value("in", skymodel.display())
                .key_value("out", sourcedb.path().display())
                .arg("format=<"),
        )
        .await?;
    ctx.runner
        .run(
            &StageInvocation::new(executable)
                .path_arg(mask.path())
                .path_arg(sourcedb.path()),
        )
        .await?;

    Ok(mask)
}
