use super::constants::names;
use super::{StageContext, display, run_ndppp};
use crate::parset::{ParameterSet, format_vector};
use crate::scratch::ScratchProduct;
use msss_shared::errors::{MsssError, MsssResult};
use std::path::PathBuf;

/// Merge the subbands of one beam into a single measurement set in scratch.
///
/// `parset` must define `msin` and `msout`.
pub async fn combine(
    ctx: &StageContext,
    parset: &ParameterSet,
    inputs: &[PathBuf],
) -> MsssResult<ScratchProduct> {
    if inputs.is_empty() {
        return Err(MsssError::DataShape("nothing to combine".into()));
    }
    let output = ctx.scratch.product(names::COMBINED_MS)?;
    run_ndppp(
        ctx,
        parset,
        &[
            ("msin", format_vector(inputs.iter().map(|p| display(p)))),
            ("msout", display(output.path())),
        ],
    )
    .await?;
    Ok(output)
}
