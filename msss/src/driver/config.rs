//! Typed pipeline configuration.
//!
//! The top-level parset is converted once, before any work starts. Every
//! missing or malformed key is collected and reported in a single
//! [`MsssError::Config`].

use crate::parset::ParameterSet;
use crate::tables::DEFAULT_TAQL_EXECUTABLE;
use msss_shared::errors::{MsssError, MsssResult};
use std::path::PathBuf;

/// Where inputs are read from and outputs written to.
#[derive(Debug, Clone)]
pub struct Layout {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub skymodel_dir: PathBuf,
    pub cal_obsid: String,
    pub target_obsid: String,
    pub n_beams: usize,
}

#[derive(Debug, Clone)]
pub struct FlagConfig {
    pub parset: ParameterSet,
    /// Overrides the installation's default strategy.
    pub strategy: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ClipConfig {
    pub executable: String,
    pub sigma: f64,
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub parset: ParameterSet,
    pub skymodel: PathBuf,
}

/// Each beam self-calibrates against its own pointing sky model.
#[derive(Debug, Clone)]
pub struct PhaseOnlyConfig {
    pub parset: ParameterSet,
}

#[derive(Debug, Clone)]
pub struct NoiseConfig {
    pub parset: ParameterSet,
    pub multiplier: f64,
    pub box_size: usize,
}

/// Validated contents of the top-level parset.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub layout: Layout,
    /// Flagging runs only when a `flag.parset` subset is present.
    pub flag: Option<FlagConfig>,
    pub calcal: ParameterSet,
    pub pdbclip: ClipConfig,
    pub transfer: TransferConfig,
    pub combine: ParameterSet,
    pub phaseonly: PhaseOnlyConfig,
    pub max_baseline: f64,
    pub noise: NoiseConfig,
    pub image: ParameterSet,
    pub make_mask_executable: String,
    pub awimager_initscript: Option<PathBuf>,
    pub taql_executable: String,
}

/// Beam directories are named `SAP00<beam>` with a single-digit beam.
pub const MAX_BEAMS: i64 = 10;

/// Keys each patched subset must define.
mod required {
    pub const FLAG: &[&str] = &["msin", "msout", "aoflagger.strategy"];
    pub const COMBINE: &[&str] = &["msin", "msout"];
    pub const NOISE: &[&str] = &["ms", "image", "wmax", "npix"];
    pub const IMAGE: &[&str] = &[
        "ms", "mask", "threshold", "image", "wmax", "cellsize", "npix", "stokes",
    ];
}

/// Collects violations instead of stopping at the first.
#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn take<T>(&mut self, result: MsssResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.0.push(e.to_string());
                None
            }
        }
    }

    fn check(&mut self, ok: bool, message: impl FnOnce() -> String) {
        if !ok {
            self.0.push(message());
        }
    }

    fn subset(&mut self, parset: &ParameterSet, prefix: &str, keys: &[&str]) -> ParameterSet {
        let subset = parset.subset(prefix);
        for key in keys {
            self.check(subset.contains(key), || {
                format!("missing parameter: {}.{}", prefix, key)
            });
        }
        subset
    }

    fn optional_string(&mut self, parset: &ParameterSet, key: &str) -> Option<String> {
        if parset.contains(key) {
            self.take(parset.get_string(key))
        } else {
            None
        }
    }

    fn finish(self) -> MsssResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(MsssError::Config(self.0.join("; ")))
        }
    }
}

impl PipelineConfig {
    pub fn from_parset(parset: &ParameterSet) -> MsssResult<Self> {
        let mut v = Violations::default();

        let input_dir = v.take(parset.get_string("input_dir"));
        let output_dir = v.take(parset.get_string("output_dir"));
        let skymodel_dir = v.take(parset.get_string("skymodel_dir"));
        let cal_obsid = v.take(parset.get_string("cal_obsid"));
        let target_obsid = v.take(parset.get_string("target_obsid"));
        let n_beams = v.take(parset.get_int("n_beams"));
        if let Some(n) = n_beams {
            v.check((1..=MAX_BEAMS).contains(&n), || {
                format!("n_beams must be between 1 and {}, got {}", MAX_BEAMS, n)
            });
        }

        let flag_parset = parset.subset("flag.parset");
        let flag = if flag_parset.is_empty() {
            None
        } else {
            let parset_subset = v.subset(parset, "flag.parset", required::FLAG);
            Some(FlagConfig {
                parset: parset_subset,
                strategy: v.optional_string(parset, "flag.strategy").map(PathBuf::from),
            })
        };

        let calcal = parset.subset("calcal.parset");
        v.check(!calcal.is_empty(), || "missing parameter subset: calcal.parset".into());

        let clip_executable = v.take(parset.get_string("pdbclip.executable"));
        let clip_sigma = v.take(parset.get_float("pdbclip.sigma"));

        let transfer_parset = parset.subset("transfer.parset");
        v.check(!transfer_parset.is_empty(), || {
            "missing parameter subset: transfer.parset".into()
        });
        let transfer_skymodel = v.take(parset.get_string("transfer.skymodel"));

        let combine = v.subset(parset, "combine.parset", required::COMBINE);

        let phaseonly_parset = parset.subset("phaseonly.parset");
        v.check(!phaseonly_parset.is_empty(), || {
            "missing parameter subset: phaseonly.parset".into()
        });

        let max_baseline = v.take(parset.get_float("limit.max_baseline"));
        if let Some(maxbl) = max_baseline {
            v.check(maxbl > 0.0, || {
                format!("limit.max_baseline must be positive, got {}", maxbl)
            });
        }

        let noise_parset = v.subset(parset, "noise.parset", required::NOISE);
        let noise_npix = noise_parset
            .contains("npix")
            .then(|| v.take(noise_parset.get_float("npix")))
            .flatten();
        let multiplier = v.take(parset.get_float("noise.multiplier"));
        let box_size = v.take(parset.get_int("noise.box_size"));
        if let Some(size) = box_size {
            v.check(size > 0, || {
                format!("noise.box_size must be positive, got {}", size)
            });
            if let Some(npix) = noise_npix {
                v.check(size as f64 * 2.0 <= npix, || {
                    format!(
                        "noise.box_size {} does not fit noise.parset.npix {}",
                        size, npix
                    )
                });
            }
        }

        let image = v.subset(parset, "image.parset", required::IMAGE);
        if image.contains("npix") {
            v.take(image.get_float("npix"));
        }

        let make_mask_executable = v.take(parset.get_string("make_mask.executable"));
        let awimager_initscript = v
            .optional_string(parset, "awimager.initscript")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let taql_executable = v
            .optional_string(parset, "tables.taql")
            .unwrap_or_else(|| DEFAULT_TAQL_EXECUTABLE.to_string());

        v.finish()?;

        // Every `None` above recorded a violation, so `finish` has already
        // returned for any of them.
        let missing = || MsssError::Internal("configuration value lost after validation".into());
        Ok(Self {
            layout: Layout {
                input_dir: input_dir.ok_or_else(missing)?.into(),
                output_dir: output_dir.ok_or_else(missing)?.into(),
                skymodel_dir: skymodel_dir.ok_or_else(missing)?.into(),
                cal_obsid: cal_obsid.ok_or_else(missing)?,
                target_obsid: target_obsid.ok_or_else(missing)?,
                n_beams: n_beams.ok_or_else(missing)? as usize,
            },
            flag,
            calcal,
            pdbclip: ClipConfig {
                executable: clip_executable.ok_or_else(missing)?,
                sigma: clip_sigma.ok_or_else(missing)?,
            },
            transfer: TransferConfig {
                parset: transfer_parset,
                skymodel: transfer_skymodel.ok_or_else(missing)?.into(),
            },
            combine,
            phaseonly: PhaseOnlyConfig {
                parset: phaseonly_parset,
            },
            max_baseline: max_baseline.ok_or_else(missing)?,
            noise: NoiseConfig {
                parset: noise_parset,
                multiplier: multiplier.ok_or_else(missing)?,
                box_size: box_size.ok_or_else(missing)? as usize,
            },
            image,
            make_mask_executable: make_mask_executable.ok_or_else(missing)?,
            awimager_initscript,
            taql_executable,
        })
    }

    /// `<output_dir>/calibrator/<cal_obsid>`
    pub fn calibrator_dir(&self) -> PathBuf {
        self.layout
            .output_dir
            .join("calibrator")
            .join(&self.layout.cal_obsid)
    }

    /// `<output_dir>/target/<target_obsid>/SAP00<beam>`
    pub fn beam_dir(&self, beam: usize) -> PathBuf {
        self.layout
            .output_dir
            .join("target")
            .join(&self.layout.target_obsid)
            .join(format!("SAP00{}", beam))
    }
}
