//! Work items and their stage states.
//!
//! A [`WorkItem`] pairs what a unit of data *is* (its kind: the calibrator
//! observation or one target beam) with what has been done to it so far
//! (its state). Each stage consumes an item in one state and returns it in
//! the next, so stages cannot be run out of order. A state only carries the
//! fields downstream stages are allowed to read: once subbands are combined,
//! the per-subband paths are gone.

use crate::scratch::{ScratchDir, ScratchProduct};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// One subband measurement set, identified by its `SB<nnn>` number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Subband {
    pub id: u32,
    pub path: PathBuf,
}

impl Subband {
    pub fn new(id: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }

    /// Same subband at a new location.
    pub fn moved_to(&self, path: PathBuf) -> Self {
        Self { id: self.id, path }
    }
}

impl fmt::Display for Subband {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SB{:03}", self.id)
    }
}

/// The calibrator observation.
#[derive(Debug, Clone)]
pub struct Calibrator {
    pub obsid: String,
    pub output_dir: PathBuf,
    /// Sky model for each subband, by subband id.
    pub skymodels: BTreeMap<u32, PathBuf>,
}

/// One target beam.
#[derive(Debug, Clone)]
pub struct Beam {
    pub index: usize,
    pub obsid: String,
    pub output_dir: PathBuf,
    /// Final visibility deliverable.
    pub output_ms: PathBuf,
    /// Final image deliverable.
    pub output_image: PathBuf,
    /// Sky model of the beam's pointing.
    pub skymodel: PathBuf,
}

/// Subbands as discovered in the input directory.
#[derive(Debug)]
pub struct Raw {
    pub subbands: Vec<Subband>,
}

/// Subbands copied (and optionally flagged) into the work area.
#[derive(Debug)]
pub struct Flagged {
    pub subbands: Vec<Subband>,
    /// Scratch holding the copies, if they do not live in the output tree.
    pub workspace: Option<ScratchDir>,
}

/// Subbands carrying calibration solutions.
#[derive(Debug)]
pub struct Calibrated {
    pub subbands: Vec<Subband>,
    pub workspace: Option<ScratchDir>,
}

/// All subbands of a beam merged into one store.
#[derive(Debug)]
pub struct Combined {
    pub combined: ScratchProduct,
}

#[derive(Debug)]
pub struct PhaseCalibrated {
    pub combined: ScratchProduct,
}

/// The deliverable measurement set has been written.
#[derive(Debug)]
pub struct StationsStripped;

/// Short-baseline view of the deliverable, used for imaging.
#[derive(Debug)]
pub struct BaselineLimited {
    pub limited: ScratchProduct,
}

#[derive(Debug)]
pub struct NoiseEstimated {
    pub limited: ScratchProduct,
    /// Clean threshold in Jy.
    pub threshold: f64,
}

#[derive(Debug)]
pub struct Masked {
    pub limited: ScratchProduct,
    pub threshold: f64,
    pub mask: ScratchProduct,
}

/// The deliverable image has been written.
#[derive(Debug)]
pub struct Imaged;

/// A unit of data of kind `K` in stage state `S`.
#[derive(Debug)]
pub struct WorkItem<K, S> {
    pub kind: K,
    pub state: S,
}

impl<K, S> WorkItem<K, S> {
    pub fn kind(&self) -> &K {
        &self.kind
    }

    fn advance<T>(self, state: T) -> WorkItem<K, T> {
        WorkItem {
            kind: self.kind,
            state,
        }
    }
}

impl<K> WorkItem<K, Raw> {
    pub fn new(kind: K, subbands: Vec<Subband>) -> Self {
        Self {
            kind,
            state: Raw { subbands },
        }
    }

    pub fn subbands(&self) -> &[Subband] {
        &self.state.subbands
    }

    pub fn flagged(
        self,
        subbands: Vec<Subband>,
        workspace: Option<ScratchDir>,
    ) -> WorkItem<K, Flagged> {
        self.advance(Flagged {
            subbands,
            workspace,
        })
    }
}

impl<K> WorkItem<K, Flagged> {
    pub fn subbands(&self) -> &[Subband] {
        &self.state.subbands
    }

    /// Record that every subband now carries solutions.
    pub fn calibrated(self, subbands: Vec<Subband>) -> WorkItem<K, Calibrated> {
        let workspace = self.state.workspace;
        WorkItem {
            kind: self.kind,
            state: Calibrated {
                subbands,
                workspace,
            },
        }
    }
}

impl<K> WorkItem<K, Calibrated> {
    pub fn subbands(&self) -> &[Subband] {
        &self.state.subbands
    }
}

impl WorkItem<Beam, Calibrated> {
    /// Replace the subbands by their combination. The per-subband copies in
    /// scratch are released here.
    pub fn combined(self, combined: ScratchProduct) -> WorkItem<Beam, Combined> {
        self.advance(Combined { combined })
    }
}

impl WorkItem<Beam, Combined> {
    pub fn combined_ms(&self) -> &Path {
        self.state.combined.path()
    }

    pub fn phase_calibrated(self) -> WorkItem<Beam, PhaseCalibrated> {
        let combined = self.state.combined;
        WorkItem {
            kind: self.kind,
            state: PhaseCalibrated { combined },
        }
    }
}

impl WorkItem<Beam, PhaseCalibrated> {
    pub fn combined_ms(&self) -> &Path {
        self.state.combined.path()
    }

    /// The combined store is released once the deliverable exists.
    pub fn stations_stripped(self) -> WorkItem<Beam, StationsStripped> {
        self.advance(StationsStripped)
    }
}

impl WorkItem<Beam, StationsStripped> {
    pub fn output_ms(&self) -> &Path {
        &self.kind.output_ms
    }

    pub fn baseline_limited(self, limited: ScratchProduct) -> WorkItem<Beam, BaselineLimited> {
        self.advance(BaselineLimited { limited })
    }
}

impl WorkItem<Beam, BaselineLimited> {
    pub fn limited_ms(&self) -> &Path {
        self.state.limited.path()
    }

    pub fn noise_estimated(self, threshold: f64) -> WorkItem<Beam, NoiseEstimated> {
        let limited = self.state.limited;
        WorkItem {
            kind: self.kind,
            state: NoiseEstimated { limited, threshold },
        }
    }
}

impl WorkItem<Beam, NoiseEstimated> {
    pub fn limited_ms(&self) -> &Path {
        self.state.limited.path()
    }

    pub fn masked(self, mask: ScratchProduct) -> WorkItem<Beam, Masked> {
        let NoiseEstimated { limited, threshold } = self.state;
        WorkItem {
            kind: self.kind,
            state: Masked {
                limited,
                threshold,
                mask,
            },
        }
    }
}

impl WorkItem<Beam, Masked> {
    pub fn limited_ms(&self) -> &Path {
        self.state.limited.path()
    }

    pub fn mask(&self) -> &Path {
        self.state.mask.path()
    }

    pub fn threshold(&self) -> f64 {
        self.state.threshold
    }

    /// Scratch inputs of the imager are released here.
    pub fn imaged(self) -> WorkItem<Beam, Imaged> {
        self.advance(Imaged)
    }
}

impl WorkItem<Beam, Imaged> {
    pub fn output_ms(&self) -> &Path {
        &self.kind.output_ms
    }

    pub fn output_image(&self) -> &Path {
        &self.kind.output_image
    }
}

pub type CalibratorItem<S> = WorkItem<Calibrator, S>;
pub type BeamItem<S> = WorkItem<Beam, S>;
