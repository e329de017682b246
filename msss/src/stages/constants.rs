//! Names and fixed values shared by the pipeline stages.

/// External executables invoked by name.
pub mod executables {
    /// Flagging, averaging and combining of visibilities.
    pub const NDPPP: &str = "NDPPP";

    /// Imager, also used to produce empty mask images.
    pub const AWIMAGER: &str = "awimager";

    /// BBS solver.
    pub const CALIBRATE: &str = "calibrate-stand-alone";

    /// Exports calibrator solutions into a fresh instrument database.
    pub const PARMEXPORTCAL: &str = "parmexportcal";

    /// Per-station statistics collector.
    pub const ASCIISTATS: &str = "asciistats.py";

    /// Turns collected statistics into a station table.
    pub const STATSPLOT: &str = "statsplot.py";

    /// Sky model to source database converter.
    pub const MAKESOURCEDB: &str = "makesourcedb";
}

/// Fixed file and directory names.
pub mod names {
    /// Instrument database inside a measurement set.
    pub const INSTRUMENT: &str = "instrument";

    pub const COMBINED_MS: &str = "combined.MS";
    pub const LIMITED_MS: &str = "limited.MS";
    pub const NOISE_IMAGE: &str = "noise.img";
    pub const MASK_IMAGE: &str = "mask.img";
    pub const MASK_SOURCEDB: &str = "mask.sourcedb";
    pub const PARMDB: &str = "transfer.parmdb";

    /// Output prefix handed to the statistics plotter.
    pub const STATS_PREFIX: &str = "stats";
    pub const STATS_SUFFIX: &str = ".stats";
    pub const STATS_TABLE_SUFFIX: &str = ".tab";
}

/// Flagging defaults.
pub mod flagging {
    /// Strategy file relative to the installation root.
    pub const DEFAULT_STRATEGY: &str = "share/rfistrategies/LBAdefault";
}

/// Noise estimation.
pub mod noise {
    /// Image plane the noise is measured on.
    ///
    /// Inherited from earlier tooling without a recorded reason. On a
    /// four-plane IQUV image this is Stokes V.
    pub const NOISE_STOKES_PLANE: usize = 3;
}
