//! Orchestrator for the multi-beam calibration and imaging pipeline.
//!
//! The pipeline copies the subbands of a calibrator observation and a
//! multi-beam target observation into a work area, calibrates the
//! calibrator, transfers its solutions to every target subband, combines
//! each beam, strips misbehaving stations, and images the result. All the
//! numerical work happens in external tools; this crate sequences them,
//! patches their parsets, owns their scratch space, and runs independent
//! work in parallel.
//!
//! # Layout
//!
//! - [`parset`]: parameter sets, subsets, and patched copies
//! - [`scratch`]: scoped scratch files and directories
//! - [`process`]: external tool invocation
//! - [`tables`]: measurement-set queries and filtered copies
//! - [`stages`]: one function per external-tool step
//! - [`pipeline`]: phase-ordered parallel task execution
//! - [`driver`]: configuration, work items, and the run itself

pub mod driver;
pub mod logging;
pub mod parset;
pub mod pipeline;
pub mod process;
pub mod scratch;
pub mod stages;
pub mod tables;
pub mod testing;

pub use driver::{Driver, DriverOptions, PipelineConfig, RunSummary};
pub use logging::init_logging;
pub use msss_shared::errors::{MsssError, MsssResult};
pub use parset::ParameterSet;
pub use scratch::ScratchContext;
