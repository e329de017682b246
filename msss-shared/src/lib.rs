//! Types shared by every component of the imaging pipeline.

pub mod errors;

pub use errors::{MsssError, MsssResult};
