//! Phase-structured task execution.
//!
//! A pipeline run is a strict sequence of [`Stage`]s. Each stage is a batch
//! of independent [`PipelineTask`]s executed by the [`PipelineExecutor`],
//! either on the bounded worker pool or one after another. No task of stage
//! N+1 starts before every task of stage N has finished.

mod metrics;
#[allow(clippy::module_inception)]
mod pipeline;
mod stage;
mod task;

pub use metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
pub use pipeline::PipelineExecutor;
pub use stage::{ExecutionMode, Stage};
pub use task::PipelineTask;
