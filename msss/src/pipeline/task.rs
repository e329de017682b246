//! Generic task trait for pipeline execution.

use async_trait::async_trait;
use msss_shared::errors::MsssResult;

/// Trait for tasks that can be executed in a pipeline stage.
///
/// A task owns its input (typically one work item) and returns the item's
/// next state. The shared context is cloned per task.
#[async_trait]
pub trait PipelineTask<Ctx>: Send + 'static {
    type Output: Send + 'static;

    /// Execute the task with the shared pipeline context.
    async fn run(self, ctx: Ctx) -> MsssResult<Self::Output>;

    /// Human-readable task name for logging.
    fn name(&self) -> String;
}
