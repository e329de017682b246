use crate::pipeline::ExecutionMode;

#[derive(Debug, Clone)]
pub struct TaskMetrics {
    pub name: String,
    pub duration_ms: u128,
}

#[derive(Debug, Clone)]
pub struct StageMetrics {
    pub index: usize,
    pub name: &'static str,
    pub execution: ExecutionMode,
    pub duration_ms: u128,
    /// Most tasks of this stage that were running at the same time.
    pub peak_parallelism: usize,
    pub tasks: Vec<TaskMetrics>,
}

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_duration_ms: u128,
    pub stages: Vec<StageMetrics>,
}

impl PipelineMetrics {
    pub fn stage(&self, name: &str) -> Option<&StageMetrics> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    pub fn task_duration_ms(&self, name: &str) -> Option<u128> {
        self.stages
            .iter()
            .flat_map(|stage| stage.tasks.iter())
            .find(|task| task.name == name)
            .map(|task| task.duration_ms)
    }

    pub fn log_summary(&self) {
        for stage in &self.stages {
            tracing::info!(
                stage = stage.name,
                mode = ?stage.execution,
                tasks = stage.tasks.len(),
                peak_parallelism = stage.peak_parallelism,
                duration_ms = stage.duration_ms as u64,
                "Stage timing"
            );
        }
        tracing::info!(
            total_duration_ms = self.total_duration_ms as u64,
            "Pipeline finished"
        );
    }
}
