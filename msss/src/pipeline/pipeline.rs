//! Phase-ordered pipeline executor.
//!
//! Each call to [`PipelineExecutor::execute`] is one phase: all tasks of the
//! stage are dispatched, and the call returns only after every dispatched
//! task has finished. That return is the barrier between phases.

use super::metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
use super::stage::{ExecutionMode, Stage};
use super::task::PipelineTask;
use futures::future::join_all;
use msss_shared::errors::{MsssError, MsssResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Result of one task in a parallel stage.
enum TaskOutcome<T> {
    Completed(T, TaskMetrics),
    Failed(MsssError),
    /// Never started because a sibling had already failed.
    Skipped,
}

/// Tracks how many tasks of a stage are running at once.
#[derive(Default)]
struct Occupancy {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Pipeline executor.
///
/// Parallel stages run on a worker pool of fixed width. On the first
/// failure the stage stops admitting new tasks; tasks already running are
/// allowed to finish, then the first error in task order is returned.
/// Sequential stages stop at the first failure.
pub struct PipelineExecutor {
    width: usize,
    started: Instant,
    stages: Vec<StageMetrics>,
}

impl PipelineExecutor {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
            started: Instant::now(),
            stages: Vec::new(),
        }
    }

    /// Pool width sized to the processor cores of this node.
    pub fn with_available_cores() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(cores)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn metrics(&self) -> &[StageMetrics] {
        &self.stages
    }

    /// Execute one stage and return task outputs in task order.
    pub async fn execute<Ctx, T>(&mut self, stage: Stage<T>, ctx: &Ctx) -> MsssResult<Vec<T::Output>>
    where
        Ctx: Clone + Send + Sync + 'static,
        T: PipelineTask<Ctx>,
    {
        let Stage {
            name,
            tasks,
            execution,
        } = stage;
        let index = self.stages.len();
        let stage_start = Instant::now();

        tracing::info!(stage = name, tasks = tasks.len(), mode = ?execution, "Starting stage");

        let occupancy = Arc::new(Occupancy::default());
        let result = match execution {
            ExecutionMode::Parallel => self.run_parallel(name, tasks, ctx, &occupancy).await,
            ExecutionMode::Sequential => run_sequential(tasks, ctx, &occupancy).await,
        };
        let duration = stage_start.elapsed();

        let (outputs, task_metrics) = result?;

        tracing::info!(
            stage = name,
            duration_ms = duration.as_millis() as u64,
            "Stage complete"
        );
        self.stages.push(StageMetrics {
            index,
            name,
            execution,
            duration_ms: duration.as_millis(),
            peak_parallelism: occupancy.peak.load(Ordering::SeqCst),
            tasks: task_metrics,
        });
        Ok(outputs)
    }

    async fn run_parallel<Ctx, T>(
        &self,
        stage: &'static str,
        tasks: Vec<T>,
        ctx: &Ctx,
        occupancy: &Arc<Occupancy>,
    ) -> MsssResult<(Vec<T::Output>, Vec<TaskMetrics>)>
    where
        Ctx: Clone + Send + Sync + 'static,
        T: PipelineTask<Ctx>,
    {
        let semaphore = Arc::new(Semaphore::new(self.width));
        let failed = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let ctx = ctx.clone();
                let semaphore = Arc::clone(&semaphore);
                let failed = Arc::clone(&failed);
                let occupancy = Arc::clone(occupancy);
                tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            return TaskOutcome::Failed(MsssError::Internal(format!(
                                "worker pool closed: {}",
                                e
                            )));
                        }
                    };
                    if failed.load(Ordering::SeqCst) {
                        return TaskOutcome::Skipped;
                    }

                    let name = task.name();
                    let task_start = Instant::now();
                    occupancy.enter();
                    let result = task.run(ctx).await;
                    occupancy.leave();

                    match result {
                        Ok(output) => TaskOutcome::Completed(
                            output,
                            task_metric(name, task_start.elapsed()),
                        ),
                        Err(e) => {
                            failed.store(true, Ordering::SeqCst);
                            TaskOutcome::Failed(e)
                        }
                    }
                })
            })
            .collect();

        let mut outputs = Vec::with_capacity(handles.len());
        let mut metrics = Vec::with_capacity(handles.len());
        let mut first_error = None;
        let mut skipped = 0usize;

        for joined in join_all(handles).await {
            let outcome = joined.unwrap_or_else(|e| {
                TaskOutcome::Failed(MsssError::Internal(format!("task panicked: {}", e)))
            });
            match outcome {
                TaskOutcome::Completed(output, metric) => {
                    outputs.push(output);
                    metrics.push(metric);
                }
                TaskOutcome::Failed(e) => {
                    first_error.get_or_insert(e);
                }
                TaskOutcome::Skipped => skipped += 1,
            }
        }

        if let Some(e) = first_error {
            if skipped > 0 {
                tracing::warn!(stage, skipped, "Tasks not started after failure");
            }
            return Err(e);
        }
        Ok((outputs, metrics))
    }
}

async fn run_sequential<Ctx, T>(
    tasks: Vec<T>,
    ctx: &Ctx,
    occupancy: &Occupancy,
) -> MsssResult<(Vec<T::Output>, Vec<TaskMetrics>)>
where
    Ctx: Clone + Send + Sync + 'static,
    T: PipelineTask<Ctx>,
{
    let mut outputs = Vec::with_capacity(tasks.len());
    let mut metrics = Vec::with_capacity(tasks.len());
    for task in tasks {
        let name = task.name();
        let task_start = Instant::now();
        occupancy.enter();
        let result = task.run(ctx.clone()).await;
        occupancy.leave();
        match result {
            Ok(output) => {
                outputs.push(output);
                metrics.push(task_metric(name, task_start.elapsed()));
            }
            Err(e) => return Err(e),
        }
    }
    Ok((outputs, metrics))
}

fn task_metric(name: String, elapsed: Duration) -> TaskMetrics {
    TaskMetrics {
        name,
        duration_ms: elapsed.as_millis(),
    }
}

impl PipelineExecutor {
    /// Consume the executor and return the metrics of every completed stage.
    pub fn finish(self) -> PipelineMetrics {
        PipelineMetrics {
            total_duration_ms: self.started.elapsed().as_millis(),
            stages: self.stages,
        }
    }
}
