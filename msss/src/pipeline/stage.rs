//! Stage definition for phase-ordered pipeline execution.

/// Execution mode for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Fan tasks out over the bounded worker pool.
    Parallel,
    /// Execute tasks one after another.
    Sequential,
}

/// A named group of homogeneous tasks and the mode they run in.
///
/// Stages are executed in order, and a stage starts only after every task
/// of the previous stage has finished.
#[derive(Debug, Clone)]
pub struct Stage<T> {
    pub name: &'static str,
    pub tasks: Vec<T>,
    pub execution: ExecutionMode,
}

impl<T> Stage<T> {
    /// Create a stage with parallel task execution.
    pub fn parallel(name: &'static str, tasks: Vec<T>) -> Self {
        Self {
            name,
            tasks,
            execution: ExecutionMode::Parallel,
        }
    }

    /// Create a stage with sequential task execution.
    pub fn sequential(name: &'static str, tasks: Vec<T>) -> Self {
        Self {
            name,
            tasks,
            execution: ExecutionMode::Sequential,
        }
    }
}
