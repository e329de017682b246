use std::fmt::Display;
use std::path::{Path, PathBuf};

/// A single external-process call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInvocation {
    pub executable: String,
    pub args: Vec<String>,
    /// Shell script sourced before the tool runs.
    pub initscript: Option<PathBuf>,
    /// Working directory; tools drop their log files here.
    pub current_dir: Option<PathBuf>,
}

impl StageInvocation {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            initscript: None,
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// Append a parset-style `key=value` argument.
    pub fn key_value(self, key: &str, value: impl Display) -> Self {
        self.arg(format!("{}={}", key, value))
    }

    pub fn initscript(mut self, script: Option<&Path>) -> Self {
        self.initscript = script.map(Path::to_path_buf);
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Argument `index` (0-based, excluding the executable).
    pub fn arg_at(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Value of the first `key=value` argument with the given key.
    pub fn key_value_arg(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|arg| {
            arg.split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }

    /// Human-readable command line for logs.
    pub fn command_line(&self) -> String {
        let mut line = String::new();
        if let Some(script) = &self.initscript {
            line.push_str(&format!("[{}] ", script.display()));
        }
        line.push_str(&self.executable);
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}
