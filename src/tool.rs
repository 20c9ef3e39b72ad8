//! Local external tools (`docker`, `helm`)
//!
//! Each call is described as an [`Invocation`] and handed to a
//! [`CommandRunner`], so the call sequences can be checked without the tools
//! installed.

use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

/// One external program call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Written to the program's stdin, then stdin is closed
    pub stdin: Option<String>,
    /// Indexes of arguments masked in log output
    secret_args: Vec<usize>,
}

impl Invocation {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            stdin: None,
            secret_args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// An argument that carries a secret; shown as `***` when displayed.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret_args.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for (index, arg) in self.args.iter().enumerate() {
            if self.secret_args.contains(&index) {
                f.write_str(" ***")?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Tool errors
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{invocation}` exited with {status}")]
    Failed { invocation: String, status: String },
}

/// Runs external programs.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), ToolError>;
}

/// Runs programs on this machine with inherited stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), ToolError> {
        tracing::info!(command = %invocation, "running");

        let spawn_err = |source: std::io::Error| ToolError::Spawn {
            program: invocation.program.clone(),
            source,
        };

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if invocation.stdin.is_some() {
            command.stdin(Stdio::piped());
        }

        let mut child = command.spawn().map_err(spawn_err)?;
        if let (Some(input), Some(mut stdin)) = (&invocation.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).map_err(spawn_err)?;
        }

        let status = child.wait().map_err(spawn_err)?;
        if !status.success() {
            return Err(ToolError::Failed {
                invocation: invocation.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// Records invocations instead of running them.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    fail_program_arg: Option<(String, String)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail calls of `program` whose first argument is `first_arg`.
    pub fn failing(program: &str, first_arg: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_program_arg: Some((program.to_string(), first_arg.to_string())),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), ToolError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }

        if let Some((program, first_arg)) = &self.fail_program_arg {
            if &invocation.program == program && invocation.args.first() == Some(first_arg) {
                return Err(ToolError::Failed {
                    invocation: invocation.to_string(),
                    status: "exit status: 1".to_string(),
                });
            }
        }
        Ok(())
    }
}
