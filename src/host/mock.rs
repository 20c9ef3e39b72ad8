//! Scripted remote shell for tests.

use std::sync::Mutex;

use super::transport::{RemoteShell, TransportError};

#[derive(Debug, Clone)]
enum Reply {
    Output(String),
    Fail(String),
}

/// A [`RemoteShell`] that answers from a script and records every command.
///
/// Each rule matches commands starting with its prefix; the first matching
/// rule answers. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct MockShell {
    rules: Vec<(String, Reply)>,
    log: Mutex<Vec<String>>,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `output`.
    pub fn respond(mut self, prefix: &str, output: &str) -> Self {
        self.rules
            .push((prefix.to_string(), Reply::Output(output.to_string())));
        self
    }

    /// Fail commands starting with `prefix`.
    pub fn fail(mut self, prefix: &str, stderr: &str) -> Self {
        self.rules
            .push((prefix.to_string(), Reply::Fail(stderr.to_string())));
        self
    }

    /// Commands run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Whether any command starting with `prefix` was run.
    pub fn ran(&self, prefix: &str) -> bool {
        self.commands().iter().any(|command| command.starts_with(prefix))
    }
}

impl RemoteShell for MockShell {
    fn run(&self, command: &str) -> Result<String, TransportError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(command.to_string());
        }

        let reply = self
            .rules
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Fail(stderr)) => Err(TransportError::CommandFailed {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
                stderr,
            }),
            None => Ok(String::new()),
        }
    }
}
