//! Command execution abstraction for testability
//!
//! This module provides a trait-based abstraction for running pipelines,
//! enabling dependency injection and mocking for tests.

use super::command::{CommandOutput, Pipeline, StdoutTarget};
use anyhow::Result;

/// Abstraction for command execution, enabling mocking in tests
pub trait CommandExecutor: Send + Sync {
    /// Run a pipeline, sending the last stage's stdout to `stdout`
    ///
    /// A non-zero exit status is reported through [`CommandOutput::success`];
    /// only failures to start or wait for a process are errors.
    fn run(&self, pipeline: &Pipeline, stdout: &StdoutTarget) -> Result<CommandOutput>;
}

/// Default implementation using real subprocess calls
#[derive(Debug, Clone, Default)]
pub struct RealExecutor;

impl RealExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealExecutor {
    fn run(&self, pipeline: &Pipeline, stdout: &StdoutTarget) -> Result<CommandOutput> {
        super::command::run_pipeline(pipeline, stdout)
    }
}

/// A mock executor for testing that records calls and returns configured responses
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Recorded command invocation
    #[derive(Clone, Debug)]
    pub struct CommandCall {
        pub pipeline: Pipeline,
        pub stdout: StdoutTarget,
    }

    impl CommandCall {
        /// The pipeline as a shell would see it
        pub fn command(&self) -> String {
            self.pipeline.to_shell()
        }
    }

    /// Response configuration for mock
    #[derive(Clone, Debug)]
    pub enum MockResponse {
        Success { stdout: String },
        Failure { exit_code: i32 },
        Signal { signal: i32 },
        SpawnError { message: String },
    }

    impl Default for MockResponse {
        fn default() -> Self {
            MockResponse::Success {
                stdout: String::new(),
            }
        }
    }

    impl MockResponse {
        pub fn stdout(stdout: impl Into<String>) -> Self {
            MockResponse::Success {
                stdout: stdout.into(),
            }
        }
    }

    /// Mock executor for testing
    ///
    /// Responses are matched against the rendered command: first by a
    /// configured substring, then by the first stage's program name.
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded command invocations
        pub calls: Arc<Mutex<Vec<CommandCall>>>,
        /// Pre-configured responses: program name -> response
        responses: Arc<Mutex<HashMap<String, MockResponse>>>,
        /// Pre-configured responses: substring of the command -> response
        containing: Arc<Mutex<Vec<(String, MockResponse)>>>,
        /// Default response when no specific response is configured
        default_response: Arc<Mutex<MockResponse>>,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure a response for a specific program
        pub fn expect(self, program: &str, response: MockResponse) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(program.to_string(), response);
            self
        }

        /// Configure a response for any command containing `needle`
        pub fn expect_containing(self, needle: &str, response: MockResponse) -> Self {
            self.containing
                .lock()
                .unwrap()
                .push((needle.to_string(), response));
            self
        }

        /// Set the default response for unconfigured programs
        pub fn with_default_response(self, response: MockResponse) -> Self {
            *self.default_response.lock().unwrap() = response;
            self
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<CommandCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Rendered commands, in call order
        pub fn commands(&self) -> Vec<String> {
            self.get_calls().iter().map(CommandCall::command).collect()
        }

        /// Check if a program was called
        pub fn was_called(&self, program: &str) -> bool {
            self.call_count(program) > 0
        }

        /// Get number of calls to a specific program
        pub fn call_count(&self, program: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.pipeline.program() == program)
                .count()
        }

        fn get_response(&self, pipeline: &Pipeline) -> MockResponse {
            let rendered = pipeline.to_shell();
            if let Some((_, response)) = self
                .containing
                .lock()
                .unwrap()
                .iter()
                .find(|(needle, _)| rendered.contains(needle.as_str()))
            {
                return response.clone();
            }

            self.responses
                .lock()
                .unwrap()
                .get(pipeline.program())
                .cloned()
                .unwrap_or_else(|| self.default_response.lock().unwrap().clone())
        }
    }

    impl CommandExecutor for MockExecutor {
        fn run(&self, pipeline: &Pipeline, stdout: &StdoutTarget) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(CommandCall {
                pipeline: pipeline.clone(),
                stdout: stdout.clone(),
            });

            match self.get_response(pipeline) {
                MockResponse::Success { stdout } => Ok(CommandOutput {
                    success: true,
                    code: Some(0),
                    signal: None,
                    stdout,
                }),
                MockResponse::Failure { exit_code } => Ok(CommandOutput {
                    success: false,
                    code: Some(exit_code),
                    signal: None,
                    stdout: String::new(),
                }),
                MockResponse::Signal { signal } => Ok(CommandOutput {
                    success: false,
                    code: None,
                    signal: Some(signal),
                    stdout: String::new(),
                }),
                MockResponse::SpawnError { message } => anyhow::bail!(message),
            }
        }
    }
}
