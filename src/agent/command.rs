use super::stream::{ContentBlock, StreamEvent, describe_tool_use, written_file};
use super::{AgentResponse, ResearchAgent};
use crate::errors::AgentError;
use crate::ledger::AgentMessage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Research agent backed by an agent CLI speaking stream-json on stdout.
///
/// The prompt is written to the child's stdin, which is then closed. Every
/// stdout line is parsed as a stream event; lines that are not JSON are kept
/// as plain output.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandAgent {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The command line as shown in logs.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

#[async_trait]
impl ResearchAgent for CommandAgent {
    async fn invoke(&self, prompt: &str) -> Result<AgentResponse> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(command = %self.display(), prompt_chars = prompt.len(), "spawning agent");
        let mut child = cmd.spawn().map_err(|source| AgentError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(AgentError::Io)?;
            stdin.shutdown().await.context("Failed to close agent stdin")?;
        }

        // Drain stderr concurrently so a chatty child cannot block on a full pipe.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                stderr.read_to_string(&mut buf).await.ok();
                buf
            })
        });

        let stdout = child.stdout.take().context("Failed to capture agent stdout")?;
        let mut lines = BufReader::new(stdout).lines();
        let mut collector = StreamCollector::default();
        while let Some(line) = lines.next_line().await.map_err(AgentError::Io)? {
            collector.push_line(&line);
        }

        let status = child.wait().await.map_err(AgentError::Io)?;
        if let Some(task) = stderr_task
            && let Ok(stderr) = task.await
            && !stderr.trim().is_empty()
        {
            debug!(stderr = %stderr.trim(), "agent stderr");
        }

        let exit_code = status.code().unwrap_or(-1);
        info!(
            exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            tool_calls = collector.tool_calls,
            "agent finished"
        );
        if !status.success() {
            return Err(AgentError::NonZeroExit { exit_code }.into());
        }

        Ok(collector.finish()?)
    }
}

/// Accumulates stream-json lines into an `AgentResponse`.
#[derive(Debug, Default)]
pub(crate) struct StreamCollector {
    response: AgentResponse,
    plain_output: String,
    final_result: Option<String>,
    reported_error: bool,
    tool_calls: usize,
}

impl StreamCollector {
    pub(crate) fn push_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match serde_json::from_str::<StreamEvent>(line) {
            Ok(StreamEvent::Assistant { message }) => {
                for block in message.content {
                    match block {
                        ContentBlock::Text { text } => {
                            if !text.trim().is_empty() {
                                self.response.messages.push(AgentMessage::assistant(text));
                            }
                        }
                        ContentBlock::ToolUse { name, input } => {
                            self.tool_calls += 1;
                            if let Some((path, content)) = written_file(&name, &input) {
                                self.response.files.insert(path, content);
                            }
                            self.response
                                .messages
                                .push(AgentMessage::tool(describe_tool_use(&name, &input)));
                        }
                        ContentBlock::Other => {}
                    }
                }
            }
            Ok(StreamEvent::Result { result, is_error }) => {
                self.final_result = result;
                self.reported_error = is_error;
            }
            Ok(StreamEvent::Other) => {}
            Err(_) => {
                // Not a stream event, likely raw text output
                self.plain_output.push_str(line);
                self.plain_output.push('\n');
            }
        }
    }

    pub(crate) fn finish(mut self) -> Result<AgentResponse, AgentError> {
        if self.reported_error {
            let reason = self
                .final_result
                .unwrap_or_else(|| "no error details".to_string());
            return Err(AgentError::Reported(reason));
        }

        let final_text = self.final_result.or_else(|| {
            let plain = self.plain_output.trim();
            (!plain.is_empty()).then(|| plain.to_string())
        });
        if let Some(text) = final_text {
            let duplicate = self
                .response
                .messages
                .last()
                .is_some_and(|m| m.content.trim() == text.trim());
            if !duplicate {
                self.response.messages.push(AgentMessage::assistant(text));
            }
        }

        if self.response.messages.is_empty() {
            warn!("agent produced no output");
        }
        Ok(self.response)
    }
}
