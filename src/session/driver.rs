//! Per-session task: negotiation, line editing and command execution.
//!
//! A driver owns one [`SessionGuard`]. It reads [`ChannelEvent`]s from the
//! transport and writes [`ChannelOutput`]s back until the client leaves,
//! the session is closed from outside, or the line editor sees Ctrl-D.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::channel::{ChannelEvent, ChannelOutput, ChannelRequest, CloseReason, StatusMessage};
use super::manager::SessionGuard;
use super::{SessionState, Terminal};
use crate::error::{ConsoleError, ShellError};
use crate::input::{Action, Editor, EscapeDecoder, DEFAULT_ESCAPE_TIMEOUT, DEFAULT_HISTORY_SIZE};
use crate::output::translate_newlines;
use crate::shell::{Invocation, Outcome, Shell};
use crate::Result;

/// Byte that interrupts a running command.
const INTERRUPT: u8 = 0x03;

/// Presentation settings for interactive sessions.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub prompt: String,
    /// Shown while a line continues after a trailing backslash.
    pub continuation_prompt: String,
    pub history_size: usize,
    /// How long a lone ESC waits for the rest of a sequence.
    pub escape_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            prompt: "$ ".to_string(),
            continuation_prompt: "> ".to_string(),
            history_size: DEFAULT_HISTORY_SIZE,
            escape_timeout: DEFAULT_ESCAPE_TIMEOUT,
        }
    }
}

/// Drive a session until it closes.
///
/// Sends a final [`StatusMessage::Closed`] and drops the guard, which frees
/// the session's slot in the manager.
pub async fn run_session(
    guard: SessionGuard,
    shell: Shell,
    config: DriverConfig,
    events: mpsc::Receiver<ChannelEvent>,
    output: mpsc::Sender<ChannelOutput>,
) {
    let mut driver = Driver {
        guard,
        shell,
        config,
        events,
        output,
        pending: VecDeque::new(),
        echo: false,
        eof: false,
    };

    let reason = match driver.run().await {
        Ok(reason) => reason,
        Err(ConsoleError::ChannelClosed) => CloseReason::ClientClosed,
        Err(e) => {
            warn!(session = %driver.guard.id(), error = %e, "session failed");
            let _ = driver
                .status(StatusMessage::Error {
                    code: "PROTOCOL_ERROR".to_string(),
                    message: e.to_string(),
                })
                .await;
            CloseReason::ProtocolError
        }
    };

    let reason = driver.guard.close(reason);
    let _ = driver
        .status(StatusMessage::Closed {
            reason: reason.to_string(),
        })
        .await;
}

enum Next {
    Event(Option<ChannelEvent>),
    EscapeTimeout,
    Cancelled,
}

/// How a submitted line ended.
enum LineEnd {
    Done(Outcome),
    Closed(CloseReason),
}

struct Driver {
    guard: SessionGuard,
    shell: Shell,
    config: DriverConfig,
    events: mpsc::Receiver<ChannelEvent>,
    output: mpsc::Sender<ChannelOutput>,
    /// Input that arrived while a command ran, or not yet fed to the decoder.
    pending: VecDeque<u8>,
    /// Echo keystrokes and print prompts; set when a terminal is allocated.
    echo: bool,
    /// `eof` arrived while a command ran; honoured once `pending` drains.
    eof: bool,
}

impl Driver {
    async fn run(&mut self) -> Result<CloseReason> {
        loop {
            match self.next(false).await {
                Next::Cancelled => return Ok(self.cancelled_reason()),
                Next::Event(None | Some(ChannelEvent::Closed)) => return Ok(CloseReason::ClientClosed),
                Next::Event(Some(ChannelEvent::Malformed(detail))) => {
                    return Err(ConsoleError::Protocol(detail))
                }
                Next::Event(Some(ChannelEvent::Data(bytes))) => {
                    trace!(session = %self.guard.id(), len = bytes.len(), "input before shell ignored");
                }
                Next::Event(Some(ChannelEvent::Request(request))) => match request {
                    ChannelRequest::Shell => {
                        self.guard.transition(SessionState::Interactive)?;
                        return self.interactive().await;
                    }
                    ChannelRequest::Exec { command } => {
                        self.guard.transition(SessionState::Executing)?;
                        return self.exec(command).await;
                    }
                    ChannelRequest::Eof => return Ok(CloseReason::ClientClosed),
                    other => self.apply(other)?,
                },
                Next::EscapeTimeout => {}
            }
        }
    }

    /// Requests valid in any phase.
    fn apply(&mut self, request: ChannelRequest) -> Result<()> {
        match request {
            ChannelRequest::PtyReq { term, cols, rows } => {
                debug!(session = %self.guard.id(), %term, cols, rows, "terminal allocated");
                self.guard.set_terminal(Terminal::new(term, cols, rows));
            }
            ChannelRequest::Env { name, value } => self.guard.set_env(name, value),
            ChannelRequest::WindowChange { cols, rows } => {
                self.guard.resize(cols, rows);
            }
            other => {
                return Err(ConsoleError::Protocol(format!(
                    "unexpected {other:?} in state {:?}",
                    self.guard.state()
                )))
            }
        }
        Ok(())
    }

    async fn exec(&mut self, command: String) -> Result<CloseReason> {
        info!(session = %self.guard.id(), user = self.guard.user(), "exec request");
        match self.run_line(command).await? {
            LineEnd::Done(outcome) => {
                self.write_output(&outcome.render()).await?;
                self.status(StatusMessage::ExitStatus {
                    code: outcome.exit_code(),
                })
                .await?;
                Ok(CloseReason::Exited)
            }
            LineEnd::Closed(reason) => Ok(reason),
        }
    }

    async fn interactive(&mut self) -> Result<CloseReason> {
        self.echo = self.guard.terminal().is_some();
        info!(session = %self.guard.id(), user = self.guard.user(), pty = self.echo, "shell started");

        let mut editor = Editor::new(
            self.config.prompt.clone(),
            self.config.continuation_prompt.clone(),
            self.config.history_size,
        );
        let mut decoder = EscapeDecoder::new();
        self.echo_bytes(editor.prompt().as_bytes()).await?;

        loop {
            if let Some(byte) = self.pending.pop_front() {
                if let Some(reason) = self.key_input(byte, &mut decoder, &mut editor).await? {
                    return Ok(reason);
                }
                continue;
            }
            if self.eof {
                return Ok(CloseReason::EndOfInput);
            }

            match self.next(decoder.is_pending()).await {
                Next::Cancelled => return Ok(self.cancelled_reason()),
                Next::EscapeTimeout => decoder.expire(),
                Next::Event(None | Some(ChannelEvent::Closed)) => return Ok(CloseReason::ClientClosed),
                Next::Event(Some(ChannelEvent::Malformed(detail))) => {
                    return Err(ConsoleError::Protocol(detail))
                }
                Next::Event(Some(ChannelEvent::Data(bytes))) => {
                    self.guard.touch();
                    self.pending.extend(bytes);
                }
                Next::Event(Some(ChannelEvent::Request(request))) => match request {
                    ChannelRequest::Eof => return Ok(CloseReason::EndOfInput),
                    ChannelRequest::WindowChange { cols, rows } => {
                        if self.guard.resize(cols, rows) {
                            self.echo_bytes(&editor.repaint()).await?;
                        }
                    }
                    other => self.apply(other)?,
                },
            }
        }
    }

    /// Feed one input byte through the decoder and editor. Returns a reason
    /// when the session should end.
    async fn key_input(
        &mut self,
        byte: u8,
        decoder: &mut EscapeDecoder,
        editor: &mut Editor,
    ) -> Result<Option<CloseReason>> {
        let Some(key) = decoder.feed(byte) else {
            return Ok(None);
        };
        let step = editor.handle(key, self.shell.registry());
        self.echo_bytes(&step.echo).await?;

        match step.action {
            Action::None | Action::Interrupt => Ok(None),
            Action::Close => Ok(Some(CloseReason::EndOfInput)),
            Action::Submit(line) => {
                if !line.trim().is_empty() {
                    match self.run_line(line).await? {
                        LineEnd::Done(outcome) => {
                            self.write_output(&outcome.render()).await?;
                            self.guard.transition(SessionState::Interactive)?;
                        }
                        LineEnd::Closed(reason) => return Ok(Some(reason)),
                    }
                }
                self.echo_bytes(editor.prompt().as_bytes()).await?;
                Ok(None)
            }
        }
    }

    /// Run one line on the blocking pool.
    ///
    /// Ctrl-C cancels it; other input is queued for the editor. Closing the
    /// session or losing the client stops waiting without joining the
    /// command.
    async fn run_line(&mut self, line: String) -> Result<LineEnd> {
        if self.guard.state() != SessionState::Executing {
            self.guard.transition(SessionState::Executing)?;
        }
        self.guard.record_command();
        debug!(session = %self.guard.id(), command = %line, "running line");

        let session_cancel = self.guard.cancel().clone();
        let cancel = session_cancel.child_token();
        let invocation = Invocation::new(cancel.clone())
            .with_user(self.guard.user())
            .with_env(self.guard.env());
        let shell = self.shell.clone();
        let mut task = tokio::task::spawn_blocking(move || shell.run(&line, &invocation));

        let joined = loop {
            tokio::select! {
                joined = &mut task => break joined,
                _ = session_cancel.cancelled() => {
                    return Ok(LineEnd::Closed(self.cancelled_reason()));
                }
                event = self.events.recv() => match event {
                    Some(ChannelEvent::Data(bytes)) => {
                        self.guard.touch();
                        for byte in bytes {
                            if byte == INTERRUPT {
                                debug!(session = %self.guard.id(), "interrupt");
                                cancel.cancel();
                            } else {
                                self.pending.push_back(byte);
                            }
                        }
                    }
                    Some(ChannelEvent::Request(ChannelRequest::WindowChange { cols, rows })) => {
                        self.guard.resize(cols, rows);
                    }
                    Some(ChannelEvent::Request(ChannelRequest::Env { name, value })) => {
                        self.guard.set_env(name, value);
                    }
                    Some(ChannelEvent::Request(ChannelRequest::Eof)) => self.eof = true,
                    Some(ChannelEvent::Request(other)) => {
                        trace!(session = %self.guard.id(), request = ?other, "request ignored while executing");
                    }
                    None | Some(ChannelEvent::Closed) => {
                        cancel.cancel();
                        return Ok(LineEnd::Closed(CloseReason::ClientClosed));
                    }
                    Some(ChannelEvent::Malformed(detail)) => {
                        cancel.cancel();
                        return Err(ConsoleError::Protocol(detail));
                    }
                },
            }
        };

        let outcome = joined.unwrap_or_else(|e| {
            warn!(session = %self.guard.id(), error = %e, "command task failed");
            Outcome {
                output: String::new(),
                error: Some(ShellError::failed("command aborted")),
                duration: Duration::ZERO,
            }
        });
        debug!(
            session = %self.guard.id(),
            code = outcome.exit_code(),
            elapsed_ms = outcome.duration.as_millis() as u64,
            "line finished"
        );
        Ok(LineEnd::Done(outcome))
    }

    async fn next(&mut self, escape_pending: bool) -> Next {
        let cancel = self.guard.cancel().clone();
        if escape_pending {
            let timeout = self.config.escape_timeout;
            tokio::select! {
                _ = cancel.cancelled() => Next::Cancelled,
                event = tokio::time::timeout(timeout, self.events.recv()) => match event {
                    Ok(event) => Next::Event(event),
                    Err(_) => Next::EscapeTimeout,
                },
            }
        } else {
            tokio::select! {
                _ = cancel.cancelled() => Next::Cancelled,
                event = self.events.recv() => Next::Event(event),
            }
        }
    }

    fn cancelled_reason(&self) -> CloseReason {
        self.guard.close_reason().unwrap_or(CloseReason::Killed)
    }

    async fn echo_bytes(&self, bytes: &[u8]) -> Result<()> {
        if !self.echo || bytes.is_empty() {
            return Ok(());
        }
        self.send(ChannelOutput::Data(bytes.to_vec())).await
    }

    /// Command output followed by a newline; `\r\n` line ends on a terminal.
    async fn write_output(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let mut text = format!("{text}\n");
        if self.guard.terminal().is_some() {
            text = translate_newlines(&text);
        }
        self.send(ChannelOutput::Data(text.into_bytes())).await
    }

    async fn status(&self, message: StatusMessage) -> Result<()> {
        self.send(ChannelOutput::Status(message)).await
    }

    async fn send(&self, message: ChannelOutput) -> Result<()> {
        self.output
            .send(message)
            .await
            .map_err(|_| ConsoleError::ChannelClosed)
    }
}
