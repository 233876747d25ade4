//! Single-shot speech capture.
//!
//! [`SpeechCapture`] is an idle/listening state machine fed by events from a
//! [`RecognitionEngine`]. Engines report over a channel; every event carries
//! the number of the session it belongs to so late events from an aborted
//! session cannot leak into the next one.

use std::io::Read;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use thiserror::Error;

/// Reason reported by engines when a session ends because the user cancelled it
pub const ABORTED: &str = "aborted";

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Speech recognition is not available, set `speech_command` in the config file")]
    Unsupported,
    #[error("Failed to start recognizer: {0}")]
    StartFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Started,
    Result(String),
    Ended,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechState {
    Idle,
    Listening,
}

/// Handle an engine uses to report events for one session
#[derive(Debug, Clone)]
pub struct EventSink {
    session: u64,
    tx: Sender<(u64, RecognitionEvent)>,
}

impl EventSink {
    pub fn send(&self, event: RecognitionEvent) {
        // The capture may already be gone; nothing to report to then.
        let _ = self.tx.send((self.session, event));
    }
}

pub trait RecognitionEngine {
    /// Begin capturing. Events for this session go to `sink`.
    fn start(&mut self, sink: EventSink) -> Result<(), SpeechError>;
    /// Stop capturing and deliver whatever was recognized
    fn stop(&mut self);
    /// Stop capturing and drop any result
    fn abort(&mut self);
}

pub struct SpeechCapture {
    engine: Option<Box<dyn RecognitionEngine>>,
    state: SpeechState,
    transcript: String,
    error: Option<String>,
    session: u64,
    aborted: bool,
    delivered: bool,
    tx: Sender<(u64, RecognitionEvent)>,
    rx: Receiver<(u64, RecognitionEvent)>,
}

impl SpeechCapture {
    /// A capture with no engine reports "unsupported" instead of listening
    pub fn new(engine: Option<Box<dyn RecognitionEngine>>) -> Self {
        let (tx, rx) = mpsc::channel();
        let error = if engine.is_none() {
            Some(SpeechError::Unsupported.to_string())
        } else {
            None
        };
        Self {
            engine,
            state: SpeechState::Idle,
            transcript: String::new(),
            error,
            session: 0,
            aborted: false,
            delivered: true,
            tx,
            rx,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.engine.is_some()
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == SpeechState::Listening
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Start a new session. Does nothing while a session is already listening.
    pub fn start(&mut self) {
        if self.is_listening() {
            tracing::debug!("Speech capture already listening, ignoring start");
            return;
        }
        self.transcript.clear();
        self.error = None;

        let Some(engine) = self.engine.as_mut() else {
            self.error = Some(SpeechError::Unsupported.to_string());
            return;
        };

        self.session += 1;
        self.aborted = false;
        self.delivered = false;
        let sink = EventSink { session: self.session, tx: self.tx.clone() };
        match engine.start(sink) {
            Ok(()) => {
                self.state = SpeechState::Listening;
                tracing::info!(session = self.session, "Speech capture started");
            }
            Err(e) => {
                tracing::error!("Speech recognition start failed: {}", e);
                self.error = Some(e.to_string());
                self.delivered = true;
            }
        }
    }

    /// End capture; the transcript (once recognized) is kept
    pub fn stop(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
    }

    /// End capture and discard the transcript, including one still in flight
    pub fn abort(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.abort();
        }
        self.state = SpeechState::Idle;
        self.transcript.clear();
        self.aborted = true;
        self.delivered = true;
        tracing::info!(session = self.session, "Speech capture aborted");
    }

    /// Apply pending engine events. Returns the transcript of a finished
    /// session exactly once.
    pub fn poll(&mut self) -> Option<String> {
        while let Ok((session, event)) = self.rx.try_recv() {
            if session != self.session {
                continue;
            }
            self.apply(event);
        }

        if self.state == SpeechState::Idle && !self.delivered && !self.aborted {
            self.delivered = true;
            if !self.transcript.is_empty() {
                return Some(self.transcript.clone());
            }
        }
        None
    }

    fn apply(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => {
                if !self.aborted {
                    self.state = SpeechState::Listening;
                }
            }
            RecognitionEvent::Result(text) => {
                if !self.aborted {
                    self.transcript = text;
                }
            }
            RecognitionEvent::Ended => {
                self.state = SpeechState::Idle;
            }
            RecognitionEvent::Error(reason) => {
                if reason != ABORTED {
                    tracing::warn!("Speech recognition error: {}", reason);
                    self.error = Some(reason);
                    self.transcript.clear();
                }
                self.state = SpeechState::Idle;
            }
        }
    }
}

/// Runs an external recognizer. The command's stdout is the transcript;
/// closing its stdin asks it to finish, killing it cancels.
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    running: Option<Running>,
}

struct Running {
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    aborted: Arc<AtomicBool>,
}

impl CommandEngine {
    /// `argv` is the program followed by its arguments; `None` when empty
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            running: None,
        })
    }
}

impl RecognitionEngine for CommandEngine {
    fn start(&mut self, sink: EventSink) -> Result<(), SpeechError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SpeechError::StartFailed(format!("{}: {}", self.program, e)))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let child = Arc::new(Mutex::new(child));
        let aborted = Arc::new(AtomicBool::new(false));

        sink.send(RecognitionEvent::Started);

        let waiter = Arc::clone(&child);
        let was_aborted = Arc::clone(&aborted);
        thread::spawn(move || {
            let diagnostics = thread::spawn(move || {
                let mut text = String::new();
                if let Some(mut err) = stderr {
                    let _ = err.read_to_string(&mut text);
                }
                text
            });

            let mut transcript = String::new();
            if let Some(mut out) = stdout {
                if let Err(e) = out.read_to_string(&mut transcript) {
                    tracing::warn!("Failed to read recognizer output: {}", e);
                }
            }
            let diagnostics = diagnostics.join().unwrap_or_default();

            let status = match waiter.lock() {
                Ok(mut child) => child.wait(),
                Err(poisoned) => poisoned.into_inner().wait(),
            };

            if was_aborted.load(Ordering::SeqCst) {
                sink.send(RecognitionEvent::Error(ABORTED.to_string()));
            } else {
                match status {
                    Ok(status) if status.success() => {
                        let text = transcript.trim();
                        if !text.is_empty() {
                            sink.send(RecognitionEvent::Result(text.to_string()));
                        }
                    }
                    Ok(status) => {
                        let reason = diagnostics.trim();
                        let reason = if reason.is_empty() {
                            format!("recognizer exited with {}", status)
                        } else {
                            reason.to_string()
                        };
                        sink.send(RecognitionEvent::Error(reason));
                    }
                    Err(e) => sink.send(RecognitionEvent::Error(e.to_string())),
                }
            }
            sink.send(RecognitionEvent::Ended);
        });

        self.running = Some(Running { child, stdin, aborted });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(running) = self.running.as_mut() {
            // EOF on stdin marks the end of the utterance
            running.stdin.take();
        }
    }

    fn abort(&mut self) {
        if let Some(mut running) = self.running.take() {
            running.aborted.store(true, Ordering::SeqCst);
            running.stdin.take();
            // A held lock means the reader is already reaping the process
            if let Ok(mut child) = running.child.try_lock() {
                if let Err(e) = child.kill() {
                    tracing::debug!("Recognizer already exited: {}", e);
                }
            }
        }
    }
}
