//! Speech output capability.
//!
//! `SpeechSink::speak` starts an utterance and returns immediately. When the
//! utterance finishes on its own the sink fires the `CompletionNotifier` it
//! was handed, exactly once; a cancelled utterance never fires. Completions
//! travel over a channel owned by the session, so they can arrive at any
//! point relative to exits and safety-valve resets.

use anyhow::{anyhow, Context, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Identifies one `speak` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtteranceId(u64);

impl UtteranceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
}

pub type CompletionReceiver = mpsc::UnboundedReceiver<UtteranceId>;

/// Mints completion notifiers for new utterances.
#[derive(Clone, Debug)]
pub struct CompletionSender {
    tx: mpsc::UnboundedSender<UtteranceId>,
}

impl CompletionSender {
    pub fn notifier(&self, id: UtteranceId) -> CompletionNotifier {
        CompletionNotifier {
            id,
            tx: self.tx.clone(),
        }
    }
}

pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CompletionSender { tx }, rx)
}

/// One-shot "speech finished" signal for a single utterance.
#[derive(Debug)]
pub struct CompletionNotifier {
    id: UtteranceId,
    tx: mpsc::UnboundedSender<UtteranceId>,
}

impl CompletionNotifier {
    pub fn id(&self) -> UtteranceId {
        self.id
    }

    pub fn notify(self) {
        if self.tx.send(self.id).is_err() {
            log::debug!("speech completion {} dropped: session closed", self.id);
        }
    }
}

/// Speech output backend.
pub trait SpeechSink: Send {
    fn name(&self) -> &'static str;

    /// Start speaking. `done` must be fired once if the utterance ends
    /// naturally, and never if it is cancelled.
    fn speak(&mut self, utterance: &Utterance, done: CompletionNotifier) -> Result<()>;

    /// Stop any in-flight utterance. Safe to call when nothing is speaking.
    fn cancel(&mut self) -> Result<()>;
}

const MIN_CONSOLE_UTTERANCE: Duration = Duration::from_millis(500);

/// Logs announcements and simulates their speaking time.
pub struct ConsoleSpeech {
    words_per_minute: u32,
    pending: Option<JoinHandle<()>>,
}

impl ConsoleSpeech {
    pub fn new(words_per_minute: u32) -> Self {
        Self {
            words_per_minute: words_per_minute.max(1),
            pending: None,
        }
    }

    /// Estimated speaking time for `text`.
    pub fn estimate(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as u64;
        let millis = words * 60_000 / self.words_per_minute as u64;
        Duration::from_millis(millis).max(MIN_CONSOLE_UTTERANCE)
    }
}

impl SpeechSink for ConsoleSpeech {
    fn name(&self) -> &'static str {
        "console"
    }

    fn speak(&mut self, utterance: &Utterance, done: CompletionNotifier) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| anyhow!("console speech requires a tokio runtime"))?;
        if let Some(previous) = self.pending.take() {
            previous.abort();
        }
        let duration = self.estimate(&utterance.text);
        log::info!("announce {}: \"{}\"", utterance.id, utterance.text);
        self.pending = Some(runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            done.notify();
        }));
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        Ok(())
    }
}

/// Speaks through an external TTS program, e.g. `espeak-ng` or `say`.
///
/// The announcement text is appended as the final argument. Completion fires
/// when the process exits; `cancel` kills it.
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
    active: Option<oneshot::Sender<()>>,
}

impl CommandSpeech {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        let mut argv = argv.into_iter();
        let program = argv
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| anyhow!("speech command must name a program"))?;
        Ok(Self {
            program,
            args: argv.collect(),
            active: None,
        })
    }
}

impl SpeechSink for CommandSpeech {
    fn name(&self) -> &'static str {
        "command"
    }

    fn speak(&mut self, utterance: &Utterance, done: CompletionNotifier) -> Result<()> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(&utterance.text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start speech program '{}'", self.program))?;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        // Replacing the sender stops any previous process.
        self.active = Some(stop_tx);

        let id = utterance.id;
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) if !status.success() => {
                            log::warn!("speech program exited with {} for {}", status, id);
                        }
                        Err(e) => log::warn!("speech program wait failed for {}: {}", id, e),
                        Ok(_) => {}
                    }
                    done.notify();
                }
                _ = stop_rx => {
                    if let Err(e) = child.kill().await {
                        log::debug!("speech program for {} already gone: {}", id, e);
                    }
                }
            }
        });
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        if let Some(stop) = self.active.take() {
            let _ = stop.send(());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_estimate_scales_with_words() {
        let speech = ConsoleSpeech::new(120);
        assert_eq!(speech.estimate("Person detected"), Duration::from_millis(1000));
        assert_eq!(speech.estimate(""), MIN_CONSOLE_UTTERANCE);
    }

    #[tokio::test(start_paused = true)]
    async fn console_speech_signals_completion() {
        let (sender, mut rx) = completion_channel();
        let mut speech = ConsoleSpeech::new(160);
        let utterance = Utterance {
            id: UtteranceId::new(7),
            text: "Person detected".to_string(),
        };
        speech.speak(&utterance, sender.notifier(utterance.id)).unwrap();

        let finished = rx.recv().await.unwrap();
        assert_eq!(finished, UtteranceId::new(7));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_console_speech_never_completes() {
        let (sender, mut rx) = completion_channel();
        let mut speech = ConsoleSpeech::new(160);
        let utterance = Utterance {
            id: UtteranceId::new(1),
            text: "Person detected".to_string(),
        };
        speech.speak(&utterance, sender.notifier(utterance.id)).unwrap();
        speech.cancel().unwrap();
        speech.cancel().unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn console_speech_outside_runtime_fails() {
        let (sender, _rx) = completion_channel();
        let mut speech = ConsoleSpeech::new(160);
        let utterance = Utterance {
            id: UtteranceId::new(1),
            text: "hi".to_string(),
        };
        assert!(speech.speak(&utterance, sender.notifier(utterance.id)).is_err());
    }

    #[test]
    fn command_speech_requires_program() {
        assert!(CommandSpeech::new(Vec::new()).is_err());
        assert!(CommandSpeech::new(vec![" ".to_string()]).is_err());
        assert!(CommandSpeech::new(vec!["espeak-ng".to_string(), "-s".to_string()]).is_ok());
    }

    #[tokio::test]
    async fn missing_speech_program_is_an_error() {
        let (sender, _rx) = completion_channel();
        let mut speech =
            CommandSpeech::new(vec!["/nonexistent/presence-sentry-tts".to_string()]).unwrap();
        let utterance = Utterance {
            id: UtteranceId::new(1),
            text: "hi".to_string(),
        };
        assert!(speech.speak(&utterance, sender.notifier(utterance.id)).is_err());
    }
}
