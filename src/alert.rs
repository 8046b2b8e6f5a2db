//! Announcement gating.
//!
//! `AlertController` is the only caller of `SpeechSink::speak` and
//! `SpeechSink::cancel`. It allows one utterance at a time:
//!
//! | state    | input                      | action        | next     |
//! |----------|----------------------------|---------------|----------|
//! | Idle     | Enter(other)               | speak         | Speaking |
//! | Speaking | Enter(other)               | -             | Speaking |
//! | Speaking | Exit                       | cancel        | Idle     |
//! | Idle     | Exit                       | -             | Idle     |
//! | Speaking | completion (current id)    | -             | Idle     |
//! | any      | completion (other id)      | -             | same     |
//! | Speaking | safety valve / silence     | cancel        | Idle     |
//! | Idle     | safety valve / silence     | -             | Idle     |
//!
//! Speech failures fail open: a `speak` error leaves the controller `Idle`,
//! a `cancel` error still moves it to `Idle`.

use crate::error::SentryError;
use crate::presence::PresenceEvent;
use crate::speech::{CompletionSender, SpeechSink, Utterance, UtteranceId};

const ANNOUNCEMENT_PREFIX: &str = "Person detected";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertState {
    Idle,
    Speaking(UtteranceId),
}

impl AlertState {
    pub fn is_speaking(&self) -> bool {
        matches!(self, AlertState::Speaking(_))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AlertStats {
    pub announcements: u64,
    pub suppressed_enters: u64,
    pub cancellations: u64,
    pub forced_resets: u64,
    pub natural_completions: u64,
    pub stale_completions: u64,
    pub speech_failures: u64,
}

/// Build the spoken message for a person entering with `other_classes`.
pub fn compose_announcement(other_classes: &[String]) -> String {
    if other_classes.is_empty() {
        ANNOUNCEMENT_PREFIX.to_string()
    } else {
        format!("{}, with: {}", ANNOUNCEMENT_PREFIX, other_classes.join(", "))
    }
}

pub struct AlertController {
    sink: Box<dyn SpeechSink>,
    completions: CompletionSender,
    state: AlertState,
    next_id: UtteranceId,
    stats: AlertStats,
}

impl AlertController {
    pub fn new(sink: Box<dyn SpeechSink>, completions: CompletionSender) -> Self {
        Self {
            sink,
            completions,
            state: AlertState::Idle,
            next_id: UtteranceId::new(1),
            stats: AlertStats::default(),
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn stats(&self) -> AlertStats {
        self.stats
    }

    pub fn handle(&mut self, event: &PresenceEvent) {
        match event {
            PresenceEvent::Enter { other_classes } => self.on_enter(other_classes),
            PresenceEvent::Exit => self.on_exit(),
        }
    }

    fn on_enter(&mut self, other_classes: &[String]) {
        if let AlertState::Speaking(current) = self.state {
            self.stats.suppressed_enters += 1;
            log::debug!("person entered while {} is active; not re-announcing", current);
            return;
        }

        let utterance = Utterance {
            id: self.next_id,
            text: compose_announcement(other_classes),
        };
        self.next_id = self.next_id.next();

        let done = self.completions.notifier(utterance.id);
        match self.sink.speak(&utterance, done) {
            Ok(()) => {
                self.stats.announcements += 1;
                self.state = AlertState::Speaking(utterance.id);
                log::info!(
                    "announcing {} via {}: \"{}\"",
                    utterance.id,
                    self.sink.name(),
                    utterance.text
                );
            }
            Err(e) => {
                self.stats.speech_failures += 1;
                let err = SentryError::SpeechFailure(format!("{:#}", e));
                log::warn!("{} for {}; staying idle", err, utterance.id);
            }
        }
    }

    fn on_exit(&mut self) {
        if let AlertState::Speaking(current) = self.state {
            log::info!("person left; cancelling {}", current);
            self.cancel_current();
        }
    }

    /// Natural end of an utterance, reported by the speech sink.
    pub fn on_speech_finished(&mut self, id: UtteranceId) {
        match self.state {
            AlertState::Speaking(current) if current == id => {
                self.stats.natural_completions += 1;
                self.state = AlertState::Idle;
                log::debug!("announcement {} finished", id);
            }
            _ => {
                self.stats.stale_completions += 1;
                log::debug!("ignoring stale completion for {}", id);
            }
        }
    }

    /// Periodic safety valve: force `Idle` whatever the completion signal did.
    pub fn on_safety_valve(&mut self) {
        if let AlertState::Speaking(current) = self.state {
            log::warn!("safety valve: forcing {} to stop", current);
            self.stats.forced_resets += 1;
            self.cancel_current();
        }
    }

    /// Operator "stop announcement".
    pub fn silence(&mut self) {
        if let AlertState::Speaking(current) = self.state {
            log::info!("announcement {} silenced", current);
            self.cancel_current();
        }
    }

    /// Session teardown: stop any in-flight speech.
    pub fn shutdown(&mut self) {
        if self.state.is_speaking() {
            self.cancel_current();
        }
    }

    fn cancel_current(&mut self) {
        self.stats.cancellations += 1;
        if let Err(e) = self.sink.cancel() {
            self.stats.speech_failures += 1;
            let err = SentryError::SpeechFailure(format!("{:#}", e));
            log::warn!("{} on cancel; resetting anyway", err);
        }
        self.state = AlertState::Idle;
    }
}
