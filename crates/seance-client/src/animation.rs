//! Letter-by-letter reveal of spirit responses.
//!
//! A response carries one delay per character. [`AnimationSynchronizer`]
//! plays at most one [`RevealSequence`] at a time: starting a new one
//! supersedes the old, and nothing of the old one is emitted afterwards.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use seance_core::envelope::SpiritResponsePayload;

use crate::errors::ClientError;

/// A text plus per-character delays in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealSequence {
    chars: Vec<char>,
    timings: Vec<u64>,
}

impl RevealSequence {
    /// Pair `text` with `timings`, one per character.
    pub fn new(text: &str, timings: Vec<u64>) -> Result<Self, ClientError> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() != timings.len() {
            return Err(ClientError::TimingMismatch {
                chars: chars.len(),
                timings: timings.len(),
            });
        }
        Ok(Self { chars, timings })
    }

    /// Sequence for a `spirit_response` payload.
    pub fn from_payload(payload: &SpiritResponsePayload) -> Result<Self, ClientError> {
        Self::new(&payload.message, payload.letter_timings.clone())
    }

    /// Number of characters.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Whether there is nothing to reveal.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Sum of all delays.
    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.timings.iter().sum())
    }

    /// Yields `(index, char)` after each character's delay.
    ///
    /// Nothing runs until polled; each call starts from the beginning.
    pub fn stream(&self) -> Pin<Box<dyn Stream<Item = (usize, char)> + Send + 'static>> {
        let chars = self.chars.clone();
        let timings = self.timings.clone();
        Box::pin(async_stream::stream! {
            for (index, (ch, delay)) in chars.into_iter().zip(timings).enumerate() {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                yield (index, ch);
            }
        })
    }
}

/// Output of the synchronizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevealEvent {
    /// Show character `ch` at `index`.
    Reveal {
        /// Sequence this belongs to.
        version: u64,
        /// Character position.
        index: usize,
        /// The character.
        ch: char,
    },
    /// Sequence `version` finished.
    Done {
        /// Finished sequence.
        version: u64,
    },
}

/// Where the current reveal is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RevealCursor {
    /// Version of the latest started sequence.
    pub version: u64,
    /// Characters revealed so far in that sequence.
    pub index: usize,
    /// Whether that sequence is still playing.
    pub running: bool,
}

/// Plays one reveal at a time.
pub struct AnimationSynchronizer {
    cursor: Arc<Mutex<RevealCursor>>,
    events: mpsc::UnboundedSender<RevealEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AnimationSynchronizer {
    /// New synchronizer and the receiver its events go to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RevealEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let synchronizer = Self {
            cursor: Arc::new(Mutex::new(RevealCursor::default())),
            events,
            task: Mutex::new(None),
        };
        (synchronizer, rx)
    }

    /// Start `sequence`, superseding whatever is playing. Returns its version.
    pub fn start(&self, sequence: RevealSequence) -> u64 {
        let mut task = self.task.lock();
        let version = {
            let mut cursor = self.cursor.lock();
            cursor.version += 1;
            cursor.index = 0;
            cursor.running = true;
            cursor.version
        };
        if let Some(previous) = task.take() {
            previous.abort();
        }
        debug!(version, chars = sequence.len(), "reveal started");

        let cursor = Arc::clone(&self.cursor);
        let events = self.events.clone();
        *task = Some(tokio::spawn(play(sequence, version, cursor, events)));
        version
    }

    /// Stop the current reveal without a `Done` event.
    pub fn cancel(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        let mut cursor = self.cursor.lock();
        cursor.version += 1;
        cursor.running = false;
    }

    /// Snapshot of the cursor.
    pub fn cursor(&self) -> RevealCursor {
        *self.cursor.lock()
    }

    /// Whether a sequence is playing.
    pub fn is_running(&self) -> bool {
        self.cursor.lock().running
    }
}

impl Drop for AnimationSynchronizer {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn play(
    sequence: RevealSequence,
    version: u64,
    cursor: Arc<Mutex<RevealCursor>>,
    events: mpsc::UnboundedSender<RevealEvent>,
) {
    let mut reveals = sequence.stream();
    while let Some((index, ch)) = reveals.next().await {
        let mut guard = cursor.lock();
        if guard.version != version {
            return;
        }
        guard.index = index + 1;
        let _ = events.send(RevealEvent::Reveal { version, index, ch });
    }

    let mut guard = cursor.lock();
    if guard.version == version {
        guard.running = false;
        let _ = events.send(RevealEvent::Done { version });
    }
}
