use std::{path::PathBuf, time::Duration};

use futures::{FutureExt, future::BoxFuture};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{
    error::PlaybackError,
    hub::{Payload, Producer},
};

pub const DEFAULT_ENTRY_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_CYCLE_DELAY: Duration = Duration::from_millis(1000);

/// Pre-serialized payloads, replayed in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DemoRecording {
    entries: Vec<Payload>,
}

#[derive(Deserialize)]
struct RecordingFile {
    results: Vec<RecordingEntry>,
}

#[derive(Deserialize)]
struct RecordingEntry {
    data: serde_json::Value,
}

impl DemoRecording {
    pub fn new(entries: Vec<Payload>) -> Self {
        Self { entries }
    }

    /// Parses `{ "results": [ { "data": ... } ] }`. String data is kept
    /// verbatim, anything else is re-serialized compactly.
    pub fn from_json(json: &str) -> Result<Self, PlaybackError> {
        let file: RecordingFile = serde_json::from_str(json)?;
        let entries = file
            .results
            .into_iter()
            .map(|entry| match entry.data {
                serde_json::Value::String(s) => Payload::from(s),
                other => Payload::from(other.to_string()),
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub trait RecordingLoader: Send + Sync + 'static {
    fn load(&self) -> BoxFuture<'_, Result<DemoRecording, PlaybackError>>;
}

/// Loads the recording from a JSON file on disk.
pub struct FileRecording {
    path: PathBuf,
}

impl FileRecording {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordingLoader for FileRecording {
    fn load(&self) -> BoxFuture<'_, Result<DemoRecording, PlaybackError>> {
        async move {
            let json = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| PlaybackError::Read {
                    path: self.path.clone(),
                    source,
                })?;
            DemoRecording::from_json(&json)
        }
        .boxed()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PlaybackTiming {
    /// Gap between two consecutive entries.
    pub entry_interval: Duration,
    /// Gap after the last entry before the sequence restarts, and the retry
    /// delay after a failed load.
    pub cycle_delay: Duration,
}

impl Default for PlaybackTiming {
    fn default() -> Self {
        Self {
            entry_interval: DEFAULT_ENTRY_INTERVAL,
            cycle_delay: DEFAULT_CYCLE_DELAY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Looping { position: usize },
}

/// What the driver does next, and how long it sleeps afterwards.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    Publish { payload: Payload, wait: Duration },
    Retry { wait: Duration },
}

/// Replays a [`DemoRecording`] forever: Idle → Looping → Idle, with a
/// failed load going back to Idle after `cycle_delay`.
pub struct DemoPlayback<L> {
    loader: L,
    timing: PlaybackTiming,
    recording: Option<DemoRecording>,
    state: PlaybackState,
}

impl<L: RecordingLoader> DemoPlayback<L> {
    pub fn new(loader: L, timing: PlaybackTiming) -> Self {
        Self {
            loader,
            timing,
            recording: None,
            state: PlaybackState::Idle,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Advances the state machine by one transition.
    pub async fn next_step(&mut self) -> Step {
        let retry = Step::Retry {
            wait: self.timing.cycle_delay,
        };
        if self.recording.is_none() {
            match self.load().await {
                Ok(recording) => self.recording = Some(recording),
                Err(e) => {
                    log::error!(
                        "playback: {}, retrying in {:?}",
                        e,
                        self.timing.cycle_delay
                    );
                    self.state = PlaybackState::Idle;
                    return retry;
                }
            }
        }
        let Some(recording) = self.recording.as_ref() else {
            return retry;
        };

        let position = match self.state {
            PlaybackState::Idle => 0,
            PlaybackState::Looping { position } => position,
        };
        let payload = recording.entries[position].clone();
        let next = position + 1;
        if next < recording.len() {
            self.state = PlaybackState::Looping { position: next };
            Step::Publish {
                payload,
                wait: self.timing.entry_interval,
            }
        } else {
            log::debug!("playback: cycle of {} entries done", recording.len());
            self.state = PlaybackState::Idle;
            Step::Publish {
                payload,
                wait: self.timing.cycle_delay,
            }
        }
    }

    async fn load(&self) -> Result<DemoRecording, PlaybackError> {
        let recording = self.loader.load().await?;
        if recording.is_empty() {
            return Err(PlaybackError::Empty);
        }
        log::info!("playback: loaded {} entries", recording.len());
        Ok(recording)
    }

    /// Drives the loop until `cancel` fires. Never returns on its own.
    pub async fn run(mut self, producer: Producer, cancel: CancellationToken) {
        log::info!("playback: started");
        loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => break,
                step = self.next_step() => step,
            };
            let wait = match step {
                Step::Publish { payload, wait } => {
                    producer.publish_payload(payload);
                    wait
                }
                Step::Retry { wait } => wait,
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        log::info!("playback: stopped");
    }
}

#[cfg(test)]
#[path = "playback_test.rs"]
mod playback_test;
