use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{
    DemoPlayback, DemoRecording, FileRecording, PlaybackState, PlaybackTiming, RecordingLoader,
    Step,
};
use crate::{error::PlaybackError, hub::BroadcastHub, hub::Payload};

struct ScriptedLoader {
    calls: Arc<AtomicUsize>,
    failures: usize,
    recording: DemoRecording,
}

impl ScriptedLoader {
    fn new(entries: &[&str], failures: usize) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = Self {
            calls: Arc::clone(&calls),
            failures,
            recording: DemoRecording::new(entries.iter().map(|e| Payload::from(*e)).collect()),
        };
        (loader, calls)
    }
}

impl RecordingLoader for ScriptedLoader {
    fn load(&self) -> BoxFuture<'_, Result<DemoRecording, PlaybackError>> {
        async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
                return Err(PlaybackError::Parse(err));
            }
            Ok(self.recording.clone())
        }
        .boxed()
    }
}

fn publish(payload: &str, wait: Duration) -> Step {
    Step::Publish {
        payload: Payload::from(payload),
        wait,
    }
}

const INTERVAL: Duration = Duration::from_millis(500);
const CYCLE: Duration = Duration::from_millis(1000);

#[tokio::test]
async fn test_loops_forever_and_loads_once() {
    let (loader, calls) = ScriptedLoader::new(&["A", "B"], 0);
    let mut playback = DemoPlayback::new(loader, PlaybackTiming::default());
    assert_eq!(playback.state(), PlaybackState::Idle);

    for _ in 0..3 {
        assert_eq!(playback.next_step().await, publish("A", INTERVAL));
        assert_eq!(playback.state(), PlaybackState::Looping { position: 1 });
        assert_eq!(playback.next_step().await, publish("B", CYCLE));
        assert_eq!(playback.state(), PlaybackState::Idle);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_load_failure_retries_after_cycle_delay() {
    let (loader, calls) = ScriptedLoader::new(&["A"], 2);
    let mut playback = DemoPlayback::new(loader, PlaybackTiming::default());

    assert_eq!(playback.next_step().await, Step::Retry { wait: CYCLE });
    assert_eq!(playback.state(), PlaybackState::Idle);
    assert_eq!(playback.next_step().await, Step::Retry { wait: CYCLE });
    assert_eq!(playback.next_step().await, publish("A", CYCLE));
    assert_eq!(playback.next_step().await, publish("A", CYCLE));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_empty_recording_is_retried() {
    let (loader, calls) = ScriptedLoader::new(&[], 0);
    let mut playback = DemoPlayback::new(loader, PlaybackTiming::default());
    assert_eq!(playback.next_step().await, Step::Retry { wait: CYCLE });
    assert_eq!(playback.next_step().await, Step::Retry { wait: CYCLE });
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_publishes_on_cadence() {
    let hub = BroadcastHub::new();
    let mut sub = hub.subscribe();
    let producer = hub.producer().unwrap();
    let cancel = CancellationToken::new();

    let (loader, _) = ScriptedLoader::new(&["A", "B"], 0);
    let playback = DemoPlayback::new(loader, PlaybackTiming::default());
    let handle = tokio::spawn(playback.run(producer, cancel.clone()));

    let start = Instant::now();
    let mut received = Vec::new();
    for _ in 0..5 {
        let payload = sub.recv().await.unwrap();
        received.push((payload.to_string(), start.elapsed()));
    }

    let expected = [
        ("A", 0),
        ("B", 500),
        ("A", 1500),
        ("B", 2000),
        ("A", 3000),
    ];
    for ((payload, at), (want, want_ms)) in received.iter().zip(expected) {
        assert_eq!(payload, want);
        let want = Duration::from_millis(want_ms);
        assert!(
            *at >= want && *at < want + Duration::from_millis(5),
            "{} at {:?}, expected {:?}",
            payload,
            at,
            want
        );
    }

    cancel.cancel();
    handle.await.unwrap();
    // Lease is released once playback stops.
    assert!(hub.producer().is_ok());
}

#[test]
fn test_recording_from_json_keeps_strings_verbatim() {
    let json = r#"{"results":[
        {"data":"{\"accel\":{\"x\":1,\"y\":0,\"z\":0}}"},
        {"data":{"aux":5}}
    ]}"#;
    let recording = DemoRecording::from_json(json).unwrap();
    assert_eq!(
        recording,
        DemoRecording::new(vec![
            Payload::from(r#"{"accel":{"x":1,"y":0,"z":0}}"#),
            Payload::from(r#"{"aux":5}"#),
        ])
    );
}

#[test]
fn test_recording_without_results_is_rejected() {
    assert!(matches!(
        DemoRecording::from_json(r#"{"rows":[]}"#),
        Err(PlaybackError::Parse(_))
    ));
}

#[tokio::test]
async fn test_file_recording() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, r#"{{"results":[{{"data":"x"}},{{"data":"y"}}]}}"#)?;
    let recording = FileRecording::new(file.path()).load().await?;
    assert_eq!(recording.len(), 2);

    let missing = FileRecording::new(file.path().with_extension("missing"));
    assert!(matches!(
        missing.load().await,
        Err(PlaybackError::Read { .. })
    ));
    Ok(())
}
