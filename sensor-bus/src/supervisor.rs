use std::sync::Arc;

use bytes::BytesMut;
use tokio_util::{codec::Decoder, sync::CancellationToken};

use crate::{
    error::{HubError, SourceError},
    hub::{BroadcastHub, Producer},
    line::LineDecoder,
    persist::{PersistenceGateway, SampleStore},
    playback::{DemoPlayback, FileRecording, RecordingLoader},
    sample::{Layout, SensorSample},
    serial::{self, ChunkReceiver, SerialConfig, SerialSource},
};

/// The one producer feeding the hub.
pub enum ActiveSource<L = FileRecording> {
    Live(SerialSource),
    Demo(DemoPlayback<L>),
    /// No device and no demo: nothing is published.
    None,
}

impl<L> ActiveSource<L> {
    pub fn name(&self) -> &'static str {
        match self {
            ActiveSource::Live(_) => "live",
            ActiveSource::Demo(_) => "demo",
            ActiveSource::None => "none",
        }
    }
}

/// Picks the live device when it opens, demo playback when it is absent and
/// `demo` is provided, otherwise nothing.
///
/// The port is always tried first: ptys, bridges and by-id symlinks open
/// fine without ever being listed by the platform.
pub fn choose_source<L: RecordingLoader>(
    serial: &SerialConfig,
    demo: Option<DemoPlayback<L>>,
) -> ActiveSource<L> {
    let e = match SerialSource::open(serial) {
        Ok(source) => return ActiveSource::Live(source),
        Err(e) => e,
    };

    let absent = matches!(e, SourceError::NoDevice(_)) || !serial::device_attached(&serial.path);
    match demo {
        Some(playback) if absent => {
            log::info!("supervisor: {}, using demo playback", e);
            ActiveSource::Demo(playback)
        }
        _ => {
            // Not retried: the live path stays down until restart.
            log::error!("supervisor: serial source unavailable: {}", e);
            ActiveSource::None
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedStats {
    pub accepted: usize,
    pub rejected: usize,
}

/// Decode → parse → publish + persist for one live source.
pub struct LinePipeline<S> {
    decoder: LineDecoder,
    buf: BytesMut,
    layout: Layout,
    producer: Producer,
    gateway: Option<PersistenceGateway<S>>,
}

impl<S: SampleStore> LinePipeline<S> {
    pub fn new(producer: Producer, layout: Layout, gateway: Option<PersistenceGateway<S>>) -> Self {
        Self {
            decoder: LineDecoder::new(),
            buf: BytesMut::new(),
            layout,
            producer,
            gateway,
        }
    }

    /// Feeds one raw chunk; complete lines are handled in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> FeedStats {
        self.buf.extend_from_slice(chunk);
        let mut stats = FeedStats::default();
        // LineDecoder never returns an error.
        while let Ok(Some(line)) = self.decoder.decode(&mut self.buf) {
            match SensorSample::parse(&line, self.layout) {
                Ok(sample) => {
                    log::debug!("supervisor: sample {:?}", sample);
                    self.producer.publish(&sample);
                    if let Some(gateway) = &self.gateway {
                        gateway.save(sample);
                    }
                    stats.accepted += 1;
                }
                Err(e) => {
                    log::warn!("supervisor: rejected line {:?}: {}", line, e);
                    stats.rejected += 1;
                }
            }
        }
        stats
    }
}

/// Owns the active source and wires it into the hub and the store.
pub struct IngestionSupervisor<S> {
    hub: Arc<BroadcastHub>,
    layout: Layout,
    gateway: Option<PersistenceGateway<S>>,
}

impl<S: SampleStore> IngestionSupervisor<S> {
    pub fn new(
        hub: Arc<BroadcastHub>,
        layout: Layout,
        gateway: Option<PersistenceGateway<S>>,
    ) -> Self {
        Self {
            hub,
            layout,
            gateway,
        }
    }

    /// Runs `source` until it dies or `cancel` fires.
    pub async fn run<L: RecordingLoader>(self, source: ActiveSource<L>, cancel: CancellationToken) {
        log::info!("supervisor: active source is {}", source.name());
        let result = match source {
            ActiveSource::Live(serial) => {
                let path = serial.path().to_string();
                let rx = serial.start(cancel.child_token());
                self.pump(rx, cancel).await.map(|stats| {
                    log::info!(
                        "supervisor: live source {} ended ({} accepted, {} rejected)",
                        path,
                        stats.accepted,
                        stats.rejected
                    );
                })
            }
            ActiveSource::Demo(playback) => match self.hub.producer() {
                Ok(producer) => {
                    playback.run(producer, cancel).await;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            ActiveSource::None => {
                log::warn!("supervisor: no source, subscribers will receive nothing");
                Ok(())
            }
        };
        if let Err(e) = result {
            log::error!("supervisor: {}", e);
        }
    }

    /// Consumes raw chunks from a live source. A source error is logged and
    /// ends the live path; it is not reopened.
    pub async fn pump(
        &self,
        mut rx: ChunkReceiver,
        cancel: CancellationToken,
    ) -> Result<FeedStats, HubError> {
        let producer = self.hub.producer()?;
        let mut pipeline = LinePipeline::new(producer, self.layout, self.gateway.clone());
        let mut total = FeedStats::default();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                chunk = rx.recv() => match chunk {
                    Some(Ok(bytes)) => {
                        let stats = pipeline.feed(&bytes);
                        total.accepted += stats.accepted;
                        total.rejected += stats.rejected;
                    }
                    Some(Err(e)) => {
                        log::error!("supervisor: source error, live path stopped: {}", e);
                        break;
                    }
                    None => break,
                },
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
#[path = "supervisor_test.rs"]
mod supervisor_test;
