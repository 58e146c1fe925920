use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{error::PersistenceError, sample::SensorSample};

/// A sample as read back from the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredSample {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
    #[serde(flatten)]
    pub sample: SensorSample,
}

/// Save/read contract of the backing store.
pub trait SampleStore: Send + Sync + 'static {
    fn save<'a>(&'a self, sample: &'a SensorSample) -> BoxFuture<'a, anyhow::Result<i64>>;

    fn read_all(&self) -> BoxFuture<'_, anyhow::Result<Vec<StoredSample>>>;

    fn read_by_id(&self, id: i64) -> BoxFuture<'_, anyhow::Result<Option<StoredSample>>>;
}

pub type ErrorSink = Arc<dyn Fn(&SensorSample, &PersistenceError) + Send + Sync>;

/// Best-effort writer in front of a [`SampleStore`].
///
/// `save` never waits for the store: each write runs in its own task and
/// its outcome only reaches the error sink.
pub struct PersistenceGateway<S> {
    store: Arc<S>,
    on_error: ErrorSink,
}

impl<S> Clone for PersistenceGateway<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            on_error: Arc::clone(&self.on_error),
        }
    }
}

impl<S: SampleStore> PersistenceGateway<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            on_error: Arc::new(|sample: &SensorSample, e: &PersistenceError| {
                log::error!("persist: save failed for sample {:?}: {}", sample, e);
            }),
        }
    }

    pub fn with_error_sink(mut self, on_error: ErrorSink) -> Self {
        self.on_error = on_error;
        self
    }

    /// Dispatches one write attempt and returns immediately.
    pub fn save(&self, sample: SensorSample) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let on_error = Arc::clone(&self.on_error);
        tokio::spawn(async move {
            match store.save(&sample).await {
                Ok(id) => log::trace!("persist: saved sample {}", id),
                Err(e) => on_error(&sample, &PersistenceError(e)),
            }
        })
    }

    pub async fn read_all(&self) -> Result<Vec<StoredSample>, PersistenceError> {
        Ok(self.store.read_all().await?)
    }

    pub async fn read_by_id(&self, id: i64) -> Result<Option<StoredSample>, PersistenceError> {
        Ok(self.store.read_by_id(id).await?)
    }
}
