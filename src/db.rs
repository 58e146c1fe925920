use std::sync::OnceLock;

use futures::{FutureExt, future::BoxFuture};
use sensor_bus::{
    SensorSample,
    persist::{SampleStore, StoredSample},
};
use sensor_db::{
    db::{DatabaseConfig, SensorDatabase},
    sample::SampleRow,
};

static APP_DB: OnceLock<SensorDatabase> = OnceLock::new();

pub(crate) async fn init_app_db(url: &str) -> anyhow::Result<&'static SensorDatabase> {
    let config = DatabaseConfig::new(url);
    let db = SensorDatabase::new(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to init app db: {:?}", e))?;
    sensor_db::migrations::migrate(&db).await?;
    APP_DB
        .set(db)
        .map_err(|_| anyhow::anyhow!("Failed to set APP_DB"))?;
    get_app_db()
}

fn get_app_db() -> anyhow::Result<&'static SensorDatabase> {
    APP_DB
        .get()
        .ok_or(anyhow::anyhow!("APP_DB not initialized"))
}

/// [`SampleStore`] backed by a [`SensorDatabase`].
pub struct DbSampleStore {
    db: &'static SensorDatabase,
}

impl DbSampleStore {
    pub fn new(db: &'static SensorDatabase) -> Self {
        Self { db }
    }
}

impl SampleStore for DbSampleStore {
    fn save<'a>(&'a self, sample: &'a SensorSample) -> BoxFuture<'a, anyhow::Result<i64>> {
        async move {
            let payload = serde_json::to_string(sample)?;
            let conn = self.db.connect()?;
            sensor_db::sample::insert(&payload, &conn).await
        }
        .boxed()
    }

    fn read_all(&self) -> BoxFuture<'_, anyhow::Result<Vec<StoredSample>>> {
        async move {
            let conn = self.db.connect()?;
            let rows = sensor_db::sample::query_all(&conn).await?;
            rows.into_iter().map(to_stored).collect()
        }
        .boxed()
    }

    fn read_by_id(&self, id: i64) -> BoxFuture<'_, anyhow::Result<Option<StoredSample>>> {
        async move {
            let conn = self.db.connect()?;
            sensor_db::sample::by_id(id, &conn)
                .await?
                .map(to_stored)
                .transpose()
        }
        .boxed()
    }
}

fn to_stored(row: SampleRow) -> anyhow::Result<StoredSample> {
    let sample: SensorSample = serde_json::from_str(&row.payload)
        .map_err(|e| anyhow::anyhow!("sample {} has a corrupt payload: {}", row.id, e))?;
    Ok(StoredSample {
        id: row.id,
        recorded_at: Some(row.created_at),
        sample,
    })
}
