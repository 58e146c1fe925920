use serde::{Deserialize, Serialize};
use turso::{Connection, Row};

/// One persisted sample. `payload` is the sample's JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    pub id: i64,
    pub payload: String,
    pub created_at: String,
}

pub async fn insert(payload: &str, conn: &Connection) -> anyhow::Result<i64> {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
    conn.execute(
        "INSERT INTO samples (payload, created_at) VALUES (?1, ?2)",
        (payload, now.as_str()),
    )
    .await?;
    Ok(conn.last_insert_rowid())
}

/// All rows, newest first.
pub async fn query_all(conn: &Connection) -> anyhow::Result<Vec<SampleRow>> {
    let mut rows = conn
        .query(
            "SELECT id, payload, created_at FROM samples ORDER BY id DESC",
            (),
        )
        .await?;
    let mut samples = Vec::new();
    while let Some(row) = rows.next().await? {
        samples.push(row_to_sample(&row)?);
    }
    Ok(samples)
}

pub async fn by_id(id: i64, conn: &Connection) -> anyhow::Result<Option<SampleRow>> {
    let mut rows = conn
        .query(
            "SELECT id, payload, created_at FROM samples WHERE id = ?1 LIMIT 1",
            (id,),
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row_to_sample(&row)?)),
        None => Ok(None),
    }
}

fn row_to_sample(row: &Row) -> anyhow::Result<SampleRow> {
    let id = row
        .get_value(0)?
        .as_integer()
        .ok_or_else(|| anyhow::anyhow!("id is null"))?
        .to_owned();
    let payload = row
        .get_value(1)?
        .as_text()
        .ok_or_else(|| anyhow::anyhow!("payload is null"))?
        .to_owned();
    let created_at = row
        .get_value(2)?
        .as_text()
        .ok_or_else(|| anyhow::anyhow!("created_at is null"))?
        .to_owned();
    Ok(SampleRow {
        id,
        payload,
        created_at,
    })
}
