use std::path::Path;

use crate::db::SensorDatabase;

const MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER NOT NULL PRIMARY KEY,
    description TEXT NOT NULL,
    createtime TEXT NOT NULL
);
"#;

#[derive(Debug, rust_embed::Embed)]
#[folder = "migrations/"]
struct Migrations;

/// Applies every embedded migration not yet recorded in `_migrations`.
pub async fn migrate(db: &SensorDatabase) -> anyhow::Result<usize> {
    let mut conn = db.connect()?;
    ensure_migrations_table(&conn).await?;
    let mut migrations = load_migrations()?;
    migrations.sort_by_key(|m| m.version);

    let mut applied = 0;
    for migration in migrations {
        if is_migration_applied(&conn, migration.version).await? {
            continue;
        }
        let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let tx = conn.transaction().await?;
        tx.execute_batch(&migration.sql).await?;
        tx.execute(
            "INSERT INTO _migrations (version, description, createtime) VALUES (?1, ?2, ?3)",
            (migration.version, migration.description.as_str(), now.as_str()),
        )
        .await?;
        tx.commit().await?;
        log::info!(
            "db: applied migration {} ({})",
            migration.version,
            migration.description
        );
        applied += 1;
    }

    Ok(applied)
}

async fn ensure_migrations_table(conn: &turso::Connection) -> anyhow::Result<()> {
    conn.execute_batch(MIGRATIONS_TABLE_SQL).await?;
    Ok(())
}

async fn is_migration_applied(conn: &turso::Connection, version: i64) -> anyhow::Result<bool> {
    let mut rows = conn
        .query("SELECT 1 FROM _migrations WHERE version = ?1", (version,))
        .await?;
    Ok(rows.next().await?.is_some())
}

struct Migration {
    version: i64,
    description: String,
    sql: String,
}

fn load_migrations() -> anyhow::Result<Vec<Migration>> {
    let mut migrations = Vec::new();
    for path in Migrations::iter() {
        let Some(file) = Migrations::get(&path) else {
            continue;
        };
        let Some((version, description)) = parse_file_name(&path) else {
            // not of the format: <VERSION>_<DESCRIPTION>.sql; ignore
            continue;
        };
        let sql = std::str::from_utf8(file.data.as_ref())?.to_owned();
        migrations.push(Migration {
            version,
            description,
            sql,
        });
    }
    Ok(migrations)
}

fn parse_file_name(path: &str) -> Option<(i64, String)> {
    let name = Path::new(path).file_name()?.to_str()?;
    let (version, rest) = name.split_once('_')?;
    let description = rest.strip_suffix(".sql")?;
    let version = version.parse().ok()?;
    Some((version, description.replace('_', " ")))
}
