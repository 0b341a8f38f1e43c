//! SQLite-backed persistent store
//!
//! Schema lives in `sql/*.sql` and is applied by [`run_schema_migrations`].
//! Raw and derived sessions are append-only documents: each flush of a
//! staged key inserts one row whose sequences are JSON-encoded.

use super::PersistentStore;
use crate::error::StoreError;
use crate::types::{
    DerivedSession, Gender, PlayerId, PlayerProfile, PlayerRecord, RawSession, Remark, TrainRecord,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, types::Type, Connection, Row};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Run schema migrations from SQL files
///
/// Reads all .sql files from `schema_dir` in filename order (01_, 02_, ...)
/// and executes them. Every file must use `IF NOT EXISTS` so the loader is
/// idempotent. Also switches the database to WAL mode.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> Result<(), StoreError> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(StoreError::Schema(format!(
            "schema directory not found: {}",
            schema_dir
        )));
    }

    conn.pragma_update(None, "journal_mode", "WAL")?;
    log::info!("📊 Enabled WAL mode for SQLite database");

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for entry in sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        log::info!("   ├─ Executing: {}", filename);
        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;
    }

    log::info!("✅ All schema migrations completed successfully");
    Ok(())
}

/// SQLite implementation of [`PersistentStore`]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open `db_path` (created if missing) and apply the schema in `schema_dir`
    pub fn open(db_path: &str, schema_dir: &str) -> Result<Self, StoreError> {
        let mut conn = Connection::open(db_path)?;
        run_schema_migrations(&mut conn, schema_dir)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-migrated connection
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn player_from_row(row: &Row<'_>) -> rusqlite::Result<PlayerRecord> {
        let gender_code: u8 = row.get(3)?;
        let gender = Gender::try_from(gender_code)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Integer, e.into()))?;

        Ok(PlayerRecord {
            id: Some(PlayerId::from(row.get::<_, String>(0)?)),
            name: row.get(1)?,
            profile: PlayerProfile {
                name: row.get(2)?,
                gender,
                age: row.get(4)?,
                height: row.get::<_, f64>(5)? as f32,
                weight: row.get::<_, f64>(6)? as f32,
                heart_rate: row.get(7)?,
                max_heart_rate: row.get(8)?,
            },
            remark: Remark {
                speed: row.get(9)?,
                heart_rate: row.get(10)?,
            },
            history: row.get(11)?,
        })
    }
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn insert_player(&self, record: &PlayerRecord) -> Result<PlayerId, StoreError> {
        let id = PlayerId::generate();
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO players (
                id, name, profile_name, gender, age, height, weight,
                heart_rate, max_heart_rate, remark_speed, remark_heart_rate,
                history, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                id.as_str(),
                record.name,
                record.profile.name,
                u8::from(record.profile.gender),
                record.profile.age,
                record.profile.height as f64,
                record.profile.weight as f64,
                record.profile.heart_rate,
                record.profile.max_heart_rate,
                record.remark.speed,
                record.remark.heart_rate,
                record.history,
                now,
                now,
            ],
        )?;

        Ok(id)
    }

    async fn update_player(&self, id: &PlayerId, record: &PlayerRecord) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn.lock();

        let changed = conn.execute(
            r#"
            UPDATE players SET
                name = ?, profile_name = ?, gender = ?, age = ?, height = ?,
                weight = ?, heart_rate = ?, max_heart_rate = ?,
                remark_speed = ?, remark_heart_rate = ?, history = ?,
                updated_at = ?
            WHERE id = ?
            "#,
            params![
                record.name,
                record.profile.name,
                u8::from(record.profile.gender),
                record.profile.age,
                record.profile.height as f64,
                record.profile.weight as f64,
                record.profile.heart_rate,
                record.profile.max_heart_rate,
                record.remark.speed,
                record.remark.heart_rate,
                record.history,
                now,
                id.as_str(),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("player {}", id)));
        }
        Ok(())
    }

    async fn query_players(&self) -> Result<Vec<PlayerRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, profile_name, gender, age, height, weight,
                    heart_rate, max_heart_rate, remark_speed, remark_heart_rate, history
             FROM players
             ORDER BY rowid ASC",
        )?;

        let players = stmt
            .query_map([], Self::player_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(players)
    }

    async fn query_record_page(
        &self,
        collection: &str,
        page: i64,
        count: i64,
    ) -> Result<(Vec<TrainRecord>, usize), StoreError> {
        let conn = self.conn.lock();

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM train_records WHERE collection = ?",
            [collection],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, created_at, speed_json, distance_json, heart_rate_json
             FROM train_records
             WHERE collection = ?1
             ORDER BY id ASC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt
            .query_map(
                params![collection, count, page.saturating_mul(count)],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, timestamp, speed, distance, heart_rate) in rows {
            records.push(TrainRecord {
                id,
                timestamp,
                metrics: DerivedSession {
                    speed: serde_json::from_str(&speed)?,
                    distance: serde_json::from_str(&distance)?,
                    heart_rate: serde_json::from_str(&heart_rate)?,
                },
            });
        }

        Ok((records, total.max(0) as usize))
    }

    async fn insert_raw_session(&self, key: &str, session: &RawSession) -> Result<(), StoreError> {
        let gps = serde_json::to_string(&session.gps)?;
        let accel = serde_json::to_string(&session.accel)?;
        let gyro = serde_json::to_string(&session.gyro)?;
        let heart_rate = serde_json::to_string(&session.heart_rate)?;
        let now = chrono::Utc::now().timestamp();

        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO raw_sessions (
                collection, gps_json, accel_json, gyro_json, heart_rate_json, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![key, gps, accel, gyro, heart_rate, now],
        )?;
        Ok(())
    }

    async fn insert_derived_session(
        &self,
        key: &str,
        session: &DerivedSession,
    ) -> Result<(), StoreError> {
        let speed = serde_json::to_string(&session.speed)?;
        let distance = serde_json::to_string(&session.distance)?;
        let heart_rate = serde_json::to_string(&session.heart_rate)?;
        let now = chrono::Utc::now().timestamp();

        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO train_records (
                collection, speed_json, distance_json, heart_rate_json, created_at
            ) VALUES (?, ?, ?, ?, ?)
            "#,
            params![key, speed, distance, heart_rate, now],
        )?;
        Ok(())
    }
}
