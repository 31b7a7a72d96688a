//! Persisted incident store (SQLite).
//!
//! Single connection behind a mutex; every statement runs on the blocking
//! pool. Any failure is a `Persistence` error.

use chrono::{DateTime, Utc};
use lookout_shared::{EventType, Incident, LookoutError, NewIncident, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Upper bound on `recent`.
pub const MAX_RECENT: usize = 200;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS incidents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    timestamp TEXT NOT NULL,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    rating INTEGER NOT NULL,
    vehicles_detected INTEGER NOT NULL DEFAULT 0,
    blocked_lanes INTEGER NOT NULL DEFAULT 0,
    clearance_minutes REAL,
    image_path TEXT,
    description TEXT NOT NULL DEFAULT '',
    notification TEXT NOT NULL DEFAULT '',
    raw_json TEXT,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_incidents_timestamp ON incidents(timestamp);
CREATE INDEX IF NOT EXISTS idx_incidents_event_type ON incidents(event_type);
";

const SELECT_COLUMNS: &str = "id, event_type, confidence, rating, vehicles_detected, blocked_lanes, \
     lat, lon, description, image_path, timestamp, clearance_minutes, notification";

fn row_to_incident(row: &Row<'_>) -> rusqlite::Result<Incident> {
    let event_type: String = row.get(1)?;
    let rating: i64 = row.get(3)?;
    let vehicles: i64 = row.get(4)?;
    let lanes: i64 = row.get(5)?;
    let timestamp: DateTime<Utc> = row.get(10)?;

    Ok(Incident {
        id: row.get(0)?,
        event_type: EventType::parse(&event_type),
        confidence: row.get(2)?,
        rating: rating.clamp(1, 10) as u8,
        vehicles_detected: vehicles.max(0) as u32,
        blocked_lanes: lanes.max(0) as u32,
        lat: row.get(6)?,
        lon: row.get(7)?,
        description: row.get(8)?,
        image_path: row.get(9)?,
        timestamp,
        clearance_minutes: row.get(11)?,
        notification: row.get(12)?,
    })
}

#[derive(Clone)]
pub struct IncidentStore {
    conn: Arc<Mutex<Connection>>,
}

impl IncidentStore {
    /// Open or create the database file, creating parent directories.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LookoutError::persistence(format!("create {}: {}", parent.display(), e)))?;
        }

        info!("Opening incident database at {}", path.display());
        let path = path.to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(&path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(LookoutError::persistence)?
        .map_err(LookoutError::persistence)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Fresh private database, gone when dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(LookoutError::persistence)?;
        conn.execute_batch(SCHEMA).map_err(LookoutError::persistence)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await
        .map_err(LookoutError::persistence)?
        .map_err(LookoutError::persistence)
    }

    /// Insert one incident row and return its id.
    pub async fn insert(&self, incident: &NewIncident) -> Result<i64> {
        let raw_json = serde_json::to_string(&incident.classification)?;
        let incident = incident.clone();

        let id = self
            .with_conn(move |conn| {
                let c = &incident.classification;
                conn.execute(
                    "INSERT INTO incidents (event_type, confidence, timestamp, lat, lon, rating,
                        vehicles_detected, blocked_lanes, clearance_minutes, image_path,
                        description, notification, raw_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        c.event_type.as_str(),
                        c.confidence,
                        incident.timestamp,
                        incident.location.lat,
                        incident.location.lon,
                        c.rating,
                        c.vehicles_detected,
                        c.blocked_lanes,
                        incident.clearance_minutes,
                        incident.image_path,
                        c.description,
                        incident.notification,
                        raw_json,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        debug!("Inserted incident {}", id);
        Ok(id)
    }

    pub async fn update_image_path(&self, id: i64, image_path: &str) -> Result<()> {
        let image_path = image_path.to_string();
        let updated = self
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE incidents SET image_path = ?1 WHERE id = ?2",
                    params![image_path, id],
                )
            })
            .await?;

        if updated == 0 {
            return Err(LookoutError::persistence(format!("no incident with id {}", id)));
        }
        Ok(())
    }

    /// Newest first, at most `MAX_RECENT`.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Incident>> {
        let limit = limit.min(MAX_RECENT) as i64;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM incidents ORDER BY timestamp DESC, id DESC LIMIT ?1",
                SELECT_COLUMNS
            ))?;
            let rows = stmt.query_map(params![limit], row_to_incident)?;
            rows.collect()
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Incident>> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM incidents WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                row_to_incident,
            )
            .optional()
        })
        .await
    }

    pub async fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get::<_, i64>(0))
        })
        .await
        .map(|n| n.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lookout_shared::{Classification, GeoPoint};

    fn new_incident(event_type: EventType, minutes_ago: i64) -> NewIncident {
        NewIncident {
            classification: Classification {
                event_type,
                confidence: 0.8,
                vehicles_detected: 2,
                blocked_lanes: 1,
                rating: 7,
                description: "Two cars on the shoulder".to_string(),
            },
            location: GeoPoint::new(33.75, -84.39),
            image_path: None,
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            clearance_minutes: Some(15.0),
            notification: "Accident reported ahead near your route.".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = IncidentStore::open_in_memory().unwrap();
        let new = new_incident(EventType::Accident, 0);
        let id = store.insert(&new).await.unwrap();

        let got = store.get(id).await.unwrap().unwrap();
        assert_eq!(got.id, id);
        assert_eq!(got.event_type, EventType::Accident);
        assert_eq!(got.blocked_lanes, 1);
        assert_eq!(got.clearance_minutes, Some(15.0));
        assert!((got.timestamp - new.timestamp).num_milliseconds().abs() < 1);
        assert!(got.image_path.is_none());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = IncidentStore::open_in_memory().unwrap();
        assert!(store.get(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_image_path() {
        let store = IncidentStore::open_in_memory().unwrap();
        let id = store.insert(&new_incident(EventType::Fire, 0)).await.unwrap();
        store.update_image_path(id, "frames/frame_1.jpg").await.unwrap();

        let got = store.get(id).await.unwrap().unwrap();
        assert_eq!(got.image_path.as_deref(), Some("frames/frame_1.jpg"));

        let err = store.update_image_path(999, "x.jpg").await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_recent_newest_first() {
        let store = IncidentStore::open_in_memory().unwrap();
        store.insert(&new_incident(EventType::Debris, 30)).await.unwrap();
        store.insert(&new_incident(EventType::Fire, 5)).await.unwrap();
        store.insert(&new_incident(EventType::Flooding, 60)).await.unwrap();

        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_type, EventType::Fire);
        assert_eq!(recent[1].event_type, EventType::Debris);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_open_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("incidents.db");
        let store = IncidentStore::open(&path).await.unwrap();
        store.insert(&new_incident(EventType::Hazard, 0)).await.unwrap();
        assert!(path.exists());
    }
}
