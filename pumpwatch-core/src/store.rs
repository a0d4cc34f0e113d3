//! SQLite-backed time-series store for samples and events.
//!
//! One cycle's samples and detected events are written in a single
//! transaction, so readers never observe a cycle with its samples but not
//! its events. Queries are windowed (`timestamp > now - hours`), returned
//! newest first, and capped so a long-running database cannot flood a
//! caller.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::trace;

use pumpwatch_types::{
    Catalog, SampleRecord, Stats, StatusEvent, SystemSnapshot, Transition, TransitionEvent,
    TripEvent,
};

/// Row caps: a query for one pump may return more rows than the same
/// window across all pumps would allow per pump, matching how the data is
/// consumed (single-pump detail vs. system overview).
const SAMPLE_CAP_SINGLE: i64 = 1000;
const SAMPLE_CAP_ALL: i64 = 5000;
const EVENT_CAP_SINGLE: i64 = 500;
const EVENT_CAP_ALL: i64 = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Append-only store over a SQLite database.
///
/// Cloneable via the underlying pool; all methods take `&self`.
#[derive(Debug, Clone)]
pub struct TimeSeriesStore {
    pool: SqlitePool,
}

impl TimeSeriesStore {
    /// Open (creating if missing) the database at `url` and ensure the
    /// schema exists, seeding the pump reference table from the catalog.
    pub async fn open(url: &str, catalog: &Catalog) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // An in-memory database exists per connection; a second pool
        // connection would see an empty schema.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema(catalog).await?;
        Ok(store)
    }

    /// Open a private in-memory database, for tests and dry runs.
    pub async fn in_memory(catalog: &Catalog) -> Result<Self, StoreError> {
        Self::open("sqlite::memory:", catalog).await
    }

    async fn init_schema(&self, catalog: &Catalog) -> Result<(), StoreError> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS samples (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp         TEXT    NOT NULL,
                pump_id           INTEGER NOT NULL,
                pressure          REAL    NOT NULL,
                speed             REAL    NOT NULL,
                pressure_setpoint REAL    NOT NULL,
                ready             INTEGER NOT NULL,
                running           INTEGER NOT NULL,
                trip              INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_samples_pump_time
                ON samples (pump_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_samples_time
                ON samples (timestamp);

            CREATE TABLE IF NOT EXISTS trip_events (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT    NOT NULL,
                pump_id   INTEGER NOT NULL,
                trip_on   INTEGER NOT NULL,
                pressure  REAL    NOT NULL,
                speed     REAL    NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trip_events_pump_time
                ON trip_events (pump_id, timestamp);

            CREATE TABLE IF NOT EXISTS status_events (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp   TEXT    NOT NULL,
                pump_id     INTEGER NOT NULL,
                status      TEXT    NOT NULL,
                description TEXT    NOT NULL,
                pressure    REAL    NOT NULL,
                speed       REAL    NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_status_events_pump_time
                ON status_events (pump_id, timestamp);

            CREATE TABLE IF NOT EXISTS pumps (
                id   INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        for pump_id in catalog.pump_ids() {
            sqlx::query("INSERT INTO pumps (id, name) VALUES (?, ?) ON CONFLICT (id) DO NOTHING")
                .bind(pump_id)
                .bind(format!("PUMP {pump_id}"))
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Persist one completed cycle: every pump's sample plus the events
    /// detected in that cycle, in a single transaction.
    pub async fn record_cycle(
        &self,
        snapshot: &SystemSnapshot,
        events: &[TransitionEvent],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for (pump_id, pump) in snapshot.iter() {
            sqlx::query(
                "INSERT INTO samples \
                 (timestamp, pump_id, pressure, speed, pressure_setpoint, ready, running, trip) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(snapshot.timestamp)
            .bind(*pump_id)
            .bind(pump.pressure)
            .bind(pump.speed)
            .bind(pump.pressure_setpoint)
            .bind(pump.ready)
            .bind(pump.running)
            .bind(pump.trip)
            .execute(&mut *tx)
            .await?;
        }

        for event in events {
            match event.transition {
                Transition::Trip { on } => {
                    sqlx::query(
                        "INSERT INTO trip_events \
                         (timestamp, pump_id, trip_on, pressure, speed) \
                         VALUES (?, ?, ?, ?, ?)",
                    )
                    .bind(event.timestamp)
                    .bind(event.pump_id)
                    .bind(on)
                    .bind(event.pressure)
                    .bind(event.speed)
                    .execute(&mut *tx)
                    .await?;
                }
                Transition::Status { status } => {
                    sqlx::query(
                        "INSERT INTO status_events \
                         (timestamp, pump_id, status, description, pressure, speed) \
                         VALUES (?, ?, ?, ?, ?, ?)",
                    )
                    .bind(event.timestamp)
                    .bind(event.pump_id)
                    .bind(status.label())
                    .bind(status.description())
                    .bind(event.pressure)
                    .bind(event.speed)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;
        trace!(
            samples = snapshot.len(),
            events = events.len(),
            "cycle persisted"
        );
        Ok(())
    }

    /// Samples in the trailing window, newest first.
    ///
    /// `pump_id = None` returns samples across all pumps with a larger cap.
    pub async fn history(
        &self,
        pump_id: Option<u8>,
        hours: u32,
    ) -> Result<Vec<SampleRecord>, StoreError> {
        let since = window_start(hours);
        let records = match pump_id {
            Some(id) => {
                sqlx::query_as::<_, SampleRecord>(
                    "SELECT * FROM samples \
                     WHERE pump_id = ? AND timestamp > ? \
                     ORDER BY timestamp DESC, id DESC LIMIT ?",
                )
                .bind(id)
                .bind(since)
                .bind(SAMPLE_CAP_SINGLE)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, SampleRecord>(
                    "SELECT * FROM samples \
                     WHERE timestamp > ? \
                     ORDER BY timestamp DESC, id DESC LIMIT ?",
                )
                .bind(since)
                .bind(SAMPLE_CAP_ALL)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(records)
    }

    /// Trip events in the trailing window, newest first.
    pub async fn trip_events(
        &self,
        pump_id: Option<u8>,
        hours: u32,
    ) -> Result<Vec<TripEvent>, StoreError> {
        let since = window_start(hours);
        let events = match pump_id {
            Some(id) => {
                sqlx::query_as::<_, TripEvent>(
                    "SELECT * FROM trip_events \
                     WHERE pump_id = ? AND timestamp > ? \
                     ORDER BY timestamp DESC, id DESC LIMIT ?",
                )
                .bind(id)
                .bind(since)
                .bind(EVENT_CAP_SINGLE)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, TripEvent>(
                    "SELECT * FROM trip_events \
                     WHERE timestamp > ? \
                     ORDER BY timestamp DESC, id DESC LIMIT ?",
                )
                .bind(since)
                .bind(EVENT_CAP_ALL)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(events)
    }

    /// Status events in the trailing window, newest first.
    pub async fn status_events(
        &self,
        pump_id: Option<u8>,
        hours: u32,
    ) -> Result<Vec<StatusEvent>, StoreError> {
        let since = window_start(hours);
        let events = match pump_id {
            Some(id) => {
                sqlx::query_as::<_, StatusEvent>(
                    "SELECT * FROM status_events \
                     WHERE pump_id = ? AND timestamp > ? \
                     ORDER BY timestamp DESC, id DESC LIMIT ?",
                )
                .bind(id)
                .bind(since)
                .bind(EVENT_CAP_SINGLE)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, StatusEvent>(
                    "SELECT * FROM status_events \
                     WHERE timestamp > ? \
                     ORDER BY timestamp DESC, id DESC LIMIT ?",
                )
                .bind(since)
                .bind(EVENT_CAP_ALL)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(events)
    }

    /// Aggregates over the trailing window, all-zero when no sample falls
    /// inside it. Averages and extremes are rounded to two decimals to
    /// match the precision the values are displayed with.
    pub async fn stats(&self, pump_id: Option<u8>, hours: u32) -> Result<Stats, StoreError> {
        let since = window_start(hours);

        type StatsRow = (
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            i64,
            Option<i64>,
        );

        let row: StatsRow = match pump_id {
            Some(id) => {
                sqlx::query_as(
                    "SELECT AVG(pressure), MAX(pressure), MIN(pressure), \
                            AVG(speed), MAX(speed), COUNT(*), SUM(trip) \
                     FROM samples WHERE pump_id = ? AND timestamp > ?",
                )
                .bind(id)
                .bind(since)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT AVG(pressure), MAX(pressure), MIN(pressure), \
                            AVG(speed), MAX(speed), COUNT(*), SUM(trip) \
                     FROM samples WHERE timestamp > ?",
                )
                .bind(since)
                .fetch_one(&self.pool)
                .await?
            }
        };

        let (avg_p, max_p, min_p, avg_s, max_s, count, trips) = row;
        Ok(Stats {
            avg_pressure: round2(avg_p.unwrap_or(0.0)),
            max_pressure: round2(max_p.unwrap_or(0.0)),
            min_pressure: round2(min_p.unwrap_or(0.0)),
            avg_speed: round2(avg_s.unwrap_or(0.0)),
            max_speed: round2(max_s.unwrap_or(0.0)),
            record_count: count,
            trip_count: trips.unwrap_or(0),
        })
    }

    /// Per-pump aggregates over the trailing window, keyed by pump id.
    ///
    /// Every catalogued pump appears in the result; pumps with no samples
    /// in the window carry the all-zero default.
    pub async fn stats_per_pump(&self, hours: u32) -> Result<BTreeMap<u8, Stats>, StoreError> {
        let pump_ids: Vec<u8> = sqlx::query_scalar("SELECT id FROM pumps ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut result = BTreeMap::new();
        for pump_id in pump_ids {
            result.insert(pump_id, self.stats(Some(pump_id), hours).await?);
        }
        Ok(result)
    }

    /// The pump reference table: (id, display name) pairs, ascending.
    pub async fn pumps(&self) -> Result<Vec<(u8, String)>, StoreError> {
        let pumps = sqlx::query_as("SELECT id, name FROM pumps ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(pumps)
    }
}

fn window_start(hours: u32) -> DateTime<Utc> {
    Utc::now() - Duration::hours(i64::from(hours))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pumpwatch_types::{PumpSnapshot, PumpStatus};

    async fn store() -> TimeSeriesStore {
        TimeSeriesStore::in_memory(&Catalog::reference())
            .await
            .unwrap()
    }

    fn snapshot(
        timestamp: DateTime<Utc>,
        pumps: &[(u8, f64, f64, bool)],
    ) -> SystemSnapshot {
        let pumps = pumps
            .iter()
            .map(|&(id, pressure, speed, trip)| {
                let mut pump = PumpSnapshot::empty(id);
                pump.pressure = pressure;
                pump.speed = speed;
                pump.trip = trip;
                pump.running = speed > 0.0;
                (id, pump)
            })
            .collect();
        SystemSnapshot::new(timestamp, pumps)
    }

    #[tokio::test]
    async fn samples_come_back_newest_first() {
        let store = store().await;
        let base = Utc::now();

        for i in 0..3i64 {
            let ts = base - Duration::seconds(30 - i * 10);
            store
                .record_cycle(&snapshot(ts, &[(2, f64::from(i as i32), 10.0, false)]), &[])
                .await
                .unwrap();
        }

        let records = store.history(Some(2), 1).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].timestamp > records[1].timestamp);
        assert_eq!(records[0].pressure, 2.0);
        assert_eq!(records[2].pressure, 0.0);
    }

    #[tokio::test]
    async fn window_excludes_old_samples() {
        let store = store().await;
        let now = Utc::now();

        store
            .record_cycle(
                &snapshot(now - Duration::hours(25), &[(1, 1.0, 0.0, false)]),
                &[],
            )
            .await
            .unwrap();
        store
            .record_cycle(
                &snapshot(now - Duration::hours(1), &[(1, 2.0, 0.0, false)]),
                &[],
            )
            .await
            .unwrap();

        let records = store.history(Some(1), 24).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pressure, 2.0);

        // A wider window includes both.
        let records = store.history(Some(1), 48).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn history_filters_by_pump_and_all_pumps() {
        let store = store().await;
        let now = Utc::now();

        store
            .record_cycle(
                &snapshot(now, &[(1, 1.0, 0.0, false), (2, 2.0, 0.0, false)]),
                &[],
            )
            .await
            .unwrap();

        assert_eq!(store.history(Some(1), 1).await.unwrap().len(), 1);
        assert_eq!(store.history(Some(2), 1).await.unwrap().len(), 1);
        assert_eq!(store.history(None, 1).await.unwrap().len(), 2);
        assert!(store.history(Some(6), 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_pump_history_is_capped() {
        let store = store().await;
        let base = Utc::now();

        for i in 0..1010i64 {
            let ts = base - Duration::seconds(1010 - i);
            store
                .record_cycle(&snapshot(ts, &[(3, 1.0, 0.0, false)]), &[])
                .await
                .unwrap();
        }

        let records = store.history(Some(3), 24).await.unwrap();
        assert_eq!(records.len(), 1000);
        // The cap keeps the newest rows.
        assert!(records[0].timestamp > records[999].timestamp);
    }

    #[tokio::test]
    async fn events_persist_in_the_cycle_transaction() {
        let store = store().await;
        let now = Utc::now();
        let snap = snapshot(now, &[(5, 6.0, 35.0, true)]);
        let pump = *snap.pump(5).unwrap();

        let events = vec![
            TransitionEvent::trip(&pump, now, true),
            TransitionEvent::status(&pump, now, PumpStatus::Running),
        ];
        store.record_cycle(&snap, &events).await.unwrap();

        let trips = store.trip_events(Some(5), 1).await.unwrap();
        assert_eq!(trips.len(), 1);
        assert!(trips[0].trip_on);
        assert_eq!(trips[0].pressure, 6.0);

        let statuses = store.status_events(Some(5), 1).await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].status, "Running");
        assert_eq!(statuses[0].description, "Pump started");

        // No bleed into other pumps.
        assert!(store.trip_events(Some(1), 1).await.unwrap().is_empty());
        assert_eq!(store.trip_events(None, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stats_aggregate_and_round() {
        let store = store().await;
        let base = Utc::now();

        for (i, (pressure, speed, trip)) in
            [(4.0, 30.0, false), (5.0, 32.0, true), (6.005, 34.0, false)]
                .iter()
                .enumerate()
        {
            let ts = base - Duration::seconds(10 - i as i64);
            store
                .record_cycle(&snapshot(ts, &[(2, *pressure, *speed, *trip)]), &[])
                .await
                .unwrap();
        }

        let stats = store.stats(Some(2), 1).await.unwrap();
        assert_eq!(stats.record_count, 3);
        assert_eq!(stats.trip_count, 1);
        assert_eq!(stats.avg_pressure, 5.0);
        assert_eq!(stats.max_pressure, 6.01);
        assert_eq!(stats.min_pressure, 4.0);
        assert_eq!(stats.avg_speed, 32.0);
        assert_eq!(stats.max_speed, 34.0);
    }

    #[tokio::test]
    async fn empty_window_yields_zero_stats() {
        let store = store().await;
        let stats = store.stats(Some(4), 24).await.unwrap();
        assert_eq!(stats, Stats::default());

        let stats = store.stats(None, 24).await.unwrap();
        assert_eq!(stats.record_count, 0);
        assert_eq!(stats.trip_count, 0);
    }

    #[tokio::test]
    async fn per_pump_stats_cover_every_catalogued_pump() {
        let store = store().await;
        store
            .record_cycle(&snapshot(Utc::now(), &[(3, 5.0, 30.0, false)]), &[])
            .await
            .unwrap();

        let per_pump = store.stats_per_pump(1).await.unwrap();
        assert_eq!(per_pump.len(), 7);
        assert_eq!(per_pump[&3].record_count, 1);
        assert_eq!(per_pump[&1], Stats::default());
    }

    #[tokio::test]
    async fn pump_reference_table_is_seeded() {
        let store = store().await;
        let pumps = store.pumps().await.unwrap();
        assert_eq!(pumps.len(), 7);
        assert_eq!(pumps[0], (1, "PUMP 1".to_string()));
        assert_eq!(pumps[6], (7, "PUMP 7".to_string()));
    }
}
