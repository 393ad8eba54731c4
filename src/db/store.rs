//! SQLite-backed persistence for groupings, sensors and readings.
//!
//! One `Store` owns one connection. The collector and the viewers each open
//! their own; WAL journaling plus a busy timeout lets a viewer read the last
//! committed cycle while the collector is appending the next one.

use crate::db::models::{
    Grouping, JoinedReading, NewGrouping, NewReading, NewSensor, Reading, Sensor, SensorRole,
};
use crate::schema;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, error, info};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const CONNECTION_PRAGMAS: &str = "PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;";

#[derive(Debug)]
pub enum StoreError {
    Connection(diesel::ConnectionError),
    Query(diesel::result::Error),
    Migration(String),
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::Connection(e) => write!(f, "connection error: {}", e),
            StoreError::Query(e) => write!(f, "query error: {}", e),
            StoreError::Migration(e) => write!(f, "migration error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Connection(e) => Some(e),
            StoreError::Query(e) => Some(e),
            StoreError::Migration(_) => None,
        }
    }
}

impl From<diesel::result::Error> for StoreError {
    fn from(value: diesel::result::Error) -> Self {
        StoreError::Query(value)
    }
}

impl From<diesel::ConnectionError> for StoreError {
    fn from(value: diesel::ConnectionError) -> Self {
        StoreError::Connection(value)
    }
}

/// Readings for one sync timestamp, possibly a substitute for the one asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotReadings {
    pub requested: i64,
    pub sync_timestamp: i64,
    pub readings: Vec<Reading>,
}

impl SnapshotReadings {
    pub fn substituted(&self) -> bool {
        self.requested != self.sync_timestamp
    }
}

pub struct Store {
    conn: SqliteConnection,
}

impl Store {
    /// Open (creating if needed) the database at `path` and bring its schema up to date.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let mut conn = SqliteConnection::establish(path)?;
        conn.batch_execute(CONNECTION_PRAGMAS)?;
        let mut store = Store { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn ensure_schema(&mut self) -> Result<(), StoreError> {
        let applied = self
            .conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        if applied.is_empty() {
            debug!("Database schema is up to date; no migrations were applied");
        } else {
            let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
            info!("Applied {} database migration(s): {}", applied.len(), names);
        }
        Ok(())
    }

    /// Execute one raw mutating statement, committed on its own.
    ///
    /// Failures are logged and reported as `None`; nothing is propagated.
    pub fn run(&mut self, statement: &str) -> Option<usize> {
        match diesel::sql_query(statement).execute(&mut self.conn) {
            Ok(rows) => {
                debug!("Statement executed ({} row(s)): {}", rows, statement);
                Some(rows)
            }
            Err(e) => {
                error!("Statement failed: {} ({})", statement, e);
                None
            }
        }
    }

    pub fn all_sensors(&mut self) -> Result<Vec<Sensor>, StoreError> {
        use schema::sensors::dsl as S;
        Ok(S::sensors
            .select(Sensor::as_select())
            .order(S::sensor_id.asc())
            .load(&mut self.conn)?)
    }

    pub fn all_groupings(&mut self) -> Result<Vec<Grouping>, StoreError> {
        use schema::groupings::dsl as G;
        Ok(G::groupings
            .select(Grouping::as_select())
            .order(G::grouping_id.asc())
            .load(&mut self.conn)?)
    }

    pub fn all_readings(&mut self) -> Result<Vec<Reading>, StoreError> {
        use schema::temperature_data::dsl as T;
        Ok(T::temperature_data
            .select(Reading::as_select())
            .order(T::data_id.asc())
            .load(&mut self.conn)?)
    }

    /// Every sync timestamp present, ascending.
    pub fn distinct_sync_timestamps(&mut self) -> Result<Vec<i64>, StoreError> {
        use schema::temperature_data::dsl as T;
        let values: Vec<Option<i64>> = T::temperature_data
            .select(T::sync_timestamp)
            .distinct()
            .order(T::sync_timestamp.asc())
            .load(&mut self.conn)?;
        Ok(values.into_iter().flatten().collect())
    }

    pub fn readings_at(&mut self, sync_timestamp: i64) -> Result<Vec<Reading>, StoreError> {
        use schema::temperature_data::dsl as T;
        Ok(T::temperature_data
            .filter(T::sync_timestamp.eq(sync_timestamp))
            .select(Reading::as_select())
            .order(T::data_id.asc())
            .load(&mut self.conn)?)
    }

    /// Readings whose sync timestamp is in `(after, up_to]`.
    pub fn readings_between(&mut self, after: i64, up_to: i64) -> Result<Vec<Reading>, StoreError> {
        use schema::temperature_data::dsl as T;
        Ok(T::temperature_data
            .filter(T::sync_timestamp.gt(after).and(T::sync_timestamp.le(up_to)))
            .select(Reading::as_select())
            .order(T::data_id.asc())
            .load(&mut self.conn)?)
    }

    /// Readings for `sync_timestamp`, or for the nearest stored one when there is no exact match.
    ///
    /// Returns `None` when the store holds no readings at all.
    pub fn readings_near(&mut self, sync_timestamp: i64) -> Result<Option<SnapshotReadings>, StoreError> {
        let timestamps = self.distinct_sync_timestamps()?;
        let Some(chosen) = crate::services::selection::nearest(&timestamps, sync_timestamp) else {
            return Ok(None);
        };
        if chosen != sync_timestamp {
            info!(
                "Couldn't find exact timestamp {}, returning closest one: {}",
                sync_timestamp, chosen
            );
        }
        let readings = self.readings_at(chosen)?;
        Ok(Some(SnapshotReadings {
            requested: sync_timestamp,
            sync_timestamp: chosen,
            readings,
        }))
    }

    /// Every reading joined with its sensor and grouping, in insertion order.
    pub fn joined_readings(&mut self) -> Result<Vec<JoinedReading>, StoreError> {
        use schema::temperature_data::dsl as T;
        let rows: Vec<(Reading, Sensor, Grouping)> = T::temperature_data
            .inner_join(schema::sensors::table.inner_join(schema::groupings::table))
            .select((Reading::as_select(), Sensor::as_select(), Grouping::as_select()))
            .order(T::data_id.asc())
            .load(&mut self.conn)?;
        Ok(rows.into_iter().map(JoinedReading::from).collect())
    }

    pub fn readings_for_sensor(&mut self, sensor_id: &str) -> Result<Vec<JoinedReading>, StoreError> {
        use schema::temperature_data::dsl as T;
        let rows: Vec<(Reading, Sensor, Grouping)> = T::temperature_data
            .inner_join(schema::sensors::table.inner_join(schema::groupings::table))
            .filter(T::sensor_id.eq(sensor_id))
            .select((Reading::as_select(), Sensor::as_select(), Grouping::as_select()))
            .order(T::data_id.asc())
            .load(&mut self.conn)?;
        Ok(rows.into_iter().map(JoinedReading::from).collect())
    }

    pub fn readings_for_grouping(&mut self, grouping_id: i32) -> Result<Vec<JoinedReading>, StoreError> {
        use schema::temperature_data::dsl as T;
        let rows: Vec<(Reading, Sensor, Grouping)> = T::temperature_data
            .inner_join(schema::sensors::table.inner_join(schema::groupings::table))
            .filter(schema::sensors::grouping_id.eq(grouping_id))
            .select((Reading::as_select(), Sensor::as_select(), Grouping::as_select()))
            .order(T::data_id.asc())
            .load(&mut self.conn)?;
        Ok(rows.into_iter().map(JoinedReading::from).collect())
    }

    /// Insert the grouping unless a row with its id already exists.
    ///
    /// Never overwrites: returns `true` only when a row was created.
    pub fn ensure_grouping(&mut self, grouping: &NewGrouping<'_>) -> Result<bool, StoreError> {
        use schema::groupings::dsl as G;
        let inserted = diesel::insert_into(G::groupings)
            .values(grouping)
            .on_conflict(G::grouping_id)
            .do_nothing()
            .execute(&mut self.conn)?;
        Ok(inserted > 0)
    }

    pub fn ensure_default_grouping(&mut self) -> Result<bool, StoreError> {
        self.ensure_grouping(&NewGrouping::ungrouped())
    }

    /// Register a sensor with placeholder metadata unless it is already known.
    ///
    /// Never overwrites: returns `true` only when a row was created.
    pub fn ensure_sensor(&mut self, sensor_id: &str) -> Result<bool, StoreError> {
        use schema::sensors::dsl as S;
        let inserted = diesel::insert_into(S::sensors)
            .values(&NewSensor::placeholder(sensor_id))
            .on_conflict(S::sensor_id)
            .do_nothing()
            .execute(&mut self.conn)?;
        Ok(inserted > 0)
    }

    pub fn insert_reading(&mut self, row: &NewReading<'_>) -> Result<(), StoreError> {
        use schema::temperature_data::dsl as T;
        diesel::insert_into(T::temperature_data)
            .values(row)
            .execute(&mut self.conn)?;
        Ok(())
    }

    /// Create a new active grouping and return its generated id.
    pub fn create_grouping(&mut self, pretty_name: &str, short_name: Option<&str>) -> Result<i32, StoreError> {
        use schema::groupings::dsl as G;
        self.conn.transaction(|conn| {
            diesel::insert_into(G::groupings)
                .values((
                    G::grouping_pretty_name.eq(pretty_name),
                    G::grouping_short_name.eq(short_name),
                    G::is_grouping_active.eq(1),
                ))
                .execute(conn)?;
            G::groupings
                .select(diesel::dsl::max(G::grouping_id))
                .first::<Option<i32>>(conn)?
                .ok_or(diesel::result::Error::NotFound)
        })
        .map_err(StoreError::from)
    }

    /// Edit a registered sensor's metadata; unset fields keep their stored value.
    ///
    /// Returns `false` when no sensor with that id exists.
    pub fn configure_sensor(&mut self, sensor_id: &str, update: &SensorUpdate) -> Result<bool, StoreError> {
        use schema::sensors::dsl as S;
        let Some(mut current) = S::sensors
            .find(sensor_id)
            .select(Sensor::as_select())
            .first(&mut self.conn)
            .optional()?
        else {
            return Ok(false);
        };

        if let Some(name) = &update.pretty_name {
            current.sensor_pretty_name = Some(name.clone());
        }
        if let Some(short) = &update.short_name {
            current.sensor_short_name = Some(short.clone());
        }
        if let Some(grouping_id) = update.grouping_id {
            current.grouping_id = grouping_id;
        }
        if let Some(role) = update.role {
            current.flow1_return0 = Some(role.to_db());
        }
        if let Some(active) = update.active {
            current.is_sensor_active = Some(i32::from(active));
        }
        if let Some(offset) = update.calibration_correction {
            current.calibration_correction = Some(offset);
        }

        diesel::update(S::sensors.find(sensor_id))
            .set((
                S::sensor_pretty_name.eq(current.sensor_pretty_name),
                S::sensor_short_name.eq(current.sensor_short_name),
                S::grouping_id.eq(current.grouping_id),
                S::flow1_return0.eq(current.flow1_return0),
                S::is_sensor_active.eq(current.is_sensor_active),
                S::calibration_correction.eq(current.calibration_correction),
            ))
            .execute(&mut self.conn)?;
        Ok(true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SensorUpdate {
    pub pretty_name: Option<String>,
    pub short_name: Option<String>,
    pub grouping_id: Option<i32>,
    pub role: Option<SensorRole>,
    pub active: Option<bool>,
    pub calibration_correction: Option<f64>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn memory_store() -> Store {
        Store::open(":memory:").expect("in-memory store")
    }

    pub(crate) fn add_reading(store: &mut Store, sync_timestamp: i64, sensor_id: &str, temp: f64) {
        store.ensure_default_grouping().expect("default grouping");
        store.ensure_sensor(sensor_id).expect("sensor");
        store
            .insert_reading(&NewReading {
                sync_timestamp,
                timestamp: sync_timestamp as f64 + 0.25,
                sensor_id,
                temp_deg_c: temp,
            })
            .expect("reading");
    }

    #[test]
    fn default_grouping_is_inserted_once() {
        let mut store = memory_store();
        assert!(store.ensure_default_grouping().unwrap());
        assert!(!store.ensure_default_grouping().unwrap());

        let groupings = store.all_groupings().unwrap();
        assert_eq!(groupings.len(), 1);
        assert_eq!(groupings[0].grouping_id, 0);
        assert_eq!(groupings[0].display_name(), "DefaultGroup");
        assert!(!groupings[0].is_active());
    }

    #[test]
    fn sensor_registration_never_overwrites() {
        let mut store = memory_store();
        store.ensure_default_grouping().unwrap();
        let grouping = store.create_grouping("Lounge radiator", Some("LNG")).unwrap();
        assert!(store.ensure_sensor("28-0001").unwrap());

        let update = SensorUpdate {
            pretty_name: Some("Lounge flow".into()),
            short_name: Some("LF".into()),
            grouping_id: Some(grouping),
            role: Some(SensorRole::Flow),
            active: Some(true),
            calibration_correction: Some(0.3),
        };
        assert!(store.configure_sensor("28-0001", &update).unwrap());
        let before = store.all_sensors().unwrap();

        assert!(!store.ensure_sensor("28-0001").unwrap());
        assert!(!store.ensure_sensor("28-0001").unwrap());
        assert_eq!(store.all_sensors().unwrap(), before);
        assert_eq!(before[0].role(), Some(SensorRole::Flow));
        assert_eq!(before[0].grouping_id, grouping);
    }

    #[test]
    fn new_sensor_gets_placeholder_metadata() {
        let mut store = memory_store();
        store.ensure_default_grouping().unwrap();
        store.ensure_sensor("28-00ff").unwrap();

        let sensors = store.all_sensors().unwrap();
        assert_eq!(sensors.len(), 1);
        let s = &sensors[0];
        assert_eq!(s.grouping_id, 0);
        assert!(!s.is_active());
        assert_eq!(s.flow1_return0, Some(-1));
        assert_eq!(s.role(), None);
        assert_eq!(s.calibration_correction, Some(0.0));
    }

    #[test]
    fn configure_unknown_sensor_reports_missing() {
        let mut store = memory_store();
        assert!(!store.configure_sensor("nope", &SensorUpdate::default()).unwrap());
    }

    #[test]
    fn distinct_timestamps_are_sorted_and_unique() {
        let mut store = memory_store();
        add_reading(&mut store, 300, "a", 40.0);
        add_reading(&mut store, 100, "a", 41.0);
        add_reading(&mut store, 100, "b", 35.0);
        add_reading(&mut store, 200, "a", 42.0);
        assert_eq!(store.distinct_sync_timestamps().unwrap(), vec![100, 200, 300]);
    }

    #[test]
    fn readings_near_prefers_exact_match() {
        let mut store = memory_store();
        add_reading(&mut store, 100, "a", 40.0);
        add_reading(&mut store, 200, "a", 50.0);
        let snapshot = store.readings_near(200).unwrap().unwrap();
        assert!(!snapshot.substituted());
        assert_eq!(snapshot.readings.len(), 1);
        assert_eq!(snapshot.readings[0].temp_deg_c, Some(50.0));
    }

    #[test]
    fn readings_near_falls_back_to_closest() {
        let mut store = memory_store();
        add_reading(&mut store, 100, "a", 40.0);
        add_reading(&mut store, 200, "a", 50.0);
        add_reading(&mut store, 200, "b", 30.0);

        let snapshot = store.readings_near(180).unwrap().unwrap();
        assert!(snapshot.substituted());
        assert_eq!(snapshot.requested, 180);
        assert_eq!(snapshot.sync_timestamp, 200);
        assert_eq!(snapshot.readings.len(), 2);

        // equidistant resolves to the earlier timestamp
        let tie = store.readings_near(150).unwrap().unwrap();
        assert_eq!(tie.sync_timestamp, 100);
    }

    #[test]
    fn readings_near_on_empty_store_is_none() {
        let mut store = memory_store();
        assert!(store.readings_near(100).unwrap().is_none());
    }

    #[test]
    fn filtered_joins_by_sensor_and_grouping() {
        let mut store = memory_store();
        add_reading(&mut store, 100, "a", 40.0);
        add_reading(&mut store, 100, "b", 35.0);
        add_reading(&mut store, 200, "a", 41.0);
        let lounge = store.create_grouping("Lounge", None).unwrap();
        store
            .configure_sensor(
                "b",
                &SensorUpdate {
                    grouping_id: Some(lounge),
                    ..Default::default()
                },
            )
            .unwrap();

        let for_a = store.readings_for_sensor("a").unwrap();
        assert_eq!(for_a.len(), 2);
        assert!(for_a.iter().all(|r| r.sensor.sensor_id == "a"));

        let for_lounge = store.readings_for_grouping(lounge).unwrap();
        assert_eq!(for_lounge.len(), 1);
        assert_eq!(for_lounge[0].grouping.display_name(), "Lounge");
        assert_eq!(store.readings_for_grouping(0).unwrap().len(), 2);
    }

    #[test]
    fn run_reports_failures_without_raising() {
        let mut store = memory_store();
        assert_eq!(store.run("DELETE FROM temperature_data"), Some(0));
        assert_eq!(store.run("INSERT INTO no_such_table VALUES (1)"), None);
    }

    #[test]
    fn readings_between_is_half_open() {
        let mut store = memory_store();
        add_reading(&mut store, 100, "a", 40.0);
        add_reading(&mut store, 200, "a", 41.0);
        add_reading(&mut store, 300, "a", 42.0);
        let rows = store.readings_between(100, 300).unwrap();
        let stamps: Vec<_> = rows.iter().filter_map(|r| r.sync_timestamp).collect();
        assert_eq!(stamps, vec![200, 300]);
    }
}
