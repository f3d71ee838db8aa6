//! Session snapshots: save, load, and clear a driver's preserved state.

use std::{fs, io};

use rusqlite::{Connection, OptionalExtension, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::model::{
    Coordinates, Destination, Driver, OnlineStatus, Route, RouteStatus, Stop, StopStatus,
    VehicleType,
};
use crate::session::SessionSnapshot;

use super::{Result, Storage, StorageError};

impl Storage {
    /// Replaces the driver's stored snapshot.
    pub fn save_snapshot(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let mut conn = self.create_db(snapshot.driver.id)?;
        let tx = conn.transaction()?;
        tx.execute_batch("DELETE FROM stops; DELETE FROM route; DELETE FROM driver;")?;

        let driver = &snapshot.driver;
        tx.execute(
            "INSERT INTO driver (id, name, vehicle_type, license_plate, online_status, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                driver.id.to_string(),
                &driver.name,
                driver.vehicle_type.as_str(),
                &driver.license_plate,
                driver.online_status.as_str(),
                snapshot.saved_at.to_string(),
            ],
        )?;
        if let Some(route) = &snapshot.route {
            insert_route(&tx, route, snapshot.current_stop_index)?;
        }
        tx.commit()?;

        debug!(driver = %driver.id, "snapshot saved");
        Ok(())
    }

    /// Loads the driver's stored snapshot.
    pub fn load_snapshot(&self, driver_id: Uuid) -> Result<SessionSnapshot> {
        let conn = self.open_db(driver_id)?;
        let (driver, saved_at) = load_driver_row(&conn)?
            .ok_or(StorageError::NotFound(driver_id))?;
        let (route, current_stop_index) = match load_route_row(&conn)? {
            Some((mut route, index)) => {
                route.stops = load_stop_rows(&conn)?;
                (Some(route), index)
            }
            None => (None, 0),
        };
        Ok(SessionSnapshot {
            driver,
            route,
            current_stop_index,
            saved_at,
        })
    }

    /// Removes the driver's snapshot. Succeeds if there is none.
    pub fn clear_snapshot(&self, driver_id: Uuid) -> Result<()> {
        match fs::remove_file(self.db_path(driver_id)) {
            Ok(()) => {
                debug!(driver = %driver_id, "snapshot cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn insert_route(tx: &Transaction<'_>, route: &Route, current_stop_index: usize) -> Result<()> {
    tx.execute(
        "INSERT INTO route (id, name, status, total_distance_m, estimated_time_s,
                            optimization_score, current_stop_index)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            route.id.to_string(),
            &route.name,
            route.status.as_str(),
            route.total_distance_m,
            to_sql_int(route.estimated_time_s)?,
            route.optimization_score,
            to_sql_int(current_stop_index)?,
        ],
    )?;

    let mut stmt = tx.prepare(
        "INSERT INTO stops (id, position, tracking_number, address, lat, lng, notes, items,
                            status, failure_reason, requires_signature, cash_on_delivery)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?;
    for (position, stop) in route.stops.iter().enumerate() {
        let (status, reason) = serialize_status(&stop.status);
        stmt.execute(rusqlite::params![
            stop.id.to_string(),
            to_sql_int(position)?,
            &stop.tracking_number,
            &stop.destination.address,
            stop.destination.coordinates.lat,
            stop.destination.coordinates.lng,
            stop.destination.notes,
            serde_json::to_string(&stop.items)?,
            status,
            reason,
            stop.requires_signature,
            stop.cash_on_delivery,
        ])?;
    }
    Ok(())
}

fn load_driver_row(conn: &Connection) -> Result<Option<(Driver, jiff::Timestamp)>> {
    let row = conn
        .query_row(
            "SELECT id, name, vehicle_type, license_plate, online_status, saved_at
             FROM driver LIMIT 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;
    let Some((id, name, vehicle, license_plate, online, saved_at)) = row else {
        return Ok(None);
    };

    let vehicle_type = VehicleType::parse(&vehicle)
        .ok_or_else(|| StorageError::Corrupt(format!("unknown vehicle type: {vehicle}")))?;
    let online_status = match online.as_str() {
        "online" => OnlineStatus::Online,
        "offline" => OnlineStatus::Offline,
        other => {
            return Err(StorageError::Corrupt(format!(
                "unknown online status: {other}"
            )));
        }
    };
    let saved_at = saved_at
        .parse::<jiff::Timestamp>()
        .map_err(|e| StorageError::Corrupt(format!("invalid saved_at: {e}")))?;

    Ok(Some((
        Driver {
            id: parse_id(&id)?,
            name,
            vehicle_type,
            license_plate,
            online_status,
        },
        saved_at,
    )))
}

/// The route header with no stops, and the stored cursor.
fn load_route_row(conn: &Connection) -> Result<Option<(Route, usize)>> {
    let row = conn
        .query_row(
            "SELECT id, name, status, total_distance_m, estimated_time_s,
                    optimization_score, current_stop_index
             FROM route LIMIT 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            },
        )
        .optional()?;
    let Some((id, name, status, total_distance_m, estimated, score, index)) = row else {
        return Ok(None);
    };

    let status = RouteStatus::parse(&status)
        .ok_or_else(|| StorageError::Corrupt(format!("unknown route status: {status}")))?;
    let route = Route {
        id: parse_id(&id)?,
        name,
        stops: Vec::new(),
        status,
        total_distance_m,
        estimated_time_s: from_sql_int(estimated, "estimated_time_s")?,
        optimization_score: score,
    };
    Ok(Some((route, from_sql_int(index, "current_stop_index")?)))
}

fn load_stop_rows(conn: &Connection) -> Result<Vec<Stop>> {
    let mut stmt = conn.prepare(
        "SELECT id, tracking_number, address, lat, lng, notes, items, status,
                failure_reason, requires_signature, cash_on_delivery
         FROM stops ORDER BY position",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, Option<String>>(8)?,
            row.get::<_, bool>(9)?,
            row.get::<_, Option<f64>>(10)?,
        ))
    })?;

    let mut stops = Vec::new();
    for row in rows {
        let (id, tracking_number, address, lat, lng, notes, items, status, reason, sig, cash) =
            row?;
        stops.push(Stop {
            id: parse_id(&id)?,
            tracking_number,
            destination: Destination {
                address,
                coordinates: Coordinates { lat, lng },
                notes,
            },
            items: serde_json::from_str(&items)?,
            status: deserialize_status(&status, reason)?,
            requires_signature: sig,
            cash_on_delivery: cash,
        });
    }
    Ok(stops)
}

/// Converts a `StopStatus` to column values for the stops table.
fn serialize_status(status: &StopStatus) -> (&'static str, Option<&str>) {
    match status {
        StopStatus::Failed { reason } => (status.as_str(), Some(reason.as_str())),
        _ => (status.as_str(), None),
    }
}

/// Reconstructs a `StopStatus` from stops table column values.
fn deserialize_status(status: &str, reason: Option<String>) -> Result<StopStatus> {
    match status {
        "pending" => Ok(StopStatus::Pending),
        "en_route" => Ok(StopStatus::EnRoute),
        "arrived" => Ok(StopStatus::Arrived),
        "completed" => Ok(StopStatus::Completed),
        "failed" => {
            let reason = reason.ok_or_else(|| {
                StorageError::Corrupt("stop is failed but failure_reason is null".into())
            })?;
            Ok(StopStatus::Failed { reason })
        }
        other => Err(StorageError::Corrupt(format!("unknown stop status: {other}"))),
    }
}

fn parse_id(s: &str) -> Result<Uuid> {
    s.parse::<Uuid>()
        .map_err(|e| StorageError::Corrupt(format!("invalid id {s}: {e}")))
}

fn to_sql_int<T: TryInto<i64>>(value: T) -> Result<i64> {
    value
        .try_into()
        .map_err(|_| StorageError::Corrupt("integer out of range".into()))
}

fn from_sql_int<T: TryFrom<i64>>(value: i64, column: &str) -> Result<T> {
    T::try_from(value).map_err(|_| StorageError::Corrupt(format!("invalid {column}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::Timestamp;
    use tempfile::TempDir;

    use crate::testing::{sample_driver, sample_route};

    fn test_storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("sessions")).unwrap();
        (dir, storage)
    }

    fn sample_snapshot() -> SessionSnapshot {
        let mut route = sample_route(3);
        route.status = RouteStatus::Active;
        route.stops[0].status = StopStatus::Failed {
            reason: "Gate locked".into(),
        };
        route.stops[1].status = StopStatus::EnRoute;
        route.stops[1].cash_on_delivery = Some(42.5);
        route.stops[1].requires_signature = true;
        route.stops[1].destination.notes = Some("Ring twice".into());
        SessionSnapshot {
            driver: sample_driver(OnlineStatus::Online),
            route: Some(route),
            current_stop_index: 1,
            saved_at: Timestamp::now(),
        }
    }

    #[test]
    fn save_and_load_snapshot() {
        let (_dir, storage) = test_storage();
        let snapshot = sample_snapshot();

        storage.save_snapshot(&snapshot).unwrap();
        let loaded = storage.load_snapshot(snapshot.driver.id).unwrap();

        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let (_dir, storage) = test_storage();
        let mut snapshot = sample_snapshot();
        storage.save_snapshot(&snapshot).unwrap();

        snapshot.route = None;
        snapshot.current_stop_index = 0;
        storage.save_snapshot(&snapshot).unwrap();

        let loaded = storage.load_snapshot(snapshot.driver.id).unwrap();
        assert!(loaded.route.is_none());
    }

    #[test]
    fn load_missing_snapshot_fails() {
        let (_dir, storage) = test_storage();
        let err = storage.load_snapshot(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn clear_is_idempotent() {
        let (_dir, storage) = test_storage();
        let snapshot = sample_snapshot();
        storage.save_snapshot(&snapshot).unwrap();

        storage.clear_snapshot(snapshot.driver.id).unwrap();
        storage.clear_snapshot(snapshot.driver.id).unwrap();
        assert!(matches!(
            storage.load_snapshot(snapshot.driver.id),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn unknown_stop_status_is_corrupt() {
        let (_dir, storage) = test_storage();
        let snapshot = sample_snapshot();
        storage.save_snapshot(&snapshot).unwrap();

        let conn = storage.open_db(snapshot.driver.id).unwrap();
        conn.execute("UPDATE stops SET status = 'lost' WHERE position = 2", [])
            .unwrap();

        let err = storage.load_snapshot(snapshot.driver.id).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }

    #[test]
    fn failed_without_reason_is_corrupt() {
        let err = deserialize_status("failed", None).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }
}
