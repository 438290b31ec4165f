//! Row-level access to the `scan_results` table.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::models::{DiseaseLabel, ScanRecord, ValidatedUpdate};

const SCAN_COLUMNS: &str = "id, image_key, disease_detected, confidence_score, recommendations,
     scan_location, user_notes, created_at, updated_at";

/// Timestamps are stored as fixed-width RFC 3339 text so that string order
/// matches chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp '{value}': {e}")))
}

type RawScanRow = (
    i64,
    String,
    Option<String>,
    Option<f64>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    String,
);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawScanRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn into_record(raw: RawScanRow) -> Result<ScanRecord, DatabaseError> {
    let (
        id,
        image_key,
        disease_detected,
        confidence_score,
        recommendations,
        scan_location,
        user_notes,
        created_at,
        updated_at,
    ) = raw;
    Ok(ScanRecord {
        id,
        image_key,
        disease_detected: disease_detected
            .as_deref()
            .map(DiseaseLabel::from_str)
            .transpose()?,
        confidence_score,
        recommendations,
        scan_location,
        user_notes,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Insert a freshly uploaded scan in the pending state. Returns the new id.
pub fn insert_pending_scan(
    conn: &Connection,
    image_key: &str,
    now: &DateTime<Utc>,
) -> Result<i64, DatabaseError> {
    let ts = format_timestamp(now);
    conn.execute(
        "INSERT INTO scan_results
         (image_key, disease_detected, confidence_score, recommendations,
          scan_location, user_notes, created_at, updated_at)
         VALUES (?1, ?2, NULL, NULL, NULL, NULL, ?3, ?3)",
        params![image_key, DiseaseLabel::PendingAnalysis.as_str(), ts],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_scan(conn: &Connection, id: i64) -> Result<Option<ScanRecord>, DatabaseError> {
    let raw = conn
        .query_row(
            &format!("SELECT {SCAN_COLUMNS} FROM scan_results WHERE id = ?1"),
            params![id],
            read_row,
        )
        .optional()?;
    raw.map(into_record).transpose()
}

/// Most recent scans first.
pub fn list_scans(conn: &Connection, limit: u32) -> Result<Vec<ScanRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCAN_COLUMNS} FROM scan_results
         ORDER BY created_at DESC, id DESC
         LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], read_row)?;

    let mut scans = Vec::new();
    for row in rows {
        scans.push(into_record(row?)?);
    }
    Ok(scans)
}

/// Apply a partial update. Unset fields keep their stored value.
pub fn update_scan(
    conn: &Connection,
    id: i64,
    update: &ValidatedUpdate,
    updated_at: &DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE scan_results SET
            disease_detected = COALESCE(?1, disease_detected),
            confidence_score = COALESCE(?2, confidence_score),
            recommendations = COALESCE(?3, recommendations),
            scan_location = COALESCE(?4, scan_location),
            user_notes = COALESCE(?5, user_notes),
            updated_at = ?6
         WHERE id = ?7",
        params![
            update.disease_detected.map(|l| l.as_str()),
            update.confidence_score,
            update.recommendations,
            update.scan_location,
            update.user_notes,
            format_timestamp(updated_at),
            id,
        ],
    )?;

    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "scan".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use chrono::Duration;

    #[test]
    fn insert_then_get_returns_pending_record() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();
        let id = insert_pending_scan(&conn, "scans/1-leaf.jpg", &now).unwrap();

        let scan = get_scan(&conn, id).unwrap().unwrap();
        assert_eq!(scan.image_key, "scans/1-leaf.jpg");
        assert_eq!(scan.disease_detected, Some(DiseaseLabel::PendingAnalysis));
        assert!(scan.confidence_score.is_none());
        assert!(scan.recommendations.is_none());
        assert_eq!(scan.created_at, scan.updated_at);
    }

    #[test]
    fn get_missing_returns_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_scan(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn list_orders_most_recent_first_and_limits() {
        let conn = open_memory_database().unwrap();
        let base = Utc::now();
        for i in 0..5 {
            insert_pending_scan(&conn, &format!("scans/{i}-a.jpg"), &(base + Duration::seconds(i)))
                .unwrap();
        }

        let scans = list_scans(&conn, 3).unwrap();
        assert_eq!(scans.len(), 3);
        assert_eq!(scans[0].image_key, "scans/4-a.jpg");
        assert_eq!(scans[2].image_key, "scans/2-a.jpg");
    }

    #[test]
    fn list_empty_is_ok() {
        let conn = open_memory_database().unwrap();
        assert!(list_scans(&conn, 50).unwrap().is_empty());
    }

    #[test]
    fn partial_update_keeps_unset_fields() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();
        let id = insert_pending_scan(&conn, "scans/1-leaf.jpg", &now).unwrap();

        let first = ValidatedUpdate {
            scan_location: Some("North field".into()),
            ..Default::default()
        };
        update_scan(&conn, id, &first, &(now + Duration::seconds(1))).unwrap();

        let second = ValidatedUpdate {
            disease_detected: Some(DiseaseLabel::Rust),
            confidence_score: Some(0.82),
            ..Default::default()
        };
        update_scan(&conn, id, &second, &(now + Duration::seconds(2))).unwrap();

        let scan = get_scan(&conn, id).unwrap().unwrap();
        assert_eq!(scan.disease_detected, Some(DiseaseLabel::Rust));
        assert_eq!(scan.confidence_score, Some(0.82));
        assert_eq!(scan.scan_location.as_deref(), Some("North field"));
        assert!(scan.updated_at > scan.created_at);
    }

    #[test]
    fn update_missing_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = update_scan(&conn, 9, &ValidatedUpdate::default(), &Utc::now()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn timestamps_round_trip_with_microseconds() {
        let ts = Utc::now();
        let parsed = parse_timestamp(&format_timestamp(&ts)).unwrap();
        assert_eq!(parsed.timestamp_micros(), ts.timestamp_micros());
    }
}
