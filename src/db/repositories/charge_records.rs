use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Row};

use crate::db::{
    helpers::{format_date, invalid_data, parse_date, parse_datetime, to_u32},
    models::ChargeRecord,
    Database,
};

fn row_to_charge_record(row: &Row) -> Result<ChargeRecord, rusqlite::Error> {
    let charge_date: String = row.get("charge_date")?;
    let duration_minutes: i64 = row.get("duration_minutes")?;
    let ratio: f64 = row.get("ratio")?;
    let created_at: String = row.get("created_at")?;

    Ok(ChargeRecord {
        id: Some(row.get("id")?),
        activity_type: row.get("activity_type")?,
        date: parse_date(&charge_date, "charge_date").map_err(invalid_data)?,
        duration_minutes: to_u32(duration_minutes, "duration_minutes").map_err(invalid_data)?,
        ratio: ratio as f32,
        created_at: parse_datetime(&created_at, "created_at").map_err(invalid_data)?,
    })
}

impl Database {
    pub async fn insert_charge_record(&self, record: &ChargeRecord) -> Result<i64> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO charge_records (activity_type, charge_date, duration_minutes, ratio, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.activity_type,
                    format_date(record.date),
                    i64::from(record.duration_minutes),
                    f64::from(record.ratio),
                    record.created_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert charge record")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn get_charge_records_for_date(&self, date: NaiveDate) -> Result<Vec<ChargeRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, activity_type, charge_date, duration_minutes, ratio, created_at
                 FROM charge_records
                 WHERE charge_date = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;

            let records = stmt
                .query_map(params![format_date(date)], row_to_charge_record)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(records)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn charge_round_trips_through_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("energy.sqlite3")).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let id = db
            .insert_charge_record(&ChargeRecord::new("測試充電", date, 5, 2.0))
            .await
            .unwrap();

        let records = db.get_charge_records_for_date(date).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, Some(id));
        assert_eq!(records[0].activity_type, "測試充電");
        assert_eq!(records[0].energy_delta(), 10);
    }
}
