use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Row};

use crate::db::{
    helpers::{format_date, invalid_data, parse_date, to_u32},
    models::UsageRecord,
    Database,
};

fn row_to_usage_record(row: &Row) -> Result<UsageRecord, rusqlite::Error> {
    let usage_date: String = row.get("usage_date")?;
    let minutes: i64 = row.get("minutes")?;

    Ok(UsageRecord {
        id: Some(row.get("id")?),
        package_id: row.get("package_id")?,
        display_name: row.get("display_name")?,
        date: parse_date(&usage_date, "usage_date").map_err(invalid_data)?,
        minutes: to_u32(minutes, "minutes").map_err(invalid_data)?,
    })
}

impl Database {
    pub async fn insert_usage_record(&self, record: &UsageRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO usage_records (package_id, display_name, usage_date, minutes)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.package_id,
                    record.display_name,
                    format_date(record.date),
                    i64::from(record.minutes),
                ],
            )
            .with_context(|| "failed to insert usage record")?;
            Ok(())
        })
        .await
    }

    pub async fn get_usage_records_for_date(&self, date: NaiveDate) -> Result<Vec<UsageRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, package_id, display_name, usage_date, minutes
                 FROM usage_records
                 WHERE usage_date = ?1
                 ORDER BY minutes DESC, id ASC",
            )?;

            let records = stmt
                .query_map(params![format_date(date)], row_to_usage_record)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(records)
        })
        .await
    }

    /// Replace every usage row for `date` in one transaction.
    pub async fn replace_usage_records_for_date(
        &self,
        date: NaiveDate,
        records: Vec<UsageRecord>,
    ) -> Result<usize> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM usage_records WHERE usage_date = ?1",
                params![format_date(date)],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO usage_records (package_id, display_name, usage_date, minutes)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for record in &records {
                    stmt.execute(params![
                        record.package_id,
                        record.display_name,
                        format_date(date),
                        i64::from(record.minutes),
                    ])?;
                }
            }
            tx.commit().context("failed to commit usage replacement")?;
            Ok(records.len())
        })
        .await
    }

    /// Removes every usage and charge record in one transaction.
    pub async fn delete_history(&self) -> Result<()> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM usage_records", [])?;
            tx.execute("DELETE FROM charge_records", [])?;
            tx.commit().context("failed to commit history clear")?;
            Ok(())
        })
        .await
    }
}
