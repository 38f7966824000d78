use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    models::{habit_app::validation, HabitApp},
    Database,
};

fn row_to_habit_app(row: &Row) -> Result<HabitApp, rusqlite::Error> {
    let ratio: f64 = row.get("ratio")?;

    Ok(HabitApp {
        package_id: row.get("package_id")?,
        display_name: row.get("display_name")?,
        ratio: ratio as f32,
        is_good_habit: row.get("is_good_habit")?,
        is_bad_habit: row.get("is_bad_habit")?,
    })
}

impl Database {
    pub async fn get_habit_app(&self, package_id: String) -> Result<Option<HabitApp>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT package_id, display_name, ratio, is_good_habit, is_bad_habit
                 FROM habit_apps
                 WHERE package_id = ?1",
            )?;

            let result = stmt
                .query_row(params![package_id], row_to_habit_app)
                .optional()?;

            Ok(result)
        })
        .await
    }

    pub async fn get_all_habit_apps(&self) -> Result<Vec<HabitApp>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT package_id, display_name, ratio, is_good_habit, is_bad_habit
                 FROM habit_apps
                 ORDER BY display_name ASC",
            )?;

            let apps = stmt
                .query_map([], row_to_habit_app)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(apps)
        })
        .await
    }

    pub async fn get_habit_app_map(&self) -> Result<HashMap<String, HabitApp>> {
        let apps = self.get_all_habit_apps().await?;
        Ok(apps
            .into_iter()
            .map(|app| (app.package_id.clone(), app))
            .collect())
    }

    /// Insert or update a habit app keyed by package id.
    pub async fn upsert_habit_app(&self, app: HabitApp) -> Result<()> {
        validation::validate_package_id(&app.package_id)?;
        validation::validate_ratio(app.ratio)?;

        let updated_at = Utc::now().to_rfc3339();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO habit_apps (package_id, display_name, ratio, is_good_habit, is_bad_habit, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(package_id) DO UPDATE SET
                     display_name = excluded.display_name,
                     ratio = excluded.ratio,
                     is_good_habit = excluded.is_good_habit,
                     is_bad_habit = excluded.is_bad_habit,
                     updated_at = excluded.updated_at",
                params![
                    app.package_id,
                    app.display_name,
                    f64::from(app.ratio),
                    app.is_good_habit,
                    app.is_bad_habit,
                    updated_at,
                ],
            )
            .with_context(|| "failed to upsert habit app")?;
            Ok(())
        })
        .await
    }

    pub async fn delete_habit_app(&self, package_id: String) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM habit_apps WHERE package_id = ?1",
                params![package_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn delete_all_habit_apps(&self) -> Result<()> {
        self.execute(|conn| {
            let removed = conn.execute("DELETE FROM habit_apps", [])?;
            log::info!("Cleared {removed} habit app rows");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_overwrites_by_package_id() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("energy.sqlite3")).unwrap();

        db.upsert_habit_app(HabitApp::good("com.reader", "Reader", 2.0))
            .await
            .unwrap();
        let mut updated = HabitApp::good("com.reader", "Reader", 3.0);
        updated.is_bad_habit = true;
        db.upsert_habit_app(updated).await.unwrap();

        let apps = db.get_all_habit_apps().await.unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].ratio, 3.0);
        assert!(apps[0].is_good_habit && apps[0].is_bad_habit);
    }

    #[tokio::test]
    async fn invalid_rows_never_reach_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("energy.sqlite3")).unwrap();

        assert!(db.upsert_habit_app(HabitApp::new("", "Nameless")).await.is_err());
        assert!(db
            .upsert_habit_app(HabitApp::good("com.reader", "Reader", -1.0))
            .await
            .is_err());
        assert!(db.get_all_habit_apps().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("energy.sqlite3")).unwrap();

        db.upsert_habit_app(HabitApp::bad("com.video", "Video"))
            .await
            .unwrap();
        assert!(db.get_habit_app("com.video".into()).await.unwrap().is_some());

        db.delete_habit_app("com.video".into()).await.unwrap();
        assert!(db.get_habit_app("com.video".into()).await.unwrap().is_none());
        assert!(db.get_habit_app_map().await.unwrap().is_empty());
    }
}
