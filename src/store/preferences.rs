//! User preference key/value storage, last-write-wins per `(user_id, key)`.

use super::SessionStore;
use crate::error::AppError;
use crate::models::UserPreference;
use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

impl SessionStore {
    pub fn set_preference(
        &self,
        user_id: Uuid,
        key: &str,
        value: &str,
        category: Option<&str>,
    ) -> Result<(), AppError> {
        let conn = self.conn().map_err(AppError::internal)?;
        conn.execute(
            "INSERT INTO user_preferences (user_id, key, value, category, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, key) DO UPDATE SET
                value = excluded.value,
                category = excluded.category,
                updated_at = excluded.updated_at",
            params![
                user_id.to_string(),
                key,
                value,
                category.unwrap_or("general"),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(AppError::internal)?;
        Ok(())
    }

    pub fn get_preferences(&self, user_id: Uuid) -> Result<Vec<UserPreference>, AppError> {
        let conn = self.conn().map_err(AppError::internal)?;
        let mut stmt = conn
            .prepare("SELECT user_id, key, value, category, updated_at FROM user_preferences WHERE user_id = ?1")
            .map_err(AppError::internal)?;

        let prefs = stmt
            .query_map(params![user_id.to_string()], |row| {
                let updated_at_str: String = row.get(4)?;
                Ok(UserPreference {
                    user_id,
                    key: row.get(1)?,
                    value: row.get(2)?,
                    category: row.get(3)?,
                    updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at_str)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .map_err(AppError::internal)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::internal)?;

        Ok(prefs)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_store;
    use super::*;

    #[test]
    fn set_preference_is_last_write_wins() {
        let (store, _temp) = test_store();
        let user_id = Uuid::new_v4();

        store.set_preference(user_id, "risk_tolerance", "low", None).unwrap();
        store.set_preference(user_id, "risk_tolerance", "high", Some("trading")).unwrap();

        let prefs = store.get_preferences(user_id).unwrap();
        assert_eq!(prefs.len(), 1);
        assert_eq!(prefs[0].value, "high");
        assert_eq!(prefs[0].category, "trading");
    }

    #[test]
    fn default_category_is_general() {
        let (store, _temp) = test_store();
        let user_id = Uuid::new_v4();
        store.set_preference(user_id, "theme", "dark", None).unwrap();
        let prefs = store.get_preferences(user_id).unwrap();
        assert_eq!(prefs[0].category, "general");
    }
}
