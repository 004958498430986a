//! User Storage
//! Mission: Securely store and manage user accounts with SQLite

use crate::models::User;
use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

/// User storage with SQLite backend
pub struct UserStore {
    db_path: String,
}

impl UserStore {
    /// Create a new user store and initialize database (no seeding).
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_admin INTEGER NOT NULL DEFAULT 0,
                email TEXT,
                created_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Seed an admin user if none exists yet. `password` is the operator-supplied
    /// `ADMIN_PASSWORD`; when `None` a random 16-char password is generated and
    /// returned so the caller can emit it exactly once via `warn!`.
    pub fn ensure_admin(
        &self,
        username: &str,
        password: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<String>> {
        let conn = Connection::open(&self.db_path)?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM users WHERE is_admin = 1 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("failed to check for existing admin")?;

        if existing.is_some() {
            return Ok(None);
        }

        let (password_owned, generated) = match password {
            Some(p) => (p.to_string(), false),
            None => (generate_random_password(16), true),
        };

        let password_hash = hash(&password_owned, DEFAULT_COST).context("failed to hash password")?;

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            is_active: true,
            is_admin: true,
            email: email.map(|e| e.to_string()),
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO users (id, username, password_hash, is_active, is_admin, email, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id.to_string(),
                user.username,
                user.password_hash,
                user.is_active as i64,
                user.is_admin as i64,
                user.email,
                user.created_at.to_rfc3339(),
            ],
        )
        .context("failed to insert admin user")?;

        info!(username = %username, "admin user seeded");
        if generated {
            warn!(password = %password_owned, "generated admin password, shown once - store it now");
            Ok(Some(password_owned))
        } else {
            Ok(None)
        }
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let created_at_str: String = row.get(6)?;
        Ok(User {
            id: Uuid::parse_str(&row.get::<_, String>(0)?)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            is_active: row.get::<_, i64>(3)? != 0,
            is_admin: row.get::<_, i64>(4)? != 0,
            email: row.get(5)?,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    /// Get user by username
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, is_active, is_admin, email, created_at
             FROM users WHERE username = ?1",
        )?;

        let user_result = stmt.query_row(params![username], Self::row_to_user);

        match user_result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_user_by_id(&self, user_id: &Uuid) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, is_active, is_admin, email, created_at
             FROM users WHERE id = ?1",
        )?;

        let user_result = stmt.query_row(params![user_id.to_string()], Self::row_to_user);

        match user_result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify username and password. Inactive users never verify.
    pub fn verify_password(&self, username: &str, password: &str) -> Result<bool> {
        match self.get_user_by_username(username)? {
            Some(user) if user.is_active => {
                let valid =
                    verify(password, &user.password_hash).context("failed to verify password")?;
                Ok(valid)
            }
            _ => Ok(false),
        }
    }

    /// Create a new user
    pub fn create_user(&self, username: &str, password: &str, is_admin: bool) -> Result<User> {
        let password_hash = hash(password, DEFAULT_COST).context("failed to hash password")?;

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            is_active: true,
            is_admin,
            email: None,
            created_at: Utc::now(),
        };

        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO users (id, username, password_hash, is_active, is_admin, email, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id.to_string(),
                user.username,
                user.password_hash,
                user.is_active as i64,
                user.is_admin as i64,
                user.email,
                user.created_at.to_rfc3339(),
            ],
        )
        .context("failed to insert user")?;

        info!(username = %user.username, is_admin, "created user");

        Ok(user)
    }

    /// List all users (admin only)
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, is_active, is_admin, email, created_at FROM users",
        )?;

        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Delete a user by ID (admin only)
    pub fn delete_user(&self, user_id: &Uuid) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        let rows_affected = conn.execute(
            "DELETE FROM users WHERE id = ?1",
            params![user_id.to_string()],
        )?;

        if rows_affected == 0 {
            anyhow::bail!("user not found");
        }

        info!(user_id = %user_id, "deleted user");
        Ok(())
    }
}

fn generate_random_password(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (UserStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = UserStore::new(db_path).unwrap();
        (store, temp_file)
    }

    #[test]
    fn test_ensure_admin_generates_password_when_absent() {
        let (store, _temp) = create_test_store();

        let generated = store.ensure_admin("admin", None, None).unwrap();
        assert!(generated.is_some());
        let password = generated.unwrap();
        assert_eq!(password.len(), 16);

        let admin = store.get_user_by_username("admin").unwrap().unwrap();
        assert!(admin.is_admin);
        assert!(store.verify_password("admin", &password).unwrap());
    }

    #[test]
    fn test_ensure_admin_uses_supplied_password() {
        let (store, _temp) = create_test_store();

        let generated = store.ensure_admin("admin", Some("supersecret123"), None).unwrap();
        assert!(generated.is_none());
        assert!(store.verify_password("admin", "supersecret123").unwrap());
    }

    #[test]
    fn test_ensure_admin_is_idempotent() {
        let (store, _temp) = create_test_store();

        store.ensure_admin("admin", Some("first-password"), None).unwrap();
        let second = store.ensure_admin("admin2", Some("second-password"), None).unwrap();
        assert!(second.is_none());
        assert!(store.get_user_by_username("admin2").unwrap().is_none());
    }

    #[test]
    fn test_inactive_user_never_verifies() {
        let (store, _temp) = create_test_store();
        store.create_user("trader1", "password123", false).unwrap();

        let conn = Connection::open(&store.db_path).unwrap();
        conn.execute(
            "UPDATE users SET is_active = 0 WHERE username = 'trader1'",
            [],
        )
        .unwrap();

        assert!(!store.verify_password("trader1", "password123").unwrap());
    }

    #[test]
    fn test_create_and_retrieve_user() {
        let (store, _temp) = create_test_store();

        let trader = store.create_user("trader1", "password123", false).unwrap();
        assert_eq!(trader.username, "trader1");
        assert!(!trader.is_admin);

        let retrieved = store.get_user_by_username("trader1").unwrap();
        assert!(retrieved.is_some());

        let retrieved = retrieved.unwrap();
        assert_eq!(retrieved.username, "trader1");
        assert!(!retrieved.is_admin);
    }

    #[test]
    fn test_list_users() {
        let (store, _temp) = create_test_store();

        store.ensure_admin("admin", Some("password"), None).unwrap();
        store.create_user("trader1", "pass", false).unwrap();
        store.create_user("viewer1", "pass", false).unwrap();

        let users = store.list_users().unwrap();
        assert_eq!(users.len(), 3);
    }

    #[test]
    fn test_delete_user() {
        let (store, _temp) = create_test_store();

        let user = store.create_user("tempuser", "pass", false).unwrap();

        assert!(store.get_user_by_username("tempuser").unwrap().is_some());

        store.delete_user(&user.id).unwrap();

        assert!(store.get_user_by_username("tempuser").unwrap().is_none());
    }
}
