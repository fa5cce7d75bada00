//! SQLite-backed user table for the facial login service.
//!
//! Embeddings are stored as JSON arrays of 128 numbers in a TEXT column.
//! Every operation opens its own connection; there is no pooling and no
//! shared handle, which keeps the store `Clone` and thread-friendly.

use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::component::ServiceError;
use crate::instances::embedding::{self, EMBEDDING_DIM};

/// A row of the `users` table
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub id: i64,
    pub name: String,
    pub embedding: Vec<f32>,
    pub is_admin: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Handle on the user database
#[derive(Debug, Clone)]
pub struct UserStore {
    path: String,
}

impl UserStore {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }

    fn connect(&self) -> Result<Connection, ServiceError> {
        Ok(Connection::open(&self.path)?)
    }

    /// Create the schema and bootstrap the default admin record.
    ///
    /// The admin bootstrap inserts a sentinel user named `admin` with an
    /// all-zero embedding; first-time admin setup overwrites it later.
    pub fn init(&self) -> Result<(), ServiceError> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                embedding TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        let admin_exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE is_admin = 1 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        if admin_exists.is_none() {
            let sentinel = serde_json::to_string(&vec![0.0f32; EMBEDDING_DIM])?;
            conn.execute(
                "INSERT INTO users (name, embedding, is_admin, created_at) VALUES (?1, ?2, 1, ?3)",
                params!["admin", sentinel, Utc::now().to_rfc3339()],
            )?;
            info!("Default admin record created (awaiting first-time setup)");
        }

        Ok(())
    }

    /// Insert a new user. Returns `false` when the name is already taken
    /// or the embedding is too short to store.
    pub fn save_user(&self, name: &str, values: &[f32]) -> Result<bool, ServiceError> {
        if values.len() < EMBEDDING_DIM {
            warn!(
                "Rejecting user {}: embedding has {} of {} components",
                name,
                values.len(),
                EMBEDDING_DIM
            );
            return Ok(false);
        }

        let conn = self.connect()?;
        let existing: Option<i64> = conn
            .query_row("SELECT id FROM users WHERE name = ?1", params![name], |row| {
                row.get(0)
            })
            .optional()?;
        if existing.is_some() {
            return Ok(false);
        }

        let cleaned = embedding::sanitize(values);
        conn.execute(
            "INSERT INTO users (name, embedding, is_admin, created_at) VALUES (?1, ?2, 0, ?3)",
            params![name, serde_json::to_string(&cleaned)?, Utc::now().to_rfc3339()],
        )?;

        info!("User {} saved", name);
        Ok(true)
    }

    /// Look up a single user by name
    pub fn get_user(&self, name: &str) -> Result<Option<StoredUser>, ServiceError> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT id, name, embedding, is_admin, created_at FROM users WHERE name = ?1",
                params![name],
                map_user_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All users, oldest first
    pub fn all_users(&self) -> Result<Vec<StoredUser>, ServiceError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT id, name, embedding, is_admin, created_at FROM users ORDER BY id")?;
        let rows = stmt.query_map([], map_user_row)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub fn user_count(&self) -> Result<usize, ServiceError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Overwrite the embedding of an admin record. Returns `false` when no
    /// admin row with that name exists or the embedding is too short.
    pub fn update_admin_embedding(&self, name: &str, values: &[f32]) -> Result<bool, ServiceError> {
        if values.len() < EMBEDDING_DIM {
            warn!("Rejecting admin update: embedding has {} components", values.len());
            return Ok(false);
        }

        let cleaned = embedding::sanitize(values);
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE users SET embedding = ?1 WHERE name = ?2 AND is_admin = 1",
            params![serde_json::to_string(&cleaned)?, name],
        )?;

        if updated == 0 {
            warn!("Admin user {} not found", name);
            return Ok(false);
        }
        info!("Admin embedding updated for {}", name);
        Ok(true)
    }
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredUser> {
    let raw_embedding: String = row.get(2)?;
    // A malformed embedding column becomes an empty vector; the loader
    // upstream skips those rather than failing the whole query.
    let embedding: Vec<f32> = serde_json::from_str(&raw_embedding).unwrap_or_default();

    let raw_created: String = row.get(4)?;
    let created_at = DateTime::parse_from_rfc3339(&raw_created)
        .map(|t| t.with_timezone(&Utc))
        .ok();

    Ok(StoredUser {
        id: row.get(0)?,
        name: row.get(1)?,
        embedding,
        is_admin: row.get::<_, i64>(3)? != 0,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, UserStore) {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("users.db");
        let store = UserStore::new(path.to_str().expect("utf-8 path"));
        store.init().expect("init schema");
        (dir, store)
    }

    // Test the admin bootstrap row is created with the zero sentinel
    #[test]
    fn test_admin_bootstrap() {
        let (_dir, store) = temp_store();

        let admin = store.get_user("admin").unwrap().expect("admin row");
        assert!(admin.is_admin);
        assert_eq!(admin.embedding.len(), EMBEDDING_DIM);
        assert!(embedding::is_all_zero(&admin.embedding));

        // init is idempotent
        store.init().unwrap();
        assert_eq!(store.user_count().unwrap(), 1);
    }

    // Test saving a user and rejecting a duplicate name
    #[test]
    fn test_save_and_duplicate() {
        let (_dir, store) = temp_store();

        let vector = vec![0.5; EMBEDDING_DIM];
        assert!(store.save_user("ana", &vector).unwrap());
        assert!(!store.save_user("ana", &vector).unwrap());
        assert_eq!(store.user_count().unwrap(), 2);

        let ana = store.get_user("ana").unwrap().expect("ana row");
        assert!(ana.id > 0);
        assert!(!ana.is_admin);
        assert!(ana.created_at.is_some());
        assert_eq!(ana.embedding, vector);
    }

    // Test short embeddings are rejected and NaN components sanitized
    #[test]
    fn test_embedding_hygiene() {
        let (_dir, store) = temp_store();

        assert!(!store.save_user("short", &[0.5; 10]).unwrap());

        let mut vector = vec![0.5; EMBEDDING_DIM];
        vector[7] = f32::NAN;
        assert!(store.save_user("noisy", &vector).unwrap());

        let noisy = store.get_user("noisy").unwrap().expect("noisy row");
        assert_eq!(noisy.embedding[7], 0.0);
        assert_eq!(noisy.embedding[8], 0.5);
    }

    // Test admin embedding updates only touch admin rows
    #[test]
    fn test_update_admin_embedding() {
        let (_dir, store) = temp_store();
        store.save_user("ana", &vec![0.5; EMBEDDING_DIM]).unwrap();

        let configured = vec![0.25; EMBEDDING_DIM];
        assert!(store.update_admin_embedding("admin", &configured).unwrap());
        assert!(!store.update_admin_embedding("ana", &configured).unwrap());

        let admin = store.get_user("admin").unwrap().expect("admin row");
        assert!(!embedding::is_all_zero(&admin.embedding));
    }
}
