// User accounts

use anyhow::anyhow;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, uuid, name, email, password, created_at";

#[derive(Error, Debug)]
pub enum UserError {
    #[error("User '{0}' already exists")]
    AlreadyExists(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

/// A user about to be inserted
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uuid: String,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string
    pub password: String,
    pub created_at: DateTime<Utc>,
}

impl NewUser {
    /// Build a new user, hashing the password
    pub fn new(name: &str, email: &str, password: &str) -> anyhow::Result<Self> {
        Ok(Self {
            uuid: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            password: hash_password(password)?,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn verify_password(&self, password: &str) -> bool {
        match PasswordHash::new(&self.password) {
            Ok(hash) => Argon2::default()
                .verify_password(password.as_bytes(), &hash)
                .is_ok(),
            Err(e) => {
                tracing::warn!(user = %self.uuid, "Stored password hash is unreadable: {}", e);
                false
            }
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let created_at: String = row.get(5)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?
            .with_timezone(&Utc);

        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            password: row.get(4)?,
            created_at,
        })
    }
}

/// Hash a password with Argon2id and a random salt
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| anyhow!("Failed to encode password salt: {}", e))?;

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?;

    Ok(hash.to_string())
}

fn get_by(conn: &Connection, column: &str, value: &str) -> rusqlite::Result<Option<User>> {
    let sql = format!(
        "SELECT {} FROM users WHERE {} = ? LIMIT 1",
        USER_COLUMNS, column
    );
    conn.query_row(&sql, [value], User::from_row).optional()
}

pub fn get_by_uuid(conn: &Connection, uuid: &str) -> rusqlite::Result<Option<User>> {
    get_by(conn, "uuid", uuid)
}

pub fn get_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<User>> {
    get_by(conn, "name", name)
}

pub fn get_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    get_by(conn, "email", email)
}

/// Insert a user. Names and emails are unique.
pub fn create(conn: &Connection, new_user: &NewUser) -> Result<User, UserError> {
    if get_by_name(conn, &new_user.name)?.is_some() {
        return Err(UserError::AlreadyExists(new_user.name.clone()));
    }

    if get_by_email(conn, &new_user.email)?.is_some() {
        return Err(UserError::AlreadyExists(new_user.email.clone()));
    }

    conn.execute(
        "INSERT INTO users (uuid, name, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            new_user.uuid,
            new_user.name,
            new_user.email,
            new_user.password,
            new_user.created_at.to_rfc3339(),
        ],
    )?;

    Ok(User {
        id: conn.last_insert_rowid(),
        uuid: new_user.uuid.clone(),
        name: new_user.name.clone(),
        email: new_user.email.clone(),
        password: new_user.password.clone(),
        created_at: new_user.created_at,
    })
}
