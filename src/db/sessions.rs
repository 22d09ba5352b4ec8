// Refresh-token sessions

use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub refresh_token: String,
}

pub fn get_by_token(
    conn: &Connection,
    user_id: i64,
    token: &str,
) -> rusqlite::Result<Option<Session>> {
    conn.query_row(
        "SELECT id, user_id, refresh_token FROM sessions \
         WHERE user_id = ?1 AND refresh_token = ?2 LIMIT 1",
        params![user_id, token],
        |row| {
            Ok(Session {
                id: row.get(0)?,
                user_id: row.get(1)?,
                refresh_token: row.get(2)?,
            })
        },
    )
    .optional()
}

pub fn create(conn: &Connection, user_id: i64, refresh_token: &str) -> rusqlite::Result<Session> {
    conn.execute(
        "INSERT INTO sessions (user_id, refresh_token) VALUES (?1, ?2)",
        params![user_id, refresh_token],
    )?;

    Ok(Session {
        id: conn.last_insert_rowid(),
        user_id,
        refresh_token: refresh_token.to_string(),
    })
}

pub fn delete(conn: &Connection, session: &Session) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM sessions WHERE id = ?1", [session.id])?;
    Ok(())
}

/// Replace `session` with a new one holding `refresh_token`, atomically
pub fn rotate(
    conn: &Connection,
    session: &Session,
    refresh_token: &str,
) -> rusqlite::Result<Session> {
    let tx = conn.unchecked_transaction()?;
    delete(&tx, session)?;
    let replacement = create(&tx, session.user_id, refresh_token)?;
    tx.commit()?;
    Ok(replacement)
}
