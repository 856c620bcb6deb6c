use crate::error::AppError;
use crate::models::SyncSettings;
use rusqlite::{Connection, OptionalExtension};

/// Loads the upload server settings from the database
pub fn load_sync_settings(conn: &Connection) -> Result<Option<SyncSettings>, AppError> {
    let settings = conn
        .query_row(
            "SELECT id, server_url, enabled, last_sync, created_at, updated_at
             FROM sync_settings
             ORDER BY id DESC
             LIMIT 1",
            [],
            |row| {
                Ok(SyncSettings {
                    id: row.get(0)?,
                    server_url: row.get(1)?,
                    enabled: row.get(2)?,
                    last_sync: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()?;

    Ok(settings)
}

/// Saves or updates the upload server settings
pub fn save_sync_settings(conn: &Connection, settings: &SyncSettings) -> Result<i64, AppError> {
    if settings.server_url.trim().is_empty() {
        return Err(AppError::Validation("Server URL must not be empty".to_string()));
    }

    if let Some(existing) = load_sync_settings(conn)? {
        conn.execute(
            "UPDATE sync_settings SET server_url = ?1, enabled = ?2 WHERE id = ?3",
            (&settings.server_url, settings.enabled, existing.id),
        )?;
        Ok(existing.id)
    } else {
        conn.execute(
            "INSERT INTO sync_settings (server_url, enabled) VALUES (?1, ?2)",
            (&settings.server_url, settings.enabled),
        )?;
        Ok(conn.last_insert_rowid())
    }
}

/// Updates the timestamp of the last synchronization
pub fn update_last_sync(conn: &Connection) -> Result<(), AppError> {
    conn.execute(
        "UPDATE sync_settings SET last_sync = CURRENT_TIMESTAMP WHERE id = (SELECT MAX(id) FROM sync_settings)",
        [],
    )?;
    Ok(())
}

/// Enables or disables synchronization
pub fn set_sync_enabled(conn: &Connection, enabled: bool) -> Result<(), AppError> {
    conn.execute(
        "UPDATE sync_settings SET enabled = ?1 WHERE id = (SELECT MAX(id) FROM sync_settings)",
        [enabled],
    )?;
    Ok(())
}

/// Server the upload client talks to. A stored URL wins over `fallback`.
pub fn upload_server_url(conn: &Connection, fallback: &str) -> Result<String, AppError> {
    Ok(load_sync_settings(conn)?
        .map(|settings| settings.server_url)
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string()))
}

/// Pauses or resumes uploads, storing `default_url` if no settings exist yet
pub fn switch_sync(
    conn: &Connection,
    enabled: bool,
    default_url: &str,
) -> Result<SyncSettings, AppError> {
    if load_sync_settings(conn)?.is_some() {
        set_sync_enabled(conn, enabled)?;
    } else {
        let mut settings = SyncSettings::new(default_url.to_string());
        settings.enabled = enabled;
        save_sync_settings(conn, &settings)?;
    }
    load_sync_settings(conn)?
        .ok_or_else(|| AppError::NotFound("Sync settings".to_string()))
}

/// Deletes all synchronization settings
pub fn delete_sync_settings(conn: &Connection) -> Result<(), AppError> {
    conn.execute("DELETE FROM sync_settings", [])?;
    Ok(())
}
