use rusqlite::{Connection, Result};

/// Initialize the complete database schema for the survey store
pub fn init_schema(conn: &Connection) -> Result<()> {
    // Schema version table for future migrations
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;

    if current_version < 1 {
        create_schema(conn)?;
        conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
        log::info!("Created database schema version 1");
    }

    Ok(())
}

/// Create the complete schema (version 1)
///
/// Ids are UUID text. Parent links are plain columns, referential integrity is
/// checked by the services.
fn create_schema(conn: &Connection) -> Result<()> {
    // Table: projects
    conn.execute(
        "CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            cover_photo_path TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // Table: vehicles
    conn.execute(
        "CREATE TABLE IF NOT EXISTS vehicles (
            id TEXT PRIMARY KEY NOT NULL,
            project_id TEXT NOT NULL,
            name TEXT NOT NULL,
            plate_number TEXT NOT NULL DEFAULT '',
            brand TEXT NOT NULL DEFAULT '',
            model TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_vehicles_project ON vehicles(project_id)",
        [],
    )?;

    // Table: tracks
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tracks (
            id TEXT PRIMARY KEY NOT NULL,
            vehicle_id TEXT NOT NULL,
            name TEXT NOT NULL,
            length REAL NOT NULL DEFAULT 0 CHECK(length >= 0),
            created_at TEXT NOT NULL,
            start_time TEXT,
            end_time TEXT,
            is_started INTEGER NOT NULL DEFAULT 0 CHECK(is_started IN (0,1)),
            is_ended INTEGER NOT NULL DEFAULT 0 CHECK(is_ended IN (0,1)),
            start_point_photo_count INTEGER NOT NULL DEFAULT 0 CHECK(start_point_photo_count >= 0),
            middle_point_photo_count INTEGER NOT NULL DEFAULT 0 CHECK(middle_point_photo_count >= 0),
            model_point_photo_count INTEGER NOT NULL DEFAULT 0 CHECK(model_point_photo_count >= 0),
            end_point_photo_count INTEGER NOT NULL DEFAULT 0 CHECK(end_point_photo_count >= 0),
            CHECK(is_ended = 0 OR is_started = 1),
            CHECK(end_time IS NULL OR (is_ended = 1 AND end_time >= start_time))
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tracks_vehicle ON tracks(vehicle_id)",
        [],
    )?;

    // Table: track_points
    conn.execute(
        "CREATE TABLE IF NOT EXISTS track_points (
            id TEXT PRIMARY KEY NOT NULL,
            track_id TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            altitude REAL,
            sequence INTEGER NOT NULL CHECK(sequence >= 0),
            timestamp TEXT NOT NULL,
            point_type TEXT CHECK(point_type IN ('START', 'MIDDLE', 'MODEL', 'END')) NOT NULL,
            UNIQUE(track_id, sequence)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_track_points_single_start
         ON track_points(track_id) WHERE point_type = 'START'",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_track_points_single_end
         ON track_points(track_id) WHERE point_type = 'END'",
        [],
    )?;

    // Table: photos
    conn.execute(
        "CREATE TABLE IF NOT EXISTS photos (
            id TEXT PRIMARY KEY NOT NULL,
            entity_id TEXT NOT NULL,
            entity_type TEXT CHECK(entity_type IN ('PROJECT', 'VEHICLE', 'TRACK_POINT')) NOT NULL,
            photo_type TEXT NOT NULL,
            path TEXT NOT NULL UNIQUE,
            file_name TEXT NOT NULL,
            sequence INTEGER NOT NULL CHECK(sequence >= 0),
            timestamp TEXT NOT NULL,
            latitude REAL,
            longitude REAL,
            is_uploaded INTEGER NOT NULL DEFAULT 0 CHECK(is_uploaded IN (0,1)),
            upload_status TEXT CHECK(upload_status IN ('PENDING', 'UPLOADED', 'ABANDONED')) NOT NULL DEFAULT 'PENDING',
            upload_attempts INTEGER NOT NULL DEFAULT 0 CHECK(upload_attempts >= 0),
            last_error TEXT,
            next_attempt_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_photos_sequence
         ON photos(entity_id, entity_type, photo_type, sequence)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_photos_pending
         ON photos(upload_status, next_attempt_at)",
        [],
    )?;

    // Uploaded is final
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS photos_uploaded_is_final
         BEFORE UPDATE OF is_uploaded ON photos
         WHEN OLD.is_uploaded = 1 AND NEW.is_uploaded = 0
         BEGIN
            SELECT RAISE(ABORT, 'is_uploaded cannot be reset');
         END",
        [],
    )?;

    // Table: sync_settings (upload server settings)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_url TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1 CHECK(enabled IN (0,1)),
            last_sync TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Trigger for updated_at in sync_settings
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS update_sync_settings_timestamp
         AFTER UPDATE ON sync_settings
         BEGIN
            UPDATE sync_settings SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
         END",
        [],
    )?;

    Ok(())
}
