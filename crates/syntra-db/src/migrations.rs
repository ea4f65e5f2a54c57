use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id            TEXT PRIMARY KEY,
                email         TEXT NOT NULL UNIQUE,
                username      TEXT NOT NULL,
                password      TEXT NOT NULL,
                role          TEXT NOT NULL,
                device_token  TEXT,
                created_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE agent_profiles (
                user_id     TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                document    TEXT NOT NULL,
                plate       TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE reports (
                id           TEXT PRIMARY KEY,
                reporter_id  TEXT NOT NULL,
                role         TEXT NOT NULL,
                status       TEXT NOT NULL,
                address      TEXT NOT NULL,
                description  TEXT NOT NULL,
                lat          REAL,
                lng          REAL,
                photo_urls   TEXT NOT NULL DEFAULT '[]',
                photo_count  INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );

            CREATE INDEX idx_reports_reporter ON reports(reporter_id, updated_at);
            CREATE INDEX idx_reports_updated ON reports(updated_at);
            CREATE INDEX idx_reports_status ON reports(status);

            -- No FK to reports: photo rows are removed page by page before
            -- the report itself.
            CREATE TABLE report_photos (
                id            TEXT PRIMARY KEY,
                report_id     TEXT NOT NULL,
                url           TEXT NOT NULL,
                storage_path  TEXT NOT NULL,
                sha256        TEXT NOT NULL,
                uploader_id   TEXT NOT NULL,
                uploaded_at   TEXT NOT NULL
            );

            CREATE INDEX idx_report_photos_report ON report_photos(report_id);

            CREATE TABLE feedback (
                id           TEXT PRIMARY KEY,
                author_id    TEXT NOT NULL,
                author_name  TEXT NOT NULL,
                message      TEXT NOT NULL,
                created_at   TEXT NOT NULL
            );

            CREATE INDEX idx_feedback_created ON feedback(created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
