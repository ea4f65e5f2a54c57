use crate::Database;
use crate::models::{AgentProfileRow, FeedbackRow, PhotoRow, ReportRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row};
use tracing::warn;

const REPORT_COLUMNS: &str = "id, reporter_id, role, status, address, description, lat, lng, \
     photo_urls, photo_count, created_at, updated_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &UserRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            insert_user(conn, user)?;
            Ok(())
        })
    }

    /// Create an agent account together with its profile, atomically.
    pub fn create_agent(&self, user: &UserRow, document: &str, plate: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            insert_user(&tx, user)?;
            tx.execute(
                "INSERT INTO agent_profiles (user_id, document, plate) VALUES (?1, ?2, ?3)",
                (&user.id, document, plate),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_agent_profile(&self, user_id: &str) -> Result<Option<AgentProfileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, document, plate FROM agent_profiles WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(AgentProfileRow {
                        user_id: row.get(0)?,
                        document: row.get(1)?,
                        plate: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn update_user_profile(&self, id: &str, username: &str, email: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET username = ?1, email = ?2 WHERE id = ?3",
                (username, email, id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn update_password(&self, id: &str, password_hash: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password = ?1 WHERE id = ?2",
                (password_hash, id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_device_token(&self, id: &str, token: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET device_token = ?1 WHERE id = ?2",
                (token, id),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Reports --

    pub fn insert_report(&self, report: &ReportRow) -> Result<()> {
        let urls = serde_json::to_string(&report.photo_urls)?;
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO reports (id, reporter_id, role, status, address, description, lat, lng,
                                      photo_urls, photo_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    report.id,
                    report.reporter_id,
                    report.role,
                    report.status,
                    report.address,
                    report.description,
                    report.lat,
                    report.lng,
                    urls,
                    report.photo_count,
                    report.created_at,
                    report.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_report(&self, id: &str) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1");
            conn.query_row(&sql, [id], map_report).optional()
        })
    }

    /// Record an uploaded photo and add its URL to the report.
    /// Returns false when the report does not exist.
    pub fn append_report_photo(&self, photo: &PhotoRow) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT photo_urls FROM reports WHERE id = ?1",
                    [&photo.report_id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(existing) = existing else {
                return Ok(false);
            };

            let mut urls = decode_urls(&photo.report_id, &existing);
            if !urls.contains(&photo.url) {
                urls.push(photo.url.clone());
            }

            tx.execute(
                "INSERT INTO report_photos (id, report_id, url, storage_path, sha256, uploader_id, uploaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    photo.id,
                    photo.report_id,
                    photo.url,
                    photo.storage_path,
                    photo.sha256,
                    photo.uploader_id,
                    photo.uploaded_at,
                ],
            )?;

            tx.execute(
                "UPDATE reports SET photo_urls = ?1, photo_count = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![
                    serde_json::to_string(&urls)?,
                    urls.len() as i64,
                    photo.uploaded_at,
                    photo.report_id,
                ],
            )?;

            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_report_photos(&self, report_id: &str) -> Result<Vec<PhotoRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, report_id, url, storage_path, sha256, uploader_id, uploaded_at
                 FROM report_photos WHERE report_id = ?1 ORDER BY uploaded_at",
            )?;
            let rows = stmt
                .query_map([report_id], |row| {
                    Ok(PhotoRow {
                        id: row.get(0)?,
                        report_id: row.get(1)?,
                        url: row.get(2)?,
                        storage_path: row.get(3)?,
                        sha256: row.get(4)?,
                        uploader_id: row.get(5)?,
                        uploaded_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_reports_by_reporter(&self, reporter_id: &str) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REPORT_COLUMNS} FROM reports WHERE reporter_id = ?1
                 ORDER BY updated_at DESC, created_at DESC"
            );
            query_reports(conn, &sql, [reporter_id])
        })
    }

    /// Reports touched strictly after `since`, newest first.
    pub fn get_reports_updated_since(&self, since: &str) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REPORT_COLUMNS} FROM reports WHERE updated_at > ?1
                 ORDER BY updated_at DESC"
            );
            query_reports(conn, &sql, [since])
        })
    }

    pub fn get_reports_with_status(&self, statuses: &[&str]) -> Result<Vec<ReportRow>> {
        if statuses.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=statuses.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {REPORT_COLUMNS} FROM reports WHERE status IN ({})
                 ORDER BY updated_at DESC",
                placeholders.join(", ")
            );
            query_reports(conn, &sql, rusqlite::params_from_iter(statuses.iter()))
        })
    }

    pub fn update_report_status(&self, id: &str, status: &str, updated_at: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE reports SET status = ?1, updated_at = ?2 WHERE id = ?3",
                (status, updated_at, id),
            )?;
            Ok(changed > 0)
        })
    }

    /// Delete up to `page_size` photo rows of a report. Returns how many went.
    pub fn delete_report_photos_page(&self, report_id: &str, page_size: usize) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM report_photos WHERE id IN
                    (SELECT id FROM report_photos WHERE report_id = ?1 LIMIT ?2)",
                rusqlite::params![report_id, page_size as i64],
            )?;
            Ok(deleted)
        })
    }

    pub fn delete_report(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM reports WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    pub fn count_reports_with_status(&self, status: &str) -> Result<u32> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM reports WHERE status = ?1",
                [status],
                |row| row.get(0),
            )?;
            Ok(count as u32)
        })
    }

    pub fn count_reports_with_status_since(&self, status: &str, since: &str) -> Result<u32> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM reports WHERE updated_at > ?1 AND status = ?2",
                (since, status),
                |row| row.get(0),
            )?;
            Ok(count as u32)
        })
    }

    // -- Feedback --

    pub fn insert_feedback(&self, feedback: &FeedbackRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO feedback (id, author_id, author_name, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    &feedback.id,
                    &feedback.author_id,
                    &feedback.author_name,
                    &feedback.message,
                    &feedback.created_at,
                ),
            )?;
            Ok(())
        })
    }

    pub fn get_feedback(&self, id: &str) -> Result<Option<FeedbackRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, author_id, author_name, message, created_at FROM feedback WHERE id = ?1",
                [id],
                map_feedback,
            )
            .optional()
        })
    }

    pub fn list_feedback(&self, limit: u32) -> Result<Vec<FeedbackRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, author_id, author_name, message, created_at
                 FROM feedback ORDER BY created_at DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], map_feedback)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_feedback(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM feedback WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }
}

fn insert_user(conn: &Connection, user: &UserRow) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, email, username, password, role, device_token, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            user.id,
            user.email,
            user.username,
            user.password,
            user.role,
            user.device_token,
            user.created_at,
        ],
    )?;
    Ok(())
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, username, password, role, device_token, created_at
         FROM users WHERE {column} = ?1"
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                username: row.get(2)?,
                password: row.get(3)?,
                role: row.get(4)?,
                device_token: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_reports<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<ReportRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_report)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_report(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    let id: String = row.get(0)?;
    let urls: String = row.get(8)?;
    let photo_urls = decode_urls(&id, &urls);
    Ok(ReportRow {
        id,
        reporter_id: row.get(1)?,
        role: row.get(2)?,
        status: row.get(3)?,
        address: row.get(4)?,
        description: row.get(5)?,
        lat: row.get(6)?,
        lng: row.get(7)?,
        photo_urls,
        photo_count: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn map_feedback(row: &Row<'_>) -> rusqlite::Result<FeedbackRow> {
    Ok(FeedbackRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_name: row.get(2)?,
        message: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn decode_urls(report_id: &str, raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Corrupt photo_urls on report '{}': {}", report_id, e);
        Vec::new()
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
