use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use syntra_db::models::{PhotoRow, ReportRow};
use syntra_db::{Database, parse_timestamp, timestamp};
use syntra_storage::{BlobStore, report_folder_key, report_photo_key};
use syntra_types::models::{Report, ReportPhoto, ReportStats, ReportStatus, Role};

use crate::error::{ApiError, ApiResult};

/// Photo records are removed in pages of this size when a report goes.
pub const PHOTO_DELETE_PAGE: usize = 500;

/// 10 MB per photo
pub const MAX_PHOTO_SIZE: usize = 10 * 1024 * 1024;

const RECENT_WINDOW_HOURS: i64 = 24;

/// A report submission, before it has an id.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub reporter_id: Uuid,
    pub role: Role,
    pub address: String,
    pub description: String,
    pub status_label: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Reports and their photos: rows in SQLite, image bytes in the blob store.
pub struct ReportStore {
    db: Arc<Database>,
    blobs: Arc<BlobStore>,
    public_url: String,
}

impl ReportStore {
    pub fn new(db: Arc<Database>, blobs: Arc<BlobStore>, public_url: impl Into<String>) -> Self {
        Self {
            db,
            blobs,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Run a query off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
    }

    /// Directory served under `/blobs`.
    pub fn blob_root(&self) -> &Path {
        self.blobs.root()
    }

    pub fn photo_url(&self, key: &str) -> String {
        format!("{}/blobs/{}", self.public_url, key)
    }

    pub async fn create(&self, new: NewReport) -> ApiResult<Report> {
        let address = new.address.trim();
        let description = new.description.trim();
        if address.is_empty() {
            return Err(ApiError::validation("La dirección es obligatoria"));
        }
        if description.is_empty() {
            return Err(ApiError::validation("La descripción es obligatoria"));
        }

        // Coordinates only count as a pair
        let (lat, lng) = match (new.lat, new.lng) {
            (Some(lat), Some(lng)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                    return Err(ApiError::validation("Coordenadas fuera de rango"));
                }
                (Some(lat), Some(lng))
            }
            _ => (None, None),
        };

        let status = ReportStatus::from_ui_label(&new.status_label);
        let id = Uuid::new_v4();
        let now = timestamp(Utc::now());
        let row = ReportRow {
            id: id.to_string(),
            reporter_id: new.reporter_id.to_string(),
            role: new.role.as_str().to_string(),
            status: status.as_str().to_string(),
            address: address.to_string(),
            description: description.to_string(),
            lat,
            lng,
            photo_urls: Vec::new(),
            photo_count: 0,
            created_at: now.clone(),
            updated_at: now,
        };

        let report = to_report(row.clone());
        self.blocking(move |db| db.insert_report(&row)).await?;
        info!("Report {} created by {} ({})", id, new.reporter_id, status.as_str());
        Ok(report)
    }

    /// Create, then upload the photos one at a time. A photo failure does
    /// not fail the call; the report comes back with whatever did upload.
    pub async fn create_with_photos(
        &self,
        new: NewReport,
        photos: Vec<Vec<u8>>,
    ) -> ApiResult<Report> {
        let uploader = new.reporter_id;
        let report = self.create(new).await?;
        if photos.is_empty() {
            return Ok(report);
        }

        if let Err(e) = self.attach_photos(report.id, uploader, photos).await {
            warn!("Report {} created but photo upload failed: {}", report.id, e);
        }
        self.get(report.id).await
    }

    /// Upload photos sequentially. Stops at the first failure and returns
    /// it; photos uploaded before that stay attached.
    pub async fn attach_photos(
        &self,
        report_id: Uuid,
        uploader: Uuid,
        photos: Vec<Vec<u8>>,
    ) -> ApiResult<Vec<String>> {
        let mut urls = Vec::with_capacity(photos.len());
        for photo in photos {
            urls.push(self.upload_photo(report_id, uploader, photo).await?);
        }
        Ok(urls)
    }

    pub async fn upload_photo(
        &self,
        report_id: Uuid,
        uploader: Uuid,
        bytes: Vec<u8>,
    ) -> ApiResult<String> {
        if bytes.is_empty() {
            return Err(ApiError::validation("La foto está vacía"));
        }
        if bytes.len() > MAX_PHOTO_SIZE {
            return Err(ApiError::validation("La foto supera el tamaño máximo"));
        }

        let rid = report_id.to_string();
        let exists = {
            let rid = rid.clone();
            self.blocking(move |db| db.get_report(&rid)).await?.is_some()
        };
        if !exists {
            return Err(ApiError::not_found(format!("report {}", report_id)));
        }

        let now = Utc::now();
        let photo_id = Uuid::new_v4();
        let file_name = format!("photo_{}_{}.jpg", now.timestamp_millis(), photo_id);
        let key = report_photo_key(&rid, &file_name);
        let sha256 = self.blobs.put(&key, &bytes).await?;
        let url = self.photo_url(&key);

        let row = PhotoRow {
            id: photo_id.to_string(),
            report_id: rid,
            url: url.clone(),
            storage_path: key.clone(),
            sha256,
            uploader_id: uploader.to_string(),
            uploaded_at: timestamp(now),
        };
        let attached = self.blocking(move |db| db.append_report_photo(&row)).await?;
        if !attached {
            // Report vanished between the check and the write
            if let Err(e) = self.blobs.delete(&key).await {
                warn!("Could not remove orphaned photo {}: {}", key, e);
            }
            return Err(ApiError::not_found(format!("report {}", report_id)));
        }

        debug!("Photo {} attached to report {} ({} bytes)", photo_id, report_id, bytes.len());
        Ok(url)
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<Report> {
        let rid = id.to_string();
        self.blocking(move |db| db.get_report(&rid))
            .await?
            .map(to_report)
            .ok_or_else(|| ApiError::not_found(format!("report {}", id)))
    }

    /// Photo records of a report, oldest upload first.
    pub async fn photos(&self, report_id: Uuid) -> ApiResult<Vec<ReportPhoto>> {
        self.get(report_id).await?;
        let rid = report_id.to_string();
        let rows = self.blocking(move |db| db.get_report_photos(&rid)).await?;
        Ok(rows
            .into_iter()
            .map(|row| ReportPhoto {
                id: parse_uuid(&row.id, "photo id", &row.report_id),
                report_id,
                uploader_id: parse_uuid(&row.uploader_id, "uploader_id", &row.report_id),
                url: row.url,
                sha256: row.sha256,
                uploaded_at: parse_timestamp(&row.uploaded_at),
            })
            .collect())
    }

    /// Reports submitted by one user, most recently updated first.
    pub async fn list_mine(&self, reporter_id: Uuid) -> ApiResult<Vec<Report>> {
        let rid = reporter_id.to_string();
        let rows = self.blocking(move |db| db.get_reports_by_reporter(&rid)).await?;
        Ok(rows.into_iter().map(to_report).collect())
    }

    /// Reports updated within the last 24 hours, newest first.
    pub async fn list_recent(&self) -> ApiResult<Vec<Report>> {
        self.list_recent_at(Utc::now()).await
    }

    pub async fn list_recent_at(&self, now: DateTime<Utc>) -> ApiResult<Vec<Report>> {
        let since = timestamp(now - Duration::hours(RECENT_WINDOW_HOURS));
        let rows = self.blocking(move |db| db.get_reports_updated_since(&since)).await?;
        Ok(rows.into_iter().map(to_report).collect())
    }

    /// Open issues that can be placed on the map.
    pub async fn list_active_map(&self) -> ApiResult<Vec<Report>> {
        let active: Vec<&'static str> = ReportStatus::ALL
            .into_iter()
            .filter(|s| s.is_active())
            .map(|s| s.as_str())
            .collect();
        let rows = self
            .blocking(move |db| db.get_reports_with_status(&active))
            .await?;
        Ok(rows
            .into_iter()
            .filter(|r| r.lat.is_some() && r.lng.is_some())
            .map(to_report)
            .collect())
    }

    /// Set a report's status from a client label. Last writer wins.
    pub async fn update_status(&self, id: Uuid, label: &str) -> ApiResult<Report> {
        let status = ReportStatus::from_ui_label(label);
        let rid = id.to_string();
        let updated_at = timestamp(Utc::now());
        let changed = self
            .blocking(move |db| db.update_report_status(&rid, status.as_str(), &updated_at))
            .await?;
        if !changed {
            return Err(ApiError::not_found(format!("report {}", id)));
        }
        info!("Report {} status -> {}", id, status.as_str());
        self.get(id).await
    }

    /// Remove a report: its blob folder (best effort), its photo records in
    /// pages, then the record itself. Returns the deleted report.
    pub async fn delete(&self, id: Uuid) -> ApiResult<Report> {
        let report = self.get(id).await?;
        let rid = id.to_string();

        let folder = report_folder_key(&rid);
        let removed = self.blobs.delete_prefix(&folder).await;
        debug!("Removed {} blobs of report {}", removed, id);
        match self.blobs.list(&folder).await {
            Ok(left) if !left.is_empty() => {
                warn!("{} blobs of report {} could not be removed", left.len(), id)
            }
            Ok(_) => {}
            Err(e) => warn!("Could not check blob folder of report {}: {}", id, e),
        }

        loop {
            let page_rid = rid.clone();
            let deleted = self
                .blocking(move |db| db.delete_report_photos_page(&page_rid, PHOTO_DELETE_PAGE))
                .await?;
            if deleted == 0 {
                break;
            }
            debug!("Deleted {} photo records of report {}", deleted, id);
        }

        self.blocking(move |db| db.delete_report(&rid)).await?;
        info!("Report {} deleted", id);
        Ok(report)
    }

    pub async fn stats(&self) -> ApiResult<ReportStats> {
        self.stats_at(Utc::now()).await
    }

    pub async fn stats_at(&self, now: DateTime<Utc>) -> ApiResult<ReportStats> {
        let since = timestamp(semester_start(now));
        self.blocking(move |db| {
            let fixed = db.count_reports_with_status(ReportStatus::Operational.as_str())?;
            let inspection = db.count_reports_with_status(ReportStatus::UnderInspection.as_str())?;
            let urgent = db.count_reports_with_status(ReportStatus::CriticalFailure.as_str())?;
            let solved = db
                .count_reports_with_status_since(ReportStatus::Operational.as_str(), &since)?;
            Ok(ReportStats::new(fixed, inspection, urgent, solved))
        })
        .await
    }
}

/// Start of the current semester: 1 January, or 1 July from July on.
pub fn semester_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let month = if now.month() <= 6 { 1 } else { 7 };
    Utc.with_ymd_and_hms(now.year(), month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

fn parse_uuid(value: &str, what: &str, report_id: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on report '{}': {}", what, value, report_id, e);
        Uuid::default()
    })
}

pub(crate) fn to_report(row: ReportRow) -> Report {
    let status = ReportStatus::from_stored(&row.status);
    let role = Role::parse(&row.role).unwrap_or_else(|| {
        warn!("Unknown role '{}' on report '{}'", row.role, row.id);
        Role::Citizen
    });
    Report {
        id: parse_uuid(&row.id, "id", &row.id),
        reporter_id: parse_uuid(&row.reporter_id, "reporter_id", &row.id),
        role,
        status,
        status_label: status.ui_label().to_string(),
        address: row.address,
        description: row.description,
        lat: row.lat,
        lng: row.lng,
        photo_count: row.photo_urls.len() as u32,
        photo_urls: row.photo_urls,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}
