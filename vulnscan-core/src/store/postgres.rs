use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::{debug, info};
use vulnscan_model::{
    Finding, FindingId, ImageId, NewFinding, ScanId, ScanRecord, ScanStatus,
    ScanSummary, StatusTransition,
};

use super::{ScanStore, reject_unexpected_results};
use crate::{
    MIGRATOR,
    error::{Result, ScanError},
};

const SCAN_COLUMNS: &str = r#"
    s.id, s.image_id, i.name AS image_name, i.tag AS image_tag,
    s.status, s.scan_date, s.results
"#;

#[derive(Clone, Debug)]
pub struct PostgresScanStore {
    pool: PgPool,
}

impl PostgresScanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_scan(row: &PgRow) -> Result<ScanRecord> {
        let status: String = row.try_get("status")?;
        Ok(ScanRecord {
            id: ScanId(row.try_get("id")?),
            image_id: ImageId(row.try_get("image_id")?),
            image_name: row.try_get("image_name")?,
            image_tag: row.try_get("image_tag")?,
            status: status.parse()?,
            scan_date: row.try_get("scan_date")?,
            results: row.try_get("results")?,
        })
    }

    fn map_finding(row: &PgRow) -> Result<Finding> {
        Ok(Finding {
            id: FindingId(row.try_get("id")?),
            scan_id: ScanId(row.try_get("scan_id")?),
            package_name: row.try_get("package_name")?,
            severity: row.try_get("severity")?,
            description: row.try_get("description")?,
            fixed_version: row.try_get("fixed_version")?,
        })
    }

    /// Lock the scan row and check it is in `expected`.
    async fn lock_in_status(
        tx: &mut Transaction<'_, Postgres>,
        scan_id: ScanId,
        expected: ScanStatus,
    ) -> Result<()> {
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM scans WHERE id = $1 FOR UPDATE",
        )
        .bind(scan_id.get())
        .fetch_optional(&mut **tx)
        .await?;

        let actual: ScanStatus = status.ok_or(ScanError::NotFound(scan_id))?.parse()?;
        if actual != expected {
            return Err(ScanError::StatusConflict {
                scan_id,
                expected,
                actual,
            });
        }
        Ok(())
    }

    async fn insert_finding_in(
        tx: &mut Transaction<'_, Postgres>,
        scan_id: ScanId,
        finding: &NewFinding,
    ) -> Result<FindingId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO vulnerabilities
                (scan_id, package_name, severity, description, fixed_version)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(scan_id.get())
        .bind(&finding.package_name)
        .bind(&finding.severity)
        .bind(&finding.description)
        .bind(&finding.fixed_version)
        .fetch_one(&mut **tx)
        .await?;
        Ok(FindingId(id))
    }

    /// Explain why a guarded write touched no rows.
    async fn conflict_for(
        &self,
        scan_id: ScanId,
        expected: ScanStatus,
    ) -> ScanError {
        let current: std::result::Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM scans WHERE id = $1")
                .bind(scan_id.get())
                .fetch_optional(self.pool())
                .await;

        match current {
            Ok(None) => ScanError::NotFound(scan_id),
            Ok(Some(raw)) => match raw.parse::<ScanStatus>() {
                Ok(actual) => ScanError::StatusConflict {
                    scan_id,
                    expected,
                    actual,
                },
                Err(err) => err.into(),
            },
            Err(err) => err.into(),
        }
    }
}

#[async_trait]
impl ScanStore for PostgresScanStore {
    async fn ensure_schema(&self) -> Result<()> {
        MIGRATOR.run(self.pool()).await?;
        debug!("scan schema is up to date");
        Ok(())
    }

    async fn create_image(&self, name: &str, tag: &str) -> Result<ImageId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO images (name, tag) VALUES ($1, $2) RETURNING id",
        )
        .bind(name)
        .bind(tag)
        .fetch_one(self.pool())
        .await?;
        Ok(ImageId(id))
    }

    async fn create_scan(&self, image_id: ImageId) -> Result<ScanId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO scans (image_id, status) VALUES ($1, $2) RETURNING id",
        )
        .bind(image_id.get())
        .bind(ScanStatus::Pending.as_str())
        .fetch_one(self.pool())
        .await?;
        Ok(ScanId(id))
    }

    async fn get_scan(&self, scan_id: ScanId) -> Result<Option<ScanRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans s JOIN images i ON i.id = s.image_id WHERE s.id = $1"
        ))
        .bind(scan_id.get())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(Self::map_scan).transpose()
    }

    async fn set_status(
        &self,
        scan_id: ScanId,
        transition: StatusTransition,
        results: Option<Value>,
    ) -> Result<()> {
        reject_unexpected_results(transition, &results)?;

        let updated = sqlx::query(
            r#"
            UPDATE scans
            SET status = $3, results = COALESCE($4, results)
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(scan_id.get())
        .bind(transition.from().as_str())
        .bind(transition.to().as_str())
        .bind(results)
        .execute(self.pool())
        .await?;

        if updated.rows_affected() == 0 {
            return Err(self.conflict_for(scan_id, transition.from()).await);
        }

        debug!(scan_id = %scan_id, %transition, "scan status updated");
        Ok(())
    }

    async fn insert_finding(
        &self,
        scan_id: ScanId,
        finding: NewFinding,
    ) -> Result<FindingId> {
        let mut tx = self.pool().begin().await?;
        Self::lock_in_status(&mut tx, scan_id, ScanStatus::Running).await?;
        let id = Self::insert_finding_in(&mut tx, scan_id, &finding).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn complete_scan(
        &self,
        scan_id: ScanId,
        results: Value,
        findings: Vec<NewFinding>,
    ) -> Result<usize> {
        let mut tx = self.pool().begin().await?;
        Self::lock_in_status(&mut tx, scan_id, ScanStatus::Running).await?;

        for finding in &findings {
            Self::insert_finding_in(&mut tx, scan_id, finding).await?;
        }

        let transition = StatusTransition::COMPLETE;
        sqlx::query("UPDATE scans SET status = $2, results = $3 WHERE id = $1")
            .bind(scan_id.get())
            .bind(transition.to().as_str())
            .bind(results)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            scan_id = %scan_id,
            findings = findings.len(),
            "scan completed"
        );
        Ok(findings.len())
    }

    async fn list_scans(&self) -> Result<Vec<ScanSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, i.name AS image_name, s.status, s.scan_date
            FROM scans s
            JOIN images i ON i.id = s.image_id
            ORDER BY s.id DESC
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<ScanSummary> {
                let status: String = row.try_get("status")?;
                Ok(ScanSummary {
                    id: ScanId(row.try_get("id")?),
                    image_name: row.try_get("image_name")?,
                    status: status.parse()?,
                    scan_date: row.try_get("scan_date")?,
                })
            })
            .collect()
    }

    async fn list_findings(&self, scan_id: ScanId) -> Result<Vec<Finding>> {
        let rows = sqlx::query(
            r#"
            SELECT id, scan_id, package_name, severity, description, fixed_version
            FROM vulnerabilities
            WHERE scan_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(scan_id.get())
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(Self::map_finding).collect()
    }

    async fn list_pending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ScanRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SCAN_COLUMNS}
            FROM scans s
            JOIN images i ON i.id = s.image_id
            WHERE s.status = $1 AND s.scan_date <= $2
            ORDER BY s.id ASC
            "#
        ))
        .bind(ScanStatus::Pending.as_str())
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(Self::map_scan).collect()
    }
}
