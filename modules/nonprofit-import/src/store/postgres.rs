// Postgres-backed PersistenceGateway. One row per EIN; the sanitized record
// and its import history live in JSONB columns.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::document::SanitizedRecord;
use crate::error::Result;
use crate::traits::PersistenceGateway;
use crate::types::{ImportHistoryEntry, PersistedOrgRecord, ReviewStatus};

use super::{merge_import, new_record};

#[derive(Debug, Clone, sqlx::FromRow)]
struct OrgRow {
    id: Uuid,
    ein: String,
    record: serde_json::Value,
    source_system: String,
    review_status: String,
    import_history: Json<Vec<ImportHistoryEntry>>,
    imported_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrgRow> for PersistedOrgRecord {
    fn from(row: OrgRow) -> Self {
        Self {
            id: row.id,
            external_id: row.ein,
            record: row.record,
            source_system: row.source_system,
            review_status: ReviewStatus::parse(&row.review_status),
            import_history: row.import_history.0,
            imported_at: row.imported_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgOrgStore {
    pool: PgPool,
}

impl PgOrgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn get(&self, external_id: &str) -> Result<Option<PersistedOrgRecord>> {
        let row = sqlx::query_as::<_, OrgRow>(
            r#"
            SELECT id, ein, record, source_system, review_status, import_history, imported_at, updated_at
            FROM nonprofit_organizations
            WHERE ein = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PersistedOrgRecord::from))
    }
}

#[async_trait]
impl PersistenceGateway for PgOrgStore {
    async fn upsert(&self, external_id: &str, record: SanitizedRecord) -> Result<Uuid> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Row lock so a concurrent import of the same EIN cannot interleave its merge.
        let existing = sqlx::query_as::<_, OrgRow>(
            r#"
            SELECT id, ein, record, source_system, review_status, import_history, imported_at, updated_at
            FROM nonprofit_organizations
            WHERE ein = $1
            FOR UPDATE
            "#,
        )
        .bind(external_id)
        .fetch_optional(&mut *tx)
        .await?;

        let id = match existing {
            Some(row) => {
                let mut stored = PersistedOrgRecord::from(row);
                merge_import(&mut stored, record, now);
                sqlx::query(
                    r#"
                    UPDATE nonprofit_organizations
                    SET record = $2, import_history = $3, updated_at = $4
                    WHERE id = $1
                    "#,
                )
                .bind(stored.id)
                .bind(&stored.record)
                .bind(Json(&stored.import_history))
                .bind(stored.updated_at)
                .execute(&mut *tx)
                .await?;
                debug!(ein = external_id, history = stored.import_history.len(), "Merged organization");
                stored.id
            }
            None => {
                let created = new_record(external_id, record, now);
                sqlx::query(
                    r#"
                    INSERT INTO nonprofit_organizations
                        (id, ein, record, source_system, review_status, import_history, imported_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(created.id)
                .bind(&created.external_id)
                .bind(&created.record)
                .bind(&created.source_system)
                .bind(created.review_status.as_str())
                .bind(Json(&created.import_history))
                .bind(created.imported_at)
                .bind(created.updated_at)
                .execute(&mut *tx)
                .await?;
                debug!(ein = external_id, "Created organization");
                created.id
            }
        };

        tx.commit().await?;
        Ok(id)
    }

    async fn known_ids(&self) -> Result<HashSet<String>> {
        let eins = sqlx::query_scalar::<_, String>("SELECT ein FROM nonprofit_organizations")
            .fetch_all(&self.pool)
            .await?;
        Ok(eins.into_iter().collect())
    }
}
