use std::collections::BTreeMap;

use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use sitescope_core::domain::approval::{
    ActionId, ActorRole, ApprovalAction, ApprovalActionKind, ApprovalId, ApprovalRecord,
    ApprovalStatus, ReviewUpdate, SiteRef,
};
use sitescope_core::errors::StoreError;
use sitescope_core::ledger::{ActivityFilter, ApprovalStore, RecordFilter, ReviewOutcome};

use super::{
    format_timestamp, parse_json, parse_optional_timestamp, parse_timestamp, parse_u32, to_json,
    RepositoryError,
};
use crate::DbPool;

const RECORD_COLUMNS: &str = "id, site_ref, site_name, submitter_id, submitter_name, reviewer_id,
     reviewer_name, status, submitted_at, reviewed_at, review_comment, rejection_reason,
     selection_json, costs_json, version, previous_version_id";

const ACTION_COLUMNS: &str =
    "a.id, a.approval_id, a.action, a.actor_id, a.actor_role, a.performed_at, a.comment,
     a.metadata_json";

/// SQLite-backed approval store. Reviews are a conditional update on `status = 'pending'`
/// inside a transaction, so concurrent reviewers cannot both win.
#[derive(Clone)]
pub struct SqlApprovalStore {
    pool: DbPool,
}

impl SqlApprovalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        record: &ApprovalRecord,
        action: &ApprovalAction,
    ) -> Result<(), RepositoryError> {
        let selection_json = to_json("selection_json", &record.selection)?;
        let costs_json = to_json("costs_json", &record.costs)?;
        let metadata_json = to_json("metadata_json", &action.metadata)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO scoping_approval (
                id, site_ref, site_name, submitter_id, submitter_name, reviewer_id,
                reviewer_name, status, submitted_at, reviewed_at, review_comment,
                rejection_reason, selection_json, costs_json, version, previous_version_id
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(&record.site_ref.0)
        .bind(&record.site_name)
        .bind(&record.submitter_id)
        .bind(&record.submitter_name)
        .bind(&record.reviewer_id)
        .bind(&record.reviewer_name)
        .bind(record.status.as_str())
        .bind(format_timestamp(&record.submitted_at))
        .bind(record.reviewed_at.as_ref().map(format_timestamp))
        .bind(&record.review_comment)
        .bind(&record.rejection_reason)
        .bind(selection_json)
        .bind(costs_json)
        .bind(i64::from(record.version))
        .bind(record.previous_version_id.as_ref().map(|id| id.0.as_str()))
        .execute(&mut *tx)
        .await?;

        insert_action(&mut tx, action, &metadata_json).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn review(
        &self,
        update: &ReviewUpdate,
        action: &ApprovalAction,
    ) -> Result<ReviewOutcome, RepositoryError> {
        let metadata_json = to_json("metadata_json", &action.metadata)?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE scoping_approval
             SET status = ?, reviewer_id = ?, reviewer_name = ?, reviewed_at = ?,
                 review_comment = ?, rejection_reason = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(update.status.as_str())
        .bind(&update.reviewer_id)
        .bind(&update.reviewer_name)
        .bind(format_timestamp(&update.reviewed_at))
        .bind(&update.review_comment)
        .bind(&update.rejection_reason)
        .bind(&update.approval_id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let current = sqlx::query("SELECT status FROM scoping_approval WHERE id = ?")
                .bind(&update.approval_id.0)
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;

            return match current {
                Some(row) => Ok(ReviewOutcome::NotPending(decode_status(&row)?)),
                None => Ok(ReviewOutcome::Missing),
            };
        }

        insert_action(&mut tx, action, &metadata_json).await?;

        let row = sqlx::query(&format!("SELECT {RECORD_COLUMNS} FROM scoping_approval WHERE id = ?"))
            .bind(&update.approval_id.0)
            .fetch_one(&mut *tx)
            .await?;
        let record = record_from_row(&row)?;

        tx.commit().await?;
        Ok(ReviewOutcome::Applied(record))
    }

    async fn find(&self, id: &ApprovalId) -> Result<Option<ApprovalRecord>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RECORD_COLUMNS} FROM scoping_approval WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn actions_for(&self, id: &ApprovalId) -> Result<Vec<ApprovalAction>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS}
             FROM scoping_approval_action a
             WHERE a.approval_id = ?
             ORDER BY a.performed_at ASC, a.rowid ASC"
        ))
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(action_from_row).collect()
    }

    async fn records(&self, filter: &RecordFilter) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {RECORD_COLUMNS} FROM scoping_approval WHERE 1 = 1"));

        if let Some(site_ref) = &filter.site_ref {
            query.push(" AND site_ref = ").push_bind(site_ref.0.clone());
        }
        if let Some(submitter_id) = &filter.submitter_id {
            query.push(" AND submitter_id = ").push_bind(submitter_id.clone());
        }
        if let Some(reviewer_id) = &filter.reviewer_id {
            query.push(" AND reviewer_id = ").push_bind(reviewer_id.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY submitted_at DESC, version DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn recent_actions(
        &self,
        filter: &ActivityFilter,
    ) -> Result<Vec<ApprovalAction>, RepositoryError> {
        let rows = match &filter.submitter_id {
            Some(submitter_id) => {
                sqlx::query(&format!(
                    "SELECT {ACTION_COLUMNS}
                     FROM scoping_approval_action a
                     JOIN scoping_approval r ON r.id = a.approval_id
                     WHERE r.submitter_id = ?
                     ORDER BY a.performed_at DESC, a.rowid DESC
                     LIMIT ?"
                ))
                .bind(submitter_id)
                .bind(i64::from(filter.limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ACTION_COLUMNS}
                     FROM scoping_approval_action a
                     ORDER BY a.performed_at DESC, a.rowid DESC
                     LIMIT ?"
                ))
                .bind(i64::from(filter.limit))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(action_from_row).collect()
    }
}

#[async_trait::async_trait]
impl ApprovalStore for SqlApprovalStore {
    async fn find_record(&self, id: &ApprovalId) -> Result<Option<ApprovalRecord>, StoreError> {
        Ok(self.find(id).await?)
    }

    async fn insert_version(
        &self,
        record: &ApprovalRecord,
        action: &ApprovalAction,
    ) -> Result<(), StoreError> {
        Ok(self.insert(record, action).await?)
    }

    async fn apply_review(
        &self,
        update: &ReviewUpdate,
        action: &ApprovalAction,
    ) -> Result<ReviewOutcome, StoreError> {
        Ok(self.review(update, action).await?)
    }

    async fn list_actions(&self, id: &ApprovalId) -> Result<Vec<ApprovalAction>, StoreError> {
        Ok(self.actions_for(id).await?)
    }

    async fn list_records(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<ApprovalRecord>, StoreError> {
        Ok(self.records(filter).await?)
    }

    async fn list_recent_actions(
        &self,
        filter: &ActivityFilter,
    ) -> Result<Vec<ApprovalAction>, StoreError> {
        Ok(self.recent_actions(filter).await?)
    }
}

async fn insert_action(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    action: &ApprovalAction,
    metadata_json: &str,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO scoping_approval_action (
            id, approval_id, action, actor_id, actor_role, performed_at, comment, metadata_json
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&action.id.0)
    .bind(&action.approval_id.0)
    .bind(action.action.as_str())
    .bind(&action.actor_id)
    .bind(action.actor_role.as_str())
    .bind(format_timestamp(&action.performed_at))
    .bind(&action.comment)
    .bind(metadata_json)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn decode_status(row: &SqliteRow) -> Result<ApprovalStatus, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    ApprovalStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval status `{status_raw}`")))
}

fn record_from_row(row: &SqliteRow) -> Result<ApprovalRecord, RepositoryError> {
    let selection_json = row.try_get::<String, _>("selection_json")?;
    let costs_json = row.try_get::<String, _>("costs_json")?;

    Ok(ApprovalRecord {
        id: ApprovalId(row.try_get("id")?),
        site_ref: SiteRef(row.try_get("site_ref")?),
        site_name: row.try_get("site_name")?,
        submitter_id: row.try_get("submitter_id")?,
        submitter_name: row.try_get("submitter_name")?,
        reviewer_id: row.try_get("reviewer_id")?,
        reviewer_name: row.try_get("reviewer_name")?,
        status: decode_status(row)?,
        submitted_at: parse_timestamp("submitted_at", row.try_get("submitted_at")?)?,
        reviewed_at: parse_optional_timestamp("reviewed_at", row.try_get("reviewed_at")?)?,
        review_comment: row.try_get("review_comment")?,
        rejection_reason: row.try_get("rejection_reason")?,
        selection: parse_json("selection_json", &selection_json)?,
        costs: parse_json("costs_json", &costs_json)?,
        version: parse_u32("version", row.try_get("version")?)?,
        previous_version_id: row.try_get::<Option<String>, _>("previous_version_id")?.map(ApprovalId),
    })
}

fn action_from_row(row: &SqliteRow) -> Result<ApprovalAction, RepositoryError> {
    let action_raw = row.try_get::<String, _>("action")?;
    let action = ApprovalActionKind::parse(&action_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval action `{action_raw}`")))?;
    let role_raw = row.try_get::<String, _>("actor_role")?;
    let actor_role = ActorRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown actor role `{role_raw}`")))?;
    let metadata_json = row.try_get::<String, _>("metadata_json")?;

    Ok(ApprovalAction {
        id: ActionId(row.try_get("id")?),
        approval_id: ApprovalId(row.try_get("approval_id")?),
        action,
        actor_id: row.try_get("actor_id")?,
        actor_role,
        performed_at: parse_timestamp("performed_at", row.try_get("performed_at")?)?,
        comment: row.try_get("comment")?,
        metadata: parse_json::<BTreeMap<String, String>>("metadata_json", &metadata_json)?,
    })
}
