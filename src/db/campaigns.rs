//! Campaign and campaign assignment persistence.

use chrono::NaiveDate;
use sqlx::Row;

use super::repository::{new_id, not_found, now_rfc3339, Repository};
use crate::errors::AppError;
use crate::models::{
    Campaign, CampaignInfluencer, CreateCampaignInfluencerRequest, CreateCampaignRequest,
    UpdateCampaignInfluencerRequest, UpdateCampaignRequest, DEFAULT_CAMPAIGN_STATUS,
};
use crate::realtime::{ChangeKind, Table};

impl Repository {
    // ==================== CAMPAIGN OPERATIONS ====================

    /// List all campaigns, newest first.
    pub async fn list_campaigns(&self) -> Result<Vec<Campaign>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, brand_id, name, status, description, budget, start_date, end_date,
                      created_at, updated_at
               FROM campaigns ORDER BY created_at DESC, name"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(campaign_from_row).collect())
    }

    /// Get a campaign by ID.
    pub async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, AppError> {
        let row = sqlx::query(
            r#"SELECT id, brand_id, name, status, description, budget, start_date, end_date,
                      created_at, updated_at
               FROM campaigns WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(campaign_from_row))
    }

    /// Create a new campaign.
    pub async fn create_campaign(
        &self,
        request: &CreateCampaignRequest,
    ) -> Result<Campaign, AppError> {
        check_dates(request.start_date, request.end_date)?;

        let id = new_id();
        let now = now_rfc3339();
        let status = request
            .status
            .clone()
            .unwrap_or_else(|| DEFAULT_CAMPAIGN_STATUS.to_string());

        sqlx::query(
            r#"INSERT INTO campaigns (
                id, brand_id, name, status, description, budget, start_date, end_date,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(&request.brand_id)
        .bind(&request.name)
        .bind(&status)
        .bind(&request.description)
        .bind(request.budget)
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.record_change(Table::Campaigns, ChangeKind::Insert, &id)
            .await?;

        Ok(Campaign {
            id,
            brand_id: request.brand_id.clone(),
            name: request.name.clone(),
            status,
            description: request.description.clone(),
            budget: request.budget,
            start_date: request.start_date,
            end_date: request.end_date,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Apply a partial update to a campaign.
    pub async fn update_campaign(
        &self,
        id: &str,
        request: &UpdateCampaignRequest,
    ) -> Result<Campaign, AppError> {
        let existing = self
            .get_campaign(id)
            .await?
            .ok_or_else(|| not_found("Campaign", id))?;

        let updated = Campaign {
            brand_id: request.brand_id.clone().unwrap_or(existing.brand_id),
            name: request.name.clone().unwrap_or(existing.name),
            status: request.status.clone().unwrap_or(existing.status),
            description: request.description.clone().or(existing.description),
            budget: request.budget.or(existing.budget),
            start_date: request.start_date.or(existing.start_date),
            end_date: request.end_date.or(existing.end_date),
            updated_at: now_rfc3339(),
            ..existing
        };
        check_dates(updated.start_date, updated.end_date)?;

        sqlx::query(
            r#"UPDATE campaigns SET
                brand_id = ?, name = ?, status = ?, description = ?, budget = ?,
                start_date = ?, end_date = ?, updated_at = ?
            WHERE id = ?"#,
        )
        .bind(&updated.brand_id)
        .bind(&updated.name)
        .bind(&updated.status)
        .bind(&updated.description)
        .bind(updated.budget)
        .bind(updated.start_date)
        .bind(updated.end_date)
        .bind(&updated.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.record_change(Table::Campaigns, ChangeKind::Update, id)
            .await?;

        Ok(updated)
    }

    /// Delete a campaign together with its assignments and videos.
    pub async fn delete_campaign(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("Campaign", id));
        }

        let revision_id = self
            .record_change(Table::Campaigns, ChangeKind::Delete, id)
            .await?;
        self.publish_cascade(
            &[Table::CampaignInfluencers, Table::CampaignVideos],
            id,
            revision_id,
        );
        Ok(())
    }

    // ==================== CAMPAIGN INFLUENCER OPERATIONS ====================

    /// List all campaign assignments.
    pub async fn list_campaign_influencers(&self) -> Result<Vec<CampaignInfluencer>, AppError> {
        let rows = sqlx::query(
            "SELECT id, campaign_id, influencer_id, status, fee, created_at FROM campaign_influencers ORDER BY campaign_id, created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(campaign_influencer_from_row).collect())
    }

    /// Get a campaign assignment by ID.
    pub async fn get_campaign_influencer(
        &self,
        id: &str,
    ) -> Result<Option<CampaignInfluencer>, AppError> {
        let row = sqlx::query(
            "SELECT id, campaign_id, influencer_id, status, fee, created_at FROM campaign_influencers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(campaign_influencer_from_row))
    }

    /// Assign an influencer to a campaign.
    pub async fn create_campaign_influencer(
        &self,
        request: &CreateCampaignInfluencerRequest,
    ) -> Result<CampaignInfluencer, AppError> {
        let id = new_id();
        let now = now_rfc3339();

        sqlx::query(
            "INSERT INTO campaign_influencers (id, campaign_id, influencer_id, status, fee, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.campaign_id)
        .bind(&request.influencer_id)
        .bind(&request.status)
        .bind(request.fee)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.record_change(Table::CampaignInfluencers, ChangeKind::Insert, &id)
            .await?;

        Ok(CampaignInfluencer {
            id,
            campaign_id: request.campaign_id.clone(),
            influencer_id: request.influencer_id.clone(),
            status: request.status.clone(),
            fee: request.fee,
            created_at: now,
        })
    }

    /// Apply a partial update to a campaign assignment.
    pub async fn update_campaign_influencer(
        &self,
        id: &str,
        request: &UpdateCampaignInfluencerRequest,
    ) -> Result<CampaignInfluencer, AppError> {
        let existing = self
            .get_campaign_influencer(id)
            .await?
            .ok_or_else(|| not_found("Campaign influencer", id))?;

        let updated = CampaignInfluencer {
            status: request.status.clone().or(existing.status),
            fee: request.fee.or(existing.fee),
            ..existing
        };

        sqlx::query("UPDATE campaign_influencers SET status = ?, fee = ? WHERE id = ?")
            .bind(&updated.status)
            .bind(updated.fee)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.record_change(Table::CampaignInfluencers, ChangeKind::Update, id)
            .await?;

        Ok(updated)
    }

    /// Remove an influencer from a campaign.
    pub async fn delete_campaign_influencer(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM campaign_influencers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("Campaign influencer", id));
        }

        self.record_change(Table::CampaignInfluencers, ChangeKind::Delete, id)
            .await?;
        Ok(())
    }
}

fn campaign_from_row(row: &sqlx::sqlite::SqliteRow) -> Campaign {
    Campaign {
        id: row.get("id"),
        brand_id: row.get("brand_id"),
        name: row.get("name"),
        status: row.get("status"),
        description: row.get("description"),
        budget: row.get("budget"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn campaign_influencer_from_row(row: &sqlx::sqlite::SqliteRow) -> CampaignInfluencer {
    CampaignInfluencer {
        id: row.get("id"),
        campaign_id: row.get("campaign_id"),
        influencer_id: row.get("influencer_id"),
        status: row.get("status"),
        fee: row.get("fee"),
        created_at: row.get("created_at"),
    }
}

/// A campaign may not end before it starts. Checked on the merged row so a one-sided patch
/// cannot cross the stored date.
pub fn check_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), AppError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(AppError::Validation(
            "End date must not be before start date".to_string(),
        )),
        _ => Ok(()),
    }
}
