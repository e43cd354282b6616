//! Campaign video persistence. Videos are read per campaign and never hard-deleted.

use sqlx::Row;

use super::repository::{new_id, not_found, now_rfc3339, Repository};
use crate::errors::AppError;
use crate::models::{CampaignVideo, CreateVideoRequest, UpdateVideoRequest};
use crate::realtime::{ChangeKind, Table};

impl Repository {
    /// List the visible videos of one campaign, oldest first.
    pub async fn list_campaign_videos(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<CampaignVideo>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, campaign_id, influencer_id, url, title, platform, status, is_deleted,
                      created_at, updated_at
               FROM campaign_videos
               WHERE campaign_id = ? AND is_deleted = 0
               ORDER BY created_at"#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(video_from_row).collect())
    }

    /// Get a video by ID, including soft-deleted ones.
    pub async fn get_video(&self, id: &str) -> Result<Option<CampaignVideo>, AppError> {
        let row = sqlx::query(
            r#"SELECT id, campaign_id, influencer_id, url, title, platform, status, is_deleted,
                      created_at, updated_at
               FROM campaign_videos WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(video_from_row))
    }

    /// Record a delivered video.
    pub async fn create_video(&self, request: &CreateVideoRequest) -> Result<CampaignVideo, AppError> {
        let id = new_id();
        let now = now_rfc3339();

        sqlx::query(
            r#"INSERT INTO campaign_videos (
                id, campaign_id, influencer_id, url, title, platform, status, is_deleted,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)"#,
        )
        .bind(&id)
        .bind(&request.campaign_id)
        .bind(&request.influencer_id)
        .bind(&request.url)
        .bind(&request.title)
        .bind(&request.platform)
        .bind(&request.status)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.record_change(Table::CampaignVideos, ChangeKind::Insert, &id)
            .await?;

        Ok(CampaignVideo {
            id,
            campaign_id: request.campaign_id.clone(),
            influencer_id: request.influencer_id.clone(),
            url: request.url.clone(),
            title: request.title.clone(),
            platform: request.platform.clone(),
            status: request.status.clone(),
            is_deleted: false,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Apply a partial update to a visible video.
    pub async fn update_video(
        &self,
        id: &str,
        request: &UpdateVideoRequest,
    ) -> Result<CampaignVideo, AppError> {
        let existing = self
            .get_video(id)
            .await?
            .filter(|video| !video.is_deleted)
            .ok_or_else(|| not_found("Video", id))?;

        let updated = CampaignVideo {
            influencer_id: request.influencer_id.clone().or(existing.influencer_id),
            url: request.url.clone().unwrap_or(existing.url),
            title: request.title.clone().or(existing.title),
            platform: request.platform.clone().or(existing.platform),
            status: request.status.clone().or(existing.status),
            updated_at: now_rfc3339(),
            ..existing
        };

        sqlx::query(
            r#"UPDATE campaign_videos SET
                influencer_id = ?, url = ?, title = ?, platform = ?, status = ?, updated_at = ?
            WHERE id = ?"#,
        )
        .bind(&updated.influencer_id)
        .bind(&updated.url)
        .bind(&updated.title)
        .bind(&updated.platform)
        .bind(&updated.status)
        .bind(&updated.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.record_change(Table::CampaignVideos, ChangeKind::Update, id)
            .await?;

        Ok(updated)
    }

    /// Hide a video by setting its deleted flag.
    pub async fn soft_delete_video(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE campaign_videos SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(now_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("Video", id));
        }

        // The row survives, so this is an update as far as subscribers are concerned.
        self.record_change(Table::CampaignVideos, ChangeKind::Update, id)
            .await?;
        Ok(())
    }
}

fn video_from_row(row: &sqlx::sqlite::SqliteRow) -> CampaignVideo {
    let is_deleted: i32 = row.get("is_deleted");
    CampaignVideo {
        id: row.get("id"),
        campaign_id: row.get("campaign_id"),
        influencer_id: row.get("influencer_id"),
        url: row.get("url"),
        title: row.get("title"),
        platform: row.get("platform"),
        status: row.get("status"),
        is_deleted: is_deleted != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
