//! Influencer persistence and profile links.
//!
//! Links live in `influencer_links` and are always written in both directions.

use std::collections::{BTreeSet, HashMap};

use sqlx::Row;

use super::repository::{bump_revision, new_id, not_found, now_rfc3339, Repository};
use crate::errors::AppError;
use crate::models::{CreateInfluencerRequest, Influencer, LinkedPair, UpdateInfluencerRequest};
use crate::realtime::{ChangeKind, Table};

impl Repository {
    /// List all influencers with their linked profiles.
    pub async fn list_influencers(&self) -> Result<Vec<Influencer>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, name, email, phone, social_platform, social_handle, follower_count,
                      is_exclusive, created_at, updated_at
               FROM influencers ORDER BY name"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let link_rows = sqlx::query("SELECT influencer_id, linked_id FROM influencer_links")
            .fetch_all(&self.pool)
            .await?;

        let mut links: HashMap<String, BTreeSet<String>> = HashMap::new();
        for row in &link_rows {
            links
                .entry(row.get("influencer_id"))
                .or_default()
                .insert(row.get("linked_id"));
        }

        Ok(rows
            .iter()
            .map(|row| {
                let mut influencer = influencer_from_row(row);
                if let Some(linked) = links.remove(&influencer.id) {
                    influencer.linked_profiles = linked;
                }
                influencer
            })
            .collect())
    }

    /// Get an influencer by ID.
    pub async fn get_influencer(&self, id: &str) -> Result<Option<Influencer>, AppError> {
        let row = sqlx::query(
            r#"SELECT id, name, email, phone, social_platform, social_handle, follower_count,
                      is_exclusive, created_at, updated_at
               FROM influencers WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut influencer = influencer_from_row(&row);
        influencer.linked_profiles = self.linked_profiles(id).await?;
        Ok(Some(influencer))
    }

    async fn linked_profiles(&self, id: &str) -> Result<BTreeSet<String>, AppError> {
        let rows = sqlx::query("SELECT linked_id FROM influencer_links WHERE influencer_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("linked_id")).collect())
    }

    /// Create a new influencer.
    pub async fn create_influencer(
        &self,
        request: &CreateInfluencerRequest,
    ) -> Result<Influencer, AppError> {
        let id = new_id();
        let now = now_rfc3339();

        sqlx::query(
            r#"INSERT INTO influencers (
                id, name, email, phone, social_platform, social_handle, follower_count,
                is_exclusive, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.social_platform)
        .bind(&request.social_handle)
        .bind(request.follower_count)
        .bind(request.is_exclusive as i32)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.record_change(Table::Influencers, ChangeKind::Insert, &id)
            .await?;

        Ok(Influencer {
            id,
            name: request.name.clone(),
            email: request.email.clone(),
            phone: request.phone.clone(),
            social_platform: request.social_platform.clone(),
            social_handle: request.social_handle.clone(),
            follower_count: request.follower_count,
            is_exclusive: request.is_exclusive,
            linked_profiles: BTreeSet::new(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Apply a partial update to an influencer profile.
    pub async fn update_influencer(
        &self,
        id: &str,
        request: &UpdateInfluencerRequest,
    ) -> Result<Influencer, AppError> {
        let existing = self
            .get_influencer(id)
            .await?
            .ok_or_else(|| not_found("Influencer", id))?;

        let updated = Influencer {
            name: request.name.clone().unwrap_or(existing.name),
            email: request.email.clone().or(existing.email),
            phone: request.phone.clone().or(existing.phone),
            social_platform: request.social_platform.clone().or(existing.social_platform),
            social_handle: request.social_handle.clone().or(existing.social_handle),
            follower_count: request.follower_count.or(existing.follower_count),
            is_exclusive: request.is_exclusive.unwrap_or(existing.is_exclusive),
            updated_at: now_rfc3339(),
            ..existing
        };

        sqlx::query(
            r#"UPDATE influencers SET
                name = ?, email = ?, phone = ?, social_platform = ?, social_handle = ?,
                follower_count = ?, is_exclusive = ?, updated_at = ?
            WHERE id = ?"#,
        )
        .bind(&updated.name)
        .bind(&updated.email)
        .bind(&updated.phone)
        .bind(&updated.social_platform)
        .bind(&updated.social_handle)
        .bind(updated.follower_count)
        .bind(updated.is_exclusive as i32)
        .bind(&updated.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.record_change(Table::Influencers, ChangeKind::Update, id)
            .await?;

        Ok(updated)
    }

    /// Delete an influencer. Links and assignments go with it.
    pub async fn delete_influencer(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM influencers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("Influencer", id));
        }

        let revision_id = self
            .record_change(Table::Influencers, ChangeKind::Delete, id)
            .await?;
        self.publish_cascade(
            &[Table::CampaignInfluencers, Table::CampaignVideos],
            id,
            revision_id,
        );
        Ok(())
    }

    /// Link two profiles of the same person. Returns both rows as committed.
    pub async fn link_influencers(&self, id: &str, other_id: &str) -> Result<LinkedPair, AppError> {
        self.set_link(id, other_id, true).await
    }

    /// Remove the link between two profiles. Returns both rows as committed.
    pub async fn unlink_influencers(
        &self,
        id: &str,
        other_id: &str,
    ) -> Result<LinkedPair, AppError> {
        self.set_link(id, other_id, false).await
    }

    async fn set_link(&self, id: &str, other_id: &str, linked: bool) -> Result<LinkedPair, AppError> {
        if id == other_id {
            return Err(AppError::Validation(
                "An influencer cannot be linked to itself".to_string(),
            ));
        }
        for candidate in [id, other_id] {
            if self.get_influencer(candidate).await?.is_none() {
                return Err(not_found("Influencer", candidate));
            }
        }

        let now = now_rfc3339();
        let mut tx = self.pool.begin().await?;

        for (from, to) in [(id, other_id), (other_id, id)] {
            let statement = if linked {
                "INSERT OR IGNORE INTO influencer_links (influencer_id, linked_id) VALUES (?, ?)"
            } else {
                "DELETE FROM influencer_links WHERE influencer_id = ? AND linked_id = ?"
            };
            sqlx::query(statement)
                .bind(from)
                .bind(to)
                .execute(&mut *tx)
                .await?;

            sqlx::query("UPDATE influencers SET updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(from)
                .execute(&mut *tx)
                .await?;
        }

        let revision_id = bump_revision(&mut *tx).await?;
        tx.commit().await?;

        self.publish(Table::Influencers, ChangeKind::Update, id, revision_id);
        self.publish(Table::Influencers, ChangeKind::Update, other_id, revision_id);

        let influencer = self
            .get_influencer(id)
            .await?
            .ok_or_else(|| not_found("Influencer", id))?;
        let other = self
            .get_influencer(other_id)
            .await?
            .ok_or_else(|| not_found("Influencer", other_id))?;

        Ok(LinkedPair { influencer, other })
    }
}

fn influencer_from_row(row: &sqlx::sqlite::SqliteRow) -> Influencer {
    let is_exclusive: i32 = row.get("is_exclusive");
    Influencer {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        social_platform: row.get("social_platform"),
        social_handle: row.get("social_handle"),
        follower_count: row.get("follower_count"),
        is_exclusive: is_exclusive != 0,
        linked_profiles: BTreeSet::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
