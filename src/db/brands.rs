//! Brand and brand contact persistence.

use sqlx::Row;

use super::repository::{new_id, not_found, now_rfc3339, Repository};
use crate::errors::AppError;
use crate::models::{
    Brand, BrandPoc, CreateBrandPocRequest, CreateBrandRequest, UpdateBrandPocRequest,
    UpdateBrandRequest,
};
use crate::realtime::{ChangeKind, Table};

impl Repository {
    // ==================== BRAND OPERATIONS ====================

    /// List all brands.
    pub async fn list_brands(&self) -> Result<Vec<Brand>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, industry, description, website, logo_url, created_at, updated_at FROM brands ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(brand_from_row).collect())
    }

    /// Get a brand by ID.
    pub async fn get_brand(&self, id: &str) -> Result<Option<Brand>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, industry, description, website, logo_url, created_at, updated_at FROM brands WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(brand_from_row))
    }

    /// Create a new brand.
    pub async fn create_brand(&self, request: &CreateBrandRequest) -> Result<Brand, AppError> {
        let id = new_id();
        let now = now_rfc3339();

        sqlx::query(
            "INSERT INTO brands (id, name, industry, description, website, logo_url, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.name)
        .bind(&request.industry)
        .bind(&request.description)
        .bind(&request.website)
        .bind(&request.logo_url)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.record_change(Table::Brands, ChangeKind::Insert, &id)
            .await?;

        Ok(Brand {
            id,
            name: request.name.clone(),
            industry: request.industry.clone(),
            description: request.description.clone(),
            website: request.website.clone(),
            logo_url: request.logo_url.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Apply a partial update to a brand. Absent fields keep their value.
    pub async fn update_brand(
        &self,
        id: &str,
        request: &UpdateBrandRequest,
    ) -> Result<Brand, AppError> {
        let existing = self
            .get_brand(id)
            .await?
            .ok_or_else(|| not_found("Brand", id))?;

        let now = now_rfc3339();
        let updated = Brand {
            id: existing.id,
            name: request.name.clone().unwrap_or(existing.name),
            industry: request.industry.clone().or(existing.industry),
            description: request.description.clone().or(existing.description),
            website: request.website.clone().or(existing.website),
            logo_url: request.logo_url.clone().or(existing.logo_url),
            created_at: existing.created_at,
            updated_at: now,
        };

        sqlx::query(
            "UPDATE brands SET name = ?, industry = ?, description = ?, website = ?, logo_url = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&updated.name)
        .bind(&updated.industry)
        .bind(&updated.description)
        .bind(&updated.website)
        .bind(&updated.logo_url)
        .bind(&updated.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.record_change(Table::Brands, ChangeKind::Update, id)
            .await?;

        Ok(updated)
    }

    /// Delete a brand together with its contacts and campaigns.
    pub async fn delete_brand(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM brands WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("Brand", id));
        }

        let revision_id = self
            .record_change(Table::Brands, ChangeKind::Delete, id)
            .await?;
        self.publish_cascade(
            &[
                Table::BrandPocs,
                Table::Campaigns,
                Table::CampaignInfluencers,
                Table::CampaignVideos,
            ],
            id,
            revision_id,
        );
        Ok(())
    }

    // ==================== BRAND POC OPERATIONS ====================

    /// List all brand contacts.
    pub async fn list_brand_pocs(&self) -> Result<Vec<BrandPoc>, AppError> {
        let rows = sqlx::query(
            "SELECT id, brand_id, name, email, phone, position, is_primary, created_at FROM brand_pocs ORDER BY brand_id, is_primary DESC, name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(brand_poc_from_row).collect())
    }

    /// Get a brand contact by ID.
    pub async fn get_brand_poc(&self, id: &str) -> Result<Option<BrandPoc>, AppError> {
        let row = sqlx::query(
            "SELECT id, brand_id, name, email, phone, position, is_primary, created_at FROM brand_pocs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(brand_poc_from_row))
    }

    /// Create a brand contact.
    pub async fn create_brand_poc(
        &self,
        request: &CreateBrandPocRequest,
    ) -> Result<BrandPoc, AppError> {
        let id = new_id();
        let now = now_rfc3339();

        sqlx::query(
            "INSERT INTO brand_pocs (id, brand_id, name, email, phone, position, is_primary, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.brand_id)
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.position)
        .bind(request.is_primary as i32)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.record_change(Table::BrandPocs, ChangeKind::Insert, &id)
            .await?;

        Ok(BrandPoc {
            id,
            brand_id: request.brand_id.clone(),
            name: request.name.clone(),
            email: request.email.clone(),
            phone: request.phone.clone(),
            position: request.position.clone(),
            is_primary: request.is_primary,
            created_at: now,
        })
    }

    /// Apply a partial update to a brand contact.
    pub async fn update_brand_poc(
        &self,
        id: &str,
        request: &UpdateBrandPocRequest,
    ) -> Result<BrandPoc, AppError> {
        let existing = self
            .get_brand_poc(id)
            .await?
            .ok_or_else(|| not_found("Brand contact", id))?;

        let updated = BrandPoc {
            name: request.name.clone().unwrap_or(existing.name),
            email: request.email.clone().or(existing.email),
            phone: request.phone.clone().or(existing.phone),
            position: request.position.clone().or(existing.position),
            is_primary: request.is_primary.unwrap_or(existing.is_primary),
            ..existing
        };

        sqlx::query(
            "UPDATE brand_pocs SET name = ?, email = ?, phone = ?, position = ?, is_primary = ? WHERE id = ?",
        )
        .bind(&updated.name)
        .bind(&updated.email)
        .bind(&updated.phone)
        .bind(&updated.position)
        .bind(updated.is_primary as i32)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.record_change(Table::BrandPocs, ChangeKind::Update, id)
            .await?;

        Ok(updated)
    }

    /// Delete a brand contact.
    pub async fn delete_brand_poc(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM brand_pocs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("Brand contact", id));
        }

        self.record_change(Table::BrandPocs, ChangeKind::Delete, id)
            .await?;
        Ok(())
    }
}

fn brand_from_row(row: &sqlx::sqlite::SqliteRow) -> Brand {
    Brand {
        id: row.get("id"),
        name: row.get("name"),
        industry: row.get("industry"),
        description: row.get("description"),
        website: row.get("website"),
        logo_url: row.get("logo_url"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn brand_poc_from_row(row: &sqlx::sqlite::SqliteRow) -> BrandPoc {
    let is_primary: i32 = row.get("is_primary");
    BrandPoc {
        id: row.get("id"),
        brand_id: row.get("brand_id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        position: row.get("position"),
        is_primary: is_primary != 0,
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::db::init_database;
    use crate::realtime::ChangeFeed;

    async fn repo() -> (Repository, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("crm.sqlite")).await.unwrap();
        (Repository::new(pool, ChangeFeed::new(16)), dir)
    }

    #[tokio::test]
    async fn test_brand_update_keeps_untouched_fields() {
        let (repo, _dir) = repo().await;
        let brand = repo
            .create_brand(&CreateBrandRequest {
                name: "Acme".to_string(),
                website: Some("https://acme.test".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let updated = repo
            .update_brand(
                &brand.id,
                &UpdateBrandRequest {
                    industry: Some("Tech".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Acme");
        assert_eq!(updated.industry.as_deref(), Some("Tech"));
        assert_eq!(updated.website.as_deref(), Some("https://acme.test"));

        let stored = repo.get_brand(&brand.id).await.unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn test_writes_publish_and_bump_revision() {
        let (repo, _dir) = repo().await;
        let mut rx = repo.subscribe(Table::Brands);
        let before = repo.get_revision_id().await.unwrap();

        let brand = repo
            .create_brand(&CreateBrandRequest {
                name: "Globex".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.id, brand.id);
        assert_eq!(event.revision_id, before + 1);
        assert_eq!(repo.get_revision_id().await.unwrap(), before + 1);
    }

    #[tokio::test]
    async fn test_delete_brand_cascades_contacts() {
        let (repo, _dir) = repo().await;
        let brand = repo
            .create_brand(&CreateBrandRequest {
                name: "Initech".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        repo.create_brand_poc(&CreateBrandPocRequest {
            brand_id: brand.id.clone(),
            name: "Bill".to_string(),
            is_primary: true,
            ..Default::default()
        })
        .await
        .unwrap();

        let mut pocs_rx = repo.subscribe(Table::BrandPocs);
        repo.delete_brand(&brand.id).await.unwrap();

        assert!(repo.list_brand_pocs().await.unwrap().is_empty());
        let event = pocs_rx.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.id, brand.id);
    }

    #[tokio::test]
    async fn test_poc_requires_existing_brand() {
        let (repo, _dir) = repo().await;
        let result = repo
            .create_brand_poc(&CreateBrandPocRequest {
                brand_id: "missing".to_string(),
                name: "Nobody".to_string(),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_brand() {
        let (repo, _dir) = repo().await;
        let result = repo.delete_brand("missing").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
