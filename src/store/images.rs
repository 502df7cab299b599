//! Image CRUD.
//!
//! `add_image` on an existing `filepath` is a silent no-op skip rather than
//! an update-in-place or cross-root move detection, so that re-scanning a
//! tree is idempotent instead of refreshing rows out from under the caller.

use chrono::Utc;

use super::models::{Image, NewImage};
use super::Store;
use crate::error::CatalogResult;

/// The allowlisted `order_by` columns for `list_all`; anything else falls
/// back to `filepath`, mirroring `db/manager.py::get_all_images`'s allowlist.
const ORDER_COLUMNS: &[&str] = &["filepath", "date_added", "date_modified", "file_size", "datetime"];

pub struct AddImageOutcome {
    pub id: i64,
    pub inserted: bool,
}

impl Store {
    /// Inserts a new image row. If `filepath` already exists, returns the
    /// existing id with `inserted = false` instead of erroring or overwriting.
    pub async fn add_image(&self, img: &NewImage) -> CatalogResult<AddImageOutcome> {
        if let Some(existing) = self.get_by_path(&img.filepath).await? {
            return Ok(AddImageOutcome {
                id: existing.id,
                inserted: false,
            });
        }

        let now = Utc::now();
        let res = sqlx::query(
            "INSERT INTO images (
                filepath, filename, file_size, width, height,
                datetime, year, month, day, hour, minute, second,
                latitude, longitude, has_lat_lon, city, town, state,
                date_added, date_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(filepath) DO NOTHING",
        )
        .bind(&img.filepath)
        .bind(&img.filename)
        .bind(img.file_size)
        .bind(img.width)
        .bind(img.height)
        .bind(&img.datetime)
        .bind(img.year)
        .bind(img.month)
        .bind(img.day)
        .bind(img.hour)
        .bind(img.minute)
        .bind(img.second)
        .bind(&img.latitude)
        .bind(&img.longitude)
        .bind(img.has_lat_lon)
        .bind(&img.city)
        .bind(&img.town)
        .bind(&img.state)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            // Lost a race with a concurrent insert of the same filepath.
            let existing = self.get_by_path(&img.filepath).await?.ok_or_else(|| {
                crate::error::CatalogError::Internal(
                    "insert conflicted but no row found afterward".to_string(),
                )
            })?;
            return Ok(AddImageOutcome {
                id: existing.id,
                inserted: false,
            });
        }

        Ok(AddImageOutcome {
            id: res.last_insert_rowid(),
            inserted: true,
        })
    }

    pub async fn get_by_id(&self, id: i64) -> CatalogResult<Option<Image>> {
        Ok(sqlx::query_as::<_, Image>("SELECT * FROM images WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_by_path(&self, filepath: &str) -> CatalogResult<Option<Image>> {
        Ok(
            sqlx::query_as::<_, Image>("SELECT * FROM images WHERE filepath = ?")
                .bind(filepath)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Lists every image, ordered by `order_by` (validated against an
    /// allowlist; falls back to `filepath` — the canonical viewer order).
    pub async fn list_all(&self, order_by: &str) -> CatalogResult<Vec<Image>> {
        let column = ORDER_COLUMNS
            .iter()
            .find(|c| **c == order_by)
            .copied()
            .unwrap_or("filepath");
        let sql = format!("SELECT * FROM images ORDER BY {column}");
        Ok(sqlx::query_as::<_, Image>(&sql).fetch_all(&self.pool).await?)
    }

    /// Images whose hash slots are unpopulated — the Hasher's work queue.
    pub async fn list_unhashed(&self) -> CatalogResult<Vec<Image>> {
        Ok(sqlx::query_as::<_, Image>(
            "SELECT * FROM images WHERE phash_0 IS NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Every image with a full set of hash slots — the Duplicate Engine's input.
    pub async fn list_hashed(&self) -> CatalogResult<Vec<Image>> {
        Ok(sqlx::query_as::<_, Image>(
            "SELECT * FROM images WHERE phash_0 IS NOT NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn count(&self) -> CatalogResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM images")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Updates mutable user-facing flags/fields and refreshes `date_modified`.
    pub async fn update_image(
        &self,
        id: i64,
        favorite: Option<bool>,
        to_delete: Option<bool>,
        reviewed: Option<bool>,
    ) -> CatalogResult<()> {
        let current = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| crate::error::CatalogError::NotFound(format!("image {id}")))?;
        let favorite = favorite.unwrap_or(current.favorite);
        let to_delete = to_delete.unwrap_or(current.to_delete);
        let reviewed = reviewed.unwrap_or(current.reviewed);
        sqlx::query(
            "UPDATE images SET favorite = ?, to_delete = ?, reviewed = ?, date_modified = ? WHERE id = ?",
        )
        .bind(favorite)
        .bind(to_delete)
        .bind(reviewed)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Updates the location fields (city/town/state, alongside latitude/
    /// longitude) and refreshes `date_modified`. `None` leaves a field
    /// unchanged; pass `Some("")` to clear a string field.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_location(
        &self,
        id: i64,
        city: Option<&str>,
        town: Option<&str>,
        state: Option<&str>,
        latitude: Option<&str>,
        longitude: Option<&str>,
    ) -> CatalogResult<()> {
        let current = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| crate::error::CatalogError::NotFound(format!("image {id}")))?;
        let city = city.map(str::to_string).or(current.city);
        let town = town.map(str::to_string).or(current.town);
        let state = state.map(str::to_string).or(current.state);
        let latitude = latitude.map(str::to_string).or(current.latitude);
        let longitude = longitude.map(str::to_string).or(current.longitude);
        let has_lat_lon = latitude.is_some() && longitude.is_some();
        sqlx::query(
            "UPDATE images SET city = ?, town = ?, state = ?, latitude = ?, longitude = ?,
                has_lat_lon = ?, date_modified = ? WHERE id = ?",
        )
        .bind(city)
        .bind(town)
        .bind(state)
        .bind(latitude)
        .bind(longitude)
        .bind(has_lat_lon)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Writes the ten hash slots computed by the Perceptual Hasher.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_hashes(
        &self,
        id: i64,
        phash_0: &str,
        phash_90: &str,
        phash_180: &str,
        phash_270: &str,
        dhash_0: &str,
        dhash_90: &str,
        dhash_180: &str,
        dhash_270: &str,
        phash_hmirror: &str,
        dhash_hmirror: &str,
    ) -> CatalogResult<()> {
        sqlx::query(
            "UPDATE images SET
                phash_0 = ?, phash_90 = ?, phash_180 = ?, phash_270 = ?,
                dhash_0 = ?, dhash_90 = ?, dhash_180 = ?, dhash_270 = ?,
                phash_hmirror = ?, dhash_hmirror = ?
             WHERE id = ?",
        )
        .bind(phash_0)
        .bind(phash_90)
        .bind(phash_180)
        .bind(phash_270)
        .bind(dhash_0)
        .bind(dhash_90)
        .bind(dhash_180)
        .bind(dhash_270)
        .bind(phash_hmirror)
        .bind(dhash_hmirror)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flags a scanned-but-undecodable image's skeleton row so the scanner
    /// can still record it without aborting the scan (§7, "Decode error").
    pub async fn mark_auto_tag_error(&self, id: i64) -> CatalogResult<()> {
        sqlx::query("UPDATE images SET auto_tag_errors = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes an image. Image–tag edges and duplicate-group memberships
    /// cascade via `ON DELETE CASCADE`; afterward, any group left with ≤1
    /// effective (non-excluded) member is deleted outright (Testable Property 11).
    pub async fn delete_image(&self, id: i64) -> CatalogResult<()> {
        let affected_groups: Vec<(i64,)> =
            sqlx::query_as("SELECT DISTINCT group_id FROM duplicate_group_members WHERE image_id = ?")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;

        sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        for (group_id,) in affected_groups {
            self.collapse_group_if_needed(group_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn new_store() -> Store {
        Store::create_in_memory_for_test().await
    }

    fn sample(filepath: &str) -> NewImage {
        NewImage {
            filepath: filepath.to_string(),
            filename: filepath.rsplit('/').next().unwrap().to_string(),
            file_size: 1024,
            width: Some(800),
            height: Some(600),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn add_image_is_idempotent_on_filepath() {
        let store = new_store().await;
        let first = store.add_image(&sample("a.jpg")).await.unwrap();
        assert!(first.inserted);
        let second = store.add_image(&sample("a.jpg")).await.unwrap();
        assert!(!second.inserted);
        assert_eq!(first.id, second.id);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_location_sets_city_town_state_and_lat_lon() {
        let store = new_store().await;
        let img = store.add_image(&sample("a.jpg")).await.unwrap();
        assert!(!store.get_by_id(img.id).await.unwrap().unwrap().has_lat_lon);

        store
            .update_location(
                img.id,
                Some("Springfield"),
                Some("Shelbyville"),
                Some("IL"),
                Some("39.78"),
                Some("-89.65"),
            )
            .await
            .unwrap();

        let updated = store.get_by_id(img.id).await.unwrap().unwrap();
        assert_eq!(updated.city.as_deref(), Some("Springfield"));
        assert_eq!(updated.town.as_deref(), Some("Shelbyville"));
        assert_eq!(updated.state.as_deref(), Some("IL"));
        assert!(updated.has_lat_lon);

        // A later partial update leaves unspecified fields as they were.
        store
            .update_location(img.id, None, None, Some("MO"), None, None)
            .await
            .unwrap();
        let reupdated = store.get_by_id(img.id).await.unwrap().unwrap();
        assert_eq!(reupdated.city.as_deref(), Some("Springfield"));
        assert_eq!(reupdated.state.as_deref(), Some("MO"));
    }

    #[tokio::test]
    async fn delete_cascades_to_tags_and_group_membership() {
        let store = new_store().await;
        let img = store.add_image(&sample("a.jpg")).await.unwrap();
        let tag_id = store.ensure_path("person", "string").await.unwrap();
        store.set_tag(img.id, tag_id, Some("Alice")).await.unwrap();
        let group_id = store.create_group(&[img.id]).await.unwrap();

        store.delete_image(img.id).await.unwrap();

        assert!(store.tags_of(img.id).await.unwrap().is_empty());
        let groups = store.list_groups().await.unwrap();
        assert!(groups.iter().all(|g| g.group.id != group_id) || {
            let g = groups.iter().find(|g| g.group.id == group_id);
            g.map(|g| g.members.is_empty()).unwrap_or(true)
        });
    }
}
