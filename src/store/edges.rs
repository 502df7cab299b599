//! Image–tag edges: `INSERT OR IGNORE` on a join table, following the same
//! shape as a `set_image_tag`/`remove_image_tag`/`get_image_tags` surface.

use super::models::{Image, ImageTag};
use super::Store;
use crate::error::CatalogResult;

impl Store {
    /// Upserts an edge. `(image_id, tag_id, value)` uniquely identifies an
    /// edge; a duplicate insert is a silent no-op (§3, Image–Tag Edge invariant).
    pub async fn set_tag(
        &self,
        image_id: i64,
        tag_id: i64,
        value: Option<&str>,
    ) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO image_tags (image_id, tag_id, value) VALUES (?, ?, ?)
             ON CONFLICT(image_id, tag_id, value) DO NOTHING",
        )
        .bind(image_id)
        .bind(tag_id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Removes an edge. If `value` is `None`, removes every edge for that
    /// `(image_id, tag_id)` regardless of value.
    pub async fn remove_tag(
        &self,
        image_id: i64,
        tag_id: i64,
        value: Option<&str>,
    ) -> CatalogResult<()> {
        match value {
            Some(v) => {
                sqlx::query("DELETE FROM image_tags WHERE image_id = ? AND tag_id = ? AND value = ?")
                    .bind(image_id)
                    .bind(tag_id)
                    .bind(v)
                    .execute(&self.pool)
                    .await?;
            }
            None => {
                sqlx::query("DELETE FROM image_tags WHERE image_id = ? AND tag_id = ?")
                    .bind(image_id)
                    .bind(tag_id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn tags_of(&self, image_id: i64) -> CatalogResult<Vec<ImageTag>> {
        Ok(
            sqlx::query_as::<_, ImageTag>("SELECT * FROM image_tags WHERE image_id = ? ORDER BY id")
                .bind(image_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn images_with(&self, tag_id: i64, value: Option<&str>) -> CatalogResult<Vec<Image>> {
        let rows = match value {
            Some(v) => {
                sqlx::query_as::<_, Image>(
                    "SELECT i.* FROM images i
                     JOIN image_tags it ON it.image_id = i.id
                     WHERE it.tag_id = ? AND it.value = ?
                     ORDER BY i.filepath",
                )
                .bind(tag_id)
                .bind(v)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Image>(
                    "SELECT i.* FROM images i
                     JOIN image_tags it ON it.image_id = i.id
                     WHERE it.tag_id = ?
                     ORDER BY i.filepath",
                )
                .bind(tag_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// Resolves a tag by dotted path and applies it to an image, creating the
    /// path if missing — the Scanner's and Template Matcher's primary write path.
    pub async fn set_tag_by_path(
        &self,
        image_id: i64,
        dotted_path: &str,
        value: &str,
        leaf_data_type: &str,
    ) -> CatalogResult<()> {
        let tag_id = self.ensure_path(dotted_path, leaf_data_type).await?;
        self.set_tag(image_id, tag_id, Some(value)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::NewImage;

    #[tokio::test]
    async fn duplicate_edge_is_a_no_op() {
        let store = Store::create_in_memory_for_test().await;
        let img = store
            .add_image(&NewImage {
                filepath: "a.jpg".into(),
                filename: "a.jpg".into(),
                file_size: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        let tag_id = store.ensure_path("person", "string").await.unwrap();
        store.set_tag(img.id, tag_id, Some("Alice")).await.unwrap();
        store.set_tag(img.id, tag_id, Some("Alice")).await.unwrap();
        assert_eq!(store.tags_of(img.id).await.unwrap().len(), 1);
    }
}
