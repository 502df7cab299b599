//! Duplicate-group persistence, with a collapse rule: once a group is down
//! to at most one non-excluded member, the group itself is deleted rather
//! than left around as a singleton.

use chrono::Utc;

use super::models::{DuplicateGroup, DuplicateGroupMember, DuplicateGroupWithMembers};
use super::Store;
use crate::error::CatalogResult;

impl Store {
    /// Creates one group row plus one member row per image id.
    pub async fn create_group(&self, image_ids: &[i64]) -> CatalogResult<i64> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let res = sqlx::query("INSERT INTO duplicate_groups (created_date) VALUES (?)")
            .bind(now)
            .execute(&mut *tx)
            .await?;
        let group_id = res.last_insert_rowid();
        for image_id in image_ids {
            sqlx::query(
                "INSERT INTO duplicate_group_members (group_id, image_id) VALUES (?, ?)",
            )
            .bind(group_id)
            .bind(image_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(group_id)
    }

    /// All groups, ordered by id, with their members ordered by id (§4.1).
    pub async fn list_groups(&self) -> CatalogResult<Vec<DuplicateGroupWithMembers>> {
        let groups: Vec<DuplicateGroup> =
            sqlx::query_as("SELECT * FROM duplicate_groups ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        let mut out = Vec::with_capacity(groups.len());
        for group in groups {
            let members: Vec<DuplicateGroupMember> = sqlx::query_as(
                "SELECT * FROM duplicate_group_members WHERE group_id = ? ORDER BY id",
            )
            .bind(group.id)
            .fetch_all(&self.pool)
            .await?;
            out.push(DuplicateGroupWithMembers { group, members });
        }
        Ok(out)
    }

    pub async fn update_member(
        &self,
        member_id: i64,
        is_kept: Option<bool>,
        is_not_duplicate: Option<bool>,
    ) -> CatalogResult<()> {
        let current: DuplicateGroupMember =
            sqlx::query_as("SELECT * FROM duplicate_group_members WHERE id = ?")
                .bind(member_id)
                .fetch_one(&self.pool)
                .await?;
        let is_kept = is_kept.unwrap_or(current.is_kept);
        let is_not_duplicate = is_not_duplicate.unwrap_or(current.is_not_duplicate);

        if is_kept {
            // At most one member may be kept (§3 invariant).
            sqlx::query("UPDATE duplicate_group_members SET is_kept = 0 WHERE group_id = ?")
                .bind(current.group_id)
                .execute(&self.pool)
                .await?;
        }
        sqlx::query("UPDATE duplicate_group_members SET is_kept = ?, is_not_duplicate = ? WHERE id = ?")
            .bind(is_kept)
            .bind(is_not_duplicate)
            .bind(member_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_group(&self, group_id: i64) -> CatalogResult<()> {
        sqlx::query("DELETE FROM duplicate_groups WHERE id = ?")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes every existing group — used before a re-detect pass (§4.7,
    /// "pre-existing groups are deleted first when the user chooses re-detect").
    pub async fn delete_all_groups(&self) -> CatalogResult<()> {
        sqlx::query("DELETE FROM duplicate_groups").execute(&self.pool).await?;
        Ok(())
    }

    /// Deletes `group_id` outright if it now has ≤1 non-excluded
    /// (`is_not_duplicate = 0`) member remaining (§3 invariant, Testable
    /// Property 11). Called after any image deletion that touches a group.
    pub(crate) async fn collapse_group_if_needed(&self, group_id: i64) -> CatalogResult<()> {
        let (effective,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM duplicate_group_members WHERE group_id = ? AND is_not_duplicate = 0",
        )
        .bind(group_id)
        .fetch_one(&self.pool)
        .await?;
        if effective <= 1 {
            self.delete_group(group_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::NewImage;

    async fn image(store: &Store, path: &str) -> i64 {
        store
            .add_image(&NewImage {
                filepath: path.into(),
                filename: path.into(),
                file_size: 1,
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn group_collapses_when_one_member_remains() {
        let store = Store::create_in_memory_for_test().await;
        let a = image(&store, "a.jpg").await;
        let b = image(&store, "b.jpg").await;
        let group_id = store.create_group(&[a, b]).await.unwrap();

        store.delete_image(a).await.unwrap();

        let groups = store.list_groups().await.unwrap();
        assert!(groups.iter().all(|g| g.group.id != group_id));
    }

    #[tokio::test]
    async fn at_most_one_member_kept() {
        let store = Store::create_in_memory_for_test().await;
        let a = image(&store, "a.jpg").await;
        let b = image(&store, "b.jpg").await;
        let c = image(&store, "c.jpg").await;
        store.create_group(&[a, b, c]).await.unwrap();

        let groups = store.list_groups().await.unwrap();
        let members = &groups[0].members;
        store.update_member(members[0].id, Some(true), None).await.unwrap();
        store.update_member(members[1].id, Some(true), None).await.unwrap();

        let groups = store.list_groups().await.unwrap();
        let kept_count = groups[0].members.iter().filter(|m| m.is_kept).count();
        assert_eq!(kept_count, 1);
    }
}
