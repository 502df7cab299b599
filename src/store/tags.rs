//! The hierarchical tag namespace: a normalized `(parent_id, name)`
//! self-referencing table, walked left-to-right per dotted-path segment,
//! with lazy category creation and in-place leaf-to-category promotion.

use super::models::{TagDefinition, TagTreeNode};
use super::Store;
use crate::error::{CatalogError, CatalogResult};

impl Store {
    pub async fn add_tag_def(
        &self,
        name: &str,
        parent_id: Option<i64>,
        data_type: &str,
        is_category: bool,
    ) -> CatalogResult<i64> {
        let res = sqlx::query(
            "INSERT INTO tag_definitions (name, parent_id, data_type, is_category) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(parent_id)
        .bind(data_type)
        .bind(is_category)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn get_tag_def(&self, id: i64) -> CatalogResult<Option<TagDefinition>> {
        Ok(
            sqlx::query_as::<_, TagDefinition>("SELECT * FROM tag_definitions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Looks up a single segment by `(name, parent)`. When more than one row
    /// matches — sibling-name corruption upstream — the most recently
    /// inserted (highest id) wins, and the condition is logged as a
    /// data-model warning (§4.2 tie-break).
    pub async fn get_by_name(
        &self,
        name: &str,
        parent_id: Option<i64>,
    ) -> CatalogResult<Option<TagDefinition>> {
        let rows: Vec<TagDefinition> = match parent_id {
            Some(pid) => {
                sqlx::query_as("SELECT * FROM tag_definitions WHERE name = ? AND parent_id = ? ORDER BY id")
                    .bind(name)
                    .bind(pid)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM tag_definitions WHERE name = ? AND parent_id IS NULL ORDER BY id",
                )
                .bind(name)
                .fetch_all(&self.pool)
                .await?
            }
        };
        if rows.len() > 1 {
            tracing::warn!(
                name,
                ?parent_id,
                count = rows.len(),
                "multiple tag definitions share a (name, parent); picking most recently inserted"
            );
        }
        Ok(rows.into_iter().next_back())
    }

    pub async fn list_all_defs(&self) -> CatalogResult<Vec<TagDefinition>> {
        Ok(sqlx::query_as("SELECT * FROM tag_definitions ORDER BY id")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn children_of(&self, parent_id: Option<i64>) -> CatalogResult<Vec<TagDefinition>> {
        let rows = match parent_id {
            Some(pid) => {
                sqlx::query_as("SELECT * FROM tag_definitions WHERE parent_id = ? ORDER BY name")
                    .bind(pid)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM tag_definitions WHERE parent_id IS NULL ORDER BY name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    /// Walks a dotted path from the root, returning `None` on the first
    /// missing segment — never creates anything (Testable Property 1's
    /// other half: `ensure_path` creates, `resolve_path` only reads).
    pub async fn resolve_path(&self, dotted: &str) -> CatalogResult<Option<TagDefinition>> {
        let mut parent_id: Option<i64> = None;
        let mut current: Option<TagDefinition> = None;
        for segment in dotted.split('.') {
            match self.get_by_name(segment, parent_id).await? {
                Some(def) => {
                    parent_id = Some(def.id);
                    current = Some(def);
                }
                None => return Ok(None),
            }
        }
        Ok(current)
    }

    /// Walks parents to the root and reverses — the canonical stringification
    /// of a tag id, inverse of `resolve_path` (Testable Property 1).
    pub async fn path_of(&self, id: i64) -> CatalogResult<String> {
        let mut segments = Vec::new();
        let mut current_id = Some(id);
        while let Some(cid) = current_id {
            let def = self
                .get_tag_def(cid)
                .await?
                .ok_or_else(|| CatalogError::NotFound(format!("tag {cid}")))?;
            segments.push(def.name);
            current_id = def.parent_id;
        }
        segments.reverse();
        Ok(segments.join("."))
    }

    /// Idempotent creation-with-promotion for a dotted path (§4.2).
    ///
    /// For each segment: look up `(name, running parent)`. If absent, create
    /// it — a category unless it is the final segment, which instead gets
    /// `leaf_data_type` and `is_category = false`. If present but this is not
    /// the final segment and the node is not already a category, promote it
    /// in place. Returns the leaf's id.
    pub async fn ensure_path(&self, dotted: &str, leaf_data_type: &str) -> CatalogResult<i64> {
        let segments: Vec<&str> = dotted.split('.').collect();
        let mut parent_id: Option<i64> = None;
        let mut leaf_id = 0i64;

        for (i, segment) in segments.iter().enumerate() {
            let is_last = i == segments.len() - 1;
            match self.get_by_name(segment, parent_id).await? {
                Some(existing) => {
                    if !is_last && !existing.is_category {
                        self.promote_to_category(existing.id).await?;
                    }
                    parent_id = Some(existing.id);
                    leaf_id = existing.id;
                }
                None => {
                    let (data_type, is_category) = if is_last {
                        (leaf_data_type, false)
                    } else {
                        ("string", true)
                    };
                    let id = self
                        .add_tag_def(segment, parent_id, data_type, is_category)
                        .await?;
                    parent_id = Some(id);
                    leaf_id = id;
                }
            }
        }
        Ok(leaf_id)
    }

    async fn promote_to_category(&self, id: i64) -> CatalogResult<()> {
        sqlx::query("UPDATE tag_definitions SET is_category = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The full namespace as a nested tree, rooted at every top-level tag.
    pub async fn get_tree(&self) -> CatalogResult<Vec<TagTreeNode>> {
        let all = self.list_all_defs().await?;
        let mut by_parent: std::collections::HashMap<Option<i64>, Vec<TagDefinition>> =
            std::collections::HashMap::new();
        for def in all {
            by_parent.entry(def.parent_id).or_default().push(def);
        }

        fn build(
            parent_id: Option<i64>,
            by_parent: &std::collections::HashMap<Option<i64>, Vec<TagDefinition>>,
        ) -> Vec<TagTreeNode> {
            let mut nodes: Vec<TagTreeNode> = by_parent
                .get(&parent_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|tag| {
                    let children = build(Some(tag.id), by_parent);
                    TagTreeNode { tag, children }
                })
                .collect();
            nodes.sort_by(|a, b| a.tag.name.cmp(&b.tag.name));
            nodes
        }

        Ok(build(None, &by_parent))
    }

    /// The tree required on first catalog creation (§3): `favorite`,
    /// `to_delete`, `reviewed`, `auto_tag_errors`, `datetime.{...}`,
    /// `location.{...}`, `image_size.{...}`, plus empty user categories
    /// `person`, `event`, `scene`.
    pub(crate) async fn seed_default_tags(&self) -> CatalogResult<()> {
        for leaf in ["favorite", "to_delete", "reviewed", "auto_tag_errors"] {
            self.ensure_path(leaf, "bool").await?;
        }
        for child in ["year", "month", "day", "hour", "minute", "second"] {
            self.ensure_path(&format!("datetime.{child}"), "int").await?;
        }
        for (child, dtype) in [
            ("city", "string"),
            ("town", "string"),
            ("state", "string"),
            ("latitude", "string"),
            ("longitude", "string"),
            ("has_lat_lon", "bool"),
        ] {
            self.ensure_path(&format!("location.{child}"), dtype).await?;
        }
        for child in ["width", "height"] {
            self.ensure_path(&format!("image_size.{child}"), "int").await?;
        }
        for category in ["person", "event", "scene"] {
            self.ensure_path(category, "string").await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn tag_path_round_trips() {
        let store = Store::create_in_memory_for_test().await;
        let id = store.ensure_path("event.birthday.Alice", "string").await.unwrap();
        let path = store.path_of(id).await.unwrap();
        assert_eq!(path, "event.birthday.Alice");
        let resolved = store.resolve_path(&path).await.unwrap().unwrap();
        assert_eq!(resolved.id, id);
    }

    #[tokio::test]
    async fn ensure_path_is_idempotent() {
        let store = Store::create_in_memory_for_test().await;
        let before = store.list_all_defs().await.unwrap().len();
        let id1 = store.ensure_path("person.Alice", "string").await.unwrap();
        let after_first = store.list_all_defs().await.unwrap().len();
        let id2 = store.ensure_path("person.Alice", "string").await.unwrap();
        let after_second = store.list_all_defs().await.unwrap().len();
        assert_eq!(id1, id2);
        assert_eq!(after_first, after_second);
        assert!(after_first > before);
    }

    #[tokio::test]
    async fn leaf_promotes_to_category_when_child_added() {
        let store = Store::create_in_memory_for_test().await;
        let leaf_id = store.ensure_path("person.Alice", "string").await.unwrap();
        let leaf = store.get_tag_def(leaf_id).await.unwrap().unwrap();
        assert!(!leaf.is_category);

        store
            .ensure_path("person.Alice.portrait", "string")
            .await
            .unwrap();

        let promoted = store.get_tag_def(leaf_id).await.unwrap().unwrap();
        assert!(promoted.is_category);
        let child = store.resolve_path("person.Alice.portrait").await.unwrap();
        assert!(child.is_some());
    }

    #[tokio::test]
    async fn default_tree_is_seeded() {
        let store = Store::create_in_memory_for_test().await;
        assert!(store.resolve_path("person").await.unwrap().is_some());
        assert!(store
            .resolve_path("datetime.year")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .resolve_path("event.birthday.Alice")
            .await
            .unwrap()
            .is_none());
    }
}
