//! Row models returned by the Store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One indexed image file.
///
/// Column order mirrors `migrations/0001_init.sql`; keep `FromRow` decoding
/// in sync if the schema changes.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    pub id: i64,
    pub filepath: String,
    pub filename: String,
    pub file_size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,

    pub datetime: Option<String>,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub day: Option<i64>,
    pub hour: Option<i64>,
    pub minute: Option<i64>,
    pub second: Option<i64>,

    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub has_lat_lon: bool,
    pub city: Option<String>,
    pub town: Option<String>,
    pub state: Option<String>,

    pub phash_0: Option<String>,
    pub phash_90: Option<String>,
    pub phash_180: Option<String>,
    pub phash_270: Option<String>,
    pub dhash_0: Option<String>,
    pub dhash_90: Option<String>,
    pub dhash_180: Option<String>,
    pub dhash_270: Option<String>,
    pub phash_hmirror: Option<String>,
    pub dhash_hmirror: Option<String>,

    pub favorite: bool,
    pub to_delete: bool,
    pub reviewed: bool,
    pub auto_tag_errors: bool,

    pub date_added: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
}

/// A fresh image row as seen during a scan, before it has an id.
#[derive(Debug, Clone, Default)]
pub struct NewImage {
    pub filepath: String,
    pub filename: String,
    pub file_size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub datetime: Option<String>,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub day: Option<i64>,
    pub hour: Option<i64>,
    pub minute: Option<i64>,
    pub second: Option<i64>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub has_lat_lon: bool,
    pub city: Option<String>,
    pub town: Option<String>,
    pub state: Option<String>,
}

/// A node in the hierarchical tag namespace.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TagDefinition {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub data_type: String,
    pub is_category: bool,
}

/// `TagDefinition` plus its resolved children, for `get_tree()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagTreeNode {
    pub tag: TagDefinition,
    pub children: Vec<TagTreeNode>,
}

/// An image–tag association, optionally carrying a value.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ImageTag {
    pub id: i64,
    pub image_id: i64,
    pub tag_id: i64,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DuplicateGroup {
    pub id: i64,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DuplicateGroupMember {
    pub id: i64,
    pub group_id: i64,
    pub image_id: i64,
    pub is_kept: bool,
    pub is_not_duplicate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroupWithMembers {
    pub group: DuplicateGroup,
    pub members: Vec<DuplicateGroupMember>,
}
