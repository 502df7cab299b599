//! Key-value application settings storage, living on `Store` alongside the
//! rest of the catalog's persistence surface.

use chrono::Utc;
use serde_json::Value;

use super::Store;
use crate::error::CatalogResult;

impl Store {
    pub async fn get_setting(&self, key: &str) -> CatalogResult<Option<Value>> {
        let result: Option<(String,)> = sqlx::query_as("SELECT value FROM app_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match result {
            Some((json_str,)) => Some(serde_json::from_str(&json_str).unwrap_or(Value::Null)),
            None => None,
        })
    }

    pub async fn set_setting(&self, key: &str, value: &Value) -> CatalogResult<()> {
        let json_str = serde_json::to_string(value)
            .map_err(|e| crate::error::CatalogError::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO app_settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(json_str)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
