//! Boolean tag-query compiler (§4.8): parses an expression string to an AST,
//! then lowers it to a parameterized SQL query the Store can execute.

mod ast;
mod lowering;
mod parser;

pub use ast::{Comparison, Expr, Op, QueryParam, Value};
pub use lowering::compile;

use crate::error::CatalogResult;
use crate::store::models::Image;
use crate::store::Store;

/// Parses, lowers, and executes `expr_str` against `store` in one step.
pub async fn query(store: &Store, expr_str: &str) -> CatalogResult<Vec<Image>> {
    let (sql, params) = compile(expr_str)?;
    store.execute_query(&sql, &params).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queries_seeded_store_by_fixed_field() {
        let store = Store::create_in_memory_for_test().await;
        let img = store
            .add_image(&crate::store::models::NewImage {
                filepath: "a.jpg".into(),
                filename: "a.jpg".into(),
                file_size: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        store.update_image(img.id, Some(true), None, None).await.unwrap();

        let results = query(&store, "tag.favorite == true").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, img.id);
    }

    #[tokio::test]
    async fn queries_by_dynamic_tag_path() {
        let store = Store::create_in_memory_for_test().await;
        let img = store
            .add_image(&crate::store::models::NewImage {
                filepath: "b.jpg".into(),
                filename: "b.jpg".into(),
                file_size: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        let tag_id = store.ensure_path("person", "string").await.unwrap();
        store.set_tag(img.id, tag_id, Some("Alice")).await.unwrap();

        let results = query(&store, r#"tag.person == "Alice""#).await.unwrap();
        assert_eq!(results.len(), 1);

        let none = query(&store, r#"tag.person == "Bob""#).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn unknown_tag_path_returns_no_rows_not_an_error() {
        let store = Store::create_in_memory_for_test().await;
        let results = query(&store, r#"tag.nonexistent == "x""#).await.unwrap();
        assert!(results.is_empty());
    }
}
