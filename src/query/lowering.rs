//! Lowers a parsed [`Expr`] into a parameterized SQL string.
//!
//! Threads a mutable builder through the AST, same idea as a
//! `build_where_clause` helper over `sqlx::QueryBuilder`, but targeting a
//! plain `String` plus a positional `QueryParam` list directly, since
//! `Store::execute_query(sql, params)` already commits to that shape.

use super::ast::{Comparison, Expr, Op, QueryParam, Value};
use crate::error::{CatalogError, CatalogResult};

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Bool,
    Int,
    /// Stored as TEXT but compared numerically via `CAST`.
    FloatAsText,
    Text,
}

/// Fixed-field dotted paths (after the `tag.` prefix) and the column/coercion
/// they lower to, per §4.8.
const FIXED_FIELDS: &[(&str, FieldKind, &str)] = &[
    ("favorite", FieldKind::Bool, "favorite"),
    ("to_delete", FieldKind::Bool, "to_delete"),
    ("reviewed", FieldKind::Bool, "reviewed"),
    ("auto_tag_errors", FieldKind::Bool, "auto_tag_errors"),
    ("datetime", FieldKind::Text, "datetime"),
    ("datetime.year", FieldKind::Int, "year"),
    ("datetime.month", FieldKind::Int, "month"),
    ("datetime.day", FieldKind::Int, "day"),
    ("datetime.hour", FieldKind::Int, "hour"),
    ("datetime.minute", FieldKind::Int, "minute"),
    ("datetime.second", FieldKind::Int, "second"),
    ("location.latitude", FieldKind::FloatAsText, "latitude"),
    ("location.longitude", FieldKind::FloatAsText, "longitude"),
    ("location.has_lat_lon", FieldKind::Bool, "has_lat_lon"),
    ("location.city", FieldKind::Text, "city"),
    ("location.town", FieldKind::Text, "town"),
    ("location.state", FieldKind::Text, "state"),
    ("image_size.width", FieldKind::Int, "width"),
    ("image_size.height", FieldKind::Int, "height"),
];

#[derive(Default)]
struct Lowerer {
    joins: Vec<String>,
    join_params: Vec<QueryParam>,
    where_params: Vec<QueryParam>,
    alias_counter: usize,
}

impl Lowerer {
    fn next_alias(&mut self) -> usize {
        self.alias_counter += 1;
        self.alias_counter
    }
}

fn coerce_bool(value: &Value) -> CatalogResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Int(1) => Ok(true),
        Value::Int(0) => Ok(false),
        Value::Str(s) => match s.to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            other => Err(CatalogError::QueryParse(format!(
                "cannot coerce {other:?} to a boolean"
            ))),
        },
        other => Err(CatalogError::QueryParse(format!(
            "cannot coerce {other:?} to a boolean"
        ))),
    }
}

fn coerce_int(value: &Value) -> CatalogResult<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(CatalogError::QueryParse(format!(
            "expected an integer value, found {other:?}"
        ))),
    }
}

fn coerce_float(value: &Value) -> CatalogResult<f64> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f64),
        other => Err(CatalogError::QueryParse(format!(
            "expected a numeric value, found {other:?}"
        ))),
    }
}

fn coerce_text(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
    }
}

fn lower_fixed_field(
    kind: FieldKind,
    column: &str,
    op: Op,
    value: &Value,
    lowerer: &mut Lowerer,
) -> CatalogResult<String> {
    let sql_op = op.as_sql();
    match kind {
        FieldKind::Bool => {
            lowerer.where_params.push(QueryParam::Bool(coerce_bool(value)?));
            Ok(format!("image.{column} {sql_op} ?"))
        }
        FieldKind::Int => {
            lowerer.where_params.push(QueryParam::Int(coerce_int(value)?));
            Ok(format!("image.{column} {sql_op} ?"))
        }
        FieldKind::FloatAsText => {
            lowerer.where_params.push(QueryParam::Float(coerce_float(value)?));
            Ok(format!("CAST(image.{column} AS REAL) {sql_op} ?"))
        }
        FieldKind::Text => {
            lowerer.where_params.push(QueryParam::Text(coerce_text(value)));
            Ok(format!("image.{column} {sql_op} ?"))
        }
    }
}

/// Dynamic tag paths lower to a fresh edge alias plus one tag-definition
/// alias per path segment, walking from the leaf up to the root and
/// asserting the topmost segment has no parent (the path is rooted) (§4.8).
fn lower_dynamic_tag(cmp: &Comparison, lowerer: &mut Lowerer) -> CatalogResult<String> {
    let n = lowerer.next_alias();
    let edge_alias = format!("e{n}");
    let tag_aliases: Vec<String> = (0..cmp.path.len()).map(|i| format!("t{n}_{i}")).collect();
    let leaf_idx = cmp.path.len() - 1;

    lowerer.joins.push(format!(
        "JOIN image_tags {edge_alias} ON {edge_alias}.image_id = image.id"
    ));
    lowerer.joins.push(format!(
        "JOIN tag_definitions {} ON {}.id = {edge_alias}.tag_id AND {}.name = ?",
        tag_aliases[leaf_idx], tag_aliases[leaf_idx], tag_aliases[leaf_idx]
    ));
    lowerer
        .join_params
        .push(QueryParam::Text(cmp.path[leaf_idx].clone()));

    let mut prev_alias = tag_aliases[leaf_idx].clone();
    for i in (0..leaf_idx).rev() {
        let alias = &tag_aliases[i];
        lowerer.joins.push(format!(
            "JOIN tag_definitions {alias} ON {alias}.id = {prev_alias}.parent_id AND {alias}.name = ?"
        ));
        lowerer.join_params.push(QueryParam::Text(cmp.path[i].clone()));
        prev_alias = alias.clone();
    }

    let sql_op = cmp.op.as_sql();
    let value_expr = match &cmp.value {
        Value::Int(i) => {
            lowerer.where_params.push(QueryParam::Int(*i));
            format!("CAST({edge_alias}.value AS INTEGER) {sql_op} ?")
        }
        Value::Float(f) => {
            lowerer.where_params.push(QueryParam::Float(*f));
            format!("CAST({edge_alias}.value AS REAL) {sql_op} ?")
        }
        other => {
            lowerer.where_params.push(QueryParam::Text(coerce_text(other)));
            format!("{edge_alias}.value {sql_op} ?")
        }
    };

    Ok(format!("({value_expr} AND {prev_alias}.parent_id IS NULL)"))
}

fn lower_comparison(cmp: &Comparison, lowerer: &mut Lowerer) -> CatalogResult<String> {
    let path_str = cmp.path.join(".");
    if let Some((_, kind, column)) = FIXED_FIELDS.iter().find(|(p, _, _)| *p == path_str) {
        lower_fixed_field(*kind, column, cmp.op, &cmp.value, lowerer)
    } else {
        lower_dynamic_tag(cmp, lowerer)
    }
}

fn lower_expr(expr: &Expr, lowerer: &mut Lowerer) -> CatalogResult<String> {
    match expr {
        Expr::Comparison(c) => lower_comparison(c, lowerer),
        Expr::And(l, r) => {
            let left = lower_expr(l, lowerer)?;
            let right = lower_expr(r, lowerer)?;
            Ok(format!("({left} AND {right})"))
        }
        Expr::Or(l, r) => {
            let left = lower_expr(l, lowerer)?;
            let right = lower_expr(r, lowerer)?;
            Ok(format!("({left} OR {right})"))
        }
    }
}

/// Compiles a query expression string into `(sql, params)`. An empty or
/// all-whitespace string means "no filter" (§6, "Empty string means 'no
/// filter'"), matching every image.
pub fn compile(expr_str: &str) -> CatalogResult<(String, Vec<QueryParam>)> {
    if expr_str.trim().is_empty() {
        return Ok(("SELECT DISTINCT image.* FROM images image".to_string(), Vec::new()));
    }

    let expr = super::parser::parse(expr_str).map_err(CatalogError::QueryParse)?;
    let mut lowerer = Lowerer::default();
    let where_clause = lower_expr(&expr, &mut lowerer)?;
    let joins = lowerer.joins.join(" ");
    let sql = format!("SELECT DISTINCT image.* FROM images image {joins} WHERE {where_clause}");

    let mut params = lowerer.join_params;
    params.extend(lowerer.where_params);
    Ok((sql, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_expression_matches_everything() {
        let (sql, params) = compile("").unwrap();
        assert!(sql.contains("SELECT DISTINCT image.*"));
        assert!(params.is_empty());
    }

    #[test]
    fn fixed_field_lowers_without_joins() {
        let (sql, params) = compile("tag.favorite == true").unwrap();
        assert!(!sql.contains("JOIN"));
        assert!(sql.contains("image.favorite = ?"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn dynamic_tag_path_adds_joins_per_segment() {
        let (sql, params) = compile(r#"tag.event.birthday == "Alice""#).unwrap();
        assert_eq!(sql.matches("JOIN tag_definitions").count(), 2);
        assert_eq!(sql.matches("JOIN image_tags").count(), 1);
        // leaf name + parent name + comparison value = 3 bound params.
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn boolean_coercion_accepts_yes_no() {
        let (_, params) = compile(r#"tag.favorite == "yes""#).unwrap();
        assert!(matches!(params[0], QueryParam::Bool(true)));
    }

    #[test]
    fn join_params_precede_where_params_in_bind_order() {
        let (sql, params) = compile(r#"tag.person == "Bob" && tag.favorite == true"#).unwrap();
        let first_join_pos = sql.find("JOIN").unwrap();
        let where_pos = sql.find(" WHERE ").unwrap();
        assert!(first_join_pos < where_pos);
        // person name param, then favorite bool param.
        assert_eq!(params.len(), 2);
        assert!(matches!(params[0], QueryParam::Text(_)));
        assert!(matches!(params[1], QueryParam::Bool(true)));
    }
}
