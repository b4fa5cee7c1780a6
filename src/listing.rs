//! Pagination orchestration: renders `scope ∧ filter` once, runs the
//! count + windowed fetch pair against it, and offers grade grouping for
//! the "by grade" assessment views. Handlers own their SELECT/FROM text;
//! the table aliases in it must match what `scope` composed against.

use rusqlite::{params_from_iter, types::Value, Connection, Row};
use serde_json::json;
use std::collections::BTreeMap;

use crate::scope::{Filter, Scope};

/// Single configuration-wide page size.
pub const PAGE_SIZE: i64 = 10;

/// Display cap per class in grouped views. The "+k more" count always
/// reflects the true grouped-set size, never the capped slice.
pub const GROUP_DISPLAY_CAP: usize = 5;

#[derive(Debug, Clone)]
pub struct ListError {
    pub code: String,
    pub message: String,
}

impl ListError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    fn db(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }
}

/// Page number out of the caller's filter map. Non-numeric or missing
/// values default to 1, never a hard failure; numeric strings count.
pub fn page_from(filters: &serde_json::Value) -> i64 {
    let raw = filters.get("page");
    let n = raw
        .and_then(|v| v.as_i64())
        .or_else(|| raw.and_then(|v| v.as_str()).and_then(|s| s.parse().ok()))
        .unwrap_or(1);
    n.max(1)
}

/// The static text of one listing query, WHERE clause excluded.
#[derive(Debug, Clone, Copy)]
pub struct QueryParts<'a> {
    pub select: &'a str,
    pub from: &'a str,
    pub order_by: &'a str,
}

/// Runs the count query and the windowed fetch over one rendered WHERE
/// clause. Out-of-range pages come back as empty items with the correct
/// total; `Scope::Nothing` short-circuits without touching the store.
pub fn fetch_page<T, F>(
    conn: &Connection,
    parts: &QueryParts,
    scope: &Scope,
    filter: &Filter,
    page: i64,
    map_row: F,
) -> Result<(Vec<T>, i64), ListError>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let Some((where_sql, params)) = scope.to_where(filter) else {
        return Ok((Vec::new(), 0));
    };

    let count_sql = format!("SELECT COUNT(*) {} {}", parts.from, where_sql);
    let total: i64 = conn
        .query_row(&count_sql, params_from_iter(params.iter().cloned()), |r| {
            r.get(0)
        })
        .map_err(ListError::db)?;

    let fetch_sql = format!(
        "{} {} {} {} LIMIT ? OFFSET ?",
        parts.select, parts.from, where_sql, parts.order_by
    );
    let mut fetch_params = params;
    fetch_params.push(Value::Integer(PAGE_SIZE));
    fetch_params.push(Value::Integer(PAGE_SIZE * (page - 1)));

    let mut stmt = conn.prepare(&fetch_sql).map_err(ListError::db)?;
    let items = stmt
        .query_map(params_from_iter(fetch_params), map_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(ListError::db)?;

    Ok((items, total))
}

/// Ungrouped scoped fetch for the grouped views: they cap per class at
/// render time instead of paginating, so the whole scoped set comes back.
pub fn fetch_all<T, F>(
    conn: &Connection,
    parts: &QueryParts,
    scope: &Scope,
    filter: &Filter,
    map_row: F,
) -> Result<Vec<T>, ListError>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let Some((where_sql, params)) = scope.to_where(filter) else {
        return Ok(Vec::new());
    };
    let sql = format!(
        "{} {} {} {}",
        parts.select, parts.from, where_sql, parts.order_by
    );
    let mut stmt = conn.prepare(&sql).map_err(ListError::db)?;
    stmt.query_map(params_from_iter(params), map_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(ListError::db)
}

pub fn page_json(items: Vec<serde_json::Value>, total_count: i64, page: i64) -> serde_json::Value {
    json!({
        "items": items,
        "totalCount": total_count,
        "page": page,
        "pageSize": PAGE_SIZE,
    })
}

pub fn grade_label(level: i64) -> String {
    if level == 0 {
        "Grade R".to_string()
    } else {
        format!("Grade {}", level)
    }
}

/// One fetched row of a "by grade" view, already scoped.
#[derive(Debug, Clone)]
pub struct GroupRow {
    pub grade_level: i64,
    pub class_name: String,
    pub item: serde_json::Value,
}

/// Groups assessments grade → class, ascending by numeric level (R
/// first). Per class the item list is capped at `GROUP_DISPLAY_CAP`;
/// `totalCount`/`moreCount` report the uncapped size.
pub fn group_by_grade(rows: Vec<GroupRow>) -> Vec<serde_json::Value> {
    let mut grades: BTreeMap<i64, BTreeMap<String, Vec<serde_json::Value>>> = BTreeMap::new();
    for row in rows {
        grades
            .entry(row.grade_level)
            .or_default()
            .entry(row.class_name)
            .or_default()
            .push(row.item);
    }

    grades
        .into_iter()
        .map(|(level, classes)| {
            let classes: Vec<serde_json::Value> = classes
                .into_iter()
                .map(|(class_name, mut items)| {
                    let total = items.len();
                    items.truncate(GROUP_DISPLAY_CAP);
                    json!({
                        "className": class_name,
                        "items": items,
                        "totalCount": total,
                        "moreCount": total.saturating_sub(GROUP_DISPLAY_CAP),
                    })
                })
                .collect();
            json!({
                "label": grade_label(level),
                "gradeLevel": level,
                "classes": classes,
            })
        })
        .collect()
}
