//! Shared param plumbing for handlers. Validation-shaped problems become
//! `bad_params` replies here; transport values that merely have the wrong
//! type for an optional filter are dropped, never hard-failed.

use rusqlite::types::Value;
use rusqlite::Connection;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::scope::{Filter, Predicate, Role, RoleContext};

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Required RFC 3339 timestamp, validated but stored as the given text.
pub fn required_timestamp(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    let raw = required_str(req, key)?;
    if let Err(e) = chrono::DateTime::parse_from_rfc3339(&raw) {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must be an RFC 3339 timestamp: {}", key, e),
            None,
        ));
    }
    Ok(raw)
}

pub fn opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .filter(|v| !v.is_empty())
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Caller identity for scope composition. An unknown role string is kept
/// as `None` so composition fails closed; that decision is logged once
/// here for operators chasing "why is my listing empty".
pub fn role_ctx(req: &Request) -> RoleContext {
    let raw_role = req.params.get("role").and_then(|v| v.as_str());
    let role = raw_role.and_then(Role::parse);
    if let Some(raw) = raw_role {
        if role.is_none() {
            tracing::debug!(method = %req.method, role = raw, "unknown role, scoping to nothing");
        }
    }
    RoleContext {
        role,
        user_id: opt_str(&req.params, "userId"),
    }
}

/// The caller's filter map; absent means no filters.
pub fn filters_of(req: &Request) -> serde_json::Value {
    req.params
        .get("filters")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}))
}

/// Trimmed, non-empty search term.
pub fn search_term(filters: &serde_json::Value) -> Option<String> {
    filters
        .get("search")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn like(needle: &str) -> Value {
    Value::Text(format!("%{}%", needle))
}

/// Adds `column = ?` when the filter map carries a string under `key`.
pub fn eq_text(filter: &mut Filter, filters: &serde_json::Value, key: &str, column: &str) {
    if let Some(v) = opt_str(filters, key) {
        filter.and(Predicate::new(format!("{} = ?", column), vec![Value::Text(v)]));
    }
}

/// Adds `column = ?` for a numeric filter. Numeric strings are accepted;
/// anything else is dropped.
pub fn eq_number(filter: &mut Filter, filters: &serde_json::Value, key: &str, column: &str) {
    let raw = filters.get(key);
    let n = raw
        .and_then(|v| v.as_i64())
        .or_else(|| raw.and_then(|v| v.as_str()).and_then(|s| s.parse().ok()));
    if let Some(n) = n {
        filter.and(Predicate::new(
            format!("{} = ?", column),
            vec![Value::Integer(n)],
        ));
    }
}
