use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One request line from the shell: `{id, method, params}`. The id is
/// opaque and echoed back verbatim so the shell can match responses.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Daemon state across requests. Both fields stay empty until a
/// `workspace.select` opens a campus workspace; every data method
/// requires the connection and replies `no_workspace` without it.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
