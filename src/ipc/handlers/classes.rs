use crate::codec;
use crate::ipc::error::{err, list_err, ok};
use crate::ipc::helpers::{db_conn, eq_text, filters_of, like, required_str, role_ctx, search_term};
use crate::ipc::types::{AppState, Request};
use crate::listing::{self, QueryParts};
use crate::scope::{self, EntityKind, Filter, Predicate};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub(super) fn grade_level(
    conn: &Connection,
    req: &Request,
    grade_id: &str,
) -> Result<i64, serde_json::Value> {
    conn.query_row("SELECT level FROM grades WHERE id = ?", [grade_id], |r| {
        r.get(0)
    })
    .optional()
    .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?
    .ok_or_else(|| err(&req.id, "not_found", "grade not found", None))
}

pub(super) fn section_letter(req: &Request) -> Result<char, serde_json::Value> {
    let raw = required_str(req, "letter")?;
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if codec::is_section_letter(c) => Ok(c.to_ascii_uppercase()),
        _ => Err(err(
            &req.id,
            "bad_params",
            "letter must be a single character A..F",
            Some(json!({ "letter": raw })),
        )),
    }
}

/// Candidate classes of one grade, with live enrollment counts.
pub(super) fn classes_of_grade(
    conn: &Connection,
    grade_id: &str,
) -> Result<Vec<codec::ClassRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.capacity,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id)
         FROM classes c
         WHERE c.grade_id = ?",
    )?;
    let rows = stmt.query_map([grade_id], |r| {
        Ok(codec::ClassRecord {
            id: r.get(0)?,
            name: r.get(1)?,
            capacity: r.get(2)?,
            enrolled: r.get(3)?,
        })
    })?;
    rows.collect()
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade_id = match required_str(req, "gradeId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let letter = match section_letter(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let capacity = match req.params.get("capacity").and_then(|v| v.as_i64()) {
        Some(v) if v > 0 => v,
        _ => return err(&req.id, "bad_params", "capacity must be a positive integer", None),
    };
    let supervisor_id = req
        .params
        .get("supervisorId")
        .and_then(|v| v.as_str())
        .map(|v| v.to_string());

    let level = match grade_level(conn, req, &grade_id) {
        Ok(v) => v,
        Err(e) => return e,
    };

    // The name is derived exactly once, at creation, and must not collide.
    let name = codec::encode(level, letter);
    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE name = ?", [&name], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_some() {
        return err(
            &req.id,
            "duplicate_name",
            format!("a class named {} already exists", name),
            Some(json!({ "name": name })),
        );
    }

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, name, capacity, grade_id, supervisor_id) VALUES(?, ?, ?, ?, ?)",
        (&class_id, &name, capacity, &grade_id, &supervisor_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    ok(&req.id, json!({ "classId": class_id, "name": name }))
}

fn handle_classes_resolve_assignment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade_id = match required_str(req, "gradeId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let letter = match section_letter(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let for_new_student = req
        .params
        .get("forNewStudent")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let level = match grade_level(conn, req, &grade_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let candidates = match classes_of_grade(conn, &grade_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let name = codec::encode(level, letter);
    match codec::validate_assignable(level, letter, &candidates, for_new_student) {
        codec::Assignable::Found { class_id } => {
            ok(&req.id, json!({ "classId": class_id, "name": name }))
        }
        codec::Assignable::NotFound => err(
            &req.id,
            "not_found",
            format!("no class named {} exists for this grade", name),
            Some(json!({ "name": name })),
        ),
        codec::Assignable::CapacityFull { class_id } => err(
            &req.id,
            "capacity_full",
            format!("class {} is at capacity", name),
            Some(json!({ "classId": class_id, "name": name })),
        ),
    }
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = role_ctx(req);
    let scope = match scope::compose(EntityKind::Class, &ctx) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "configuration_error", e.to_string(), None),
    };

    let filters = filters_of(req);
    let mut filter = Filter::default();
    if let Some(term) = search_term(&filters) {
        filter.and(Predicate::new("c.name LIKE ?", vec![like(&term)]));
    }
    eq_text(&mut filter, &filters, "gradeId", "c.grade_id");
    eq_text(&mut filter, &filters, "supervisorId", "c.supervisor_id");
    let page = listing::page_from(&filters);

    let parts = QueryParts {
        select: "SELECT c.id, c.name, c.capacity, g.level,
           (SELECT COUNT(*) FROM students ss2 WHERE ss2.class_id = c.id),
           (SELECT t.first_name || ' ' || t.last_name FROM teachers t WHERE t.id = c.supervisor_id)",
        from: "FROM classes c JOIN grades g ON g.id = c.grade_id",
        order_by: "ORDER BY c.name, c.id",
    };

    let fetched = listing::fetch_page(conn, &parts, &scope, &filter, page, |r| {
        let id: String = r.get(0)?;
        let name: String = r.get(1)?;
        let capacity: i64 = r.get(2)?;
        let level: i64 = r.get(3)?;
        let enrolled: i64 = r.get(4)?;
        let supervisor: Option<String> = r.get(5)?;
        Ok((id, name, capacity, level, enrolled, supervisor))
    });
    let (rows, total) = match fetched {
        Ok(v) => v,
        Err(e) => return list_err(&req.id, e),
    };

    let items = rows
        .into_iter()
        .map(|(id, name, capacity, level, enrolled, supervisor)| {
            // Legacy or hand-edited names stay opaque labels; the decoded
            // breakdown is a bonus, never a failure.
            let decoded = match codec::decode(&name) {
                Ok(d) => json!({ "gradeLevel": d.grade_level, "letter": d.letter.to_string() }),
                Err(_) => serde_json::Value::Null,
            };
            json!({
                "id": id,
                "name": name,
                "capacity": capacity,
                "gradeLevel": level,
                "enrolled": enrolled,
                "supervisorName": supervisor,
                "decoded": decoded,
            })
        })
        .collect();

    ok(&req.id, listing::page_json(items, total, page))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.resolveAssignment" => Some(handle_classes_resolve_assignment(state, req)),
        _ => None,
    }
}
