//! Reference-data creation: grades, subjects, teachers, parents,
//! lessons. Thin trusted-admin inserts; the desktop shell does the
//! authentication and only exposes these to administrators.

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_grades_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level = match req.params.get("level").and_then(|v| v.as_i64()) {
        Some(v) if v >= 0 => v,
        _ => return err(&req.id, "bad_params", "level must be an integer >= 0", None),
    };

    let grade_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO grades(id, level) VALUES(?, ?)",
        (&grade_id, level),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        );
    }
    ok(&req.id, json!({ "gradeId": grade_id, "level": level }))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    let subject_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, name) VALUES(?, ?)",
        (&subject_id, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        );
    }
    ok(&req.id, json!({ "subjectId": subject_id, "name": name }))
}

fn create_person(
    state: &mut AppState,
    req: &Request,
    table: &str,
    id_key: &str,
) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let first = match required_str(req, "firstName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let last = match required_str(req, "lastName") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let id = Uuid::new_v4().to_string();
    let sql = format!(
        "INSERT INTO {}(id, first_name, last_name) VALUES(?, ?, ?)",
        table
    );
    if let Err(e) = conn.execute(&sql, (&id, &first, &last)) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": table })),
        );
    }
    ok(&req.id, json!({ id_key: id }))
}

fn handle_lessons_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let lesson_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO lessons(id, subject_id, class_id, teacher_id) VALUES(?, ?, ?, ?)",
        (&lesson_id, &subject_id, &class_id, &teacher_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "lessons" })),
        );
    }
    ok(&req.id, json!({ "lessonId": lesson_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.create" => Some(handle_grades_create(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "teachers.create" => Some(create_person(state, req, "teachers", "teacherId")),
        "parents.create" => Some(create_person(state, req, "parents", "parentId")),
        "lessons.create" => Some(handle_lessons_create(state, req)),
        _ => None,
    }
}
