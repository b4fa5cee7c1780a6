use crate::codec;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

use super::classes::{classes_of_grade, grade_level, section_letter};

/// New-student enrollment goes through the codec: the chosen grade +
/// letter must resolve to an existing class with room left. This is the
/// one flow where capacity gates the class lookup.
fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let grade_id = match required_str(req, "gradeId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let letter = match section_letter(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let parent_id = opt_str(&req.params, "parentId");

    let level = match grade_level(conn, req, &grade_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let candidates = match classes_of_grade(conn, &grade_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let class_id = match codec::validate_assignable(level, letter, &candidates, true) {
        codec::Assignable::Found { class_id } => class_id,
        codec::Assignable::NotFound => {
            return err(
                &req.id,
                "not_found",
                format!(
                    "no class named {} exists for this grade",
                    codec::encode(level, letter)
                ),
                None,
            )
        }
        codec::Assignable::CapacityFull { class_id } => {
            return err(
                &req.id,
                "capacity_full",
                format!("class {} is at capacity", codec::encode(level, letter)),
                Some(json!({ "classId": class_id })),
            )
        }
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, first_name, last_name, class_id, parent_id) VALUES(?, ?, ?, ?, ?)",
        (&student_id, &first, &last, &class_id, &parent_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(
        &req.id,
        json!({ "studentId": student_id, "classId": class_id }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        _ => None,
    }
}
