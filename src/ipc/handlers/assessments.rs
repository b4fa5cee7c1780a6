//! Exams and assignments: creation plus the scoped listings and the
//! grouped "by grade" views. An assignment hangs off a single lesson; an
//! exam links to one or more lessons through exam_lessons, and its
//! display columns come from the first link by sort_order.

use crate::ipc::error::{err, list_err, ok};
use crate::ipc::helpers::{
    db_conn, eq_text, filters_of, like, required_str, required_timestamp, role_ctx, search_term,
};
use crate::ipc::types::{AppState, Request};
use crate::listing::{self, GroupRow, QueryParts};
use crate::scope::{self, EntityKind, Filter, Predicate};
use serde_json::json;
use uuid::Uuid;

fn handle_exams_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let start_time = match required_timestamp(req, "startTime") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let end_time = match required_timestamp(req, "endTime") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let lesson_ids: Vec<String> = match req.params.get("lessonIds").and_then(|v| v.as_array()) {
        Some(arr) => arr
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect(),
        None => Vec::new(),
    };
    if lesson_ids.is_empty() {
        return err(&req.id, "bad_params", "lessonIds must name at least one lesson", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let exam_id = Uuid::new_v4().to_string();
    if let Err(e) = tx.execute(
        "INSERT INTO exams(id, title, start_time, end_time) VALUES(?, ?, ?, ?)",
        (&exam_id, &title, &start_time, &end_time),
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "exams" })),
        );
    }
    for (i, lesson_id) in lesson_ids.iter().enumerate() {
        if let Err(e) = tx.execute(
            "INSERT INTO exam_lessons(exam_id, lesson_id, sort_order) VALUES(?, ?, ?)",
            (&exam_id, lesson_id, i as i64),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "exam_lessons" })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "examId": exam_id }))
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let start_date = match required_timestamp(req, "startDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let due_date = match required_timestamp(req, "dueDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let assignment_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO assignments(id, title, start_date, due_date, lesson_id) VALUES(?, ?, ?, ?, ?)",
        (&assignment_id, &title, &start_date, &due_date, &lesson_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }
    ok(&req.id, json!({ "assignmentId": assignment_id }))
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = role_ctx(req);
    let scope = match scope::compose(EntityKind::Assignment, &ctx) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "configuration_error", e.to_string(), None),
    };

    let filters = filters_of(req);
    let mut filter = Filter::default();
    if let Some(term) = search_term(&filters) {
        if let Some(p) = Filter::any_of(vec![
            Predicate::new("asg.title LIKE ?", vec![like(&term)]),
            Predicate::new("sub.name LIKE ?", vec![like(&term)]),
        ]) {
            filter.and(p);
        }
    }
    eq_text(&mut filter, &filters, "classId", "l.class_id");
    eq_text(&mut filter, &filters, "teacherId", "l.teacher_id");
    let page = listing::page_from(&filters);

    let parts = QueryParts {
        select: "SELECT asg.id, asg.title, asg.start_date, asg.due_date,
           sub.name, c.name, t.first_name, t.last_name",
        from: "FROM assignments asg
           JOIN lessons l ON l.id = asg.lesson_id
           JOIN subjects sub ON sub.id = l.subject_id
           JOIN classes c ON c.id = l.class_id
           JOIN teachers t ON t.id = l.teacher_id",
        order_by: "ORDER BY asg.due_date DESC, asg.id",
    };

    let fetched = listing::fetch_page(conn, &parts, &scope, &filter, page, |r| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "title": r.get::<_, String>(1)?,
            "startDate": r.get::<_, String>(2)?,
            "dueDate": r.get::<_, String>(3)?,
            "subjectName": r.get::<_, String>(4)?,
            "className": r.get::<_, String>(5)?,
            "teacherName": r.get::<_, String>(6)?,
            "teacherSurname": r.get::<_, String>(7)?,
        }))
    });
    match fetched {
        Ok((items, total)) => ok(&req.id, listing::page_json(items, total, page)),
        Err(e) => list_err(&req.id, e),
    }
}

// First linked lesson wins for an exam's display columns; the link table
// carries sort_order so "first" is stable.
const EXAM_FIRST_SUBJECT: &str = "(SELECT sb.name FROM exam_lessons el
     JOIN lessons l ON l.id = el.lesson_id
     JOIN subjects sb ON sb.id = l.subject_id
     WHERE el.exam_id = ex.id ORDER BY el.sort_order LIMIT 1)";
const EXAM_FIRST_CLASS: &str = "(SELECT c.name FROM exam_lessons el
     JOIN lessons l ON l.id = el.lesson_id
     JOIN classes c ON c.id = l.class_id
     WHERE el.exam_id = ex.id ORDER BY el.sort_order LIMIT 1)";
const EXAM_FIRST_TEACHER: &str = "(SELECT t.first_name || ' ' || t.last_name FROM exam_lessons el
     JOIN lessons l ON l.id = el.lesson_id
     JOIN teachers t ON t.id = l.teacher_id
     WHERE el.exam_id = ex.id ORDER BY el.sort_order LIMIT 1)";

fn exam_filter(req: &Request) -> (Filter, i64) {
    let filters = filters_of(req);
    let mut filter = Filter::default();
    // Search matches the subject of any linked lesson, not just the
    // first: the first link only decides display columns.
    if let Some(term) = search_term(&filters) {
        if let Some(p) = Filter::any_of(vec![
            Predicate::new("ex.title LIKE ?", vec![like(&term)]),
            Predicate::new(
                "EXISTS (SELECT 1 FROM exam_lessons fel
                 JOIN lessons fl ON fl.id = fel.lesson_id
                 JOIN subjects fs ON fs.id = fl.subject_id
                 WHERE fel.exam_id = ex.id AND fs.name LIKE ?)",
                vec![like(&term)],
            ),
        ]) {
            filter.and(p);
        }
    }
    if let Some(class_id) = filters.get("classId").and_then(|v| v.as_str()) {
        filter.and(Predicate::new(
            "EXISTS (SELECT 1 FROM exam_lessons fel
             JOIN lessons fl ON fl.id = fel.lesson_id
             WHERE fel.exam_id = ex.id AND fl.class_id = ?)",
            vec![rusqlite::types::Value::Text(class_id.to_string())],
        ));
    }
    if let Some(teacher_id) = filters.get("teacherId").and_then(|v| v.as_str()) {
        filter.and(Predicate::new(
            "EXISTS (SELECT 1 FROM exam_lessons fel
             JOIN lessons fl ON fl.id = fel.lesson_id
             WHERE fel.exam_id = ex.id AND fl.teacher_id = ?)",
            vec![rusqlite::types::Value::Text(teacher_id.to_string())],
        ));
    }
    let page = listing::page_from(&filters);
    (filter, page)
}

fn handle_exams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = role_ctx(req);
    let scope = match scope::compose(EntityKind::Exam, &ctx) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "configuration_error", e.to_string(), None),
    };
    let (filter, page) = exam_filter(req);

    let select = format!(
        "SELECT ex.id, ex.title, ex.start_time, ex.end_time, {}, {}, {}",
        EXAM_FIRST_SUBJECT, EXAM_FIRST_CLASS, EXAM_FIRST_TEACHER
    );
    let parts = QueryParts {
        select: &select,
        from: "FROM exams ex",
        order_by: "ORDER BY ex.start_time DESC, ex.id",
    };

    let fetched = listing::fetch_page(conn, &parts, &scope, &filter, page, |r| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "title": r.get::<_, String>(1)?,
            "startTime": r.get::<_, String>(2)?,
            "endTime": r.get::<_, String>(3)?,
            "subjectName": r.get::<_, Option<String>>(4)?,
            "className": r.get::<_, Option<String>>(5)?,
            "teacherName": r.get::<_, Option<String>>(6)?,
        }))
    });
    match fetched {
        Ok((items, total)) => ok(&req.id, listing::page_json(items, total, page)),
        Err(e) => list_err(&req.id, e),
    }
}

fn handle_assignments_by_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = role_ctx(req);
    let scope = match scope::compose(EntityKind::Assignment, &ctx) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "configuration_error", e.to_string(), None),
    };

    let parts = QueryParts {
        select: "SELECT g.level, c.name, asg.id, asg.title, asg.due_date",
        from: "FROM assignments asg
           JOIN lessons l ON l.id = asg.lesson_id
           JOIN classes c ON c.id = l.class_id
           JOIN grades g ON g.id = c.grade_id",
        order_by: "ORDER BY g.level, c.name, asg.due_date DESC, asg.id",
    };
    let rows = listing::fetch_all(conn, &parts, &scope, &Filter::default(), |r| {
        Ok(GroupRow {
            grade_level: r.get(0)?,
            class_name: r.get(1)?,
            item: json!({
                "id": r.get::<_, String>(2)?,
                "title": r.get::<_, String>(3)?,
                "dueDate": r.get::<_, String>(4)?,
            }),
        })
    });
    match rows {
        Ok(rows) => ok(&req.id, json!({ "groups": listing::group_by_grade(rows) })),
        Err(e) => list_err(&req.id, e),
    }
}

fn handle_exams_by_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = role_ctx(req);
    let scope = match scope::compose(EntityKind::Exam, &ctx) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "configuration_error", e.to_string(), None),
    };

    let select = format!(
        "SELECT (SELECT g.level FROM exam_lessons el
             JOIN lessons l ON l.id = el.lesson_id
             JOIN classes c ON c.id = l.class_id
             JOIN grades g ON g.id = c.grade_id
             WHERE el.exam_id = ex.id ORDER BY el.sort_order LIMIT 1),
           {}, ex.id, ex.title, ex.start_time",
        EXAM_FIRST_CLASS
    );
    let parts = QueryParts {
        select: &select,
        from: "FROM exams ex",
        order_by: "ORDER BY ex.start_time DESC, ex.id",
    };
    let rows = listing::fetch_all(conn, &parts, &scope, &Filter::default(), |r| {
        let level: Option<i64> = r.get(0)?;
        let class_name: Option<String> = r.get(1)?;
        let item = json!({
            "id": r.get::<_, String>(2)?,
            "title": r.get::<_, String>(3)?,
            "startTime": r.get::<_, String>(4)?,
        });
        Ok((level, class_name, item))
    });
    let rows = match rows {
        Ok(v) => v,
        Err(e) => return list_err(&req.id, e),
    };

    let mut grouped = Vec::with_capacity(rows.len());
    for (level, class_name, item) in rows {
        // An exam with no lesson links has no class to group under.
        let (Some(grade_level), Some(class_name)) = (level, class_name) else {
            tracing::debug!(exam = %item["id"], "exam has no lesson links, left out of grouping");
            continue;
        };
        grouped.push(GroupRow {
            grade_level,
            class_name,
            item,
        });
    }
    ok(&req.id, json!({ "groups": listing::group_by_grade(grouped) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.create" => Some(handle_exams_create(state, req)),
        "exams.list" => Some(handle_exams_list(state, req)),
        "exams.byGrade" => Some(handle_exams_by_grade(state, req)),
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.byGrade" => Some(handle_assignments_by_grade(state, req)),
        _ => None,
    }
}
