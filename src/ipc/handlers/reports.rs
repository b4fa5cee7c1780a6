use crate::ipc::error::{err, list_err, ok};
use crate::ipc::helpers::{
    db_conn, eq_number, eq_text, filters_of, like, opt_str, required_str, role_ctx, search_term,
};
use crate::ipc::types::{AppState, Request};
use crate::listing::{self, QueryParts};
use crate::scope::{self, EntityKind, Filter, Predicate};
use serde_json::json;
use uuid::Uuid;

fn handle_reports_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match req.params.get("term").and_then(|v| v.as_i64()) {
        Some(v) if v >= 1 => v,
        _ => return err(&req.id, "bad_params", "term must be an integer >= 1", None),
    };
    let year = match req.params.get("year").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing year", None),
    };
    let Some(marks) = req.params.get("marks").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing marks", None);
    };
    let grade_letter = match required_str(req, "gradeLetter") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_comment = opt_str(&req.params, "teacherComment");

    let report_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO reports(id, student_id, subject_id, term, year, marks, grade_letter, teacher_comment)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &report_id,
            &student_id,
            &subject_id,
            term,
            year,
            marks,
            &grade_letter,
            &teacher_comment,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "reports" })),
        );
    }
    ok(&req.id, json!({ "reportId": report_id }))
}

fn handle_reports_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = role_ctx(req);
    let scope = match scope::compose(EntityKind::Report, &ctx) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "configuration_error", e.to_string(), None),
    };

    let filters = filters_of(req);
    let mut filter = Filter::default();
    if let Some(term) = search_term(&filters) {
        if let Some(p) = Filter::any_of(vec![
            Predicate::new("st.first_name LIKE ?", vec![like(&term)]),
            Predicate::new("sub.name LIKE ?", vec![like(&term)]),
        ]) {
            filter.and(p);
        }
    }
    // Term is numeric on the wire; junk values are dropped, not fatal.
    eq_number(&mut filter, &filters, "term", "rp.term");
    eq_text(&mut filter, &filters, "studentId", "rp.student_id");
    let page = listing::page_from(&filters);

    let parts = QueryParts {
        select: "SELECT rp.id, rp.term, rp.year, rp.marks, rp.grade_letter, rp.teacher_comment,
           st.first_name, st.last_name, sub.name",
        from: "FROM reports rp
           JOIN students st ON st.id = rp.student_id
           JOIN subjects sub ON sub.id = rp.subject_id",
        order_by: "ORDER BY rp.year DESC, rp.term DESC, rp.id",
    };

    let fetched = listing::fetch_page(conn, &parts, &scope, &filter, page, |r| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "term": r.get::<_, i64>(1)?,
            "year": r.get::<_, i64>(2)?,
            "marks": r.get::<_, f64>(3)?,
            "gradeLetter": r.get::<_, String>(4)?,
            "teacherComment": r.get::<_, Option<String>>(5)?,
            "studentName": r.get::<_, String>(6)?,
            "studentSurname": r.get::<_, String>(7)?,
            "subjectName": r.get::<_, String>(8)?,
        }))
    });
    match fetched {
        Ok((items, total)) => ok(&req.id, listing::page_json(items, total, page)),
        Err(e) => list_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.create" => Some(handle_reports_create(state, req)),
        "reports.list" => Some(handle_reports_list(state, req)),
        _ => None,
    }
}
