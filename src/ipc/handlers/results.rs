//! Result creation and the resolved result listing. The listing fetches
//! everything resolution needs in one joined query (hundreds of rows per
//! page are possible, so no per-row follow-ups), then runs the pure
//! resolver over each record.
//!
//! Accounting policy, applied everywhere: `totalCount` counts all scoped
//! rows; malformed records are dropped from `items` only and logged.

use crate::ipc::error::{err, list_err, ok};
use crate::ipc::helpers::{db_conn, eq_text, filters_of, like, opt_str, required_str, role_ctx, search_term};
use crate::ipc::types::{AppState, Request};
use crate::listing::{self, QueryParts};
use crate::resolve::{self, Assessment, AssessmentFields, PersonName, ResultRecord};
use crate::scope::{self, EntityKind, Filter, Predicate};
use serde_json::json;
use uuid::Uuid;

fn handle_results_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(score) = req.params.get("score").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing score", None);
    };
    let exam_id = opt_str(&req.params, "examId");
    let assignment_id = opt_str(&req.params, "assignmentId");

    // The variant is fixed at creation: exactly one reference.
    if exam_id.is_some() == assignment_id.is_some() {
        return err(
            &req.id,
            "bad_params",
            "exactly one of examId and assignmentId must be set",
            None,
        );
    }

    let result_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO results(id, student_id, score, exam_id, assignment_id) VALUES(?, ?, ?, ?, ?)",
        (&result_id, &student_id, score, &exam_id, &assignment_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "results" })),
        );
    }
    ok(&req.id, json!({ "resultId": result_id }))
}

fn handle_results_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = role_ctx(req);
    let scope = match scope::compose(EntityKind::Result, &ctx) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "configuration_error", e.to_string(), None),
    };

    let filters = filters_of(req);
    let mut filter = Filter::default();
    if let Some(term) = search_term(&filters) {
        if let Some(p) = Filter::any_of(vec![
            Predicate::new("COALESCE(ex.title, asg.title) LIKE ?", vec![like(&term)]),
            Predicate::new("st.first_name LIKE ?", vec![like(&term)]),
        ]) {
            filter.and(p);
        }
    }
    eq_text(&mut filter, &filters, "studentId", "r.student_id");
    let page = listing::page_from(&filters);

    let parts = QueryParts {
        select: "SELECT r.id, r.score, st.first_name, st.last_name, c.name,
           ex.title, ex.start_time,
           (SELECT te.first_name FROM exam_lessons el
              JOIN lessons l ON l.id = el.lesson_id
              JOIN teachers te ON te.id = l.teacher_id
              WHERE el.exam_id = ex.id ORDER BY el.sort_order LIMIT 1),
           (SELECT te.last_name FROM exam_lessons el
              JOIN lessons l ON l.id = el.lesson_id
              JOIN teachers te ON te.id = l.teacher_id
              WHERE el.exam_id = ex.id ORDER BY el.sort_order LIMIT 1),
           asg.title, asg.start_date, ta.first_name, ta.last_name",
        from: "FROM results r
           JOIN students st ON st.id = r.student_id
           JOIN classes c ON c.id = st.class_id
           LEFT JOIN exams ex ON ex.id = r.exam_id
           LEFT JOIN assignments asg ON asg.id = r.assignment_id
           LEFT JOIN lessons al ON al.id = asg.lesson_id
           LEFT JOIN teachers ta ON ta.id = al.teacher_id",
        order_by: "ORDER BY COALESCE(ex.start_time, asg.start_date) DESC, r.id",
    };

    let fetched = listing::fetch_page(conn, &parts, &scope, &filter, page, |r| {
        let exam_title: Option<String> = r.get(5)?;
        let exam_start: Option<String> = r.get(6)?;
        let exam_teacher_first: Option<String> = r.get(7)?;
        let exam_teacher_last: Option<String> = r.get(8)?;
        let asg_title: Option<String> = r.get(9)?;
        let asg_start: Option<String> = r.get(10)?;
        let asg_teacher_first: Option<String> = r.get(11)?;
        let asg_teacher_last: Option<String> = r.get(12)?;

        let exam = match (exam_title, exam_start) {
            (Some(title), Some(occurred_at)) => Some(AssessmentFields {
                title,
                occurred_at,
                teacher: match (exam_teacher_first, exam_teacher_last) {
                    (Some(first), Some(last)) => Some(PersonName { first, last }),
                    _ => None,
                },
            }),
            _ => None,
        };
        let assignment = match (asg_title, asg_start) {
            (Some(title), Some(occurred_at)) => Some(AssessmentFields {
                title,
                occurred_at,
                teacher: match (asg_teacher_first, asg_teacher_last) {
                    (Some(first), Some(last)) => Some(PersonName { first, last }),
                    _ => None,
                },
            }),
            _ => None,
        };

        Ok(ResultRecord {
            id: r.get(0)?,
            score: r.get(1)?,
            student: PersonName {
                first: r.get(2)?,
                last: r.get(3)?,
            },
            class_name: r.get(4)?,
            assessment: Assessment::from_parts(exam, assignment),
        })
    });
    let (records, total) = match fetched {
        Ok(v) => v,
        Err(e) => return list_err(&req.id, e),
    };

    let mut items = Vec::with_capacity(records.len());
    for record in records {
        let record_id = record.id.clone();
        match resolve::resolve(record) {
            Some(resolved) => items.push(json!(resolved)),
            None => {
                tracing::warn!(result = %record_id, "skipping malformed result record (no assessment reference)");
            }
        }
    }

    ok(&req.id, listing::page_json(items, total, page))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.create" => Some(handle_results_create(state, req)),
        "results.list" => Some(handle_results_list(state, req)),
        _ => None,
    }
}
