//! Announcements and calendar events. Both are class-targeted
//! broadcasts: a NULL class id means "applies to everyone", and the
//! scope rules treat it that way.

use crate::ipc::error::{err, list_err, ok};
use crate::ipc::helpers::{
    db_conn, eq_text, filters_of, like, opt_str, required_str, required_timestamp, role_ctx,
    search_term,
};
use crate::ipc::types::{AppState, Request};
use crate::listing::{self, QueryParts};
use crate::scope::{self, EntityKind, Filter, Predicate};
use serde_json::json;
use uuid::Uuid;

fn handle_announcements_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let description = match required_str(req, "description") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let date = match required_timestamp(req, "date") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = opt_str(&req.params, "classId");

    let announcement_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO announcements(id, title, description, date, class_id) VALUES(?, ?, ?, ?, ?)",
        (&announcement_id, &title, &description, &date, &class_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "announcements" })),
        );
    }
    ok(&req.id, json!({ "announcementId": announcement_id }))
}

fn handle_events_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let description = match required_str(req, "description") {
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
    let class_id = opt_str(&req.params, "classId");

    let event_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO events(id, title, description, start_time, end_time, class_id)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&event_id, &title, &description, &start_time, &end_time, &class_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "events" })),
        );
    }
    ok(&req.id, json!({ "eventId": event_id }))
}

fn handle_announcements_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = role_ctx(req);
    let scope = match scope::compose(EntityKind::Announcement, &ctx) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "configuration_error", e.to_string(), None),
    };

    let filters = filters_of(req);
    let mut filter = Filter::default();
    if let Some(term) = search_term(&filters) {
        filter.and(Predicate::new("ann.title LIKE ?", vec![like(&term)]));
    }
    eq_text(&mut filter, &filters, "classId", "ann.class_id");
    let page = listing::page_from(&filters);

    let parts = QueryParts {
        select: "SELECT ann.id, ann.title, ann.description, ann.date, ann.class_id,
           (SELECT c.name FROM classes c WHERE c.id = ann.class_id)",
        from: "FROM announcements ann",
        order_by: "ORDER BY ann.date DESC, ann.id",
    };

    let fetched = listing::fetch_page(conn, &parts, &scope, &filter, page, |r| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "title": r.get::<_, String>(1)?,
            "description": r.get::<_, String>(2)?,
            "date": r.get::<_, String>(3)?,
            "classId": r.get::<_, Option<String>>(4)?,
            "className": r.get::<_, Option<String>>(5)?,
        }))
    });
    match fetched {
        Ok((items, total)) => ok(&req.id, listing::page_json(items, total, page)),
        Err(e) => list_err(&req.id, e),
    }
}

fn handle_events_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ctx = role_ctx(req);
    let scope = match scope::compose(EntityKind::Event, &ctx) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "configuration_error", e.to_string(), None),
    };

    let filters = filters_of(req);
    let mut filter = Filter::default();
    if let Some(term) = search_term(&filters) {
        filter.and(Predicate::new("ev.title LIKE ?", vec![like(&term)]));
    }
    eq_text(&mut filter, &filters, "classId", "ev.class_id");
    let page = listing::page_from(&filters);

    let parts = QueryParts {
        select: "SELECT ev.id, ev.title, ev.description, ev.start_time, ev.end_time, ev.class_id,
           (SELECT c.name FROM classes c WHERE c.id = ev.class_id)",
        from: "FROM events ev",
        order_by: "ORDER BY ev.start_time DESC, ev.id",
    };

    let fetched = listing::fetch_page(conn, &parts, &scope, &filter, page, |r| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "title": r.get::<_, String>(1)?,
            "description": r.get::<_, String>(2)?,
            "startTime": r.get::<_, String>(3)?,
            "endTime": r.get::<_, String>(4)?,
            "classId": r.get::<_, Option<String>>(5)?,
            "className": r.get::<_, Option<String>>(6)?,
        }))
    });
    match fetched {
        Ok((items, total)) => ok(&req.id, listing::page_json(items, total, page)),
        Err(e) => list_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "announcements.create" => Some(handle_announcements_create(state, req)),
        "announcements.list" => Some(handle_announcements_list(state, req)),
        "events.create" => Some(handle_events_create(state, req)),
        "events.list" => Some(handle_events_list(state, req)),
        _ => None,
    }
}
