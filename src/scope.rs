//! Authorization scope composition.
//!
//! Every listing request carries `{role, userId}`. This module turns that
//! pair plus an entity kind into a `Scope`: a tagged predicate that is
//! AND-ed with caller filters and rendered into the single WHERE clause
//! shared by the count query and the windowed fetch.
//!
//! Fail closed: a missing role, an unknown role string, or a user-scoped
//! role without a user id composes `Scope::Nothing` (zero rows), never
//! admin visibility.
//!
//! The predicate SQL is written against the table aliases each listing
//! query uses (`ann`, `ev`, `asg` + `l`, `ex`, `r` + `st`, `rp` + `st`,
//! `c`). Those aliases are a contract with the handlers; subquery aliases
//! here are prefixed (`sl`, `ss`, ...) so they never collide.

use rusqlite::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Parent,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            "parent" => Some(Role::Parent),
            _ => None,
        }
    }
}

/// Explicit caller identity, passed into every composition call.
#[derive(Debug, Clone, Default)]
pub struct RoleContext {
    pub role: Option<Role>,
    pub user_id: Option<String>,
}

/// Entity kinds the daemon models. Only some of them have a declared
/// listing rule; composing a scope for the others is a programmer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Announcement,
    Event,
    Assignment,
    Exam,
    Result,
    Report,
    Class,
    Lesson,
    Student,
}

impl EntityKind {
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Announcement => "announcement",
            EntityKind::Event => "event",
            EntityKind::Assignment => "assignment",
            EntityKind::Exam => "exam",
            EntityKind::Result => "result",
            EntityKind::Report => "report",
            EntityKind::Class => "class",
            EntityKind::Lesson => "lesson",
            EntityKind::Student => "student",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    /// Unscoped (admin).
    All,
    /// Zero visibility (fail closed).
    Nothing,
    Where(Predicate),
}

/// AND-list of caller-supplied predicates. Multi-field search goes in as
/// one OR-combined clause via `any_of`, then intersects the rest.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Predicate>,
}

impl Filter {
    pub fn and(&mut self, p: Predicate) {
        self.clauses.push(p);
    }

    /// OR-combines field matches into a single clause. Empty input means
    /// "no constraint", not "match nothing".
    pub fn any_of(preds: Vec<Predicate>) -> Option<Predicate> {
        if preds.is_empty() {
            return None;
        }
        let sql = preds
            .iter()
            .map(|p| p.sql.as_str())
            .collect::<Vec<_>>()
            .join(" OR ");
        let params = preds.into_iter().flat_map(|p| p.params).collect();
        Some(Predicate::new(format!("({})", sql), params))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// No listing rule declared for this entity kind. Never reachable
    /// from user input: all user-facing methods map to declared kinds.
    Undeclared(&'static str),
}

impl std::fmt::Display for ScopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeError::Undeclared(kind) => {
                write!(f, "no listing scope declared for entity kind {:?}", kind)
            }
        }
    }
}

/// Roles whose visibility hangs off a user id.
#[derive(Debug, Clone, Copy)]
enum UserRole {
    Teacher,
    Student,
    Parent,
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

/// Rule for class-targeted broadcasts (announcements, events): a NULL
/// class target applies to everyone, otherwise visibility follows the
/// caller's relationship to the class.
fn broadcast_rule(col: &str, role: UserRole, uid: &str) -> Predicate {
    let sql = match role {
        UserRole::Teacher => format!(
            "({col} IS NULL OR EXISTS (SELECT 1 FROM lessons sl \
             WHERE sl.class_id = {col} AND sl.teacher_id = ?))"
        ),
        UserRole::Student => format!(
            "({col} IS NULL OR EXISTS (SELECT 1 FROM students ss \
             WHERE ss.class_id = {col} AND ss.id = ?))"
        ),
        UserRole::Parent => format!(
            "({col} IS NULL OR EXISTS (SELECT 1 FROM students ss \
             WHERE ss.class_id = {col} AND ss.parent_id = ?))"
        ),
    };
    Predicate::new(sql, vec![text(uid)])
}

/// Builds the scope predicate for one entity kind and caller context.
pub fn compose(kind: EntityKind, ctx: &RoleContext) -> Result<Scope, ScopeError> {
    match kind {
        EntityKind::Lesson | EntityKind::Student => {
            return Err(ScopeError::Undeclared(kind.name()))
        }
        _ => {}
    }

    let Some(role) = ctx.role else {
        return Ok(Scope::Nothing);
    };
    let role = match role {
        Role::Admin => return Ok(Scope::All),
        Role::Teacher => UserRole::Teacher,
        Role::Student => UserRole::Student,
        Role::Parent => UserRole::Parent,
    };
    let Some(uid) = ctx.user_id.as_deref() else {
        return Ok(Scope::Nothing);
    };

    let p = match (kind, role) {
        (EntityKind::Announcement, r) => broadcast_rule("ann.class_id", r, uid),
        (EntityKind::Event, r) => broadcast_rule("ev.class_id", r, uid),

        // Assignments are listed joined to their single lesson as `l`.
        (EntityKind::Assignment, UserRole::Teacher) => {
            Predicate::new("l.teacher_id = ?", vec![text(uid)])
        }
        (EntityKind::Assignment, UserRole::Student) => Predicate::new(
            "EXISTS (SELECT 1 FROM students ss \
             WHERE ss.class_id = l.class_id AND ss.id = ?)",
            vec![text(uid)],
        ),
        (EntityKind::Assignment, UserRole::Parent) => Predicate::new(
            "EXISTS (SELECT 1 FROM students ss \
             WHERE ss.class_id = l.class_id AND ss.parent_id = ?)",
            vec![text(uid)],
        ),

        // Exams reach their lessons through the exam_lessons link table.
        (EntityKind::Exam, UserRole::Teacher) => Predicate::new(
            "EXISTS (SELECT 1 FROM exam_lessons sel \
             JOIN lessons sl ON sl.id = sel.lesson_id \
             WHERE sel.exam_id = ex.id AND sl.teacher_id = ?)",
            vec![text(uid)],
        ),
        (EntityKind::Exam, UserRole::Student) => Predicate::new(
            "EXISTS (SELECT 1 FROM exam_lessons sel \
             JOIN lessons sl ON sl.id = sel.lesson_id \
             JOIN students ss ON ss.class_id = sl.class_id \
             WHERE sel.exam_id = ex.id AND ss.id = ?)",
            vec![text(uid)],
        ),
        (EntityKind::Exam, UserRole::Parent) => Predicate::new(
            "EXISTS (SELECT 1 FROM exam_lessons sel \
             JOIN lessons sl ON sl.id = sel.lesson_id \
             JOIN students ss ON ss.class_id = sl.class_id \
             WHERE sel.exam_id = ex.id AND ss.parent_id = ?)",
            vec![text(uid)],
        ),

        // Teacher visibility of a result is lifted through whichever
        // assessment side the row references, down to the lesson.
        (EntityKind::Result, UserRole::Teacher) => Predicate::new(
            "(EXISTS (SELECT 1 FROM exam_lessons sel \
              JOIN lessons sl ON sl.id = sel.lesson_id \
              WHERE sel.exam_id = r.exam_id AND sl.teacher_id = ?) \
              OR EXISTS (SELECT 1 FROM assignments sa \
              JOIN lessons sl ON sl.id = sa.lesson_id \
              WHERE sa.id = r.assignment_id AND sl.teacher_id = ?))",
            vec![text(uid), text(uid)],
        ),
        // Students and parents match the result row directly, no lift.
        (EntityKind::Result, UserRole::Student) => {
            Predicate::new("r.student_id = ?", vec![text(uid)])
        }
        (EntityKind::Result, UserRole::Parent) => {
            Predicate::new("st.parent_id = ?", vec![text(uid)])
        }

        (EntityKind::Report, UserRole::Teacher) => Predicate::new(
            "EXISTS (SELECT 1 FROM lessons sl \
             WHERE sl.subject_id = rp.subject_id AND sl.teacher_id = ?)",
            vec![text(uid)],
        ),
        (EntityKind::Report, UserRole::Student) => {
            Predicate::new("rp.student_id = ?", vec![text(uid)])
        }
        (EntityKind::Report, UserRole::Parent) => {
            Predicate::new("st.parent_id = ?", vec![text(uid)])
        }

        (EntityKind::Class, UserRole::Teacher) => Predicate::new(
            "EXISTS (SELECT 1 FROM lessons sl \
             WHERE sl.class_id = c.id AND sl.teacher_id = ?)",
            vec![text(uid)],
        ),
        (EntityKind::Class, UserRole::Student) => Predicate::new(
            "EXISTS (SELECT 1 FROM students ss \
             WHERE ss.class_id = c.id AND ss.id = ?)",
            vec![text(uid)],
        ),
        (EntityKind::Class, UserRole::Parent) => Predicate::new(
            "EXISTS (SELECT 1 FROM students ss \
             WHERE ss.class_id = c.id AND ss.parent_id = ?)",
            vec![text(uid)],
        ),

        (EntityKind::Lesson, _) | (EntityKind::Student, _) => unreachable!("rejected above"),
    };

    Ok(Scope::Where(p))
}

impl Scope {
    /// Renders `scope AND filter` as a WHERE clause plus bind params.
    /// `None` means zero visibility: skip both queries and return an
    /// empty page. An empty string means no WHERE clause at all.
    pub fn to_where(&self, filter: &Filter) -> Option<(String, Vec<Value>)> {
        let mut parts: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        match self {
            Scope::Nothing => return None,
            Scope::All => {}
            Scope::Where(p) => {
                parts.push(&p.sql);
                params.extend(p.params.iter().cloned());
            }
        }
        for clause in &filter.clauses {
            parts.push(&clause.sql);
            params.extend(clause.params.iter().cloned());
        }

        if parts.is_empty() {
            return Some((String::new(), params));
        }
        let sql = parts
            .iter()
            .map(|p| format!("({})", p))
            .collect::<Vec<_>>()
            .join(" AND ");
        Some((format!("WHERE {}", sql), params))
    }
}
