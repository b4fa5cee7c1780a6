//! Polymorphic result resolution.
//!
//! A stored result row references exactly one of an exam or an
//! assignment. The listing query fetches both sides (LEFT JOINs plus the
//! representative-teacher subqueries) in one pass; this module then
//! collapses a fully fetched record into the flat projection the shell
//! renders. Pure functions only: issuing per-row queries during
//! resolution is forbidden, page sizes reach hundreds of rows.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonName {
    pub first: String,
    pub last: String,
}

/// One assessment side of a result, as fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentFields {
    pub title: String,
    /// Exam start time or assignment start date.
    pub occurred_at: String,
    /// Representative teacher. For an exam this is the teacher of the
    /// first linked lesson; an exam spanning several lessons still shows
    /// a single teacher (known limitation, kept deliberately).
    pub teacher: Option<PersonName>,
}

/// Tagged assessment reference. Constructing one is the only place the
/// "neither side populated" state can surface, and it surfaces as `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    Exam(AssessmentFields),
    Assignment(AssessmentFields),
}

impl Assessment {
    /// Collapses the two fetched sides. Exam wins if a corrupt row
    /// somehow carries both; `None` marks the row malformed.
    pub fn from_parts(
        exam: Option<AssessmentFields>,
        assignment: Option<AssessmentFields>,
    ) -> Option<Assessment> {
        match (exam, assignment) {
            (Some(e), _) => Some(Assessment::Exam(e)),
            (None, Some(a)) => Some(Assessment::Assignment(a)),
            (None, None) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Assessment::Exam(_) => "exam",
            Assessment::Assignment(_) => "assignment",
        }
    }
}

/// A fully joined result row, before resolution.
#[derive(Debug, Clone)]
pub struct ResultRecord {
    pub id: String,
    pub score: f64,
    pub student: PersonName,
    /// The student's own class, not the lesson's: grouping and display
    /// are authoritative per student.
    pub class_name: String,
    pub assessment: Option<Assessment>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedResult {
    pub id: String,
    pub title: String,
    pub assessment_kind: &'static str,
    pub student_name: String,
    pub student_surname: String,
    pub teacher_name: Option<String>,
    pub teacher_surname: Option<String>,
    pub score: f64,
    pub class_name: String,
    pub occurred_at: String,
}

/// `None` = malformed record: the caller drops it from the page items
/// (never the whole page) and logs it for operator visibility.
pub fn resolve(rec: ResultRecord) -> Option<ResolvedResult> {
    let assessment = rec.assessment?;
    let kind = assessment.kind();
    let fields = match assessment {
        Assessment::Exam(f) | Assessment::Assignment(f) => f,
    };
    let (teacher_name, teacher_surname) = match fields.teacher {
        Some(t) => (Some(t.first), Some(t.last)),
        None => (None, None),
    };
    Some(ResolvedResult {
        id: rec.id,
        title: fields.title,
        assessment_kind: kind,
        student_name: rec.student.first,
        student_surname: rec.student.last,
        teacher_name,
        teacher_surname,
        score: rec.score,
        class_name: rec.class_name,
        occurred_at: fields.occurred_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(first: &str, last: &str) -> PersonName {
        PersonName {
            first: first.into(),
            last: last.into(),
        }
    }

    fn record(assessment: Option<Assessment>) -> ResultRecord {
        ResultRecord {
            id: "res-1".into(),
            score: 87.0,
            student: name("Thandi", "Mokoena"),
            class_name: "10A".into(),
            assessment,
        }
    }

    #[test]
    fn assignment_variant_resolves_from_assignment_fields() {
        let resolved = resolve(record(Some(Assessment::Assignment(AssessmentFields {
            title: "Essay 2".into(),
            occurred_at: "2026-02-03T08:00:00Z".into(),
            teacher: Some(name("Peter", "Abrahams")),
        }))))
        .unwrap();
        assert_eq!(resolved.title, "Essay 2");
        assert_eq!(resolved.assessment_kind, "assignment");
        assert_eq!(resolved.occurred_at, "2026-02-03T08:00:00Z");
        assert_eq!(resolved.teacher_surname.as_deref(), Some("Abrahams"));
        assert_eq!(resolved.class_name, "10A");
    }

    #[test]
    fn exam_wins_when_both_sides_are_populated() {
        let a = Assessment::from_parts(
            Some(AssessmentFields {
                title: "Midterm".into(),
                occurred_at: "2026-03-01T09:00:00Z".into(),
                teacher: None,
            }),
            Some(AssessmentFields {
                title: "Essay".into(),
                occurred_at: "2026-02-01T09:00:00Z".into(),
                teacher: None,
            }),
        )
        .unwrap();
        assert_eq!(a.kind(), "exam");
    }

    #[test]
    fn record_with_neither_side_is_dropped() {
        assert_eq!(Assessment::from_parts(None, None), None);
        assert_eq!(resolve(record(None)), None);
    }

    #[test]
    fn missing_representative_teacher_resolves_with_null_names() {
        let resolved = resolve(record(Some(Assessment::Exam(AssessmentFields {
            title: "Finals".into(),
            occurred_at: "2026-06-01T09:00:00Z".into(),
            teacher: None,
        }))))
        .unwrap();
        assert_eq!(resolved.teacher_name, None);
        assert_eq!(resolved.teacher_surname, None);
    }
}
