use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_workspace(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp workspace");
    p
}

struct Daemon {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    seq: u64,
}

impl Daemon {
    fn spawn() -> Daemon {
        let exe = env!("CARGO_BIN_EXE_campusd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn campusd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = BufReader::new(child.stdout.take().expect("child stdout"));
        Daemon {
            child,
            stdin,
            stdout,
            seq: 0,
        }
    }

    fn call(&mut self, method: &str, params: Value) -> Value {
        self.seq += 1;
        let id = format!("t{}", self.seq);
        let payload = json!({ "id": id, "method": method, "params": params });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.stdout.read_line(&mut line).expect("read response");
        let resp: Value = serde_json::from_str(line.trim()).expect("parse response");
        assert_eq!(resp.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            resp
        );
        resp["result"].clone()
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn id_of(v: &Value, key: &str) -> String {
    v[key].as_str().expect(key).to_string()
}

struct School {
    class_a: String,
    class_b: String,
    teacher_1: String,
    teacher_2: String,
    student_1: String,
    student_2: String,
    parent_1: String,
}

/// Two teachers with one lesson each in different classes, one student
/// per class, results per student. Teacher 1 has 2 assignments, teacher
/// 2 has 3.
fn seed(d: &mut Daemon) -> School {
    let grade = id_of(&d.call("grades.create", json!({ "level": 7 })), "gradeId");
    let class_a = id_of(
        &d.call(
            "classes.create",
            json!({ "gradeId": grade, "letter": "A", "capacity": 40 }),
        ),
        "classId",
    );
    let class_b = id_of(
        &d.call(
            "classes.create",
            json!({ "gradeId": grade, "letter": "B", "capacity": 40 }),
        ),
        "classId",
    );
    let subject = id_of(&d.call("subjects.create", json!({ "name": "English" })), "subjectId");
    let teacher_1 = id_of(
        &d.call(
            "teachers.create",
            json!({ "firstName": "Alice", "lastName": "Marais" }),
        ),
        "teacherId",
    );
    let teacher_2 = id_of(
        &d.call(
            "teachers.create",
            json!({ "firstName": "Ben", "lastName": "Khumalo" }),
        ),
        "teacherId",
    );
    let parent_1 = id_of(
        &d.call(
            "parents.create",
            json!({ "firstName": "Grace", "lastName": "Ndlovu" }),
        ),
        "parentId",
    );
    let student_1 = id_of(
        &d.call(
            "students.create",
            json!({
                "firstName": "Sam",
                "lastName": "Ndlovu",
                "gradeId": grade,
                "letter": "A",
                "parentId": parent_1,
            }),
        ),
        "studentId",
    );
    let student_2 = id_of(
        &d.call(
            "students.create",
            json!({ "firstName": "Lindi", "lastName": "Botha", "gradeId": grade, "letter": "B" }),
        ),
        "studentId",
    );
    let lesson_1 = id_of(
        &d.call(
            "lessons.create",
            json!({ "subjectId": subject, "classId": class_a, "teacherId": teacher_1 }),
        ),
        "lessonId",
    );
    let lesson_2 = id_of(
        &d.call(
            "lessons.create",
            json!({ "subjectId": subject, "classId": class_b, "teacherId": teacher_2 }),
        ),
        "lessonId",
    );

    for (i, (lesson, student)) in [
        (&lesson_1, &student_1),
        (&lesson_1, &student_1),
        (&lesson_2, &student_2),
        (&lesson_2, &student_2),
        (&lesson_2, &student_2),
    ]
    .iter()
    .enumerate()
    {
        let assignment = id_of(
            &d.call(
                "assignments.create",
                json!({
                    "title": format!("Task {}", i),
                    "startDate": format!("2026-05-{:02}T08:00:00Z", i + 1),
                    "dueDate": format!("2026-05-{:02}T17:00:00Z", i + 3),
                    "lessonId": lesson,
                }),
            ),
            "assignmentId",
        );
        d.call(
            "results.create",
            json!({ "studentId": student, "score": 60.0, "assignmentId": assignment }),
        );
    }

    School {
        class_a,
        class_b,
        teacher_1,
        teacher_2,
        student_1,
        student_2,
        parent_1,
    }
}

#[test]
fn teacher_sees_only_assignments_of_their_own_lessons() {
    let ws = temp_workspace("campusd-scope-teacher");
    let mut d = Daemon::spawn();
    d.call("workspace.select", json!({ "path": ws.to_string_lossy() }));
    let school = seed(&mut d);

    let page = d.call(
        "assignments.list",
        json!({ "role": "teacher", "userId": school.teacher_1 }),
    );
    assert_eq!(page["totalCount"], 2);
    for item in page["items"].as_array().expect("items") {
        assert_eq!(item["teacherSurname"], "Marais");
    }

    let page = d.call(
        "assignments.list",
        json!({ "role": "teacher", "userId": school.teacher_2 }),
    );
    assert_eq!(page["totalCount"], 3);

    // Result visibility lifts through the assignment's lesson.
    let page = d.call(
        "results.list",
        json!({ "role": "teacher", "userId": school.teacher_1 }),
    );
    assert_eq!(page["totalCount"], 2);
}

#[test]
fn student_result_listing_never_leaks_other_students() {
    let ws = temp_workspace("campusd-scope-student");
    let mut d = Daemon::spawn();
    d.call("workspace.select", json!({ "path": ws.to_string_lossy() }));
    let school = seed(&mut d);

    let own = d.call(
        "results.list",
        json!({ "role": "student", "userId": school.student_1 }),
    );
    assert_eq!(own["totalCount"], 2);
    for item in own["items"].as_array().expect("items") {
        assert_eq!(item["studentName"], "Sam");
    }

    // A caller-supplied filter for another student intersects with the
    // scope instead of widening it.
    let foreign = d.call(
        "results.list",
        json!({
            "role": "student",
            "userId": school.student_1,
            "filters": { "studentId": school.student_2 },
        }),
    );
    assert_eq!(foreign["totalCount"], 0);
    assert_eq!(foreign["items"].as_array().expect("items").len(), 0);
}

#[test]
fn parent_sees_their_children_only() {
    let ws = temp_workspace("campusd-scope-parent");
    let mut d = Daemon::spawn();
    d.call("workspace.select", json!({ "path": ws.to_string_lossy() }));
    let school = seed(&mut d);

    let page = d.call(
        "results.list",
        json!({ "role": "parent", "userId": school.parent_1 }),
    );
    assert_eq!(page["totalCount"], 2);
    for item in page["items"].as_array().expect("items") {
        assert_eq!(item["studentSurname"], "Ndlovu");
    }
}

#[test]
fn missing_or_unknown_roles_fail_closed() {
    let ws = temp_workspace("campusd-scope-closed");
    let mut d = Daemon::spawn();
    d.call("workspace.select", json!({ "path": ws.to_string_lossy() }));
    let school = seed(&mut d);

    // No role at all.
    let page = d.call("assignments.list", json!({}));
    assert_eq!(page["totalCount"], 0);

    // Unknown role string: never admin visibility.
    let page = d.call(
        "assignments.list",
        json!({ "role": "principal", "userId": school.teacher_1 }),
    );
    assert_eq!(page["totalCount"], 0);

    // User-scoped role without a user id.
    let page = d.call("results.list", json!({ "role": "student" }));
    assert_eq!(page["totalCount"], 0);
}

#[test]
fn class_targeted_announcements_follow_membership() {
    let ws = temp_workspace("campusd-scope-announce");
    let mut d = Daemon::spawn();
    d.call("workspace.select", json!({ "path": ws.to_string_lossy() }));
    let school = seed(&mut d);

    d.call(
        "announcements.create",
        json!({
            "title": "School closed Friday",
            "description": "Public holiday.",
            "date": "2026-05-01T06:00:00Z",
        }),
    );
    d.call(
        "announcements.create",
        json!({
            "title": "7A outing",
            "description": "Permission slips due.",
            "date": "2026-05-02T06:00:00Z",
            "classId": school.class_a,
        }),
    );
    d.call(
        "announcements.create",
        json!({
            "title": "7B bake sale",
            "description": "Bring change.",
            "date": "2026-05-03T06:00:00Z",
            "classId": school.class_b,
        }),
    );

    let admin = d.call("announcements.list", json!({ "role": "admin" }));
    assert_eq!(admin["totalCount"], 3);

    // Student in 7A: the global one plus their own class.
    let student = d.call(
        "announcements.list",
        json!({ "role": "student", "userId": school.student_1 }),
    );
    assert_eq!(student["totalCount"], 2);
    let titles: Vec<&str> = student["items"]
        .as_array()
        .expect("items")
        .iter()
        .map(|i| i["title"].as_str().expect("title"))
        .collect();
    assert!(titles.contains(&"School closed Friday"));
    assert!(titles.contains(&"7A outing"));

    // Teacher of the 7A lesson sees the same pair.
    let teacher = d.call(
        "announcements.list",
        json!({ "role": "teacher", "userId": school.teacher_1 }),
    );
    assert_eq!(teacher["totalCount"], 2);
}

#[test]
fn exam_visibility_lifts_through_every_lesson_link() {
    let ws = temp_workspace("campusd-scope-exams");
    let mut d = Daemon::spawn();
    d.call("workspace.select", json!({ "path": ws.to_string_lossy() }));

    let grade = id_of(&d.call("grades.create", json!({ "level": 7 })), "gradeId");
    let class_a = id_of(
        &d.call(
            "classes.create",
            json!({ "gradeId": grade, "letter": "A", "capacity": 40 }),
        ),
        "classId",
    );
    let class_b = id_of(
        &d.call(
            "classes.create",
            json!({ "gradeId": grade, "letter": "B", "capacity": 40 }),
        ),
        "classId",
    );
    let english = id_of(&d.call("subjects.create", json!({ "name": "English" })), "subjectId");
    let maths = id_of(
        &d.call("subjects.create", json!({ "name": "Mathematics" })),
        "subjectId",
    );
    let teacher_1 = id_of(
        &d.call(
            "teachers.create",
            json!({ "firstName": "Alice", "lastName": "Marais" }),
        ),
        "teacherId",
    );
    let teacher_2 = id_of(
        &d.call(
            "teachers.create",
            json!({ "firstName": "Ben", "lastName": "Khumalo" }),
        ),
        "teacherId",
    );
    let parent_1 = id_of(
        &d.call(
            "parents.create",
            json!({ "firstName": "Grace", "lastName": "Ndlovu" }),
        ),
        "parentId",
    );
    d.call(
        "students.create",
        json!({
            "firstName": "Sam",
            "lastName": "Ndlovu",
            "gradeId": grade,
            "letter": "A",
            "parentId": parent_1,
        }),
    );
    let student_2 = id_of(
        &d.call(
            "students.create",
            json!({ "firstName": "Lindi", "lastName": "Botha", "gradeId": grade, "letter": "B" }),
        ),
        "studentId",
    );
    let lesson_1 = id_of(
        &d.call(
            "lessons.create",
            json!({ "subjectId": english, "classId": class_a, "teacherId": teacher_1 }),
        ),
        "lessonId",
    );
    let lesson_2 = id_of(
        &d.call(
            "lessons.create",
            json!({ "subjectId": english, "classId": class_b, "teacherId": teacher_2 }),
        ),
        "lessonId",
    );
    let lesson_3 = id_of(
        &d.call(
            "lessons.create",
            json!({ "subjectId": maths, "classId": class_b, "teacherId": teacher_2 }),
        ),
        "lessonId",
    );

    // One single-lesson exam and two multi-lesson exams whose later
    // links belong to the other teacher's classes.
    d.call(
        "exams.create",
        json!({
            "title": "Comprehension",
            "startTime": "2026-08-01T09:00:00Z",
            "endTime": "2026-08-01T10:00:00Z",
            "lessonIds": [lesson_1],
        }),
    );
    d.call(
        "exams.create",
        json!({
            "title": "Mid-year English",
            "startTime": "2026-08-02T09:00:00Z",
            "endTime": "2026-08-02T11:00:00Z",
            "lessonIds": [lesson_1, lesson_2],
        }),
    );
    d.call(
        "exams.create",
        json!({
            "title": "Numeracy check",
            "startTime": "2026-08-03T09:00:00Z",
            "endTime": "2026-08-03T10:00:00Z",
            "lessonIds": [lesson_1, lesson_3],
        }),
    );

    // Teacher 1 owns the first link of all three; teacher 2 reaches two
    // of them through later links only.
    let page = d.call("exams.list", json!({ "role": "teacher", "userId": teacher_1 }));
    assert_eq!(page["totalCount"], 3);
    let page = d.call("exams.list", json!({ "role": "teacher", "userId": teacher_2 }));
    assert_eq!(page["totalCount"], 2);

    // Student in 7B is linked through lessons 2 and 3 only.
    let page = d.call("exams.list", json!({ "role": "student", "userId": student_2 }));
    assert_eq!(page["totalCount"], 2);

    // Parent of the 7A child sees everything touching that class.
    let page = d.call("exams.list", json!({ "role": "parent", "userId": parent_1 }));
    assert_eq!(page["totalCount"], 3);

    let page = d.call("exams.list", json!({ "role": "principal", "userId": teacher_1 }));
    assert_eq!(page["totalCount"], 0);

    // Subject search reaches past the first link: "Numeracy check" leads
    // with an English lesson but its second lesson is Mathematics.
    let page = d.call(
        "exams.list",
        json!({ "role": "admin", "filters": { "search": "Mathemat" } }),
    );
    assert_eq!(page["totalCount"], 1);
    assert_eq!(page["items"][0]["title"], "Numeracy check");

    // The grouped view carries the same scope; both of teacher 2's exams
    // group under the first link's class.
    let grouped = d.call("exams.byGrade", json!({ "role": "teacher", "userId": teacher_2 }));
    let groups = grouped["groups"].as_array().expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["label"], "Grade 7");
    assert_eq!(groups[0]["classes"][0]["className"], "7A");
    assert_eq!(groups[0]["classes"][0]["totalCount"], 2);
}
