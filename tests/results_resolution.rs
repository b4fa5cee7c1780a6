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

    fn call_err(&mut self, method: &str, params: Value) -> Value {
        self.seq += 1;
        let id = format!("t{}", self.seq);
        let payload = json!({ "id": id, "method": method, "params": params });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.stdout.read_line(&mut line).expect("read response");
        let resp: Value = serde_json::from_str(line.trim()).expect("parse response");
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            resp
        );
        resp["error"].clone()
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

#[test]
fn polymorphic_results_resolve_to_one_flat_shape() {
    let ws = temp_workspace("campusd-resolution");
    let mut d = Daemon::spawn();
    d.call("workspace.select", json!({ "path": ws.to_string_lossy() }));

    let grade = id_of(&d.call("grades.create", json!({ "level": 1 })), "gradeId");
    d.call(
        "classes.create",
        json!({ "gradeId": grade, "letter": "A", "capacity": 30 }),
    );
    let class_b = id_of(
        &d.call(
            "classes.create",
            json!({ "gradeId": grade, "letter": "B", "capacity": 30 }),
        ),
        "classId",
    );
    let subject = id_of(&d.call("subjects.create", json!({ "name": "Science" })), "subjectId");
    let teacher_first = id_of(
        &d.call(
            "teachers.create",
            json!({ "firstName": "Ada", "lastName": "Primary" }),
        ),
        "teacherId",
    );
    let teacher_second = id_of(
        &d.call(
            "teachers.create",
            json!({ "firstName": "Bea", "lastName": "Secondary" }),
        ),
        "teacherId",
    );
    // The student belongs to 1A even though the assessed lessons run in
    // 1B: the resolved className must be the student's own class.
    let student = id_of(
        &d.call(
            "students.create",
            json!({ "firstName": "Zola", "lastName": "Mahlangu", "gradeId": grade, "letter": "A" }),
        ),
        "studentId",
    );
    let lesson_1 = id_of(
        &d.call(
            "lessons.create",
            json!({ "subjectId": subject, "classId": class_b, "teacherId": teacher_first }),
        ),
        "lessonId",
    );
    let lesson_2 = id_of(
        &d.call(
            "lessons.create",
            json!({ "subjectId": subject, "classId": class_b, "teacherId": teacher_second }),
        ),
        "lessonId",
    );

    let exam = id_of(
        &d.call(
            "exams.create",
            json!({
                "title": "June exam",
                "startTime": "2026-06-10T09:00:00Z",
                "endTime": "2026-06-10T11:00:00Z",
                "lessonIds": [lesson_1, lesson_2],
            }),
        ),
        "examId",
    );
    let assignment = id_of(
        &d.call(
            "assignments.create",
            json!({
                "title": "Lab write-up",
                "startDate": "2026-06-01T08:00:00Z",
                "dueDate": "2026-06-05T17:00:00Z",
                "lessonId": lesson_2,
            }),
        ),
        "assignmentId",
    );

    d.call(
        "results.create",
        json!({ "studentId": student, "score": 71.0, "examId": exam }),
    );
    d.call(
        "results.create",
        json!({ "studentId": student, "score": 88.0, "assignmentId": assignment }),
    );

    let page = d.call("results.list", json!({ "role": "admin" }));
    assert_eq!(page["totalCount"], 2);
    let items = page["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);

    let exam_item = items
        .iter()
        .find(|i| i["assessmentKind"] == "exam")
        .expect("exam result present");
    assert_eq!(exam_item["title"], "June exam");
    assert_eq!(exam_item["occurredAt"], "2026-06-10T09:00:00Z");
    // Representative teacher is the first linked lesson's, not the second's.
    assert_eq!(exam_item["teacherSurname"], "Primary");
    assert_eq!(exam_item["className"], "1A");
    assert_eq!(exam_item["score"], 71.0);

    let asg_item = items
        .iter()
        .find(|i| i["assessmentKind"] == "assignment")
        .expect("assignment result present");
    assert_eq!(asg_item["title"], "Lab write-up");
    assert_eq!(asg_item["occurredAt"], "2026-06-01T08:00:00Z");
    assert_eq!(asg_item["teacherSurname"], "Secondary");
    assert_eq!(asg_item["className"], "1A");

    // A legacy row with no assessment reference (not creatable through
    // the daemon) is dropped from items but stays in the count.
    let db = rusqlite::Connection::open(ws.join("campus.sqlite3")).expect("open workspace db");
    db.execute(
        "INSERT INTO results(id, student_id, score) VALUES('legacy-unlinked', ?, 10.0)",
        [&student],
    )
    .expect("inject malformed row");
    drop(db);

    let page = d.call("results.list", json!({ "role": "admin" }));
    assert_eq!(page["totalCount"], 3);
    assert_eq!(page["items"].as_array().expect("items").len(), 2);
}

#[test]
fn result_creation_requires_exactly_one_assessment_reference() {
    let ws = temp_workspace("campusd-result-create");
    let mut d = Daemon::spawn();
    d.call("workspace.select", json!({ "path": ws.to_string_lossy() }));

    let e = d.call_err(
        "results.create",
        json!({ "studentId": "s", "score": 10.0 }),
    );
    assert_eq!(e["code"], "bad_params");

    let e = d.call_err(
        "results.create",
        json!({ "studentId": "s", "score": 10.0, "examId": "e", "assignmentId": "a" }),
    );
    assert_eq!(e["code"], "bad_params");
}
