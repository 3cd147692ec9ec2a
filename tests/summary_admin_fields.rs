mod test_support;

use serde_json::json;
use test_support::{
    request_err, request_ok, score_params, seed_workspace, spawn_sidecar, CLASS, SESSION,
};

fn summary_params(student: &str, term: &str) -> serde_json::Value {
    json!({ "studentId": student, "classId": CLASS, "sessionId": SESSION, "term": term })
}

#[test]
fn position_override_wins_until_cleared() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_workspace(&mut stdin, &mut reader, "resultsd-override", &[("s1", "Ada", "Obi")]);

    let e = request_err(
        &mut stdin,
        &mut reader,
        "0",
        "summary.setPositionOverride",
        json!({
            "studentId": "s1",
            "classId": CLASS,
            "sessionId": SESSION,
            "term": "First",
            "position": "1st",
        }),
    );
    assert_eq!(e["details"]["kind"], "not_found");

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scores.upsert",
        score_params("s1", "math", "First", json!({ "exam": 44 })),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "class.rank",
        json!({ "classId": CLASS, "sessionId": SESSION, "term": "First" }),
    );

    let mut params = summary_params("s1", "First");
    params["position"] = json!("Joint 1st");
    let out = request_ok(&mut stdin, &mut reader, "3", "summary.setPositionOverride", params);
    assert_eq!(out["summary"]["position"], "Joint 1st");
    assert_eq!(out["summary"]["computedPosition"], 1);

    // recompute keeps the override
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "scores.upsert",
        score_params("s1", "math", "First", json!({ "exam": 50 })),
    );
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "summary.get",
        summary_params("s1", "First"),
    );
    assert_eq!(got["summary"]["position"], "Joint 1st");

    let mut params = summary_params("s1", "First");
    params["position"] = serde_json::Value::Null;
    let out = request_ok(&mut stdin, &mut reader, "6", "summary.setPositionOverride", params);
    assert_eq!(out["summary"]["position"], "1st");
    assert!(out["summary"]["positionOverride"].is_null());
}

#[test]
fn class_fields_apply_to_every_summary_of_the_class_term() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_workspace(
        &mut stdin,
        &mut reader,
        "resultsd-class-fields",
        &[("s1", "Ada", "Obi"), ("s2", "Bola", "Ade")],
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "summary.recompute",
        json!({ "classId": CLASS, "sessionId": SESSION, "term": "Second" }),
    );

    let out = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "summary.setClassFields",
        json!({
            "classId": CLASS,
            "sessionId": SESSION,
            "term": "Second",
            "nextTermBegins": "2025-04-28",
            "dateIssued": "2025-04-04"
        }),
    );
    assert_eq!(out["updated"], 2);

    for student in ["s1", "s2"] {
        let got = request_ok(
            &mut stdin,
            &mut reader,
            student,
            "summary.get",
            summary_params(student, "Second"),
        );
        assert_eq!(got["summary"]["nextTermBegins"], "2025-04-28");
        assert_eq!(got["summary"]["dateIssued"], "2025-04-04");
    }

    let out = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "summary.setClassFields",
        json!({ "classId": CLASS, "sessionId": SESSION, "term": "Second", "dateIssued": null }),
    );
    assert_eq!(out["updated"], 2);
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "summary.get",
        summary_params("s1", "Second"),
    );
    assert!(got["summary"]["dateIssued"].is_null());
    assert_eq!(got["summary"]["nextTermBegins"], "2025-04-28");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "summary.setClassFields",
        json!({ "classId": CLASS, "sessionId": SESSION, "term": "Second" }),
    );
    assert_eq!(e["code"], "bad_params");
}

#[test]
fn first_term_edit_refreshes_second_term_figures() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_workspace(&mut stdin, &mut reader, "resultsd-cross-term", &[("s1", "Ada", "Obi")]);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scores.upsert",
        score_params(
            "s1",
            "math",
            "First",
            json!({ "classAssessment": 20, "summativeTest": 20, "exam": 40 }),
        ),
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "scores.upsert",
        score_params(
            "s1",
            "math",
            "Second",
            json!({ "classAssessment": 10, "summativeTest": 10, "exam": 40 }),
        ),
    );
    assert_eq!(second["summary"]["lastTermAverage"].as_f64(), Some(80.0));
    assert_eq!(second["summary"]["cumulativeAverage"].as_f64(), Some(70.0));

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "scores.upsert",
        score_params("s1", "math", "First", json!({ "exam": 0 })),
    );
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "summary.get",
        summary_params("s1", "Second"),
    );
    assert_eq!(got["summary"]["lastTermAverage"].as_f64(), Some(40.0));
    assert_eq!(got["summary"]["cumulativeAverage"].as_f64(), Some(50.0));
    assert_eq!(got["summary"]["termAverage"].as_f64(), Some(60.0));
}
