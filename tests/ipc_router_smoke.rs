mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{import_roster, request, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradingd-router-smoke");
    let csv_out = workspace.join("smoke-export.csv");
    let missing_zip = workspace.join("missing.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    import_roster(&mut stdin, &mut reader);

    let calls = [
        ("1", "health", json!({})),
        ("2", "session.get", json!({})),
        ("3", "assignment.update", json!({ "name": "Smoke HW" })),
        ("4", "roster.list", json!({})),
        ("5", "roster.export", json!({ "outPath": csv_out.to_string_lossy() })),
        ("6", "roster.setGrade", json!({ "student": "Bob Jones", "grade": 12 })),
        ("7", "submissions.import", json!({ "path": missing_zip.to_string_lossy() })),
        ("8", "feedback.list", json!({})),
        ("9", "feedback.create", json!({ "comment": "Smoke", "grade": 1 })),
        ("10", "feedback.edit", json!({ "id": 5, "comment": "Smoke test", "grade": 1 })),
        ("11", "feedback.apply", json!({ "id": 5, "students": ["Ann Smith"] })),
        ("12", "feedback.reorder", json!({ "fromIndex": 0, "toIndex": 1 })),
        ("13", "feedback.delete", json!({ "id": 5 })),
        ("14", "history.list", json!({})),
        ("15", "history.revert", json!({ "changeId": "not-a-uuid" })),
        ("16", "commentary.generate", json!({ "student": "Ann Smith" })),
        ("17", "commentary.batch", json!({})),
        ("18", "commentary.suggest", json!({})),
        ("19", "commentary.suggestions", json!({})),
        ("20", "commentary.dismissSuggestion", json!({ "index": 0 })),
        ("21", "session.reset", json!({})),
    ];
    for (id, method, params) in calls {
        let value = request(&mut stdin, &mut reader, id, method, params);
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        assert_ne!(code, "not_implemented", "unexpected unknown method for {}", method);
    }
    assert!(csv_out.is_file());

    let unknown = request(&mut stdin, &mut reader, "22", "nope.nothing", json!({}));
    assert_eq!(unknown["ok"], false);
    assert_eq!(unknown["error"]["code"], "not_implemented");

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json response");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(value["error"]["code"], "bad_json");

    let health = request(&mut stdin, &mut reader, "23", "health", json!({}));
    assert_eq!(health["result"]["students"], 0);
    assert_eq!(health["result"]["feedbackItems"], 4);

    let session = request(&mut stdin, &mut reader, "24", "session.get", json!({}));
    assert_eq!(session["result"]["assignmentName"], "Assignment 1");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn missing_params_are_bad_params() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    for (id, method) in [
        ("1", "roster.import"),
        ("2", "submissions.import"),
        ("3", "feedback.apply"),
        ("4", "history.revert"),
        ("5", "feedback.create"),
    ] {
        let value = request(&mut stdin, &mut reader, id, method, json!({}));
        assert_eq!(value["error"]["code"], "bad_params", "{}", method);
    }
    drop(stdin);
    let _ = child.wait();
}
