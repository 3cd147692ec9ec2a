mod test_support;

use calamine::{open_workbook_auto, Data, Reader};
use serde_json::json;
use std::io::Read;
use test_support::{
    request_ok, score_params, seed_workspace, spawn_sidecar, temp_dir, CLASS, SESSION,
};

fn text(d: Option<&Data>) -> String {
    match d {
        Some(Data::String(s)) => s.clone(),
        Some(Data::Float(f)) => format!("{}", f),
        Some(Data::Int(i)) => format!("{}", i),
        _ => String::new(),
    }
}

fn number(d: Option<&Data>) -> Option<f64> {
    match d {
        Some(Data::Float(f)) => Some(*f),
        Some(Data::Int(i)) => Some(*i as f64),
        _ => None,
    }
}

fn seed_scores(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
) {
    let entries = [
        ("s2", "math", 15, 18, 50),
        ("s2", "eng", 10, 10, 41),
        ("s1", "math", 12, 10, 50),
    ];
    for (i, (student, subject, ca, st, ex)) in entries.iter().enumerate() {
        request_ok(
            stdin,
            reader,
            &format!("score-{i}"),
            "scores.upsert",
            score_params(
                student,
                subject,
                "First",
                json!({ "classAssessment": ca, "summativeTest": st, "exam": ex }),
            ),
        );
    }
    request_ok(
        stdin,
        reader,
        "rank",
        "class.rank",
        json!({ "classId": CLASS, "sessionId": SESSION, "term": "First" }),
    );
}

#[test]
fn broadsheet_view_separates_missing_from_recorded() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_workspace(
        &mut stdin,
        &mut reader,
        "resultsd-broadsheet-view",
        &[("s1", "Ada", "Bello"), ("s2", "Tunde", "Adams")],
    );
    seed_scores(&mut stdin, &mut reader);

    let out = request_ok(
        &mut stdin,
        &mut reader,
        "get",
        "broadsheet.get",
        json!({ "classId": CLASS, "sessionId": SESSION, "term": "First" }),
    );
    assert_eq!(out["filledCells"], 3);
    assert_eq!(out["emptyCells"], 3);
    let sheet = &out["broadsheet"];
    let rows = sheet["rows"].as_array().expect("rows");
    assert_eq!(rows[0]["student"]["id"], "s2");
    assert_eq!(rows[0]["position"], "1st");
    assert_eq!(rows[1]["student"]["id"], "s1");
    assert!(rows[1]["cells"][1].is_null());
    let averages = sheet["subjectAverages"].as_array().expect("averages");
    assert_eq!(averages[0]["average"].as_f64(), Some(77.5));
    assert_eq!(averages[2]["average"].as_f64(), Some(0.0));
}

#[test]
fn broadsheet_positions_follow_edits_made_after_ranking() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_workspace(
        &mut stdin,
        &mut reader,
        "resultsd-broadsheet-rerank",
        &[("s1", "Ada", "Bello"), ("s2", "Tunde", "Adams")],
    );
    seed_scores(&mut stdin, &mut reader);

    // s1 overtakes s2 (72 each) after the explicit ranking.
    request_ok(
        &mut stdin,
        &mut reader,
        "late",
        "scores.upsert",
        score_params("s1", "eng", "First", json!({ "exam": 60, "classAssessment": 20 })),
    );

    let out = request_ok(
        &mut stdin,
        &mut reader,
        "get",
        "broadsheet.get",
        json!({ "classId": CLASS, "sessionId": SESSION, "term": "First" }),
    );
    let rows = out["broadsheet"]["rows"].as_array().expect("rows");
    assert_eq!(rows[0]["student"]["id"], "s1");
    assert_eq!(rows[0]["position"], "1st");
    assert_eq!(rows[1]["student"]["id"], "s2");
    assert_eq!(rows[1]["position"], "2nd");

    let out_path = temp_dir("resultsd-broadsheet-rerank-out").join("rerank.xlsx");
    request_ok(
        &mut stdin,
        &mut reader,
        "export",
        "broadsheet.exportXlsx",
        json!({
            "classId": CLASS,
            "sessionId": SESSION,
            "term": "First",
            "outPath": out_path.to_string_lossy(),
        }),
    );
    let mut wb = open_workbook_auto(&out_path).expect("open workbook");
    let range = wb.worksheet_range("Broadsheet").expect("sheet");
    assert_eq!(text(range.get_value((1, 1))), "Ada Bello");
    assert_eq!(text(range.get_value((8, 0))), "Position");
    assert_eq!(text(range.get_value((8, 4))), "1st");
    assert_eq!(text(range.get_value((8, 8))), "2nd");
}

#[test]
fn exported_workbook_matches_broadsheet_layout() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_workspace(
        &mut stdin,
        &mut reader,
        "resultsd-broadsheet-export",
        &[("s1", "Ada", "Bello"), ("s2", "Tunde", "Adams")],
    );
    seed_scores(&mut stdin, &mut reader);

    let out_path = temp_dir("resultsd-broadsheet-out").join("jss1-first.xlsx");
    let out = request_ok(
        &mut stdin,
        &mut reader,
        "export",
        "broadsheet.exportXlsx",
        json!({
            "classId": CLASS,
            "sessionId": SESSION,
            "term": "First",
            "outPath": out_path.to_string_lossy(),
            "generatedAt": "2024-12-13 09:00:00"
        }),
    );
    let size = std::fs::metadata(&out_path).expect("exported file").len();
    assert_eq!(out["bytes"].as_u64(), Some(size));
    assert_eq!(out["sha256"].as_str().map(str::len), Some(64));
    assert_eq!(out["cols"], 10);
    assert_eq!(out["rows"], 9);

    let mut workbook = open_workbook_auto(&out_path).expect("open workbook");
    assert_eq!(workbook.sheet_names(), vec!["Broadsheet".to_string()]);
    let range = workbook.worksheet_range("Broadsheet").expect("sheet");

    let title = text(range.get_value((0, 0)));
    assert!(title.contains("JSS 1"), "{title}");
    assert!(title.contains("First Term"), "{title}");
    assert!(title.contains("2024/2025"), "{title}");
    assert!(title.contains("2024-12-13 09:00:00"), "{title}");

    assert_eq!(text(range.get_value((1, 0))), "Subjects");
    assert_eq!(text(range.get_value((1, 1))), "Tunde Adams");
    assert_eq!(text(range.get_value((1, 5))), "Ada Bello");
    assert_eq!(text(range.get_value((1, 9))), "Class Average");
    let headers: Vec<String> = (1..9).map(|c| text(range.get_value((2, c)))).collect();
    assert_eq!(headers, ["C/A", "S/T", "Exam", "Total", "C/A", "S/T", "Exam", "Total"]);

    assert_eq!(text(range.get_value((3, 0))), "Mathematics");
    let math: Vec<Option<f64>> = (1..10).map(|c| number(range.get_value((3, c)))).collect();
    assert_eq!(
        math,
        vec![
            Some(15.0),
            Some(18.0),
            Some(50.0),
            Some(83.0),
            Some(12.0),
            Some(10.0),
            Some(50.0),
            Some(72.0),
            Some(77.5)
        ]
    );
    assert_eq!(text(range.get_value((4, 0))), "English");
    assert_eq!(number(range.get_value((4, 4))), Some(61.0));
    assert_eq!(number(range.get_value((4, 8))), None);
    assert_eq!(text(range.get_value((5, 0))), "Biology");
    assert_eq!(number(range.get_value((5, 9))), Some(0.0));

    assert_eq!(text(range.get_value((6, 0))), "Grand Total");
    assert_eq!(number(range.get_value((6, 4))), Some(144.0));
    assert_eq!(number(range.get_value((6, 8))), Some(72.0));
    assert_eq!(number(range.get_value((6, 3))), None);
    assert_eq!(text(range.get_value((7, 0))), "Average");
    assert_eq!(number(range.get_value((7, 4))), Some(72.0));
    assert_eq!(text(range.get_value((8, 0))), "Position");
    assert_eq!(text(range.get_value((8, 4))), "1st");
    assert_eq!(text(range.get_value((8, 8))), "2nd");

    let f = std::fs::File::open(&out_path).expect("reopen");
    let mut archive = zip::ZipArchive::new(f).expect("zip");
    let mut sheet_xml = String::new();
    archive
        .by_name("xl/worksheets/sheet1.xml")
        .expect("sheet part")
        .read_to_string(&mut sheet_xml)
        .expect("read sheet");
    for merge in ["A1:J1", "A2:A3", "B2:E2", "F2:I2", "J2:J3"] {
        assert!(
            sheet_xml.contains(&format!("<mergeCell ref=\"{merge}\"/>")),
            "missing merge {merge}"
        );
    }
    assert!(sheet_xml.contains("orientation=\"landscape\""));

    let mut styles = String::new();
    archive
        .by_name("xl/styles.xml")
        .expect("styles part")
        .read_to_string(&mut styles)
        .expect("read styles");
    assert!(styles.contains("Times New Roman"));
    assert!(styles.contains("style=\"thin\""));
}

#[test]
fn export_is_deterministic_for_fixed_timestamp() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_workspace(
        &mut stdin,
        &mut reader,
        "resultsd-broadsheet-digest",
        &[("s1", "Ada", "Bello"), ("s2", "Tunde", "Adams")],
    );
    seed_scores(&mut stdin, &mut reader);

    let dir = temp_dir("resultsd-broadsheet-digest-out");
    let mut digests = Vec::new();
    for name in ["a.xlsx", "b.xlsx"] {
        let out = request_ok(
            &mut stdin,
            &mut reader,
            name,
            "broadsheet.exportXlsx",
            json!({
                "classId": CLASS,
                "sessionId": SESSION,
                "term": "First",
                "outPath": dir.join(name).to_string_lossy(),
                "generatedAt": "2024-12-13 09:00:00"
            }),
        );
        digests.push(out["sha256"].as_str().expect("digest").to_string());
    }
    assert_eq!(digests[0], digests[1]);
}
