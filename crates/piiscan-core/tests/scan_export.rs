//! 端到端：构造内存中的导出包，经 scan_with 得到报告
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use piiscan_core::{scan, scan_with, PiiKind, RiskLevel, RuleTable, ScanError, ScanOptions};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, data) in entries {
        w.start_file(*name, opts).unwrap();
        w.write_all(data).unwrap();
    }
    w.finish().unwrap().into_inner()
}

fn opts_in(root: &Path) -> ScanOptions {
    ScanOptions { scratch_root: Some(root.to_path_buf()), ..ScanOptions::default() }
}

fn scratch_is_empty(root: &Path) -> bool {
    fs::read_dir(root).unwrap().next().is_none()
}

#[test]
fn corrupt_member_is_skipped_without_error() {
    let root = tempfile::tempdir().unwrap();
    let data = zip_of(&[
        ("1_posts.json", br#"[{"caption":"Call me at 555-123-4567"}]"#),
        ("2_broken.json", b"{\"items\": [ {\"caption\": "),
        ("3_comments.csv", b"text,location\nnice pic,\n"),
    ]);
    let report = scan_with(&data, "export.zip", &RuleTable::builtin(), &opts_in(root.path())).unwrap();

    let origins: Vec<&str> = report.items.iter().map(|i| i.origin.as_str()).collect();
    assert_eq!(origins, vec!["1_posts.json", "3_comments.csv"]);
    assert_eq!(report.items[0].findings[0].kind, PiiKind::Phone);
    assert_eq!(report.items[1].risk_level, RiskLevel::Safe);
    assert!(scratch_is_empty(root.path()));
}

#[test]
fn item_count_matches_leaf_documents() {
    let root = tempfile::tempdir().unwrap();
    let bodies: Vec<(String, Vec<u8>)> = (0..12)
        .map(|i| (format!("doc_{i:02}.json"), format!(r#"[{{"text":"entry number {i}"}}]"#).into_bytes()))
        .collect();
    let entries: Vec<(&str, &[u8])> = bodies.iter().map(|(n, b)| (n.as_str(), b.as_slice())).collect();
    let report = scan_with(&zip_of(&entries), "bundle.ZIP", &RuleTable::builtin(), &opts_in(root.path())).unwrap();

    assert_eq!(report.items.len(), 12);
    assert_eq!(report.summary.total_items, 12);
    for (i, item) in report.items.iter().enumerate() {
        assert_eq!(item.snippet, format!("entry number {i}"));
    }
}

#[test]
fn mixed_export_report() {
    let root = tempfile::tempdir().unwrap();
    let inner = zip_of(&[("inbox.json", br#"{"messages":[{"content":"reach me at jane@example.org"}]}"#)]);
    let data = zip_of(&[
        ("followers.json", br#"{"relationships_followers":[{"string_list_data":[{"value":"jane_doe"}]}]}"#),
        ("messages.zip", &inner),
        ("profile.html", b"<div>I live on 42 Baker Street, call 555-867-5309</div><img src=x.png>"),
        ("thumbs/cover.png", b"\x89PNG"),
    ]);
    let report = scan_with(&data, "instagram.zip", &RuleTable::builtin(), &opts_in(root.path())).unwrap();

    let summary: Vec<(&str, u32, RiskLevel)> =
        report.items.iter().map(|i| (i.origin.as_str(), i.score, i.risk_level)).collect();
    assert_eq!(
        summary,
        vec![
            ("followers.json", 0, RiskLevel::Safe),
            ("messages.zip!/inbox.json", 4, RiskLevel::Medium),
            ("profile.html", 7, RiskLevel::High),
        ]
    );
    assert_eq!(report.summary.count(RiskLevel::High), 1);
    assert_eq!(report.items[2].recommendations.len(), 2);
    assert!(scratch_is_empty(root.path()));
}

#[test]
fn repeated_scans_are_identical() {
    let data = zip_of(&[
        ("a.json", br#"[{"bio":"test@example.com"},{"bio":"hello there"}]"#),
        ("b.csv", b"text\nI live on Main Street\n"),
    ]);
    let first = scan(&data, "export.zip").unwrap();
    let second = scan(&data, "export.zip").unwrap();
    assert_eq!(first, second);
    assert_eq!(serde_json::to_string(&first).unwrap(), serde_json::to_string(&second).unwrap());
}

#[test]
fn concurrent_scans_do_not_collide() {
    let root = tempfile::tempdir().unwrap();
    let data = zip_of(&[("a.json", br#"["Call me at 555-123-4567"]"#), ("b.json", br#"["quiet day"]"#)]);
    let opts = opts_in(root.path());

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| scan_with(&data, "export.zip", &RuleTable::builtin(), &opts).unwrap()))
            .collect();
        for h in handles {
            let report = h.join().unwrap();
            assert_eq!(report.items.len(), 2);
            assert_eq!(report.items[0].score, 4);
        }
    });
    assert!(scratch_is_empty(root.path()));
}

#[test]
fn corrupt_top_level_zip_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let err = scan_with(b"PK\x05\x06garbage", "export.zip", &RuleTable::builtin(), &opts_in(root.path())).unwrap_err();
    assert!(matches!(err, ScanError::MalformedArchive(_)));
    assert!(scratch_is_empty(root.path()));
}

#[test]
fn custom_rule_file_changes_scoring() {
    let table = RuleTable::from_toml_str(
        r#"
        max_score = 5
        [weights]
        email = 1
        "#,
    )
    .unwrap();
    let report = scan_with(
        br#"["write to test@example.com", "call 555-123-4567 or test@example.com"]"#,
        "posts.json",
        &table,
        &ScanOptions::default(),
    )
    .unwrap();
    assert_eq!(report.items[0].score, 1);
    assert_eq!(report.items[0].risk_level, RiskLevel::Low);
    assert_eq!(report.items[1].score, 5);
}
