//! 聚合：逐片段检测、分级，并按发现顺序组装报告
use std::collections::BTreeMap;
use tracing::warn;

use crate::detectors::{detect, Detection};
use crate::options::ScanOptions;
use crate::rules::{RuleTable, ScoringConfig};
use crate::types::{make_snippet, Report, ScoredItem, TextFragment};

/// 片段数低于该值时直接串行检测
const PARALLEL_MIN_FRAGMENTS: usize = 64;

/// 丢弃空白片段 → 检测 → 分级 → 汇总；结果顺序与输入顺序一致
pub fn build_report(fragments: &[TextFragment], table: &RuleTable, opts: &ScanOptions) -> Report {
    let live: Vec<&TextFragment> = fragments.iter().filter(|f| !f.is_blank()).collect();

    let threads = opts.effective_threads();
    let detections = if threads > 1 && live.len() >= PARALLEL_MIN_FRAGMENTS {
        match detect_parallel(&live, table, threads) {
            Ok(d) => d,
            Err(err) => {
                warn!(error = %err, "thread pool unavailable, detecting serially");
                detect_serial(&live, table)
            }
        }
    } else {
        detect_serial(&live, table)
    };

    let scoring = table.scoring();
    let items = live
        .iter()
        .zip(detections)
        .map(|(frag, d)| scored_item(frag, d, scoring))
        .collect();
    Report::from_items(items)
}

fn scored_item(frag: &TextFragment, d: Detection, scoring: &ScoringConfig) -> ScoredItem {
    ScoredItem {
        snippet: make_snippet(&frag.text),
        origin: frag.origin.clone(),
        risk_level: scoring.risk_level(d.score),
        score: d.score,
        findings: d.findings,
        recommendations: d.recommendations,
    }
}

fn detect_serial(live: &[&TextFragment], table: &RuleTable) -> Vec<Detection> {
    live.iter().map(|f| detect(&f.text, table)).collect()
}

/// 并行检测：
/// - Rayon 线程池内并行调用 detect，结果带上原始下标经通道送出
/// - 当前线程作为收集端，按下标重排，恢复发现顺序
fn detect_parallel(
    live: &[&TextFragment],
    table: &RuleTable,
    threads: usize,
) -> Result<Vec<Detection>, rayon::ThreadPoolBuildError> {
    use crossbeam_channel as channel;
    use rayon::prelude::*;

    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    let (tx, rx) = channel::bounded::<(usize, Detection)>(256);
    let mut ordered: Vec<Detection> = Vec::with_capacity(live.len());

    std::thread::scope(|s| {
        s.spawn(move || {
            pool.install(|| {
                live.par_iter().enumerate().for_each_with(tx, |tx, (idx, frag)| {
                    let _ = tx.send((idx, detect(&frag.text, table)));
                });
            });
            // 所有 Sender 在此之前被丢弃，收集端随之结束
        });

        let mut next_idx: usize = 0;
        let mut buffer: BTreeMap<usize, Detection> = BTreeMap::new();
        while let Ok((idx, d)) = rx.recv() {
            buffer.insert(idx, d);
            while let Some(d) = buffer.remove(&next_idx) {
                ordered.push(d);
                next_idx += 1;
            }
        }
    });

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::PiiKind;
    use crate::types::RiskLevel;

    fn frag(text: &str) -> TextFragment {
        TextFragment::new(text, "test")
    }

    #[test]
    fn blanks_are_dropped_and_clean_text_is_kept() {
        let frags = vec![frag("  "), frag("hello world"), frag(""), frag("Call me at 555-123-4567")];
        let report = build_report(&frags, &RuleTable::builtin(), &ScanOptions::default());
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.items[0].risk_level, RiskLevel::Safe);
        assert_eq!(report.items[1].findings[0].kind, PiiKind::Phone);
        assert_eq!(report.items[1].risk_level, RiskLevel::Medium);
        assert_eq!(report.summary.total_items, 2);
        assert_eq!(report.summary.count(RiskLevel::Safe), 1);
        assert_eq!(report.summary.count(RiskLevel::Medium), 1);
        assert_eq!(report.summary.high_risk_count, 0);
    }

    #[test]
    fn summary_counts_match_items() {
        let frags = vec![
            frag("nothing here"),
            frag("I live on Main Street"),
            frag("test@example.com 555-123-4567"),
            frag("test@example.com 555-123-4567 on Elm Road"),
        ];
        let report = build_report(&frags, &RuleTable::builtin(), &ScanOptions::default());
        let levels: Vec<RiskLevel> = report.items.iter().map(|i| i.risk_level).collect();
        assert_eq!(levels, vec![RiskLevel::Safe, RiskLevel::Medium, RiskLevel::High, RiskLevel::High]);
        assert_eq!(report.summary.count(RiskLevel::High), 2);
        assert_eq!(report.summary.high_risk_count, 2);
        assert_eq!(report.summary.count(RiskLevel::Low), 0);
        let total: usize = report.summary.counts_by_risk_level.values().sum();
        assert_eq!(total, report.summary.total_items);
    }

    #[test]
    fn parallel_detection_preserves_order() {
        let frags: Vec<TextFragment> = (0..500)
            .map(|i| match i % 3 {
                0 => frag(&format!("post {i} call 555-123-{:04}", i)),
                1 => frag(&format!("post {i} nothing to see")),
                _ => frag(&format!("post {i} mail user{i}@example.com")),
            })
            .collect();
        let table = RuleTable::builtin();
        let serial = build_report(&frags, &table, &ScanOptions { threads: Some(1), ..ScanOptions::default() });
        let parallel = build_report(&frags, &table, &ScanOptions { threads: Some(4), ..ScanOptions::default() });
        assert_eq!(serial, parallel);
        assert_eq!(parallel.items.len(), 500);
        assert!(parallel.items[499].snippet.starts_with("post 499 "));
    }

    #[test]
    fn snippet_is_truncated() {
        let long = format!("{} 555-123-4567", "x".repeat(150));
        let report = build_report(&[frag(&long)], &RuleTable::builtin(), &ScanOptions::default());
        assert_eq!(report.items[0].snippet, format!("{}...", "x".repeat(100)));
        assert_eq!(report.items[0].score, 4);
    }
}
