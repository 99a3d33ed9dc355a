//! 扫描入口：按扩展名选择解包或单文档解析，然后检测并聚合
use std::path::Path;
use tracing::info;

use crate::archive::{collect_archive_fragments, is_archive_extension};
use crate::error::ScanError;
use crate::options::ScanOptions;
use crate::parsers::{parse_document, DocumentFormat};
use crate::report::build_report;
use crate::rules::RuleTable;
use crate::types::{Report, TextFragment};

/// 使用内置规则表与默认选项扫描
pub fn scan(content: &[u8], filename: &str) -> Result<Report, ScanError> {
    scan_with(content, filename, &RuleTable::builtin(), &ScanOptions::default())
}

/// 扫描一次上传内容
/// - `.zip`：解包并递归遍历，单文件错误被吸收
/// - `.json/.csv/.html/.htm`：直接解析，解析失败即为整次调用失败
/// - 其他扩展名：`UnsupportedFormat`
pub fn scan_with(
    content: &[u8],
    filename: &str,
    table: &RuleTable,
    opts: &ScanOptions,
) -> Result<Report, ScanError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string();

    let fragments = if is_archive_extension(&extension) {
        let (fragments, stats) = collect_archive_fragments(content, opts)?;
        info!(
            archives = stats.archives_opened,
            files_parsed = stats.files_parsed,
            files_skipped = stats.files_skipped,
            "archive walk finished"
        );
        fragments
    } else if let Some(format) = DocumentFormat::from_extension(&extension) {
        parse_document(format, content)
            .map_err(|source| ScanError::MalformedDocument { name: filename.to_string(), source })?
            .into_iter()
            .map(|text| TextFragment::new(text, filename))
            .collect()
    } else {
        return Err(ScanError::UnsupportedFormat { extension });
    };

    if opts.cancel.is_cancelled() {
        return Err(ScanError::Cancelled);
    }

    let report = build_report(&fragments, table, opts);
    info!(
        filename,
        fragments = fragments.len(),
        items = report.summary.total_items,
        high_risk = report.summary.high_risk_count,
        "scan finished"
    );
    Ok(report)
}
