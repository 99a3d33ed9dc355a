//! 公共类型（对外暴露）
use serde::Serialize;
use std::collections::BTreeMap;

use crate::findings::Finding;

/// 片段摘要最大字符数，超出追加省略号
pub(crate) const SNIPPET_CHARS: usize = 100;
pub(crate) const SNIPPET_ELLIPSIS: &str = "...";

/// 提取出的文本片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment {
    pub text: String,
    /// 来源路径（压缩包内相对路径，嵌套包以 `!/` 连接）
    pub origin: String,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, origin: impl Into<String>) -> Self {
        Self { text: text.into(), origin: origin.into() }
    }

    pub(crate) fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// 风险等级（有序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [RiskLevel::Safe, RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];
}

/// 单个片段的打分结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredItem {
    pub snippet: String,
    pub origin: String,
    pub findings: Vec<Finding>,
    pub recommendations: Vec<String>,
    pub score: u32,
    pub risk_level: RiskLevel,
}

/// 汇总（总是由 items 重新计算）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_items: usize,
    pub counts_by_risk_level: BTreeMap<RiskLevel, usize>,
    pub high_risk_count: usize,
}

impl Summary {
    pub(crate) fn from_items(items: &[ScoredItem]) -> Self {
        let mut counts: BTreeMap<RiskLevel, usize> = RiskLevel::ALL.iter().map(|l| (*l, 0)).collect();
        for item in items {
            *counts.entry(item.risk_level).or_insert(0) += 1;
        }
        let high_risk_count = counts.get(&RiskLevel::High).copied().unwrap_or(0);
        Self { total_items: items.len(), counts_by_risk_level: counts, high_risk_count }
    }

    pub fn count(&self, level: RiskLevel) -> usize {
        self.counts_by_risk_level.get(&level).copied().unwrap_or(0)
    }
}

/// 最终报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub items: Vec<ScoredItem>,
}

impl Report {
    pub(crate) fn from_items(items: Vec<ScoredItem>) -> Self {
        Self { summary: Summary::from_items(&items), items }
    }
}

/// 截取前 N 个字符作为摘要（按字符而非字节，避免截断多字节字符）
pub(crate) fn make_snippet(text: &str) -> String {
    match text.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], SNIPPET_ELLIPSIS),
        None => text.to_string(),
    }
}
