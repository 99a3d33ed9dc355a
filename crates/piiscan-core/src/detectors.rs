//! 检测器：对单个文本片段应用规则表
use crate::findings::Finding;
use crate::rules::RuleTable;

/// 单个片段的检测结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    pub findings: Vec<Finding>,
    pub recommendations: Vec<String>,
    pub score: u32,
}

/// 纯函数：按表内顺序评估每条规则（不提前退出），权重求和后封顶
/// 空白文本直接返回空结果、0 分
pub fn detect(text: &str, table: &RuleTable) -> Detection {
    if text.trim().is_empty() {
        return Detection::default();
    }

    let mut out = Detection::default();
    let mut sum: u32 = 0;
    for rule in table.rules() {
        if let Some(excerpt) = rule.matcher.first_match(text) {
            out.findings.push(Finding { kind: rule.kind.clone(), matched_excerpt: Some(excerpt) });
            if let Some(rec) = &rule.recommendation {
                out.recommendations.push(rec.clone());
            }
            sum = sum.saturating_add(rule.weight);
        }
    }
    out.score = sum.min(table.scoring().max_score);
    out
}
