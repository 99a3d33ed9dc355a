//! 导出包 PII 扫描核心库
//!
//! 设计要点：
//! - 单一入口 `scan(bytes, filename) -> Report`，传输层（HTTP/上传/渲染）不在本库内。
//! - 流水线：解包（archive）→ 遍历 → 按扩展名解析（parsers）→ 规则检测（detectors）→ 聚合（report）。
//! - 规则表 `RuleTable` 为不可变值，显式传入检测器；扫描是 (输入, 规则表) 的纯函数。
//! - 检测阶段可并行，但聚合按发现顺序重排，输出顺序稳定、可复现。

mod options;
mod error;
mod types;
mod findings;
mod rules;
mod detectors;
mod parsers;
mod archive;
mod report;
mod scan;

pub use options::{CancelFlag, ScanOptions};
pub use error::{ParseError, ScanError};
pub use types::{Report, RiskLevel, ScoredItem, Summary, TextFragment};
pub use findings::{Finding, PiiKind};
pub use rules::{Matcher, Rule, RuleTable, ScoringConfig, Thresholds};
pub use detectors::{detect, Detection};
pub use parsers::{parse_document, DocumentFormat};
pub use report::build_report;
pub use scan::{scan, scan_with};
