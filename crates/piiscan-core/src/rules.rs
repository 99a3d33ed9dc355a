//! 规则表：内置默认规则 + TOML 规则文件加载
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ScanError;
use crate::findings::PiiKind;
use crate::types::RiskLevel;

/// 电话：可带国家码、括号与分隔符，共 7–11 位数字
pub(crate) const PHONE_PATTERN: &str =
    r"(?:\+\d{1,2}[\s.-]?)?(?:\(\d{3}\)\s?|\b\d{3}[\s.-]?|\b)\d{3}[\s.-]?\d{4}\b";
/// 邮箱：local@domain.tld，大小写不敏感
pub(crate) const EMAIL_PATTERN: &str = r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b";
/// 地址关键字（整词匹配，大小写不敏感）
pub(crate) const ADDRESS_KEYWORDS: &[&str] = &[
    "street", "st.", "avenue", "ave", "road", "rd", "drive", "dr", "lane", "ln",
    "blvd", "boulevard", "way", "court", "ct",
];

pub(crate) const DEFAULT_MAX_SCORE: u32 = 10;

/// 匹配器：整段正则，或关键字集合
#[derive(Debug, Clone)]
pub enum Matcher {
    Pattern(Regex),
    Keywords { words: Vec<String>, automaton: AhoCorasick },
}

impl Matcher {
    pub fn pattern(pat: &str) -> Result<Self, regex::Error> {
        Ok(Matcher::Pattern(Regex::new(pat)?))
    }

    pub fn keywords<I, S>(words: I) -> Result<Self, aho_corasick::BuildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        // Standard + overlapping：避免较短关键字被较长的候选遮挡
        let automaton = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(&words)?;
        Ok(Matcher::Keywords { words, automaton })
    }

    /// 若命中则返回命中的原文片段
    pub fn first_match(&self, text: &str) -> Option<String> {
        match self {
            Matcher::Pattern(re) => re.find(text).map(|m| m.as_str().to_string()),
            Matcher::Keywords { words, automaton } => {
                let bytes = text.as_bytes();
                automaton
                    .find_overlapping_iter(text)
                    .find(|m| {
                        let word = words[m.pattern().as_usize()].as_bytes();
                        is_whole_word(bytes, m.start(), m.end(), word)
                    })
                    .map(|m| text[m.start()..m.end()].to_string())
            }
        }
    }
}

/// 词边界判定；非 ASCII 字节按单词字符处理
fn is_whole_word(text: &[u8], start: usize, end: usize, word: &[u8]) -> bool {
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80;
    let left_ok = start == 0 || !word.first().is_some_and(|&b| is_word(b)) || !is_word(text[start - 1]);
    let right_ok = end >= text.len() || !word.last().is_some_and(|&b| is_word(b)) || !is_word(text[end]);
    left_ok && right_ok
}

/// 单条规则
#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: PiiKind,
    pub weight: u32,
    pub matcher: Matcher,
    pub recommendation: Option<String>,
}

/// 风险等级阈值（分数达到即进入该等级）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Thresholds {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { low: 1, medium: 3, high: 5 }
    }
}

/// 打分配置：检测器（封顶）与聚合器（分级）共用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringConfig {
    pub max_score: u32,
    pub thresholds: Thresholds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { max_score: DEFAULT_MAX_SCORE, thresholds: Thresholds::default() }
    }
}

impl ScoringConfig {
    pub fn risk_level(&self, score: u32) -> RiskLevel {
        let t = &self.thresholds;
        if score >= t.high {
            RiskLevel::High
        } else if score >= t.medium {
            RiskLevel::Medium
        } else if score >= t.low {
            RiskLevel::Low
        } else {
            RiskLevel::Safe
        }
    }

    fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if self.max_score == 0 {
            bail!("max_score must be at least 1");
        }
        if t.low == 0 || t.low > t.medium || t.medium > t.high {
            bail!("thresholds must satisfy 1 <= low <= medium <= high (got {}/{}/{})", t.low, t.medium, t.high);
        }
        Ok(())
    }
}

/// 不可变规则表；按表内顺序逐条评估
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
    scoring: ScoringConfig,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleTable {
    /// 内置默认规则：PHONE 4 / EMAIL 4 / ADDRESS 3，封顶 10
    pub fn builtin() -> Self {
        let rules = vec![
            Rule {
                kind: PiiKind::Phone,
                weight: 4,
                matcher: Matcher::pattern(PHONE_PATTERN).expect("builtin phone pattern"),
                recommendation: Some("Remove phone number from post.".into()),
            },
            Rule {
                kind: PiiKind::Email,
                weight: 4,
                matcher: Matcher::pattern(EMAIL_PATTERN).expect("builtin email pattern"),
                recommendation: Some("Remove email from post.".into()),
            },
            Rule {
                kind: PiiKind::Address,
                weight: 3,
                matcher: Matcher::keywords(ADDRESS_KEYWORDS.iter().copied()).expect("builtin address keywords"),
                recommendation: Some("Redact address or restrict audience.".into()),
            },
        ];
        Self { rules, scoring: ScoringConfig::default() }
    }

    /// 由规则列表与打分配置构建（会校验阈值）
    pub fn new(rules: Vec<Rule>, scoring: ScoringConfig) -> Result<Self, ScanError> {
        scoring.validate().map_err(|e| ScanError::InvalidRules(format!("{e:#}")))?;
        Ok(Self { rules, scoring })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// 从 TOML 规则文件加载
    pub fn from_toml_path(path: &Path) -> Result<Self, ScanError> {
        let txt = std::fs::read_to_string(path)
            .map_err(|e| ScanError::io(format!("reading rule file {}", path.display()), e))?;
        Self::from_toml_str(&txt)
    }

    pub fn from_toml_str(txt: &str) -> Result<Self, ScanError> {
        build_from_toml(txt).map_err(|e| ScanError::InvalidRules(format!("{e:#}")))
    }
}

/// 单条规则的配置（支持 pattern 或 regex 字段，或 keywords）
#[derive(Debug, Clone, Deserialize)]
struct RuleEntry {
    label: String,
    weight: u32,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    keywords: Option<Vec<String>>,
    #[serde(default)]
    recommendation: Option<String>,
}

/// 顶层规则文件结构
#[derive(Debug, Clone, Default, Deserialize)]
struct RuleFile {
    #[serde(default)]
    max_score: Option<u32>,
    #[serde(default)]
    thresholds: Option<Thresholds>,
    /// 按标签覆盖权重
    #[serde(default)]
    weights: BTreeMap<String, u32>,
    /// 非空时替换内置规则列表
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

fn build_from_toml(txt: &str) -> Result<RuleTable> {
    let parsed: RuleFile = toml::from_str(txt).context("parsing rule file")?;

    let mut rules = if parsed.rules.is_empty() {
        RuleTable::builtin().rules
    } else {
        let mut out = Vec::with_capacity(parsed.rules.len());
        for e in parsed.rules {
            out.push(rule_from_entry(e)?);
        }
        out
    };

    for (label, weight) in &parsed.weights {
        let kind = PiiKind::from_label(label);
        let mut hit = false;
        for rule in rules.iter_mut().filter(|r| r.kind == kind) {
            rule.weight = *weight;
            hit = true;
        }
        if !hit {
            bail!("weight given for unknown rule label {label:?}");
        }
    }

    let scoring = ScoringConfig {
        max_score: parsed.max_score.unwrap_or(DEFAULT_MAX_SCORE),
        thresholds: parsed.thresholds.unwrap_or_default(),
    };
    scoring.validate()?;
    Ok(RuleTable { rules, scoring })
}

fn rule_from_entry(e: RuleEntry) -> Result<Rule> {
    // 兼容两种字段名：pattern 或 regex
    let matcher = match (e.pattern.or(e.regex), e.keywords) {
        (Some(pat), None) => {
            Matcher::pattern(&pat).with_context(|| format!("rule {}: invalid pattern", e.label))?
        }
        (None, Some(words)) => {
            if words.iter().all(|w| w.trim().is_empty()) {
                bail!("rule {}: keyword list is empty", e.label);
            }
            let words = words.into_iter().filter(|w| !w.trim().is_empty());
            Matcher::keywords(words).with_context(|| format!("rule {}: invalid keywords", e.label))?
        }
        (Some(_), Some(_)) => bail!("rule {}: give either pattern or keywords, not both", e.label),
        (None, None) => bail!("rule {}: missing pattern or keywords", e.label),
    };
    Ok(Rule {
        kind: PiiKind::from_label(&e.label),
        weight: e.weight,
        matcher,
        recommendation: e.recommendation,
    })
}
