//! 命中项（单条规则对单个片段的命中）
use serde::{Serialize, Serializer};
use std::fmt;

/// 命中类型；内置三类，规则文件可追加自定义标签
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PiiKind {
    Phone,
    Email,
    Address,
    Other(String),
}

impl PiiKind {
    /// 由规则标签构建（大小写不敏感匹配内置类型）
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "PHONE" => PiiKind::Phone,
            "EMAIL" => PiiKind::Email,
            "ADDRESS" => PiiKind::Address,
            _ => PiiKind::Other(label.to_ascii_uppercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PiiKind::Phone => "PHONE",
            PiiKind::Email => "EMAIL",
            PiiKind::Address => "ADDRESS",
            PiiKind::Other(label) => label,
        }
    }
}

impl fmt::Display for PiiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PiiKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// 单条命中
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: PiiKind,
    /// 命中的原文片段（正则取首个匹配；关键字取文本中的原样写法）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_excerpt: Option<String>,
}
