//! 错误类型
use thiserror::Error;

/// 单个文件解析失败（遍历模式下被吸收，单文档模式下上抛）
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid csv: {0}")]
    Csv(#[from] csv::Error),
}

/// `scan()` 的错误分类
#[derive(Debug, Error)]
pub enum ScanError {
    /// 单文档模式下扩展名无法识别
    #[error("unsupported file type: {extension:?}")]
    UnsupportedFormat { extension: String },

    /// 顶层压缩包无法打开或解压
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    /// 本次调用解压总量超过上限（含嵌套压缩包），不会被遍历吸收
    #[error("archive expands beyond {limit} bytes")]
    ExtractionLimit { limit: u64 },

    /// 顶层单文档无法解析
    #[error("malformed document {name}: {source}")]
    MalformedDocument {
        name: String,
        #[source]
        source: ParseError,
    },

    /// 临时目录创建/删除或读取失败
    #[error("io failure while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// 调用方已放弃本次扫描
    #[error("scan cancelled")]
    Cancelled,

    /// 规则配置无效
    #[error("invalid rule configuration: {0}")]
    InvalidRules(String),
}

impl ScanError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }
}
