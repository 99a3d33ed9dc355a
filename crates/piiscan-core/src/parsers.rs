//! 文档解析器：按扩展名把单个文件的字节转换为文本片段
//!
//! - JSON：先识别结构（顶层数组 / items 类字段 / 平台特有字段），再按字段白名单拼接文本。
//! - CSV：首行作表头，每个数据行拼成一个片段；结构损坏则整文件失败。
//! - HTML/文本：启发式提取标记分隔符之间 ≥5 字符的文本段，不做 DOM 解析。
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::Path;

use crate::error::ParseError;

/// 拼接为片段文本的自由文本字段（按此顺序）
const TEXT_FIELDS: &[&str] = &["text", "content", "caption", "title", "message", "bio", "description"];
/// `label: value` 形式的嵌套列表，展开为其中的 value
const VALUE_LISTS: &[&str] = &["string_list_data", "label_values"];
/// 通用条目容器字段（顶层数组之后依次尝试）
const ITEM_FIELDS: &[&str] = &["items", "data", "posts"];
/// 平台导出特有的容器字段
const ALTERNATE_FIELDS: &[&str] = &["relationships_followers", "relationships_following", "messages"];

/// HTML 文本段最少字符数
const MIN_HTML_RUN_CHARS: usize = 5;

static HTML_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>").expect("html noise pattern")
});
static HTML_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r">([^<>]+)<").expect("html run pattern"));

/// 可直接解析的单文档格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Csv,
    Html,
}

impl DocumentFormat {
    /// 扩展名（大小写不敏感）到格式的映射
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(Self::from_extension)
    }
}

/// 解析单个文档；失败只表示“该文件无法解析”，由调用方决定吸收还是上抛
pub fn parse_document(format: DocumentFormat, bytes: &[u8]) -> Result<Vec<String>, ParseError> {
    match format {
        DocumentFormat::Json => parse_json(bytes),
        DocumentFormat::Csv => parse_csv(bytes),
        DocumentFormat::Html => Ok(parse_html(bytes)),
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

/// JSON 结构识别结果
#[derive(Debug)]
enum JsonShape<'a> {
    Array(&'a [Value]),
    Field { name: &'static str, items: &'a [Value] },
    Empty,
}

/// 按固定优先级识别条目列表；都不匹配则视为无条目
fn detect_shape(root: &Value) -> JsonShape<'_> {
    if let Value::Array(items) = root {
        return JsonShape::Array(items);
    }
    if let Value::Object(map) = root {
        for &name in ITEM_FIELDS.iter().chain(ALTERNATE_FIELDS) {
            if let Some(Value::Array(items)) = map.get(name) {
                return JsonShape::Field { name, items };
            }
        }
    }
    JsonShape::Empty
}

fn parse_json(bytes: &[u8]) -> Result<Vec<String>, ParseError> {
    let root: Value = serde_json::from_slice(strip_bom(bytes))?;
    let items = match detect_shape(&root) {
        JsonShape::Array(items) => items,
        JsonShape::Field { name, items } => {
            tracing::trace!(field = name, count = items.len(), "json items container");
            items
        }
        JsonShape::Empty => return Ok(Vec::new()),
    };
    Ok(items.iter().filter_map(element_text).collect())
}

/// 单个条目的文本：字符串条目原样使用，对象条目按字段白名单拼接
fn element_text(item: &Value) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    match item {
        Value::String(s) => parts.push(s),
        Value::Object(map) => {
            for field in TEXT_FIELDS {
                if let Some(Value::String(s)) = map.get(*field) {
                    parts.push(s);
                }
            }
            for list in VALUE_LISTS {
                if let Some(Value::Array(entries)) = map.get(*list) {
                    collect_values(entries, &mut parts);
                }
            }
        }
        _ => {}
    }
    let text = parts.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");
    if text.is_empty() { None } else { Some(text) }
}

/// 展开 `{label, value}` 列表；`dict` 为嵌套的同构列表
fn collect_values<'a>(entries: &'a [Value], out: &mut Vec<&'a str>) {
    for entry in entries {
        if let Some(Value::String(v)) = entry.get("value") {
            out.push(v);
        }
        if let Some(Value::Array(nested)) = entry.get("dict") {
            collect_values(nested, out);
        }
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<String>, ParseError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(strip_bom(bytes));
    let keep: Vec<bool> = rdr.headers()?.iter().map(|h| !is_metadata_column(h)).collect();

    let mut out = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let text = record
            .iter()
            .zip(&keep)
            .filter(|(_, keep)| **keep)
            .map(|(v, _)| v.trim())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !text.is_empty() {
            out.push(text);
        }
    }
    Ok(out)
}

/// id、时间戳类列不拼入片段（纯数字时间戳会被误判为电话）
fn is_metadata_column(header: &str) -> bool {
    let name = header.trim().to_ascii_lowercase();
    name == "id"
        || name.ends_with("_id")
        || name.contains("timestamp")
        || matches!(name.as_str(), "created_at" | "updated_at" | "taken_at" | "date" | "time")
}

/// 启发式 HTML/文本提取；对任意输入都不会失败
fn parse_html(bytes: &[u8]) -> Vec<String> {
    let raw = String::from_utf8_lossy(bytes);
    let cleaned = HTML_NOISE.replace_all(&raw, "");
    // 首尾补分隔符，使标签外的纯文本也能成段
    let wrapped = format!(">{cleaned}<");
    HTML_RUN
        .captures_iter(&wrapped)
        .filter_map(|caps| caps.get(1))
        .map(|m| decode_entities(m.as_str().trim()))
        .filter(|run| run.chars().count() >= MIN_HTML_RUN_CHARS)
        .collect()
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
