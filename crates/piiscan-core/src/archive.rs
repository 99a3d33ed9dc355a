//! 压缩包解包与目录遍历
//!
//! - 每次调用独占一个临时目录（前缀含单调递增的调用号），任何退出路径都会删除。
//! - 解压后按文件名排序深度优先遍历，遇到子压缩包立即递归，保证发现顺序稳定。
//! - 嵌套层数、遍历深度、解压总字节均有上限；已访问路径去重，保证遍历必然终止。
//! - 遍历模式下单文件的解析失败或未知扩展名只跳过该文件。
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::ScanError;
use crate::options::{CancelFlag, ScanOptions};
use crate::parsers::{parse_document, DocumentFormat};
use crate::types::TextFragment;

/// 进程内调用序号，用于区分并发扫描的临时目录
static CALL_SEQ: AtomicU64 = AtomicU64::new(0);

/// 嵌套压缩包在来源路径中的分隔符
const NESTED_SEPARATOR: &str = "!/";
/// 解压单个条目时的分块大小；每块之后检查一次取消
const COPY_CHUNK: usize = 64 * 1024;

pub(crate) fn is_archive_extension(ext: &str) -> bool {
    ext.eq_ignore_ascii_case("zip")
}

fn is_archive_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(is_archive_extension)
}

/// 单次调用独占的临时目录；drop 时删除整个目录树
pub(crate) struct ScratchDir {
    call_id: u64,
    dir: TempDir,
}

impl ScratchDir {
    pub(crate) fn acquire(opts: &ScanOptions) -> Result<Self, ScanError> {
        let call_id = CALL_SEQ.fetch_add(1, Ordering::Relaxed);
        let prefix = format!("piiscan-{call_id}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match &opts.scratch_root {
            Some(root) => {
                fs::create_dir_all(root).map_err(|e| ScanError::io("creating scratch root", e))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| ScanError::io("creating scratch directory", e))?;
        debug!(call_id, path = %dir.path().display(), "scratch directory acquired");
        Ok(Self { call_id, dir })
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    /// 成功路径显式删除，使删除失败能作为错误上抛
    pub(crate) fn release(self) -> Result<(), ScanError> {
        let call_id = self.call_id;
        self.dir.close().map_err(|e| ScanError::io("removing scratch directory", e))?;
        debug!(call_id, "scratch directory released");
        Ok(())
    }
}

/// 遍历统计（便于日志输出）
#[derive(Debug, Default, Clone)]
pub(crate) struct WalkStats {
    pub(crate) archives_opened: usize,
    pub(crate) files_parsed: usize,
    pub(crate) files_skipped: usize,
}

/// 解压顶层压缩包并返回按发现顺序排列的文本片段
pub(crate) fn collect_archive_fragments(
    content: &[u8],
    opts: &ScanOptions,
) -> Result<(Vec<TextFragment>, WalkStats), ScanError> {
    let scratch = ScratchDir::acquire(opts)?;
    let result = {
        let mut walker = Walker::new(opts, scratch.path());
        walker.walk_archive(Cursor::new(content), "", 1).map(|()| (walker.fragments, walker.stats))
    };
    // 出错时 scratch 在此处被 drop，目录同样会被删除
    let out = result?;
    scratch.release()?;
    Ok(out)
}

struct Walker<'a> {
    opts: &'a ScanOptions,
    scratch: &'a Path,
    next_dir: usize,
    extracted_bytes: u64,
    visited: HashSet<PathBuf>,
    fragments: Vec<TextFragment>,
    stats: WalkStats,
}

impl<'a> Walker<'a> {
    fn new(opts: &'a ScanOptions, scratch: &'a Path) -> Self {
        Self {
            opts,
            scratch,
            next_dir: 0,
            extracted_bytes: 0,
            visited: HashSet::new(),
            fragments: Vec::new(),
            stats: WalkStats::default(),
        }
    }

    fn check_cancelled(&self) -> Result<(), ScanError> {
        if self.opts.cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        Ok(())
    }

    /// 解压到新的子目录并遍历；`depth` 从 1（顶层压缩包）开始
    fn walk_archive<R: Read + Seek>(&mut self, reader: R, origin_prefix: &str, depth: usize) -> Result<(), ScanError> {
        let dest = self.scratch.join(format!("x{:04}", self.next_dir));
        self.next_dir += 1;
        fs::create_dir(&dest).map_err(|e| ScanError::io("creating extraction directory", e))?;

        self.extract(reader, &dest)?;
        self.stats.archives_opened += 1;
        self.walk_dir(&dest, origin_prefix, depth)
    }

    fn extract<R: Read + Seek>(&mut self, reader: R, dest: &Path) -> Result<(), ScanError> {
        let malformed = |what: &str, e: &dyn std::fmt::Display| ScanError::MalformedArchive(format!("{what}: {e}"));
        let mut archive = ZipArchive::new(reader).map_err(|e| malformed("opening zip", &e))?;

        for i in 0..archive.len() {
            self.check_cancelled()?;
            let mut entry = archive.by_index(i).map_err(|e| malformed("reading entry", &e))?;
            // enclosed_name 拒绝绝对路径与 `..`，防止写出临时目录
            let out_path = match entry.enclosed_name() {
                Some(rel) => dest.join(rel),
                None => {
                    warn!(entry = entry.name(), "skipping archive entry with unsafe path");
                    continue;
                }
            };
            if entry.is_dir() {
                fs::create_dir_all(&out_path).map_err(|e| malformed("creating directory", &e))?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| malformed("creating directory", &e))?;
            }

            let remaining = self.opts.max_extracted_bytes.saturating_sub(self.extracted_bytes);
            let mut out = File::create(&out_path).map_err(|e| malformed("creating file", &e))?;
            let written = copy_entry(&mut entry, &mut out, remaining, &self.opts.cancel)?;
            // 部分写入同样计入总量
            self.extracted_bytes = self.extracted_bytes.saturating_add(written);
            if written > remaining {
                return Err(ScanError::ExtractionLimit { limit: self.opts.max_extracted_bytes });
            }
        }
        Ok(())
    }

    fn walk_dir(&mut self, root: &Path, origin_prefix: &str, depth: usize) -> Result<(), ScanError> {
        let walk = WalkDir::new(root)
            .min_depth(1)
            .max_depth(self.opts.max_walk_depth)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walk {
            self.check_cancelled()?;
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            // 只处理普通文件；符号链接不跟随
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            if !self.visited.insert(canonical) {
                debug!(path = %path.display(), "already visited, skipping");
                continue;
            }

            let origin = format!("{origin_prefix}{}", relative_origin(root, path));
            if let Some(max) = self.opts.max_file_size {
                if entry.metadata().map(|md| md.len() > max).unwrap_or(false) {
                    debug!(%origin, "file exceeds size limit, skipping");
                    self.stats.files_skipped += 1;
                    continue;
                }
            }

            if is_archive_path(path) {
                self.walk_nested(path, &origin, depth)?;
            } else if let Some(format) = DocumentFormat::from_path(path) {
                self.parse_file(path, format, origin)?;
            } else {
                debug!(%origin, "no parser for extension, skipping");
                self.stats.files_skipped += 1;
            }
        }
        Ok(())
    }

    fn walk_nested(&mut self, path: &Path, origin: &str, depth: usize) -> Result<(), ScanError> {
        if depth >= self.opts.max_archive_depth {
            warn!(%origin, depth, "nested archive exceeds depth limit, skipping");
            self.stats.files_skipped += 1;
            return Ok(());
        }
        let file = File::open(path).map_err(|e| ScanError::io(format!("opening {origin}"), e))?;
        let prefix = format!("{origin}{NESTED_SEPARATOR}");
        match self.walk_archive(file, &prefix, depth + 1) {
            // 损坏的子压缩包只影响自身；已提取的片段保留
            Err(ScanError::MalformedArchive(reason)) => {
                warn!(%origin, %reason, "skipping malformed nested archive");
                self.stats.files_skipped += 1;
                Ok(())
            }
            other => other,
        }
    }

    fn parse_file(&mut self, path: &Path, format: DocumentFormat, origin: String) -> Result<(), ScanError> {
        let bytes = fs::read(path).map_err(|e| ScanError::io(format!("reading {origin}"), e))?;
        match parse_document(format, &bytes) {
            Ok(texts) => {
                debug!(%origin, fragments = texts.len(), "parsed");
                self.stats.files_parsed += 1;
                self.fragments.extend(texts.into_iter().map(|text| TextFragment::new(text, origin.clone())));
            }
            Err(err) => {
                warn!(%origin, error = %err, "skipping malformed document");
                self.stats.files_skipped += 1;
            }
        }
        Ok(())
    }
}

/// 分块复制单个条目，最多读取 `remaining + 1` 字节；返回值大于 `remaining` 即超限
fn copy_entry<R: Read, W: Write>(
    reader: &mut R,
    out: &mut W,
    remaining: u64,
    cancel: &CancelFlag,
) -> Result<u64, ScanError> {
    let limit = remaining.saturating_add(1);
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut written: u64 = 0;
    while written < limit {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        let want = (limit - written).min(COPY_CHUNK as u64) as usize;
        let n = match reader.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ScanError::MalformedArchive(format!("extracting entry: {e}"))),
        };
        out.write_all(&buf[..n])
            .map_err(|e| ScanError::MalformedArchive(format!("writing entry: {e}")))?;
        written += n as u64;
    }
    Ok(written)
}

/// 相对路径统一为 `/` 分隔
fn relative_origin(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
