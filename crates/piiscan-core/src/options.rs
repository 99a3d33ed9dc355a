//! 扫描选项与取消标志（模块）
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 嵌套压缩包的默认最大深度
pub const DEFAULT_MAX_ARCHIVE_DEPTH: usize = 8;
/// 目录遍历的默认最大深度
pub const DEFAULT_MAX_WALK_DEPTH: usize = 64;
/// 单次调用解压总字节上限（1 GiB），防止压缩炸弹
pub const DEFAULT_MAX_EXTRACTED_BYTES: u64 = 1024 * 1024 * 1024;

/// 调用方持有的取消标志，可跨线程克隆共享
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消：正在进行的解压/遍历会在下一个检查点退出
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 扫描选项
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// 检测线程数：None 表示自动（等于 CPU 核数）；Some(1) 走串行
    pub threads: Option<usize>,
    /// 遍历模式下的最大文件大小（字节）；超过则跳过
    pub max_file_size: Option<u64>,
    /// 嵌套压缩包最大层数（顶层压缩包为第 1 层）
    pub max_archive_depth: usize,
    /// 解压目录内的最大遍历深度
    pub max_walk_depth: usize,
    /// 单次调用允许解压的总字节数
    pub max_extracted_bytes: u64,
    /// 临时目录根；为空则使用系统临时目录
    pub scratch_root: Option<PathBuf>,
    /// 取消标志
    pub cancel: CancelFlag,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            threads: None,
            max_file_size: None,
            max_archive_depth: DEFAULT_MAX_ARCHIVE_DEPTH,
            max_walk_depth: DEFAULT_MAX_WALK_DEPTH,
            max_extracted_bytes: DEFAULT_MAX_EXTRACTED_BYTES,
            scratch_root: None,
            cancel: CancelFlag::default(),
        }
    }
}

impl ScanOptions {
    /// 实际使用的检测线程数
    pub(crate) fn effective_threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}
