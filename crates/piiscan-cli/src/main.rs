use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use piiscan_core::{scan_with, RiskLevel, RuleTable, ScanOptions};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "piiscan", version, about = "社交平台导出包 PII 风险扫描")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 扫描导出包（.zip）或单个文档（.json/.csv/.html）并生成报告
    Scan {
        /// 输入文件
        #[arg(long)]
        input: PathBuf,

        /// 输出报告（JSON）
        #[arg(long, default_value = "./report.json")]
        output: PathBuf,

        /// 检测线程数（"auto"=CPU 核心数）
        #[arg(long, default_value = "auto")]
        threads: String,

        /// 规则文件路径（TOML）；为空则使用内置规则
        #[arg(long)]
        rules: Option<PathBuf>,

        /// 压缩包内单文件大小上限（字节）
        #[arg(long)]
        max_file_size: Option<u64>,

        /// 临时解压目录的根目录（默认系统临时目录）
        #[arg(long)]
        scratch_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { input, output, threads, rules, max_file_size, scratch_dir } => {
            info!(?input, ?output, "starting scan");

            let table = match &rules {
                Some(path) => RuleTable::from_toml_path(path).context("load rule file")?,
                None => RuleTable::builtin(),
            };
            let content = std::fs::read(&input).with_context(|| format!("read {}", input.display()))?;
            let filename = input
                .file_name()
                .and_then(|s| s.to_str())
                .context("input path has no usable file name")?;

            let opts = ScanOptions {
                threads: parse_threads(&threads),
                max_file_size,
                scratch_root: scratch_dir,
                ..ScanOptions::default()
            };
            let report = scan_with(&content, filename, &table, &opts).context("scan failed")?;

            let mut out = BufWriter::new(File::create(&output).context("create output file")?);
            serde_json::to_writer_pretty(&mut out, &report).context("write report")?;
            out.flush().context("flush report")?;

            info!(
                items = report.summary.total_items,
                safe = report.summary.count(RiskLevel::Safe),
                low = report.summary.count(RiskLevel::Low),
                medium = report.summary.count(RiskLevel::Medium),
                high = report.summary.count(RiskLevel::High),
                "scan finished"
            );
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 解析线程参数
fn parse_threads(s: &str) -> Option<usize> {
    if s.eq_ignore_ascii_case("auto") {
        return None;
    }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Some(n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threads_argument() {
        assert_eq!(parse_threads("auto"), None);
        assert_eq!(parse_threads("AUTO"), None);
        assert_eq!(parse_threads("4"), Some(4));
        assert_eq!(parse_threads("0"), None);
        assert_eq!(parse_threads("many"), None);
    }

    #[test]
    fn cli_parses_scan_command() {
        let cli = Cli::try_parse_from(["piiscan", "scan", "--input", "export.zip", "--threads", "2"]).unwrap();
        match cli.command {
            Commands::Scan { input, output, threads, .. } => {
                assert_eq!(input, PathBuf::from("export.zip"));
                assert_eq!(output, PathBuf::from("./report.json"));
                assert_eq!(threads, "2");
            }
        }
    }
}
