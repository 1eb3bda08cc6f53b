//! inspect_book：解析书籍文件并输出章节大纲或完整 JSON。
//!
//! 用于检查导入管线对某个文件的解析结果。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use book_ingest::{Book, ImportQueue, ImportStatus, IngestConfig, IngestError, Ingestor, ParagraphKind};
use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use tracing::info;

/// 解析 TXT / PDF / EPUB 文件，查看统一书籍模型
#[derive(Parser)]
#[command(name = "inspect_book", version, about, long_about = None)]
struct Cli {
    /// 要解析的文件（多个文件时并发导入）
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// 覆盖声明的扩展名（仅单个文件）
    #[arg(short, long)]
    extension: Option<String>,

    /// TOML 配置文件
    #[arg(short, long, env = "BOOK_INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// 输出完整 Book JSON
    #[arg(long)]
    json: bool,

    /// 批量导入的并发数
    #[arg(short, long, default_value_t = 3)]
    jobs: usize,

    /// 日志格式：text（默认）或 json
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// 日志详细程度（-v, -vv）
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// 日志写到 stderr，stdout 只留给解析结果
fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "book_ingest=warn,inspect_book=info",
        1 => "book_ingest=debug,inspect_book=debug",
        _ => "book_ingest=trace,inspect_book=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = match &cli.config {
        Some(path) => IngestConfig::load(path)
            .wrap_err_with(|| format!("无法加载配置 {}", path.display()))?,
        None => IngestConfig::default(),
    };
    let ingestor = Arc::new(Ingestor::new(config));

    if let [path] = cli.paths.as_slice() {
        let book = parse_single(&ingestor, path, cli.extension.as_deref())
            .map_err(|e| report(path, &e))?;
        print_book(&book, cli.json)?;
        return Ok(());
    }

    if cli.extension.is_some() {
        return Err(eyre!("--extension 只能用于单个文件"));
    }
    run_batch(ingestor, &cli).await
}

fn parse_single(ingestor: &Ingestor, path: &Path, extension: Option<&str>) -> book_ingest::Result<Book> {
    match extension {
        Some(ext) => {
            let bytes = fs::read(path).map_err(|e| IngestError::io(path, e))?;
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            ingestor.parse(&bytes, file_name, ext)
        }
        None => ingestor.parse_path(path),
    }
}

async fn run_batch(ingestor: Arc<Ingestor>, cli: &Cli) -> Result<()> {
    let queue = ImportQueue::new(cli.jobs);
    for path in &cli.paths {
        queue.submit(path.as_path())?;
    }

    let outcomes = queue.run_batch(ingestor).await;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(book) => print_book(book, cli.json)?,
            Err(e) => {
                let _ = report(&outcome.file_path, e);
            }
        }
    }

    // 异常终止的任务不会进入已结束列表，按未完成计
    let completed = queue
        .take_finished()?
        .iter()
        .filter(|t| t.status == ImportStatus::Completed)
        .count();
    let failed = outcomes.len().saturating_sub(completed);
    info!(total = outcomes.len(), failed, "批量导入结束");
    if failed > 0 {
        return Err(eyre!("{} / {} 个文件导入失败", failed, outcomes.len()));
    }
    Ok(())
}

/// 打印错误与处理建议
fn report(path: &Path, error: &IngestError) -> color_eyre::Report {
    eprintln!("{}: {}", path.display(), error);
    eprintln!("  提示: {}", error.user_hint());
    eyre!("解析失败: {}", path.display())
}

fn print_book(book: &Book, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(book)?);
        return Ok(());
    }

    println!("《{}》 {}", book.title, book.author);
    println!(
        "  id={} 格式={} 语言={} 页数={} 段落={} 封面={}",
        book.id,
        book.source.as_str(),
        book.language,
        book.pages,
        book.paragraph_count(),
        if book.cover.is_placeholder() { "占位" } else { "图片" },
    );
    if !book.synopsis.is_empty() {
        println!("  简介: {}", book.synopsis.chars().take(60).collect::<String>());
    }

    for chapter in &book.chapters {
        let images = chapter.paragraphs.iter().filter(|p| p.is_image()).count();
        println!(
            "  {} {} ({} 段, {} 图)",
            chapter.id,
            chapter.title,
            chapter.paragraphs.len(),
            images
        );
        for paragraph in &chapter.paragraphs {
            if let ParagraphKind::Heading { level } = paragraph.kind {
                println!("    {}{}", "#".repeat(level as usize), paragraph.text);
            }
        }
    }
    Ok(())
}
