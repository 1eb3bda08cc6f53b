//! 书籍导入管线
//!
//! 把 TXT / PDF / EPUB 文件解析为统一的 Book → Chapter → Paragraph 模型，
//! 供阅读、朗读和翻译模块使用。
//!
//! ```no_run
//! use book_ingest::{IngestConfig, Ingestor};
//!
//! let ingestor = Ingestor::new(IngestConfig::default());
//! let book = ingestor.parse_path(std::path::Path::new("活着.txt"))?;
//! println!("{} 共 {} 章", book.title, book.chapters.len());
//! # Ok::<(), book_ingest::IngestError>(())
//! ```

use std::fs;
use std::path::Path;

use tracing::info;

pub mod archive;
pub mod builder;
pub mod config;
pub mod error;
pub mod import_queue;
pub mod language;
pub mod markup;
pub mod model;
pub mod parser;
pub mod resolver;

#[cfg(test)]
mod test_support;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use import_queue::{ImportOutcome, ImportQueue, ImportStatus, ImportTask};
pub use language::LanguageFamily;
pub use model::{Book, Chapter, Cover, ImagePayload, Paragraph, ParagraphKind, ParseQuality, SourceKind};

use builder::BookBuilder;
use parser::ParserRouter;

/// 导入入口
///
/// 持有配置与解析器路由表，可以在多个线程间共享
pub struct Ingestor {
    config: IngestConfig,
    router: ParserRouter,
}

impl Ingestor {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            router: ParserRouter::new(),
        }
    }

    /// 是否支持该扩展名
    pub fn supports(&self, extension: &str) -> bool {
        self.router.supports(extension)
    }

    /// 解析内存中的文件
    ///
    /// # 参数
    /// - `bytes`: 文件完整内容
    /// - `file_name`: 原始文件名，书名缺失时使用
    /// - `extension`: 声明的扩展名（txt / pdf / epub，不区分大小写）
    pub fn parse(&self, bytes: &[u8], file_name: &str, extension: &str) -> Result<Book> {
        let parser = self.router.route(extension)?;
        info!(file_name, extension, size = bytes.len(), "开始解析");

        let result = parser.parse(bytes, file_name, &self.config)?;
        BookBuilder::new(&self.config.book).build(parser.source_kind(), file_name, result)
    }

    /// 读取并解析文件，扩展名取自路径
    pub fn parse_path(&self, path: &Path) -> Result<Book> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        // 不支持的格式不必读取文件
        self.router.route(extension)?;

        let bytes = fs::read(path).map_err(|e| IngestError::io(path, e))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.parse(&bytes, file_name, extension)
    }
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new(IngestConfig::default())
    }
}

/// 使用默认配置解析一个文件
pub fn parse_book(bytes: &[u8], file_name: &str, extension: &str) -> Result<Book> {
    Ingestor::default().parse(bytes, file_name, extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{minimal_pdf, xhtml, EpubFixture};

    fn outline(book: &Book) -> Vec<(String, Vec<(String, &'static str)>)> {
        book.chapters
            .iter()
            .map(|c| {
                (
                    c.title.clone(),
                    c.paragraphs
                        .iter()
                        .map(|p| (p.text.clone(), p.kind.name()))
                        .collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_minimal_txt() {
        let text = "Chapter One\nIt was a dark and stormy night.\nA Quiet Evening\nThe end came quickly.";
        let book = parse_book(text.as_bytes(), "storm.txt", "txt").unwrap();

        assert_eq!(book.chapters.len(), 1);
        assert_eq!(book.chapters[0].title, "Chapter One");
        assert_eq!(book.chapters[0].paragraphs.len(), 3);
        assert_eq!(book.chapters[0].paragraphs[1].heading_level(), Some(2));
        assert_eq!(book.title, "storm");
        assert_eq!(book.source, SourceKind::Txt);
        assert_eq!(book.quality, ParseQuality::Light);
        assert_eq!(book.pages, 1);
        assert_eq!(book.language, "en");
        assert!(book.cover.is_placeholder());
        assert!(book.synopsis.starts_with("Chapter One"));
    }

    #[test]
    fn test_minimal_epub() {
        let bytes = EpubFixture::new()
            .package(
                "OEBPS/content.opf",
                "<dc:title>小城故事</dc:title><dc:creator>佚名</dc:creator>",
                r#"<item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>"#,
                &["ch1"],
            )
            .file(
                "OEBPS/ch1.xhtml",
                xhtml("", "<h1>第一章</h1><p>小城的清晨总是来得很早，街上已经有了卖早点的人。</p>"),
            )
            .build();

        let book = parse_book(&bytes, "town.epub", "EPUB").unwrap();
        assert_eq!(book.title, "小城故事");
        assert_eq!(book.author, "佚名");
        assert_eq!(book.language, "zh");
        assert_eq!(book.quality, ParseQuality::Native);
        assert_eq!(book.chapters[0].title, "第一章");
        assert!(book.id.starts_with("epub-"));
        assert!(book.pages >= 1);
    }

    #[test]
    fn test_minimal_pdf() {
        let bytes = minimal_pdf(&[
            "Chapter 1 The Beginning",
            "It was the best of times, it was the worst of times, it was the age of wisdom, it was the age of foolishness.",
        ]);
        let book = parse_book(&bytes, "tale.pdf", "pdf").unwrap();

        assert_eq!(book.source, SourceKind::Pdf);
        assert_eq!(book.title, "tale");
        assert_eq!(book.pages, 1);
        assert_eq!(book.chapters.len(), 1);
        assert_eq!(book.chapters[0].title, "Chapter 1 The Beginning");
        assert_eq!(book.chapters[0].paragraphs.len(), 1);
        assert_eq!(book.chapters[0].paragraphs[0].kind, ParagraphKind::Plain);
        assert_eq!(book.language, "en");
    }

    #[test]
    fn test_unsupported_format() {
        let err = parse_book(b"PK", "doc.docx", "docx").unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat(_)));
        assert!(!Ingestor::default().supports("mobi"));
    }

    #[test]
    fn test_parse_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("散文.txt");
        fs::write(&path, "第一章 春\n盼望着，盼望着，东风来了，春天的脚步近了。").unwrap();

        let book = Ingestor::default().parse_path(&path).unwrap();
        assert_eq!(book.title, "散文");
        assert_eq!(book.chapters[0].title, "第一章 春");
        assert_eq!(book.language, "zh");

        let missing = dir.path().join("missing.txt");
        assert!(matches!(
            Ingestor::default().parse_path(&missing),
            Err(IngestError::Io { .. })
        ));
        // 扩展名不支持时不读取文件
        assert!(matches!(
            Ingestor::default().parse_path(&dir.path().join("missing.mobi")),
            Err(IngestError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_idempotent_parse() {
        let text = "第一章 开始\n这是第一段正文内容。\n\n第二章 继续\n这是第二段正文内容。";
        let ingestor = Ingestor::default();
        let first = ingestor.parse(text.as_bytes(), "a.txt", "txt").unwrap();
        let second = ingestor.parse(text.as_bytes(), "a.txt", "txt").unwrap();

        assert_eq!(outline(&first), outline(&second));
        assert_eq!(first.chapters.len(), 2);

        // 翻译结果按位置回填
        let para = first.paragraph_at(1, 0).unwrap();
        assert_eq!(para.text, "这是第二段正文内容。");
        assert_eq!(para.id, "p-2");
        assert!(first.paragraph_at(2, 0).is_none());
    }

    #[test]
    fn test_custom_config() {
        let config = IngestConfig::from_toml_str("[book]\nparagraphs_per_page = 1\n").unwrap();
        let book = Ingestor::new(config)
            .parse(b"one line.\ntwo line.\nthree line.", "a.txt", "txt")
            .unwrap();
        assert_eq!(book.pages, 3);
    }

    #[test]
    fn test_book_serializes() {
        let book = parse_book("Hello world, this is text.".as_bytes(), "a.txt", "txt").unwrap();
        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["chapters"][0]["paragraphs"][0]["kind"], "plain");
        assert_eq!(json["cover"]["type"], "placeholder");
        assert_eq!(json["source"], "txt");
    }
}
