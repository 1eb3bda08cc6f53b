use std::collections::HashMap;
use std::path::Path;

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::model::{Cover, ImagePayload, ParseQuality, SourceKind};

// 子模块声明
pub mod classifier;
pub mod epub_package;
pub mod epub_parser;
pub mod pdf_parser;
pub mod txt_parser;

/// 章节数据
///
/// 提取器输出的一个章节，标题缺失时由构建器补成 `Chapter N`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterData {
    /// 章节标题
    pub title: Option<String>,
    /// 章节内容块列表
    pub blocks: Vec<BlockData>,
}

impl ChapterData {
    pub fn new(title: Option<String>) -> Self {
        Self {
            title,
            blocks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// 内容块数据
///
/// 表示文档的基本单元（段落、标题、图片）
#[derive(Debug, Clone, PartialEq)]
pub enum BlockData {
    Paragraph(String),
    Heading { text: String, level: u8 },
    /// `label` 是图片段落的回退文本
    Image { payload: ImagePayload, label: String },
}

/// 解析结果
///
/// 提取器只负责内容与元数据，ID、页数、语言等由构建器统一生成
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub title: Option<String>,
    pub author: Option<String>,
    /// 提取器已经确定的简介；`None` 时由构建器从正文截取
    pub synopsis: Option<String>,
    /// `None` 时使用占位封面
    pub cover: Option<Cover>,
    /// 解析得到的章节列表
    pub chapters: Vec<ChapterData>,
    /// 源文档自带的页数（PDF）；`None` 时按段落数估算
    pub page_count: Option<usize>,
    /// 解析质量等级
    pub quality: ParseQuality,
}

impl ParseResult {
    pub fn new(chapters: Vec<ChapterData>, quality: ParseQuality) -> Self {
        Self {
            title: None,
            author: None,
            synopsis: None,
            cover: None,
            chapters,
            page_count: None,
            quality,
        }
    }

    /// 所有章节的块总数
    pub fn total_blocks(&self) -> usize {
        self.chapters.iter().map(|c| c.blocks.len()).sum()
    }
}

/// Parser trait
///
/// 所有格式解析器必须实现此 trait
pub trait Parser: Send + Sync {
    /// 解析文件
    ///
    /// # 参数
    /// - `bytes`: 文件完整内容
    /// - `file_name`: 原始文件名，用于回退书名
    /// - `config`: 启发式阈值
    ///
    /// # 返回
    /// 解析结果，包含章节、元数据和质量信息
    fn parse(&self, bytes: &[u8], file_name: &str, config: &IngestConfig) -> Result<ParseResult>;

    /// 源格式
    fn source_kind(&self) -> SourceKind;

    /// 获取解析质量等级
    fn get_quality(&self) -> ParseQuality;

    /// 获取支持的文件扩展名列表
    fn supported_extensions(&self) -> Vec<&str>;
}

/// Parser 路由器
///
/// 根据声明的扩展名路由到对应的解析器
pub struct ParserRouter {
    /// 扩展名到解析器的映射
    parsers: HashMap<String, Box<dyn Parser>>,
}

impl ParserRouter {
    /// 创建新的路由器实例
    ///
    /// 注册所有可用的解析器
    pub fn new() -> Self {
        let mut parsers: HashMap<String, Box<dyn Parser>> = HashMap::new();

        // 注册 EPUB 解析器
        let epub = Box::new(epub_parser::EpubParser::new());
        for ext in epub.supported_extensions() {
            parsers.insert(ext.to_string(), epub.clone());
        }

        // 注册 TXT 解析器
        let txt = Box::new(txt_parser::TxtParser::new());
        for ext in txt.supported_extensions() {
            parsers.insert(ext.to_string(), txt.clone());
        }

        // 注册 PDF 解析器
        let pdf = Box::new(pdf_parser::PdfParser::new());
        for ext in pdf.supported_extensions() {
            parsers.insert(ext.to_string(), pdf.clone());
        }

        Self { parsers }
    }

    /// 根据扩展名路由到对应的解析器
    ///
    /// 扩展名不区分大小写，允许带前导 `.`
    pub fn route(&self, extension: &str) -> Result<&dyn Parser> {
        let ext = normalize_extension(extension);
        self.parsers
            .get(&ext)
            .map(|p| p.as_ref())
            .ok_or(IngestError::UnsupportedFormat(ext))
    }

    /// 获取所有支持的文件扩展名
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.parsers.keys().cloned().collect();
        exts.sort();
        exts
    }

    /// 检查是否支持指定的文件扩展名
    pub fn supports(&self, extension: &str) -> bool {
        self.parsers.contains_key(&normalize_extension(extension))
    }
}

impl Default for ParserRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

/// 文件名去掉扩展名作为回退书名
pub fn title_from_file_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_router_creation() {
        let router = ParserRouter::new();
        assert_eq!(router.supported_extensions(), vec!["epub", "pdf", "txt"]);
        assert!(router.supports("epub"));
        assert!(router.supports("TXT"));
        assert!(router.supports(".pdf"));
    }

    #[test]
    fn test_parser_router_dispatch() {
        let router = ParserRouter::new();
        assert_eq!(router.route("epub").unwrap().source_kind(), SourceKind::Epub);
        assert_eq!(router.route("Pdf").unwrap().source_kind(), SourceKind::Pdf);
        assert_eq!(router.route("txt").unwrap().source_kind(), SourceKind::Txt);
    }

    #[test]
    fn test_parser_router_quality() {
        let router = ParserRouter::new();
        assert_eq!(router.route("epub").unwrap().get_quality(), ParseQuality::Native);
        assert_eq!(router.route("txt").unwrap().get_quality(), ParseQuality::Light);
        assert_eq!(router.route("pdf").unwrap().get_quality(), ParseQuality::Light);
    }

    #[test]
    fn test_parser_router_unsupported_format() {
        let router = ParserRouter::new();
        match router.route("docx") {
            Err(IngestError::UnsupportedFormat(ext)) => assert_eq!(ext, "docx"),
            _ => panic!("docx 应当被拒绝"),
        }
        assert!(router.route("").is_err());
    }

    #[test]
    fn test_title_from_file_name() {
        assert_eq!(title_from_file_name("活着.txt"), "活着");
        assert_eq!(title_from_file_name("books/Moby Dick.epub"), "Moby Dick");
        assert_eq!(title_from_file_name(""), "Untitled");
    }
}
