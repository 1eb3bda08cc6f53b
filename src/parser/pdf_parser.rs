use super::classifier::{char_len, Classification, StructuralClassifier};
use super::*;
use crate::config::PdfConfig;
use crate::markup::collapse_whitespace;
use image::ImageFormat;
use pdfium_render::prelude::*;
use regex::Regex;
use std::io::Cursor;
use std::panic;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// 段落分隔：空行，或句号后接两个以上空白（句号保留）
static FRAGMENT_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n|\.\s{2,}").expect("valid fragment separator"));

/// 页面渲染
///
/// 文字过少的页面（扫描页、插图页）整页渲染为 PNG
pub trait PageRenderer {
    /// 渲染第 `index` 页（从 0 开始），返回 PNG 字节
    fn render_page(&mut self, index: usize) -> Result<Vec<u8>>;
}

/// 基于 pdfium 的渲染器
pub struct PdfiumRenderer<'a> {
    document: PdfDocument<'a>,
    width: i32,
}

impl<'a> PdfiumRenderer<'a> {
    pub fn open(pdfium: &'a Pdfium, bytes: &'a [u8], width: i32) -> Result<Self> {
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| IngestError::ResourceExtractionFailure(format!("pdfium 打开文档失败: {:?}", e)))?;
        Ok(Self { document, width })
    }
}

impl PageRenderer for PdfiumRenderer<'_> {
    fn render_page(&mut self, index: usize) -> Result<Vec<u8>> {
        let failure = |what: &str, e: &dyn std::fmt::Debug| {
            IngestError::ResourceExtractionFailure(format!("第 {} 页{}: {:?}", index + 1, what, e))
        };

        let page_index = PdfPageIndex::try_from(index).map_err(|e| failure("页码越界", &e))?;
        let page = self
            .document
            .pages()
            .get(page_index)
            .map_err(|e| failure("读取失败", &e))?;

        // 位图在本函数结束时释放
        let bitmap = page
            .render_with_config(&PdfRenderConfig::new().set_target_width(self.width))
            .map_err(|e| failure("渲染失败", &e))?;

        let mut png = Vec::new();
        bitmap
            .as_image()
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| failure("PNG 编码失败", &e))?;
        Ok(png)
    }
}

/// pdfium 不可用时的渲染器，所有图片页都被跳过
pub struct NoRenderer;

impl PageRenderer for NoRenderer {
    fn render_page(&mut self, index: usize) -> Result<Vec<u8>> {
        Err(IngestError::ResourceExtractionFailure(format!(
            "第 {} 页需要渲染，但 pdfium 不可用",
            index + 1
        )))
    }
}

/// 绑定 pdfium 动态库：先找当前目录，再找系统库
fn bind_pdfium() -> Option<Pdfium> {
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| warn!(error = ?e, "无法加载 pdfium，图片页将被跳过"))
        .ok()
}

/// PDF 解析器
///
/// 逐页提取文本；文字过少的页面渲染为图片段落。
/// 章节来自显式章节标记，没有标记时按固定页数强制切分
#[derive(Clone)]
pub struct PdfParser;

impl PdfParser {
    /// 创建新的 PDF 解析器实例
    pub fn new() -> Self {
        Self
    }

    /// 提取每页文本
    ///
    /// pdf-extract 在遇到损坏或加密的文档时可能直接 panic，这里统一转成错误
    fn extract_page_texts(&self, bytes: &[u8]) -> Result<Vec<String>> {
        match panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(IngestError::CorruptOrProtectedSource(e.to_string())),
            Err(_) => Err(IngestError::CorruptOrProtectedSource(
                "PDF 解码器异常终止".to_string(),
            )),
        }
    }

    /// 分割页面文本为片段
    ///
    /// 折叠空白，丢弃过短的片段
    fn split_fragments(&self, text: &str, min_chars: usize) -> Vec<String> {
        let mut fragments = Vec::new();
        let mut last = 0;

        for m in FRAGMENT_SEPARATOR.find_iter(text) {
            let mut fragment = text[last..m.start()].to_string();
            if m.as_str().starts_with('.') {
                fragment.push('.');
            }
            fragments.push(fragment);
            last = m.end();
        }
        fragments.push(text[last..].to_string());

        fragments
            .iter()
            .map(|f| collapse_whitespace(f))
            .filter(|f| char_len(f) >= min_chars)
            .collect()
    }

    /// 按页顺序构建章节
    pub fn extract_chapters(
        &self,
        pages: &[String],
        renderer: &mut dyn PageRenderer,
        config: &PdfConfig,
        classifier: &StructuralClassifier,
    ) -> Vec<ChapterData> {
        let mut chapters = Vec::new();
        let mut current = ChapterData::default();
        let mut explicit_markers = false;

        for (index, raw) in pages.iter().enumerate() {
            // 没有显式章节标记时，每隔固定页数强制切分
            if index > 0
                && config.chapter_page_interval > 0
                && index % config.chapter_page_interval == 0
                && !explicit_markers
                && current.blocks.len() > config.forced_split_min_paragraphs
            {
                debug!(page = index + 1, "按页数强制切分章节");
                chapters.push(std::mem::take(&mut current));
            }

            let page_text = collapse_whitespace(raw);
            if char_len(&page_text) < config.min_page_text {
                let label = format!("[Page {}]", index + 1);
                match renderer.render_page(index) {
                    Ok(png) => current.blocks.push(BlockData::Image {
                        payload: ImagePayload::from_bytes(&png, "page.png", &label),
                        label,
                    }),
                    Err(e) => warn!(page = index + 1, error = %e, "页面渲染失败，跳过"),
                }
                continue;
            }

            for fragment in self.split_fragments(raw, config.min_fragment_chars) {
                match classifier.classify_fragment(&fragment) {
                    Classification::ChapterBoundary => {
                        explicit_markers = true;
                        if current.is_empty() {
                            current.title = Some(fragment);
                        } else {
                            chapters.push(std::mem::replace(
                                &mut current,
                                ChapterData::new(Some(fragment)),
                            ));
                        }
                    }
                    Classification::Heading(level) => current.blocks.push(BlockData::Heading {
                        text: fragment,
                        level,
                    }),
                    Classification::Paragraph => current.blocks.push(BlockData::Paragraph(fragment)),
                }
            }
        }

        if !current.is_empty() || chapters.is_empty() {
            chapters.push(current);
        }
        chapters
    }
}

impl Parser for PdfParser {
    fn parse(&self, bytes: &[u8], file_name: &str, config: &IngestConfig) -> Result<ParseResult> {
        // 1. 提取每页文本
        let pages = self.extract_page_texts(bytes)?;
        info!(pages = pages.len(), "PDF 文本提取完成");

        // 2. 只有存在图片页时才加载 pdfium
        let needs_render = pages
            .iter()
            .any(|p| char_len(&collapse_whitespace(p)) < config.pdf.min_page_text);
        let pdfium = if needs_render { bind_pdfium() } else { None };
        let mut pdfium_renderer = pdfium.as_ref().and_then(|p| {
            PdfiumRenderer::open(p, bytes, config.pdf.render_width)
                .map_err(|e| warn!(error = %e, "无法打开渲染文档"))
                .ok()
        });
        let mut fallback = NoRenderer;
        let renderer: &mut dyn PageRenderer = match pdfium_renderer.as_mut() {
            Some(r) => r,
            None => &mut fallback,
        };

        // 3. 逐页分类并切分章节
        let classifier = StructuralClassifier::from_config(&config.classifier);
        let chapters = self.extract_chapters(&pages, renderer, &config.pdf, &classifier);

        let mut result = ParseResult::new(chapters, ParseQuality::Light);
        if result.total_blocks() == 0 {
            return Err(IngestError::NoReadableContent(format!(
                "{}: 所有页面都没有可用的文字或图片",
                file_name
            )));
        }
        result.page_count = Some(pages.len());
        Ok(result)
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Pdf
    }

    fn get_quality(&self) -> ParseQuality {
        ParseQuality::Light
    }

    fn supported_extensions(&self) -> Vec<&str> {
        vec!["pdf"]
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}
