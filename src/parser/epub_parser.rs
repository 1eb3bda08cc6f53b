use super::classifier::{char_len, StructuralClassifier};
use super::epub_package::{locate_package, PackageDocument, CONTAINER_PATH};
use super::*;
use crate::archive::ArchiveReader;
use crate::config::EpubConfig;
use crate::markup::{heading_level, is_block_tag, parse_html, Element};
use crate::resolver::PathResolver;
use std::io::Cursor;
use tracing::{debug, info, warn};

type Archive<'a> = ArchiveReader<Cursor<&'a [u8]>>;

/// 章节标题常用的 class 名
const TITLE_CLASSES: &[&str] = &["chapter-title", "chaptertitle", "chapter_title"];

const IMAGE_LABEL: &str = "[Image]";

/// 正文遍历产出的条目
///
/// 图片只记录引用，遍历结束后再统一解析
#[derive(Debug, Clone, PartialEq)]
enum WalkItem {
    Block(BlockData),
    ImageRef { src: String, alt: String },
}

/// 正文遍历的参数
struct WalkContext<'a> {
    title: Option<&'a str>,
    config: &'a EpubConfig,
}

/// EPUB 解析器
///
/// 支持标准 EPUB 格式的电子书解析
#[derive(Clone)]
pub struct EpubParser;

impl EpubParser {
    /// 创建新的 EPUB 解析器实例
    pub fn new() -> Self {
        Self
    }

    /// 打开容器并解析包文档
    fn open_package(&self, archive: &mut Archive) -> Result<PackageDocument> {
        let container = archive
            .read_string(CONTAINER_PATH)
            .map_err(|_| IngestError::MalformedContainer(format!("缺少 {}", CONTAINER_PATH)))?;
        let package_path = locate_package(&container)?;

        let package_xml = archive.read_string(&package_path).map_err(|_| {
            IngestError::MalformedContainer(format!("包文档不存在: {}", package_path))
        })?;
        PackageDocument::parse(&package_path, &package_xml)
    }

    /// 解析一个 spine 条目
    ///
    /// 没有内容时返回 `Ok(None)`
    fn parse_spine_item(
        &self,
        archive: &mut Archive,
        package: &PackageDocument,
        idref: &str,
        config: &EpubConfig,
    ) -> Result<Option<ChapterData>> {
        let item = package.item(idref).ok_or_else(|| {
            IngestError::ResourceExtractionFailure(format!("spine 引用了清单中不存在的条目: {}", idref))
        })?;
        let path = package.entry_path(&item.href, &*archive).ok_or_else(|| {
            IngestError::ResourceExtractionFailure(format!(
                "章节文件不存在: {}",
                package.full_path(&item.href)
            ))
        })?;

        let html = archive.read_string(&path)?;
        let mut root = parse_html(&html);
        let title = self.extract_title(&mut root, config.title_max_chars);

        let body = root.find(|e| e.tag == "body").unwrap_or(&root);
        let context = WalkContext {
            title: title.as_deref(),
            config,
        };
        let mut items = Vec::new();
        self.walk(body, &context, &mut items);

        let mut blocks = self.resolve_images(archive, package, &path, items);
        if !blocks.iter().any(|b| !matches!(b, BlockData::Image { .. })) {
            let fallback = self.fallback_paragraphs(
                &body.spaced_text(),
                config.fallback_paragraph_chars,
                config.fallback_min_chars,
            );
            if !fallback.is_empty() {
                debug!(path = %path, paragraphs = fallback.len(), "结构遍历无段落，使用纯文本回退");
            }
            blocks.extend(fallback.into_iter().map(BlockData::Paragraph));
        }

        if blocks.is_empty() {
            return Ok(None);
        }
        Ok(Some(ChapterData { title, blocks }))
    }

    /// 提取章节标题并从文档树中移除
    ///
    /// 依次尝试 h1、h2、h3、章节标题 class、`<title>`
    fn extract_title(&self, root: &mut Element, max_chars: usize) -> Option<String> {
        for tag in ["h1", "h2", "h3"] {
            if let Some(e) = root.remove_first(|e| e.tag == tag && title_fits(e, max_chars)) {
                return Some(e.text());
            }
        }

        let by_class = |e: &Element| {
            TITLE_CLASSES.iter().any(|c| e.has_class_containing(c)) && title_fits(e, max_chars)
        };
        if let Some(e) = root.remove_first(by_class) {
            return Some(e.text());
        }

        root.remove_first(|e| e.tag == "title" && title_fits(e, max_chars))
            .map(|e| e.text())
    }

    /// 递归遍历块级元素
    fn walk(&self, element: &Element, context: &WalkContext, out: &mut Vec<WalkItem>) {
        for child in element.child_elements() {
            let tag = child.tag.as_str();

            if let Some(level) = heading_level(tag) {
                let text = child.text();
                if !text.is_empty() && context.title != Some(text.as_str()) {
                    out.push(WalkItem::Block(BlockData::Heading { text, level }));
                }
                collect_images(child, out);
            } else if tag == "p" {
                let text = child.text();
                if char_len(&text) >= context.config.min_paragraph_chars {
                    out.push(WalkItem::Block(BlockData::Paragraph(text)));
                }
                collect_images(child, out);
            } else if tag == "img" || tag == "image" {
                push_image(child, out);
            } else if is_block_tag(tag) && !child.has_block_descendant() {
                // 叶子容器
                let text = child.text();
                if char_len(&text) >= context.config.min_paragraph_chars {
                    let block = if StructuralClassifier::is_short_heading(
                        &text,
                        context.config.leaf_heading_max_chars,
                    ) {
                        BlockData::Heading { text, level: 3 }
                    } else {
                        BlockData::Paragraph(text)
                    };
                    out.push(WalkItem::Block(block));
                }
                collect_images(child, out);
            } else {
                // 带块级后代的容器，以及 svg、a 等行内包装
                self.walk(child, context, out);
            }
        }
    }

    /// 解析图片引用，无法解析的图片记录日志后跳过
    fn resolve_images(
        &self,
        archive: &mut Archive,
        package: &PackageDocument,
        document_path: &str,
        items: Vec<WalkItem>,
    ) -> Vec<BlockData> {
        let mut blocks = Vec::with_capacity(items.len());
        for item in items {
            match item {
                WalkItem::Block(block) => blocks.push(block),
                WalkItem::ImageRef { src, alt } => {
                    match self.load_image(archive, package, document_path, &src, &alt) {
                        Ok(payload) => {
                            let label = if alt.is_empty() {
                                IMAGE_LABEL.to_string()
                            } else {
                                alt
                            };
                            blocks.push(BlockData::Image { payload, label });
                        }
                        Err(e) => warn!(src = %src, document = document_path, error = %e, "图片无法解析，跳过"),
                    }
                }
            }
        }
        blocks
    }

    fn load_image(
        &self,
        archive: &mut Archive,
        package: &PackageDocument,
        document_path: &str,
        src: &str,
        alt: &str,
    ) -> Result<ImagePayload> {
        if src.starts_with("data:") {
            return ImagePayload::from_data_url(src, alt).ok_or_else(|| {
                IngestError::ResourceExtractionFailure("无效的 data URL".to_string())
            });
        }

        let resolver = PathResolver::new(document_path, &package.base_path);
        let resolved = resolver.resolve(src, &*archive).ok_or_else(|| {
            IngestError::ResourceExtractionFailure(format!("归档中找不到图片: {}", src))
        })?;
        debug!(src, path = %resolved.path, strategy = ?resolved.strategy, "图片路径已解析");

        let bytes = archive.read(&resolved.path)?;
        Ok(ImagePayload::from_bytes(&bytes, &resolved.path, alt))
    }

    /// 封面：与正文图片相同的解析方式，相对于包文档
    fn extract_cover(&self, archive: &mut Archive, package: &PackageDocument) -> Option<Cover> {
        let href = package.cover_href()?;
        match self.load_image(archive, package, &package.path, &href, "cover") {
            Ok(payload) if payload.mime_type.starts_with("image/") => Some(Cover::Image(payload)),
            Ok(payload) => {
                warn!(href = %href, mime = %payload.mime_type, "封面不是图片，使用占位封面");
                None
            }
            Err(e) => {
                warn!(href = %href, error = %e, "封面提取失败，使用占位封面");
                None
            }
        }
    }

    /// 纯文本回退
    ///
    /// 按句末标点切句，贪心拼接到目标长度，丢弃过短的片段
    fn fallback_paragraphs(&self, text: &str, target_chars: usize, min_chars: usize) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut sentence = String::new();
        for c in text.chars() {
            sentence.push(c);
            if matches!(c, '.' | '!' | '?' | '。' | '！' | '？') {
                sentences.push(sentence.trim().to_string());
                sentence.clear();
            }
        }
        if !sentence.trim().is_empty() {
            sentences.push(sentence.trim().to_string());
        }

        let mut paragraphs = Vec::new();
        let mut current = String::new();
        for sentence in sentences.iter().filter(|s| !s.is_empty()) {
            if !current.is_empty() && char_len(&current) + char_len(sentence) + 1 > target_chars {
                paragraphs.push(std::mem::take(&mut current));
            }
            if !current.is_empty() && current.ends_with(|c: char| c.is_ascii_punctuation()) {
                current.push(' ');
            }
            current.push_str(sentence);
        }
        if !current.is_empty() {
            paragraphs.push(current);
        }

        paragraphs.retain(|p| char_len(p) >= min_chars);
        paragraphs
    }
}

impl Parser for EpubParser {
    fn parse(&self, bytes: &[u8], file_name: &str, config: &IngestConfig) -> Result<ParseResult> {
        // 1. 打开容器与包文档
        let mut archive = ArchiveReader::from_bytes(bytes)?;
        let package = self.open_package(&mut archive)?;
        info!(
            package = %package.path,
            spine = package.spine.len(),
            manifest = package.manifest.len(),
            "EPUB 包文档解析完成"
        );

        // 2. 按 spine 顺序逐个解析，单个条目失败不影响整本书
        let mut chapters = Vec::new();
        for (spine_index, idref) in package.spine.iter().enumerate() {
            match self.parse_spine_item(&mut archive, &package, idref, &config.epub) {
                Ok(Some(chapter)) => chapters.push(chapter),
                Ok(None) => debug!(spine_index, idref = %idref, "spine 条目没有内容，跳过"),
                Err(e) => warn!(spine_index, idref = %idref, error = %e, "spine 条目解析失败，跳过"),
            }
        }

        if chapters.is_empty() {
            return Err(IngestError::NoReadableContent(format!(
                "{}: 所有 spine 条目都没有可读内容",
                file_name
            )));
        }

        // 3. 封面
        let cover = self.extract_cover(&mut archive, &package);

        let mut result = ParseResult::new(chapters, ParseQuality::Native);
        result.title = package.title;
        result.author = package.author;
        result.synopsis = package.description;
        result.cover = cover;
        Ok(result)
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Epub
    }

    fn get_quality(&self) -> ParseQuality {
        ParseQuality::Native
    }

    fn supported_extensions(&self) -> Vec<&str> {
        vec!["epub"]
    }
}

impl Default for EpubParser {
    fn default() -> Self {
        Self::new()
    }
}

/// 标题候选：非空且短于上限
fn title_fits(element: &Element, max_chars: usize) -> bool {
    let text = element.text();
    !text.is_empty() && char_len(&text) < max_chars
}

/// `<img src>` 与 SVG `<image href|xlink:href>`
fn push_image(element: &Element, out: &mut Vec<WalkItem>) {
    let src = match element.tag.as_str() {
        "img" => element.attr("src"),
        _ => element.attr("href").or_else(|| element.attr("xlink:href")),
    };
    if let Some(src) = src.map(str::trim).filter(|s| !s.is_empty()) {
        out.push(WalkItem::ImageRef {
            src: src.to_string(),
            alt: element.attr("alt").unwrap_or_default().trim().to_string(),
        });
    }
}

/// 收集元素内部的所有图片引用（文档顺序）
fn collect_images(element: &Element, out: &mut Vec<WalkItem>) {
    let mut images = Vec::new();
    element.find_all(|e| e.tag == "img" || e.tag == "image", &mut images);
    for image in images {
        push_image(image, out);
    }
}
