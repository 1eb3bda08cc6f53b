use super::classifier::{Classification, StructuralClassifier};
use super::*;
use encoding_rs::*;
use tracing::{debug, warn};

/// TXT 解析器
///
/// 支持纯文本文件的解析，自动检测编码（UTF-8, GBK 等）
#[derive(Clone)]
pub struct TxtParser;

impl TxtParser {
    /// 创建新的 TXT 解析器实例
    pub fn new() -> Self {
        Self
    }

    /// 检测文件编码
    ///
    /// 尝试检测文件的字符编码，支持 UTF-8、GBK 等常见编码
    ///
    /// # 参数
    /// - `bytes`: 文件字节数据
    ///
    /// # 返回
    /// 检测到的编码
    fn detect_encoding(&self, bytes: &[u8]) -> &'static Encoding {
        // 1. 检查 BOM (Byte Order Mark)
        if let Some((encoding, _bom_length)) = Encoding::for_bom(bytes) {
            return encoding;
        }

        // 2. 尝试 UTF-8 解码
        if std::str::from_utf8(bytes).is_ok() {
            return UTF_8;
        }

        // 3. 检测是否为 GBK
        if self.looks_like_gbk(bytes) {
            return GBK;
        }

        // 4. 默认使用 UTF-8
        UTF_8
    }

    /// 检测字节序列是否像 GBK 编码
    ///
    /// GBK 编码特征：
    /// - 第一字节范围：0x81-0xFE
    /// - 第二字节范围：0x40-0xFE
    fn looks_like_gbk(&self, bytes: &[u8]) -> bool {
        let mut gbk_pairs = 0;
        let mut total_pairs = 0;

        let mut i = 0;
        while i < bytes.len().saturating_sub(1) {
            let b1 = bytes[i];
            let b2 = bytes[i + 1];

            // 检查是否为 ASCII 字符
            if b1 < 0x80 {
                i += 1;
                continue;
            }

            total_pairs += 1;

            // 检查是否符合 GBK 编码规则
            if (0x81..=0xFE).contains(&b1) && (0x40..=0xFE).contains(&b2) {
                gbk_pairs += 1;
                i += 2; // 跳过这一对字节
            } else {
                i += 1;
            }
        }

        // 如果超过 50% 的非 ASCII 字节对符合 GBK 规则，则认为是 GBK
        total_pairs > 0 && (gbk_pairs as f32 / total_pairs as f32) > 0.5
    }

    /// 解码为字符串，解码错误只记录不中断
    fn decode(&self, bytes: &[u8]) -> String {
        let encoding = self.detect_encoding(bytes);
        let (content, encoding_used, had_errors) = encoding.decode(bytes);
        if had_errors {
            warn!(encoding = encoding_used.name(), "文件解码时出现错误，可能存在乱码");
        } else {
            debug!(encoding = encoding_used.name(), "TXT 编码检测完成");
        }
        content.into_owned()
    }

    /// 按行切分章节
    ///
    /// 章节标记只有在当前章节已有内容时才开启新章节，否则只给当前（空）章节命名
    fn split_chapters(&self, content: &str, classifier: &StructuralClassifier) -> Vec<ChapterData> {
        let mut chapters = Vec::new();
        let mut current = ChapterData::new(None);

        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match classifier.classify_line(line) {
                Classification::ChapterBoundary => {
                    if current.is_empty() {
                        current.title = Some(line.to_string());
                    } else {
                        chapters.push(std::mem::replace(
                            &mut current,
                            ChapterData::new(Some(line.to_string())),
                        ));
                    }
                }
                Classification::Heading(level) => current.blocks.push(BlockData::Heading {
                    text: line.to_string(),
                    level,
                }),
                Classification::Paragraph => current.blocks.push(BlockData::Paragraph(line.to_string())),
            }
        }

        if !current.is_empty() || chapters.is_empty() {
            chapters.push(current);
        }
        chapters
    }
}

impl Parser for TxtParser {
    fn parse(&self, bytes: &[u8], _file_name: &str, config: &IngestConfig) -> Result<ParseResult> {
        // 1. 检测编码并解码
        let content = self.decode(bytes);

        // 2. 逐行分类并切分章节
        let classifier = StructuralClassifier::from_config(&config.classifier);
        let chapters = self.split_chapters(&content, &classifier);

        // 3. 简介取解码后原文的开头
        let synopsis: String = content
            .trim()
            .chars()
            .take(config.book.synopsis_chars)
            .collect();

        let mut result = ParseResult::new(chapters, ParseQuality::Light);
        result.synopsis = Some(synopsis).filter(|s| !s.is_empty());

        debug!(
            chapters = result.chapters.len(),
            blocks = result.total_blocks(),
            "TXT 解析完成"
        );
        Ok(result)
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Txt
    }

    fn get_quality(&self) -> ParseQuality {
        ParseQuality::Light
    }

    fn supported_extensions(&self) -> Vec<&str> {
        vec!["txt"]
    }
}

impl Default for TxtParser {
    fn default() -> Self {
        Self::new()
    }
}
