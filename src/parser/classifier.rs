use regex::Regex;
use std::sync::LazyLock;

use crate::config::ClassifierConfig;

/// 章节标记模式
///
/// 英文 "CHAPTER"/"Chapter" 开头，或中文“第…章”
static CHAPTER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^(?:CHAPTER|Chapter)(?:\s|$|[\d.:：])").expect("valid chapter pattern"),
        Regex::new(r"^第\s*[零〇一二两三四五六七八九十百千万\d]+\s*章").expect("valid cjk chapter pattern"),
        Regex::new(r"^第.{1,12}?章(?:\s|$|[：:])").expect("valid loose cjk chapter pattern"),
    ]
});

/// 结构分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// 普通段落
    Paragraph,
    /// 标题及其层级
    Heading(u8),
    /// 章节分界
    ChapterBoundary,
}

/// TXT / PDF 中推断出来的标题统一使用的层级
pub const INFERRED_HEADING_LEVEL: u8 = 2;

/// 结构分类器
///
/// 三个提取器共享的启发式：
/// 1. 章节标记：基于正则匹配明确的章节开头
/// 2. 标题：长度适中且不以句末标点结尾的短行
/// 3. 其余都是普通段落
#[derive(Debug, Clone)]
pub struct StructuralClassifier {
    /// 标题长度下限（不含）
    heading_min_chars: usize,
    /// 标题长度上限（不含），同时也是 PDF 中章节标记的长度上限
    heading_max_chars: usize,
}

impl StructuralClassifier {
    pub fn new(heading_min_chars: usize, heading_max_chars: usize) -> Self {
        Self {
            heading_min_chars,
            heading_max_chars,
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(config.heading_min_chars, config.heading_max_chars)
    }

    /// 文本行是否以章节标记开头
    pub fn is_chapter_marker(text: &str) -> bool {
        let trimmed = text.trim();
        CHAPTER_PATTERNS.iter().any(|p| p.is_match(trimmed))
    }

    /// 文本行是否满足标题长度区间，且不以句末标点结尾
    pub fn is_heading(&self, text: &str) -> bool {
        let trimmed = text.trim();
        let len = char_len(trimmed);
        len > self.heading_min_chars
            && len < self.heading_max_chars
            && !ends_with_sentence_punctuation(trimmed)
    }

    /// 分类 TXT 中的一行
    pub fn classify_line(&self, text: &str) -> Classification {
        if Self::is_chapter_marker(text) {
            Classification::ChapterBoundary
        } else if self.is_heading(text) {
            Classification::Heading(INFERRED_HEADING_LEVEL)
        } else {
            Classification::Paragraph
        }
    }

    /// 分类 PDF 中的一个文本片段
    ///
    /// 与 TXT 不同，章节标记还需要短于上限，避免整句正文以 "Chapter" 开头时被误判
    pub fn classify_fragment(&self, text: &str) -> Classification {
        if Self::is_chapter_marker(text) && char_len(text.trim()) < self.heading_max_chars {
            Classification::ChapterBoundary
        } else if self.is_heading(text) {
            Classification::Heading(INFERRED_HEADING_LEVEL)
        } else {
            Classification::Paragraph
        }
    }

    /// EPUB 叶子容器：短且不以句末标点结尾即视为标题
    pub fn is_short_heading(text: &str, max_chars: usize) -> bool {
        let trimmed = text.trim();
        char_len(trimmed) < max_chars && !ends_with_sentence_punctuation(trimmed)
    }
}

impl Default for StructuralClassifier {
    fn default() -> Self {
        Self::new(10, 100)
    }
}

/// 按字符（而非字节）计算长度，中文文本依赖这一点
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// 是否以句末标点结尾（含全角）
pub fn ends_with_sentence_punctuation(text: &str) -> bool {
    matches!(
        text.trim_end().chars().last(),
        Some('.') | Some('!') | Some('?') | Some('。') | Some('！') | Some('？')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_marker_english() {
        assert!(StructuralClassifier::is_chapter_marker("Chapter One"));
        assert!(StructuralClassifier::is_chapter_marker("CHAPTER 12"));
        assert!(StructuralClassifier::is_chapter_marker("Chapter 3: The Return"));
        assert!(StructuralClassifier::is_chapter_marker("  Chapter"));
        assert!(!StructuralClassifier::is_chapter_marker("Chapters are long."));
        assert!(!StructuralClassifier::is_chapter_marker("The chapter ends here"));
    }

    #[test]
    fn test_chapter_marker_chinese() {
        assert!(StructuralClassifier::is_chapter_marker("第一章 开始"));
        assert!(StructuralClassifier::is_chapter_marker("第1章"));
        assert!(StructuralClassifier::is_chapter_marker("第十二章：结束"));
        assert!(!StructuralClassifier::is_chapter_marker("普通段落文本"));
    }

    #[test]
    fn test_heading_by_length() {
        let classifier = StructuralClassifier::default();
        // 15 个字符，无句末标点
        assert!(classifier.is_heading("A Quiet Evening"));
        // 15 个字符，以句号结尾
        assert!(!classifier.is_heading("Quiet evenings."));
        assert!(!classifier.is_heading("Too short"));
        assert!(!classifier.is_heading(&"x".repeat(100)));
    }

    #[test]
    fn test_heading_full_width_punctuation() {
        let classifier = StructuralClassifier::default();
        assert!(classifier.is_heading("这是一个很长的小节标题文字"));
        assert!(!classifier.is_heading("这是一个很长的句子并且结束了。"));
    }

    #[test]
    fn test_classify_line() {
        let classifier = StructuralClassifier::default();
        assert_eq!(classifier.classify_line("Chapter One"), Classification::ChapterBoundary);
        assert_eq!(
            classifier.classify_line("A Quiet Evening"),
            Classification::Heading(INFERRED_HEADING_LEVEL)
        );
        assert_eq!(
            classifier.classify_line("It was a dark and stormy night."),
            Classification::Paragraph
        );
    }

    #[test]
    fn test_classify_fragment_rejects_long_marker() {
        let classifier = StructuralClassifier::default();
        let sentence = format!("Chapter {} went on and on", "and on ".repeat(20));
        assert_eq!(classifier.classify_line(&sentence), Classification::ChapterBoundary);
        assert_ne!(classifier.classify_fragment(&sentence), Classification::ChapterBoundary);
        assert_eq!(
            classifier.classify_fragment("Chapter 2 The Storm"),
            Classification::ChapterBoundary
        );
    }

    #[test]
    fn test_from_config() {
        let classifier = StructuralClassifier::from_config(&ClassifierConfig {
            heading_min_chars: 4,
            heading_max_chars: 30,
        });
        assert!(classifier.is_heading("Part Two"));
        // 43 个字符，超过标记长度上限，也不再是标题
        let fragment = "Chapter 2 The Storm That Never Really Ended";
        assert_eq!(classifier.classify_fragment(fragment), Classification::Paragraph);
        assert_eq!(
            StructuralClassifier::default().classify_fragment(fragment),
            Classification::ChapterBoundary
        );
    }

    #[test]
    fn test_short_heading() {
        assert!(StructuralClassifier::is_short_heading("Part Two: Into the Woods", 100));
        assert!(!StructuralClassifier::is_short_heading("This one is a sentence.", 100));
    }
}
