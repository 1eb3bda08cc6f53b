use chrono::Utc;
use tracing::debug;

use crate::config::BookConfig;
use crate::error::{IngestError, Result};
use crate::language::detect_language;
use crate::model::{Book, Chapter, Cover, Paragraph, ParagraphKind, SourceKind};
use crate::parser::{title_from_file_name, BlockData, ChapterData, ParseResult};

const UNKNOWN_AUTHOR: &str = "Unknown";

/// 规范模型构建器
///
/// 每次解析持有一个构建器，章节与段落 ID 计数器都属于它，
/// 因此同一本书内 ID 唯一，不同书之间互不影响
pub struct BookBuilder<'a> {
    config: &'a BookConfig,
    next_chapter: usize,
    next_paragraph: usize,
}

impl<'a> BookBuilder<'a> {
    pub fn new(config: &'a BookConfig) -> Self {
        Self {
            config,
            next_chapter: 0,
            next_paragraph: 0,
        }
    }

    /// 把提取结果组装为 Book
    ///
    /// 空章节被丢弃；全书没有任何段落时返回 `NoReadableContent`
    pub fn build(mut self, kind: SourceKind, file_name: &str, result: ParseResult) -> Result<Book> {
        let ParseResult {
            title,
            author,
            synopsis,
            cover,
            chapters,
            page_count,
            quality,
        } = result;

        let chapters: Vec<Chapter> = chapters
            .into_iter()
            .filter(|c| {
                if c.is_empty() {
                    debug!(title = ?c.title, "丢弃空章节");
                }
                !c.is_empty()
            })
            .map(|c| self.chapter(c))
            .collect();

        let paragraph_count: usize = chapters.iter().map(|c| c.paragraphs.len()).sum();
        if paragraph_count == 0 {
            return Err(IngestError::NoReadableContent(file_name.to_string()));
        }

        let body_text = chapters
            .iter()
            .flat_map(|c| c.paragraphs.iter())
            .filter(|p| !p.is_image())
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let title = non_empty(title).unwrap_or_else(|| title_from_file_name(file_name));
        let synopsis = non_empty(synopsis)
            .unwrap_or_else(|| body_text.chars().take(self.config.synopsis_chars).collect());
        let language = detect_language(&body_text);

        let pages = match page_count {
            Some(pages) => pages.max(1),
            None => paragraph_count
                .div_ceil(self.config.paragraphs_per_page.max(1))
                .max(1),
        };

        let cover = cover.unwrap_or_else(|| Cover::placeholder(&title));

        debug!(
            chapters = chapters.len(),
            paragraphs = paragraph_count,
            pages,
            language = language.code(),
            "书籍构建完成"
        );

        Ok(Book {
            id: format!("{}-{}", kind.as_str(), Utc::now().timestamp_millis()),
            title,
            author: non_empty(author).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            language: language.code().to_string(),
            synopsis,
            pages,
            free: true,
            user_uploaded: true,
            source: kind,
            quality,
            cover,
            chapters,
        })
    }

    fn chapter(&mut self, data: ChapterData) -> Chapter {
        self.next_chapter += 1;
        let number = self.next_chapter;

        let paragraphs = data
            .blocks
            .into_iter()
            .map(|block| self.paragraph(block))
            .collect();

        Chapter {
            id: format!("ch-{}", number),
            title: non_empty(data.title).unwrap_or_else(|| format!("Chapter {}", number)),
            paragraphs,
        }
    }

    fn paragraph(&mut self, block: BlockData) -> Paragraph {
        self.next_paragraph += 1;
        let (text, kind) = match block {
            BlockData::Paragraph(text) => (text, ParagraphKind::Plain),
            BlockData::Heading { text, level } => (text, ParagraphKind::heading(level)),
            BlockData::Image { payload, label } => (label, ParagraphKind::Image { image: payload }),
        };

        Paragraph {
            id: format!("p-{}", self.next_paragraph),
            text,
            kind,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImagePayload, ParseQuality};

    fn chapter(title: Option<&str>, blocks: Vec<BlockData>) -> ChapterData {
        ChapterData {
            title: title.map(str::to_string),
            blocks,
        }
    }

    fn para(text: &str) -> BlockData {
        BlockData::Paragraph(text.to_string())
    }

    #[test]
    fn test_ids_and_synthesized_titles() {
        let config = BookConfig::default();
        let result = ParseResult::new(
            vec![
                chapter(None, vec![para("one"), para("two")]),
                chapter(Some("Second"), vec![para("three")]),
            ],
            ParseQuality::Light,
        );

        let book = BookBuilder::new(&config)
            .build(SourceKind::Txt, "story.txt", result)
            .unwrap();

        assert!(book.id.starts_with("txt-"));
        assert_eq!(book.title, "story");
        assert_eq!(book.author, "Unknown");
        assert_eq!(book.chapters[0].id, "ch-1");
        assert_eq!(book.chapters[0].title, "Chapter 1");
        assert_eq!(book.chapters[1].title, "Second");

        let ids: Vec<&str> = book
            .chapters
            .iter()
            .flat_map(|c| c.paragraphs.iter())
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["p-1", "p-2", "p-3"]);
    }

    #[test]
    fn test_empty_chapters_dropped() {
        let config = BookConfig::default();
        let result = ParseResult::new(
            vec![chapter(Some("Empty"), vec![]), chapter(None, vec![para("body")])],
            ParseQuality::Light,
        );

        let book = BookBuilder::new(&config)
            .build(SourceKind::Txt, "a.txt", result)
            .unwrap();
        assert_eq!(book.chapters.len(), 1);
        assert_eq!(book.chapters[0].id, "ch-1");
    }

    #[test]
    fn test_no_paragraphs_is_error() {
        let config = BookConfig::default();
        let result = ParseResult::new(vec![chapter(None, vec![])], ParseQuality::Light);
        let err = BookBuilder::new(&config)
            .build(SourceKind::Txt, "empty.txt", result)
            .unwrap_err();
        assert!(matches!(err, IngestError::NoReadableContent(_)));
    }

    #[test]
    fn test_page_estimate() {
        let config = BookConfig::default();
        let blocks = (0..7).map(|i| para(&format!("paragraph {}", i))).collect();
        let result = ParseResult::new(vec![chapter(None, blocks)], ParseQuality::Light);
        let book = BookBuilder::new(&config)
            .build(SourceKind::Txt, "a.txt", result)
            .unwrap();
        assert_eq!(book.pages, 3);

        let mut result = ParseResult::new(vec![chapter(None, vec![para("x")])], ParseQuality::Light);
        result.page_count = Some(0);
        let book = BookBuilder::new(&config)
            .build(SourceKind::Pdf, "a.pdf", result)
            .unwrap();
        assert_eq!(book.pages, 1);
    }

    #[test]
    fn test_synopsis_language_and_cover_defaults() {
        let config = BookConfig {
            synopsis_chars: 4,
            ..BookConfig::default()
        };
        let image = BlockData::Image {
            payload: ImagePayload::from_bytes(b"img", "a.png", ""),
            label: "[Image]".to_string(),
        };
        let result = ParseResult::new(
            vec![chapter(None, vec![image, para("春眠不觉晓"), para("处处闻啼鸟")])],
            ParseQuality::Native,
        );

        let book = BookBuilder::new(&config)
            .build(SourceKind::Epub, "poem.epub", result)
            .unwrap();

        assert_eq!(book.synopsis, "春眠不觉");
        assert_eq!(book.language, "zh");
        assert!(book.cover.is_placeholder());
        assert!(book.chapters[0].paragraphs[0].is_image());
        assert_eq!(book.chapters[0].paragraphs[0].text, "[Image]");
        assert_eq!(book.narration_text().count(), 2);
    }
}
