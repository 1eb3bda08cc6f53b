//! 导入管线配置
//!
//! 所有启发式阈值集中在这里，可以通过 TOML 覆盖，缺省值即内置行为。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// 顶层配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub book: BookConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub pdf: PdfConfig,
    #[serde(default)]
    pub epub: EpubConfig,
}

impl IngestConfig {
    /// 从 TOML 字符串加载，未出现的字段使用默认值
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| IngestError::Config(e.to_string()))
    }

    /// 从 TOML 文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
        Self::from_toml_str(&content)
    }
}

/// `[book]`：规范模型构建
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookConfig {
    /// 简介截取的字符数
    #[serde(default = "default_synopsis_chars")]
    pub synopsis_chars: usize,
    /// 估算页数时每页段落数
    #[serde(default = "default_paragraphs_per_page")]
    pub paragraphs_per_page: usize,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            synopsis_chars: default_synopsis_chars(),
            paragraphs_per_page: default_paragraphs_per_page(),
        }
    }
}

fn default_synopsis_chars() -> usize {
    200
}
fn default_paragraphs_per_page() -> usize {
    3
}

/// `[classifier]`：TXT 与 PDF 共用的标题判定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// 标题长度下限（不含）
    #[serde(default = "default_heading_min_chars")]
    pub heading_min_chars: usize,
    /// 标题长度上限（不含），同时也是 PDF 章节标记的长度上限
    #[serde(default = "default_heading_max_chars")]
    pub heading_max_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            heading_min_chars: default_heading_min_chars(),
            heading_max_chars: default_heading_max_chars(),
        }
    }
}

fn default_heading_min_chars() -> usize {
    10
}
fn default_heading_max_chars() -> usize {
    100
}

/// `[pdf]`：PDF 分页与分章
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    /// 没有显式章节标记时，每隔多少页强制切分一章
    #[serde(default = "default_chapter_page_interval")]
    pub chapter_page_interval: usize,
    /// 强制切分前当前章节至少要超过的段落数
    #[serde(default = "default_forced_split_min_paragraphs")]
    pub forced_split_min_paragraphs: usize,
    /// 页面文字少于该字符数时按图片页处理
    #[serde(default = "default_min_page_text")]
    pub min_page_text: usize,
    /// 丢弃短于该字符数的文本片段
    #[serde(default = "default_min_fragment_chars")]
    pub min_fragment_chars: usize,
    /// 渲染图片页的目标宽度（像素）
    #[serde(default = "default_render_width")]
    pub render_width: i32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            chapter_page_interval: default_chapter_page_interval(),
            forced_split_min_paragraphs: default_forced_split_min_paragraphs(),
            min_page_text: default_min_page_text(),
            min_fragment_chars: default_min_fragment_chars(),
            render_width: default_render_width(),
        }
    }
}

fn default_chapter_page_interval() -> usize {
    10
}
fn default_forced_split_min_paragraphs() -> usize {
    5
}
fn default_min_page_text() -> usize {
    100
}
fn default_min_fragment_chars() -> usize {
    20
}
fn default_render_width() -> i32 {
    1200
}

/// `[epub]`：章节正文遍历
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpubConfig {
    /// `<p>` 与叶子容器成为段落的最短字符数
    #[serde(default = "default_min_paragraph_chars")]
    pub min_paragraph_chars: usize,
    /// 叶子容器被视为标题的长度上限（不含）
    #[serde(default = "default_leaf_heading_max_chars")]
    pub leaf_heading_max_chars: usize,
    /// 章节标题长度上限（不含）
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
    /// 纯文本回退时每段的目标长度
    #[serde(default = "default_fallback_paragraph_chars")]
    pub fallback_paragraph_chars: usize,
    /// 纯文本回退时丢弃短于该长度的片段
    #[serde(default = "default_fallback_min_chars")]
    pub fallback_min_chars: usize,
}

impl Default for EpubConfig {
    fn default() -> Self {
        Self {
            min_paragraph_chars: default_min_paragraph_chars(),
            leaf_heading_max_chars: default_leaf_heading_max_chars(),
            title_max_chars: default_title_max_chars(),
            fallback_paragraph_chars: default_fallback_paragraph_chars(),
            fallback_min_chars: default_fallback_min_chars(),
        }
    }
}

fn default_min_paragraph_chars() -> usize {
    20
}
fn default_leaf_heading_max_chars() -> usize {
    100
}
fn default_title_max_chars() -> usize {
    200
}
fn default_fallback_paragraph_chars() -> usize {
    150
}
fn default_fallback_min_chars() -> usize {
    30
}
