//! 规范书籍模型
//!
//! 三种源格式最终都收敛到 Book → Chapter → Paragraph 这棵树，
//! 阅读、朗读（TTS）、翻译模块只依赖这里的结构。

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// 源格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Txt,
    Pdf,
    Epub,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Txt => "txt",
            SourceKind::Pdf => "pdf",
            SourceKind::Epub => "epub",
        }
    }
}

/// 解析质量等级
///
/// 用于标识不同格式的解析质量和可靠性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseQuality {
    /// 原生结构（EPUB）
    Native,
    /// 文本可提取但结构靠启发式推断（TXT / PDF）
    Light,
}

/// 书籍
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// `{源格式}-{毫秒时间戳}`
    pub id: String,
    pub title: String,
    pub author: String,
    /// 语言代码（`zh` / `en`），供 TTS 选择音色
    pub language: String,
    pub synopsis: String,
    /// 估算页数，至少为 1
    pub pages: usize,
    pub free: bool,
    pub user_uploaded: bool,
    pub source: SourceKind,
    pub quality: ParseQuality,
    pub cover: Cover,
    pub chapters: Vec<Chapter>,
}

impl Book {
    /// 段落总数（含图片段落）
    pub fn paragraph_count(&self) -> usize {
        self.chapters.iter().map(|c| c.paragraphs.len()).sum()
    }

    /// 按阅读顺序返回可朗读的文本，图片段落不参与
    pub fn narration_text(&self) -> impl Iterator<Item = &Paragraph> {
        self.chapters
            .iter()
            .flat_map(|c| c.paragraphs.iter())
            .filter(|p| !p.is_image())
    }

    /// 按 (章节序号, 段落序号) 定位段落，用于翻译结果回填
    pub fn paragraph_at(&self, chapter_index: usize, paragraph_index: usize) -> Option<&Paragraph> {
        self.chapters
            .get(chapter_index)
            .and_then(|c| c.paragraphs.get(paragraph_index))
    }
}

/// 章节
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub paragraphs: Vec<Paragraph>,
}

/// 段落
///
/// `text` 对普通段落和标题是正文；对图片段落只是一个回退标签，
/// 真正的内容在 `kind` 的图片载荷里。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub kind: ParagraphKind,
}

impl Paragraph {
    pub fn is_image(&self) -> bool {
        matches!(self.kind, ParagraphKind::Image { .. })
    }

    pub fn heading_level(&self) -> Option<u8> {
        match self.kind {
            ParagraphKind::Heading { level } => Some(level),
            _ => None,
        }
    }
}

/// 段落类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParagraphKind {
    Plain,
    /// 标题层级 1-6
    Heading { level: u8 },
    Image { image: ImagePayload },
}

impl ParagraphKind {
    /// 构造标题类型，层级被限制在 1-6
    pub fn heading(level: u8) -> Self {
        ParagraphKind::Heading {
            level: level.clamp(1, 6),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParagraphKind::Plain => "plain",
            ParagraphKind::Heading { .. } => "heading",
            ParagraphKind::Image { .. } => "image",
        }
    }
}

/// 内联图片
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub mime_type: String,
    /// `data:{mime};base64,...`
    pub data_url: String,
    pub alt: String,
}

impl ImagePayload {
    /// 由图片字节构造内联载荷
    ///
    /// # 参数
    /// - `bytes`: 图片二进制数据
    /// - `path_hint`: 原始路径，用于按扩展名推断 MIME
    /// - `alt`: 替代文本
    pub fn from_bytes(bytes: &[u8], path_hint: &str, alt: &str) -> Self {
        let mime_type = guess_mime_type(bytes, path_hint);
        let data_url = format!(
            "data:{};base64,{}",
            mime_type,
            general_purpose::STANDARD.encode(bytes)
        );
        Self {
            mime_type,
            data_url,
            alt: alt.to_string(),
        }
    }

    /// 直接接收已经是 data URL 的图片引用
    pub fn from_data_url(data_url: &str, alt: &str) -> Option<Self> {
        let rest = data_url.strip_prefix("data:")?;
        let (mime_type, _) = rest.split_once(';').or_else(|| rest.split_once(','))?;
        Some(Self {
            mime_type: mime_type.to_string(),
            data_url: data_url.to_string(),
            alt: alt.to_string(),
        })
    }
}

fn guess_mime_type(bytes: &[u8], path_hint: &str) -> String {
    let ext = Path::new(path_hint)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());

    let by_ext = match ext.as_deref() {
        Some("jpg") | Some("jpeg") => Some("image/jpeg"),
        Some("png") => Some("image/png"),
        Some("gif") => Some("image/gif"),
        Some("webp") => Some("image/webp"),
        Some("bmp") => Some("image/bmp"),
        Some("svg") => Some("image/svg+xml"),
        _ => None,
    };

    match by_ext {
        Some(mime) => mime.to_string(),
        None => image::guess_format(bytes)
            .map(|f| f.to_mime_type().to_string())
            .unwrap_or_else(|_| "application/octet-stream".to_string()),
    }
}

/// 封面
///
/// 提取失败时使用占位描述，保证每本书都有封面
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Cover {
    Image(ImagePayload),
    Placeholder { label: String, background: String },
}

impl Cover {
    /// 根据书名生成稳定的占位封面（同名书籍颜色一致）
    pub fn placeholder(title: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        let hash = hasher.finalize();

        Cover::Placeholder {
            label: title.chars().take(24).collect(),
            background: format!("#{:02x}{:02x}{:02x}", hash[0], hash[1], hash[2]),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Cover::Placeholder { .. })
    }
}
