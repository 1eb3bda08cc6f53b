//! EPUB 容器与包文档（OPF）
//!
//! `META-INF/container.xml` 指向包文档，包文档声明元数据、清单（manifest）与阅读顺序（spine）。

use crate::archive::EntryIndex;
use crate::error::{IngestError, Result};
use crate::markup::{parse_html, parse_xml, Element};
use crate::resolver::{join, normalize_path, parent_dir, percent_decode};

pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// 从 container.xml 中取第一个 `rootfile@full-path`
pub fn locate_package(container_xml: &str) -> Result<String> {
    let root = parse_xml(container_xml)
        .map_err(|e| IngestError::MalformedContainer(format!("{}: {}", CONTAINER_PATH, e)))?;

    root.find(|e| e.tag == "rootfile" && e.attr("full-path").is_some_and(|p| !p.trim().is_empty()))
        .and_then(|e| e.attr("full-path"))
        .map(|p| p.trim().to_string())
        .ok_or_else(|| {
            IngestError::MalformedContainer(format!("{} 中没有 rootfile", CONTAINER_PATH))
        })
}

/// 清单条目
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

impl ManifestItem {
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }
}

/// 包文档
#[derive(Debug, Clone, Default)]
pub struct PackageDocument {
    /// 包文档在归档中的路径
    pub path: String,
    /// 包文档所在目录，清单中的 href 相对于它
    pub base_path: String,
    pub title: Option<String>,
    pub author: Option<String>,
    /// 已去除标记的简介
    pub description: Option<String>,
    /// 仅作参考，书籍语言以正文检测为准
    pub language: Option<String>,
    pub manifest: Vec<ManifestItem>,
    /// 按阅读顺序排列的 idref
    pub spine: Vec<String>,
    /// `<meta name="cover" content="...">`
    pub cover_meta: Option<String>,
}

impl PackageDocument {
    pub fn parse(path: &str, xml: &str) -> Result<Self> {
        let root = parse_xml(xml)
            .map_err(|e| IngestError::MalformedContainer(format!("{}: {}", path, e)))?;
        if root.tag != "package" {
            return Err(IngestError::MalformedContainer(format!(
                "{}: 根元素是 <{}>，不是 <package>",
                path, root.tag
            )));
        }

        let metadata = root.find(|e| e.tag == "metadata");
        let meta_text = |tag: &str| {
            metadata
                .and_then(|m| m.find(|e| e.tag == tag))
                .map(Element::text)
                .filter(|t| !t.is_empty())
        };

        let cover_meta = metadata
            .and_then(|m| m.find(|e| e.tag == "meta" && e.attr("name") == Some("cover")))
            .and_then(|e| e.attr("content"))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let manifest = root
            .find(|e| e.tag == "manifest")
            .map(|m| {
                m.child_elements()
                    .filter(|e| e.tag == "item")
                    .filter_map(|e| {
                        Some(ManifestItem {
                            id: e.attr("id")?.to_string(),
                            href: e.attr("href")?.to_string(),
                            media_type: e.attr("media-type").unwrap_or_default().to_string(),
                            properties: e
                                .attr("properties")
                                .map(|p| p.split_whitespace().map(str::to_string).collect())
                                .unwrap_or_default(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let spine = root
            .find(|e| e.tag == "spine")
            .map(|s| {
                s.child_elements()
                    .filter(|e| e.tag == "itemref")
                    .filter_map(|e| e.attr("idref"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            path: path.to_string(),
            base_path: parent_dir(path).to_string(),
            title: meta_text("title"),
            author: meta_text("creator"),
            description: meta_text("description").map(|d| strip_markup(&d)),
            language: meta_text("language"),
            manifest,
            spine,
            cover_meta,
        })
    }

    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// 清单 href 在归档中的完整路径（`%XX` 已解码）
    pub fn full_path(&self, href: &str) -> String {
        normalize_path(&join(&self.base_path, &percent_decode(href)))
    }

    /// 清单 href 对应的归档条目
    ///
    /// 先找解码后的路径，再找原样拼接的路径（条目名本身含 `%` 的情况）
    pub fn entry_path(&self, href: &str, index: &dyn EntryIndex) -> Option<String> {
        let decoded = self.full_path(href);
        if index.has_entry(&decoded) {
            return Some(decoded);
        }
        let raw = normalize_path(&join(&self.base_path, href));
        index.has_entry(&raw).then_some(raw)
    }

    /// 封面引用（相对于包文档）
    ///
    /// 查找顺序：`cover-image` 属性 → id 含 "cover" 的图片条目 → `<meta name="cover">`
    pub fn cover_href(&self) -> Option<String> {
        if let Some(item) = self.manifest.iter().find(|i| i.has_property("cover-image")) {
            return Some(item.href.clone());
        }

        if let Some(item) = self
            .manifest
            .iter()
            .find(|i| i.is_image() && i.id.to_ascii_lowercase().contains("cover"))
        {
            return Some(item.href.clone());
        }

        let content = self.cover_meta.as_deref()?;
        match self.item(content) {
            Some(item) => Some(item.href.clone()),
            // 部分书籍直接把路径写在 content 里
            None => Some(content.to_string()),
        }
    }
}

/// 简介常常带有 HTML 标记（转义后写进 OPF）
fn strip_markup(text: &str) -> String {
    if text.contains('<') {
        parse_html(text).spaced_text()
    } else {
        text.to_string()
    }
}
