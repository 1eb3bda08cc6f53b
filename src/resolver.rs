//! 资源路径解析
//!
//! EPUB 中的图片引用经常是相对路径、带锚点，甚至直接写错目录。
//! 这里把候选路径组织成一个有序的策略列表，逐个惰性求值，
//! 第一个在归档中存在的候选即为结果。

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

use crate::archive::{find_by_file_name, EntryIndex};

/// 缺失目录时尝试补上的常见内容根目录
const CONTENT_ROOTS: &[&str] = &["OEBPS", "OPS", "EPUB", "Content", "content", "Text"];

/// 候选策略，按求值顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// 原样
    Literal,
    /// 相对当前文档所在目录
    DocumentRelative,
    /// 相对包文档（OPF）所在目录
    PackageRelative,
    /// 去掉开头的 `./`、`../`
    Bare,
    /// 任意文件名相同的条目
    FileNameMatch,
    /// 去掉开头的 `/`
    StripLeadingSlash,
    /// 补上常见内容根目录
    ContentRoot,
}

const STRATEGIES: &[Strategy] = &[
    Strategy::Literal,
    Strategy::DocumentRelative,
    Strategy::PackageRelative,
    Strategy::Bare,
    Strategy::FileNameMatch,
    Strategy::StripLeadingSlash,
    Strategy::ContentRoot,
];

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: String,
    pub strategy: Strategy,
}

/// 路径解析器
///
/// `document_path` 是引用所在的内容文档，`package_base` 是 OPF 所在目录
#[derive(Debug, Clone)]
pub struct PathResolver<'a> {
    document_dir: &'a str,
    package_base: &'a str,
}

impl<'a> PathResolver<'a> {
    pub fn new(document_path: &'a str, package_base: &'a str) -> Self {
        Self {
            document_dir: parent_dir(document_path),
            package_base,
        }
    }

    /// 解析引用，返回第一个存在于归档中的路径
    ///
    /// 引用是 URL，`%20` 等转义在每个策略里先按原样、再按解码后的形式尝试
    pub fn resolve(&self, reference: &str, index: &dyn EntryIndex) -> Option<Resolved> {
        let src = strip_fragment(reference.trim());
        if src.is_empty() {
            return None;
        }

        let decoded = percent_decode(src);
        let forms: Vec<&str> = if decoded == src {
            vec![src]
        } else {
            vec![src, decoded.as_ref()]
        };

        STRATEGIES
            .iter()
            .flat_map(|&strategy| {
                forms.iter().flat_map(move |form| {
                    self.candidates(strategy, form, index)
                        .into_iter()
                        .map(move |path| Resolved { path, strategy })
                })
            })
            .find(|resolved| index.has_entry(&resolved.path))
    }

    fn candidates(&self, strategy: Strategy, src: &str, index: &dyn EntryIndex) -> Vec<String> {
        match strategy {
            Strategy::Literal => vec![src.to_string()],
            Strategy::DocumentRelative => vec![normalize_path(&join(self.document_dir, src))],
            Strategy::PackageRelative => vec![normalize_path(&join(self.package_base, src))],
            Strategy::Bare => vec![bare(src).to_string()],
            Strategy::FileNameMatch => {
                let file_name = src.rsplit('/').next().unwrap_or(src);
                find_by_file_name(index.entry_names(), file_name)
                    .map(|p| vec![p.to_string()])
                    .unwrap_or_default()
            }
            Strategy::StripLeadingSlash => vec![src.trim_start_matches('/').to_string()],
            Strategy::ContentRoot => {
                let rest = bare(src.trim_start_matches('/'));
                CONTENT_ROOTS
                    .iter()
                    .map(|root| format!("{}/{}", root, rest))
                    .collect()
            }
        }
    }
}

/// 解码 URL 中的 `%XX` 转义，非法 UTF-8 有损替换
pub fn percent_decode(src: &str) -> Cow<'_, str> {
    percent_decode_str(src).decode_utf8_lossy()
}

/// 去掉 `#锚点` 与 `?查询`
fn strip_fragment(src: &str) -> &str {
    let end = src.find(['#', '?']).unwrap_or(src.len());
    &src[..end]
}

/// 去掉开头所有的 `./` 与 `../` 段
fn bare(src: &str) -> &str {
    let mut rest = src;
    loop {
        if let Some(r) = rest.strip_prefix("./") {
            rest = r;
        } else if let Some(r) = rest.strip_prefix("../") {
            rest = r;
        } else {
            return rest;
        }
    }
}

/// 路径所在目录（不含末尾 `/`），根目录下的文件返回空串
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

/// 拼接目录与相对路径；以 `/` 开头的引用视为归档根路径
pub fn join(dir: &str, path: &str) -> String {
    if dir.is_empty() || path.starts_with('/') {
        path.trim_start_matches('/').to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), path)
    }
}

/// 规范化 `.` 与 `..` 段；越过根目录的 `..` 直接丢弃
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}
