//! 统一的标记树
//!
//! container.xml / OPF 用 quick-xml 解析，章节 XHTML 用 scraper 解析，
//! 两者都转换成同一种 `Node` 树，后续遍历不依赖任何动态属性查找。

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scraper::{ElementRef, Html};

/// 节点
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// 元素：标签名为小写本地名（去掉命名空间前缀）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// 块级标签
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "center", "dd", "div", "dl", "dt",
    "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

/// 内容不参与正文的标签
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

pub fn is_block_tag(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

/// h1-h6 的层级
pub fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// class 属性中是否有包含 `needle` 的类名（不区分大小写）
    pub fn has_class_containing(&self, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.attr("class")
            .map(|c| {
                c.split_whitespace()
                    .any(|name| name.to_ascii_lowercase().contains(&needle))
            })
            .unwrap_or(false)
    }

    /// 子元素
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// 文本内容，空白折叠为单个空格
    pub fn text(&self) -> String {
        let mut raw = String::new();
        self.collect_text(&mut raw, false);
        collapse_whitespace(&raw)
    }

    /// 文本内容，块级元素之间补空格，用于“剥离全部标记”
    pub fn spaced_text(&self) -> String {
        let mut raw = String::new();
        self.collect_text(&mut raw, true);
        collapse_whitespace(&raw)
    }

    fn collect_text(&self, out: &mut String, space_blocks: bool) {
        if SKIPPED_TAGS.contains(&self.tag.as_str()) {
            return;
        }
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => {
                    e.collect_text(out, space_blocks);
                    if space_blocks && (is_block_tag(&e.tag) || e.tag == "br") {
                        out.push(' ');
                    }
                }
            }
        }
    }

    /// 深度优先（文档顺序）查找第一个满足条件的后代元素
    pub fn find<F>(&self, pred: F) -> Option<&Element>
    where
        F: Fn(&Element) -> bool + Copy,
    {
        for child in self.child_elements() {
            if pred(child) {
                return Some(child);
            }
            if let Some(found) = child.find(pred) {
                return Some(found);
            }
        }
        None
    }

    /// 文档顺序收集所有满足条件的后代元素
    pub fn find_all<'a, F>(&'a self, pred: F, out: &mut Vec<&'a Element>)
    where
        F: Fn(&Element) -> bool + Copy,
    {
        for child in self.child_elements() {
            if pred(child) {
                out.push(child);
            }
            child.find_all(pred, out);
        }
    }

    /// 是否存在块级后代元素
    pub fn has_block_descendant(&self) -> bool {
        self.find(|e| is_block_tag(&e.tag)).is_some()
    }

    /// 移除并返回文档顺序中第一个满足条件的后代元素
    pub fn remove_first<F>(&mut self, pred: F) -> Option<Element>
    where
        F: Fn(&Element) -> bool + Copy,
    {
        for i in 0..self.children.len() {
            let matched = matches!(&self.children[i], Node::Element(e) if pred(e));
            if matched {
                if let Node::Element(e) = self.children.remove(i) {
                    return Some(e);
                }
                return None;
            }
            if let Node::Element(e) = &mut self.children[i] {
                if let Some(found) = e.remove_first(pred) {
                    return Some(found);
                }
            }
        }
        None
    }
}

/// 折叠空白（含全角空格、不间断空格）并去除首尾空白
pub fn collapse_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 解析 XML 文档，返回根元素
///
/// 标签与属性名都取本地名，`dc:title` 记为 `title`
pub fn parse_xml(xml: &str) -> Result<Element, String> {
    let mut reader = Reader::from_str(xml.trim_start_matches('\u{feff}'));
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(element_from_xml(&e)),
            Ok(Event::Empty(e)) => {
                let element = element_from_xml(&e);
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or("多余的结束标签")?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(t)) => {
                let text = match t.unescape() {
                    Ok(text) => text.into_owned(),
                    // XML 不认识的 HTML 实体（如 &nbsp;）
                    Err(_) => html_escape::decode_html_entities(&String::from_utf8_lossy(&t))
                        .into_owned(),
                };
                if let Some(top) = stack.last_mut() {
                    top.children.push(Node::Text(text));
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                    top.children.push(Node::Text(text));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML 解析失败（位置 {}）: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err("XML 文档未闭合".to_string());
    }
    root.ok_or_else(|| "XML 文档为空".to_string())
}

fn element_from_xml(start: &BytesStart) -> Element {
    let local = start.local_name();
    let mut element = Element::new(&String::from_utf8_lossy(local.as_ref()));
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        element.attrs.push((key, value));
    }
    element
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// 解析 HTML/XHTML 文档，返回 `<html>` 根元素
///
/// html5ever 对破损标记有完整的容错，所以这里不会失败
pub fn parse_html(html: &str) -> Element {
    let document = Html::parse_document(html);
    element_from_html(document.root_element())
}

fn element_from_html(element: ElementRef) -> Element {
    let mut out = Element::new(element.value().name());
    out.attrs = element
        .value()
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    if SKIPPED_TAGS.contains(&out.tag.as_str()) {
        return out;
    }

    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.children.push(Node::Text(text.to_string()));
        } else if let Some(child_element) = ElementRef::wrap(child) {
            out.children.push(Node::Element(element_from_html(child_element)));
        }
    }
    out
}
