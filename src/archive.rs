use std::collections::HashSet;
use std::io::{Cursor, Read, Seek};

use zip::ZipArchive;

use crate::error::{IngestError, Result};

/// 单个条目解压后的大小上限（100MB）
pub const MAX_ENTRY_SIZE: u64 = 100 * 1024 * 1024;

/// 归档条目索引
///
/// 路径解析只需要“某个条目是否存在”和“全部条目名”，
/// 抽成 trait 以便解析策略脱离 zip 单独测试
pub trait EntryIndex {
    fn has_entry(&self, path: &str) -> bool;
    fn entry_names(&self) -> &[String];
}

/// EPUB 归档读取器
///
/// 打开 zip 容器，按路径查找条目
pub struct ArchiveReader<R: Read + Seek> {
    zip: ZipArchive<R>,
    /// 文件条目名（按归档顺序，不含目录）
    names: Vec<String>,
    name_set: HashSet<String>,
}

impl<'a> ArchiveReader<Cursor<&'a [u8]>> {
    /// 从内存字节打开归档
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        Self::new(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let zip = ZipArchive::new(reader)
            .map_err(|e| IngestError::MalformedContainer(format!("不是有效的 zip 归档: {}", e)))?;

        let names: Vec<String> = zip
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(|name| name.to_string())
            .collect();
        let name_set = names.iter().cloned().collect();

        Ok(Self {
            zip,
            names,
            name_set,
        })
    }

    /// 读取条目的原始字节
    pub fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut file = self
            .zip
            .by_name(path)
            .map_err(|e| IngestError::ResourceExtractionFailure(format!("{}: {}", path, e)))?;

        // 声明大小来自文件头，不可信
        let size = file.size();
        if size > MAX_ENTRY_SIZE {
            return Err(IngestError::ResourceExtractionFailure(format!(
                "{}: 条目声明大小 {} 字节超过上限 {} 字节",
                path, size, MAX_ENTRY_SIZE
            )));
        }

        let mut buf = Vec::with_capacity(size as usize);
        file.by_ref()
            .take(MAX_ENTRY_SIZE + 1)
            .read_to_end(&mut buf)
            .map_err(|e| IngestError::ResourceExtractionFailure(format!("{}: {}", path, e)))?;
        if buf.len() as u64 > MAX_ENTRY_SIZE {
            return Err(IngestError::ResourceExtractionFailure(format!(
                "{}: 解压后超过上限 {} 字节",
                path, MAX_ENTRY_SIZE
            )));
        }
        Ok(buf)
    }

    /// 读取条目为字符串（去掉 BOM，非法 UTF-8 有损替换）
    pub fn read_string(&mut self, path: &str) -> Result<String> {
        let bytes = self.read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }

}

impl<R: Read + Seek> EntryIndex for ArchiveReader<R> {
    fn has_entry(&self, path: &str) -> bool {
        self.name_set.contains(path)
    }

    fn entry_names(&self) -> &[String] {
        &self.names
    }
}

/// 第一个文件名（最后一段）等于 `file_name` 的条目
pub(crate) fn find_by_file_name<'a>(names: &'a [String], file_name: &str) -> Option<&'a str> {
    if file_name.is_empty() {
        return None;
    }
    names
        .iter()
        .find(|name| name.rsplit('/').next() == Some(file_name))
        .map(|name| name.as_str())
}
