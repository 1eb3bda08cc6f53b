use std::path::PathBuf;
use thiserror::Error;

/// 导入管线错误
///
/// 只有“结构性损坏”和“完全没有可读内容”会终止导入；
/// 单张图片、单页、单个 spine 条目的失败都在提取器内部记录日志后跳过。
#[derive(Error, Debug)]
pub enum IngestError {
    /// 声明的扩展名不在 txt / pdf / epub 之内
    #[error("不支持的文件格式: {0}")]
    UnsupportedFormat(String),
    /// EPUB 容器或 OPF 包文档缺失、无法解析
    #[error("EPUB 结构损坏: {0}")]
    MalformedContainer(String),
    /// 所有回退策略之后仍没有提取到任何章节或段落
    #[error("没有可读内容: {0}")]
    NoReadableContent(String),
    /// PDF 无法打开（损坏或加密）
    #[error("PDF 已损坏或受保护: {0}")]
    CorruptOrProtectedSource(String),
    /// 单个资源（图片、页面渲染）提取失败，调用方通常只记录不上抛
    #[error("资源提取失败: {0}")]
    ResourceExtractionFailure(String),
    /// 配置文件读取或解析失败
    #[error("配置错误: {0}")]
    Config(String),
    /// 导入队列锁失效或后台任务异常终止
    #[error("导入队列错误: {0}")]
    Queue(String),
    #[error("读取文件失败 {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, IngestError>;

impl IngestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// 面向用户的处理建议
    ///
    /// 按错误类别给出针对格式的提示，而不是笼统的“导入失败”
    pub fn user_hint(&self) -> &'static str {
        match self {
            IngestError::UnsupportedFormat(_) => "目前仅支持 TXT、PDF 和 EPUB 文件",
            IngestError::MalformedContainer(_) => {
                "EPUB 文件结构已损坏，建议使用 Calibre 等工具重新导出后再导入"
            }
            IngestError::NoReadableContent(_) => {
                "未能从文件中提取到文字，可能是扫描版或内容为空，建议使用文字版文件"
            }
            IngestError::CorruptOrProtectedSource(_) => {
                "PDF 文件已损坏或已加密，请先移除密码保护或重新导出 PDF"
            }
            IngestError::ResourceExtractionFailure(_) => "部分图片或页面无法提取，其余内容不受影响",
            IngestError::Config(_) => "请检查配置文件格式",
            IngestError::Queue(_) => "导入任务异常中断，请重新导入该文件",
            IngestError::Io { .. } => "请确认文件存在且有读取权限",
        }
    }

    /// 是否为终止性错误（导入整体失败）
    pub fn is_terminal(&self) -> bool {
        !matches!(self, IngestError::ResourceExtractionFailure(_))
    }
}
