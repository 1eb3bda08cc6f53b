use serde::{Deserialize, Serialize};

/// 书籍级语言族
///
/// 只区分 CJK 与拉丁语系，用于 TTS 选音色，不做逐段检测
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageFamily {
    Cjk,
    Latin,
}

impl LanguageFamily {
    /// 写入 Book.language 的语言代码
    pub fn code(&self) -> &'static str {
        match self {
            LanguageFamily::Cjk => "zh",
            LanguageFamily::Latin => "en",
        }
    }
}

/// CJK 字符占非空白字符的比例超过该值即判定为 CJK
const CJK_RATIO_THRESHOLD: f64 = 0.3;

/// 是否为 CJK 字符（汉字、平假名、片假名、谚文）
pub fn is_cjk_char(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF      // CJK 统一汉字
        | 0x3400..=0x4DBF    // 扩展 A
        | 0xF900..=0xFAFF    // 兼容汉字
        | 0x3040..=0x309F    // 平假名
        | 0x30A0..=0x30FF    // 片假名
        | 0x1100..=0x11FF    // 谚文字母
        | 0x3130..=0x318F    // 谚文兼容字母
        | 0xAC00..=0xD7AF    // 谚文音节
    )
}

/// 按文字比例检测语言族
pub fn detect_language(text: &str) -> LanguageFamily {
    let mut total = 0usize;
    let mut cjk = 0usize;

    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if is_cjk_char(c) {
            cjk += 1;
        }
    }

    if total > 0 && (cjk as f64 / total as f64) > CJK_RATIO_THRESHOLD {
        LanguageFamily::Cjk
    } else {
        LanguageFamily::Latin
    }
}
