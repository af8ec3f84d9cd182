//! 从原始响应文本中提取数值字段
//!
//! 这里刻意不做结构化解析：上游页面结构并不稳定，只要求文本中某处存在
//! `"<字段名>":` 标记且其后跟随一个数字即可。

/// 数值提取错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// 响应中不存在字段标记
    FieldNotFound(String),
    /// 标记之后没有任何数字
    NoNumericValue,
    /// 数字片段无法解析为有限浮点数
    MalformedNumber(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::FieldNotFound(key) => write!(f, "未找到字段: {key}"),
            ExtractError::NoNumericValue => write!(f, "字段之后没有数值"),
            ExtractError::MalformedNumber(s) => write!(f, "数值格式错误: {s}"),
        }
    }
}

impl std::error::Error for ExtractError {}

pub type Result<T> = std::result::Result<T, ExtractError>;

/// 在 `raw` 中定位 `field_key` 并返回其后的数值
pub fn extract(raw: &str, field_key: &str) -> Result<f64> {
    let marker = format!("\"{field_key}\":");
    let idx = raw
        .find(&marker)
        .ok_or_else(|| ExtractError::FieldNotFound(field_key.to_string()))?;

    // 只认数字作为起点，负号不算：市值不可能为负
    let rest = &raw[idx + marker.len()..];
    let start = match rest.find(|c: char| c.is_ascii_digit()) {
        Some(pos) => pos,
        None => return Err(ExtractError::NoNumericValue),
    };

    let tail = &rest[start..];
    let end = tail
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(tail.len());
    let number = &tail[..end];

    match number.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ExtractError::MalformedNumber(number.to_string())),
    }
}
