/// 单位后缀，最多到万亿
const SUFFIXES: [&str; 5] = ["", "K", "M", "B", "T"];

/// 将原始市值格式化为带美元符号与单位后缀的短字符串
///
/// 例如 `19794.950585` 得到 `$19.79K`，`2500000` 得到 `$2.50M`。
/// 到达 `T` 后不再继续缩小，即使数值仍大于 1000。
pub fn format_display(value: f64) -> String {
    let mut value = value;
    let mut idx = 0;
    while idx < SUFFIXES.len() - 1 && value >= 1000.0 {
        value /= 1000.0;
        idx += 1;
    }
    format!("${value:.2}{}", SUFFIXES[idx])
}
