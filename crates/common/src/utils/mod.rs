/// 工具函数集合

use crate::{Error, Result};

/// 解析人类可读的字节数量，如 "1GiB"、"512M"、"-2TB"
///
/// 后缀一律按二进制倍数处理（1K = 1KiB = 1024），纯数字按字节返回。
/// 允许负数，重分配请求用负值表达缩容。
pub fn parse_in_human(s: &str) -> Result<i64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidParams("空的数量字符串".to_string()));
    }
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if let Ok(v) = rest.parse::<i64>() {
        return Ok(if negative { -v } else { v });
    }

    let split = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| Error::InvalidParams(format!("无法解析数量: {s}")))?;
    let (num, suffix) = rest.split_at(split);
    let value: f64 = num
        .parse()
        .map_err(|_| Error::InvalidParams(format!("无法解析数量: {s}")))?;
    let multiplier = parse_suffix(suffix)
        .ok_or_else(|| Error::InvalidParams(format!("无法识别的单位: {s}")))?;
    let v = (value * multiplier as f64) as i64;
    Ok(if negative { -v } else { v })
}

fn parse_suffix(suffix: &str) -> Option<i64> {
    let lower = suffix.to_ascii_lowercase();
    let mut chars = lower.chars();
    let unit = chars.next()?;
    let rest: String = chars.collect();
    let exp = match unit {
        'b' if rest.is_empty() => 0,
        'k' => 1,
        'm' => 2,
        'g' => 3,
        't' => 4,
        'p' => 5,
        _ => return None,
    };
    if !matches!(rest.as_str(), "" | "b" | "ib") {
        return None;
    }
    Some(1i64 << (10 * exp))
}

/// 格式化字节大小
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let sign = if bytes < 0 { "-" } else { "" };
    let mut size = bytes.unsigned_abs() as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{}{:.2} {}", sign, size, UNITS[unit_index])
}
