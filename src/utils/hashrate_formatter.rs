//! 算力单位解析与格式化
//!
//! 矿池统计接口返回带单位后缀的算力字符串 (如 "12.3M")，
//! 而矿工配置里的额定算力可以是纯数字也可以带单位。

const UNITS: [(&str, f64); 6] = [
    ("P", 1e15),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("K", 1e3),
    ("H", 1.0),
];

/// 格式化算力显示（紧凑模式）
///
/// # 示例
/// ```
/// use profit_switcher::utils::hashrate_formatter::format_hashrate;
///
/// assert_eq!(format_hashrate(1_234_567_890.0), "1.23 GH/s");
/// ```
pub fn format_hashrate(hashrate: f64) -> String {
    if !hashrate.is_finite() || hashrate <= 0.0 {
        return "0 H/s".to_string();
    }

    for (unit, scale) in UNITS {
        if unit != "H" && hashrate >= scale {
            return format!("{:.2} {}H/s", hashrate / scale, unit);
        }
    }

    format!("{:.0} H/s", hashrate)
}

/// 解析算力字符串为 H/s
///
/// 支持 "12.3M"、"1G"、"1.5 GH/s"、"2.3 kh/s" 以及不带单位的数字。
/// 空字符串、负数和无法识别的单位返回 `None`。
///
/// # 示例
/// ```
/// use profit_switcher::utils::hashrate_formatter::parse_hashrate;
///
/// assert_eq!(parse_hashrate("12.5M"), Some(12_500_000.0));
/// assert_eq!(parse_hashrate("1.5 GH/s"), Some(1_500_000_000.0));
/// assert_eq!(parse_hashrate(""), None);
/// ```
pub fn parse_hashrate(hashrate_str: &str) -> Option<f64> {
    let upper = hashrate_str.trim().to_uppercase();
    let s = upper.strip_suffix("/S").unwrap_or(&upper).trim_end();
    if s.is_empty() {
        return None;
    }

    let split_pos = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (number_part, unit_part) = s.split_at(split_pos);
    let number = number_part.trim().parse::<f64>().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }

    // "GH" 与 "G" 等价
    let unit = unit_part.trim();
    let unit = unit.strip_suffix('H').filter(|u| !u.is_empty()).unwrap_or(unit);
    let multiplier = match unit {
        "" => 1.0,
        other => UNITS.iter().find(|(u, _)| *u == other)?.1,
    };

    Some(number * multiplier)
}
