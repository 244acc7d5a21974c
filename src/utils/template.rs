//! `$(IDENTIFIER)` 变量注入
//!
//! 标识符由字母、数字、下划线和点组成 (例如 `JOB.COIN.ID`)。
//! 前面带反斜杠的 `\$(` 不会被替换，原样保留。
//! 未知标识符原样保留，并按需记录警告。

use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// 模板变量值
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// 变量表
pub type Vars = HashMap<String, Value>;

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:.8}", x),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            other => Value::Str(other.to_string()),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// 把 `template` 中已知的 `$(NAME)` 替换为变量值
///
/// `log_unknown` 为 false 时不记录未知变量警告。
pub fn inject(template: &str, vars: &Vars, log_unknown: bool) -> String {
    if template.is_empty() || vars.is_empty() {
        return template.to_string();
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find("$(") {
        let escaped = rest[..pos].ends_with('\\');
        let after = &rest[pos + 2..];
        let ident_len = after
            .char_indices()
            .find(|(_, c)| !is_ident_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(after.len());
        let closed = after[ident_len..].starts_with(')');

        if escaped || !closed {
            out.push_str(&rest[..pos + 2]);
            rest = after;
            continue;
        }

        let name = &after[..ident_len];
        out.push_str(&rest[..pos]);
        match vars.get(name) {
            Some(value) => out.push_str(&value.to_string()),
            None => {
                if log_unknown {
                    warn!("Unknown event variable '{}'", name);
                }
                out.push_str(&rest[pos..pos + 2 + ident_len + 1]);
            }
        }
        rest = &after[ident_len + 1..];
    }

    out.push_str(rest);
    out
}

/// 构造变量表的便捷宏
#[macro_export]
macro_rules! vars {
    () => {
        $crate::utils::template::Vars::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut vars = $crate::utils::template::Vars::new();
        $(vars.insert($key.to_string(), $crate::utils::template::Value::from($value));)+
        vars
    }};
}
