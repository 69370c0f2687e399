//! Typed metadata values and their text form.
//!
//! The text form is shared by gallery descriptors (`path[key=value]`) and the
//! flat gallery. Grammar for a single value:
//!
//! ```text
//! true | false            Bool
//! -?[0-9]+                Int
//! float                   Float
//! (x,y)                   Point
//! (x,y,w,h)               Rect
//! [(x,y),...]             Points
//! [(x,y,w,h),...]         Rects
//! 0x<hex>                 Blob
//! "..."                   String (quoted when it would otherwise be ambiguous)
//! anything else           String
//! ```

use std::fmt;

use crate::util::{Point, Rect};

/// A single metadata value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Point(Point),
    Rect(Rect),
    Points(Vec<Point>),
    Rects(Vec<Rect>),
    Blob(Vec<u8>),
}

impl Value {
    /// String content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view. Floats are truncated, numeric strings are parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.is_finite() => Some(*v as i64),
            Self::Bool(b) => Some(*b as i64),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point view.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean view. Non-zero numbers and "true"/"1" strings are true.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(v) => Some(*v != 0),
            Self::Float(v) => Some(*v != 0.0),
            Self::String(s) => match s.trim() {
                "true" | "1" | "" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_point(&self) -> Option<Point> {
        match self {
            Self::Point(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_rect(&self) -> Option<Rect> {
        match self {
            Self::Rect(r) => Some(*r),
            _ => None,
        }
    }

    /// Point list view; a single point becomes a one-element list.
    pub fn as_points(&self) -> Option<Vec<Point>> {
        match self {
            Self::Points(p) => Some(p.clone()),
            Self::Point(p) => Some(vec![*p]),
            _ => None,
        }
    }

    /// Rectangle list view; a single rectangle becomes a one-element list.
    pub fn as_rects(&self) -> Option<Vec<Rect>> {
        match self {
            Self::Rects(r) => Some(r.clone()),
            Self::Rect(r) => Some(vec![*r]),
            // An empty list parses as `Points`
            Self::Points(p) if p.is_empty() => Some(Vec::new()),
            _ => None,
        }
    }

    /// Human readable representation without quoting.
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Parse the text form of a value.
    pub fn parse(text: &str) -> Self {
        let t = text.trim();

        if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') {
            return Self::String(unquote(&t[1..t.len() - 1]));
        }
        match t {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(v) = t.parse::<i64>() {
            return Self::Int(v);
        }
        if looks_numeric(t) {
            if let Ok(v) = t.parse::<f64>() {
                return Self::Float(v);
            }
        }
        if let Some(hex) = t.strip_prefix("0x") {
            if !hex.is_empty() {
                if let Ok(bytes) = hex::decode(hex) {
                    return Self::Blob(bytes);
                }
            }
        }
        if let Some(nums) = parse_tuple(t) {
            match nums.len() {
                2 => return Self::Point(Point::new(nums[0], nums[1])),
                4 => return Self::Rect(Rect::new(nums[0], nums[1], nums[2], nums[3])),
                _ => {}
            }
        }
        if t.starts_with('[') && t.ends_with(']') {
            if let Some(v) = parse_list(&t[1..t.len() - 1]) {
                return v;
            }
        }
        Self::String(t.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(s) => {
                if needs_quotes(s) {
                    write!(f, "\"{}\"", quote(s))
                } else {
                    f.write_str(s)
                }
            }
            Self::Point(p) => write!(f, "({},{})", p.x, p.y),
            Self::Rect(r) => write!(f, "{}", r),
            Self::Points(points) => {
                f.write_str("[")?;
                for (i, p) in points.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "({},{})", p.x, p.y)?;
                }
                f.write_str("]")
            }
            Self::Rects(rects) => {
                f.write_str("[")?;
                for (i, r) in rects.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", r)?;
                }
                f.write_str("]")
            }
            Self::Blob(bytes) => write!(f, "0x{}", hex::encode(bytes)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Point> for Value {
    fn from(v: Point) -> Self {
        Self::Point(v)
    }
}

impl From<Rect> for Value {
    fn from(v: Rect) -> Self {
        Self::Rect(v)
    }
}

impl From<Vec<Point>> for Value {
    fn from(v: Vec<Point>) -> Self {
        Self::Points(v)
    }
}

impl From<Vec<Rect>> for Value {
    fn from(v: Vec<Rect>) -> Self {
        Self::Rects(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

/// Split `s` on `sep` at bracket/paren depth zero, honouring quoted strings.
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if in_quotes {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Parse `(a,b,...)` into numbers.
fn parse_tuple(t: &str) -> Option<Vec<f64>> {
    let inner = t.strip_prefix('(')?.strip_suffix(')')?;
    inner.split(',').map(|n| n.trim().parse::<f64>().ok()).collect()
}

fn parse_list(inner: &str) -> Option<Value> {
    if inner.trim().is_empty() {
        return Some(Value::Points(Vec::new()));
    }
    let tuples: Option<Vec<Vec<f64>>> = split_top_level(inner, ',')
        .into_iter()
        .map(|item| parse_tuple(item.trim()))
        .collect();
    let tuples = tuples?;

    if tuples.iter().all(|t| t.len() == 2) {
        Some(Value::Points(tuples.iter().map(|t| Point::new(t[0], t[1])).collect()))
    } else if tuples.iter().all(|t| t.len() == 4) {
        Some(Value::Rects(tuples.iter().map(|t| Rect::new(t[0], t[1], t[2], t[3])).collect()))
    } else {
        None
    }
}

fn looks_numeric(t: &str) -> bool {
    !t.is_empty()
        && t.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && t.chars().any(|c| c.is_ascii_digit())
}

fn needs_quotes(s: &str) -> bool {
    if s.is_empty() || s.trim() != s {
        return true;
    }
    if s.contains(|c| matches!(c, ',' | '[' | ']' | '(' | ')' | '=' | '"')) {
        return true;
    }
    // Strings that would re-parse as another type
    !matches!(Value::parse(s), Value::String(_))
}

fn quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn unquote(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        assert_eq!(Value::parse("true"), Value::Bool(true));
        assert_eq!(Value::parse("42"), Value::Int(42));
        assert_eq!(Value::parse("-1.5"), Value::Float(-1.5));
        assert_eq!(Value::parse("face"), Value::String("face".into()));
        assert_eq!(Value::parse("0xdead"), Value::Blob(vec![0xde, 0xad]));
    }

    #[test]
    fn test_parse_geometry() {
        assert_eq!(Value::parse("(1,2)"), Value::Point(Point::new(1.0, 2.0)));
        assert_eq!(Value::parse("(1,2,3,4)"), Value::Rect(Rect::new(1.0, 2.0, 3.0, 4.0)));
        assert_eq!(
            Value::parse("[(1,2),(3,4.5)]"),
            Value::Points(vec![Point::new(1.0, 2.0), Point::new(3.0, 4.5)])
        );
        assert_eq!(
            Value::parse("[(0,0,10,10)]"),
            Value::Rects(vec![Rect::new(0.0, 0.0, 10.0, 10.0)])
        );
    }

    #[test]
    fn test_display_reparses() {
        let values = vec![
            Value::Int(7),
            Value::Point(Point::new(1.25, -3.0)),
            Value::Rects(vec![Rect::new(1.0, 2.0, 3.0, 4.0), Rect::new(0.0, 0.0, 1.0, 1.0)]),
            Value::String("a,b".into()),
            Value::String("12".into()),
            Value::String("say \"hi\"".into()),
            Value::String(String::new()),
            Value::Blob(vec![1, 2, 3]),
        ];
        for v in values {
            assert_eq!(Value::parse(&v.to_string()), v, "value {:?}", v);
        }
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_top_level("a=1,b=(1,2),c=[(1,2)]", ','), vec!["a=1", "b=(1,2)", "c=[(1,2)]"]);
        assert_eq!(split_top_level("a=\"x,y\",b", ','), vec!["a=\"x,y\"", "b"]);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Value::String(" 12 ".into()).as_i64(), Some(12));
        assert_eq!(Value::Int(0).as_bool(), Some(false));
        assert_eq!(Value::Float(2.9).as_i64(), Some(2));
        assert_eq!(Value::Rect(Rect::new(0.0, 0.0, 1.0, 1.0)).as_rects().map(|r| r.len()), Some(1));
    }
}
