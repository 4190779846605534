//! LDAP-style filter expressions over environment properties.
//!
//! Grammar:
//!
//! ```text
//! filter  = "(" body ")"
//! body    = "&" filter+ | "|" filter+ | "!" filter | item
//! item    = key ( "=" | "~=" | ">=" | "<=" ) value
//! ```
//!
//! `(key=*)` tests presence, `*` inside an equality value is a wildcard, and
//! `\` escapes the next character. Keys that are absent from the property map
//! make every assertion on them false.

use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Malformed filter text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid filter '{filter}' at offset {position}: {reason}")]
pub struct FilterError {
    filter: String,
    position: usize,
    reason: String,
}

impl FilterError {
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Byte offset of the problem in the filter text
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Parsed filter expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal { key: String, value: String },
    /// `(key=*)`
    Present { key: String },
    /// Equality with wildcards; `parts` are the literal pieces between `*`
    Substring { key: String, parts: Vec<String> },
    GreaterEq { key: String, value: String },
    LessEq { key: String, value: String },
    /// Case- and whitespace-insensitive equality
    Approx { key: String, value: String },
}

impl Filter {
    /// Parse filter text
    pub fn parse(text: &str) -> Result<Self, FilterError> {
        let mut parser = Parser {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        };

        parser.skip_whitespace();
        let filter = parser.parse_filter()?;
        parser.skip_whitespace();
        if parser.pos != parser.bytes.len() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(filter)
    }

    /// Evaluate against a property map
    pub fn matches(&self, properties: &BTreeMap<String, String>) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|child| child.matches(properties)),
            Filter::Or(children) => children.iter().any(|child| child.matches(properties)),
            Filter::Not(child) => !child.matches(properties),
            Filter::Present { key } => properties.contains_key(key),
            Filter::Equal { key, value } => properties.get(key).is_some_and(|actual| actual == value),
            Filter::Substring { key, parts } => {
                properties.get(key).is_some_and(|actual| substring_matches(actual, parts))
            },
            Filter::GreaterEq { key, value } => properties
                .get(key)
                .is_some_and(|actual| compare_values(actual, value) != Ordering::Less),
            Filter::LessEq { key, value } => properties
                .get(key)
                .is_some_and(|actual| compare_values(actual, value) != Ordering::Greater),
            Filter::Approx { key, value } => properties
                .get(key)
                .is_some_and(|actual| normalize_approx(actual) == normalize_approx(value)),
        }
    }
}

/// Evaluate an optional filter; no filter always holds.
///
/// Malformed filters are errors, never treated as true or false.
pub fn evaluate(filter: Option<&str>, properties: &BTreeMap<String, String>) -> Result<bool, FilterError> {
    match filter {
        None => Ok(true),
        Some(text) => Ok(Filter::parse(text)?.matches(properties)),
    }
}

/// Numeric comparison when both sides are integers, lexical otherwise
fn compare_values(actual: &str, expected: &str) -> Ordering {
    match (actual.trim().parse::<i64>(), expected.trim().parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => actual.cmp(expected),
    }
}

fn normalize_approx(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn substring_matches(actual: &str, parts: &[String]) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return true;
    };
    let Some(mut remaining) = actual.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };

    for part in middle {
        match remaining.find(part.as_str()) {
            Some(index) => remaining = &remaining[index + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> FilterError {
        FilterError {
            filter: self.text.to_string(),
            position: self.pos,
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: u8) -> Result<(), FilterError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected as char)))
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterError> {
        self.expect(b'(')?;
        self.skip_whitespace();

        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.parse_list()?)
            },
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.parse_list()?)
            },
            Some(b'!') => {
                self.pos += 1;
                self.skip_whitespace();
                Filter::Not(Box::new(self.parse_filter()?))
            },
            Some(_) => self.parse_item()?,
            None => return Err(self.error("unexpected end of filter")),
        };

        self.skip_whitespace();
        self.expect(b')')?;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut children = Vec::new();
        self.skip_whitespace();
        while self.peek() == Some(b'(') {
            children.push(self.parse_filter()?);
            self.skip_whitespace();
        }
        if children.is_empty() {
            return Err(self.error("expected at least one operand"));
        }
        Ok(children)
    }

    fn parse_item(&mut self) -> Result<Filter, FilterError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'=' | b'<' | b'>' | b'~' | b'(' | b')') {
                break;
            }
            self.pos += 1;
        }

        let key = self.text[start..self.pos].trim().to_string();
        if key.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let operator = match self.peek() {
            Some(b'=') => b'=',
            Some(op @ (b'<' | b'>' | b'~')) => {
                self.pos += 1;
                if self.peek() != Some(b'=') {
                    return Err(self.error("expected '=' after comparison operator"));
                }
                op
            },
            _ => return Err(self.error("expected an operator")),
        };
        self.pos += 1;

        let value_start = self.pos;
        let parts = self.parse_value()?;

        match operator {
            b'=' if parts.len() == 2 && parts.iter().all(String::is_empty) => Ok(Filter::Present { key }),
            b'=' if parts.len() > 1 => Ok(Filter::Substring { key, parts }),
            _ if parts.len() > 1 => {
                self.pos = value_start;
                Err(self.error("wildcards are only allowed in equality assertions"))
            },
            b'=' => Ok(Filter::Equal {
                key,
                value: join_parts(parts),
            }),
            b'>' => Ok(Filter::GreaterEq {
                key,
                value: join_parts(parts),
            }),
            b'<' => Ok(Filter::LessEq {
                key,
                value: join_parts(parts),
            }),
            _ => Ok(Filter::Approx {
                key,
                value: join_parts(parts),
            }),
        }
    }

    /// Read a value up to the closing parenthesis, split on unescaped `*`
    fn parse_value(&mut self) -> Result<Vec<String>, FilterError> {
        let mut parts = Vec::new();
        let mut current = Vec::new();

        loop {
            match self.peek() {
                None => return Err(self.error("unterminated value")),
                Some(b')') => break,
                Some(b'(') => return Err(self.error("unescaped '(' in value")),
                Some(b'*') => {
                    parts.push(self.utf8(std::mem::take(&mut current))?);
                    self.pos += 1;
                },
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    current.push(escaped);
                    self.pos += 1;
                },
                Some(b) => {
                    current.push(b);
                    self.pos += 1;
                },
            }
        }

        parts.push(self.utf8(current)?);
        Ok(parts)
    }

    fn utf8(&self, bytes: Vec<u8>) -> Result<String, FilterError> {
        String::from_utf8(bytes).map_err(|_| self.error("invalid UTF-8 in value"))
    }
}

fn join_parts(mut parts: Vec<String>) -> String {
    parts.pop().unwrap_or_default()
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                f.write_str(if matches!(self, Filter::And(_)) { "(&" } else { "(|" })?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                f.write_str(")")
            },
            Filter::Not(child) => write!(f, "(!{})", child),
            Filter::Present { key } => write!(f, "({}=*)", key),
            Filter::Equal { key, value } => write!(f, "({}={})", key, escape_value(value)),
            Filter::Substring { key, parts } => {
                let pattern: Vec<String> = parts.iter().map(|part| escape_value(part)).collect();
                write!(f, "({}={})", key, pattern.join("*"))
            },
            Filter::GreaterEq { key, value } => write!(f, "({}>={})", key, escape_value(value)),
            Filter::LessEq { key, value } => write!(f, "({}<={})", key, escape_value(value)),
            Filter::Approx { key, value } => write!(f, "({}~={})", key, escape_value(value)),
        }
    }
}

/// Thread-safe memo of parsed filters keyed by their text.
///
/// A universe evaluated for several environments sees the same filter
/// strings over and over; each is parsed once. Parse errors are not cached.
#[derive(Debug, Default)]
pub struct FilterCache {
    filters: DashMap<String, Arc<Filter>>,
}

impl FilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the parsed form of `text`, parsing on first use
    pub fn get_or_parse(&self, text: &str) -> Result<Arc<Filter>, FilterError> {
        if let Some(filter) = self.filters.get(text) {
            return Ok(Arc::clone(filter.value()));
        }

        let filter = Arc::new(Filter::parse(text)?);
        self.filters.insert(text.to_string(), Arc::clone(&filter));
        Ok(filter)
    }

    /// Same as [`evaluate`], using cached parses
    pub fn evaluate(
        &self,
        filter: Option<&str>,
        properties: &BTreeMap<String, String>,
    ) -> Result<bool, FilterError> {
        match filter {
            None => Ok(true),
            Some(text) => Ok(self.get_or_parse(text)?.matches(properties)),
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn clear(&self) {
        self.filters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn linux() -> BTreeMap<String, String> {
        props(&[("os", "linux"), ("ws", "gtk"), ("arch", "x86_64")])
    }

    #[test]
    fn test_no_filter_is_true() {
        assert!(evaluate(None, &BTreeMap::new()).unwrap());
    }

    #[test]
    fn test_equality_and_boolean_operators() {
        let env = linux();
        assert!(evaluate(Some("(os=linux)"), &env).unwrap());
        assert!(!evaluate(Some("(os=win32)"), &env).unwrap());
        assert!(evaluate(Some("(&(os=linux)(arch=x86_64))"), &env).unwrap());
        assert!(!evaluate(Some("(&(os=linux)(arch=aarch64))"), &env).unwrap());
        assert!(evaluate(Some("(|(os=win32)(os=linux))"), &env).unwrap());
        assert!(evaluate(Some("(!(os=win32))"), &env).unwrap());
        assert!(evaluate(Some(" ( & (os=linux) (ws=gtk) ) "), &env).unwrap());
    }

    #[test]
    fn test_unknown_keys_are_absent() {
        let env = linux();
        assert!(!evaluate(Some("(nl=en)"), &env).unwrap());
        assert!(!evaluate(Some("(nl=*)"), &env).unwrap());
        assert!(evaluate(Some("(!(nl=en))"), &env).unwrap());
        assert!(!evaluate(Some("(nl>=1)"), &env).unwrap());
    }

    #[test]
    fn test_presence_and_substrings() {
        let env = linux();
        assert!(evaluate(Some("(os=*)"), &env).unwrap());
        assert!(evaluate(Some("(arch=x86*)"), &env).unwrap());
        assert!(evaluate(Some("(arch=*64)"), &env).unwrap());
        assert!(evaluate(Some("(arch=x*_*4)"), &env).unwrap());
        assert!(!evaluate(Some("(arch=arm*)"), &env).unwrap());
        assert!(!evaluate(Some("(os=l*x*z)"), &env).unwrap());
    }

    #[test]
    fn test_ordering_and_approximate() {
        let env = props(&[("level", "10"), ("name", "Hello World")]);
        assert!(evaluate(Some("(level>=9)"), &env).unwrap());
        assert!(!evaluate(Some("(level<=9)"), &env).unwrap());
        assert!(evaluate(Some("(level<=10)"), &env).unwrap());
        assert!(evaluate(Some("(name~=helloworld)"), &env).unwrap());
        assert!(!evaluate(Some("(name=helloworld)"), &env).unwrap());
    }

    #[test]
    fn test_escapes() {
        let env = props(&[("path", "a*(b)")]);
        let filter = Filter::parse(r"(path=a\*\(b\))").unwrap();
        assert!(filter.matches(&env));
        assert_eq!(filter.to_string(), r"(path=a\*\(b\))");
    }

    #[test]
    fn test_malformed_filters_are_errors() {
        for text in [
            "",
            "os=linux",
            "(os=linux",
            "(os=linux))",
            "(&)",
            "(=linux)",
            "(os linux)",
            "(os>linux)",
            "(os=li(nux)",
            "(os>=lin*)",
            r"(os=linux\",
        ] {
            assert!(Filter::parse(text).is_err(), "'{}' should not parse", text);
            assert!(evaluate(Some(text), &linux()).is_err());
        }
    }

    #[test]
    fn test_error_position() {
        let err = Filter::parse("(&(os=linux)(arch=x86_64)").unwrap_err();
        assert_eq!(err.filter(), "(&(os=linux)(arch=x86_64)");
        assert_eq!(err.position(), 25);
    }

    #[test]
    fn test_display_is_canonical() {
        let filter = Filter::parse(" (& (os=linux) (| (arch=x86*) (!(ws=*)) ) ) ").unwrap();
        assert_eq!(filter.to_string(), "(&(os=linux)(|(arch=x86*)(!(ws=*))))");
        assert_eq!(Filter::parse(&filter.to_string()).unwrap(), filter);
    }

    #[test]
    fn test_cache_parses_once() {
        let cache = FilterCache::new();
        let env = linux();

        assert!(cache.evaluate(Some("(os=linux)"), &env).unwrap());
        assert!(cache.evaluate(Some("(os=linux)"), &env).unwrap());
        assert!(cache.evaluate(None, &env).unwrap());
        assert_eq!(cache.len(), 1);

        assert!(cache.evaluate(Some("(os=linux"), &env).is_err());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf() -> impl Strategy<Value = Filter> {
        let key = "[a-z]{1,6}";
        let value = "[a-zA-Z0-9_.()*\\\\ -]{1,8}";
        prop_oneof![
            (key, value).prop_map(|(key, value)| Filter::Equal { key, value }),
            key.prop_map(|key| Filter::Present { key }),
            (key, value).prop_map(|(key, value)| Filter::GreaterEq { key, value }),
            (key, value).prop_map(|(key, value)| Filter::LessEq { key, value }),
        ]
    }

    fn filter() -> impl Strategy<Value = Filter> {
        leaf().prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..3).prop_map(Filter::And),
                prop::collection::vec(inner.clone(), 1..3).prop_map(Filter::Or),
                inner.prop_map(|child| Filter::Not(Box::new(child))),
            ]
        })
    }

    proptest! {
        #[test]
        fn display_parses_back(original in filter()) {
            let parsed = Filter::parse(&original.to_string()).unwrap();
            prop_assert_eq!(parsed, original);
        }

        #[test]
        fn negation_inverts(original in filter(), os in "[a-z]{1,6}") {
            let env: BTreeMap<String, String> = [("os".to_string(), os)].into_iter().collect();
            let negated = Filter::Not(Box::new(original.clone()));
            prop_assert_eq!(negated.matches(&env), !original.matches(&env));
        }
    }
}
