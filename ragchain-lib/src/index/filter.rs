//! Metadata filters
//!
//! A [`Filter`] is a conjunction of `(key, operator, value)` conditions that
//! restricts the candidate set before ranking. Filters have two equivalent
//! forms: a serde representation (a JSON list of conditions) and a compact
//! textual one:
//!
//! ```text
//! year >= 2021 AND country == "US" AND city in ["New York", "New Orleans"]
//! ```
//!
//! Strings are double-quoted with `\"` and `\\` escapes. Keys made only of
//! ASCII alphanumerics, `_`, `.` and `-` are written bare, any other key is
//! quoted. The empty string is the empty filter, which matches everything.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FilterParseError;
use crate::index::{Metadata, MetadataValue};

/// Comparison operator of a single condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl Operator {
    /// Token used by the textual syntax
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::In => "in",
        }
    }
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(MetadataValue),
    List(Vec<MetadataValue>),
}

/// A single `(key, operator, value)` triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    pub op: Operator,
    pub value: FilterValue,
}

impl Condition {
    /// Evaluate this condition against a document's metadata.
    ///
    /// A missing key fails every operator except `ne`. Values of different
    /// types are never equal and never ordered.
    #[must_use]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        let Some(actual) = metadata.get(&self.key) else {
            return self.op == Operator::Ne;
        };

        match (self.op, &self.value) {
            (Operator::Eq, FilterValue::Scalar(expected)) => values_equal(actual, expected),
            (Operator::Ne, FilterValue::Scalar(expected)) => !values_equal(actual, expected),
            (Operator::In, FilterValue::List(options)) => {
                options.iter().any(|option| values_equal(actual, option))
            }
            (Operator::In, FilterValue::Scalar(expected)) => values_equal(actual, expected),
            (Operator::Eq, FilterValue::List(_)) => false,
            (Operator::Ne, FilterValue::List(_)) => true,
            (op, FilterValue::Scalar(expected)) => match compare_ordered(actual, expected) {
                Some(ordering) => match op {
                    Operator::Gt => ordering == Ordering::Greater,
                    Operator::Gte => ordering != Ordering::Less,
                    Operator::Lt => ordering == Ordering::Less,
                    Operator::Lte => ordering != Ordering::Greater,
                    _ => false,
                },
                None => false,
            },
            (_, FilterValue::List(_)) => false,
        }
    }
}

fn values_equal(a: &MetadataValue, b: &MetadataValue) -> bool {
    match (a, b) {
        (MetadataValue::Boolean(a), MetadataValue::Boolean(b)) => a == b,
        (MetadataValue::String(a), MetadataValue::String(b)) => a == b,
        _ => compare_ordered(a, b) == Some(Ordering::Equal),
    }
}

/// Numbers order numerically across integer/float, strings lexicographically.
fn compare_ordered(a: &MetadataValue, b: &MetadataValue) -> Option<Ordering> {
    use MetadataValue::{Float, Integer, String};

    match (a, b) {
        (Integer(a), Integer(b)) => Some(a.cmp(b)),
        (Integer(a), Float(b)) => compare_int_float(*a, *b),
        (Float(a), Integer(b)) => compare_int_float(*b, *a).map(Ordering::reverse),
        (Float(a), Float(b)) => a.partial_cmp(b),
        (String(a), String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Exact comparison, without rounding the integer to the nearest `f64`.
fn compare_int_float(int: i64, float: f64) -> Option<Ordering> {
    // 2^63, the first float past i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if float.is_nan() {
        return None;
    }
    if float >= LIMIT {
        return Some(Ordering::Less);
    }
    if float < -LIMIT {
        return Some(Ordering::Greater);
    }

    let whole = float.trunc();
    Some(int.cmp(&(whole as i64)).then_with(|| {
        let fract = float - whole;
        if fract > 0.0 {
            Ordering::Less
        } else if fract < 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }))
}

/// Conjunction of conditions over document metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Create an empty filter (matches every document).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the textual form.
    pub fn parse(s: &str) -> Result<Self, FilterParseError> {
        Parser::new(s).parse_filter()
    }

    /// Add an arbitrary condition.
    #[must_use]
    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    fn scalar(self, key: impl Into<String>, op: Operator, value: impl Into<MetadataValue>) -> Self {
        self.and(Condition {
            key: key.into(),
            op,
            value: FilterValue::Scalar(value.into()),
        })
    }

    #[must_use]
    pub fn eq(self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.scalar(key, Operator::Eq, value)
    }

    #[must_use]
    pub fn ne(self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.scalar(key, Operator::Ne, value)
    }

    #[must_use]
    pub fn gt(self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.scalar(key, Operator::Gt, value)
    }

    #[must_use]
    pub fn gte(self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.scalar(key, Operator::Gte, value)
    }

    #[must_use]
    pub fn lt(self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.scalar(key, Operator::Lt, value)
    }

    #[must_use]
    pub fn lte(self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.scalar(key, Operator::Lte, value)
    }

    /// Key must equal one of `values`.
    #[must_use]
    pub fn is_in<V>(self, key: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<MetadataValue>,
    {
        self.and(Condition {
            key: key.into(),
            op: Operator::In,
            value: FilterValue::List(values.into_iter().map(Into::into).collect()),
        })
    }

    /// True if every condition holds.
    #[must_use]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions.iter().all(|c| c.matches(metadata))
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl FromStr for Filter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{condition}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if is_bare_key(&self.key) {
            f.write_str(&self.key)?;
        } else {
            write_quoted(f, &self.key)?;
        }
        write!(f, " {} ", self.op.symbol())?;
        match &self.value {
            FilterValue::Scalar(value) => write_value(f, value),
            FilterValue::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_value(f, value)?;
                }
                f.write_str("]")
            }
        }
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn is_bare_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(is_key_char)
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &MetadataValue) -> fmt::Result {
    match value {
        MetadataValue::Boolean(b) => write!(f, "{b}"),
        MetadataValue::Integer(i) => write!(f, "{i}"),
        // Debug keeps a fractional part or exponent, so floats never re-parse as integers
        MetadataValue::Float(x) => write!(f, "{x:?}"),
        MetadataValue::String(s) => write_quoted(f, s),
    }
}

/// Recursive-descent parser over the textual filter syntax
struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, message: impl Into<String>) -> FilterParseError {
        FilterParseError::new(self.pos, message)
    }

    fn parse_filter(mut self) -> Result<Filter, FilterParseError> {
        let mut filter = Filter::new();

        self.skip_ws();
        if self.peek().is_none() {
            return Ok(filter);
        }

        loop {
            filter.conditions.push(self.parse_condition()?);
            self.skip_ws();
            if self.peek().is_none() {
                return Ok(filter);
            }
            self.expect_and()?;
        }
    }

    fn expect_and(&mut self) -> Result<(), FilterParseError> {
        let rest = self.rest();
        let keyword = rest.get(..3).filter(|k| k.eq_ignore_ascii_case("and"));
        let separated = rest[keyword.map_or(0, str::len)..]
            .chars()
            .next()
            .is_some_and(|c| c.is_whitespace() || c == '"');
        if keyword.is_none() || !separated {
            return Err(self.error("expected 'AND'"));
        }
        self.pos += 3;
        Ok(())
    }

    fn parse_condition(&mut self) -> Result<Condition, FilterParseError> {
        self.skip_ws();
        let key = self.parse_key()?;
        self.skip_ws();
        let op = self.parse_op()?;
        self.skip_ws();

        let value_pos = self.pos;
        let value = self.parse_value()?;
        match (op, &value) {
            (Operator::In, FilterValue::Scalar(_)) => {
                return Err(FilterParseError::new(value_pos, "'in' expects a list"));
            }
            (op, FilterValue::List(_)) if op != Operator::In => {
                return Err(FilterParseError::new(
                    value_pos,
                    format!("'{}' expects a single value", op.symbol()),
                ));
            }
            _ => {}
        }

        Ok(Condition { key, op, value })
    }

    fn parse_key(&mut self) -> Result<String, FilterParseError> {
        if self.peek() == Some('"') {
            return self.parse_string();
        }
        let start = self.pos;
        while self.peek().is_some_and(is_key_char) {
            self.bump();
        }
        if start == self.pos {
            return Err(self.error("expected key"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn parse_op(&mut self) -> Result<Operator, FilterParseError> {
        // two-character operators first so ">=" never lexes as ">"
        const OPERATORS: [(&str, Operator); 6] = [
            (">=", Operator::Gte),
            ("<=", Operator::Lte),
            ("==", Operator::Eq),
            ("!=", Operator::Ne),
            (">", Operator::Gt),
            ("<", Operator::Lt),
        ];

        let rest = self.rest();
        for (symbol, op) in OPERATORS {
            if rest.starts_with(symbol) {
                self.pos += symbol.len();
                return Ok(op);
            }
        }

        let is_in = rest.starts_with("in")
            && rest[2..].chars().next().is_some_and(|c| c.is_whitespace() || c == '[');
        if is_in {
            self.pos += 2;
            return Ok(Operator::In);
        }

        Err(self.error("expected operator"))
    }

    fn parse_value(&mut self) -> Result<FilterValue, FilterParseError> {
        if self.peek() != Some('[') {
            return self.parse_scalar().map(FilterValue::Scalar);
        }

        self.bump();
        let mut values = Vec::new();
        self.skip_ws();
        if self.peek() == Some(']') {
            self.bump();
            return Ok(FilterValue::List(values));
        }

        loop {
            self.skip_ws();
            values.push(self.parse_scalar()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(FilterValue::List(values)),
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn parse_scalar(&mut self) -> Result<MetadataValue, FilterParseError> {
        if self.peek() == Some('"') {
            return self.parse_string().map(MetadataValue::String);
        }

        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_whitespace() && !matches!(c, ',' | '[' | ']' | '"'))
        {
            self.bump();
        }
        let token = &self.src[start..self.pos];

        match token {
            "" => Err(FilterParseError::new(start, "expected value")),
            "true" => Ok(MetadataValue::Boolean(true)),
            "false" => Ok(MetadataValue::Boolean(false)),
            _ => token
                .parse::<i64>()
                .map(MetadataValue::Integer)
                .or_else(|_| token.parse::<f64>().map(MetadataValue::Float))
                .map_err(|_| FilterParseError::new(start, format!("invalid value '{token}'"))),
        }
    }

    fn parse_string(&mut self) -> Result<String, FilterParseError> {
        let start = self.pos;
        self.bump();

        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some(c @ ('"' | '\\')) => out.push(c),
                    _ => return Err(self.error("invalid escape")),
                },
                Some(c) => out.push(c),
                None => return Err(FilterParseError::new(start, "unterminated string")),
            }
        }
    }
}
