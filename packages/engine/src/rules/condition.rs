// packages/engine/src/rules/condition.rs
//! Condition expressions
//!
//! Conditions are written as strings in templates (`facing == east`,
//! `hp < 30 && !exists(target)`) and parsed into a `Condition` tree at load
//! time. `Display` renders the canonical form, which is what merged
//! artifacts contain.
//!
//! ```text
//! expr    := or
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := "(" expr ")" | "true" | "false" | "exists" "(" ident ")" | cmp
//! cmp     := ident op literal
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Read access to named facts
pub trait FactSource {
    fn fact(&self, key: &str) -> Option<&serde_json::Value>;
}

impl FactSource for BTreeMap<String, serde_json::Value> {
    fn fact(&self, key: &str) -> Option<&serde_json::Value> {
        self.get(key)
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl Literal {
    fn from_word(word: &str) -> Result<Self, ConditionError> {
        let literal = match word {
            "true" => Literal::Bool(true),
            "false" => Literal::Bool(false),
            _ if looks_numeric(word) => match word.parse::<f64>() {
                Ok(n) if n.is_finite() => Literal::Number(n),
                Ok(_) => return Err(ConditionError::new(format!("number {} is out of range", word))),
                Err(_) => Literal::Text(word.to_string()),
            },
            _ => Literal::Text(word.to_string()),
        };
        Ok(literal)
    }

    /// Ordering of a fact against this literal; `None` when incomparable
    fn compare(&self, fact: &serde_json::Value) -> Option<Ordering> {
        match (self, fact) {
            (Literal::Number(lit), serde_json::Value::Number(n)) => {
                n.as_f64().and_then(|n| n.partial_cmp(lit))
            }
            (Literal::Text(lit), serde_json::Value::String(s)) => Some(s.as_str().cmp(lit.as_str())),
            (Literal::Bool(lit), serde_json::Value::Bool(b)) => Some(b.cmp(lit)),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Text(s) if is_bare_word(s) => f.write_str(s),
            Literal::Text(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                f.write_str("\"")
            }
        }
    }
}

/// Parsed condition tree
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Const(bool),
    Exists(String),
    Compare {
        key: String,
        op: CompareOp,
        value: Literal,
    },
    Not(Box<Condition>),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Default for Condition {
    fn default() -> Self {
        Condition::Const(true)
    }
}

impl Condition {
    pub fn always() -> Self {
        Condition::Const(true)
    }

    pub fn parse(input: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let condition = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(ConditionError::new(format!("unexpected trailing {}", token)));
        }
        Ok(condition)
    }

    /// Evaluate against a set of facts. Missing facts make comparisons false.
    pub fn eval(&self, facts: &impl FactSource) -> bool {
        match self {
            Condition::Const(b) => *b,
            Condition::Exists(key) => facts.fact(key).map_or(false, |v| !v.is_null()),
            Condition::Compare { key, op, value } => {
                let Some(fact) = facts.fact(key) else {
                    return false;
                };
                match (op, value.compare(fact)) {
                    (CompareOp::Eq, ordering) => ordering == Some(Ordering::Equal),
                    (CompareOp::Ne, ordering) => ordering != Some(Ordering::Equal),
                    (_, None) => false,
                    (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
                    (CompareOp::Ge, Some(o)) => o != Ordering::Less,
                    (CompareOp::Lt, Some(o)) => o == Ordering::Less,
                    (CompareOp::Le, Some(o)) => o != Ordering::Greater,
                }
            }
            Condition::Not(inner) => !inner.eval(facts),
            Condition::All(items) => items.iter().all(|c| c.eval(facts)),
            Condition::Any(items) => items.iter().any(|c| c.eval(facts)),
        }
    }

    /// Fact keys referenced anywhere in the expression
    pub fn referenced_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    fn collect_keys<'a>(&'a self, keys: &mut Vec<&'a str>) {
        match self {
            Condition::Const(_) => {}
            Condition::Exists(key) | Condition::Compare { key, .. } => keys.push(key),
            Condition::Not(inner) => inner.collect_keys(keys),
            Condition::All(items) | Condition::Any(items) => {
                items.iter().for_each(|c| c.collect_keys(keys))
            }
        }
    }

    fn is_primary(&self) -> bool {
        matches!(
            self,
            Condition::Const(_) | Condition::Exists(_) | Condition::Compare { .. }
        )
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Const(b) => write!(f, "{}", b),
            Condition::Exists(key) => write!(f, "exists({})", key),
            Condition::Compare { key, op, value } => write!(f, "{} {} {}", key, op.as_str(), value),
            Condition::Not(inner) if inner.is_primary() || matches!(**inner, Condition::Not(_)) => {
                write!(f, "!{}", inner)
            }
            Condition::Not(inner) => write!(f, "!({})", inner),
            Condition::All(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" && ")?;
                    }
                    match item {
                        Condition::All(_) | Condition::Any(_) => write!(f, "({})", item)?,
                        _ => write!(f, "{}", item)?,
                    }
                }
                Ok(())
            }
            Condition::Any(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" || ")?;
                    }
                    match item {
                        Condition::Any(_) => write!(f, "({})", item)?,
                        _ => write!(f, "{}", item)?,
                    }
                }
                Ok(())
            }
        }
    }
}

impl TryFrom<String> for Condition {
    type Error = ConditionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Condition::parse(&value)
    }
}

impl From<Condition> for String {
    fn from(value: Condition) -> Self {
        value.to_string()
    }
}

impl Serialize for Condition {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // bare YAML booleans (`when: true`) are accepted as constants
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => Ok(Condition::Const(b)),
            Raw::Text(s) => Condition::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}

/// Condition syntax error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid condition: {message}")]
pub struct ConditionError {
    pub message: String,
}

impl ConditionError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Op(CompareOp),
    Word(String),
    Quoted(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::And => f.write_str("'&&'"),
            Token::Or => f.write_str("'||'"),
            Token::Not => f.write_str("'!'"),
            Token::Op(op) => write!(f, "'{}'", op.as_str()),
            Token::Word(w) => write!(f, "'{}'", w),
            Token::Quoted(s) => write!(f, "\"{}\"", s),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | ':' | '+')
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn looks_numeric(word: &str) -> bool {
    let digits = word
        .strip_prefix(|c: char| c == '-' || c == '+')
        .unwrap_or(word);
    digits.chars().next().map_or(false, |c| c.is_ascii_digit())
}

fn is_bare_word(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(is_word_char)
        && !looks_numeric(s)
        && s != "true"
        && s != "false"
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match c {
            '(' => {
                chars.next();
                Token::LParen
            }
            ')' => {
                chars.next();
                Token::RParen
            }
            '&' | '|' | '=' => {
                chars.next();
                if chars.next() != Some(c) {
                    return Err(ConditionError::new(format!("expected '{}{}'", c, c)));
                }
                match c {
                    '&' => Token::And,
                    '|' => Token::Or,
                    _ => Token::Op(CompareOp::Eq),
                }
            }
            '!' | '>' | '<' => {
                chars.next();
                let with_eq = chars.peek() == Some(&'=');
                if with_eq {
                    chars.next();
                }
                match (c, with_eq) {
                    ('!', false) => Token::Not,
                    ('!', true) => Token::Op(CompareOp::Ne),
                    ('>', false) => Token::Op(CompareOp::Gt),
                    ('>', true) => Token::Op(CompareOp::Ge),
                    ('<', false) => Token::Op(CompareOp::Lt),
                    _ => Token::Op(CompareOp::Le),
                }
            }
            '"' | '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(escaped) => text.push(escaped),
                            None => return Err(ConditionError::new("unterminated string")),
                        },
                        Some(q) if q == c => break,
                        Some(other) => text.push(other),
                        None => return Err(ConditionError::new("unterminated string")),
                    }
                }
                Token::Quoted(text)
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                Token::Word(word)
            }
            other => return Err(ConditionError::new(format!("unexpected character '{}'", other))),
        };
        tokens.push(token);
    }

    if tokens.is_empty() {
        return Err(ConditionError::new("empty expression"));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConditionError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ConditionError::new(format!("expected {}, found {}", expected, token))),
            None => Err(ConditionError::new(format!("expected {}, found end of input", expected))),
        }
    }

    fn parse_or(&mut self) -> Result<Condition, ConditionError> {
        let mut items = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.next();
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Condition::Any(items)
        })
    }

    fn parse_and(&mut self) -> Result<Condition, ConditionError> {
        let mut items = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.next();
            items.push(self.parse_unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Condition::All(items)
        })
    }

    fn parse_unary(&mut self) -> Result<Condition, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            return Ok(Condition::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Condition, ConditionError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Word(word)) => {
                if let Some(Token::Op(op)) = self.peek().cloned() {
                    self.next();
                    if !is_identifier(&word) {
                        return Err(ConditionError::new(format!("invalid fact name '{}'", word)));
                    }
                    let value = match self.next() {
                        Some(Token::Word(w)) => Literal::from_word(&w)?,
                        Some(Token::Quoted(s)) => Literal::Text(s),
                        Some(token) => {
                            return Err(ConditionError::new(format!("expected value, found {}", token)))
                        }
                        None => return Err(ConditionError::new("expected value, found end of input")),
                    };
                    return Ok(Condition::Compare { key: word, op, value });
                }

                match word.as_str() {
                    "true" => Ok(Condition::Const(true)),
                    "false" => Ok(Condition::Const(false)),
                    "exists" if self.peek() == Some(&Token::LParen) => {
                        self.next();
                        let key = match self.next() {
                            Some(Token::Word(key)) if is_identifier(&key) => key,
                            _ => return Err(ConditionError::new("exists() expects a fact name")),
                        };
                        self.expect(Token::RParen)?;
                        Ok(Condition::Exists(key))
                    }
                    _ => Err(ConditionError::new(format!(
                        "expected comparison operator after '{}'{}",
                        word,
                        self.peek_at(0).map(|t| format!(", found {}", t)).unwrap_or_default()
                    ))),
                }
            }
            Some(token) => Err(ConditionError::new(format!("unexpected {}", token))),
            None => Err(ConditionError::new("unexpected end of input")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn facts(pairs: &[(&str, serde_json::Value)]) -> BTreeMap<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_parse_simple_comparison() {
        let condition = Condition::parse("facing==east").unwrap();
        assert_eq!(
            condition,
            Condition::Compare {
                key: "facing".into(),
                op: CompareOp::Eq,
                value: Literal::Text("east".into()),
            }
        );
    }

    #[test]
    fn test_precedence() {
        let condition = Condition::parse("a == 1 || b == 2 && !c == 3").unwrap();
        match condition {
            Condition::Any(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[1], Condition::All(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_eval_comparisons() {
        let f = facts(&[("hp", json!(25)), ("facing", json!("east")), ("boss", json!(true))]);

        assert!(Condition::parse("hp < 30").unwrap().eval(&f));
        assert!(Condition::parse("hp >= 25").unwrap().eval(&f));
        assert!(!Condition::parse("hp > 25").unwrap().eval(&f));
        assert!(Condition::parse("hp == 25").unwrap().eval(&f));
        assert!(Condition::parse("facing != west").unwrap().eval(&f));
        assert!(Condition::parse("boss == true && facing == 'east'").unwrap().eval(&f));
        assert!(Condition::parse("exists(hp) && !exists(target)").unwrap().eval(&f));
    }

    #[test]
    fn test_missing_fact_is_false() {
        let f = facts(&[]);
        assert!(!Condition::parse("facing == east").unwrap().eval(&f));
        assert!(!Condition::parse("facing != east").unwrap().eval(&f));
        assert!(Condition::parse("!(facing == east)").unwrap().eval(&f));
    }

    #[test]
    fn test_type_mismatch() {
        let f = facts(&[("hp", json!("full"))]);
        assert!(!Condition::parse("hp < 30").unwrap().eval(&f));
        assert!(Condition::parse("hp != 30").unwrap().eval(&f));
    }

    #[test]
    fn test_canonical_display_round_trips() {
        for input in [
            "facing == east",
            "hp < 30 && !exists(target)",
            "(a == 1 || b == 2) && c == \"two words\"",
            "!(a == 1 && b == x)",
            "x == -90.5",
            "true",
        ] {
            let parsed = Condition::parse(input).unwrap();
            let reparsed = Condition::parse(&parsed.to_string()).unwrap();
            assert_eq!(parsed, reparsed, "round trip of {}", input);
        }
        assert_eq!(Condition::parse("facing==east").unwrap().to_string(), "facing == east");
    }

    #[test]
    fn test_parse_errors() {
        assert!(Condition::parse("").is_err());
        assert!(Condition::parse("facing east").is_err());
        assert!(Condition::parse("facing == ").is_err());
        assert!(Condition::parse("(a == 1").is_err());
        assert!(Condition::parse("a = 1").is_err());
        assert!(Condition::parse("a == 'open").is_err());
        assert!(Condition::parse("9lives == 1").is_err());
        assert!(Condition::parse("hp < 1e400").is_err());
        assert!(Condition::parse("hp > -1e400").is_err());
    }

    #[test]
    fn test_referenced_keys() {
        let condition = Condition::parse("b == 1 && (a == 2 || exists(b))").unwrap();
        assert_eq!(condition.referenced_keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_serde_accepts_bool_and_string() {
        let from_bool: Condition = serde_yaml::from_str("true").unwrap();
        assert_eq!(from_bool, Condition::Const(true));

        let from_str: Condition = serde_yaml::from_str("\"facing == east\"").unwrap();
        assert_eq!(serde_yaml::to_string(&from_str).unwrap().trim(), "facing == east");
    }
}
