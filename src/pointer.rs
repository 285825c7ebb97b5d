use std::fmt::{self, Display, Formatter, Write};

use serde::Serialize;
use serde_json::Value;

use crate::error::{JsonVetError, JsonVetResult};

/// A single step of a JSON Pointer: either an object property or an array
/// index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    Property(String),
    Index(usize),
}

impl Token {
    pub fn is_property(&self) -> bool {
        matches!(self, Token::Property(_))
    }

    pub fn as_property(&self) -> Option<&str> {
        match self {
            Token::Property(name) => Some(name),
            Token::Index(_) => None,
        }
    }
}

impl From<&str> for Token {
    fn from(name: &str) -> Self {
        Token::Property(name.to_string())
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Token::Property(name)
    }
}

impl From<usize> for Token {
    fn from(index: usize) -> Self {
        Token::Index(index)
    }
}

/// An RFC 6901 JSON Pointer into a schema or instance document.
///
/// The empty pointer addresses the document root. Pointers order
/// lexicographically by token, which gives deterministic iteration when used
/// as map keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer(Vec<Token>);

impl Pointer {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self(tokens)
    }

    /// Parse the textual representation, e.g. `/properties/foo/0`. The empty
    /// string is the root pointer. A fragment-style leading `#` is rejected;
    /// strip it before calling.
    pub fn parse(input: &str) -> JsonVetResult<Self> {
        if input.is_empty() {
            return Ok(Self::new());
        }

        if !input.starts_with('/') {
            return Err(JsonVetError::InvalidPointer(input.to_string()));
        }

        let mut tokens = Vec::new();
        for raw in input[1..].split('/') {
            let unescaped = unescape(raw)?;
            // All-digit tokens address array elements; "01" style tokens with
            // leading zeros are property names per RFC 6901
            if unescaped == "0"
                || (!unescaped.is_empty()
                    && !unescaped.starts_with('0')
                    && unescaped.bytes().all(|byte| byte.is_ascii_digit()))
            {
                match unescaped.parse::<usize>() {
                    Ok(index) => tokens.push(Token::Index(index)),
                    Err(_) => tokens.push(Token::Property(unescaped)),
                }
            } else {
                tokens.push(Token::Property(unescaped));
            }
        }

        Ok(Self(tokens))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    pub fn push(&mut self, token: impl Into<Token>) {
        self.0.push(token.into());
    }

    pub fn pop(&mut self) -> Option<Token> {
        self.0.pop()
    }

    pub fn last(&self) -> Option<&Token> {
        self.0.last()
    }

    /// A new pointer with the given token appended.
    pub fn join(&self, token: impl Into<Token>) -> Self {
        let mut next = self.clone();
        next.push(token);
        next
    }

    /// A new pointer with every token of `suffix` appended.
    pub fn concat(&self, suffix: &Pointer) -> Self {
        let mut next = self.clone();
        next.0.extend(suffix.0.iter().cloned());
        next
    }

    /// Whether `self` is a prefix of `other` (every pointer is a prefix of
    /// itself).
    pub fn is_prefix_of(&self, other: &Pointer) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// The pointer relative to a prefix, if the prefix matches.
    pub fn strip_prefix(&self, prefix: &Pointer) -> Option<Pointer> {
        if prefix.is_prefix_of(self) {
            Some(Pointer(self.0[prefix.0.len()..].to_vec()))
        } else {
            None
        }
    }

    /// The pointer without its last token, or the root pointer.
    pub fn parent(&self) -> Pointer {
        let mut tokens = self.0.clone();
        tokens.pop();
        Pointer(tokens)
    }

    /// Walk the pointer through a JSON document.
    pub fn resolve<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        let mut current = document;
        for token in &self.0 {
            current = match (token, current) {
                (Token::Property(name), Value::Object(members)) => members.get(name)?,
                (Token::Index(index), Value::Array(items)) => items.get(*index)?,
                // Numeric-looking object keys are properties too
                (Token::Index(index), Value::Object(members)) => {
                    members.get(index.to_string().as_str())?
                }
                _ => return None,
            };
        }

        Some(current)
    }

    /// The URI fragment spelling of this pointer, without the leading `#`.
    /// The root pointer renders as the empty string.
    pub fn to_fragment(&self) -> String {
        self.to_string()
    }
}

fn unescape(token: &str) -> JsonVetResult<String> {
    if !token.contains('~') {
        return Ok(token.to_string());
    }

    let mut result = String::with_capacity(token.len());
    let mut characters = token.chars();
    while let Some(character) = characters.next() {
        if character != '~' {
            result.push(character);
            continue;
        }

        match characters.next() {
            Some('0') => result.push('~'),
            Some('1') => result.push('/'),
            _ => return Err(JsonVetError::InvalidPointer(token.to_string())),
        }
    }

    Ok(result)
}

impl Display for Pointer {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        for token in &self.0 {
            formatter.write_char('/')?;
            match token {
                Token::Index(index) => write!(formatter, "{index}")?,
                Token::Property(name) => {
                    for character in name.chars() {
                        match character {
                            '~' => formatter.write_str("~0")?,
                            '/' => formatter.write_str("~1")?,
                            other => formatter.write_char(other)?,
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl Serialize for Pointer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_and_display_roundtrip() {
        for text in ["", "/foo", "/foo/0/bar", "/a~0b/c~1d", "/"] {
            let pointer = Pointer::parse(text).expect("parse");
            assert_eq!(pointer.to_string(), text);
        }
    }

    #[test]
    fn resolve_nested() {
        let document = json!({"items": {"type": "string"}, "list": [1, 2]});
        let pointer = Pointer::parse("/items/type").unwrap();
        assert_eq!(pointer.resolve(&document), Some(&json!("string")));
        let pointer = Pointer::parse("/list/1").unwrap();
        assert_eq!(pointer.resolve(&document), Some(&json!(2)));
        let pointer = Pointer::parse("/missing").unwrap();
        assert_eq!(pointer.resolve(&document), None);
    }

    #[test]
    fn prefix_relations() {
        let base = Pointer::parse("/a/b").unwrap();
        let deep = Pointer::parse("/a/b/c").unwrap();
        assert!(base.is_prefix_of(&deep));
        assert!(!deep.is_prefix_of(&base));
        assert_eq!(
            deep.strip_prefix(&base),
            Some(Pointer::parse("/c").unwrap())
        );
    }
}
