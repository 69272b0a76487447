//! Parameter signatures and argument parsing.

use crate::error::ArgumentError;
use crate::tokenizer::StringView;
use std::collections::HashMap;

/// How a parameter consumes text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Word,
    Integer,
    /// Everything left, untouched. Must be last.
    Rest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<String>,
}

impl Param {
    fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
        }
    }

    pub fn word(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Word)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Integer)
    }

    pub fn rest(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Rest)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Optional with a fallback value, coerced like typed input.
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.required = false;
        self.default = Some(value.into());
        self
    }

    fn coerce(&self, raw: String) -> Result<ArgValue, ArgumentError> {
        match self.kind {
            ParamKind::Integer => raw
                .parse::<i64>()
                .map(ArgValue::Int)
                .map_err(|_| ArgumentError::BadType {
                    param: self.name.clone(),
                    value: raw,
                }),
            ParamKind::Word | ParamKind::Rest => Ok(ArgValue::Str(raw)),
        }
    }
}

/// A parsed argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
}

/// Parsed arguments by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    values: HashMap<String, ArgValue>,
}

impl Args {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.values.insert(name.into(), value);
    }
}

/// Parse `text` against a signature, left to right.
pub fn parse_args(params: &[Param], text: &str) -> Result<Args, ArgumentError> {
    let mut view = StringView::new(text);
    let mut args = Args::default();

    for param in params {
        let raw = match param.kind {
            ParamKind::Rest => Some(view.rest().to_string()).filter(|s| !s.is_empty()),
            ParamKind::Word | ParamKind::Integer => view.next_word()?,
        };

        let raw = match raw.or_else(|| param.default.clone()) {
            Some(raw) => raw,
            None if param.required => return Err(ArgumentError::Missing(param.name.clone())),
            None => continue,
        };

        args.insert(param.name.clone(), param.coerce(raw)?);
    }

    Ok(args)
}

/// Usage line such as `<username> [count=10] <query...>`.
pub fn usage(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| {
            let name = match p.kind {
                ParamKind::Rest => format!("{}...", p.name),
                _ => p.name.clone(),
            };
            match (&p.default, p.required) {
                (Some(default), _) => format!("[{}={}]", name, default),
                (None, true) => format!("<{}>", name),
                (None, false) => format!("[{}]", name),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A rest parameter anywhere but last is rejected at registration.
pub(crate) fn valid_signature(params: &[Param]) -> bool {
    params
        .iter()
        .position(|p| p.kind == ParamKind::Rest)
        .map_or(true, |i| i == params.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_preserves_inner_whitespace() {
        let params = [Param::word("domain"), Param::rest("query")];
        let args = parse_args(&params, "game  Super   Mario 64 ").unwrap();
        assert_eq!(args.get_str("domain"), Some("game"));
        assert_eq!(args.get_str("query"), Some("Super   Mario 64 "));
    }

    #[test]
    fn test_missing_required() {
        let params = [Param::word("username")];
        assert_eq!(
            parse_args(&params, "   "),
            Err(ArgumentError::Missing("username".into()))
        );
    }

    #[test]
    fn test_bad_integer() {
        let params = [Param::integer("number")];
        assert_eq!(
            parse_args(&params, "ten"),
            Err(ArgumentError::BadType {
                param: "number".into(),
                value: "ten".into()
            })
        );
    }

    #[test]
    fn test_default_is_coerced() {
        let params = [Param::integer("max").default("10")];
        assert_eq!(parse_args(&params, "").unwrap().get_int("max"), Some(10));
        assert_eq!(parse_args(&params, "3").unwrap().get_int("max"), Some(3));
    }

    #[test]
    fn test_optional_without_default_is_absent() {
        let params = [Param::word("sign").optional()];
        assert!(parse_args(&params, "").unwrap().is_empty());
    }

    #[test]
    fn test_quoted_word_and_extra_words_ignored() {
        let params = [Param::word("name")];
        let args = parse_args(&params, r#""two words" extra"#).unwrap();
        assert_eq!(args.get_str("name"), Some("two words"));
    }

    #[test]
    fn test_usage() {
        let params = [
            Param::word("username"),
            Param::integer("count").default("10"),
            Param::rest("query").optional(),
        ];
        assert_eq!(usage(&params), "<username> [count=10] [query...]");
    }

    #[test]
    fn test_signature_validation() {
        assert!(valid_signature(&[Param::word("a"), Param::rest("b")]));
        assert!(!valid_signature(&[Param::rest("a"), Param::word("b")]));
        assert!(valid_signature(&[]));
    }
}
