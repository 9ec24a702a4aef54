//! Hear hooks
//!
//! A hear hook is a keyword or regular expression tested against the text of
//! incoming messages. Keywords match the *whole* message, ignoring case;
//! regular expressions are used as given.
//!
//! ```rust
//! use messenger_bot_rs::hook::{compile, Hook};
//! use regex::Regex;
//!
//! let patterns = compile(vec![
//!     Hook::from("hi"),
//!     Hook::from(Regex::new(r"^order #\d+$").unwrap()),
//! ])
//! .unwrap();
//!
//! assert!(patterns[0].is_match("HI"));
//! assert!(!patterns[0].is_match("hi there"));
//! assert!(patterns[1].is_match("order #42"));
//! ```

use regex::{Regex, RegexBuilder};

use crate::error::Error;

/// A single hook as registered by the application.
#[derive(Clone, Debug)]
pub enum Hook {
    /// Matched literally against the whole text, case-insensitively.
    Keyword(String),
    /// Matched as given.
    Pattern(Regex),
}

impl Hook {
    /// Converts the hook into the pattern tested against message text.
    ///
    /// # Errors
    /// [`Error::Hook`] if the keyword exceeds the regex size limit.
    pub fn compile(self) -> Result<Regex, Error> {
        match self {
            Self::Keyword(keyword) => {
                let pattern = format!("^{}$", regex::escape(&keyword));
                Ok(RegexBuilder::new(&pattern).case_insensitive(true).build()?)
            }
            Self::Pattern(pattern) => Ok(pattern),
        }
    }
}

impl From<&str> for Hook {
    fn from(value: &str) -> Self {
        Self::Keyword(value.to_owned())
    }
}

impl From<String> for Hook {
    fn from(value: String) -> Self {
        Self::Keyword(value)
    }
}

impl From<Regex> for Hook {
    fn from(value: Regex) -> Self {
        Self::Pattern(value)
    }
}

impl From<&Regex> for Hook {
    fn from(value: &Regex) -> Self {
        Self::Pattern(value.clone())
    }
}

/// Anything accepted by `hear`: a keyword, a pattern, or a sequence of both.
pub trait IntoHooks {
    fn into_hooks(self) -> Vec<Hook>;
}

impl IntoHooks for Hook {
    fn into_hooks(self) -> Vec<Hook> {
        vec![self]
    }
}

impl IntoHooks for &str {
    fn into_hooks(self) -> Vec<Hook> {
        vec![self.into()]
    }
}

impl IntoHooks for String {
    fn into_hooks(self) -> Vec<Hook> {
        vec![self.into()]
    }
}

impl IntoHooks for Regex {
    fn into_hooks(self) -> Vec<Hook> {
        vec![self.into()]
    }
}

impl<T: Into<Hook>> IntoHooks for Vec<T> {
    fn into_hooks(self) -> Vec<Hook> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Hook>, const N: usize> IntoHooks for [T; N] {
    fn into_hooks(self) -> Vec<Hook> {
        self.into_iter().map(Into::into).collect()
    }
}

/// Compiles hooks into patterns, keeping their order.
///
/// # Errors
/// The first [`Error::Hook`] encountered.
pub fn compile(hooks: impl IntoHooks) -> Result<Vec<Regex>, Error> {
    hooks.into_hooks().into_iter().map(Hook::compile).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_is_whole_string_and_case_insensitive() {
        let patterns = compile("hi").unwrap();
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].is_match("hi"));
        assert!(patterns[0].is_match("Hi"));
        assert!(patterns[0].is_match("HI"));
        assert!(!patterns[0].is_match("hi there"));
        assert!(!patterns[0].is_match("oh hi"));
    }

    #[test]
    fn keyword_special_characters_are_literal() {
        let patterns = compile("what?").unwrap();
        assert!(patterns[0].is_match("What?"));
        assert!(!patterns[0].is_match("wha"));
        assert!(!patterns[0].is_match("what"));

        let patterns = compile("a.b (c)*").unwrap();
        assert!(patterns[0].is_match("A.B (C)*"));
        assert!(!patterns[0].is_match("axb (c)"));
    }

    #[test]
    fn pattern_is_kept_as_given() {
        let patterns = compile(Regex::new("hello").unwrap()).unwrap();
        // Substring match and case-sensitivity are the caller's choice.
        assert!(patterns[0].is_match("well hello there"));
        assert!(!patterns[0].is_match("HELLO"));
    }

    #[test]
    fn mixed_sequence_keeps_order() {
        let patterns = compile([
            Hook::from("start"),
            Hook::from(Regex::new(r"^\d+$").unwrap()),
            Hook::from(String::from("help")),
        ])
        .unwrap();
        assert_eq!(patterns.len(), 3);
        assert!(patterns[0].is_match("START"));
        assert!(patterns[1].is_match("123"));
        assert!(patterns[2].is_match("Help"));
    }

    #[test]
    fn keyword_list() {
        let patterns = compile(vec!["yes", "yep"]).unwrap();
        assert!(patterns.iter().any(|p| p.is_match("YEP")));
        assert!(!patterns.iter().any(|p| p.is_match("nope")));
    }
}
