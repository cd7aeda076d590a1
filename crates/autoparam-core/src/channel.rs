//! Channel identifiers and slots.
//!
//! A channel is addressed by a free-form string such as `"SUM set 5"`. The
//! driver's [`ChannelParser`] turns it into a [`ChannelKey`] (function name +
//! arguments); the registry then builds a base [`Channel`] for it and hands
//! that to the driver's [`Materialize`] implementation, which consumes it and
//! returns the driver's own slot type.
//!
//! # Default Syntax
//!
//! ```text
//! "  SUM   set  5 "   ──▶   function = "SUM", arguments = ["set", "5"]
//!                          normalized  = "SUM set 5"
//! ```
//!
//! Arguments starting with `{` or `[` are reserved for structured syntax and
//! rejected.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::host::Handle;
use crate::types::DataType;

// =============================================================================
// ChannelKey
// =============================================================================

/// Parsed identity of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    function: String,
    arguments: Vec<String>,
}

impl ChannelKey {
    /// Build a key from already separated parts.
    pub fn new(function: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            function: function.into(),
            arguments,
        }
    }

    /// Parse `raw` with the default whitespace syntax.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let mut tokens = raw.split_whitespace();
        let function = tokens.next().ok_or_else(|| ParseError::Empty {
            raw: raw.to_string(),
        })?;

        let mut arguments = Vec::new();
        for token in tokens {
            if token.starts_with('{') || token.starts_with('[') {
                return Err(ParseError::ReservedSyntax {
                    raw: raw.to_string(),
                    argument: token.to_string(),
                });
            }
            arguments.push(token.to_string());
        }

        Ok(Self::new(function, arguments))
    }

    /// Function name, the first token.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Arguments after the function name.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Canonical string form: function and arguments separated by single
    /// spaces. Used as the host parameter name. Channels are deduplicated on
    /// the key itself, so a custom parser whose tokens contain whitespace can
    /// produce distinct keys with the same normalized form; the host decides
    /// whether it accepts the second name.
    pub fn normalized(&self) -> String {
        let mut norm = self.function.clone();
        for arg in &self.arguments {
            norm.push(' ');
            norm.push_str(arg);
        }
        norm
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

impl FromStr for ChannelKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelKey::parse(s)
    }
}

// =============================================================================
// Parser
// =============================================================================

/// Driver-supplied channel string parser.
///
/// Implemented for any `Fn(&str) -> Result<ChannelKey, ParseError>`.
pub trait ChannelParser: Send + Sync {
    /// Turn a raw identifier into a key.
    fn parse(&self, raw: &str) -> Result<ChannelKey, ParseError>;
}

impl<F> ChannelParser for F
where
    F: Fn(&str) -> Result<ChannelKey, ParseError> + Send + Sync,
{
    fn parse(&self, raw: &str) -> Result<ChannelKey, ParseError> {
        self(raw)
    }
}

/// Whitespace separated `FUNCTION arg arg ...` syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultParser;

impl ChannelParser for DefaultParser {
    fn parse(&self, raw: &str) -> Result<ChannelKey, ParseError> {
        ChannelKey::parse(raw)
    }
}

// =============================================================================
// Channel (base slot)
// =============================================================================

/// Base data of an allocated channel.
///
/// Only the registry creates these. A driver receives each one exactly once,
/// by value, in [`Materialize::materialize`], and either embeds it in its own
/// slot type or drops it.
#[derive(Debug)]
pub struct Channel {
    handle: Handle,
    data_type: DataType,
    key: ChannelKey,
}

impl Channel {
    pub(crate) fn new(handle: Handle, data_type: DataType, key: ChannelKey) -> Self {
        Self {
            handle,
            data_type,
            key,
        }
    }

    /// Host parameter handle.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Type declared by the function's handler registration.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Parsed identity.
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    /// Function name, the first token.
    pub fn function(&self) -> &str {
        self.key.function()
    }

    /// Arguments after the function name.
    pub fn arguments(&self) -> &[String] {
        self.key.arguments()
    }
}

/// A registry slot: the base [`Channel`] plus whatever the driver attaches.
pub trait Slot: Send + Sync + 'static {
    /// The base channel this slot was built from.
    fn channel(&self) -> &Channel;
}

impl Slot for Channel {
    fn channel(&self) -> &Channel {
        self
    }
}

/// Driver-supplied slot constructor.
///
/// Returning `None` aborts the resolution and rolls back the host parameter.
/// Implemented for any `Fn(Channel) -> Option<S>`.
pub trait Materialize<S>: Send + Sync {
    /// Build the driver's slot, taking ownership of the base channel.
    fn materialize(&self, base: Channel) -> Option<S>;
}

impl<S, F> Materialize<S> for F
where
    F: Fn(Channel) -> Option<S> + Send + Sync,
{
    fn materialize(&self, base: Channel) -> Option<S> {
        self(base)
    }
}

/// Materializer for drivers that use [`Channel`] as their slot type.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainChannels;

impl Materialize<Channel> for PlainChannels {
    fn materialize(&self, base: Channel) -> Option<Channel> {
        Some(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_collapses_whitespace() {
        let a = ChannelKey::parse("FOO  1   2").unwrap();
        let b = ChannelKey::parse("FOO 1 2").unwrap();
        let c = ChannelKey::parse("\tFOO 1\n 2  ").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.normalized(), "FOO 1 2");
        assert_eq!(a.function(), "FOO");
        assert_eq!(a.arguments(), ["1", "2"]);
    }

    #[test]
    fn test_function_only() {
        let key: ChannelKey = "LONG".parse().unwrap();
        assert_eq!(key.function(), "LONG");
        assert!(key.arguments().is_empty());
        assert_eq!(key.to_string(), "LONG");
    }

    #[test]
    fn test_reserved_argument_syntax_is_rejected() {
        for raw in ["FOO {\"a\": 1}", "FOO 1 [2,3]"] {
            match ChannelKey::parse(raw) {
                Err(ParseError::ReservedSyntax { raw: r, .. }) => assert_eq!(r, raw),
                other => panic!("expected reserved syntax error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_reserved_characters_inside_arguments_are_fine() {
        let key = ChannelKey::parse("FOO a{b} c[0]").unwrap();
        assert_eq!(key.arguments(), ["a{b}", "c[0]"]);
    }

    #[test]
    fn test_empty_identifier_is_rejected() {
        assert!(matches!(
            ChannelKey::parse("   "),
            Err(ParseError::Empty { .. })
        ));
        assert!(matches!(ChannelKey::parse(""), Err(ParseError::Empty { .. })));
    }

    #[test]
    fn test_closure_parser() {
        let upper = |raw: &str| ChannelKey::parse(&raw.to_uppercase());
        let key = ChannelParser::parse(&upper, "sum set").unwrap();
        assert_eq!(key.normalized(), "SUM SET");
    }
}
