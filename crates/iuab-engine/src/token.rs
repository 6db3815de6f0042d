//! Source tokens for the "I use Arch btw" language.

use std::fmt;

/// The kinds of tokens the lexer can produce.
///
/// The nine keywords map one-to-one onto program operations; `Eof` and
/// `Invalid` are the two out-of-band kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `i` — increment the data pointer.
    I,
    /// `use` — decrement the data pointer.
    Use,
    /// `arch` — increment the value at the data pointer.
    Arch,
    /// `linux` — decrement the value at the data pointer.
    Linux,
    /// `btw` — write the value at the data pointer to the output.
    Btw,
    /// `by` — read one byte of input into the data pointer.
    By,
    /// `the` — begin a loop.
    The,
    /// `way` — end a loop.
    Way,
    /// `gentoo` — invoke the debug handler.
    Gentoo,
    /// End of input.
    Eof,
    /// Anything that is not one of the nine keywords.
    Invalid,
}

impl TokenKind {
    /// The token's spelling, or a placeholder for the out-of-band kinds.
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::I => "i",
            TokenKind::Use => "use",
            TokenKind::Arch => "arch",
            TokenKind::Linux => "linux",
            TokenKind::Btw => "btw",
            TokenKind::By => "by",
            TokenKind::The => "the",
            TokenKind::Way => "way",
            TokenKind::Gentoo => "gentoo",
            TokenKind::Eof => "EOF",
            TokenKind::Invalid => "???",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A token together with its 1-based source position.
///
/// `col` is the column of the token's first character. Immutable once
/// produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// The kind of token.
    pub kind: TokenKind,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column of the token's first character.
    pub col: usize,
}

impl Token {
    pub(crate) fn new(kind: TokenKind, line: usize, col: usize) -> Self {
        Token { kind, line, col }
    }

    /// A placeholder token at the start of the source, for errors that
    /// are not tied to any real token.
    pub(crate) fn start() -> Self {
        Token::new(TokenKind::Eof, 1, 1)
    }
}
