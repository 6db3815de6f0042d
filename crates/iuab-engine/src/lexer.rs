//! Streaming lexer for "I use Arch btw" source code.
//!
//! Reads one byte at a time from any [`io::Read`] and produces [`Token`]s
//! with 1-based line/column positions. Keywords are matched by a
//! first-character dispatch followed by an exact suffix match; a match
//! only stands if the character after it is whitespace, a comment
//! character, or end of input, so a keyword can never be the prefix of a
//! longer unrecognized word.

use std::io::{self, Read};

use crate::errors::Error;
use crate::token::{Token, TokenKind};

const COMMENT_CHAR: u8 = b';';

fn is_skippable(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

/// True for any byte that could continue a token.
fn is_token_char(ch: Option<u8>) -> bool {
    match ch {
        Some(byte) => !is_skippable(byte) && byte != COMMENT_CHAR,
        None => false,
    }
}

/// A lexer over a byte stream.
///
/// Holds exactly one byte of lookahead (`ch`); an I/O failure while
/// reading is reported as [`Error::Io`], never conflated with end of
/// input.
pub struct Lexer<R: Read> {
    input: io::Bytes<R>,
    /// The current byte, `None` at end of input.
    ch: Option<u8>,
    line: usize,
    col: usize,
}

impl<R: Read> Lexer<R> {
    /// Creates a lexer over `input`, reading its first byte.
    pub fn new(input: R) -> Result<Self, Error> {
        let mut lexer = Lexer {
            input: input.bytes(),
            ch: None,
            line: 1,
            col: 1,
        };
        lexer.ch = lexer.read()?;
        Ok(lexer)
    }

    fn read(&mut self) -> Result<Option<u8>, Error> {
        loop {
            match self.input.next() {
                Some(Ok(byte)) => return Ok(Some(byte)),
                Some(Err(err)) if err.kind() == io::ErrorKind::Interrupted => continue,
                Some(Err(_)) => return Err(Error::Io),
                None => return Ok(None),
            }
        }
    }

    fn next_char(&mut self) -> Result<Option<u8>, Error> {
        self.col += 1;
        self.ch = self.read()?;
        Ok(self.ch)
    }

    fn new_line(&mut self) -> Result<(), Error> {
        self.ch = self.read()?;
        self.line += 1;
        self.col = 1;
        Ok(())
    }

    fn skip_comment(&mut self) -> Result<(), Error> {
        loop {
            match self.next_char()? {
                Some(b'\n') | None => return Ok(()),
                Some(_) => {}
            }
        }
    }

    /// Matches the remaining `rest` of a keyword, then applies the
    /// trailing-character rule.
    fn match_rest(&mut self, rest: &[u8], kind: TokenKind) -> Result<TokenKind, Error> {
        for &expected in rest {
            if self.next_char()? != Some(expected) {
                return Ok(TokenKind::Invalid);
            }
        }

        self.next_char()?;

        if is_token_char(self.ch) {
            return Ok(TokenKind::Invalid);
        }

        Ok(kind)
    }

    fn match_token(&mut self) -> Result<TokenKind, Error> {
        match self.ch {
            Some(b'i') => self.match_rest(b"", TokenKind::I),
            Some(b'u') => self.match_rest(b"se", TokenKind::Use),
            Some(b'a') => self.match_rest(b"rch", TokenKind::Arch),
            Some(b'l') => self.match_rest(b"inux", TokenKind::Linux),
            Some(b'b') => match self.next_char()? {
                Some(b't') => self.match_rest(b"w", TokenKind::Btw),
                Some(b'y') => self.match_rest(b"", TokenKind::By),
                _ => Ok(TokenKind::Invalid),
            },
            Some(b't') => self.match_rest(b"he", TokenKind::The),
            Some(b'w') => self.match_rest(b"ay", TokenKind::Way),
            Some(b'g') => self.match_rest(b"entoo", TokenKind::Gentoo),
            _ => Ok(TokenKind::Invalid),
        }
    }

    /// Lexes and returns the next token.
    ///
    /// Repeated calls after end of input keep returning an `Eof` token.
    pub fn next_token(&mut self) -> Result<Token, Error> {
        while let Some(byte) = self.ch {
            if byte == b'\n' {
                self.new_line()?;
            } else if is_skippable(byte) {
                self.next_char()?;
            } else if byte == COMMENT_CHAR {
                self.skip_comment()?;
            } else {
                let col = self.col;
                let kind = self.match_token()?;
                return Ok(Token::new(kind, self.line, col));
            }
        }

        Ok(Token::new(TokenKind::Eof, self.line, self.col))
    }
}
