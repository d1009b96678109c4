#![allow(clippy::cast_possible_truncation)]
//! Hand-written lexer for Muni source text.
//!
//! Converts UTF-8 input into a token stream. Whitespace separates tokens and
//! is otherwise discarded, as are `#` line comments and non-nesting `/* */`
//! block comments. Every token carries its lexeme and a source [`Location`]
//! for diagnostics.
//!
//! The lexer collects every [`LexError`] it can recover from (skipping the
//! offending character) so that a single run reports all lexical problems.

use crate::errors::LexError;
use crate::nodes::Location;

/// The character escapes recognized in string and character literals.
const ESCAPES: &[(char, char)] = &[
    ('n', '\n'),
    ('t', '\t'),
    ('r', '\r'),
    ('\\', '\\'),
    ('\'', '\''),
    ('"', '"'),
    ('0', '\0'),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Keyword {
    If,
    Else,
    While,
    Until,
    For,
    Do,
    Return,
    Break,
    Continue,
    Structure,
    Alias,
    Import,
    Static,
    This,
    Null,
    True,
    False,
    Void,
}

impl Keyword {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::Until => "until",
            Keyword::For => "for",
            Keyword::Do => "do",
            Keyword::Return => "return",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::Structure => "structure",
            Keyword::Alias => "alias",
            Keyword::Import => "import",
            Keyword::Static => "static",
            Keyword::This => "this",
            Keyword::Null => "null",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Void => "void",
        }
    }

    #[must_use]
    pub fn from_ident(ident: &str) -> Option<Keyword> {
        const ALL: &[Keyword] = &[
            Keyword::If,
            Keyword::Else,
            Keyword::While,
            Keyword::Until,
            Keyword::For,
            Keyword::Do,
            Keyword::Return,
            Keyword::Break,
            Keyword::Continue,
            Keyword::Structure,
            Keyword::Alias,
            Keyword::Import,
            Keyword::Static,
            Keyword::This,
            Keyword::Null,
            Keyword::True,
            Keyword::False,
            Keyword::Void,
        ];
        ALL.iter().copied().find(|kw| kw.as_str() == ident)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TokenKind {
    Identifier(String),
    Keyword(Keyword),
    /// Decimal integer literal. Stored as `i64` so the parser can report
    /// out-of-range values with the original spelling.
    Int(i64),
    Char(char),
    Str(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    BangEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    Dot,
    Comma,
    Semicolon,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Arrow,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub location: Location,
}

impl Token {
    /// How the token reads in a diagnostic (`unexpected ...`).
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Eof => "<end of file>".to_string(),
            _ => self.lexeme.clone(),
        }
    }
}

pub struct Lexer<'a> {
    chars: Vec<(u32, char)>,
    pos: usize,
    line: u32,
    column: u32,
    source_name: &'a str,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

/// Tokenize a whole source file.
///
/// # Errors
///
/// Returns every lexical error found in the input. Tokens are only produced
/// when the input is entirely well-formed.
pub fn tokenize(source: &str, source_name: &str) -> Result<Vec<Token>, Vec<LexError>> {
    Lexer::new(source, source_name).run()
}

impl<'a> Lexer<'a> {
    #[must_use]
    fn new(source: &'a str, source_name: &'a str) -> Self {
        let chars = source
            .char_indices()
            .map(|(offset, ch)| (offset as u32, ch))
            .collect();
        Self {
            chars,
            pos: 0,
            line: 1,
            column: 1,
            source_name,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, Vec<LexError>> {
        while self.pos < self.chars.len() {
            self.scan_token();
        }
        let end = self.here();
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            location: end,
        });
        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, ch)| *ch)
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).map(|(_, ch)| *ch)
    }

    fn advance(&mut self) -> Option<char> {
        let (_, ch) = *self.chars.get(self.pos)?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn offset(&self) -> u32 {
        match self.chars.get(self.pos) {
            Some((offset, _)) => *offset,
            None => self
                .chars
                .last()
                .map_or(0, |(offset, ch)| offset + ch.len_utf8() as u32),
        }
    }

    /// A zero-width location at the current position.
    fn here(&self) -> Location {
        let offset = self.offset();
        Location::new(
            offset,
            offset,
            self.line,
            self.column,
            self.line,
            self.column,
            self.source_name.to_string(),
        )
    }

    fn location_from(&self, start: &Location) -> Location {
        Location::new(
            start.offset_start,
            self.offset(),
            start.start_line,
            start.start_column,
            self.line,
            self.column,
            self.source_name.to_string(),
        )
    }

    fn push(&mut self, kind: TokenKind, lexeme: impl Into<String>, start: &Location) {
        let location = self.location_from(start);
        self.tokens.push(Token {
            kind,
            lexeme: lexeme.into(),
            location,
        });
    }

    #[allow(clippy::too_many_lines)]
    fn scan_token(&mut self) {
        let start = self.here();
        let Some(ch) = self.advance() else { return };
        match ch {
            ' ' | '\t' | '\r' | '\n' => {}
            '#' => {
                while let Some(next) = self.peek() {
                    if next == '\n' {
                        break;
                    }
                    self.advance();
                }
            }
            '/' => match self.peek() {
                Some('*') => {
                    self.advance();
                    self.skip_block_comment(&start);
                }
                Some('=') => {
                    self.advance();
                    self.push(TokenKind::SlashAssign, "/=", &start);
                }
                _ => self.push(TokenKind::Slash, "/", &start),
            },
            '+' => {
                if self.consume('=') {
                    self.push(TokenKind::PlusAssign, "+=", &start);
                } else {
                    self.push(TokenKind::Plus, "+", &start);
                }
            }
            '-' => {
                if self.consume('>') {
                    self.push(TokenKind::Arrow, "->", &start);
                } else if self.consume('=') {
                    self.push(TokenKind::MinusAssign, "-=", &start);
                } else {
                    self.push(TokenKind::Minus, "-", &start);
                }
            }
            '*' => {
                if self.consume('=') {
                    self.push(TokenKind::StarAssign, "*=", &start);
                } else {
                    self.push(TokenKind::Star, "*", &start);
                }
            }
            '%' => self.push(TokenKind::Percent, "%", &start),
            '=' => {
                if self.consume('=') {
                    self.push(TokenKind::EqEq, "==", &start);
                } else {
                    self.push(TokenKind::Assign, "=", &start);
                }
            }
            '!' => {
                if self.consume('=') {
                    self.push(TokenKind::BangEq, "!=", &start);
                } else {
                    self.push(TokenKind::Bang, "!", &start);
                }
            }
            '<' => {
                if self.consume('=') {
                    self.push(TokenKind::Le, "<=", &start);
                } else {
                    self.push(TokenKind::Lt, "<", &start);
                }
            }
            '>' => {
                if self.consume('=') {
                    self.push(TokenKind::Ge, ">=", &start);
                } else {
                    self.push(TokenKind::Gt, ">", &start);
                }
            }
            '&' => {
                if self.consume('&') {
                    self.push(TokenKind::AndAnd, "&&", &start);
                } else {
                    self.errors.push(LexError::UnknownCharacter {
                        character: '&',
                        location: self.location_from(&start),
                    });
                }
            }
            '|' => {
                if self.consume('|') {
                    self.push(TokenKind::OrOr, "||", &start);
                } else {
                    self.errors.push(LexError::UnknownCharacter {
                        character: '|',
                        location: self.location_from(&start),
                    });
                }
            }
            '.' => self.push(TokenKind::Dot, ".", &start),
            ',' => self.push(TokenKind::Comma, ",", &start),
            ';' => self.push(TokenKind::Semicolon, ";", &start),
            ':' => self.push(TokenKind::Colon, ":", &start),
            '(' => self.push(TokenKind::LParen, "(", &start),
            ')' => self.push(TokenKind::RParen, ")", &start),
            '{' => self.push(TokenKind::LBrace, "{", &start),
            '}' => self.push(TokenKind::RBrace, "}", &start),
            '[' => self.push(TokenKind::LBracket, "[", &start),
            ']' => self.push(TokenKind::RBracket, "]", &start),
            '\'' => self.scan_char_literal(&start),
            '"' => self.scan_string_literal(&start),
            _ if ch.is_ascii_digit() => self.scan_int_literal(ch, &start),
            _ if ch.is_ascii_alphabetic() || ch == '_' => self.scan_identifier(ch, &start),
            _ => self.errors.push(LexError::UnknownCharacter {
                character: ch,
                location: self.location_from(&start),
            }),
        }
    }

    fn consume(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_block_comment(&mut self, start: &Location) {
        loop {
            match self.peek() {
                None => {
                    self.errors.push(LexError::UnterminatedBlockComment {
                        location: start.clone(),
                    });
                    return;
                }
                Some('*') if self.peek_next() == Some('/') => {
                    self.advance();
                    self.advance();
                    return;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn scan_identifier(&mut self, first: char, start: &Location) {
        let mut ident = String::from(first);
        while let Some(next) = self.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                ident.push(next);
                self.advance();
            } else {
                break;
            }
        }
        let kind = match Keyword::from_ident(&ident) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Identifier(ident.clone()),
        };
        self.push(kind, ident, start);
    }

    fn scan_int_literal(&mut self, first: char, start: &Location) {
        let mut digits = String::from(first);
        while let Some(next) = self.peek() {
            if next.is_ascii_digit() {
                digits.push(next);
                self.advance();
            } else {
                break;
            }
        }
        // Saturate on overflow; the parser rejects anything above i32::MAX
        // with the original spelling in the message.
        let value = digits.parse::<i64>().unwrap_or(i64::MAX);
        self.push(TokenKind::Int(value), digits, start);
    }

    /// Decode one escape sequence, the backslash already consumed.
    fn scan_escape(&mut self, start: &Location) -> char {
        match self.advance() {
            Some(escape) => {
                if let Some((_, value)) = ESCAPES.iter().find(|(name, _)| *name == escape) {
                    *value
                } else {
                    self.errors.push(LexError::IllegalEscape {
                        escape,
                        location: self.location_from(start),
                    });
                    '\u{FFFD}'
                }
            }
            None => {
                self.errors.push(LexError::UnterminatedString {
                    location: start.clone(),
                });
                '\u{FFFD}'
            }
        }
    }

    fn scan_char_literal(&mut self, start: &Location) {
        let value = match self.peek() {
            None | Some('\n') => {
                self.errors.push(LexError::UnterminatedChar {
                    location: start.clone(),
                });
                return;
            }
            Some('\'') => {
                self.advance();
                self.errors.push(LexError::InvalidCharLiteral {
                    location: self.location_from(start),
                });
                return;
            }
            Some('\\') => {
                self.advance();
                self.scan_escape(start)
            }
            Some(ch) => {
                self.advance();
                ch
            }
        };
        if self.consume('\'') {
            let location = self.location_from(start);
            self.tokens.push(Token {
                kind: TokenKind::Char(value),
                lexeme: format!("'{value}'"),
                location,
            });
        } else {
            // Skip to the closing quote or end of line so lexing can resume.
            while let Some(next) = self.peek() {
                if next == '\n' {
                    break;
                }
                self.advance();
                if next == '\'' {
                    break;
                }
            }
            self.errors.push(LexError::InvalidCharLiteral {
                location: self.location_from(start),
            });
        }
    }

    fn scan_string_literal(&mut self, start: &Location) {
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.errors.push(LexError::UnterminatedString {
                        location: start.clone(),
                    });
                    return;
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    value.push(self.scan_escape(start));
                }
                Some(ch) => {
                    self.advance();
                    value.push(ch);
                }
            }
        }
        let location = self.location_from(start);
        self.tokens.push(Token {
            kind: TokenKind::Str(value.clone()),
            lexeme: format!("\"{value}\""),
            location,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, "test.mun")
            .expect("lexing should succeed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    mod token_stream {
        use super::*;

        #[test]
        fn keywords_and_identifiers_are_distinguished() {
            let tokens = kinds("while whilst");
            assert_eq!(
                tokens,
                vec![
                    TokenKind::Keyword(Keyword::While),
                    TokenKind::Identifier("whilst".to_string()),
                    TokenKind::Eof,
                ]
            );
        }

        #[test]
        fn all_keywords_round_trip() {
            for kw in [
                "if",
                "else",
                "while",
                "until",
                "for",
                "do",
                "return",
                "break",
                "continue",
                "structure",
                "alias",
                "import",
                "static",
                "this",
                "null",
                "true",
                "false",
                "void",
            ] {
                let tokens = kinds(kw);
                assert!(
                    matches!(tokens[0], TokenKind::Keyword(k) if k.as_str() == kw),
                    "`{kw}` should lex as a keyword"
                );
            }
        }

        #[test]
        fn compound_operators_win_over_single() {
            let tokens = kinds("<= >= == != && || += -= *= /= ->");
            assert_eq!(
                tokens,
                vec![
                    TokenKind::Le,
                    TokenKind::Ge,
                    TokenKind::EqEq,
                    TokenKind::BangEq,
                    TokenKind::AndAnd,
                    TokenKind::OrOr,
                    TokenKind::PlusAssign,
                    TokenKind::MinusAssign,
                    TokenKind::StarAssign,
                    TokenKind::SlashAssign,
                    TokenKind::Arrow,
                    TokenKind::Eof,
                ]
            );
        }

        #[test]
        fn integer_literal_value() {
            let tokens = kinds("0 42 123456");
            assert_eq!(
                tokens,
                vec![
                    TokenKind::Int(0),
                    TokenKind::Int(42),
                    TokenKind::Int(123_456),
                    TokenKind::Eof,
                ]
            );
        }

        #[test]
        fn char_literal_with_escape() {
            let tokens = kinds(r"'a' '\n' '\0' '\\'");
            assert_eq!(
                tokens,
                vec![
                    TokenKind::Char('a'),
                    TokenKind::Char('\n'),
                    TokenKind::Char('\0'),
                    TokenKind::Char('\\'),
                    TokenKind::Eof,
                ]
            );
        }

        #[test]
        fn string_literal_with_escapes() {
            let tokens = kinds(r#""hi\tthere\n""#);
            assert_eq!(
                tokens,
                vec![TokenKind::Str("hi\tthere\n".to_string()), TokenKind::Eof]
            );
        }

        #[test]
        fn line_comment_is_stripped() {
            let tokens = kinds("1 # comment with tokens ; { }\n2");
            assert_eq!(
                tokens,
                vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
            );
        }

        #[test]
        fn block_comment_is_stripped() {
            let tokens = kinds("1 /* anything\n * at all */ 2");
            assert_eq!(
                tokens,
                vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
            );
        }

        #[test]
        fn block_comment_does_not_nest() {
            // The first `*/` closes the comment.
            let tokens = kinds("/* outer /* inner */ 7");
            assert_eq!(tokens, vec![TokenKind::Int(7), TokenKind::Eof]);
        }
    }

    mod spans {
        use super::*;

        #[test]
        fn tokens_carry_line_and_column() {
            let tokens = tokenize("a\n  b", "test.mun").unwrap();
            assert_eq!(tokens[0].location.start_line, 1);
            assert_eq!(tokens[0].location.start_column, 1);
            assert_eq!(tokens[1].location.start_line, 2);
            assert_eq!(tokens[1].location.start_column, 3);
        }

        #[test]
        fn tokens_carry_byte_offsets() {
            let tokens = tokenize("ab cd", "test.mun").unwrap();
            assert_eq!(tokens[0].location.offset_start, 0);
            assert_eq!(tokens[0].location.offset_end, 2);
            assert_eq!(tokens[1].location.offset_start, 3);
            assert_eq!(tokens[1].location.offset_end, 5);
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn unterminated_string_is_reported() {
            let errors = tokenize("\"abc", "test.mun").unwrap_err();
            assert!(matches!(errors[0], LexError::UnterminatedString { .. }));
        }

        #[test]
        fn unterminated_block_comment_is_reported() {
            let errors = tokenize("/* never closed", "test.mun").unwrap_err();
            assert!(matches!(
                errors[0],
                LexError::UnterminatedBlockComment { .. }
            ));
        }

        #[test]
        fn unknown_character_is_reported_with_position() {
            let errors = tokenize("a $ b", "test.mun").unwrap_err();
            match &errors[0] {
                LexError::UnknownCharacter {
                    character,
                    location,
                } => {
                    assert_eq!(*character, '$');
                    assert_eq!(location.start_column, 3);
                }
                other => panic!("expected UnknownCharacter, got {other:?}"),
            }
        }

        #[test]
        fn illegal_escape_is_reported() {
            let errors = tokenize(r#""\q""#, "test.mun").unwrap_err();
            assert!(matches!(errors[0], LexError::IllegalEscape { escape: 'q', .. }));
        }

        #[test]
        fn lone_ampersand_is_unknown() {
            let errors = tokenize("a & b", "test.mun").unwrap_err();
            assert!(matches!(
                errors[0],
                LexError::UnknownCharacter { character: '&', .. }
            ));
        }

        #[test]
        fn multiple_errors_are_collected() {
            let errors = tokenize("$ ~\n\"open", "test.mun").unwrap_err();
            assert_eq!(errors.len(), 3);
        }
    }
}
