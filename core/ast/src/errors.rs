//! Error types for lexing, parsing, and import resolution.
//!
//! Every diagnostic carries the source [`Location`] it points at and renders
//! as `source:line:column: message`.

use std::path::PathBuf;

use thiserror::Error;

use crate::nodes::Location;

/// A malformed token in the input text.
#[derive(Debug, Clone, Error)]
pub enum LexError {
    #[error("{location}: unterminated string literal")]
    UnterminatedString { location: Location },

    #[error("{location}: unterminated character literal")]
    UnterminatedChar { location: Location },

    #[error("{location}: unterminated block comment")]
    UnterminatedBlockComment { location: Location },

    #[error("{location}: unknown character `{character}`")]
    UnknownCharacter { character: char, location: Location },

    #[error("{location}: illegal escape sequence `\\{escape}`")]
    IllegalEscape { escape: char, location: Location },

    #[error("{location}: character literal must contain exactly one character")]
    InvalidCharLiteral { location: Location },
}

impl LexError {
    #[must_use]
    pub fn location(&self) -> &Location {
        match self {
            LexError::UnterminatedString { location }
            | LexError::UnterminatedChar { location }
            | LexError::UnterminatedBlockComment { location }
            | LexError::UnknownCharacter { location, .. }
            | LexError::IllegalEscape { location, .. }
            | LexError::InvalidCharLiteral { location } => location,
        }
    }
}

/// A deviation from the grammar discovered by the parser.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("{location}: unexpected `{found}`, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        location: Location,
    },

    #[error("{location}: unexpected end of file, expected {expected}")]
    UnexpectedEof { expected: String, location: Location },

    #[error("{location}: integer literal `{literal}` is out of range")]
    IntegerLiteralOutOfRange { literal: String, location: Location },

    #[error("{location}: invalid assignment target")]
    InvalidAssignmentTarget { location: Location },
}

impl ParseError {
    #[must_use]
    pub fn location(&self) -> &Location {
        match self {
            ParseError::UnexpectedToken { location, .. }
            | ParseError::UnexpectedEof { location, .. }
            | ParseError::IntegerLiteralOutOfRange { location, .. }
            | ParseError::InvalidAssignmentTarget { location } => location,
        }
    }
}

/// A lexical or syntactic diagnostic from a single file.
#[derive(Debug, Clone, Error)]
pub enum SyntaxError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Failure while resolving `import` declarations.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{location}: imported file not found: {path}")]
    FileNotFound { path: PathBuf, location: Location },

    #[error("{location}: failed to read {path}: {source}")]
    FileReadError {
        path: PathBuf,
        location: Location,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "{location}: conflicting host import `{module}.{name}`: signatures must be identical"
    )]
    ConflictingHostImport {
        module: String,
        name: String,
        location: Location,
    },
}

/// Any diagnostic produced while loading a program (entry file plus its
/// transitive file imports and the standard prelude).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Import(#[from] ImportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_location() -> Location {
        Location {
            offset_start: 4,
            offset_end: 9,
            start_line: 2,
            start_column: 5,
            end_line: 2,
            end_column: 10,
            source: "main.mun".to_string(),
        }
    }

    #[test]
    fn display_unterminated_string() {
        let err = LexError::UnterminatedString {
            location: test_location(),
        };
        assert_eq!(err.to_string(), "main.mun:2:5: unterminated string literal");
    }

    #[test]
    fn display_unknown_character() {
        let err = LexError::UnknownCharacter {
            character: '@',
            location: test_location(),
        };
        assert_eq!(err.to_string(), "main.mun:2:5: unknown character `@`");
    }

    #[test]
    fn display_illegal_escape() {
        let err = LexError::IllegalEscape {
            escape: 'q',
            location: test_location(),
        };
        assert_eq!(
            err.to_string(),
            "main.mun:2:5: illegal escape sequence `\\q`"
        );
    }

    #[test]
    fn display_unexpected_token() {
        let err = ParseError::UnexpectedToken {
            found: "}".to_string(),
            expected: "an expression".to_string(),
            location: test_location(),
        };
        assert_eq!(
            err.to_string(),
            "main.mun:2:5: unexpected `}`, expected an expression"
        );
    }

    #[test]
    fn display_integer_out_of_range() {
        let err = ParseError::IntegerLiteralOutOfRange {
            literal: "99999999999".to_string(),
            location: test_location(),
        };
        assert_eq!(
            err.to_string(),
            "main.mun:2:5: integer literal `99999999999` is out of range"
        );
    }

    #[test]
    fn display_conflicting_host_import() {
        let err = ImportError::ConflictingHostImport {
            module: "env".to_string(),
            name: "write_int".to_string(),
            location: test_location(),
        };
        assert_eq!(
            err.to_string(),
            "main.mun:2:5: conflicting host import `env.write_int`: signatures must be identical"
        );
    }

    #[test]
    fn syntax_error_is_transparent() {
        let err = SyntaxError::Lex(LexError::UnterminatedChar {
            location: test_location(),
        });
        assert_eq!(
            err.to_string(),
            "main.mun:2:5: unterminated character literal"
        );
    }
}
