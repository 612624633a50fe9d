use log::warn;
use miette::{Diagnostic, NamedSource, SourceSpan};
use serde::Serialize;
use std::fmt::{self, Display};
use std::sync::Arc;
use thiserror::Error;

use crate::utils::get_line_and_column;

/// Error type a [`SchemaLoader`](crate::loader::SchemaLoader) reports failures with.
pub type LoadError = Box<dyn std::error::Error + Send + Sync>;

/// Stable codes for every fatal error and warning kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SyntaxError,
    UnsupportedVersion,
    DuplicateType,
    UndefinedParent,
    CircularInheritance,
    UnknownConstraint,
    InvalidConstraint,
    UnknownType,
    SchemaMismatch,
    MissingRequiredField,
    MissingLoader,
    SchemaLoadError,
    UnknownDirective,
    InvalidInput,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SyntaxError => "SYNTAX_ERROR",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::DuplicateType => "DUPLICATE_TYPE",
            ErrorCode::UndefinedParent => "UNDEFINED_PARENT",
            ErrorCode::CircularInheritance => "CIRCULAR_INHERITANCE",
            ErrorCode::UnknownConstraint => "UNKNOWN_CONSTRAINT",
            ErrorCode::InvalidConstraint => "INVALID_CONSTRAINT",
            ErrorCode::UnknownType => "UNKNOWN_TYPE",
            ErrorCode::SchemaMismatch => "SCHEMA_MISMATCH",
            ErrorCode::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            ErrorCode::MissingLoader => "MISSING_LOADER",
            ErrorCode::SchemaLoadError => "SCHEMA_LOAD_ERROR",
            ErrorCode::UnknownDirective => "UNKNOWN_DIRECTIVE",
            ErrorCode::InvalidInput => "INVALID_INPUT",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal problem recorded while parsing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub code: ErrorCode,
    pub message: String,
    pub line: Option<usize>,
    pub filename: Option<String>,
}

impl Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        match (&self.filename, self.line) {
            (Some(file), Some(line)) => write!(f, " ({file}:{line})"),
            (None, Some(line)) => write!(f, " (line {line})"),
            _ => Ok(()),
        }
    }
}

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum MaxiError {
    #[error("Syntax error: {message}")]
    #[diagnostic(
        code(maxi::syntax_error),
        help("Check the directive, type header or record syntax at this position.")
    )]
    Syntax {
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("{message}")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Unsupported version `{version}`")]
    #[diagnostic(
        code(maxi::unsupported_version),
        help("Only `@version:1.0.0` is supported.")
    )]
    UnsupportedVersion {
        version: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("this version")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Duplicate type alias `{alias}`")]
    #[diagnostic(
        code(maxi::duplicate_type),
        help("Every type alias must be unique across the document and its imports.")
    )]
    DuplicateType {
        alias: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("`{alias}` is already defined")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Type `{alias}` inherits from undefined type `{parent}`")]
    #[diagnostic(
        code(maxi::undefined_parent),
        help("Define `{parent}` or import the schema that declares it.")
    )]
    UndefinedParent {
        alias: String,
        parent: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("declared here")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Circular inheritance involving type `{alias}`: {}", cycle.join(" -> "))]
    #[diagnostic(
        code(maxi::circular_inheritance),
        help("A type cannot inherit from itself, directly or through its parents.")
    )]
    CircularInheritance {
        alias: String,
        /// Aliases along the cycle, starting and ending with `alias`.
        cycle: Vec<String>,
        #[source_code]
        src: NamedSource<String>,
        #[label("part of the cycle")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Unknown constraint `{constraint}`")]
    #[diagnostic(
        code(maxi::unknown_constraint),
        help("Supported constraints: !, id, >=N, >N, <=N, <N, =N, pattern:RE, mime:TYPE, and decimal precision such as 5.2.")
    )]
    UnknownConstraint {
        constraint: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("not a constraint")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Invalid constraint `{constraint}`: {reason}")]
    #[diagnostic(code(maxi::invalid_constraint))]
    InvalidConstraint {
        constraint: String,
        reason: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("{reason}")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Unknown type alias `{alias}`")]
    #[diagnostic(
        code(maxi::unknown_type),
        help("Declare the type in the schema section, or use `@mode:lax` to accept untyped records.")
    )]
    UnknownType {
        alias: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("no type named `{alias}`")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Record `{alias}` has {found} values but the type declares {expected} fields")]
    #[diagnostic(code(maxi::schema_mismatch))]
    SchemaMismatch {
        alias: String,
        expected: usize,
        found: usize,
        #[source_code]
        src: NamedSource<String>,
        #[label("too many values")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Missing required field `{field}` in `{alias}`")]
    #[diagnostic(
        code(maxi::missing_required_field),
        help("Provide a value or declare a default for the field.")
    )]
    MissingRequiredField {
        alias: String,
        field: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("`{field}` has no value")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("No schema loader configured to import `{path}`")]
    #[diagnostic(
        code(maxi::missing_loader),
        help("Pass a loader through `ParseOptions::with_loader` to resolve `@schema` imports.")
    )]
    MissingLoader {
        path: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("import requested here")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Failed to load schema `{path}`")]
    #[diagnostic(code(maxi::schema_load_error))]
    SchemaLoad {
        path: String,
        #[source]
        cause: Arc<dyn std::error::Error + Send + Sync>,
        #[source_code]
        src: NamedSource<String>,
        #[label("imported here")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Invalid input: {message}")]
    #[diagnostic(code(maxi::invalid_input))]
    InvalidInput {
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label]
        span: SourceSpan,
        line: usize,
        column: usize,
    },
}

impl MaxiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MaxiError::Syntax { .. } => ErrorCode::SyntaxError,
            MaxiError::UnsupportedVersion { .. } => ErrorCode::UnsupportedVersion,
            MaxiError::DuplicateType { .. } => ErrorCode::DuplicateType,
            MaxiError::UndefinedParent { .. } => ErrorCode::UndefinedParent,
            MaxiError::CircularInheritance { .. } => ErrorCode::CircularInheritance,
            MaxiError::UnknownConstraint { .. } => ErrorCode::UnknownConstraint,
            MaxiError::InvalidConstraint { .. } => ErrorCode::InvalidConstraint,
            MaxiError::UnknownType { .. } => ErrorCode::UnknownType,
            MaxiError::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            MaxiError::MissingRequiredField { .. } => ErrorCode::MissingRequiredField,
            MaxiError::MissingLoader { .. } => ErrorCode::MissingLoader,
            MaxiError::SchemaLoad { .. } => ErrorCode::SchemaLoadError,
            MaxiError::InvalidInput { .. } => ErrorCode::InvalidInput,
        }
    }

    fn position(&self) -> (&NamedSource<String>, usize, usize) {
        match self {
            MaxiError::Syntax {
                src, line, column, ..
            }
            | MaxiError::UnsupportedVersion {
                src, line, column, ..
            }
            | MaxiError::DuplicateType {
                src, line, column, ..
            }
            | MaxiError::UndefinedParent {
                src, line, column, ..
            }
            | MaxiError::CircularInheritance {
                src, line, column, ..
            }
            | MaxiError::UnknownConstraint {
                src, line, column, ..
            }
            | MaxiError::InvalidConstraint {
                src, line, column, ..
            }
            | MaxiError::UnknownType {
                src, line, column, ..
            }
            | MaxiError::SchemaMismatch {
                src, line, column, ..
            }
            | MaxiError::MissingRequiredField {
                src, line, column, ..
            }
            | MaxiError::MissingLoader {
                src, line, column, ..
            }
            | MaxiError::SchemaLoad {
                src, line, column, ..
            }
            | MaxiError::InvalidInput {
                src, line, column, ..
            } => (src, *line, *column),
        }
    }

    /// 1-based line of the error inside [`filename`](Self::filename), 0 when unknown.
    pub fn line(&self) -> usize {
        self.position().1
    }

    pub fn column(&self) -> usize {
        self.position().2
    }

    /// Name of the document or imported schema the error was found in.
    pub fn filename(&self) -> &str {
        self.position().0.name()
    }
}

/// Logs a warning and appends it to the parse result's list.
pub(crate) fn record_warning(warnings: &mut Vec<Warning>, warning: Warning) {
    warn!("{warning}");
    warnings.push(warning);
}

/// A named source text, used to attach positions to diagnostics.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SourceRef<'a> {
    pub name: &'a str,
    pub text: &'a str,
}

/// Diagnostic location: source, byte span, and the derived line and column.
pub(crate) struct At {
    pub src: NamedSource<String>,
    pub span: SourceSpan,
    pub line: usize,
    pub column: usize,
}

impl<'a> SourceRef<'a> {
    pub fn new(name: &'a str, text: &'a str) -> Self {
        SourceRef { name, text }
    }

    pub fn at(&self, offset: usize, len: usize) -> At {
        let offset = offset.min(self.text.len());
        let len = len.min(self.text.len() - offset);
        let (line, column) = get_line_and_column(self.text, offset);
        At {
            src: NamedSource::new(self.name, self.text.to_string()),
            span: (offset, len).into(),
            line,
            column,
        }
    }

    pub fn syntax(&self, offset: usize, len: usize, message: impl Into<String>) -> MaxiError {
        let At {
            src,
            span,
            line,
            column,
        } = self.at(offset, len);
        MaxiError::Syntax {
            message: message.into(),
            src,
            span,
            line,
            column,
        }
    }

    pub fn warning(&self, code: ErrorCode, offset: usize, message: impl Into<String>) -> Warning {
        let (line, _) = get_line_and_column(self.text, offset);
        Warning {
            code,
            message: message.into(),
            line: Some(line),
            filename: Some(self.name.to_string()),
        }
    }
}
