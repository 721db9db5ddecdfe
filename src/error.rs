//! Error types shared by the parsers, the document model and the writers.

use thiserror::Error;

/// Fatal error located in a source buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} (line {line}, offset {offset})")]
pub struct ParseError {
    pub message: String,
    /// 1-based
    pub line: usize,
    /// 0-based byte offset, clamped to the buffer end
    pub offset: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, offset: usize) -> Self {
        Self {
            message: message.into(),
            line,
            offset,
        }
    }
}

/// Rejected by a validating model constructor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Empty {0} name")]
    EmptyName(&'static str),
    #[error("Empty type for {0}")]
    EmptyType(String),
    #[error("Empty value for {0}")]
    EmptyValue(String),
    #[error("Invalid array range {first}..{last}")]
    InvalidArrayRange { first: usize, last: usize },
    #[error("Invalid length {0}")]
    InvalidLength(usize),
    #[error("Invalid range {min}..{max}")]
    InvalidRange { min: i64, max: i64 },
    #[error("Typedef {0} cannot have a value")]
    TypedefWithValue(String),
    #[error("Typedef {0} cannot have an address")]
    TypedefWithAddress(String),
}

/// Cross-entity invariant violated by a parsed library.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("Global constant {0} has no value")]
    ConstantWithoutValue(String),
    #[error("Function {0} has no return type")]
    FunctionWithoutReturnType(String),
    #[error("Function {pou} cannot have {category} variables")]
    FunctionWithVars { pou: String, category: &'static str },
    #[error("Program {0} cannot have a return type")]
    ProgramWithReturnType(String),
    #[error("Program {pou} cannot have {category} variables")]
    ProgramWithVars { pou: String, category: &'static str },
}

/// Malformed `<major>.<minor>` schema version.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("\"{text}\" is not a valid version: {reason}")]
pub struct VersionError {
    pub text: String,
    pub reason: &'static str,
}
