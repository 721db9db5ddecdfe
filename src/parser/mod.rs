//! Parser module: dispatch by file extension plus the issue policy both
//! parsers share.

pub mod h;
pub mod pll;

use crate::error::{ModelError, ParseError};
use crate::model::Library;
use crate::scanner::Scanner;
use std::path::Path;
use tracing::debug;

/// Input formats, recognized by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Sipro header of `#define`s
    H,
    /// LogicLab library source
    Pll,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "h" => Some(Format::H),
            "pll" => Some(Format::Pll),
            _ => None,
        }
    }

    /// Writers to run on a library read in this format.
    pub fn outputs(self) -> &'static [&'static str] {
        match self {
            Format::H => &["pll", "plclib"],
            Format::Pll => &["plclib"],
        }
    }
}

/// Parse `text` as `format` into a library called `name`.
pub fn parse(
    format: Format,
    name: &str,
    text: &str,
    issues: &mut Vec<String>,
    strict: bool,
) -> Result<Library, ParseError> {
    match format {
        Format::H => h::parse(name, text, issues, strict),
        Format::Pll => pll::parse(name, text, issues, strict),
    }
}

// -- Shared helpers -----------------------------------------------------------

/// Sink for non-fatal diagnostics. In strict mode every issue is an error.
pub(crate) struct Issues<'s> {
    sink: &'s mut Vec<String>,
    strict: bool,
}

impl<'s> Issues<'s> {
    pub(crate) fn new(sink: &'s mut Vec<String>, strict: bool) -> Self {
        Self { sink, strict }
    }

    pub(crate) fn notify(&mut self, issue: ParseError) -> Result<(), ParseError> {
        if self.strict {
            return Err(issue);
        }
        debug!("issue: {issue}");
        self.sink.push(issue.to_string());
        Ok(())
    }
}

/// Locate a model validation failure at the cursor.
pub(crate) fn located<T>(sc: &Scanner, result: Result<T, ModelError>) -> Result<T, ParseError> {
    result.map_err(|e| sc.error(e.to_string()))
}

/// Skip a block comment whose opening was just eaten.
pub(crate) fn skip_block_comment(sc: &mut Scanner, close: &str) -> Result<(), ParseError> {
    let (line, offset) = (sc.line(), sc.offset());
    if sc.skip_past(close) {
        Ok(())
    } else {
        Err(ParseError::new("Unclosed block comment", line, offset))
    }
}
