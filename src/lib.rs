//! llconv: convert PLC libraries between Sipro headers, LogicLab `.pll`
//! sources and LogicLab 5 `.plclib` XML.
//!
//! ```no_run
//! let mut issues = Vec::new();
//! let lib = llconv::parser::h::parse("defvar", "#define vnLevel vn1782\n", &mut issues, false)?;
//! lib.check()?;
//! let xml = llconv::writer::plclib::write(&lib, Default::default());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod error;
pub mod model;
pub mod options;
pub mod parser;
pub mod scanner;
pub mod sipro;
pub mod writer;

pub use error::{CheckError, ModelError, ParseError, VersionError};
pub use model::Library;
pub use options::Options;
pub use parser::Format;
pub use writer::{create_writer, Writer};
