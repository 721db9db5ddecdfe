//! Sipro header parser: a flat pass over `#define` lines.
//!
//! ```text
//! #define vnLevel   vn1782  // tank level
//! #define MAXV      23.9    // [LREAL] max voltage
//! ```
//!
//! Register defines become global variables, numeric defines annotated with
//! an IEC type become global constants, everything else is dropped.

use super::{located, skip_block_comment, Issues};
use crate::error::ParseError;
use crate::model::{is_numeric_type, Library, Variable, VariableGroup};
use crate::scanner::Scanner;
use crate::sipro::Register;
use tracing::debug;

pub const VARIABLES_GROUP: &str = "Header_Variables";
pub const CONSTANTS_GROUP: &str = "Header_Constants";

/// One `#define LABEL VALUE // [PREDECL] comment` line.
#[derive(Debug, Default, PartialEq)]
struct Define<'a> {
    label: &'a str,
    value: &'a str,
    predecl: &'a str,
    comment: &'a str,
}

impl Define<'_> {
    fn value_is_number(&self) -> bool {
        self.value.parse::<f64>().is_ok()
    }
}

pub fn parse(
    name: &str,
    text: &str,
    issues: &mut Vec<String>,
    strict: bool,
) -> Result<Library, ParseError> {
    let mut sc = Scanner::new(text)?;
    let mut issues = Issues::new(issues, strict);

    let mut variables = VariableGroup {
        name: VARIABLES_GROUP.to_string(),
        variables: Vec::new(),
    };
    let mut constants = VariableGroup {
        name: CONSTANTS_GROUP.to_string(),
        variables: Vec::new(),
    };

    while let Some(def) = next_define(&mut sc, &mut issues)? {
        if let Some(reg) = Register::parse(def.value) {
            let mut var = located(&sc, Variable::new(def.label, reg.iec_type()))?;
            if let Some(length) = reg.string_length() {
                located(&sc, var.set_length(length))?;
            }
            var.address = Some(reg.address());
            var.set_description(def.comment);
            debug!("register {} -> {}", var.name, reg.address());
            variables.variables.push(var);
        } else if def.value_is_number() && is_numeric_type(def.predecl) {
            let mut var = located(&sc, Variable::new(def.label, def.predecl))?;
            located(&sc, var.set_value(def.value))?;
            var.set_description(def.comment);
            debug!("constant {} = {}", var.name, def.value);
            constants.variables.push(var);
        } else {
            debug!("define not exported: {}={}", def.label, def.value);
        }
    }

    if variables.variables.is_empty() && constants.variables.is_empty() {
        return Err(sc.error("No exportable defines found"));
    }

    let mut lib = Library::new(name);
    if !variables.variables.is_empty() {
        lib.global_variables.groups.push(variables);
    }
    if !constants.variables.is_empty() {
        lib.global_constants.groups.push(constants);
    }
    Ok(lib)
}

/// Skip comments and blank lines up to the next define.
fn next_define<'a>(
    sc: &mut Scanner<'a>,
    issues: &mut Issues,
) -> Result<Option<Define<'a>>, ParseError> {
    while !sc.at_end() {
        sc.skip_blanks();
        if sc.eat("//") {
            sc.skip_line();
        } else if sc.eat("/*") {
            skip_block_comment(sc, "*/")?;
        } else if sc.eat_line_end() || sc.at_end() {
            // empty line
        } else if sc.eat_keyword("#define") {
            return collect_define(sc, issues).map(Some);
        } else {
            let issue = sc.error(format!("Unexpected content: {}", sc.rest_of_line().escape_debug()));
            issues.notify(issue)?;
            sc.skip_line();
        }
    }
    Ok(None)
}

fn collect_define<'a>(sc: &mut Scanner<'a>, issues: &mut Issues) -> Result<Define<'a>, ParseError> {
    let mut def = Define::default();

    sc.skip_blanks();
    def.label = sc.collect_identifier();
    if def.label.is_empty() {
        return Err(sc.error("Empty define label"));
    }

    sc.skip_blanks();
    def.value = sc.collect_token();
    if def.value.is_empty() {
        return Err(sc.error(format!("Empty define value of {}", def.label)));
    }

    sc.skip_blanks();
    if sc.eat("//") {
        sc.skip_blanks();
        if sc.is_at(b'[') {
            let rest = sc.rest_of_line();
            match rest.find(']') {
                Some(end) => {
                    def.predecl = rest[1..end].trim();
                    sc.eat(&rest[..=end]);
                }
                None => {
                    let issue = sc.error(format!(
                        "Unclosed initial '[' in the comment of define {}",
                        def.label
                    ));
                    issues.notify(issue)?;
                }
            }
        }
        def.comment = sc.skip_line().trim();
        return Ok(def);
    }

    if !sc.eat_line_end() && !sc.at_end() {
        let issue = sc.error(format!(
            "Unexpected content after define: {}",
            sc.rest_of_line().escape_debug()
        ));
        issues.notify(issue)?;
        sc.skip_line();
    }
    Ok(def)
}
