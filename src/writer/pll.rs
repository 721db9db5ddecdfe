//! LogicLab `.pll` writer. The output reads back through
//! [`crate::parser::pll`], except for retain variables which that parser
//! rejects.

use crate::model::*;
use crate::options::Options;
use crate::writer::Writer;

pub struct PllWriter;

impl Writer for PllWriter {
    fn write(&self, lib: &Library, _options: &Options) -> anyhow::Result<String> {
        Ok(write(lib))
    }

    fn file_extension(&self) -> &str {
        "pll"
    }
}

fn banner(out: &mut String, title: &str) {
    let width = title.len() + 10;
    out.push_str(&format!("\t(*{}*)\n", "*".repeat(width)));
    out.push_str(&format!("\t(*{}*)\n", " ".repeat(width)));
    out.push_str(&format!("\t(*     {title}     *)\n"));
    out.push_str(&format!("\t(*{}*)\n", " ".repeat(width)));
    out.push_str(&format!("\t(*{}*)\n\n", "*".repeat(width)));
}

fn description(out: &mut String, descr: &Option<String>) {
    if let Some(d) = descr {
        out.push_str(&format!(" {{ DE:\"{d}\" }}"));
    }
}

/// Render a whole library.
pub fn write(lib: &Library) -> String {
    let mut out = String::new();

    out.push_str("(*\n");
    out.push_str(&format!("    name: {}\n", lib.name));
    out.push_str(&format!("    descr: {}\n", lib.description));
    out.push_str(&format!("    version: {}\n", lib.version));
    out.push_str("*)\n\n\n");

    write_globals(&mut out, "GLOBAL VARIABLES", "VAR_GLOBAL", &lib.global_variables);
    write_globals(&mut out, "RETAIN VARIABLES", "VAR_GLOBAL RETAIN", &lib.global_retainvars);
    write_globals(&mut out, "GLOBAL CONSTANTS", "VAR_GLOBAL CONSTANT", &lib.global_constants);

    for (title, kind) in [
        ("FUNCTIONS", PouKind::Function),
        ("FUNCTION BLOCKS", PouKind::FunctionBlock),
        ("PROGRAMS", PouKind::Program),
    ] {
        let pous = lib.pous(kind);
        if pous.is_empty() {
            continue;
        }
        banner(&mut out, title);
        for pou in pous {
            write_pou(&mut out, pou, kind);
        }
    }

    if !lib.macros.is_empty() {
        banner(&mut out, "MACROS");
        for mac in &lib.macros {
            write_macro(&mut out, mac);
        }
    }

    if !(lib.structs.is_empty()
        && lib.typedefs.is_empty()
        && lib.enums.is_empty()
        && lib.subranges.is_empty())
    {
        banner(&mut out, "TYPES");
        write_types(&mut out, lib);
    }

    out
}

/// `NAME [AT %addr] : [ARRAY[ a..b ] OF] TYPE[[ n ]] [:= v]; [{ DE:"..." }]`
fn write_variable(out: &mut String, var: &Variable, ind: &str) {
    out.push_str(&format!("{ind}{}", var.name));
    if let Some(addr) = var.address {
        out.push_str(&format!(" AT {addr}"));
    }
    out.push_str(" : ");
    write_type(out, &var.type_name, var.length, var.array);
    if let Some(value) = &var.value {
        out.push_str(&format!(" := {value}"));
    }
    out.push(';');
    description(out, &var.description);
    out.push('\n');
}

fn write_type(out: &mut String, type_name: &str, length: Option<usize>, array: Option<ArrayRange>) {
    if let Some(array) = array {
        out.push_str(&format!("ARRAY[ {}..{} ] OF ", array.first, array.last()));
    }
    out.push_str(type_name);
    if let Some(length) = length {
        out.push_str(&format!("[ {length} ]"));
    }
}

fn write_globals(out: &mut String, title: &str, keyword: &str, groups: &VariableGroups) {
    if groups.is_empty() {
        return;
    }
    banner(out, title);
    out.push_str(&format!("\t{keyword}\n"));
    for group in &groups.groups {
        if group.is_named() {
            out.push_str(&format!("\t{{G:\"{}\"}}\n", group.name));
        }
        for var in &group.variables {
            write_variable(out, var, "\t");
        }
    }
    out.push_str("\tEND_VAR\n\n\n");
}

/// Opaque body followed by the closing keyword on its own line.
///
/// The parser reads a body up to and including the newline before the
/// closing keyword, so a body is always written ending in '\n'. An empty
/// body reads back as "\n"; after one pass the text is a fixed point.
fn write_body(out: &mut String, code_type: &str, body: &str, end_keyword: &str) {
    let code_type = if code_type.is_empty() { "ST" } else { code_type };
    out.push_str(&format!("\t{{ CODE:{code_type} }}"));
    out.push_str(body);
    if !body.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!("{end_keyword}\n\n"));
}

fn write_pou(out: &mut String, pou: &Pou, kind: PouKind) {
    out.push_str(&format!("{} {}", kind.keyword(), pou.name));
    if let Some(ret) = &pou.return_type {
        out.push_str(&format!(" : {ret}"));
    }
    out.push('\n');
    if let Some(d) = &pou.description {
        out.push_str(&format!("{{ DE:\"{d}\" }}\n"));
    }
    for category in VarCategory::ALL {
        let vars = pou.vars(category);
        if vars.is_empty() {
            continue;
        }
        out.push_str(&format!("\n\t{}\n", category.keyword()));
        for var in vars {
            write_variable(out, var, "\t");
        }
        out.push_str("\tEND_VAR\n");
    }
    out.push('\n');
    write_body(out, &pou.code_type, &pou.body, kind.end_keyword());
}

fn write_macro(out: &mut String, mac: &Macro) {
    out.push_str(&format!("MACRO {}\n", mac.name));
    if let Some(d) = &mac.description {
        out.push_str(&format!("{{ DE:\"{d}\" }}\n"));
    }
    if !mac.parameters.is_empty() {
        out.push_str("\n\tPAR_MACRO\n");
        for par in &mac.parameters {
            out.push_str(&format!("\t{};", par.name));
            description(out, &par.description);
            out.push('\n');
        }
        out.push_str("\tEND_PAR\n");
    }
    out.push('\n');
    write_body(out, &mac.code_type, &mac.body, "END_MACRO");
}

fn write_types(out: &mut String, lib: &Library) {
    out.push_str("TYPE\n");

    for strct in &lib.structs {
        out.push_str(&format!("\n\t{} : STRUCT", strct.name));
        description(out, &strct.description);
        out.push('\n');
        for member in &strct.members {
            write_variable(out, member, "\t\t");
        }
        out.push_str("\tEND_STRUCT;\n");
    }

    for typedef in &lib.typedefs {
        out.push_str(&format!("\n\t{} : ", typedef.name));
        write_type(out, &typedef.type_name, typedef.length, typedef.array);
        out.push(';');
        description(out, &typedef.description);
        out.push('\n');
    }

    for en in &lib.enums {
        out.push_str(&format!("\n\t{} : (", en.name));
        description(out, &en.description);
        out.push('\n');
        let last = en.elements.len().saturating_sub(1);
        for (i, elem) in en.elements.iter().enumerate() {
            out.push_str(&format!("\t\t{} := {}", elem.name, elem.value));
            if i < last {
                out.push(',');
            }
            description(out, &elem.description);
            out.push('\n');
        }
        out.push_str("\t);\n");
    }

    for subrange in &lib.subranges {
        out.push_str(&format!(
            "\n\t{} : {} ({}..{});",
            subrange.name, subrange.type_name, subrange.min, subrange.max
        ));
        description(out, &subrange.description);
        out.push('\n');
    }

    out.push_str("\nEND_TYPE\n");
}
