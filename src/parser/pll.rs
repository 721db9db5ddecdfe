//! LogicLab `.pll` parser: an explicit state machine over the scanner.
//!
//! The top level dispatches on `PROGRAM`, `FUNCTION_BLOCK`, `FUNCTION`,
//! `MACRO`, `TYPE` and `VAR_GLOBAL`. Each construct keeps its in-progress
//! entity inside the state value and is pushed into the library only once
//! its `END_*` keyword has been read, so a truncated construct is simply
//! dropped.

use super::{located, skip_block_comment, Issues};
use crate::error::ParseError;
use crate::model::*;
use crate::scanner::Scanner;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

// -- Regex patterns -----------------------------------------------------------

// `key: value` line inside the leading comment
static RE_HEADER_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[[:space:]]*([[:alnum:]]+)[[:space:]]*:[[:space:]]*(.*?)[[:space:]]*$").unwrap());

// -- Parser state -------------------------------------------------------------

enum State {
    Header,
    See,
    Pou(Box<PouState>),
    Macro(Box<MacroState>),
    GlobalVars(GlobalTarget),
    Type,
}

struct PouState {
    kind: PouKind,
    pou: Pou,
    phase: PouPhase,
}

#[derive(Clone, Copy)]
enum PouPhase {
    Header,
    Vars(VarCategory),
    Body,
}

struct MacroState {
    mac: Macro,
    phase: MacroPhase,
    has_params: bool,
}

#[derive(Clone, Copy)]
enum MacroPhase {
    Header,
    Params,
    Body,
}

#[derive(Clone, Copy)]
enum GlobalTarget {
    Variables,
    Constants,
}

/// Transient `{KEY:value}` annotation.
struct Directive<'a> {
    key: &'a str,
    value: &'a str,
}

pub fn parse(
    name: &str,
    text: &str,
    issues: &mut Vec<String>,
    strict: bool,
) -> Result<Library, ParseError> {
    let mut parser = Parser {
        sc: Scanner::new(text)?,
        issues: Issues::new(issues, strict),
        lib: Library::new(name),
    };
    parser.run()?;
    if parser.lib.is_empty() {
        return Err(parser.sc.error("No PLC elements found"));
    }
    debug!("{}", parser.lib);
    Ok(parser.lib)
}

struct Parser<'a, 's> {
    sc: Scanner<'a>,
    issues: Issues<'s>,
    lib: Library,
}

impl<'a> Parser<'a, '_> {
    fn run(&mut self) -> Result<(), ParseError> {
        let mut state = State::Header;
        loop {
            state = match state {
                State::Header => self.header()?,
                State::See if self.sc.at_end() => return Ok(()),
                State::See => self.see()?,
                State::Pou(pou) => self.pou_step(pou)?,
                State::Macro(mac) => self.macro_step(mac)?,
                State::GlobalVars(target) => self.globals_step(target)?,
                State::Type => self.type_step()?,
            };
        }
    }

    // -- Shared grammar -------------------------------------------------------

    fn notify(&mut self, message: String) -> Result<(), ParseError> {
        let issue = self.sc.error(message);
        self.issues.notify(issue)
    }

    /// Anything but blanks or a comment before the line end is an issue;
    /// the rest of the line is skipped.
    fn line_ended_after(&mut self, what: &str) -> Result<(), ParseError> {
        self.sc.skip_blanks();
        if self.sc.eat("(*") {
            skip_block_comment(&mut self.sc, "*)")?;
            self.sc.skip_blanks();
        }
        if self.sc.at_end() || self.sc.eat_line_end() {
            return Ok(());
        }
        let rest = self.sc.rest_of_line().escape_debug().to_string();
        self.notify(format!("Unexpected content after {what}: {rest}"))?;
        self.sc.skip_line();
        Ok(())
    }

    /// Skip a blank line or a comment. False if something else is next.
    fn skip_filler(&mut self) -> Result<bool, ParseError> {
        if self.sc.eat_line_end() {
            return Ok(true);
        }
        if self.sc.eat("(*") {
            skip_block_comment(&mut self.sc, "*)")?;
            return Ok(true);
        }
        Ok(false)
    }

    fn unexpected_line(&mut self, context: &str) -> Result<(), ParseError> {
        let rest = self.sc.rest_of_line().escape_debug().to_string();
        self.notify(format!("Unexpected content {context}: {rest}"))?;
        self.sc.skip_line();
        Ok(())
    }

    /// `{KEY:value}` or `{KEY:"quoted value"}`, cursor on `{`.
    fn collect_directive(&mut self) -> Result<Directive<'a>, ParseError> {
        let sc = &mut self.sc;
        sc.eat_char(b'{');
        sc.skip_blanks();
        let key = sc.collect_identifier();
        if key.is_empty() {
            return Err(sc.error("Empty directive key"));
        }
        sc.skip_blanks();
        if !sc.eat_char(b':') {
            return Err(sc.error(format!("Missing ':' after directive {key}")));
        }
        sc.skip_blanks();
        if sc.at_end() {
            return Err(sc.error(format!("Truncated directive {key}")));
        }

        let value = if sc.eat_char(b'"') {
            let (line, offset) = (sc.line(), sc.offset());
            let value = sc.collect_until_char_trimmed(b'"')?;
            if value.contains('\n') {
                return Err(ParseError::new(
                    format!("Unclosed directive {key} value ('\"' expected)"),
                    line,
                    offset,
                ));
            }
            if let Some(c) = value.chars().find(|&c| matches!(c, '<' | '>')) {
                return Err(sc.error(format!("Invalid character '{c}' in directive {key} value")));
            }
            sc.eat_char(b'"');
            value
        } else {
            sc.collect_identifier()
        };

        sc.skip_blanks();
        if !sc.eat_char(b'}') {
            return Err(sc.error(format!("Unclosed directive {key} after \"{value}\"")));
        }
        Ok(Directive { key, value })
    }

    /// Optional trailing `{DE:"..."}`; other keys are issues.
    fn collect_description(&mut self, owner: &str) -> Result<Option<&'a str>, ParseError> {
        self.sc.skip_blanks();
        if !self.sc.is_at(b'{') {
            return Ok(None);
        }
        let dir = self.collect_directive()?;
        if dir.key == "DE" {
            return Ok(Some(dir.value));
        }
        self.notify(format!("Unexpected directive {} in {owner}", dir.key))?;
        Ok(None)
    }

    /// `NAME [AT %addr] : <rest of variable>`
    fn collect_variable(&mut self) -> Result<Variable, ParseError> {
        let sc = &mut self.sc;
        sc.skip_blanks();
        let name = sc.collect_identifier();
        if name.is_empty() {
            return Err(sc.error("Variable name not found"));
        }
        sc.skip_blanks();
        if sc.is_at(b',') {
            return Err(sc.error(format!("Multiple names not supported in declaration of {name}")));
        }
        let address = if sc.eat_keyword("AT") {
            Some(self.collect_address(name)?)
        } else {
            None
        };
        self.sc.skip_blanks();
        if !self.sc.eat_char(b':') {
            return Err(self.sc.error(format!("Missing ':' after variable name {name}")));
        }
        let mut var = self.collect_rest_of_variable(name)?;
        var.address = address;
        Ok(var)
    }

    /// `%<area><subtype><index>.<subindex>`
    fn collect_address(&mut self, name: &str) -> Result<VariableAddress, ParseError> {
        let sc = &mut self.sc;
        sc.skip_blanks();
        if !sc.eat_char(b'%') {
            return Err(sc.error(format!("Missing '%' in address of {name}")));
        }
        let mut letter = || match sc.peek() {
            Some(c) if c.is_ascii_alphabetic() => {
                sc.eat_char(c);
                Ok(c as char)
            }
            _ => Err(sc.error(format!("Invalid address type in {name}"))),
        };
        let area = letter()?;
        let sub_type = letter()?;
        let index = sc.collect_digits();
        if !sc.eat_char(b'.') {
            return Err(sc.error(format!("Missing '.' in address of {name}")));
        }
        let sub_index = sc.collect_digits();
        match (index.parse(), sub_index.parse()) {
            (Ok(index), Ok(sub_index)) => Ok(VariableAddress {
                area,
                sub_type,
                index,
                sub_index,
            }),
            _ => Err(sc.error(format!("Invalid address index in {name}"))),
        }
    }

    /// `[ARRAY[first..last] OF] TYPE[[len]] [:= value] [;] [{DE:"..."}]`
    /// up to the line end.
    fn collect_rest_of_variable(&mut self, name: &str) -> Result<Variable, ParseError> {
        let sc = &mut self.sc;
        sc.skip_blanks();
        let array = if sc.eat_keyword("ARRAY") {
            sc.skip_blanks();
            if !sc.eat_char(b'[') {
                return Err(sc.error(format!("Missing '[' after ARRAY in {name}")));
            }
            let first = sc.extract_index()?;
            sc.skip_blanks();
            if !sc.eat("..") {
                return Err(sc.error(format!("Missing '..' in array range of {name}")));
            }
            let last = sc.extract_index()?;
            sc.skip_blanks();
            if sc.is_at(b',') {
                return Err(sc.error("Multidimensional arrays not yet supported"));
            }
            if !sc.eat_char(b']') {
                return Err(sc.error(format!("Missing ']' after array range of {name}")));
            }
            sc.skip_blanks();
            if !sc.eat_keyword("OF") {
                return Err(sc.error(format!("Missing OF after array range of {name}")));
            }
            sc.skip_blanks();
            Some(located(sc, ArrayRange::new(first, last))?)
        } else {
            None
        };

        let type_name = sc.collect_identifier();
        let mut var = located(sc, Variable::new(name, type_name))?;
        var.array = array;

        sc.skip_blanks();
        if sc.eat_char(b'[') {
            let length = sc.extract_index()?;
            sc.skip_blanks();
            if !sc.eat_char(b']') {
                return Err(sc.error(format!("Missing ']' after length of {name}")));
            }
            located(sc, var.set_length(length))?;
            sc.skip_blanks();
        }

        if sc.eat(":=") {
            sc.skip_blanks();
            if sc.is_at(b'[') {
                return Err(sc.error("Array initialization not yet supported"));
            }
            let (line, offset) = (sc.line(), sc.offset());
            let value = sc.collect_until_char_trimmed(b';')?;
            if value.contains('\n') {
                return Err(ParseError::new(
                    format!("Unclosed variable value of {name}"),
                    line,
                    offset,
                ));
            }
            if let Some(c) = value.chars().find(|&c| matches!(c, ':' | '=' | '<' | '>' | '"')) {
                return Err(sc.error(format!("Invalid character '{c}' in value of {name}")));
            }
            located(sc, var.set_value(value))?;
        }
        sc.skip_blanks();
        sc.eat_char(b';');

        if let Some(descr) = self.collect_description(&format!("variable {name}"))? {
            var.set_description(descr);
        }
        self.line_ended_after(&format!("variable {name}"))?;
        Ok(var)
    }

    // -- Header ---------------------------------------------------------------

    /// Leading `(* key: value *)` block; only `descr*` and `version` count.
    fn header(&mut self) -> Result<State, ParseError> {
        self.sc.skip_empty_lines();
        if !self.sc.eat("(*") {
            return Ok(State::See);
        }
        let start = self.sc.offset();
        skip_block_comment(&mut self.sc, "*)")?;
        let content = self.sc.slice_from(start);
        let content = content.strip_suffix("*)").unwrap_or(content);
        for line in content.lines() {
            if let Some(caps) = RE_HEADER_FIELD.captures(line) {
                let value = &caps[2];
                if value.is_empty() {
                    continue;
                }
                match &caps[1] {
                    key if key.starts_with("descr") => self.lib.description = value.to_string(),
                    "version" => self.lib.version = value.to_string(),
                    _ => {}
                }
            }
        }
        Ok(State::See)
    }

    // -- Top level ------------------------------------------------------------

    fn see(&mut self) -> Result<State, ParseError> {
        self.sc.skip_blanks();
        if self.sc.at_end() || self.skip_filler()? {
            return Ok(State::See);
        }
        for kind in [PouKind::Program, PouKind::FunctionBlock, PouKind::Function] {
            if self.sc.eat_keyword(kind.keyword()) {
                return self.open_pou(kind);
            }
        }
        if self.sc.eat_keyword("MACRO") {
            return self.open_macro();
        }
        if self.sc.eat_keyword("TYPE") {
            self.line_ended_after("TYPE")?;
            return Ok(State::Type);
        }
        if self.sc.eat_keyword("VAR_GLOBAL") {
            return self.open_globals();
        }
        self.unexpected_line("at top level")?;
        Ok(State::See)
    }

    // -- POU ------------------------------------------------------------------

    fn open_pou(&mut self, kind: PouKind) -> Result<State, ParseError> {
        let kw = kind.keyword();
        let sc = &mut self.sc;
        sc.skip_blanks();
        let name = sc.collect_identifier();
        if name.is_empty() {
            return Err(sc.error(format!("No name found for {kw}")));
        }
        let mut pou = located(sc, Pou::new(name))?;
        sc.skip_blanks();
        if sc.eat_char(b':') {
            sc.skip_blanks();
            let ret = sc.collect_until_char_trimmed(b'\n')?;
            if ret.is_empty() {
                return Err(sc.error(format!("Empty return type of {kw} {name}")));
            }
            if kind != PouKind::Function {
                return Err(sc.error(format!("Return type specified in {kw} {name}")));
            }
            pou.return_type = Some(ret.to_string());
        } else if kind == PouKind::Function {
            return Err(sc.error(format!("Return type not specified in {kw} {name}")));
        }
        self.line_ended_after(&format!("{kw} {name}"))?;
        Ok(State::Pou(Box::new(PouState {
            kind,
            pou,
            phase: PouPhase::Header,
        })))
    }

    fn pou_step(&mut self, mut st: Box<PouState>) -> Result<State, ParseError> {
        let (kw, end_kw) = (st.kind.keyword(), st.kind.end_keyword());
        match st.phase {
            PouPhase::Header => {
                self.sc.skip_blanks();
                if self.sc.at_end() {
                    return Err(self.sc.error(format!("{kw} {} not closed by {end_kw}", st.pou.name)));
                }
                if self.skip_filler()? {
                    return Ok(State::Pou(st));
                }
                if self.sc.is_at(b'{') {
                    let dir = self.collect_directive()?;
                    match dir.key {
                        "DE" if st.pou.description.is_some() => {
                            self.notify(format!("{kw} {} has already a description", st.pou.name))?;
                        }
                        "DE" => st.pou.description = Some(dir.value.to_string()),
                        "CODE" => {
                            st.pou.code_type = dir.value.to_string();
                            st.phase = PouPhase::Body;
                        }
                        key => self.notify(format!("Unexpected directive {key} in {kw} {}", st.pou.name))?,
                    }
                    return Ok(State::Pou(st));
                }
                if let Some(category) = self.var_block_start()? {
                    st.phase = PouPhase::Vars(category);
                    return Ok(State::Pou(st));
                }
                if self.sc.eat_keyword(end_kw) {
                    self.notify(format!("Truncated {kw} {}", st.pou.name))?;
                    self.line_ended_after(end_kw)?;
                    return Ok(State::See);
                }
                self.unexpected_line(&format!("in {kw} {} header", st.pou.name))?;
                Ok(State::Pou(st))
            }
            PouPhase::Vars(category) => {
                self.sc.skip_blanks();
                if self.sc.at_end() {
                    return Err(self.sc.error(format!(
                        "{} of {} not closed by END_VAR",
                        category.keyword(),
                        st.pou.name
                    )));
                }
                if self.skip_filler()? {
                    return Ok(State::Pou(st));
                }
                if self.sc.eat_keyword("END_VAR") {
                    self.line_ended_after("END_VAR")?;
                    st.phase = PouPhase::Header;
                    return Ok(State::Pou(st));
                }
                let var = self.collect_variable()?;
                if category == VarCategory::LocalConstant && var.value.is_none() {
                    return Err(self.sc.error(format!("Value not specified for {}", var.name)));
                }
                st.pou.vars_mut(category).push(var);
                Ok(State::Pou(st))
            }
            PouPhase::Body => {
                let body = self.sc.collect_until_newline_then_keyword(end_kw)?;
                st.pou.body = body.to_string();
                self.line_ended_after(end_kw)?;
                debug!("{kw} {} collected", st.pou.name);
                self.lib.pous_mut(st.kind).push(st.pou);
                Ok(State::See)
            }
        }
    }

    /// Opening keyword of a POU variable block, with its line end.
    fn var_block_start(&mut self) -> Result<Option<VarCategory>, ParseError> {
        for category in [
            VarCategory::Input,
            VarCategory::Output,
            VarCategory::InOut,
            VarCategory::External,
        ] {
            if self.sc.eat_keyword(category.keyword()) {
                self.line_ended_after(category.keyword())?;
                return Ok(Some(category));
            }
        }
        if !self.sc.eat_keyword("VAR") {
            return Ok(None);
        }
        self.sc.skip_blanks();
        if self.sc.eat_keyword("CONSTANT") {
            self.line_ended_after("VAR CONSTANT")?;
            return Ok(Some(VarCategory::LocalConstant));
        }
        if self.sc.at_end() || self.sc.eat_line_end() {
            return Ok(Some(VarCategory::Local));
        }
        let rest = self.sc.rest_of_line().escape_debug().to_string();
        Err(self.sc.error(format!("Unexpected content after VAR: {rest}")))
    }

    // -- Macro ----------------------------------------------------------------

    fn open_macro(&mut self) -> Result<State, ParseError> {
        self.sc.skip_blanks();
        let name = self.sc.collect_identifier();
        if name.is_empty() {
            return Err(self.sc.error("No name found for MACRO"));
        }
        let mac = located(&self.sc, Macro::new(name))?;
        self.line_ended_after(&format!("MACRO {name}"))?;
        Ok(State::Macro(Box::new(MacroState {
            mac,
            phase: MacroPhase::Header,
            has_params: false,
        })))
    }

    fn macro_step(&mut self, mut st: Box<MacroState>) -> Result<State, ParseError> {
        match st.phase {
            MacroPhase::Header => {
                self.sc.skip_blanks();
                if self.sc.at_end() {
                    return Err(self.sc.error(format!("MACRO {} not closed by END_MACRO", st.mac.name)));
                }
                if self.skip_filler()? {
                    return Ok(State::Macro(st));
                }
                if self.sc.is_at(b'{') {
                    let dir = self.collect_directive()?;
                    match dir.key {
                        "DE" if st.mac.description.is_some() => {
                            self.notify(format!("MACRO {} has already a description", st.mac.name))?;
                        }
                        "DE" => st.mac.description = Some(dir.value.to_string()),
                        "CODE" => {
                            st.mac.code_type = dir.value.to_string();
                            st.phase = MacroPhase::Body;
                        }
                        key => self.notify(format!("Unexpected directive {key} in MACRO {}", st.mac.name))?,
                    }
                    return Ok(State::Macro(st));
                }
                if self.sc.eat_keyword("PAR_MACRO") {
                    if st.has_params {
                        self.notify(format!("Multiple groups of macro parameters in {}", st.mac.name))?;
                    }
                    st.has_params = true;
                    self.line_ended_after("PAR_MACRO")?;
                    st.phase = MacroPhase::Params;
                    return Ok(State::Macro(st));
                }
                if self.sc.eat_keyword("END_MACRO") {
                    self.notify(format!("Truncated MACRO {}", st.mac.name))?;
                    self.line_ended_after("END_MACRO")?;
                    return Ok(State::See);
                }
                self.unexpected_line(&format!("in MACRO {} header", st.mac.name))?;
                Ok(State::Macro(st))
            }
            MacroPhase::Params => {
                self.sc.skip_blanks();
                if self.sc.at_end() {
                    return Err(self.sc.error(format!("PAR_MACRO of {} not closed by END_PAR", st.mac.name)));
                }
                if self.skip_filler()? {
                    return Ok(State::Macro(st));
                }
                if self.sc.eat_keyword("END_PAR") {
                    self.line_ended_after("END_PAR")?;
                    st.phase = MacroPhase::Header;
                    return Ok(State::Macro(st));
                }
                if self.sc.eat_keyword("END_MACRO") {
                    self.notify(format!("Truncated params in macro {}", st.mac.name))?;
                    self.line_ended_after("END_MACRO")?;
                    return Ok(State::See);
                }
                let name = self.sc.collect_identifier();
                if name.is_empty() {
                    return Err(self.sc.error(format!("Parameter name not found in macro {}", st.mac.name)));
                }
                self.sc.skip_blanks();
                if !self.sc.eat_char(b';') {
                    return Err(self.sc.error(format!("Missing ';' after macro parameter {name}")));
                }
                let description = self.collect_description(&format!("macro parameter {name}"))?;
                self.line_ended_after(&format!("macro parameter {name}"))?;
                st.mac.parameters.push(MacroParameter {
                    name: name.to_string(),
                    description: description.filter(|d| !d.is_empty()).map(str::to_string),
                });
                Ok(State::Macro(st))
            }
            MacroPhase::Body => {
                let body = self.sc.collect_until_newline_then_keyword("END_MACRO")?;
                st.mac.body = body.to_string();
                self.line_ended_after("END_MACRO")?;
                debug!("MACRO {} collected", st.mac.name);
                self.lib.macros.push(st.mac);
                Ok(State::See)
            }
        }
    }

    // -- Global variables -----------------------------------------------------

    fn open_globals(&mut self) -> Result<State, ParseError> {
        self.sc.skip_blanks();
        if self.sc.eat_keyword("CONSTANT") {
            self.line_ended_after("VAR_GLOBAL CONSTANT")?;
            return Ok(State::GlobalVars(GlobalTarget::Constants));
        }
        if self.sc.eat_keyword("RETAIN") {
            return Err(self.sc.error("RETAIN variables not supported"));
        }
        if self.sc.at_end() || self.sc.eat_line_end() {
            return Ok(State::GlobalVars(GlobalTarget::Variables));
        }
        let rest = self.sc.rest_of_line().escape_debug().to_string();
        Err(self.sc.error(format!("Unexpected content in VAR_GLOBAL declaration: {rest}")))
    }

    fn globals_step(&mut self, target: GlobalTarget) -> Result<State, ParseError> {
        self.sc.skip_blanks();
        if self.sc.at_end() {
            return Err(self.sc.error("VAR_GLOBAL not closed by END_VAR"));
        }
        if self.skip_filler()? {
            return Ok(State::GlobalVars(target));
        }
        if self.sc.eat_keyword("END_VAR") {
            self.line_ended_after("END_VAR")?;
            return Ok(State::See);
        }
        if self.sc.is_at(b'{') {
            let dir = self.collect_directive()?;
            if dir.key == "G" {
                if dir.value.contains(' ') {
                    self.notify(format!("Avoid spaces in var group name \"{}\"", dir.value))?;
                }
                self.groups(target).push_group(dir.value);
            } else {
                self.notify(format!("Unexpected directive {} in global variables", dir.key))?;
            }
            self.line_ended_after("group directive")?;
            return Ok(State::GlobalVars(target));
        }
        let var = self.collect_variable()?;
        if matches!(target, GlobalTarget::Constants) && var.value.is_none() {
            return Err(self.sc.error(format!("Value not specified for variable {}", var.name)));
        }
        self.groups(target).current().variables.push(var);
        Ok(State::GlobalVars(target))
    }

    fn groups(&mut self, target: GlobalTarget) -> &mut VariableGroups {
        match target {
            GlobalTarget::Variables => &mut self.lib.global_variables,
            GlobalTarget::Constants => &mut self.lib.global_constants,
        }
    }

    // -- Types ----------------------------------------------------------------

    fn type_step(&mut self) -> Result<State, ParseError> {
        self.sc.skip_blanks();
        if self.sc.at_end() {
            return Err(self.sc.error("TYPE not closed by END_TYPE"));
        }
        if self.skip_filler()? {
            return Ok(State::Type);
        }
        if self.sc.eat_keyword("END_TYPE") {
            self.line_ended_after("END_TYPE")?;
            return Ok(State::See);
        }
        let name = self.sc.collect_identifier();
        if name.is_empty() {
            self.unexpected_line("instead of type name")?;
            return Ok(State::Type);
        }
        self.sc.skip_blanks();
        if !self.sc.eat_char(b':') {
            return Err(self.sc.error(format!("Missing ':' after type name {name}")));
        }
        self.sc.skip_blanks();

        if self.sc.eat_keyword("STRUCT") {
            self.collect_struct(name)?;
        } else if self.sc.is_at(b'(') {
            self.collect_enum(name)?;
        } else if self.subrange_ahead() {
            self.collect_subrange(name)?;
        } else {
            let var = self.collect_rest_of_variable(name)?;
            let typedef = located(&self.sc, TypeDef::try_from(var))?;
            debug!("typedef {} collected", typedef.name);
            self.lib.typedefs.push(typedef);
        }
        Ok(State::Type)
    }

    /// A `(` before any `;`, `{` or line end marks a subrange.
    fn subrange_ahead(&self) -> bool {
        self.sc
            .rest_of_line()
            .bytes()
            .find(|&c| matches!(c, b';' | b'(' | b'{'))
            == Some(b'(')
    }

    /// `STRUCT [{DE:"..."}]` members `END_STRUCT;`
    fn collect_struct(&mut self, name: &str) -> Result<(), ParseError> {
        let mut strct = located(&self.sc, Struct::new(name))?;
        if let Some(descr) = self.collect_description(&format!("struct {name}"))? {
            strct.description = Some(descr.to_string()).filter(|d| !d.is_empty());
        }
        self.line_ended_after(&format!("STRUCT {name}"))?;
        loop {
            self.sc.skip_blanks();
            if self.sc.at_end() {
                return Err(self.sc.error(format!("STRUCT {name} not closed by END_STRUCT")));
            }
            if self.skip_filler()? {
                continue;
            }
            if self.sc.eat_keyword("END_STRUCT") {
                self.sc.skip_blanks();
                if !self.sc.eat_char(b';') {
                    return Err(self.sc.error(format!("Missing ';' after END_STRUCT of {name}")));
                }
                self.line_ended_after("END_STRUCT")?;
                break;
            }
            let member = self.collect_variable()?;
            if member.address.is_some() {
                return Err(self.sc.error(format!("Struct member {} cannot have an address", member.name)));
            }
            strct.members.push(member);
        }
        debug!("struct {name} collected");
        self.lib.structs.push(strct);
        Ok(())
    }

    /// `( [{DE:"..."}]` elements `NAME := VALUE[,] [{DE:"..."}]` `);`
    fn collect_enum(&mut self, name: &str) -> Result<(), ParseError> {
        let mut en = located(&self.sc, Enum::new(name))?;
        self.sc.eat_char(b'(');
        self.sc.skip_blanks();
        if !self.sc.is_at(b'{') {
            // the description may sit on the line after '('
            self.sc.eat_line_end();
        }
        if let Some(descr) = self.collect_description(&format!("enum {name}"))? {
            en.description = Some(descr.to_string()).filter(|d| !d.is_empty());
        }
        let mut awaiting_close = false;
        loop {
            self.sc.skip_empty_lines();
            if self.sc.at_end() {
                return Err(self.sc.error(format!("Enum {name} not closed by ');'")));
            }
            if self.sc.eat("(*") {
                skip_block_comment(&mut self.sc, "*)")?;
                continue;
            }
            if self.sc.eat_char(b')') {
                self.sc.skip_blanks();
                if !self.sc.eat_char(b';') {
                    return Err(self.sc.error(format!("Missing ';' after enum {name}")));
                }
                self.line_ended_after(&format!("enum {name}"))?;
                break;
            }
            if awaiting_close {
                return Err(self.sc.error(format!("Missing ',' between elements of enum {name}")));
            }

            let elem_name = self.sc.collect_identifier();
            if elem_name.is_empty() {
                return Err(self.sc.error(format!("Element name not found in enum {name}")));
            }
            self.sc.skip_blanks();
            if !self.sc.eat(":=") {
                return Err(self.sc.error(format!("Value not specified for enum element {elem_name}")));
            }
            self.sc.skip_blanks();
            let value = self.sc.collect_numeric_literal();
            let mut element = located(&self.sc, EnumElement::new(elem_name, value))?;
            self.sc.skip_blanks();
            awaiting_close = !self.sc.eat_char(b',');
            if let Some(descr) = self.collect_description(&format!("enum element {elem_name}"))? {
                element.description = Some(descr.to_string()).filter(|d| !d.is_empty());
            }
            self.line_ended_after(&format!("enum element {elem_name}"))?;
            en.elements.push(element);
        }
        debug!("enum {name} collected");
        self.lib.enums.push(en);
        Ok(())
    }

    /// `TYPE (min..max); [{DE:"..."}]`
    fn collect_subrange(&mut self, name: &str) -> Result<(), ParseError> {
        let sc = &mut self.sc;
        let type_name = sc.collect_identifier();
        sc.skip_blanks();
        if !sc.eat_char(b'(') {
            return Err(sc.error(format!("Missing '(' in subrange {name}")));
        }
        let min = sc.extract_integer()?;
        sc.skip_blanks();
        if !sc.eat("..") {
            return Err(sc.error(format!("Missing '..' in subrange {name}")));
        }
        let max = sc.extract_integer()?;
        sc.skip_blanks();
        if !sc.eat_char(b')') {
            return Err(sc.error(format!("Missing ')' in subrange {name}")));
        }
        sc.skip_blanks();
        if !sc.eat_char(b';') {
            return Err(sc.error(format!("Missing ';' after subrange {name}")));
        }
        let mut subrange = located(sc, Subrange::new(name, type_name, min, max))?;
        if let Some(descr) = self.collect_description(&format!("subrange {name}"))? {
            subrange.description = Some(descr.to_string()).filter(|d| !d.is_empty());
        }
        self.line_ended_after(&format!("subrange {name}"))?;
        debug!("subrange {name} collected");
        self.lib.subranges.push(subrange);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> (Library, Vec<String>) {
        let mut issues = Vec::new();
        let lib = parse("lib", text, &mut issues, false).unwrap();
        (lib, issues)
    }

    fn parse_err(text: &str) -> ParseError {
        let mut issues = Vec::new();
        parse("lib", text, &mut issues, false).unwrap_err()
    }

    fn globals(decl: &str) -> String {
        format!("VAR_GLOBAL\n{decl}\nEND_VAR\n")
    }

    #[test]
    fn header_sets_description_and_version() {
        let text = "\n(*\n    name: lib\n    descr: Some library\n    version: 1.2.3\n    author: someone\n*)\n\n\
                    VAR_GLOBAL\n\tx : INT;\nEND_VAR\n";
        let (lib, issues) = parse_ok(text);
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(lib.description, "Some library");
        assert_eq!(lib.version, "1.2.3");
    }

    #[test]
    fn empty_header_fields_keep_defaults() {
        let text = "(*\n    descr:\n    version:   \n*)\nVAR_GLOBAL\n\tx : INT;\nEND_VAR\n";
        let (lib, _) = parse_ok(text);
        let defaults = Library::new("lib");
        assert_eq!(lib.description, defaults.description);
        assert_eq!(lib.version, defaults.version);
    }

    #[test]
    fn global_variable_declaration() {
        let (lib, issues) =
            parse_ok(&globals("\tvaName AT %MB700.12 : STRING[ 80 ]; { DE:\"a name\" }"));
        assert!(issues.is_empty(), "{issues:?}");
        let var = &lib.global_variables.groups[0].variables[0];
        assert_eq!(var.name, "vaName");
        assert_eq!(var.type_name, "STRING");
        assert_eq!(var.length, Some(80));
        assert_eq!(var.address.map(|a| a.to_string()).as_deref(), Some("%MB700.12"));
        assert_eq!(var.description.as_deref(), Some("a name"));
    }

    #[test]
    fn global_groups() {
        let text = "VAR_GLOBAL\n\ta : BOOL;\n\t{G:\"First\"}\n\tb : INT;\n\tc : INT;\n\t{G:\"Second\"}\n\td : DINT := 5;\nEND_VAR\n";
        let (lib, _) = parse_ok(text);
        let groups = &lib.global_variables.groups;
        let shape: Vec<_> = groups.iter().map(|g| (g.name.as_str(), g.variables.len())).collect();
        assert_eq!(shape, [("", 1), ("First", 2), ("Second", 1)]);
        assert_eq!(groups[2].variables[0].value.as_deref(), Some("5"));
    }

    #[test]
    fn group_name_with_spaces_is_an_issue() {
        let (lib, issues) = parse_ok(&globals("\t{G:\"my group\"}\n\ta : BOOL;"));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].starts_with("Avoid spaces in var group name"));
        assert_eq!(lib.global_variables.groups[0].name, "my group");
    }

    #[test]
    fn arrays() {
        let (lib, _) = parse_ok(&globals("\tarr : ARRAY[ 0..0 ] OF INT;\n\tbig : ARRAY[2..11] OF STRING[32];"));
        let vars = &lib.global_variables.groups[0].variables;
        assert_eq!(vars[0].array, Some(ArrayRange { first: 0, len: 1 }));
        assert_eq!(vars[1].array, Some(ArrayRange { first: 2, len: 10 }));
        assert_eq!(vars[1].length, Some(32));
    }

    #[test]
    fn inverted_array_range_raises() {
        let err = parse_err(&globals("\tarr : ARRAY[5..3] OF INT;"));
        assert_eq!(err.message, "Invalid array range 5..3");
    }

    #[test]
    fn unsupported_declarations_raise() {
        let cases = [
            ("\tm : ARRAY[0..1, 0..1] OF INT;", "Multidimensional arrays not yet supported"),
            ("\ta : ARRAY[0..1] OF INT := [1, 2];", "Array initialization not yet supported"),
            ("\ta, b : INT;", "Multiple names not supported in declaration of a"),
            ("\ts : STRING[1];", "Invalid length 1"),
            ("\tv : INT := a:b;", "Invalid character ':' in value of v"),
            ("\tv : INT := ;", "Empty value for v"),
            ("\tv : INT := 3\n\tw : INT;", "Unclosed variable value of v"),
            ("\tv : ARRAY[-1..3] OF INT;", "Negative index"),
            (
                "\tx : ARRAY[0..18446744073709551615] OF INT;",
                "Invalid array range 0..18446744073709551615",
            ),
            ("\tv AT MB300.1 : INT;", "Missing '%' in address of v"),
            ("\tv AT %MB300 : INT;", "Missing '.' in address of v"),
            ("\tv AT %MB99999.1 : INT;", "Invalid address index in v"),
            ("\tv INT;", "Missing ':' after variable name v"),
        ];
        for (decl, message) in cases {
            assert_eq!(parse_err(&globals(decl)).message, message, "{decl}");
        }
    }

    #[test]
    fn escaped_quote_in_directive_raises() {
        let err = parse_err(&globals("\tv : INT; { DE:\"a \\\"quote\\\"\" }"));
        assert!(err.message.starts_with("Unclosed directive DE"), "{}", err.message);
    }

    #[test]
    fn directive_errors() {
        let cases = [
            ("\tv : INT; { :\"x\" }", "Empty directive key"),
            ("\tv : INT; { DE \"x\" }", "Missing ':' after directive DE"),
            ("\tv : INT; { DE:\"a <b>\" }", "Invalid character '<' in directive DE value"),
            ("\tv : INT; { DE:\"open\n\tw : INT; { DE:\"x\" }", "Unclosed directive DE value ('\"' expected)"),
        ];
        for (decl, message) in cases {
            assert_eq!(parse_err(&globals(decl)).message, message, "{decl}");
        }
    }

    #[test]
    fn unknown_directive_is_an_issue() {
        let (_, issues) = parse_ok(&globals("\tv : INT; { XX:\"x\" }"));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].starts_with("Unexpected directive XX in variable v"));
    }

    #[test]
    fn constants_need_a_value() {
        let text = "VAR_GLOBAL CONSTANT\n\tK : INT;\nEND_VAR\n";
        for strict in [false, true] {
            let mut issues = Vec::new();
            let err = parse("lib", text, &mut issues, strict).unwrap_err();
            assert_eq!(err.message, "Value not specified for variable K");
        }
    }

    #[test]
    fn retain_is_unsupported() {
        let err = parse_err("VAR_GLOBAL RETAIN\n\tx : INT;\nEND_VAR\n");
        assert_eq!(err.message, "RETAIN variables not supported");
    }

    #[test]
    fn unclosed_global_block() {
        let err = parse_err("VAR_GLOBAL\n\tx : INT;\n");
        assert_eq!(err.message, "VAR_GLOBAL not closed by END_VAR");
    }

    #[test]
    fn pous() {
        let text = "\
FUNCTION_BLOCK Counter
{ DE:\"counts\" }
\tVAR_INPUT
\tstep : INT; { DE:\"increment\" }
\tEND_VAR
\tVAR_OUTPUT
\tcount : DINT;
\tEND_VAR
\tVAR CONSTANT
\tLIMIT : DINT := 1000;
\tEND_VAR
\t{ CODE:ST }
count := count + step;
END_FUNCTION_BLOCK

FUNCTION Twice : INT
\tVAR_INPUT
\tx : INT;
\tEND_VAR
\t{ CODE:ST }
Twice := 2 * x;
END_FUNCTION

PROGRAM Main
\tVAR
\tc : Counter;
\tEND_VAR
\t{ CODE:ST }
c(step := 1);
END_PROGRAM
";
        let (lib, issues) = parse_ok(text);
        assert!(issues.is_empty(), "{issues:?}");

        let fb = &lib.function_blocks[0];
        assert_eq!(fb.name, "Counter");
        assert_eq!(fb.description.as_deref(), Some("counts"));
        assert_eq!(fb.input_vars[0].description.as_deref(), Some("increment"));
        assert_eq!(fb.output_vars[0].type_name, "DINT");
        assert_eq!(fb.local_constants[0].value.as_deref(), Some("1000"));
        assert_eq!(fb.code_type, "ST");
        assert_eq!(fb.body, "\ncount := count + step;\n");

        let fun = &lib.functions[0];
        assert_eq!(fun.return_type.as_deref(), Some("INT"));
        assert_eq!(fun.input_vars.len(), 1);

        assert_eq!(lib.programs[0].local_vars[0].type_name, "Counter");
        assert_eq!(lib.check(), Ok(()));
    }

    #[test]
    fn function_return_type_rules() {
        let err = parse_err("FUNCTION f\n\t{ CODE:ST }\nf := 1;\nEND_FUNCTION\n");
        assert_eq!(err.message, "Return type not specified in FUNCTION f");
        let err = parse_err("PROGRAM p : INT\n\t{ CODE:ST }\nEND_PROGRAM\n");
        assert_eq!(err.message, "Return type specified in PROGRAM p");
    }

    #[test]
    fn truncated_pou_is_dropped() {
        let text = "PROGRAM p\n\tVAR\n\tx : INT;\n\tEND_VAR\nEND_PROGRAM\nVAR_GLOBAL\n\ty : INT;\nEND_VAR\n";
        let (lib, issues) = parse_ok(text);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].starts_with("Truncated PROGRAM p"));
        assert!(lib.programs.is_empty());
        assert_eq!(lib.global_variables.var_count(), 1);

        let mut issues = Vec::new();
        assert!(parse("lib", text, &mut issues, true).is_err());
    }

    #[test]
    fn unclosed_pou() {
        let err = parse_err("PROGRAM p\n\tVAR\n");
        assert_eq!(err.message, "VAR of p not closed by END_VAR");
        let err = parse_err("PROGRAM p\n");
        assert_eq!(err.message, "PROGRAM p not closed by END_PROGRAM");
        let err = parse_err("PROGRAM p\n\t{ CODE:ST }\nx := 1;\n");
        assert_eq!((err.message.as_str(), err.line), ("Unclosed content (\"END_PROGRAM\" expected)", 2));
    }

    #[test]
    fn second_description_is_an_issue() {
        let text = "PROGRAM p\n{ DE:\"one\" }\n{ DE:\"two\" }\n\t{ CODE:ST }\nEND_PROGRAM\n";
        let (lib, issues) = parse_ok(text);
        assert_eq!(issues.len(), 1);
        assert_eq!(lib.programs[0].description.as_deref(), Some("one"));
    }

    #[test]
    fn macros() {
        let text = "\
MACRO CLAMP
{ DE:\"clamp a value\" }
\tPAR_MACRO
\tv; { DE:\"value\" }
\tlo;
\tEND_PAR
\t{ CODE:ST }
IF v < lo THEN v := lo; END_IF;
END_MACRO
";
        let (lib, issues) = parse_ok(text);
        assert!(issues.is_empty(), "{issues:?}");
        let mac = &lib.macros[0];
        assert_eq!(mac.name, "CLAMP");
        assert_eq!(mac.description.as_deref(), Some("clamp a value"));
        let params: Vec<_> = mac.parameters.iter().map(|p| (p.name.as_str(), p.description.as_deref())).collect();
        assert_eq!(params, [("v", Some("value")), ("lo", None)]);
        assert_eq!(mac.body, "\nIF v < lo THEN v := lo; END_IF;\n");
    }

    #[test]
    fn macro_parameter_needs_semicolon() {
        let err = parse_err("MACRO M\n\tPAR_MACRO\n\tv\n\tEND_PAR\n");
        assert_eq!(err.message, "Missing ';' after macro parameter v");
    }

    #[test]
    fn types() {
        let text = "\
TYPE
\tPoint : STRUCT { DE:\"a point\" }
\t\tx : LREAL; { DE:\"abscissa\" }
\t\ty : LREAL;
\tEND_STRUCT;
\tColor : (
\t\tRED := 0, { DE:\"red\" }
\t\tGREEN := 1,
\t\tBLUE := -2
\t);
\tT1 : DINT (0..100);
\tName : STRING[ 40 ]; { DE:\"a name\" }
\tBuffer : ARRAY[ 1..8 ] OF BYTE;
END_TYPE
";
        let (lib, issues) = parse_ok(text);
        assert!(issues.is_empty(), "{issues:?}");

        let point = &lib.structs[0];
        assert_eq!(point.description.as_deref(), Some("a point"));
        assert_eq!(point.members.len(), 2);
        assert_eq!(point.members[0].description.as_deref(), Some("abscissa"));

        let color = &lib.enums[0];
        let elems: Vec<_> = color.elements.iter().map(|e| (e.name.as_str(), e.value.as_str())).collect();
        assert_eq!(elems, [("RED", "0"), ("GREEN", "1"), ("BLUE", "-2")]);
        assert_eq!(color.elements[0].description.as_deref(), Some("red"));

        assert_eq!(
            lib.subranges,
            [Subrange {
                name: "T1".into(),
                type_name: "DINT".into(),
                min: 0,
                max: 100,
                description: None
            }]
        );

        assert_eq!(lib.typedefs.len(), 2);
        assert_eq!(lib.typedefs[0].length, Some(40));
        assert_eq!(lib.typedefs[1].array, Some(ArrayRange { first: 1, len: 8 }));
    }

    #[test]
    fn enum_description_on_next_line() {
        let text = "TYPE\n\tE : (\n\t{ DE:\"an enum\" }\n\t\tA := 0,\n\t\tB := 1\n\t);\nEND_TYPE\n";
        let (lib, issues) = parse_ok(text);
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(lib.enums[0].description.as_deref(), Some("an enum"));
        assert_eq!(lib.enums[0].elements.len(), 2);
    }

    #[test]
    fn type_errors() {
        let wrap = |body: &str| format!("TYPE\n{body}\nEND_TYPE\n");
        let cases = [
            ("\tR : INT (5..1);", "Invalid range 5..1"),
            ("\tT : INT := 3;", "Typedef T cannot have a value"),
            ("\tS : STRUCT\n\t\tm AT %MB300.1 : INT;\n\tEND_STRUCT;", "Struct member m cannot have an address"),
            ("\tE : (\n\t\tA := 1\n\t\tB := 2\n\t);", "Missing ',' between elements of enum E"),
            ("\tE : (\n\t\tA 1\n\t);", "Value not specified for enum element A"),
            ("\tT INT;", "Missing ':' after type name T"),
        ];
        for (body, message) in cases {
            assert_eq!(parse_err(&wrap(body)).message, message, "{body}");
        }
        assert_eq!(parse_err("TYPE\n\tT : INT;\n").message, "TYPE not closed by END_TYPE");
    }

    #[test]
    fn unexpected_top_level_content() {
        let (lib, issues) = parse_ok(&format!("garbage here\n{}", globals("\tx : INT;")));
        assert_eq!(issues, ["Unexpected content at top level: garbage here (line 1, offset 0)"]);
        assert_eq!(lib.global_variables.var_count(), 1);
    }

    #[test]
    fn trailing_comment_after_declaration() {
        let (_, issues) = parse_ok(&globals("\tx : INT; (* note *)\n\t(* whole line *)"));
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn empty_library_fails() {
        assert_eq!(parse_err("(* just a comment *)\n").message, "No PLC elements found");
    }
}
