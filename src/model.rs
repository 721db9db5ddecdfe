//! Library document model, shared by every parser and writer.

use crate::error::{CheckError, ModelError};
use std::fmt;

/// IEC 61131-3 elementary numeric types.
pub const NUMERIC_TYPES: &[&str] = &[
    "BOOL", "SINT", "INT", "DINT", "LINT", "USINT", "UINT", "UDINT", "ULINT", "REAL", "LREAL",
    "BYTE", "WORD", "DWORD", "LWORD",
];

pub fn is_numeric_type(name: &str) -> bool {
    NUMERIC_TYPES.contains(&name)
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn require_name(name: &str, what: &'static str) -> Result<String, ModelError> {
    non_empty(name).ok_or(ModelError::EmptyName(what))
}

// -- Variables ----------------------------------------------------------------

/// Fixed PLC memory location, e.g. `%MB700.320`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableAddress {
    pub area: char,
    pub sub_type: char,
    pub index: u16,
    pub sub_index: u16,
}

impl fmt::Display for VariableAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}{}{}.{}", self.area, self.sub_type, self.index, self.sub_index)
    }
}

/// Single-dimension array bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayRange {
    pub first: usize,
    /// Element count, at least 1
    pub len: usize,
}

impl ArrayRange {
    pub fn new(first: usize, last: usize) -> Result<Self, ModelError> {
        let len = last
            .checked_sub(first)
            .and_then(|span| span.checked_add(1))
            .ok_or(ModelError::InvalidArrayRange { first, last })?;
        Ok(Self { first, len })
    }

    pub fn last(&self) -> usize {
        self.first + self.len - 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub type_name: String,
    pub address: Option<VariableAddress>,
    /// `STRING[N]` length
    pub length: Option<usize>,
    pub array: Option<ArrayRange>,
    pub value: Option<String>,
    pub description: Option<String>,
}

impl Variable {
    pub fn new(name: &str, type_name: &str) -> Result<Self, ModelError> {
        let name = require_name(name, "variable")?;
        if type_name.is_empty() {
            return Err(ModelError::EmptyType(name));
        }
        Ok(Self {
            name,
            type_name: type_name.to_string(),
            ..Self::default()
        })
    }

    pub fn set_length(&mut self, length: usize) -> Result<(), ModelError> {
        if length <= 1 {
            return Err(ModelError::InvalidLength(length));
        }
        self.length = Some(length);
        Ok(())
    }

    pub fn set_value(&mut self, value: &str) -> Result<(), ModelError> {
        if value.is_empty() {
            return Err(ModelError::EmptyValue(self.name.clone()));
        }
        self.value = Some(value.to_string());
        Ok(())
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = non_empty(description);
    }
}

/// Optionally named run of variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableGroup {
    pub name: String,
    pub variables: Vec<Variable>,
}

impl VariableGroup {
    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableGroups {
    pub groups: Vec<VariableGroup>,
}

impl VariableGroups {
    pub fn push_group(&mut self, name: &str) -> &mut VariableGroup {
        self.groups.push(VariableGroup {
            name: name.to_string(),
            variables: Vec::new(),
        });
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    /// Last group, opening an unnamed one if there is none yet.
    pub fn current(&mut self) -> &mut VariableGroup {
        if self.groups.is_empty() {
            return self.push_group("");
        }
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.groups.iter().flat_map(|g| g.variables.iter())
    }

    pub fn var_count(&self) -> usize {
        self.groups.iter().map(|g| g.variables.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.var_count() == 0
    }

    pub fn has_named_group(&self) -> bool {
        self.groups.iter().any(VariableGroup::is_named)
    }

    fn sort(&mut self) {
        self.groups.sort_by(|a, b| a.name.cmp(&b.name));
        for group in &mut self.groups {
            group.variables.sort_by(|a, b| a.name.cmp(&b.name));
        }
    }
}

// -- Types --------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Struct {
    pub name: String,
    pub description: Option<String>,
    /// Never carry an address
    pub members: Vec<Variable>,
}

impl Struct {
    pub fn new(name: &str) -> Result<Self, ModelError> {
        Ok(Self {
            name: require_name(name, "struct")?,
            ..Self::default()
        })
    }
}

/// Named alias of a type, built from a variable declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub name: String,
    pub type_name: String,
    pub length: Option<usize>,
    pub array: Option<ArrayRange>,
    pub description: Option<String>,
}

impl TryFrom<Variable> for TypeDef {
    type Error = ModelError;

    fn try_from(var: Variable) -> Result<Self, Self::Error> {
        if var.value.is_some() {
            return Err(ModelError::TypedefWithValue(var.name));
        }
        if var.address.is_some() {
            return Err(ModelError::TypedefWithAddress(var.name));
        }
        Ok(Self {
            name: var.name,
            type_name: var.type_name,
            length: var.length,
            array: var.array,
            description: var.description,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumElement {
    pub name: String,
    pub value: String,
    pub description: Option<String>,
}

impl EnumElement {
    pub fn new(name: &str, value: &str) -> Result<Self, ModelError> {
        let name = require_name(name, "enum element")?;
        if value.is_empty() {
            return Err(ModelError::EmptyValue(name));
        }
        Ok(Self {
            name,
            value: value.to_string(),
            description: None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enum {
    pub name: String,
    pub description: Option<String>,
    pub elements: Vec<EnumElement>,
}

impl Enum {
    pub fn new(name: &str) -> Result<Self, ModelError> {
        Ok(Self {
            name: require_name(name, "enum")?,
            ..Self::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subrange {
    pub name: String,
    pub type_name: String,
    pub min: i64,
    pub max: i64,
    pub description: Option<String>,
}

impl Subrange {
    pub fn new(name: &str, type_name: &str, min: i64, max: i64) -> Result<Self, ModelError> {
        let name = require_name(name, "subrange")?;
        if type_name.is_empty() {
            return Err(ModelError::EmptyType(name));
        }
        if max < min {
            return Err(ModelError::InvalidRange { min, max });
        }
        Ok(Self {
            name,
            type_name: type_name.to_string(),
            min,
            max,
            description: None,
        })
    }
}

// -- Program organization units -----------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PouKind {
    Program,
    FunctionBlock,
    Function,
}

impl PouKind {
    pub fn keyword(self) -> &'static str {
        match self {
            PouKind::Program => "PROGRAM",
            PouKind::FunctionBlock => "FUNCTION_BLOCK",
            PouKind::Function => "FUNCTION",
        }
    }

    pub fn end_keyword(self) -> &'static str {
        match self {
            PouKind::Program => "END_PROGRAM",
            PouKind::FunctionBlock => "END_FUNCTION_BLOCK",
            PouKind::Function => "END_FUNCTION",
        }
    }
}

/// The six variable lists of a POU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarCategory {
    InOut,
    Input,
    Output,
    External,
    Local,
    LocalConstant,
}

impl VarCategory {
    pub const ALL: [VarCategory; 6] = [
        VarCategory::InOut,
        VarCategory::Input,
        VarCategory::Output,
        VarCategory::External,
        VarCategory::Local,
        VarCategory::LocalConstant,
    ];

    /// Opening keyword of the declaration block.
    pub fn keyword(self) -> &'static str {
        match self {
            VarCategory::InOut => "VAR_IN_OUT",
            VarCategory::Input => "VAR_INPUT",
            VarCategory::Output => "VAR_OUTPUT",
            VarCategory::External => "VAR_EXTERNAL",
            VarCategory::Local => "VAR",
            VarCategory::LocalConstant => "VAR CONSTANT",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VarCategory::InOut => "inout",
            VarCategory::Input => "input",
            VarCategory::Output => "output",
            VarCategory::External => "external",
            VarCategory::Local => "local",
            VarCategory::LocalConstant => "local constant",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pou {
    pub name: String,
    pub description: Option<String>,
    /// Functions only
    pub return_type: Option<String>,
    pub inout_vars: Vec<Variable>,
    pub input_vars: Vec<Variable>,
    pub output_vars: Vec<Variable>,
    pub external_vars: Vec<Variable>,
    pub local_vars: Vec<Variable>,
    pub local_constants: Vec<Variable>,
    /// e.g. "ST"
    pub code_type: String,
    /// Opaque source text
    pub body: String,
}

impl Pou {
    pub fn new(name: &str) -> Result<Self, ModelError> {
        Ok(Self {
            name: require_name(name, "POU")?,
            ..Self::default()
        })
    }

    pub fn vars(&self, category: VarCategory) -> &Vec<Variable> {
        match category {
            VarCategory::InOut => &self.inout_vars,
            VarCategory::Input => &self.input_vars,
            VarCategory::Output => &self.output_vars,
            VarCategory::External => &self.external_vars,
            VarCategory::Local => &self.local_vars,
            VarCategory::LocalConstant => &self.local_constants,
        }
    }

    pub fn vars_mut(&mut self, category: VarCategory) -> &mut Vec<Variable> {
        match category {
            VarCategory::InOut => &mut self.inout_vars,
            VarCategory::Input => &mut self.input_vars,
            VarCategory::Output => &mut self.output_vars,
            VarCategory::External => &mut self.external_vars,
            VarCategory::Local => &mut self.local_vars,
            VarCategory::LocalConstant => &mut self.local_constants,
        }
    }

    /// First non-empty category among those a caller forbids.
    fn first_used(&self, categories: &[VarCategory]) -> Option<VarCategory> {
        categories.iter().copied().find(|&c| !self.vars(c).is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroParameter {
    pub name: String,
    pub description: Option<String>,
}

/// Textual expansion with untyped parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Macro {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Vec<MacroParameter>,
    pub code_type: String,
    pub body: String,
}

impl Macro {
    pub fn new(name: &str) -> Result<Self, ModelError> {
        Ok(Self {
            name: require_name(name, "macro")?,
            ..Self::default()
        })
    }
}

// -- Library ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub name: String,
    pub version: String,
    pub description: String,

    pub global_constants: VariableGroups,
    pub global_retainvars: VariableGroups,
    pub global_variables: VariableGroups,

    pub programs: Vec<Pou>,
    pub function_blocks: Vec<Pou>,
    pub functions: Vec<Pou>,
    pub macros: Vec<Macro>,
    pub structs: Vec<Struct>,
    pub typedefs: Vec<TypeDef>,
    pub enums: Vec<Enum>,
    pub subranges: Vec<Subrange>,
}

/// Categories a function or program may not declare.
const OUTPUT_CATEGORIES: [VarCategory; 3] =
    [VarCategory::Output, VarCategory::InOut, VarCategory::External];

impl Library {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: "PLC library".to_string(),
            global_constants: VariableGroups::default(),
            global_retainvars: VariableGroups::default(),
            global_variables: VariableGroups::default(),
            programs: Vec::new(),
            function_blocks: Vec::new(),
            functions: Vec::new(),
            macros: Vec::new(),
            structs: Vec::new(),
            typedefs: Vec::new(),
            enums: Vec::new(),
            subranges: Vec::new(),
        }
    }

    pub fn pous(&self, kind: PouKind) -> &Vec<Pou> {
        match kind {
            PouKind::Program => &self.programs,
            PouKind::FunctionBlock => &self.function_blocks,
            PouKind::Function => &self.functions,
        }
    }

    pub fn pous_mut(&mut self, kind: PouKind) -> &mut Vec<Pou> {
        match kind {
            PouKind::Program => &mut self.programs,
            PouKind::FunctionBlock => &mut self.function_blocks,
            PouKind::Function => &mut self.functions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.global_constants.is_empty()
            && self.global_retainvars.is_empty()
            && self.global_variables.is_empty()
            && self.programs.is_empty()
            && self.function_blocks.is_empty()
            && self.functions.is_empty()
            && self.macros.is_empty()
            && self.structs.is_empty()
            && self.typedefs.is_empty()
            && self.enums.is_empty()
            && self.subranges.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Library {} (version {}): {} global constants, {} global variables, \
             {} retain variables, {} programs, {} function blocks, {} functions, \
             {} macros, {} structs, {} typedefs, {} enums, {} subranges",
            self.name,
            self.version,
            self.global_constants.var_count(),
            self.global_variables.var_count(),
            self.global_retainvars.var_count(),
            self.programs.len(),
            self.function_blocks.len(),
            self.functions.len(),
            self.macros.len(),
            self.structs.len(),
            self.typedefs.len(),
            self.enums.len(),
            self.subranges.len(),
        )
    }

    /// Validate the invariants that span entities.
    pub fn check(&self) -> Result<(), CheckError> {
        if let Some(var) = self.global_constants.variables().find(|v| v.value.is_none()) {
            return Err(CheckError::ConstantWithoutValue(var.name.clone()));
        }

        for fun in &self.functions {
            if fun.return_type.is_none() {
                return Err(CheckError::FunctionWithoutReturnType(fun.name.clone()));
            }
            if let Some(category) = fun.first_used(&OUTPUT_CATEGORIES) {
                return Err(CheckError::FunctionWithVars {
                    pou: fun.name.clone(),
                    category: category.label(),
                });
            }
        }

        for prg in &self.programs {
            if prg.return_type.is_some() {
                return Err(CheckError::ProgramWithReturnType(prg.name.clone()));
            }
            if let Some(category) = prg.first_used(&OUTPUT_CATEGORIES) {
                return Err(CheckError::ProgramWithVars {
                    pou: prg.name.clone(),
                    category: category.label(),
                });
            }
        }
        Ok(())
    }

    /// Reorder every named collection by name. Stable, so repeated calls
    /// leave the order unchanged.
    pub fn sort(&mut self) {
        self.global_constants.sort();
        self.global_retainvars.sort();
        self.global_variables.sort();

        self.programs.sort_by(|a, b| a.name.cmp(&b.name));
        self.function_blocks.sort_by(|a, b| a.name.cmp(&b.name));
        self.functions.sort_by(|a, b| a.name.cmp(&b.name));
        self.macros.sort_by(|a, b| a.name.cmp(&b.name));
        self.structs.sort_by(|a, b| a.name.cmp(&b.name));
        self.typedefs.sort_by(|a, b| a.name.cmp(&b.name));
        self.enums.sort_by(|a, b| a.name.cmp(&b.name));
        self.subranges.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
