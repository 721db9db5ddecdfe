//! LogicLab 5 `.plclib` XML writer.
//!
//! The document layout is fixed: every section is always present, as a
//! self-closed tag when the library has nothing for it.

use crate::error::VersionError;
use crate::model::*;
use crate::options::Options;
use crate::writer::Writer;
use std::fmt;
use std::str::FromStr;

// -- Schema version -----------------------------------------------------------

/// `<major>.<minor>` packed in 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self(((major as u32) << 16) | minor as u32)
    }

    pub fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn minor(self) -> u16 {
        self.0 as u16
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::new(2, 8)
    }
}

impl FromStr for SchemaVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason| VersionError {
            text: s.to_string(),
            reason,
        };
        let digits_end = |t: &str| t.find(|c: char| !c.is_ascii_digit()).unwrap_or(t.len());

        let major_end = digits_end(s);
        let major = s[..major_end].parse().map_err(|_| fail("Invalid major version"))?;
        let rest = s[major_end..]
            .strip_prefix('.')
            .ok_or_else(|| fail("Missing '.' after major version"))?;
        let minor_end = digits_end(rest);
        if minor_end < rest.len() {
            return Err(fail("Unexpected content after minor version"));
        }
        let minor = rest.parse().map_err(|_| fail("Invalid minor version"))?;
        Ok(Self::new(major, minor))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

// -- Writer -------------------------------------------------------------------

pub struct PlclibWriter;

impl Writer for PlclibWriter {
    fn write(&self, lib: &Library, options: &Options) -> anyhow::Result<String> {
        let schema = match options.get("schema-ver") {
            Some(s) => s.parse()?,
            None => SchemaVersion::default(),
        };
        Ok(write(lib, schema))
    }

    fn file_extension(&self) -> &str {
        "plclib"
    }
}

/// Folder id derived from the library name.
fn name_hash(s: &str) -> usize {
    let len = s.len();
    s.bytes()
        .enumerate()
        .fold(0usize, |acc, (i, b)| acc.wrapping_add((len - i).wrapping_mul(b as usize)))
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn cdata(s: &str) -> String {
    format!("<![CDATA[{}]]>", s.replace("]]>", "]]]]><![CDATA[>"))
}

/// Render a whole library.
pub fn write(lib: &Library, schema: SchemaVersion) -> String {
    let mut out = String::new();

    // Heading
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n");
    out.push_str(&format!("<plcLibrary schemaVersion=\"{schema}\">\n"));
    out.push_str(&format!(
        "\t<lib version=\"{}\" name=\"{}\" fullXml=\"true\">\n",
        xml_escape(&lib.version),
        xml_escape(&lib.name)
    ));
    out.push_str(&format!("\t\t<descr>{}</descr>\n", xml_escape(&lib.description)));

    write_workspace(&mut out, lib);

    write_groups(&mut out, "globalVars", &lib.global_variables, "var");
    write_groups(&mut out, "retainVars", &lib.global_retainvars, "var");
    write_groups(&mut out, "constantVars", &lib.global_constants, "const");

    let all_groups = [&lib.global_constants, &lib.global_retainvars, &lib.global_variables];
    if all_groups.iter().any(|g| g.has_named_group()) {
        out.push_str("\t\t<iecVarsDeclaration>\n");
        for group in all_groups.iter().flat_map(|g| &g.groups).filter(|g| g.is_named()) {
            out.push_str(&format!("\t\t\t<group name=\"{}\">\n", xml_escape(&group.name)));
            out.push_str("\t\t\t\t<iecDeclaration active=\"FALSE\"/>\n");
            out.push_str("\t\t\t</group>\n");
        }
        out.push_str("\t\t</iecVarsDeclaration>\n");
    }

    const IND: &str = "\t\t\t";
    write_section(&mut out, "functions", &lib.functions, |out, pou| {
        write_pou(out, pou, "function", IND)
    });
    write_section(&mut out, "functionBlocks", &lib.function_blocks, |out, pou| {
        write_pou(out, pou, "functionBlock", IND)
    });
    write_section(&mut out, "programs", &lib.programs, |out, pou| {
        write_pou(out, pou, "program", IND)
    });
    write_section(&mut out, "macros", &lib.macros, |out, mac| write_macro(out, mac, IND));
    write_section(&mut out, "structs", &lib.structs, |out, s| write_struct(out, s, IND));
    write_section(&mut out, "typedefs", &lib.typedefs, |out, t| write_typedef(out, t, IND));
    write_section(&mut out, "enums", &lib.enums, |out, e| write_enum(out, e, IND));
    write_section(&mut out, "subranges", &lib.subranges, |out, s| write_subrange(out, s, IND));
    out.push_str("\t\t<interfaces/>\n");

    out.push_str("\t</lib>\n");
    out.push_str("</plcLibrary>\n");
    out
}

/// Folder listing every named entity of the library.
fn write_workspace(out: &mut String, lib: &Library) {
    out.push_str("\t\t<libWorkspace>\n");
    out.push_str(&format!(
        "\t\t\t<folder name=\"{}\" id=\"{}\">\n",
        xml_escape(&lib.name),
        name_hash(&lib.name)
    ));
    let mut entry = |tag: &str, name: &str| {
        out.push_str(&format!("\t\t\t\t<{tag} name=\"{}\"/>\n", xml_escape(name)));
    };
    for groups in [&lib.global_constants, &lib.global_retainvars, &lib.global_variables] {
        for group in groups.groups.iter().filter(|g| g.is_named()) {
            entry("GlobalVars", &group.name);
        }
    }
    for pou in lib.function_blocks.iter().chain(&lib.functions).chain(&lib.programs) {
        entry("Pou", &pou.name);
    }
    let definitions = lib
        .macros
        .iter()
        .map(|m| &m.name)
        .chain(lib.structs.iter().map(|s| &s.name))
        .chain(lib.typedefs.iter().map(|t| &t.name))
        .chain(lib.enums.iter().map(|e| &e.name))
        .chain(lib.subranges.iter().map(|s| &s.name));
    for name in definitions {
        entry("Definition", name);
    }
    out.push_str("\t\t\t</folder>\n");
    out.push_str("\t\t</libWorkspace>\n");
}

/// `<tag>` wrapping each item, or `<tag/>` when there are none.
fn write_section<T>(out: &mut String, tag: &str, items: &[T], mut item: impl FnMut(&mut String, &T)) {
    if items.is_empty() {
        out.push_str(&format!("\t\t<{tag}/>\n"));
        return;
    }
    out.push_str(&format!("\t\t<{tag}>\n"));
    for it in items {
        item(out, it);
    }
    out.push_str(&format!("\t\t</{tag}>\n"));
}

fn write_groups(out: &mut String, tag: &str, groups: &VariableGroups, var_tag: &str) {
    if groups.is_empty() {
        out.push_str(&format!("\t\t<{tag}/>\n"));
        return;
    }
    out.push_str(&format!("\t\t<{tag}>\n"));
    for group in &groups.groups {
        out.push_str(&format!(
            "\t\t\t<group name=\"{}\" excludeFromBuild=\"FALSE\" excludeFromBuildIfNotDef=\"\" version=\"1.0.0\">\n",
            xml_escape(&group.name)
        ));
        for var in &group.variables {
            write_variable(out, var, var_tag, "\t\t\t\t");
        }
        out.push_str("\t\t\t</group>\n");
    }
    out.push_str(&format!("\t\t</{tag}>\n"));
}

fn write_variable(out: &mut String, var: &Variable, tag: &str, ind: &str) {
    out.push_str(&format!(
        "{ind}<{tag} name=\"{}\" type=\"{}\"",
        xml_escape(&var.name),
        xml_escape(&var.type_name)
    ));
    if let Some(length) = var.length {
        out.push_str(&format!(" length=\"{length}\""));
    }
    if let Some(array) = var.array {
        out.push_str(&format!(" dim0=\"{}\"", array.len));
    }
    if var.description.is_none() && var.value.is_none() && var.address.is_none() {
        out.push_str("/>\n");
        return;
    }
    out.push_str(">\n");
    if let Some(descr) = &var.description {
        out.push_str(&format!("{ind}\t<descr>{}</descr>\n", xml_escape(descr)));
    }
    if let Some(value) = &var.value {
        out.push_str(&format!("{ind}\t<initValue>{}</initValue>\n", xml_escape(value)));
    }
    if let Some(addr) = var.address {
        out.push_str(&format!(
            "{ind}\t<address type=\"{}\" typeVar=\"{}\" index=\"{}\" subIndex=\"{}\"/>\n",
            addr.area, addr.sub_type, addr.index, addr.sub_index
        ));
    }
    out.push_str(&format!("{ind}</{tag}>\n"));
}

fn write_source(out: &mut String, code_type: &str, body: &str, ind: &str) {
    out.push_str(&format!("{ind}\t<sourceCode type=\"{}\">\n", xml_escape(code_type)));
    out.push_str(&format!("{ind}\t\t{}\n", cdata(body)));
    out.push_str(&format!("{ind}\t</sourceCode>\n"));
}

fn write_pou(out: &mut String, pou: &Pou, tag: &str, ind: &str) {
    out.push_str(&format!(
        "{ind}<{tag} name=\"{}\" version=\"1.0.0\" creationDate=\"0\" lastModifiedDate=\"0\" \
         excludeFromBuild=\"FALSE\" excludeFromBuildIfNotDef=\"\">\n",
        xml_escape(&pou.name)
    ));
    if let Some(descr) = &pou.description {
        out.push_str(&format!("{ind}\t<descr>{}</descr>\n", xml_escape(descr)));
    }
    if let Some(ret) = &pou.return_type {
        out.push_str(&format!("{ind}\t<returnValue>{}</returnValue>\n", xml_escape(ret)));
    }

    out.push_str(&format!("{ind}\t<vars>\n"));
    for category in VarCategory::ALL {
        let vars = pou.vars(category);
        if vars.is_empty() {
            continue;
        }
        let (list_tag, var_tag) = match category {
            VarCategory::InOut => ("inoutVars", "var"),
            VarCategory::Input => ("inputVars", "var"),
            VarCategory::Output => ("outputVars", "var"),
            VarCategory::External => ("externalVars", "var"),
            VarCategory::Local => ("localVars", "var"),
            VarCategory::LocalConstant => ("localConsts", "const"),
        };
        out.push_str(&format!("{ind}\t\t<{list_tag}>\n"));
        for var in vars {
            write_variable(out, var, var_tag, &format!("{ind}\t\t\t"));
        }
        out.push_str(&format!("{ind}\t\t</{list_tag}>\n"));
    }
    out.push_str(&format!("{ind}\t</vars>\n"));
    out.push_str(&format!("{ind}\t<iecDeclaration active=\"FALSE\"/>\n"));
    if tag == "functionBlock" {
        out.push_str(&format!("{ind}\t<interfaces/>\n"));
        out.push_str(&format!("{ind}\t<methods/>\n"));
    }
    write_source(out, &pou.code_type, &pou.body, ind);
    out.push_str(&format!("{ind}</{tag}>\n"));
}

fn write_macro(out: &mut String, mac: &Macro, ind: &str) {
    out.push_str(&format!("{ind}<macro name=\"{}\">\n", xml_escape(&mac.name)));
    if let Some(descr) = &mac.description {
        out.push_str(&format!("{ind}\t<descr>{}</descr>\n", xml_escape(descr)));
    }
    write_source(out, &mac.code_type, &mac.body, ind);
    if mac.parameters.is_empty() {
        out.push_str(&format!("{ind}\t<parameters/>\n"));
    } else {
        out.push_str(&format!("{ind}\t<parameters>\n"));
        for par in &mac.parameters {
            out.push_str(&format!("{ind}\t\t<parameter name=\"{}\">\n", xml_escape(&par.name)));
            out.push_str(&format!(
                "{ind}\t\t\t<descr>{}</descr>\n",
                xml_escape(par.description.as_deref().unwrap_or(""))
            ));
            out.push_str(&format!("{ind}\t\t</parameter>\n"));
        }
        out.push_str(&format!("{ind}\t</parameters>\n"));
    }
    out.push_str(&format!("{ind}</macro>\n"));
}

fn descr_of(description: &Option<String>) -> String {
    xml_escape(description.as_deref().unwrap_or(""))
}

fn write_struct(out: &mut String, strct: &Struct, ind: &str) {
    out.push_str(&format!("{ind}<struct name=\"{}\" version=\"1.0.0\">\n", xml_escape(&strct.name)));
    out.push_str(&format!("{ind}\t<descr>{}</descr>\n", descr_of(&strct.description)));
    out.push_str(&format!("{ind}\t<vars>\n"));
    for member in &strct.members {
        write_variable(out, member, "var", &format!("{ind}\t\t"));
    }
    out.push_str(&format!("{ind}\t</vars>\n"));
    out.push_str(&format!("{ind}\t<iecDeclaration active=\"FALSE\"/>\n"));
    out.push_str(&format!("{ind}</struct>\n"));
}

fn write_typedef(out: &mut String, typedef: &TypeDef, ind: &str) {
    out.push_str(&format!(
        "{ind}<typedef name=\"{}\" type=\"{}\"",
        xml_escape(&typedef.name),
        xml_escape(&typedef.type_name)
    ));
    if let Some(length) = typedef.length {
        out.push_str(&format!(" length=\"{length}\""));
    }
    if let Some(array) = typedef.array {
        out.push_str(&format!(" dim0=\"{}\"", array.len));
    }
    out.push_str(">\n");
    out.push_str(&format!("{ind}\t<iecDeclaration active=\"FALSE\"/>\n"));
    out.push_str(&format!("{ind}\t<descr>{}</descr>\n", descr_of(&typedef.description)));
    out.push_str(&format!("{ind}</typedef>\n"));
}

fn write_enum(out: &mut String, en: &Enum, ind: &str) {
    out.push_str(&format!("{ind}<enum name=\"{}\" version=\"1.0.0\">\n", xml_escape(&en.name)));
    out.push_str(&format!("{ind}\t<descr>{}</descr>\n", descr_of(&en.description)));
    out.push_str(&format!("{ind}\t<elements>\n"));
    for elem in &en.elements {
        out.push_str(&format!("{ind}\t\t<element name=\"{}\">\n", xml_escape(&elem.name)));
        out.push_str(&format!("{ind}\t\t\t<descr>{}</descr>\n", descr_of(&elem.description)));
        out.push_str(&format!("{ind}\t\t\t<value>{}</value>\n", xml_escape(&elem.value)));
        out.push_str(&format!("{ind}\t\t</element>\n"));
    }
    out.push_str(&format!("{ind}\t</elements>\n"));
    out.push_str(&format!("{ind}\t<iecDeclaration active=\"FALSE\"/>\n"));
    out.push_str(&format!("{ind}</enum>\n"));
}

fn write_subrange(out: &mut String, subrange: &Subrange, ind: &str) {
    out.push_str(&format!(
        "{ind}<subrange name=\"{}\" version=\"1.0.0\" type=\"{}\">\n",
        xml_escape(&subrange.name),
        xml_escape(&subrange.type_name)
    ));
    out.push_str(&format!("{ind}\t<descr>{}</descr>\n", descr_of(&subrange.description)));
    out.push_str(&format!("{ind}\t<minValue>{}</minValue>\n", subrange.min));
    out.push_str(&format!("{ind}\t<maxValue>{}</maxValue>\n", subrange.max));
    out.push_str(&format!("{ind}\t<iecDeclaration active=\"FALSE\"/>\n"));
    out.push_str(&format!("{ind}</subrange>\n"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn schema_version_parse_and_display() {
        assert_eq!(SchemaVersion::default().to_string(), "2.8");
        let v: SchemaVersion = "2.15".parse().unwrap();
        assert_eq!((v.major(), v.minor()), (2, 15));
        assert!(v > SchemaVersion::default());
        assert_eq!(v.to_string(), "2.15");
    }

    #[test]
    fn schema_version_errors() {
        let reason = |s: &str| s.parse::<SchemaVersion>().unwrap_err().reason;
        assert_eq!(reason("2"), "Missing '.' after major version");
        assert_eq!(reason("2.8b"), "Unexpected content after minor version");
        assert_eq!(reason(".8"), "Invalid major version");
        assert_eq!(reason("2."), "Invalid minor version");
        assert_eq!(reason("70000.1"), "Invalid major version");
    }

    #[test]
    fn hash_weights_by_position() {
        assert_eq!(name_hash(""), 0);
        assert_eq!(name_hash("ab"), 2 * 97 + 98);
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(xml_escape("a<b & \"c\">"), "a&lt;b &amp; &quot;c&quot;&gt;");
        assert_eq!(cdata("x]]>y"), "<![CDATA[x]]]]><![CDATA[>y]]>");
    }

    #[test]
    fn empty_sections_are_self_closed() {
        let mut lib = Library::new("empty");
        lib.global_variables.current().variables.push(Variable::new("x", "INT").unwrap());
        let xml = write(&lib, SchemaVersion::default());
        for tag in [
            "retainVars",
            "constantVars",
            "functions",
            "functionBlocks",
            "programs",
            "macros",
            "structs",
            "typedefs",
            "enums",
            "subranges",
            "interfaces",
        ] {
            assert!(xml.contains(&format!("\t\t<{tag}/>\n")), "{tag}");
        }
        assert!(!xml.contains("iecVarsDeclaration"));
        assert!(xml.contains("\t\t\t\t<var name=\"x\" type=\"INT\"/>\n"));
    }

    #[test]
    fn header_library_document() {
        let mut lib = Library::new("defvar");
        let mut var = Variable::new("vaName", "STRING").unwrap();
        var.set_length(80).unwrap();
        var.set_description("a name");
        var.address = Some(VariableAddress {
            area: 'M',
            sub_type: 'B',
            index: 700,
            sub_index: 12,
        });
        lib.global_variables.push_group("Header_Variables").variables.push(var);
        let mut k = Variable::new("MAXV", "LREAL").unwrap();
        k.set_value("23.9").unwrap();
        lib.global_constants.push_group("Header_Constants").variables.push(k);

        let xml = write(&lib, SchemaVersion::default());
        let id = name_hash("defvar");
        let expected = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<plcLibrary schemaVersion="2.8">
	<lib version="1.0.0" name="defvar" fullXml="true">
		<descr>PLC library</descr>
		<libWorkspace>
			<folder name="defvar" id="{id}">
				<GlobalVars name="Header_Constants"/>
				<GlobalVars name="Header_Variables"/>
			</folder>
		</libWorkspace>
		<globalVars>
			<group name="Header_Variables" excludeFromBuild="FALSE" excludeFromBuildIfNotDef="" version="1.0.0">
				<var name="vaName" type="STRING" length="80">
					<descr>a name</descr>
					<address type="M" typeVar="B" index="700" subIndex="12"/>
				</var>
			</group>
		</globalVars>
		<retainVars/>
		<constantVars>
			<group name="Header_Constants" excludeFromBuild="FALSE" excludeFromBuildIfNotDef="" version="1.0.0">
				<const name="MAXV" type="LREAL">
					<initValue>23.9</initValue>
				</const>
			</group>
		</constantVars>
		<iecVarsDeclaration>
			<group name="Header_Constants">
				<iecDeclaration active="FALSE"/>
			</group>
			<group name="Header_Variables">
				<iecDeclaration active="FALSE"/>
			</group>
		</iecVarsDeclaration>
		<functions/>
		<functionBlocks/>
		<programs/>
		<macros/>
		<structs/>
		<typedefs/>
		<enums/>
		<subranges/>
		<interfaces/>
	</lib>
</plcLibrary>
"#
        );
        assert_eq!(xml, expected);
    }

    #[test]
    fn function_block_and_types() {
        let mut lib = Library::new("lib");
        let mut fb = Pou::new("Counter").unwrap();
        fb.input_vars.push(Variable::new("step", "INT").unwrap());
        let mut limit = Variable::new("LIMIT", "DINT").unwrap();
        limit.set_value("10").unwrap();
        fb.local_constants.push(limit);
        fb.code_type = "ST".into();
        fb.body = "\ncount := count + step;\n".into();
        lib.function_blocks.push(fb);
        lib.subranges.push(Subrange::new("T1", "DINT", 0, 100).unwrap());

        let xml = write(&lib, SchemaVersion::new(2, 6));
        assert!(xml.contains("<plcLibrary schemaVersion=\"2.6\">"));
        assert!(xml.contains("\t\t\t\t<Pou name=\"Counter\"/>\n\t\t\t\t<Definition name=\"T1\"/>\n"));
        assert!(xml.contains("\t\t\t\t\t<inputVars>\n\t\t\t\t\t\t<var name=\"step\" type=\"INT\"/>\n"));
        assert!(xml.contains("\t\t\t\t\t\t<const name=\"LIMIT\" type=\"DINT\">\n"));
        assert!(xml.contains("\t\t\t\t<interfaces/>\n\t\t\t\t<methods/>\n"));
        assert!(xml.contains("<![CDATA[\ncount := count + step;\n]]>"));
        assert!(xml.contains(
            "\t\t\t<subrange name=\"T1\" version=\"1.0.0\" type=\"DINT\">\n\t\t\t\t<descr></descr>\n\t\t\t\t<minValue>0</minValue>\n\t\t\t\t<maxValue>100</maxValue>\n"
        ));
    }

    #[test]
    fn writer_reads_schema_option() {
        let lib = Library::new("lib");
        let opts: Options = "schema-ver:2.1".parse().unwrap();
        let xml = PlclibWriter.write(&lib, &opts).unwrap();
        assert!(xml.contains("schemaVersion=\"2.1\""));
        let bad: Options = "schema-ver:x".parse().unwrap();
        assert!(PlclibWriter.write(&lib, &bad).is_err());
    }
}
