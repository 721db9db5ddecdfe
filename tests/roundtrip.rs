use llconv::model::*;
use llconv::parser::{self, h, pll, Format};
use llconv::writer::{self, plclib::SchemaVersion};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(path).unwrap()
}

fn parse_pll(text: &str) -> Library {
    let mut issues = Vec::new();
    let lib = pll::parse("lib", text, &mut issues, true).unwrap();
    assert!(issues.is_empty(), "{issues:?}");
    lib
}

// -- End-to-end scenarios --

#[test]
fn register_define_scenario() {
    let mut issues = Vec::new();
    let lib = h::parse("defvar", "#define LEVEL vn1782 // [INT] tank level\n", &mut issues, true).unwrap();

    let group = &lib.global_variables.groups[0];
    assert_eq!(group.name, h::VARIABLES_GROUP);
    assert_eq!(
        group.variables,
        [Variable {
            name: "LEVEL".into(),
            type_name: "INT".into(),
            address: Some(VariableAddress {
                area: 'M',
                sub_type: 'W',
                index: 400,
                sub_index: 1782,
            }),
            description: Some("tank level".into()),
            ..Variable::default()
        }]
    );
}

#[test]
fn numeric_define_scenario() {
    let mut issues = Vec::new();
    let lib = h::parse("defvar", "#define MAXV 23.9 // [LREAL] max voltage\n", &mut issues, true).unwrap();

    let group = &lib.global_constants.groups[0];
    assert_eq!(group.name, h::CONSTANTS_GROUP);
    assert_eq!(group.variables[0].name, "MAXV");
    assert_eq!(group.variables[0].type_name, "LREAL");
    assert_eq!(group.variables[0].value.as_deref(), Some("23.9"));
}

#[test]
fn subrange_scenario() {
    let lib = parse_pll("TYPE\n\tT1 : DINT (0..100);\nEND_TYPE\n");
    assert!(lib.typedefs.is_empty());
    assert_eq!(lib.subranges, [Subrange::new("T1", "DINT", 0, 100).unwrap()]);
}

#[test]
fn constant_without_initializer_scenario() {
    let text = "VAR_GLOBAL CONSTANT\n\tK : INT;\nEND_VAR\n";
    for strict in [false, true] {
        let mut issues = Vec::new();
        let err = pll::parse("lib", text, &mut issues, strict).unwrap_err();
        assert_eq!(err.message, "Value not specified for variable K");
    }
}

// -- Conversions --

#[test]
fn sample_library_survives_pll_rewrite() {
    let lib = parse_pll(&fixture("sample.pll"));
    assert_eq!(lib.check(), Ok(()));
    assert_eq!(
        lib.summary(),
        "Library lib (version 1.2.0): 2 global constants, 3 global variables, \
         0 retain variables, 1 programs, 1 function blocks, 1 functions, \
         1 macros, 1 structs, 1 typedefs, 1 enums, 1 subranges"
    );

    let text = writer::pll::write(&lib);
    assert_eq!(parse_pll(&text), lib);
}

#[test]
fn header_through_pll_keeps_plclib_output() {
    let mut issues = Vec::new();
    let direct = h::parse("defvar", &fixture("defvar.h"), &mut issues, true).unwrap();
    let via_pll = parse_pll(&writer::pll::write(&direct));

    let schema = SchemaVersion::default();
    let xml_direct = writer::plclib::write(&direct, schema);
    let mut renamed = via_pll.clone();
    renamed.name = direct.name.clone();
    assert_eq!(writer::plclib::write(&renamed, schema), xml_direct);
}

#[test]
fn sorted_output_is_stable() {
    let mut lib = parse_pll(&fixture("sample.pll"));
    lib.sort();
    let once = writer::pll::write(&lib);
    lib.sort();
    assert_eq!(writer::pll::write(&lib), once);
    assert_eq!(lib.global_variables.groups[0].name, "Buffers");
}

#[test]
fn dispatch_by_format() {
    let mut issues = Vec::new();
    let lib = parser::parse(Format::H, "defvar", &fixture("defvar.h"), &mut issues, false).unwrap();
    assert!(issues.is_empty(), "{issues:?}");
    assert_eq!(lib.global_variables.var_count(), 5);
    assert_eq!(lib.global_constants.var_count(), 2);

    let outputs: Vec<_> = Format::H
        .outputs()
        .iter()
        .map(|ext| writer::create_writer(ext).unwrap().file_extension().to_string())
        .collect();
    assert_eq!(outputs, ["pll", "plclib"]);
}

// -- Global variables round-trip --

fn arb_variable() -> impl Strategy<Value = Variable> {
    (
        "v[A-Za-z0-9_]{0,12}",
        prop::sample::select(NUMERIC_TYPES),
        prop::option::of((0u16..1000, 0u16..5000)),
        prop::option::of("-?[0-9]{1,6}"),
        prop::option::of("[A-Za-z0-9][A-Za-z0-9 .,\\[\\]-]{0,20}[A-Za-z0-9]"),
    )
        .prop_map(|(name, type_name, address, value, descr)| {
            let mut var = Variable::new(&name, type_name).unwrap();
            var.address = address.map(|(index, sub_index)| VariableAddress {
                area: 'M',
                sub_type: 'W',
                index,
                sub_index,
            });
            if let Some(v) = value {
                var.set_value(&v).unwrap();
            }
            if let Some(d) = descr {
                var.set_description(&d);
            }
            var
        })
}

proptest! {
    #[test]
    fn globals_survive_pll_round_trip(
        vars in prop::collection::vec(arb_variable(), 1..8),
        consts in prop::collection::vec(arb_variable(), 0..4),
    ) {
        let mut lib = Library::new("lib");
        lib.global_variables.push_group("Vars").variables = vars;
        let group = lib.global_constants.push_group("Consts");
        for mut k in consts {
            if k.value.is_none() {
                k.set_value("0").unwrap();
            }
            group.variables.push(k);
        }
        if lib.global_constants.is_empty() {
            lib.global_constants.groups.clear();
        }

        let mut issues = Vec::new();
        let back = pll::parse("lib", &writer::pll::write(&lib), &mut issues, true).unwrap();
        prop_assert_eq!(back, lib);
    }
}
