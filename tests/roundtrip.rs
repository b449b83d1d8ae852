//! Config-file round trip: a grammar that captures every byte (including
//! whitespace and comments) parses a config, emits it back byte-identical,
//! and reparses to the same value.

use pegma::compiler::{Descriptor, DescriptorSet, Field, Grammar};
use pegma::runtime::Options;

const WHITE: &str = r"([ \t\r\n]*|#[^\n]*\n)*";
const SPACES: &str = r"[ \n\t\r]*";
const PAD: &str = r"[ \t\r]*";
const NAME: &str = "[a-zA-Z][a-zA-Z0-9_]*";

// config  = section* white
// section = white name spaces '{' pair* spaces '}'
// pair    = white name pad '=' pad value pad
// value   = int | string | bool | array | raw-line
// array   = '[' element (',' element)* ']'
fn config_grammar() -> DescriptorSet {
    let mut set = DescriptorSet::new();

    set.define(
        "value",
        Descriptor::choice(
            "value",
            vec![
                Field::new("int", Descriptor::int64()),
                Field::new("string", Descriptor::string()),
                Field::new("bool", Descriptor::boolean()),
                Field::new("array", Descriptor::rule("array")),
                Field::regexp("raw", r"[^\n]*\n"),
            ],
        ),
    );

    set.define(
        "element",
        Descriptor::record(
            "element",
            vec![
                Field::regexp("w1", SPACES),
                Field::new("value", Descriptor::rule("value")),
                Field::regexp("w2", SPACES),
            ],
        ),
    );

    set.define(
        "array",
        Descriptor::record(
            "array",
            vec![
                Field::literal("["),
                Field::new("values", Descriptor::list(Descriptor::rule("element")))
                    .delimiter(","),
                Field::literal("]"),
            ],
        ),
    );

    set.define(
        "pair",
        Descriptor::record(
            "pair",
            vec![
                Field::regexp("w", WHITE),
                Field::regexp("name", NAME),
                Field::regexp("w1", PAD),
                Field::literal("="),
                Field::regexp("w2", PAD),
                Field::new("value", Descriptor::rule("value")),
                Field::regexp("w3", PAD),
            ],
        ),
    );

    set.define(
        "section",
        Descriptor::record(
            "section",
            vec![
                Field::regexp("w", WHITE),
                Field::regexp("name", NAME),
                Field::regexp("w1", SPACES),
                Field::literal("{"),
                Field::new("pairs", Descriptor::list(Descriptor::rule("pair"))),
                Field::regexp("w2", SPACES),
                Field::literal("}"),
            ],
        ),
    );

    set.define(
        "config",
        Descriptor::record(
            "config",
            vec![
                Field::new("sections", Descriptor::list(Descriptor::rule("section"))),
                Field::regexp("tail", WHITE),
            ],
        ),
    );

    set
}

static CONFIG: &str = r#"
Section {
	name = 1
	name2 = "String"
	name3 = true
	name4 = Raw string
	name5 = [ 1, 2 ]
}

# settings below override the defaults
Section2 {
	int = -5
	bool = false
	string = "Hello, world!"
	raw_string = this is raw string
	array = [ 1, true, [ 2, false ], "The End!" ]
}
"#;

#[test]
fn config_round_trips_byte_identical() {
    let grammar = Grammar::compile(&config_grammar(), "config").unwrap();
    let options = Options::new().no_skip();

    let (offset, value) = grammar.parse(CONFIG.as_bytes(), &options).unwrap();
    assert_eq!(offset, CONFIG.len(), "the whole config should be consumed");

    let emitted = grammar.append(Vec::new(), &value).unwrap();
    assert_eq!(
        String::from_utf8_lossy(&emitted),
        CONFIG,
        "emit should reproduce the input byte for byte"
    );

    let (reoffset, revalue) = grammar.parse(&emitted, &options).unwrap();
    assert_eq!(reoffset, offset);
    assert_eq!(revalue, value);
}

#[test]
fn config_values_land_in_the_right_branches() {
    let grammar = Grammar::compile(&config_grammar(), "config").unwrap();
    let (_, value) = grammar
        .parse(CONFIG.as_bytes(), &Options::new().no_skip())
        .unwrap();

    let sections = value.slot(0).and_then(|v| v.items()).unwrap();
    assert_eq!(sections.len(), 2);

    // Section slots: w, name, w1, pairs, w2 (the braces are anonymous)
    assert_eq!(sections[0].slot(1).and_then(|v| v.as_str()), Some("Section"));
    let pairs = sections[0].slot(3).and_then(|v| v.items()).unwrap();
    assert_eq!(pairs.len(), 5);

    // name = 1
    assert_eq!(pairs[0].slot(1).and_then(|v| v.as_str()), Some("name"));
    let int_value = pairs[0].slot(4).unwrap();
    assert_eq!(int_value.branch(), Some(0));
    assert_eq!(int_value.branch_value().and_then(|v| v.as_int()), Some(1));

    // name2 = "String"
    let string_value = pairs[1].slot(4).unwrap();
    assert_eq!(string_value.branch(), Some(1));
    assert_eq!(
        string_value.branch_value().and_then(|v| v.as_str()),
        Some("String")
    );

    // name3 = true
    let bool_value = pairs[2].slot(4).unwrap();
    assert_eq!(bool_value.branch(), Some(2));

    // name4 = Raw string
    let raw_value = pairs[3].slot(4).unwrap();
    assert_eq!(raw_value.branch(), Some(4));
    assert_eq!(
        raw_value.branch_value().and_then(|v| v.as_str()),
        Some("Raw string\n")
    );

    // name5 = [ 1, 2 ]
    let array_value = pairs[4].slot(4).unwrap();
    assert_eq!(array_value.branch(), Some(3));
    let elements = array_value
        .branch_value()
        .and_then(|v| v.slot(0))
        .and_then(|v| v.items())
        .unwrap();
    assert_eq!(elements.len(), 2);
    assert_eq!(
        elements[1].slot(1).and_then(|v| v.branch_value()).and_then(|v| v.as_int()),
        Some(2)
    );

    // Section 2 carries the nested array
    let pairs2 = sections[1].slot(3).and_then(|v| v.items()).unwrap();
    let nested = pairs2[4].slot(4).unwrap();
    assert_eq!(nested.branch(), Some(3));
    let outer = nested
        .branch_value()
        .and_then(|v| v.slot(0))
        .and_then(|v| v.items())
        .unwrap();
    assert_eq!(outer.len(), 4);
    let inner_array = outer[2].slot(1).unwrap();
    assert_eq!(inner_array.branch(), Some(3));
}
