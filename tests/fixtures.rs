//! Accepted and rejected document corpora.
//!
//! Every accepted fixture must parse without error and survive a
//! serialize/re-parse cycle under a range of option sets; every rejected
//! fixture must fail without `Recover`.

#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;

use xmldom::parser::{parse_str, parse_str_with_options};
use xmldom::serial::serialize;
use xmldom::{Document, ErrorKind, NodeKind, ParseOption, ParseOptions};

const DECL: &str = "<?xml version=\"1.0\"?>\n";

/// Fixtures written with the XML declaration prefix.
const ACCEPTED: &[&str] = &[
    r#"<foobar xmlns:bar="xml://foo" bar:foo="bar"/>"#,
    r#"<foobar xmlns="xml://foo" foo="bar"><foo/></foobar>"#,
    r#"<bar:foobar xmlns:bar="xml://foo" foo="bar"><bar:foo/></bar:foobar>"#,
    "<foobar><![CDATA[<>&\"`]]></foobar>",
    "<foobar>&lt;&gt;&amp;&quot;&apos;</foobar>",
    "<foobar>&#x20;&#160;</foobar>",
    "<!--comment--><foobar>foo</foobar>",
    r#"<!DOCTYPE foobar [<!ENTITY foo "bar">]><foobar>&foo;</foobar>"#,
    r#"<!DOCTYPE foobar [<!ENTITY foo "bar=&quot;foo&quot;">]><foobar>&foo;&gt;</foobar>"#,
    "<foobar></foobar>",
    "<foobar> </foobar>",
    "<foobar/> \n",
    "<foobar/><!--after-->",
    "<foobar><!----></foobar>",
    "<foobar foo=\"`bar>\"/>",
    r#"<!DOCTYPE foobar [<!ENTITY foo "bar">]><foobar foo="&foo;"/>"#,
    r#"<!DOCTYPE foobar [<!ENTITY foo "bar">]><foobar foo="&gt;&foo;"/>"#,
    r#"<!DOCTYPE foobar [<!ENTITY foo '"'>]><foobar foo="&foo;"/>"#,
    "<!DOCTYPE foobar [\n  <!ENTITY foo \"bar\">\n  <!ELEMENT foobar ANY>\n  <!-- note -->\n]>\n<foobar>&foo;</foobar>",
];

/// Fixtures that carry their own prolog.
const ACCEPTED_RAW: &[&str] = &[
    "<foobar/>",
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<foobar/>",
    "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<foobar/>",
    "<?xml version='1.0' standalone='yes'?><foobar/>",
];

const REJECTED: &[&str] = &[
    "",
    "<?xml version=\"1.0\"?>",
    "<!-- comment -->",
    "<!DOCTYPE foo>",
    "<ouch>",
    "<ouch/>foo",
    "foo<ouch/>",
    "<ouch foo=bar/>",
    "<ouch foo=\"bar/>",
    "<ouch>&</ouch>",
    "<ouch>&foo;</ouch>",
    "<ouch>&gt</ouch>",
    "<ouch><!---></ouch>",
    "<ouch><!-----></ouch>",
    "<!DOCTYPE foobar [<!ENTITY foo \"bar\">]><foobar &foo;=\"ouch\"/>",
    "<ouch>&//0x20;</ouch>",
    "<foobar &foo;/>",
];

fn accepted() -> Vec<String> {
    ACCEPTED
        .iter()
        .map(|body| format!("{DECL}{body}"))
        .chain(ACCEPTED_RAW.iter().map(|s| (*s).to_string()))
        .collect()
}

/// Option sets the round-trip law must hold for.
fn option_sets() -> Vec<ParseOption> {
    vec![
        ParseOption::empty(),
        ParseOption::NO_ENT,
        ParseOption::NSCLEAN,
        ParseOption::DTD_ATTR,
        ParseOption::RECOVER,
        ParseOption::COMPACT | ParseOption::NO_DICT,
        ParseOption::HUGE | ParseOption::BIG_LINES,
        ParseOption::NO_ENT | ParseOption::NSCLEAN | ParseOption::DTD_LOAD,
    ]
}

#[test]
fn test_accepted_corpus_parses() {
    for input in accepted() {
        let doc = parse_str(&input).unwrap_or_else(|e| panic!("{input:?} rejected: {e}"));
        assert!(doc.root_element().is_some(), "{input:?} has no root");
        assert!(
            doc.diagnostics.is_empty(),
            "{input:?} produced diagnostics: {:?}",
            doc.diagnostics
        );
    }
}

#[test]
fn test_rejected_corpus_fails() {
    for input in REJECTED {
        let result = parse_str(input);
        assert!(result.is_err(), "{input:?} should be rejected");
    }
}

#[test]
fn test_rejected_corpus_recovers() {
    let opts = ParseOptions::from(ParseOption::RECOVER);
    for input in REJECTED {
        let doc = parse_str_with_options(input, &opts)
            .unwrap_or_else(|e| panic!("{input:?} failed in recovery mode: {e}"));
        assert!(!doc.diagnostics.is_empty(), "{input:?} recovered silently");
    }
}

#[test]
fn test_invalid_utf8_bytes_rejected() {
    let err = Document::parse_bytes(b"<foob\xe4r/>", &ParseOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Encoding);
    assert_eq!(err.location.byte_offset, 5);
}

#[test]
fn test_roundtrip_is_structurally_equal() {
    for flags in option_sets() {
        let opts = ParseOptions::from(flags);
        for input in accepted() {
            let first = parse_str_with_options(&input, &opts).unwrap();
            let output = serialize(&first, false);
            let second = parse_str_with_options(&output, &opts)
                .unwrap_or_else(|e| panic!("{flags}: re-parse of {output:?} failed: {e}"));
            assert!(
                first.structurally_eq(&second),
                "{flags}: {input:?} changed after round-trip through {output:?}"
            );
        }
    }
}

#[test]
fn test_serialization_is_stable() {
    for input in accepted() {
        let once = parse_str(&input).unwrap().dump(false);
        let twice = parse_str(&once).unwrap().dump(false);
        assert_eq!(once, twice);
    }
}

#[test]
fn test_expected_serializations() {
    let cases = [
        ("<foobar/>", "<?xml version=\"1.0\"?>\n<foobar/>\n"),
        (
            "<foobar>&#x20;&#160;</foobar>",
            "<?xml version=\"1.0\"?>\n<foobar> \u{a0}</foobar>\n",
        ),
        (
            "<!DOCTYPE foobar [<!ENTITY foo \"bar=&quot;foo&quot;\">]><foobar>&foo;&gt;</foobar>",
            "<?xml version=\"1.0\"?>\n<!DOCTYPE foobar [\n<!ENTITY foo \"bar=&quot;foo&quot;\">\n]>\n<foobar>&foo;&gt;</foobar>\n",
        ),
        (
            "<!DOCTYPE foobar [<!ENTITY foo '\"'>]><foobar foo=\"&foo;\"/>",
            "<?xml version=\"1.0\"?>\n<!DOCTYPE foobar [\n<!ENTITY foo '\"'>\n]>\n<foobar foo=\"&quot;\"/>\n",
        ),
    ];
    for (input, expected) in cases {
        assert_eq!(parse_str(input).unwrap().dump(false), expected);
    }
}

#[test]
fn test_quoted_entity_replacement_in_attribute() {
    let doc = parse_str("<!DOCTYPE a [<!ENTITY q '\"'>]><a v=\"x&q;y\"/>").unwrap();
    let a = doc.root_element().unwrap();
    assert_eq!(doc.attribute(a, "v"), Some("x\"y"));
}

#[test]
fn test_no_blanks_scenario() {
    let opts = ParseOptions::from(ParseOption::NO_BLANKS);
    let doc = parse_str_with_options("<a>    <b/> </a>", &opts).unwrap();
    let output = serialize(&doc, false);
    assert!(output.contains("<a><b/></a>"), "got {output:?}");
}

/// Returns `true` if some element has element children interleaved with
/// whitespace-only text.
fn has_strippable_blanks(doc: &Document) -> bool {
    doc.descendants(doc.root()).any(|id| {
        let children: Vec<_> = doc.children(id).collect();
        let has_element = children.iter().any(|&c| doc.node(c).kind.is_element());
        has_element
            && children.iter().any(|&c| {
                matches!(doc.node(c).kind, NodeKind::Text { blank: true, .. })
            })
            && !children.iter().any(|&c| {
                matches!(
                    doc.node(c).kind,
                    NodeKind::Text { blank: false, .. }
                        | NodeKind::CData { .. }
                        | NodeKind::EntityRef { .. }
                )
            })
    })
}

#[test]
fn test_whitespace_strip_is_idempotent() {
    let opts = ParseOptions::from(ParseOption::NO_BLANKS);
    let inputs = [
        "<a>    <b/> </a>",
        "<a>\n  <b>\n    <c/>\n  </b>\n  <d> </d>\n</a>",
        "<a> text <b/> </a>",
    ];
    for input in inputs {
        let stripped = parse_str_with_options(input, &opts).unwrap();
        let output = serialize(&stripped, false);
        let reparsed = parse_str(&output).unwrap();
        assert!(!has_strippable_blanks(&reparsed), "{input:?} -> {output:?}");

        let again = parse_str_with_options(&output, &opts).unwrap();
        assert_eq!(serialize(&again, false), output);
    }
}

#[test]
fn test_every_node_kind_roundtrips() {
    let input = "<?xml version=\"1.0\" standalone=\"no\"?>\n\
        <!DOCTYPE r PUBLIC \"-//T//EN\" \"r.dtd\" [\n\
        <!ENTITY e \"<i>x</i>\">\n\
        <!ENTITY % p \"<!ENTITY f 'y'>\">\n\
        %p;\n\
        <!ATTLIST r a CDATA #IMPLIED>\n\
        <?pi in subset?>\n\
        ]>\n\
        <r a='1'>&e;&f;<![CDATA[c]]><!--c--><?p d?></r>";
    let doc = parse_str(input).unwrap();
    let output = doc.dump(false);
    let again = parse_str(&output).unwrap();
    assert!(doc.structurally_eq(&again), "{output}");
}
