use maxi_core::api::{dump, dump_objects, parse};
use maxi_core::ast::Mode;
use maxi_core::error::{ErrorCode, LoadError};
use maxi_core::DumpOptions;
use serde_json::json;

fn sorted_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.lines().collect();
    lines.sort_unstable();
    lines
}

#[test]
fn test_dump_objects_user_example() {
    let options = DumpOptions::new()
        .with_alias("U")
        .with_schema("U:User(id:int|name|email=unknown)");
    let out = dump_objects(&json!([{"id": 1, "name": "Julie"}]), &options).unwrap();
    assert_eq!(out, "U:User(id:int|name|email=unknown)\n###\nU(1|Julie)");
}

#[test]
fn test_dump_objects_alias_map_input() {
    let options = DumpOptions::new()
        .with_schema("U:User(id:int|name)\nT:Tag(id:int|label)")
        .include_types(false);
    let data = json!({
        "U": [{"id": 1, "name": "a"}],
        "T": {"id": 9, "label": "x"},
    });
    let out = dump_objects(&data, &options).unwrap();
    assert_eq!(sorted_lines(&out), vec!["T(9|x)", "U(1|a)"]);
}

#[test]
fn test_reference_promotion() {
    let schema = "A:Author(id:int|name)\nB:Book(id:int|title|author:A|coauthors:A[])";
    let options = DumpOptions::new()
        .with_alias("B")
        .with_schema(schema)
        .include_types(false);
    let data = json!([
        {
            "id": 10,
            "title": "Dune",
            "author": {"id": 1, "name": "Frank"},
            "coauthors": [{"id": 2, "name": "Brian"}, {"name": "Ghost"}],
        }
    ]);
    let out = dump_objects(&data, &options).unwrap();
    assert_eq!(
        sorted_lines(&out),
        vec!["A(1|Frank)", "A(2|Brian)", "B(10|Dune|1|[2,(|Ghost)])"]
    );

    // The promoted output parses back into the same data.
    let reparsed = parse(&format!("{schema}\n###\n{out}"), "books.maxi").unwrap();
    assert_eq!(reparsed.records.len(), 3);
}

#[test]
fn test_dump_objects_with_imported_schema() {
    let loader = |_: &str| -> Result<String, LoadError> { Ok("U:User(id:int|name)".to_string()) };
    let options = DumpOptions::new()
        .with_alias("U")
        .with_import("users.maxi")
        .with_loader(&loader)
        .with_mode(Mode::Strict);
    let out = dump_objects(&json!({"id": 1, "name": "x"}), &options).unwrap();
    assert_eq!(out, "@mode:strict\n@schema:users.maxi\n\n###\nU(1|x)");
}

#[test]
fn test_dump_objects_import_without_loader() {
    let options = DumpOptions::new().with_alias("U").with_import("users.maxi");
    let err = dump_objects(&json!([]), &options).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MissingLoader);
}

#[test]
fn test_dump_objects_invalid_input() {
    let options = DumpOptions::new().with_alias("U").with_schema("U(id)");
    let err = dump_objects(&json!("nope"), &options).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInput);
}

#[test]
fn test_dump_parse_result_keeps_imports_as_directives() {
    let loader = |_: &str| -> Result<String, LoadError> { Ok("B:Base(id:int)".to_string()) };
    let options = maxi_core::ParseOptions::new().with_loader(&loader);
    let result =
        maxi_core::parse_with("@schema:base.maxi\nU<B>(name)\n###\nU(1|a)", &options).unwrap();
    assert_eq!(dump(&result), "@schema:base.maxi\n\nU<B>(name)\n###\nU(1|a)");
}

#[test]
fn test_dump_records_only() {
    let result = parse("X(1|two)", "test.maxi").unwrap();
    assert_eq!(dump(&result), "X(1|two)");
}

#[test]
fn test_round_trip_with_special_strings() {
    let source = r#"S(id:int|text|list:str[]|m:map<str,str>)
###
S(1|"a, b"|["x:y","(p)"]|{"k 1":"v|w",k2:plain})
S(2|"~"|["\"q\""]|{})
S(3|"tab\there"|[""]|~)"#;
    let first = parse(source, "test.maxi").unwrap();
    let second = parse(&dump(&first), "dumped.maxi").unwrap();
    let values = |r: &maxi_core::ParseResult| r.records.iter().map(|x| x.values.clone()).collect::<Vec<_>>();
    assert_eq!(values(&first), values(&second));
}

#[test]
fn test_map_of_types_renders_as_map() {
    let schema = "C:Company(name|size:int)\nU:User(id:int|offices:map<str,C>)";
    let options = DumpOptions::new()
        .with_alias("U")
        .with_schema(schema)
        .include_types(false)
        .promote_references(false);
    let data = json!({"id": 1, "offices": {"paris": {"name": "Acme", "size": 3}}});
    let out = dump_objects(&data, &options).unwrap();
    assert_eq!(out, "U(1|{paris:(Acme|3)})");

    let reparsed = parse(&format!("{schema}\n###\n{out}"), "offices.maxi").unwrap();
    let offices = &reparsed.records[0].values[1];
    assert_eq!(
        offices.get("paris").and_then(|c| c.get("size")),
        Some(&maxi_core::Value::Int(3))
    );
}

#[test]
fn test_identified_map_values_are_promoted() {
    let schema = "C:Company(id:int|name)\nU:User(id:int|offices:map<str,C>)";
    let options = DumpOptions::new()
        .with_alias("U")
        .with_schema(schema)
        .include_types(false);
    let data = json!({
        "id": 1,
        "offices": {"paris": {"id": 7, "name": "Acme"}, "rome": {"name": "Tiny"}},
    });
    let out = dump_objects(&data, &options).unwrap();
    assert_eq!(out, "U(1|{paris:7,rome:(|Tiny)})\nC(7|Acme)");
}
