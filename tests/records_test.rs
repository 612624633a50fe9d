use maxi_core::api::parse;
use maxi_core::ast::Value;
use maxi_core::error::ErrorCode;

#[test]
fn test_multiline_record_tracks_lines() {
    let source = "U(id|tags)\n###\nU(1|[a,\n b,\n c])\nU(2|[])";
    let result = parse(source, "test.maxi").unwrap();
    assert_eq!(result.records.len(), 2);
    assert_eq!(result.records[0].line, 3);
    assert_eq!(result.records[1].line, 6);
    assert_eq!(
        result.records[0].values[1],
        Value::Array(vec!["a".into(), "b".into(), "c".into()])
    );
}

#[test]
fn test_several_records_on_one_line() {
    let result = parse("U(id)\n###\nU(1) U(2)U(3)", "test.maxi").unwrap();
    assert_eq!(result.records.len(), 3);
    assert!(result.records.iter().all(|r| r.line == 3));
}

#[test]
fn test_quotes_and_escapes_inside_records() {
    let source = r#"N(id|text)
###
N(1|"a) b | c")
N(2|"line\nbreak \"quoted\"")"#;
    let result = parse(source, "test.maxi").unwrap();
    assert_eq!(result.records[0].values[1], "a) b | c".into());
    assert_eq!(
        result.records[1].values[1],
        "line\nbreak \"quoted\"".into()
    );
}

#[test]
fn test_empty_and_explicit_null() {
    let result = parse("U(id|role=guest|note)\n###\nU(1||)\nU(2|~|x)", "test.maxi").unwrap();
    assert_eq!(
        result.records[0].values,
        vec![Value::Int(1), "guest".into(), Value::Null]
    );
    assert_eq!(
        result.records[1].values,
        vec![Value::Int(2), Value::Null, "x".into()]
    );
}

#[test]
fn test_typed_defaults_are_coerced() {
    let result = parse(
        "U(id|age:int=18|active:bool=true|label=\"007\"|tag=007)\n###\nU(1)",
        "test.maxi",
    )
    .unwrap();
    assert_eq!(
        result.records[0].values,
        vec![
            Value::Int(1),
            Value::Int(18),
            Value::Bool(true),
            "007".into(),
            "007".into()
        ]
    );
}

#[test]
fn test_discriminator_inference() {
    let source = "D:Dog(name|type|age:int)\nC:Cat(name|type=feline|age:int)\n###\nD(Rex|3)\nC(Tom|5)\nD(Max|wolf|2)";
    let result = parse(source, "test.maxi").unwrap();
    assert_eq!(
        result.records[0].values,
        vec!["Rex".into(), "dog".into(), Value::Int(3)]
    );
    assert_eq!(
        result.records[1].values,
        vec!["Tom".into(), "feline".into(), Value::Int(5)]
    );
    assert_eq!(result.records[2].values[1], "wolf".into());
}

#[test]
fn test_no_discriminator_inference_in_strict_mode() {
    let source = "@mode:strict\nD:Dog(name|type|age:int)\n###\nD(Rex|3)";
    let result = parse(source, "test.maxi").unwrap();
    assert_eq!(
        result.records[0].values,
        vec!["Rex".into(), "3".into(), Value::Null]
    );
}

#[test]
fn test_strict_mode_keeps_untyped_strings() {
    let result = parse("@mode:strict\nU(id|code)\n###\nU(1|007)", "test.maxi").unwrap();
    assert_eq!(result.records[0].values, vec!["1".into(), "007".into()]);
}

#[test]
fn test_nested_inline_objects() {
    let source = r#"
        P:Point(x:int|y:int)
        L:Line(from:P|to:P|points:P[])
        ###
        L((0|0)|(3|4)|[(1|1),(2|2)])
    "#;
    let result = parse(source, "test.maxi").unwrap();
    let values = &result.records[0].values;
    assert_eq!(values[1].get("y"), Some(&Value::Int(4)));
    match &values[2] {
        Value::Array(points) => {
            assert_eq!(points.len(), 2);
            assert_eq!(points[1].get("x"), Some(&Value::Int(2)));
        }
        other => panic!("expected an array, got {other:?}"),
    }
}

#[test]
fn test_untyped_inline_value_is_a_tuple() {
    let result = parse("U(id|extra)\n###\nU(1|(a|2))", "test.maxi").unwrap();
    assert_eq!(
        result.records[0].values[1],
        Value::Tuple(vec!["a".into(), Value::Int(2)])
    );
}

#[test]
fn test_unknown_alias_lax_and_strict() {
    let lax = parse("U(id)\n###\nU(1)\nQ(1|x)", "test.maxi").unwrap();
    assert_eq!(lax.records.len(), 2);
    assert_eq!(lax.warnings[0].code, ErrorCode::UnknownType);
    assert_eq!(lax.warnings[0].line, Some(4));

    let strict = parse("@mode:strict\nU(id)\n###\nU(1)\nQ(1|x)", "test.maxi");
    assert_eq!(strict.unwrap_err().code(), ErrorCode::UnknownType);
}

#[test]
fn test_negative_and_trailing_dot_numbers() {
    let result = parse("N(a:int|b:decimal|c:decimal|d:int)\n###\nN(-5|-2.5|12.|1.5)", "test.maxi").unwrap();
    assert_eq!(
        result.records[0].values,
        vec![
            Value::Int(-5),
            Value::Decimal(-2.5),
            Value::Int(12),
            "1.5".into()
        ]
    );
}

#[test]
fn test_bool_pass_through() {
    let result = parse("B(a:bool|b:bool|c:bool)\n###\nB(0|false|yes)", "test.maxi").unwrap();
    assert_eq!(
        result.records[0].values,
        vec![Value::Bool(false), Value::Bool(false), "yes".into()]
    );
}

#[test]
fn test_base64_padding_only_in_lax() {
    let lax = parse("F(data:bytes@base64)\n###\nF(YWJj)\nF(YWI)", "test.maxi").unwrap();
    assert_eq!(lax.records[0].values[0], "YWJj".into());
    assert_eq!(lax.records[1].values[0], "YWI=".into());

    let strict = parse("@mode:strict\nF(data:bytes@base64)\n###\nF(YWI)", "test.maxi").unwrap();
    assert_eq!(strict.records[0].values[0], "YWI".into());
}

#[test]
fn test_unseparated_schema_followed_by_records() {
    let source = "@mode:lax\nU:User(id:int|name)\nU(1|Ann)\nU(-2|Bob)\nU(~|Nobody)";
    let result = parse(source, "test.maxi").unwrap();
    assert_eq!(result.schema.len(), 1);
    let ids: Vec<_> = result.records.iter().map(|r| r.values[0].clone()).collect();
    assert_eq!(ids, vec![Value::Int(1), Value::Int(-2), Value::Null]);
}
