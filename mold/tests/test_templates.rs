use std::collections::BTreeMap;

use mold::value::Value;
use mold::{context, ErrorKind, HtmlEscapeMode, Mold, Settings, UndefinedBehavior};

use similar_asserts::assert_eq;

fn render(source: &str, input: Value) -> String {
    Mold::new().bake(source).unwrap().render(input).unwrap()
}

#[test]
fn test_literal_identity() {
    let source = "Hello,\n  world & <friends> say \"hi\"";
    assert_eq!(render(source, Value::from(())), source);
    assert_eq!(render(source, Value::from(vec![1, 2])), source);
    for source in ["hello\n", "\n  hello", "\n  hello\n  ", "\n", ""] {
        assert_eq!(render(source, Value::from(())), source);
    }
}

#[test]
fn test_trim_only_next_to_directives() {
    assert_eq!(render("a\n<<t $in>>\nb", Value::from(1)), "a1b");
    assert_eq!(render("<<t $in>>\n", Value::from(1)), "1");
    assert_eq!(render("<<t $in>>\n  x\n", Value::from(1)), "1x\n");
}

#[test]
fn test_text_escapes() {
    assert_eq!(render("<<t $in>>", Value::from("<&\"")), "&lt;&amp;&quot;");
    assert_eq!(render("<<text $in>>", Value::from("a > b")), "a > b");
    assert_eq!(render("<<t $in>>", Value::from("&amp;")), "&amp;amp;");
}

#[test]
fn test_null_output() {
    assert_eq!(render("<<t $in>>|<<t null>>|<<h none>>", Value::from(())), "null|null|null");
    let input: Value = serde_json::from_str::<serde_json::Value>(r#"{"a": null}"#)
        .unwrap()
        .into();
    assert_eq!(render("<<t $in.a>>;<<t $in.b>>;", input), "null;;");
}

#[test]
fn test_html_does_not_escape() {
    assert_eq!(render("<<h $in>>", Value::from("<&\"")), "<&\"");
    assert_eq!(render("<<html $in>>", Value::from("<b>x</b>")), "<b>x</b>");
}

#[test]
fn test_extended_escape_mode() {
    let mold = Mold::with_settings(
        (),
        Settings {
            html_escape: HtmlEscapeMode::Extended,
            ..Settings::default()
        },
    );
    let r = mold.bake("<<t $in>>").unwrap();
    assert_eq!(r.render("<a & b>").unwrap(), "&lt;a &amp; b&gt;");
}

#[test]
fn test_sequence_loop() {
    let r = Mold::new().bake("<<for e $in>>(<<t e>>)<</for>>").unwrap();
    assert_eq!(r.render(vec![1, 2, 3]).unwrap(), "(1)(2)(3)");

    let r = Mold::new()
        .bake("<<for e $in>>(<<t e>>, <<t $i>>)<</for>>")
        .unwrap();
    assert_eq!(r.render(vec![1, 2, 3]).unwrap(), "(1, 0)(2, 1)(3, 2)");
}

#[test]
fn test_key_loop() {
    let input = context! { x => 10, y => 20 };
    let r = Mold::new()
        .bake("<<for p, v in $in>><<t p>>=<<t v>><</for>>")
        .unwrap();
    assert_eq!(r.render(input.clone()).unwrap(), "x=10y=20");

    let r = Mold::new()
        .bake("<<for p, v in $in>><<if $i>>, <</if>><<t p>>=<<t v>><</for>>")
        .unwrap();
    assert_eq!(r.render(input.clone()).unwrap(), "x=10, y=20");

    let r = Mold::new().bake("<<for p in $in>>[<<t p>>]<</for>>").unwrap();
    assert_eq!(r.render(input).unwrap(), "[x][y]");
}

#[test]
fn test_key_loop_over_sequence() {
    let r = Mold::new()
        .bake("<<for idx, item in $in>><<t idx>>:<<t item>>;<</for>>")
        .unwrap();
    assert_eq!(r.render(vec!["a", "b"]).unwrap(), "0:a;1:b;");

    let r = Mold::new()
        .bake("<<for idx in $in>><<t idx === '1'>>,<<t $i === 1>>;<</for>>")
        .unwrap();
    assert_eq!(r.render(vec!["a", "b"]).unwrap(), "false,false;true,true;");
}

#[test]
fn test_key_loop_keeps_insertion_order() {
    let input: Value = [("zeta", 1), ("alpha", 2), ("mid", 3)].into_iter().collect();
    let r = Mold::new().bake("<<for k, v in $in>><<t k>><</for>>").unwrap();
    assert_eq!(r.render(input).unwrap(), "zetaalphamid");
}

#[test]
fn test_nested_loops_restore_index() {
    let r = Mold::new()
        .bake("<<for row $in>><<for cell row>><<t $i>><</for>>|<<t $i>>;<</for>>")
        .unwrap();
    let input = vec![vec![7, 8], vec![9]];
    assert_eq!(r.render(input).unwrap(), "01|0;0|1;");
}

#[test]
fn test_loop_over_nothing() {
    let r = Mold::new().bake("a<<for x $in>>x<</for>>b").unwrap();
    assert_eq!(r.render(()).unwrap(), "ab");
    assert_eq!(r.render(Vec::<i32>::new()).unwrap(), "ab");
    assert_eq!(r.render(Value::UNDEFINED).unwrap(), "ab");
}

#[test]
fn test_loop_over_map_needs_key_form() {
    let r = Mold::new().bake("<<for x $in>><<t x>><</for>>").unwrap();
    let err = r.render(context! { a => 1 }).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(
        err.detail(),
        Some("cannot iterate over map as a sequence, use `for key, value in ...`")
    );
    let err = r.render(42).unwrap_err();
    assert_eq!(err.detail(), Some("cannot iterate over value of type number"));
}

#[test]
fn test_if_elif_else() {
    let r = Mold::new()
        .bake("<<if $in == 1>>one<<elif $in == 2>>two<<else>>other<</if>>")
        .unwrap();
    assert_eq!(r.render(1).unwrap(), "one");
    assert_eq!(r.render(2).unwrap(), "two");
    assert_eq!(r.render(3).unwrap(), "other");
}

#[test]
fn test_if_without_else() {
    let r = Mold::new().bake("[<<if $in>>yes<</if>>]").unwrap();
    assert_eq!(r.render(true).unwrap(), "[yes]");
    assert_eq!(r.render(false).unwrap(), "[]");
    assert_eq!(r.render("").unwrap(), "[]");
    assert_eq!(r.render(Vec::<i32>::new()).unwrap(), "[]");
}

#[test]
fn test_multiple_elifs() {
    let r = Mold::new()
        .bake("<<if $in < 0>>neg<<elif $in == 0>>zero<<elif $in < 10>>small<</if>>")
        .unwrap();
    assert_eq!(r.render(-3).unwrap(), "neg");
    assert_eq!(r.render(0).unwrap(), "zero");
    assert_eq!(r.render(4).unwrap(), "small");
    assert_eq!(r.render(40).unwrap(), "");
}

#[test]
fn test_input_patterns() {
    let r = Mold::new().bake("<<in {a, b}>><<t a>>-<<t b>>").unwrap();
    assert_eq!(r.render(context! { a => 1, b => "two" }).unwrap(), "1-two");

    let r = Mold::new().bake("<<in data>><<t data.name>>/<<t $in.name>>").unwrap();
    assert_eq!(r.render(context! { name => "x" }).unwrap(), "x/x");
}

#[test]
fn test_do_assignments() {
    let r = Mold::new()
        .bake("<<d total = 0>><<for x $in>><<d total = total + x>><</for>><<t total>>")
        .unwrap();
    assert_eq!(r.render(vec![1, 2, 3]).unwrap(), "6");

    let r = Mold::new()
        .bake("<<for x $in>><<do last = x>><</for>><<t last>>")
        .unwrap();
    assert_eq!(r.render(vec!["a", "b"]).unwrap(), "b");
}

#[test]
fn test_expressions() {
    let input = context! {
        user => context! { name => "Ann", tags => vec!["a", "b"] },
        count => 3,
    };
    let cases = [
        ("<<t user.name>>", "Ann"),
        ("<<t user[\"name\"]>>", "Ann"),
        ("<<t user.tags[1]>>", "b"),
        ("<<t user.tags.length>>", "2"),
        ("<<t count * 2 + 1>>", "7"),
        ("<<t count % 2 === 1 ? \"odd\" : \"even\">>", "odd"),
        ("<<t \"n=\" + count>>", "n=3"),
        ("<<t user.missing || \"anon\">>", "anon"),
        ("<<t user.name && count>>", "3"),
        ("<<t !count>>", "false"),
        ("<<t -count>>", "-3"),
        ("<<t 7 / 2>>", "3.5"),
        ("<<t [1, 2][0]>>", "1"),
        ("<<t {a: 1, \"b\": 2}.b>>", "2"),
        ("<<t null == undefined>>", "true"),
        ("<<t null === undefined>>", "false"),
        ("<<t \"b\" > \"a\">>", "true"),
    ];
    for (source, expected) in cases {
        assert_eq!(render(source, input.clone()), expected, "template: {source}");
    }
}

#[test]
fn test_triple_open_marker() {
    assert_eq!(render("<<<t $in>>", Value::from("x")), "<x");
    assert_eq!(render("a <<<<t $in>>", Value::from("x")), "a <<x");
}

#[test]
fn test_trims_directive_lines() {
    let r = Mold::new()
        .bake("<ul>\n<<for x $in>>\n  <li><<t x>></li>\n<</for>>\n</ul>")
        .unwrap();
    assert_eq!(r.render(vec![1, 2]).unwrap(), "<ul><li>1</li><li>2</li></ul>");
}

#[test]
fn test_multiline_arguments() {
    let r = Mold::new().bake("<<t [\n  1,\n  2\n].length>>").unwrap();
    assert_eq!(r.render(()).unwrap(), "2");
}

#[test]
fn test_render_into_appends() {
    let r = Mold::new().bake("<<t $in>>;").unwrap();
    let mut buffer = String::from("start:");
    r.render_into(1, &mut buffer).unwrap();
    r.render_into(2, &mut buffer).unwrap();
    assert_eq!(buffer, "start:1;2;");
}

#[test]
fn test_render_into_keeps_prefix_on_failure() {
    let r = Mold::new().bake("before<<nope>>after").unwrap();
    let mut buffer = String::new();
    let err = r.render_into((), &mut buffer).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCommand);
    assert_eq!(buffer, "before");
}

#[test]
fn test_render_to_write() {
    let r = Mold::new().bake("<<for x $in>><<t x>>,<</for>>").unwrap();
    let mut out = Vec::new();
    r.render_to_write(vec![1, 2], &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "1,2,");
}

#[test]
fn test_serialize_input() {
    let mut input = BTreeMap::new();
    input.insert("b", vec![1, 2]);
    input.insert("a", vec![3]);
    let r = Mold::new()
        .bake("<<for k, v in $in>><<t k>><<for x v>><<t x>><</for>><</for>>")
        .unwrap();
    assert_eq!(r.render(Value::from_serialize(&input).unwrap()).unwrap(), "a3b12");
}

#[test]
fn test_undefined_behaviors() {
    let lenient = Mold::new();
    let r = lenient.bake("[<<t missing>>]").unwrap();
    assert_eq!(r.render(()).unwrap(), "[]");
    let r = lenient.bake("[<<t missing.attr>>]").unwrap();
    assert_eq!(r.render(()).unwrap_err().kind(), ErrorKind::UndefinedError);

    let chainable = Mold::with_settings(
        (),
        Settings {
            undefined_behavior: UndefinedBehavior::Chainable,
            ..Settings::default()
        },
    );
    let r = chainable.bake("[<<t missing.attr.deeper>>]").unwrap();
    assert_eq!(r.render(()).unwrap(), "[]");

    let strict = Mold::with_settings(
        (),
        Settings {
            undefined_behavior: UndefinedBehavior::Strict,
            ..Settings::default()
        },
    );
    for source in [
        "<<t missing>>",
        "<<if missing>>x<</if>>",
        "<<for x missing>><</for>>",
        "<<if missing && $in>>x<</if>>",
        "<<t missing || 1>>",
    ] {
        let err = strict.bake(source).unwrap().render(()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedError, "template: {source}");
    }
    let r = strict.bake("<<if $in>>x<</if>><<for x $in>><</for>>").unwrap();
    assert_eq!(r.render(()).unwrap(), "");
    let r = strict.bake("<<t $in && missing>>|<<t 0 || 2>>").unwrap();
    assert_eq!(r.render(()).unwrap(), "null|2");
}
