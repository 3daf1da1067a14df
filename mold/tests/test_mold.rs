use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mold::value::Value;
use mold::{context, CompiledTemplate, ErrorKind, Mold, Settings};

use similar_asserts::assert_eq;

#[test]
fn test_named_templates_and_custom_commands() {
    let mold = Mold::new();
    mold.bake_named("item", "(<<t $in>>)").unwrap();
    mold.define("bracket", |_, arg| Ok(Value::from(format!("[{arg}]"))));
    let r = mold.bake("<<item 10>><<bracket 20>>").unwrap();
    assert_eq!(r.render(()).unwrap(), "(10)[20]");
}

#[test]
fn test_dispatch_inside_loops() {
    let mold = Mold::new();
    mold.bake_named("row", "<li><<t $in.name>></li>").unwrap();
    let r = mold.bake("<ul><<for user $in>><<row user>><</for>></ul>").unwrap();
    let input = vec![context! { name => "a" }, context! { name => "b" }];
    assert_eq!(r.render(input).unwrap(), "<ul><li>a</li><li>b</li></ul>");
}

#[test]
fn test_command_argument_is_none_without_text() {
    let mold = Mold::new();
    mold.define("probe", |_, arg| Ok(Value::from(arg.kind().to_string())));
    let r = mold.bake("<<probe>>|<<probe   >>|<<probe 1>>|<<probe missing>>").unwrap();
    assert_eq!(r.render(()).unwrap(), "none|none|number|undefined");
}

#[test]
fn test_command_output_is_verbatim() {
    let mold = Mold::new();
    mold.define("bold", |_, arg| Ok(Value::from(format!("<b>{arg}</b>"))));
    mold.define("nothing", |_, _| Ok(Value::from(())));
    let r = mold.bake("<<bold \"&\">><<nothing 1>>").unwrap();
    assert_eq!(r.render(()).unwrap(), "<b>&</b>");
}

#[test]
fn test_command_sees_state() {
    let mold = Mold::new();
    mold.define("who", |state, _| Ok(Value::from(state.name().unwrap_or("?"))));
    mold.define("peek", |state, _| Ok(state.lookup("x").unwrap_or_default()));
    mold.bake_named("page", "<<who>>").unwrap();
    let r = mold.bake("<<who>>:<<page>>:<<for x $in>><<peek>><</for>>").unwrap();
    assert_eq!(r.render(vec![1, 2]).unwrap(), "?:page:12");
}

#[test]
fn test_command_can_dispatch() {
    let mold = Mold::new();
    mold.bake_named("item", "(<<t $in>>)").unwrap();
    mold.define("twice", |state, arg| {
        let first = state.dispatch("item", arg.clone())?;
        let second = state.dispatch("item", arg)?;
        Ok(Value::from(format!("{first}{second}")))
    });
    let r = mold.bake("<<twice 7>>").unwrap();
    assert_eq!(r.render(()).unwrap(), "(7)(7)");
}

#[test]
fn test_unknown_command() {
    let r = Mold::new().bake("first\n<<nope 1>>").unwrap();
    let err = r.render(()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCommand);
    assert_eq!(err.line(), Some(2));
    insta::assert_snapshot!(err, @"unknown command: Unrecognised template command: 'nope'. (at line 2)");
}

#[test]
fn test_late_registration() {
    let mold = Mold::new();
    let r = mold.bake("<<later>>").unwrap();
    assert_eq!(r.render(()).unwrap_err().kind(), ErrorKind::UnknownCommand);
    mold.bake_named("later", "now").unwrap();
    assert_eq!(r.render(()).unwrap(), "now");
    assert!(mold.remove("later"));
    assert_eq!(r.render(()).unwrap_err().kind(), ErrorKind::UnknownCommand);
}

#[test]
fn test_errors_in_nested_templates_keep_location() {
    let mold = Mold::new();
    mold.bake_named("inner", "line1\n<<t $in.x.y>>").unwrap();
    let r = mold.bake("<<inner 1>>").unwrap();
    let err = r.render(()).unwrap_err();
    assert_eq!(err.name(), Some("inner"));
    assert_eq!(err.line(), Some(2));
    insta::assert_snapshot!(err, @"undefined value: cannot look up attribute of undefined (at inner:2)");
}

#[test]
fn test_recursion_limit() {
    let mold = Mold::with_settings(
        (),
        Settings {
            recursion_limit: 10,
            ..Settings::default()
        },
    );
    mold.bake_named("down", "<<if $in>><<down $in - 1>><<else>>done<</if>>").unwrap();
    assert_eq!(mold.dispatch("down", 5).unwrap(), "done");
    let err = mold.dispatch("down", 50).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(err.detail(), Some("recursion limit exceeded"));

    mold.define("forever", |state, arg| state.dispatch("forever", arg));
    let err = mold.bake("<<forever>>").unwrap().render(()).unwrap_err();
    assert_eq!(err.detail(), Some("recursion limit exceeded"));
}

#[test]
fn test_default_recursion_limit_is_reachable() {
    let limit = Settings::default().recursion_limit;
    let mold = Mold::new();
    mold.bake_named("down", "<<if $in>><<down $in - 1>><<else>>done<</if>>").unwrap();
    assert_eq!(mold.dispatch("down", limit - 10).unwrap(), "done");
    let err = mold.dispatch("down", limit + 10).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(err.detail(), Some("recursion limit exceeded"));

    mold.define("echo", |state, arg| state.dispatch("down", arg));
    mold.bake_named("bounce", "<<if $in>><<echo $in - 1>><<bounce $in - 1>><</if>>").unwrap();
    assert!(mold.dispatch("bounce", limit / 4).is_ok());
}

#[test]
fn test_isolation() {
    let a = Mold::with_bindings(context! { greeting => "hello" });
    let b = Mold::with_bindings(context! { greeting => "ahoy" });
    a.bake_named("only_a", "a").unwrap();
    let ra = a.bake("<<t greeting>>").unwrap();
    let rb = b.bake("<<t greeting>>").unwrap();
    assert_eq!(ra.render(()).unwrap(), "hello");
    assert_eq!(rb.render(()).unwrap(), "ahoy");
    assert_eq!(
        b.bake("<<only_a>>").unwrap().render(()).unwrap_err().kind(),
        ErrorKind::UnknownCommand
    );
    assert_eq!(b.registered_names(), Vec::<String>::new());
}

#[test]
fn test_locals_shadow_bindings() {
    let mold = Mold::with_bindings(context! { x => "global" });
    let r = mold.bake("<<t x>>,<<for x $in>><<t x>><</for>>,<<t x>>").unwrap();
    assert_eq!(r.render(vec!["loop"]).unwrap(), "global,loop,global");
}

#[test]
fn test_function_bindings() {
    let mold = Mold::with_bindings(context! {
        join => Value::from_function(|_, args: &[Value]| {
            let parts: Vec<String> = args.iter().map(|x| x.to_string()).collect();
            Ok(Value::from(parts.join("-")))
        }),
    });
    let r = mold.bake("<<t join(1, \"a\", $in)>>").unwrap();
    assert_eq!(r.render(true).unwrap(), "1-a-true");
    let err = mold.bake("<<t $in(1)>>").unwrap().render(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn test_bake_value() {
    let mold = Mold::new();
    let err = mold.bake_value(None, &Value::from(42)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeError);
    assert_eq!(err.detail(), Some("Mold template must be a string"));
    assert_eq!(err.line(), None);

    let err = mold.bake_value(Some("x"), &Value::from(())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeError);
    assert!(mold.registered_names().is_empty());

    let r = mold
        .bake_value(Some("greet"), &Value::from("hi <<t $in>>"))
        .unwrap();
    assert_eq!(r.name(), Some("greet"));
    assert_eq!(mold.dispatch("greet", "you").unwrap(), "hi you");
}

#[test]
fn test_several_arguments_as_sequence() {
    let mold = Mold::new();
    mold.define("pair", |_, arg| {
        let a = arg.get_item(&Value::from(0)).unwrap_or_default();
        let b = arg.get_item(&Value::from(1)).unwrap_or_default();
        Ok(Value::from(format!("{a}-{b}")))
    });
    mold.bake_named("link", "<a href=\"<<t $in[0]>>\"><<t $in[1]>></a>").unwrap();
    let args = vec![Value::from("x"), Value::from(2)];
    assert_eq!(mold.dispatch("pair", args).unwrap(), "x-2");
    assert_eq!(mold.dispatch("link", vec!["/", "home"]).unwrap(), "<a href=\"/\">home</a>");
    let r = mold.bake("<<pair [1, 'b']>>").unwrap();
    assert_eq!(r.render(()).unwrap(), "1-b");
}

#[test]
fn test_dispatch() {
    let mold = Mold::new();
    mold.bake_named("item", "(<<t $in>>)").unwrap();
    mold.define("count", |_, arg| Ok(Value::from(arg.len().unwrap_or(0))));
    mold.define("silent", |_, _| Ok(Value::UNDEFINED));
    assert_eq!(mold.dispatch("item", 1).unwrap(), "(1)");
    assert_eq!(mold.dispatch("count", vec![1, 2, 3]).unwrap(), "3");
    assert_eq!(mold.dispatch("silent", ()).unwrap(), "");
    assert_eq!(
        mold.dispatch("missing", ()).unwrap_err().kind(),
        ErrorKind::UnknownCommand
    );
    assert_eq!(
        mold.registered_names(),
        vec!["item".to_string(), "count".to_string(), "silent".to_string()]
    );
}

#[test]
fn test_instantiate_shares_compiled_template() {
    let compiled = CompiledTemplate::new(Some("shared"), "<<t prefix>><<t $in>>").unwrap();
    let a = Mold::with_bindings(context! { prefix => "a:" });
    let b = Mold::with_bindings(context! { prefix => "b:" });
    assert_eq!(a.instantiate(&compiled).render(1).unwrap(), "a:1");
    assert_eq!(b.instantiate(&compiled).render(2).unwrap(), "b:2");
    assert!(a.registered_names().is_empty());
}

#[test]
fn test_concurrent_renders() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mold = Mold::new();
    {
        let calls = calls.clone();
        mold.define("tick", move |_, _| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(Value::from(()))
        });
    }
    let r = mold.bake("<<for x $in>><<tick>><<t x>><</for>>").unwrap();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let r = r.clone();
            scope.spawn(move || {
                assert_eq!(r.render(vec![1, 2, 3]).unwrap(), "123");
            });
        }
    });
    assert_eq!(calls.load(Ordering::Relaxed), 12);
}
