extern crate classfile_decompiler;

mod common;

use std::sync::Arc;

use classfile_decompiler::decompile::descriptor::JvmType;
use classfile_decompiler::decompile::expr::{Expr, Stmt};
use classfile_decompiler::decompile::resolver::TypeResolver;
use classfile_decompiler::decompile::structured_types::{shape_of, SwitchKind, SwitchValue};
use classfile_decompiler::decompile::{
    CompilationUnit, DeclarationKind, Decompiler, Event, RecordingSink, StructuredStmt,
};
use classfile_decompiler::source::MapSource;
use classfile_decompiler::DecompileError;

use common::op::*;
use common::*;

const MAP_FIELD: &str = "$SwitchMap$a$Color";

fn simple_class(name: &str) -> ClassBuilder {
    let mut class = ClassBuilder::new(name);
    let a = class.method_ref(name, "a", "()V");
    let c = code(&[&op_ref(INVOKESTATIC, a), &[RETURN]]);
    class.method(ACC_STATIC, "run", "()V", MethodCode::new(c));
    class
}

/// Holder class javac emits for `switch` over `a/Color`: RED -> 1, GREEN -> 2.
fn switch_map_holder() -> Vec<u8> {
    let mut class = ClassBuilder::new("a/Main$1");
    let values = class.method_ref("a/Color", "values", "()[La/Color;");
    let map = class.field_ref("a/Main$1", MAP_FIELD, "[I");
    let red = class.field_ref("a/Color", "RED", "La/Color;");
    let green = class.field_ref("a/Color", "GREEN", "La/Color;");
    let ordinal = class.method_ref("a/Color", "ordinal", "()I");
    let c = code(&[
        &op_ref(INVOKESTATIC, values),
        &[ARRAYLENGTH, NEWARRAY, 10],
        &op_ref(PUTSTATIC, map),
        &op_ref(GETSTATIC, map),
        &op_ref(GETSTATIC, red),
        &op_ref(INVOKEVIRTUAL, ordinal),
        &[ICONST_1, IASTORE],
        &op_ref(GETSTATIC, map),
        &op_ref(GETSTATIC, green),
        &op_ref(INVOKEVIRTUAL, ordinal),
        &[ICONST_2, IASTORE],
        &[RETURN],
    ]);
    class.field(ACC_STATIC | ACC_SYNTHETIC, MAP_FIELD, "[I");
    class.method(ACC_STATIC, "<clinit>", "()V", MethodCode::new(c));
    class.build()
}

/// `switch (c) { case RED: r(); break; case GREEN: g(); }`
fn enum_switch_class() -> Vec<u8> {
    let mut class = ClassBuilder::new("a/Main");
    let map = class.field_ref("a/Main$1", MAP_FIELD, "[I");
    let ordinal = class.method_ref("a/Color", "ordinal", "()I");
    let r = class.method_ref("a/Main", "r", "()V");
    let g = class.method_ref("a/Main", "g", "()V");
    let mut c = code(&[
        &op_ref(GETSTATIC, map),
        &[ALOAD_0],
        &op_ref(INVOKEVIRTUAL, ordinal),
        &[IALOAD],
        &[LOOKUPSWITCH, 0, 0, 0],
    ]);
    // default -> 45, 1 -> 36, 2 -> 42, relative to the switch at 8
    for v in [37i32, 2, 1, 28, 2, 34] {
        c.extend_from_slice(&v.to_be_bytes());
    }
    c.extend_from_slice(&op_ref(INVOKESTATIC, r));
    c.extend_from_slice(&branch(GOTO, 39, 45));
    c.extend_from_slice(&op_ref(INVOKESTATIC, g));
    c.push(RETURN);
    class.method(ACC_STATIC, "f", "(La/Color;)V", MethodCode::new(c));
    class.build()
}

fn switch_of(unit: &CompilationUnit) -> &StructuredStmt {
    let method = unit.class.methods.iter().find(|m| m.name == "f").unwrap();
    assert!(method.error.is_none(), "{:?}", method.error);
    &method.body.as_ref().unwrap().statements[0]
}

#[test]
fn test_failed_method_does_not_abort_class() {
    let mut class = simple_class("a/Main");
    // pop on an empty stack
    class.method(ACC_STATIC, "bad", "()V", MethodCode::new(vec![POP, RETURN]));
    let unit = Decompiler::default().decompile_bytes(&class.build()).unwrap();

    let bad = unit.class.methods.iter().find(|m| m.name == "bad").unwrap();
    let error = bad.error.as_deref().expect("bad method keeps its error");
    assert!(error.contains("bytecode:"));
    assert!(error.contains("0000"));
    assert!(bad.body.is_none());

    let good = unit.class.methods.iter().find(|m| m.name == "run").unwrap();
    assert!(good.error.is_none());
    assert_eq!(shape_of(&good.body.as_ref().unwrap().statements), "Simple");
    assert!(unit.is_approximate());
}

#[test]
fn test_unreadable_code_attribute_is_reported() {
    let mut class = simple_class("a/Main");
    // code_length claims more bytes than the attribute holds
    let c = code(&[&[ICONST_0, POP, NOP], &[RETURN]]);
    class.method(ACC_STATIC, "broken", "()V", MethodCode::new(c).declare_length(9));
    let unit = Decompiler::default().decompile_bytes(&class.build()).unwrap();

    let broken = unit.class.methods.iter().find(|m| m.name == "broken").unwrap();
    assert!(broken.body.is_none());
    let error = broken.error.as_deref().expect("unreadable Code must be reported");
    assert!(error.contains("Code"), "{}", error);
    assert!(error.contains("unreadable"));

    let run = unit.class.methods.iter().find(|m| m.name == "run").unwrap();
    assert!(run.error.is_none());
    assert!(run.body.is_some());
    assert!(unit.is_approximate());
}

#[test]
fn test_fallback_listing_is_limited() {
    let mut class = ClassBuilder::new("a/Main");
    let mut c = vec![NOP; 30];
    c.extend_from_slice(&[POP, RETURN]);
    class.method(ACC_STATIC, "bad", "()V", MethodCode::new(c));
    let unit = Decompiler::default().decompile_bytes(&class.build()).unwrap();
    let error = unit.class.methods[0].error.as_deref().unwrap();
    assert_eq!(error.lines().filter(|l| l.starts_with("  00")).count(), 20);
    assert!(error.contains("more bytes"));
}

#[test]
fn test_malformed_class_is_an_error() {
    let result = Decompiler::default().decompile_bytes(b"not a class file");
    assert!(matches!(result, Err(DecompileError::Format(_))));
}

#[test]
fn test_events_are_well_nested() {
    let mut class = simple_class("a/Main");
    class.method(ACC_STATIC, "bad", "()V", MethodCode::new(vec![POP, RETURN]));
    let decompiler = Decompiler::default();
    let unit = decompiler.decompile_bytes(&class.build()).unwrap();

    let mut sink = RecordingSink::new();
    decompiler.emit_events(&unit, &mut sink);
    assert!(sink.is_well_nested(), "{:?}", sink.violations());

    assert_eq!(
        sink.events.first(),
        Some(&Event::StartDeclaration {
            kind: DeclarationKind::Package,
            name: "a".into()
        })
    );
    assert!(sink.events.contains(&Event::StartDeclaration {
        kind: DeclarationKind::Type,
        name: "a/Main".into()
    }));
    assert!(sink.events.contains(&Event::Reference {
        kind: DeclarationKind::Method,
        name: "a".into(),
        owner: Some("a/Main".into()),
    }));
    assert!(sink.events.contains(&Event::StartError));
}

#[test]
fn test_decompile_all_keeps_input_order() {
    let inputs = vec![
        simple_class("a/One").build(),
        b"garbage".to_vec(),
        simple_class("a/Two").build(),
    ];
    let results = Decompiler::default().decompile_all(&inputs);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().class.internal_name, "a/One");
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().unwrap().class.internal_name, "a/Two");
}

#[test]
fn test_decompile_named_uses_byte_source() {
    let source = MapSource::new().with("a/One", simple_class("a/One").build());
    let decompiler = Decompiler::default().with_source(Arc::new(source));
    let unit = decompiler.decompile_named("a/One").unwrap();
    assert_eq!(unit.class.name, "One");
    assert_eq!(unit.package.as_deref(), Some("a"));

    match decompiler.decompile_named("a/Missing") {
        Err(DecompileError::ClassNotFound(name)) => assert_eq!(name, "a/Missing"),
        other => panic!("unexpected {:?}", other.map(|u| u.class.internal_name)),
    }
}

#[test]
fn test_switch_map_is_read_from_holder() {
    let source = MapSource::new().with("a/Main$1", switch_map_holder());
    let resolver = TypeResolver::new(&source);
    let map = resolver.switch_map("a/Main$1", MAP_FIELD).unwrap();
    assert_eq!(map.get(&1).map(String::as_str), Some("RED"));
    assert_eq!(map.get(&2).map(String::as_str), Some("GREEN"));
    assert_eq!(map.len(), 2);
}

#[test]
fn test_enum_switch_is_recovered() {
    let source = MapSource::new().with("a/Main$1", switch_map_holder());
    let decompiler = Decompiler::default().with_source(Arc::new(source));
    let unit = decompiler.decompile_bytes(&enum_switch_class()).unwrap();

    let stmt = switch_of(&unit);
    assert_eq!(shape_of(std::slice::from_ref(stmt)), "Switch[Simple,Break|Simple]");
    match stmt {
        StructuredStmt::Switch { kind, expr, cases } => {
            assert_eq!(kind, &SwitchKind::Enum("a/Color".into()));
            assert!(matches!(expr, Expr::Local(v) if v.index == 0));
            assert_eq!(cases[0].values, vec![SwitchValue::Enum("RED".into())]);
            assert_eq!(cases[1].values, vec![SwitchValue::Enum("GREEN".into())]);
        }
        other => panic!("unexpected {:?}", other),
    }

    assert!(unit.references.contains("a/Color"));
    assert!(unit.references.count("a/Color") >= 2);
    assert!(!unit.references.contains("a/Main"));
}

#[test]
fn test_missing_switch_map_keeps_int_switch() {
    let unit = Decompiler::default().decompile_bytes(&enum_switch_class()).unwrap();
    match switch_of(&unit) {
        StructuredStmt::Switch { kind, cases, .. } => {
            assert_eq!(kind, &SwitchKind::Int);
            assert_eq!(cases[0].values, vec![SwitchValue::Int(1)]);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(unit.warnings.iter().any(|w| w.contains("no ordinal map")));
    assert!(unit.warnings.iter().any(|w| w.contains("unresolved class a/Main$1")));
}

#[test]
fn test_overloaded_call_casts_unassignable_argument() {
    // static void f(Object o) { show((String) o); show(o); }
    let mut class = ClassBuilder::new("a/Main");
    let show_string = class.method_ref("a/Main", "show", "(Ljava/lang/String;)V");
    let show_object = class.method_ref("a/Main", "show", "(Ljava/lang/Object;)V");
    class.method(ACC_STATIC, "show", "(Ljava/lang/String;)V", MethodCode::new(vec![RETURN]));
    class.method(ACC_STATIC, "show", "(Ljava/lang/Object;)V", MethodCode::new(vec![RETURN]));
    let c = code(&[
        &[ALOAD_0],
        &op_ref(INVOKESTATIC, show_string),
        &[ALOAD_0],
        &op_ref(INVOKESTATIC, show_object),
        &[RETURN],
    ]);
    class.method(ACC_STATIC, "f", "(Ljava/lang/Object;)V", MethodCode::new(c));
    let unit = Decompiler::default().decompile_bytes(&class.build()).unwrap();

    let method = unit.class.methods.iter().find(|m| m.name == "f").unwrap();
    let stmts = &method.body.as_ref().unwrap().statements;
    assert_eq!(shape_of(stmts), "Simple,Simple");
    let arg = |i: usize| match stmts[i].as_stmt() {
        Some(Stmt::ExprStmt(Expr::MethodCall { args, .. })) => args[0].clone(),
        other => panic!("unexpected {:?}", other),
    };
    match arg(0) {
        Expr::Cast { ty, expr } => {
            assert_eq!(ty, JvmType::Reference("java/lang/String".into()));
            assert!(matches!(*expr, Expr::Local(ref v) if v.index == 0));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(arg(1), Expr::Local(ref v) if v.index == 0));
}
