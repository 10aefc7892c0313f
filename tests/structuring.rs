extern crate classfile_decompiler;

mod common;

use classfile_decompiler::code_attribute::CmpOp;
use classfile_decompiler::decompile::descriptor::JvmType;
use classfile_decompiler::decompile::exceptions::TryShape;
use classfile_decompiler::decompile::expr::{Expr, Stmt};
use classfile_decompiler::decompile::structured_types::shape_of;
use classfile_decompiler::decompile::{CompilationUnit, Decompiler, MethodBody, StructuredStmt};

use common::op::*;
use common::*;

fn decompile(class: &ClassBuilder) -> CompilationUnit {
    Decompiler::default()
        .decompile_bytes(&class.build())
        .expect("class should decompile")
}

fn body<'a>(unit: &'a CompilationUnit, name: &str) -> &'a MethodBody {
    let method = unit
        .class
        .methods
        .iter()
        .find(|m| m.name == name)
        .unwrap_or_else(|| panic!("no method {}", name));
    assert!(method.error.is_none(), "{}: {:?}", name, method.error);
    method.body.as_ref().expect("method should have a body")
}

fn count_nodes(stmts: &[StructuredStmt], pred: impl Fn(&StructuredStmt) -> bool) -> usize {
    let mut n = 0;
    for stmt in stmts {
        stmt.walk(&mut |s| {
            if pred(s) {
                n += 1;
            }
        });
    }
    n
}

#[test]
fn test_straight_line_has_no_constructs() {
    let mut class = ClassBuilder::new("a/Main");
    let a = class.method_ref("a/Main", "a", "()V");
    let b = class.method_ref("a/Main", "b", "()V");
    let c = code(&[&op_ref(INVOKESTATIC, a), &op_ref(INVOKESTATIC, b), &[RETURN]]);
    class.method(ACC_STATIC, "f", "()V", MethodCode::new(c));

    let unit = decompile(&class);
    let body = body(&unit, "f");
    assert_eq!(shape_of(&body.statements), "Simple,Simple");
    assert!(!body.approximate);
    assert_eq!(
        count_nodes(&body.statements, |s| matches!(
            s,
            StructuredStmt::While { .. } | StructuredStmt::Try { .. } | StructuredStmt::Goto(_)
        )),
        0
    );
}

#[test]
fn test_guarded_loop_is_while() {
    // while (a < b) a++;
    let mut class = ClassBuilder::new("a/Main");
    let c = code(&[
        &[ILOAD_0, ILOAD_1],
        &branch(IF_ICMPGE, 2, 11),
        &[IINC, 0, 1],
        &branch(GOTO, 8, 0),
        &[RETURN],
    ]);
    class.method(ACC_STATIC, "f", "(II)V", MethodCode::new(c));

    let unit = decompile(&class);
    let body = body(&unit, "f");
    assert_eq!(shape_of(&body.statements), "While[Simple]");
    match &body.statements[0] {
        StructuredStmt::While { condition, .. } => {
            assert!(matches!(condition, Expr::Compare { op: CmpOp::Lt, .. }))
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_bottom_tested_loop_is_do_while() {
    // do { a(); n--; } while (n > 0); c();
    let mut class = ClassBuilder::new("a/Main");
    let a = class.method_ref("a/Main", "a", "()V");
    let after = class.method_ref("a/Main", "c", "()V");
    let c = code(&[
        &op_ref(INVOKESTATIC, a),
        &[IINC, 0, 0xff],
        &[ILOAD_0],
        &branch(IFGT, 7, 0),
        &op_ref(INVOKESTATIC, after),
        &[RETURN],
    ]);
    class.method(ACC_STATIC, "f", "(I)V", MethodCode::new(c));

    let unit = decompile(&class);
    let body = body(&unit, "f");
    assert_eq!(shape_of(&body.statements), "DoWhile[Simple,Simple],Simple");
    match &body.statements[0] {
        StructuredStmt::DoWhile { condition, .. } => {
            assert!(matches!(condition, Expr::Compare { op: CmpOp::Gt, .. }))
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_if_else_merges_before_tail() {
    // if (x > 0) a(); else b(); c();
    let mut class = ClassBuilder::new("a/Main");
    let a = class.method_ref("a/Main", "a", "()V");
    let b = class.method_ref("a/Main", "b", "()V");
    let tail = class.method_ref("a/Main", "c", "()V");
    let c = code(&[
        &[ILOAD_0],
        &branch(IFLE, 1, 10),
        &op_ref(INVOKESTATIC, a),
        &branch(GOTO, 7, 13),
        &op_ref(INVOKESTATIC, b),
        &op_ref(INVOKESTATIC, tail),
        &[RETURN],
    ]);
    class.method(ACC_STATIC, "f", "(I)V", MethodCode::new(c));

    let unit = decompile(&class);
    let body = body(&unit, "f");
    assert_eq!(shape_of(&body.statements), "If[Simple|Simple],Simple");
    match &body.statements[0] {
        StructuredStmt::If { condition, .. } => {
            assert!(matches!(condition, Expr::Compare { op: CmpOp::Gt, .. }))
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_conditional_value_becomes_ternary() {
    // return x > 0 ? 1 : 2;
    let mut class = ClassBuilder::new("a/Main");
    let c = code(&[
        &[ILOAD_0],
        &branch(IFLE, 1, 8),
        &[ICONST_1],
        &branch(GOTO, 5, 9),
        &[ICONST_2],
        &[IRETURN],
    ]);
    class.method(ACC_STATIC, "f", "(I)I", MethodCode::new(c));

    let unit = decompile(&class);
    let body = body(&unit, "f");
    assert_eq!(shape_of(&body.statements), "Simple");
    match body.statements[0].as_stmt() {
        Some(Stmt::Return(Some(Expr::Ternary { .. }))) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_counting_loop_with_debug_names_is_for() {
    // int s = 0; for (int i = 0; i < n; i++) s += i; return s;
    let mut class = ClassBuilder::new("a/Main");
    let c = code(&[
        &[ICONST_0, ISTORE_1, ICONST_0, ISTORE_2],
        &[ILOAD_2, ILOAD_0],
        &branch(IF_ICMPGE, 6, 19),
        &[ILOAD_1, ILOAD_2, IADD, ISTORE_1],
        &[IINC, 2, 1],
        &branch(GOTO, 16, 4),
        &[ILOAD_1, IRETURN],
    ]);
    let method = MethodCode::new(c)
        .local(0, 21, "n", "I", 0)
        .local(2, 19, "s", "I", 1)
        .local(4, 15, "i", "I", 2);
    class.method(ACC_STATIC, "sum", "(I)I", method);

    let unit = decompile(&class);
    let body = body(&unit, "sum");
    assert_eq!(shape_of(&body.statements), "Declare,For[Simple],Simple");
    match &body.statements[1] {
        StructuredStmt::For {
            init,
            condition,
            update,
            ..
        } => {
            match init.as_deref() {
                Some(StructuredStmt::Declare { var, init: Some(v), .. }) => {
                    assert_eq!(var.name.as_deref(), Some("i"));
                    assert_eq!(v, &Expr::IntLiteral(0));
                }
                other => panic!("unexpected init {:?}", other),
            }
            assert!(matches!(condition, Expr::Compare { op: CmpOp::Lt, .. }));
            assert!(matches!(
                update.as_deref().and_then(|u| u.as_stmt()),
                Some(Stmt::Iinc { amount: 1, .. })
            ));
        }
        other => panic!("unexpected {:?}", other),
    }
    match &body.statements[0] {
        StructuredStmt::Declare { var, .. } => assert_eq!(var.name.as_deref(), Some("s")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_typed_handler_is_catch_clause() {
    // try { a(); } catch (IOException e) { b(); } c();
    let mut class = ClassBuilder::new("a/Main");
    let a = class.method_ref("a/Main", "a", "()V");
    let b = class.method_ref("a/Main", "b", "()V");
    let tail = class.method_ref("a/Main", "c", "()V");
    let c = code(&[
        &op_ref(INVOKESTATIC, a),
        &branch(GOTO, 3, 10),
        &[ASTORE_0],
        &op_ref(INVOKESTATIC, b),
        &op_ref(INVOKESTATIC, tail),
        &[RETURN],
    ]);
    class.method(
        ACC_STATIC,
        "f",
        "()V",
        MethodCode::new(c).catching(0, 3, 6, Some("java/io/IOException")),
    );

    let unit = decompile(&class);
    let body = body(&unit, "f");
    assert_eq!(shape_of(&body.statements), "Try[Simple|Simple],Simple");
    assert!(!body.approximate);
    match &body.statements[0] {
        StructuredStmt::Try {
            shape,
            catches,
            finally_body,
            ..
        } => {
            assert_eq!(*shape, TryShape::CatchOnly);
            assert_eq!(catches[0].exception_types, vec!["java/io/IOException".to_string()]);
            assert_eq!(catches[0].var.index, 0);
            assert_eq!(catches[0].var.ty, JvmType::Reference("java/io/IOException".into()));
            assert!(finally_body.is_none());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_inlined_finally_copy_is_removed() {
    // try { a(); } finally { b(); }
    let mut class = ClassBuilder::new("a/Main");
    let a = class.method_ref("a/Main", "a", "()V");
    let b = class.method_ref("a/Main", "b", "()V");
    let c = code(&[
        &op_ref(INVOKESTATIC, a),
        &op_ref(INVOKESTATIC, b),
        &branch(GOTO, 6, 15),
        &[ASTORE_0],
        &op_ref(INVOKESTATIC, b),
        &[ALOAD_0, ATHROW],
        &[RETURN],
    ]);
    class.method(ACC_STATIC, "f", "()V", MethodCode::new(c).catching(0, 3, 9, None));

    let unit = decompile(&class);
    let body = body(&unit, "f");
    assert_eq!(shape_of(&body.statements), "Try[Simple|Simple]");
    match &body.statements[0] {
        StructuredStmt::Try {
            shape,
            catches,
            finally_body: Some(finally),
            ..
        } => {
            assert_eq!(*shape, TryShape::FinallyInlined);
            assert!(catches.is_empty());
            assert_eq!(finally.len(), 1);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_javac_synchronized_block() {
    // synchronized (this) { a(); }
    let mut class = ClassBuilder::new("a/Main");
    let a = class.method_ref("a/Main", "a", "()V");
    let c = code(&[
        &[ALOAD_0, DUP, ASTORE_1, MONITORENTER],
        &op_ref(INVOKESTATIC, a),
        &[ALOAD_1, MONITOREXIT],
        &branch(GOTO, 9, 17),
        &[ASTORE_2, ALOAD_1, MONITOREXIT, ALOAD_2, ATHROW],
        &[RETURN],
    ]);
    let method = MethodCode::new(c)
        .catching(4, 9, 12, None)
        .catching(12, 15, 12, None);
    class.method(ACC_PUBLIC, "f", "()V", method);

    let unit = decompile(&class);
    let body = body(&unit, "f");
    assert_eq!(shape_of(&body.statements), "Synchronized[Simple]");
    match &body.statements[0] {
        StructuredStmt::Synchronized { lock, .. } => assert_eq!(lock, &Expr::This),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
        count_nodes(&body.statements, |s| matches!(
            s.as_stmt(),
            Some(Stmt::MonitorEnter(_) | Stmt::MonitorExit(_))
        )),
        0
    );
}

fn try_shape(stmt: &StructuredStmt) -> TryShape {
    match stmt {
        StructuredStmt::Try { shape, .. } => *shape,
        other => panic!("expected a try, got {:?}", other),
    }
}

#[test]
fn test_javac_catch_finally_is_one_try() {
    // try { a(); } catch (Exception e) { b(); } finally { c(); }
    let mut class = ClassBuilder::new("a/Main");
    let a = class.method_ref("a/Main", "a", "()V");
    let b = class.method_ref("a/Main", "b", "()V");
    let fin = class.method_ref("a/Main", "c", "()V");
    let c = code(&[
        &op_ref(INVOKESTATIC, a),
        &op_ref(INVOKESTATIC, fin),
        &branch(GOTO, 6, 25),
        &[ASTORE_0],
        &op_ref(INVOKESTATIC, b),
        &op_ref(INVOKESTATIC, fin),
        &branch(GOTO, 16, 25),
        &[ASTORE_1],
        &op_ref(INVOKESTATIC, fin),
        &[ALOAD_1, ATHROW],
        &[RETURN],
    ]);
    let method = MethodCode::new(c)
        .catching(0, 3, 9, Some("java/lang/Exception"))
        .catching(0, 3, 19, None)
        .catching(9, 13, 19, None);
    class.method(ACC_STATIC, "f", "()V", method);

    let unit = decompile(&class);
    let body = body(&unit, "f");
    assert_eq!(shape_of(&body.statements), "Try[Simple|Simple|Simple]");
    assert_eq!(try_shape(&body.statements[0]), TryShape::CatchFinallyNested);
    assert!(!body.approximate);
}

#[test]
fn test_nested_finally_blocks() {
    // try { try { a(); } finally { b(); } } finally { c(); }
    let mut class = ClassBuilder::new("a/Main");
    let a = class.method_ref("a/Main", "a", "()V");
    let b = class.method_ref("a/Main", "b", "()V");
    let fin = class.method_ref("a/Main", "c", "()V");
    let c = code(&[
        &op_ref(INVOKESTATIC, a),
        &op_ref(INVOKESTATIC, b),
        &branch(GOTO, 6, 15),
        &[ASTORE_0],
        &op_ref(INVOKESTATIC, b),
        &[ALOAD_0, ATHROW],
        &op_ref(INVOKESTATIC, fin),
        &branch(GOTO, 18, 27),
        &[ASTORE_1],
        &op_ref(INVOKESTATIC, fin),
        &[ALOAD_1, ATHROW],
        &[RETURN],
    ]);
    let method = MethodCode::new(c)
        .catching(0, 3, 9, None)
        .catching(0, 15, 21, None);
    class.method(ACC_STATIC, "f", "()V", method);

    let unit = decompile(&class);
    let body = body(&unit, "f");
    assert_eq!(shape_of(&body.statements), "Try[Try[Simple|Simple]|Simple]");
    match &body.statements[0] {
        StructuredStmt::Try {
            shape, try_body, ..
        } => {
            assert_eq!(*shape, TryShape::FinallyInlined);
            assert_eq!(try_shape(&try_body[0]), TryShape::FinallyInlined);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_outer_entry_listed_first_still_nests() {
    // try { try { a(); } catch (IOException e) { b(); } c(); } catch (Exception e) { d(); }
    let mut class = ClassBuilder::new("a/Main");
    let a = class.method_ref("a/Main", "a", "()V");
    let b = class.method_ref("a/Main", "b", "()V");
    let cc = class.method_ref("a/Main", "c", "()V");
    let d = class.method_ref("a/Main", "d", "()V");
    let c = code(&[
        &op_ref(INVOKESTATIC, a),
        &branch(GOTO, 3, 10),
        &[ASTORE_0],
        &op_ref(INVOKESTATIC, b),
        &op_ref(INVOKESTATIC, cc),
        &branch(GOTO, 13, 20),
        &[ASTORE_0],
        &op_ref(INVOKESTATIC, d),
        &[RETURN],
    ]);
    let method = MethodCode::new(c)
        .catching(0, 13, 16, Some("java/lang/Exception"))
        .catching(0, 3, 6, Some("java/io/IOException"));
    class.method(ACC_STATIC, "f", "()V", method);

    let unit = decompile(&class);
    let body = body(&unit, "f");
    assert_eq!(shape_of(&body.statements), "Try[Try[Simple|Simple],Simple|Simple]");
    match &body.statements[0] {
        StructuredStmt::Try {
            catches, try_body, ..
        } => {
            assert_eq!(catches[0].exception_types, vec!["java/lang/Exception".to_string()]);
            match &try_body[0] {
                StructuredStmt::Try { catches, .. } => {
                    assert_eq!(catches[0].exception_types, vec!["java/io/IOException".to_string()])
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_single_exit_synchronized_block() {
    // synchronized (this) { a(); } with an unprotected unlock handler
    let mut class = ClassBuilder::new("a/Main");
    let a = class.method_ref("a/Main", "a", "()V");
    let c = code(&[
        &[ALOAD_0, DUP, ASTORE_1, MONITORENTER],
        &op_ref(INVOKESTATIC, a),
        &[ALOAD_1, MONITOREXIT],
        &branch(GOTO, 9, 17),
        &[ASTORE_2, ALOAD_1, MONITOREXIT, ALOAD_2, ATHROW],
        &[RETURN],
    ]);
    class.method(ACC_PUBLIC, "f", "()V", MethodCode::new(c).catching(4, 9, 12, None));

    let unit = decompile(&class);
    let body = body(&unit, "f");
    assert_eq!(shape_of(&body.statements), "Synchronized[Simple]");
    match &body.statements[0] {
        StructuredStmt::Synchronized { lock, .. } => assert_eq!(lock, &Expr::This),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_subroutine_finally() {
    // try { a(); } finally { c(); } compiled with jsr/ret
    let mut class = ClassBuilder::new("a/Main");
    let a = class.method_ref("a/Main", "a", "()V");
    let fin = class.method_ref("a/Main", "c", "()V");
    let c = code(&[
        &op_ref(INVOKESTATIC, a),
        &branch(JSR, 3, 15),
        &branch(GOTO, 6, 21),
        &[ASTORE_1],
        &branch(JSR, 10, 15),
        &[ALOAD_1, ATHROW],
        &[ASTORE_2],
        &op_ref(INVOKESTATIC, fin),
        &[RET, 2],
        &[RETURN],
    ]);
    class.method(ACC_STATIC, "f", "()V", MethodCode::new(c).catching(0, 3, 9, None));

    let unit = decompile(&class);
    let body = body(&unit, "f");
    assert_eq!(shape_of(&body.statements), "Try[Simple|Simple]");
    assert_eq!(try_shape(&body.statements[0]), TryShape::FinallyJsr);
}
