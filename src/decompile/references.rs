//! Use counts of the types a reconstructed unit refers to. A printer uses
//! them to decide between simple and qualified names.

use std::collections::BTreeMap;

use log::warn;

use super::descriptor::JvmType;
use super::expr::{Expr, Stmt};
use super::java_ast::{AnnotationValue, CompilationUnit, JavaAnnotation, JavaType};
use super::structured_types::{StructuredStmt, SwitchKind};

/// Use counter keyed by internal type name (`java/util/List`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceTracker {
    counts: BTreeMap<String, usize>,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one use of `name`. Descriptor fragments (anything containing
    /// `;`) and empty names are logged and ignored.
    pub fn add(&mut self, name: &str) -> bool {
        if name.is_empty() || name.contains(';') {
            warn!("rejecting malformed type reference {:?}", name);
            return false;
        }
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<usize> {
        self.counts.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.counts.contains_key(name)
    }

    pub fn count(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Count every type the unit names in source: declarations, annotations,
/// local declarations, casts, allocations and static member owners. The
/// unit's own class is left out.
pub fn collect_references(unit: &CompilationUnit) -> ReferenceTracker {
    let mut collector = Collector {
        tracker: ReferenceTracker::new(),
        own: &unit.class.internal_name,
    };
    collector.collect(unit);
    collector.tracker
}

struct Collector<'a> {
    tracker: ReferenceTracker,
    own: &'a str,
}

impl Collector<'_> {
    fn name(&mut self, name: &str) {
        if name != self.own {
            self.tracker.add(name);
        }
    }

    fn java_type(&mut self, ty: &JavaType) {
        let mut names = Vec::new();
        ty.mentioned_classes(&mut names);
        for n in &names {
            self.name(n);
        }
    }

    fn jvm_type(&mut self, ty: &JvmType) {
        if let Some(n) = ty.class_name() {
            self.name(n);
        }
    }

    fn annotations(&mut self, annotations: &[JavaAnnotation]) {
        for a in annotations {
            self.name(&a.type_name);
            for arg in &a.arguments {
                self.annotation_value(&arg.value);
            }
        }
    }

    fn annotation_value(&mut self, value: &AnnotationValue) {
        match value {
            AnnotationValue::EnumConstant { type_name, .. } => self.name(type_name),
            AnnotationValue::ClassLiteral(name) => self.name(name),
            AnnotationValue::AnnotationLiteral(a) => self.annotations(std::slice::from_ref(a)),
            AnnotationValue::ArrayLiteral(values) => {
                for v in values {
                    self.annotation_value(v);
                }
            }
            _ => {}
        }
    }

    fn collect(&mut self, unit: &CompilationUnit) {
        let class = &unit.class;
        self.annotations(&class.annotations);
        for p in &class.type_parameters {
            for b in &p.bounds {
                self.java_type(b);
            }
        }
        if let Some(s) = &class.super_class {
            self.java_type(s);
        }
        for i in &class.interfaces {
            self.java_type(i);
        }
        for field in &class.fields {
            self.annotations(&field.annotations);
            self.java_type(&field.field_type);
            if let Some(init) = &field.initializer {
                self.expr_tree(init);
            }
        }
        for method in &class.methods {
            self.annotations(&method.annotations);
            for p in &method.type_parameters {
                for b in &p.bounds {
                    self.java_type(b);
                }
            }
            self.java_type(&method.return_type);
            for p in &method.parameters {
                self.java_type(&p.param_type);
            }
            for t in &method.throws {
                self.java_type(t);
            }
            if let Some(body) = &method.body {
                for stmt in &body.statements {
                    stmt.walk(&mut |node| self.node(node));
                }
            }
        }
    }

    fn node(&mut self, node: &StructuredStmt) {
        match node {
            StructuredStmt::Declare { var, .. } | StructuredStmt::ForEach { var, .. } => {
                self.jvm_type(&var.ty)
            }
            StructuredStmt::Try { catches, .. } => {
                for c in catches {
                    for t in &c.exception_types {
                        self.name(t);
                    }
                }
            }
            StructuredStmt::Switch {
                kind: SwitchKind::Enum(class),
                ..
            } => self.name(class),
            StructuredStmt::Simple(s) => {
                if let Stmt::FieldStore {
                    owner, object: None, ..
                } = &s.stmt
                {
                    self.name(owner);
                }
            }
            _ => {}
        }
        // `For` init/update and `Labeled` bodies are walked as nodes of their own.
        match node {
            StructuredStmt::For { condition, .. } => self.expr_tree(condition),
            StructuredStmt::Labeled { .. } => {}
            other => other.visit_own_exprs(&mut |e| self.expr(e)),
        }
    }

    fn expr_tree(&mut self, e: &Expr) {
        e.visit(&mut |e| self.expr(e));
    }

    fn expr(&mut self, e: &Expr) {
        match e {
            Expr::ClassLiteral(ty) | Expr::Cast { ty, .. } | Expr::InstanceOf { ty, .. } => self.jvm_type(ty),
            Expr::NewArray { ty, .. } => self.jvm_type(ty),
            Expr::New { class, .. } => self.name(class),
            Expr::FieldGet {
                owner, object: None, ..
            } => self.name(owner),
            Expr::MethodCall {
                owner, receiver: None, ..
            } => self.name(owner),
            _ => {}
        }
    }
}
