//! Structural events for a printer: declarations, references, line markers,
//! indentation and comment/javadoc/error/import blocks, produced by walking a
//! finished [`CompilationUnit`]. Every start event has a matching end.

use super::expr::{Expr, Stmt};
use super::java_ast::{CompilationUnit, JavaAnnotation, JavaField, JavaMethod};
use super::structured_types::{StructuredStmt, SwitchKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclarationKind {
    Type,
    Field,
    Method,
    Constructor,
    Package,
    Module,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    StartDeclaration { kind: DeclarationKind, name: String },
    EndDeclaration(DeclarationKind),
    /// A use of a declaration; `owner` is the declaring type for members.
    Reference {
        kind: DeclarationKind,
        name: String,
        owner: Option<String>,
    },
    /// Source line of the statement that follows.
    Line(u16),
    /// One statement node, by construct name (`If`, `While`, ...).
    Statement(&'static str),
    Text(String),
    Indent,
    Unindent,
    StartComment,
    EndComment,
    StartJavadoc,
    EndJavadoc,
    StartError,
    EndError,
    StartImports,
    EndImports,
}

pub trait EventSink {
    fn event(&mut self, event: Event);
}

/// Emit the events for `unit` in source order. Synthetic members are
/// skipped unless `include_synthetic` is set.
pub fn walk_unit(unit: &CompilationUnit, sink: &mut dyn EventSink, include_synthetic: bool) {
    let mut w = Walker { sink };
    w.unit(unit, include_synthetic);
}

struct Walker<'a> {
    sink: &'a mut dyn EventSink,
}

impl Walker<'_> {
    fn emit(&mut self, event: Event) {
        self.sink.event(event);
    }

    fn comment(&mut self, text: String) {
        self.emit(Event::StartComment);
        self.emit(Event::Text(text));
        self.emit(Event::EndComment);
    }

    fn reference(&mut self, kind: DeclarationKind, name: &str, owner: Option<&str>) {
        self.emit(Event::Reference {
            kind,
            name: name.to_string(),
            owner: owner.map(str::to_string),
        });
    }

    fn unit(&mut self, unit: &CompilationUnit, include_synthetic: bool) {
        if let Some(package) = &unit.package {
            self.emit(Event::StartDeclaration {
                kind: DeclarationKind::Package,
                name: package.clone(),
            });
            self.emit(Event::EndDeclaration(DeclarationKind::Package));
        }

        self.emit(Event::StartImports);
        for (name, _) in unit.references.iter() {
            self.reference(DeclarationKind::Type, name, None);
        }
        self.emit(Event::EndImports);

        for warning in &unit.warnings {
            self.comment(warning.clone());
        }

        let class = &unit.class;
        let kind = match class.kind {
            super::java_ast::ClassKind::Module => DeclarationKind::Module,
            _ => DeclarationKind::Type,
        };
        self.javadoc(&class.annotations);
        self.emit(Event::StartDeclaration {
            kind,
            name: class.internal_name.clone(),
        });
        self.emit(Event::Indent);
        for field in class.fields.iter().filter(|f| include_synthetic || !f.is_synthetic) {
            self.field(field);
        }
        for method in class.methods.iter().filter(|m| include_synthetic || !(m.is_synthetic || m.is_bridge)) {
            self.method(method);
        }
        self.emit(Event::Unindent);
        self.emit(Event::EndDeclaration(kind));
    }

    fn javadoc(&mut self, annotations: &[JavaAnnotation]) {
        if annotations.iter().any(|a| a.type_name == "java/lang/Deprecated") {
            self.emit(Event::StartJavadoc);
            self.emit(Event::Text("@deprecated".into()));
            self.emit(Event::EndJavadoc);
        }
    }

    fn field(&mut self, field: &JavaField) {
        self.javadoc(&field.annotations);
        self.emit(Event::StartDeclaration {
            kind: DeclarationKind::Field,
            name: field.name.clone(),
        });
        if let Some(init) = &field.initializer {
            self.expr_refs(init);
        }
        self.emit(Event::EndDeclaration(DeclarationKind::Field));
    }

    fn method(&mut self, method: &JavaMethod) {
        let kind = if method.is_constructor() {
            DeclarationKind::Constructor
        } else {
            DeclarationKind::Method
        };
        self.javadoc(&method.annotations);
        self.emit(Event::StartDeclaration {
            kind,
            name: method.name.clone(),
        });
        if let Some(error) = &method.error {
            self.emit(Event::StartError);
            self.emit(Event::Text(error.clone()));
            self.emit(Event::EndError);
        }
        if let Some(body) = &method.body {
            if body.approximate {
                self.comment("control flow could not be fully structured".into());
            }
            for w in &body.warnings {
                self.comment(w.clone());
            }
            self.emit(Event::Indent);
            self.block(&body.statements);
            self.emit(Event::Unindent);
        }
        self.emit(Event::EndDeclaration(kind));
    }

    fn block(&mut self, stmts: &[StructuredStmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn nested(&mut self, stmts: &[StructuredStmt]) {
        self.emit(Event::Indent);
        self.block(stmts);
        self.emit(Event::Unindent);
    }

    fn stmt(&mut self, stmt: &StructuredStmt) {
        match stmt {
            StructuredStmt::Simple(s) => {
                if let Some(line) = s.line {
                    self.emit(Event::Line(line));
                }
            }
            StructuredStmt::Declare { line: Some(line), .. } => self.emit(Event::Line(*line)),
            _ => {}
        }
        if let StructuredStmt::Comment(text) = stmt {
            self.comment(text.clone());
            return;
        }
        self.emit(Event::Statement(stmt.kind_name()));

        match stmt {
            StructuredStmt::Labeled { body, .. } => {
                self.stmt(body);
                return;
            }
            StructuredStmt::For {
                init,
                condition,
                update,
                body,
            } => {
                for node in init.iter().chain(update.iter()) {
                    node.visit_own_exprs(&mut |e| self.expr_ref(e));
                }
                self.expr_refs(condition);
                self.nested(body);
                return;
            }
            StructuredStmt::Simple(s) => {
                if let Stmt::FieldStore { owner, name, .. } = &s.stmt {
                    self.reference(DeclarationKind::Field, name, Some(owner));
                }
            }
            StructuredStmt::Try { catches, .. } => {
                for t in catches.iter().flat_map(|c| c.exception_types.iter()) {
                    self.reference(DeclarationKind::Type, t, None);
                }
            }
            StructuredStmt::Switch {
                kind: SwitchKind::Enum(class),
                ..
            } => self.reference(DeclarationKind::Type, class, None),
            _ => {}
        }
        stmt.visit_own_exprs(&mut |e| self.expr_ref(e));
        for child in stmt.child_blocks() {
            self.nested(child);
        }
    }

    fn expr_refs(&mut self, e: &Expr) {
        e.visit(&mut |e| self.expr_ref(e));
    }

    fn expr_ref(&mut self, e: &Expr) {
        match e {
            Expr::FieldGet { owner, name, .. } => self.reference(DeclarationKind::Field, name, Some(owner)),
            Expr::MethodCall { owner, name, .. } => {
                self.reference(DeclarationKind::Method, name, Some(owner))
            }
            Expr::New { class, .. } => self.reference(DeclarationKind::Constructor, "<init>", Some(class)),
            _ => {}
        }
    }
}

/// What a start event opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Open {
    Declaration(DeclarationKind),
    Indent,
    Comment,
    Javadoc,
    Error,
    Imports,
}

/// Records events and checks that they are well nested.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<Event>,
    open: Vec<Open>,
    violations: Vec<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when every start had a matching end in the right order.
    pub fn is_well_nested(&self) -> bool {
        self.violations.is_empty() && self.open.is_empty()
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    fn close(&mut self, expected: Open) {
        match self.open.pop() {
            Some(open) if open == expected => {}
            other => self
                .violations
                .push(format!("{:?} closed while {:?} was open", expected, other)),
        }
    }
}

impl EventSink for RecordingSink {
    fn event(&mut self, event: Event) {
        match &event {
            Event::StartDeclaration { kind, .. } => self.open.push(Open::Declaration(*kind)),
            Event::EndDeclaration(kind) => self.close(Open::Declaration(*kind)),
            Event::Indent => self.open.push(Open::Indent),
            Event::Unindent => self.close(Open::Indent),
            Event::StartComment => self.open.push(Open::Comment),
            Event::EndComment => self.close(Open::Comment),
            Event::StartJavadoc => self.open.push(Open::Javadoc),
            Event::EndJavadoc => self.close(Open::Javadoc),
            Event::StartError => self.open.push(Open::Error),
            Event::EndError => self.close(Open::Error),
            Event::StartImports => self.open.push(Open::Imports),
            Event::EndImports => self.close(Open::Imports),
            _ => {}
        }
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_detects_mismatch() {
        let mut sink = RecordingSink::new();
        sink.event(Event::StartComment);
        sink.event(Event::Indent);
        sink.event(Event::EndComment);
        assert!(!sink.is_well_nested());
        assert_eq!(sink.violations().len(), 1);
    }

    #[test]
    fn test_recording_sink_accepts_nesting() {
        let mut sink = RecordingSink::new();
        sink.event(Event::StartDeclaration {
            kind: DeclarationKind::Type,
            name: "a/B".into(),
        });
        sink.event(Event::Indent);
        sink.event(Event::Unindent);
        sink.event(Event::EndDeclaration(DeclarationKind::Type));
        assert!(sink.is_well_nested());
    }
}
