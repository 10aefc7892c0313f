//! Bytecode to structured syntax tree reconstruction.
//!
//! Per method: [`crate::code_attribute::decode_all`], exception region
//! classification ([`exceptions`]), the control flow graph ([`cfg`]), stack
//! simulation ([`stack_sim`]), structuring ([`structuring`]) and the
//! source-level rewrites in [`desugar`]. [`Decompiler`] drives it for whole
//! classes.

pub mod cfg;
pub mod cfg_types;
pub mod class_decompiler;
pub mod descriptor;
pub mod desugar;
pub mod dup;
pub mod events;
pub mod exceptions;
pub mod expr;
pub mod java_ast;
pub mod references;
pub mod resolver;
pub mod signature;
pub mod stack_sim;
pub mod structured_types;
pub mod structuring;
pub mod type_inference;

pub use class_decompiler::{decompile, DecompileOptions, Decompiler};
pub use events::{DeclarationKind, Event, EventSink, RecordingSink};
pub use java_ast::CompilationUnit;
pub use references::ReferenceTracker;
pub use structured_types::{MethodBody, StructuredStmt};
