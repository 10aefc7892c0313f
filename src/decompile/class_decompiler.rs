use std::sync::Arc;

use log::{debug, warn};
use rayon::prelude::*;

use crate::code_attribute::{decode, decode_all};
use crate::error::{DecompileError, DecompileResult};
use crate::method_info::{MethodAccessFlags, MethodInfo};
use crate::parse_class_bytes;
use crate::source::{ClassSource, EmptySource};
use crate::types::ClassFile;

use super::cfg;
use super::descriptor::{parameter_slots, parse_method_descriptor};
use super::desugar::{self, DesugarContext, DesugarOptions};
use super::events::{self, EventSink};
use super::exceptions;
use super::java_ast::*;
use super::references;
use super::resolver::TypeResolver;
use super::stack_sim::{self, MethodContext};
use super::structured_types::MethodBody;
use super::structuring;
use super::type_inference;

/// Options controlling the decompilation process.
#[derive(Clone, Debug)]
pub struct DecompileOptions {
    /// Fold `&&`/`||` chains and collapse `c ? 1 : 0` materializations.
    pub fold_conditions: bool,
    pub recover_for: bool,
    pub recover_foreach: bool,
    pub recover_enum_switch: bool,
    pub recover_string_switch: bool,
    /// Instructions listed in the fallback comment of a failed method.
    pub bytecode_fallback_limit: usize,
    pub include_synthetic: bool,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            fold_conditions: true,
            recover_for: true,
            recover_foreach: true,
            recover_enum_switch: true,
            recover_string_switch: true,
            bytecode_fallback_limit: 20,
            include_synthetic: false,
        }
    }
}

impl DecompileOptions {
    fn desugar_options(&self) -> DesugarOptions {
        DesugarOptions {
            ternary: self.fold_conditions,
            for_loops: self.recover_for,
            foreach: self.recover_foreach,
            enum_switch: self.recover_enum_switch,
            string_switch: self.recover_string_switch,
        }
    }
}

/// The main decompiler entry point.
///
/// The byte source is shared read-only; every class gets its own resolver
/// and scratch state, so [`Decompiler::decompile_all`] runs classes on
/// independent rayon workers.
pub struct Decompiler {
    options: DecompileOptions,
    source: Arc<dyn ClassSource>,
}

impl Decompiler {
    pub fn new(options: DecompileOptions) -> Self {
        Self {
            options,
            source: Arc::new(EmptySource),
        }
    }

    /// Resolve other classes (supertypes, switch maps) through `source`.
    pub fn with_source(mut self, source: Arc<dyn ClassSource>) -> Self {
        self.source = source;
        self
    }

    pub fn options(&self) -> &DecompileOptions {
        &self.options
    }

    /// Decompile a single ClassFile.
    ///
    /// Format errors in the class declarations abort the class; a method
    /// that fails keeps its declaration and carries the error plus a raw
    /// instruction listing instead of a body.
    pub fn decompile(&self, class: &ClassFile) -> DecompileResult<CompilationUnit> {
        let resolver = TypeResolver::for_class(class, self.source.as_ref());
        let mut warnings = Vec::new();
        let mut java_class = type_inference::build_java_class(class, &mut warnings)?;
        debug!("decompiling {}", java_class.internal_name);

        for (method, java_method) in class.methods.iter().zip(java_class.methods.iter_mut()) {
            if method.access_flags.intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE) {
                continue;
            }
            let result = match method.code() {
                Some(_) => self.method_body(class, method, java_method, &resolver),
                None => match method.code_error(&class.const_pool) {
                    Some(e) => Err(e.into()),
                    None => continue,
                },
            };
            match result {
                Ok(body) => {
                    for w in &body.warnings {
                        warnings.push(format!("{}{}: {}", java_method.name, java_method.descriptor, w));
                    }
                    java_method.body = Some(body);
                }
                Err(e) => {
                    warn!(
                        "failed to decompile {}.{}{}: {}",
                        java_class.internal_name, java_method.name, java_method.descriptor, e
                    );
                    java_method.error = Some(self.fallback_listing(method, java_method, &e));
                }
            }
        }

        for gap in resolver.gaps() {
            warnings.push(format!("unresolved class {}", gap));
        }

        let (package, _) = type_inference::split_class_name(&java_class.internal_name);
        let mut unit = CompilationUnit {
            package,
            class: java_class,
            references: Default::default(),
            warnings,
        };
        unit.references = references::collect_references(&unit);
        Ok(unit)
    }

    /// Parse and decompile class bytes.
    pub fn decompile_bytes(&self, bytes: &[u8]) -> DecompileResult<CompilationUnit> {
        let class = parse_class_bytes(bytes)?;
        self.decompile(&class)
    }

    /// Load a class by internal name from the byte source and decompile it.
    pub fn decompile_named(&self, internal_name: &str) -> DecompileResult<CompilationUnit> {
        let bytes = self
            .source
            .load(internal_name)
            .ok_or_else(|| DecompileError::ClassNotFound(internal_name.to_string()))?;
        self.decompile_bytes(&bytes)
    }

    /// Decompile many classes in parallel. Results keep the input order.
    pub fn decompile_all<B>(&self, classes: &[B]) -> Vec<DecompileResult<CompilationUnit>>
    where
        B: AsRef<[u8]> + Sync,
    {
        classes
            .par_iter()
            .map(|bytes| self.decompile_bytes(bytes.as_ref()))
            .collect()
    }

    /// Walk a finished unit into `sink`.
    pub fn emit_events(&self, unit: &CompilationUnit, sink: &mut dyn EventSink) {
        events::walk_unit(unit, sink, self.options.include_synthetic);
    }

    fn method_body(
        &self,
        class: &ClassFile,
        method: &MethodInfo,
        java_method: &JavaMethod,
        resolver: &TypeResolver<'_>,
    ) -> DecompileResult<MethodBody> {
        let pool = &class.const_pool;
        let code = method.code().ok_or(DecompileError::NoCode)?;
        let is_static = method.is_static();
        let (params, return_type) =
            parse_method_descriptor(&java_method.descriptor).ok_or_else(|| DecompileError::BadDescriptor {
                offset: 0,
                descriptor: java_method.descriptor.clone(),
            })?;

        let instructions = decode_all(&code.code)?;
        let edges = cfg::exception_edges(code, pool)?;
        let analysis = exceptions::analyze(&instructions, &edges);
        let graph = cfg::build_cfg(&instructions, edges, &analysis.extra_leaders);
        debug!(
            "{}{}: {} instructions, {} blocks, {} try regions",
            java_method.name,
            java_method.descriptor,
            instructions.len(),
            graph.blocks.len(),
            analysis.plans.len()
        );
        if graph.blocks.is_empty() {
            return Ok(MethodBody::default());
        }

        let mut locals = stack_sim::build_local_name_table(code, pool);
        let mut slot = if is_static { 0 } else { 1 };
        for (param, ty) in java_method.parameters.iter().zip(&params) {
            locals = locals.with_parameter(slot, param.name.clone(), ty.clone());
            slot += if ty.is_wide() { 2 } else { 1 };
        }
        let ctx = MethodContext {
            pool,
            code,
            resolver,
            locals,
            is_static,
            return_type: return_type.clone(),
        };
        let blocks = stack_sim::simulate(&graph, &ctx)?;
        debug!("{}: simulated {} blocks", java_method.name, blocks.len());

        let mut body = structuring::structure_method(&graph, blocks, &analysis, self.options.fold_conditions);
        let desugar_ctx = DesugarContext {
            resolver,
            return_type,
            param_slots: parameter_slots(&params, is_static),
        };
        desugar::desugar(&mut body, &desugar_ctx, &self.options.desugar_options());
        Ok(body)
    }

    /// Error text plus the first `bytecode_fallback_limit` instructions.
    fn fallback_listing(&self, method: &MethodInfo, java_method: &JavaMethod, error: &DecompileError) -> String {
        let mut out = format!(
            "decompilation failed for {}{}: {}\nbytecode:",
            java_method.name, java_method.descriptor, error
        );
        let code = match method.code() {
            Some(c) => &c.code,
            None => {
                out.push_str("\n  <Code attribute unreadable>");
                return out;
            }
        };
        let mut offset = 0u32;
        let mut listed = 0usize;
        while (offset as usize) < code.len() {
            if listed == self.options.bytecode_fallback_limit {
                out.push_str(&format!("\n  ... ({} more bytes)", code.len() - offset as usize));
                break;
            }
            match decode(code, offset) {
                Ok((insn, next)) => {
                    out.push_str(&format!("\n  {:04}: {:?}", insn.offset, insn.op));
                    offset = next;
                    listed += 1;
                }
                Err(e) => {
                    out.push_str(&format!("\n  {:04}: <{}>", offset, e));
                    break;
                }
            }
        }
        out
    }
}

impl Default for Decompiler {
    fn default() -> Self {
        Self::new(DecompileOptions::default())
    }
}

/// Convenience function: decompile a ClassFile with default options.
pub fn decompile(class: &ClassFile) -> DecompileResult<CompilationUnit> {
    Decompiler::default().decompile(class)
}
