//! Cross-class type resolution.
//!
//! Lookups go to the class being reconstructed first, then to classes
//! already pulled from the byte source, then to the byte source itself. A
//! class that cannot be found is recorded as a resolution gap and every query
//! about it degrades to a conservative answer instead of failing.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use crate::code_attribute::{decode_all, Operation, ValueKind};
use crate::constant_info::ConstantPool;
use crate::parse_class_bytes;
use crate::source::ClassSource;
use crate::types::ClassFile;

use super::descriptor::{self, JvmType};

const OBJECT: &str = "java/lang/Object";

pub struct TypeResolver<'a> {
    current: Option<&'a ClassFile>,
    current_name: Option<&'a str>,
    source: &'a dyn ClassSource,
    cache: RefCell<HashMap<String, Option<Rc<ClassFile>>>>,
    gaps: RefCell<BTreeSet<String>>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(source: &'a dyn ClassSource) -> Self {
        Self {
            current: None,
            current_name: None,
            source,
            cache: RefCell::new(HashMap::new()),
            gaps: RefCell::new(BTreeSet::new()),
        }
    }

    /// A resolver that answers questions about `class` without the byte source.
    pub fn for_class(class: &'a ClassFile, source: &'a dyn ClassSource) -> Self {
        Self {
            current: Some(class),
            current_name: class.this_class_name().ok(),
            ..Self::new(source)
        }
    }

    /// Class names that were needed but could not be loaded.
    pub fn gaps(&self) -> Vec<String> {
        self.gaps.borrow().iter().cloned().collect()
    }

    fn load(&self, name: &str) -> Option<Rc<ClassFile>> {
        if let Some(cached) = self.cache.borrow().get(name) {
            return cached.clone();
        }
        let loaded = if self.source.can_load(name) {
            self.source.load(name).and_then(|bytes| match parse_class_bytes(&bytes) {
                Ok(class) => Some(Rc::new(class)),
                Err(e) => {
                    log::warn!("class {} from byte source is malformed: {}", name, e);
                    None
                }
            })
        } else {
            None
        };
        if loaded.is_none() && self.gaps.borrow_mut().insert(name.to_string()) {
            log::warn!("cannot resolve class {}, falling back to its raw name", name);
        }
        self.cache.borrow_mut().insert(name.to_string(), loaded.clone());
        loaded
    }

    /// Run `f` against the named class, if it can be found.
    pub fn with_class<R>(&self, name: &str, f: impl FnOnce(&ClassFile) -> R) -> Option<R> {
        if self.current_name == Some(name) {
            return self.current.map(f);
        }
        self.load(name).map(|class| f(&class))
    }

    pub fn super_class(&self, name: &str) -> Option<String> {
        self.with_class(name, |c| c.super_class_name().ok().flatten().map(String::from))
            .flatten()
    }

    /// `name` followed by its superclasses, as far as they resolve.
    pub fn super_chain(&self, name: &str) -> Vec<String> {
        let mut chain = vec![name.to_string()];
        let mut current = name.to_string();
        while let Some(next) = self.super_class(&current) {
            if chain.contains(&next) {
                break;
            }
            chain.push(next.clone());
            current = next;
        }
        chain
    }

    /// Can a value of class `from` be assigned to `to`? Unknown classes are
    /// only assignable to themselves and `java/lang/Object`.
    pub fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to || to == OBJECT {
            return true;
        }
        let mut seen = BTreeSet::new();
        let mut work = vec![from.to_string()];
        while let Some(name) = work.pop() {
            if name == to {
                return true;
            }
            if !seen.insert(name.clone()) {
                continue;
            }
            let parents = self.with_class(&name, |c| {
                let mut parents: Vec<String> = c
                    .interface_names()
                    .map(|v| v.into_iter().map(String::from).collect())
                    .unwrap_or_default();
                if let Ok(Some(s)) = c.super_class_name() {
                    parents.push(s.to_string());
                }
                parents
            });
            work.extend(parents.into_iter().flatten());
        }
        false
    }

    /// Number of distinct methods named `name` with `arity` parameters on
    /// `owner` and its superclasses. Unknown owners count as one.
    pub fn overloads(&self, owner: &str, name: &str, arity: usize) -> usize {
        let mut descriptors = BTreeSet::new();
        for class in self.super_chain(owner) {
            self.with_class(&class, |c| {
                for m in &c.methods {
                    let pool = &c.const_pool;
                    if pool.utf8(m.name_index).ok() != Some(name) {
                        continue;
                    }
                    if let Ok(desc) = pool.utf8(m.descriptor_index) {
                        let params = descriptor::parse_method_descriptor(desc)
                            .map(|(p, _)| p.len())
                            .unwrap_or(usize::MAX);
                        if params == arity {
                            descriptors.insert(desc.to_string());
                        }
                    }
                }
            });
        }
        descriptors.len().max(1)
    }

    /// Declared type of a field, searched along the superclass chain.
    pub fn field_type(&self, owner: &str, name: &str) -> Option<JvmType> {
        self.super_chain(owner).into_iter().find_map(|class| {
            self.with_class(&class, |c| {
                c.fields.iter().find_map(|f| {
                    (c.const_pool.utf8(f.name_index).ok() == Some(name))
                        .then(|| c.const_pool.utf8(f.descriptor_index).ok())
                        .flatten()
                        .and_then(descriptor::parse_type_descriptor)
                })
            })
            .flatten()
        })
    }

    /// Ordinal-to-constant mapping behind an enum switch.
    ///
    /// `member` is either the synthetic `$SwitchMap$...` array field filled in
    /// the holder's static initializer, or the `$SWITCH_TABLE$...` method
    /// that fills the array lazily. Returns the case label for every
    /// array value the initializer assigns.
    pub fn switch_map(&self, holder: &str, member: &str) -> Option<BTreeMap<i32, String>> {
        self.with_class(holder, |c| {
            let method = c.find_method(member);
            let (code_owner, from_table) = match method {
                Some(m) => (m, true),
                None => (c.find_method("<clinit>")?, false),
            };
            let code = code_owner.code()?;
            let insns = decode_all(&code.code).ok()?;
            let pool = &c.const_pool;
            let mut map = BTreeMap::new();
            for w in insns.windows(5) {
                let array_source = match &w[0].op {
                    Operation::GetStatic(index) => {
                        !from_table && member_name(pool, *index) == Some(member)
                    }
                    Operation::Load(ValueKind::Reference, _) => from_table,
                    _ => false,
                };
                if !array_source {
                    continue;
                }
                let constant = match &w[1].op {
                    Operation::GetStatic(index) => member_name(pool, *index),
                    _ => None,
                };
                let is_ordinal = match &w[2].op {
                    Operation::InvokeVirtual(index) => member_name(pool, *index) == Some("ordinal"),
                    _ => false,
                };
                let (value, stores) = match (&w[3].op, &w[4].op) {
                    (Operation::Iconst(k), Operation::ArrayStore(_)) => (*k, true),
                    _ => (0, false),
                };
                if let (Some(constant), true, true) = (constant, is_ordinal, stores) {
                    map.insert(value, constant.to_string());
                }
            }
            (!map.is_empty()).then_some(map)
        })
        .flatten()
    }
}

fn member_name(pool: &ConstantPool, index: u16) -> Option<&str> {
    pool.member_ref(index).ok().map(|m| m.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::EmptySource;

    #[test]
    fn test_unknown_classes_degrade() {
        let source = EmptySource;
        let resolver = TypeResolver::new(&source);
        assert!(resolver.is_assignable("a/B", "java/lang/Object"));
        assert!(resolver.is_assignable("a/B", "a/B"));
        assert!(!resolver.is_assignable("a/B", "a/C"));
        assert_eq!(resolver.overloads("a/B", "run", 1), 1);
        assert_eq!(resolver.super_chain("a/B"), vec!["a/B".to_string()]);
        assert!(resolver.gaps().contains(&"a/B".to_string()));
        assert_eq!(resolver.switch_map("a/B$1", "$SwitchMap$a$Color"), None);
    }
}
