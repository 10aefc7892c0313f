//! Declarations of a class, built from its class model: kind, modifiers,
//! generic types from Signature attributes, parameter names, annotations and
//! constant field initializers. Method bodies are filled in later by the
//! decompiler.

use crate::attribute_info::*;
use crate::constant_info::{ConstantInfo, ConstantPool};
use crate::error::ClassFileResult;
use crate::field_info::{FieldAccessFlags, FieldInfo};
use crate::method_info::{MethodAccessFlags, MethodInfo};
use crate::types::{ClassAccessFlags, ClassFile};

use super::descriptor::{self, JvmType};
use super::expr::{retype_literal, Expr};
use super::java_ast::*;
use super::signature::{self, class_type_from_internal};

/// Build a JavaClass from a parsed ClassFile. Malformed signatures degrade
/// to erased types and are reported in `warnings`.
pub fn build_java_class(class: &ClassFile, warnings: &mut Vec<String>) -> ClassFileResult<JavaClass> {
    let pool = &class.const_pool;
    let internal_name = class.this_class_name()?.to_string();
    let (_, simple_name) = split_class_name(&internal_name);

    let kind = determine_class_kind(class, &internal_name);
    let inner = inner_class_entry(class, &internal_name);
    let (visibility, is_static) = match inner {
        Some(flags) => (inner_visibility(flags), flags.contains(InnerClassAccessFlags::STATIC)),
        None => (class_visibility(class.access_flags), false),
    };

    let erased_super = match class.super_class_name()? {
        Some(name) if name != "java/lang/Object" => Some(class_type_from_internal(name)),
        _ => None,
    };
    let erased_interfaces: Vec<JavaType> = class
        .interface_names()?
        .into_iter()
        .map(class_type_from_internal)
        .collect();

    let generic = class.signature().and_then(|sig| {
        let parsed = signature::parse_class_signature(sig);
        if parsed.is_none() {
            warnings.push(format!("malformed class signature {:?}", sig));
        }
        parsed
    });
    let (type_parameters, super_class, interfaces) = match generic {
        Some(sig) => {
            let super_class = if sig.super_class.is_object() { None } else { Some(sig.super_class) };
            (sig.type_parameters, super_class, sig.interfaces)
        }
        None => (Vec::new(), erased_super, erased_interfaces),
    };

    let fields = class
        .fields
        .iter()
        .map(|f| build_java_field(f, pool, warnings))
        .collect::<ClassFileResult<Vec<_>>>()?;
    let methods = class
        .methods
        .iter()
        .map(|m| build_java_method(m, pool, kind, warnings))
        .collect::<ClassFileResult<Vec<_>>>()?;

    Ok(JavaClass {
        kind,
        visibility,
        is_final: class.access_flags.contains(ClassAccessFlags::FINAL),
        is_abstract: class.access_flags.contains(ClassAccessFlags::ABSTRACT),
        is_static,
        is_synthetic: class.access_flags.contains(ClassAccessFlags::SYNTHETIC),
        annotations: collect_annotations(&class.attributes, pool),
        type_parameters,
        internal_name,
        name: simple_name,
        super_class,
        interfaces,
        fields,
        methods,
        source_file: class.source_file().map(str::to_string),
    })
}

fn determine_class_kind(class: &ClassFile, internal_name: &str) -> ClassKind {
    let flags = class.access_flags;
    if flags.contains(ClassAccessFlags::MODULE) {
        ClassKind::Module
    } else if descriptor::simple_class_name(internal_name) == "package-info" {
        ClassKind::PackageInfo
    } else if flags.contains(ClassAccessFlags::ANNOTATION) {
        ClassKind::Annotation
    } else if flags.contains(ClassAccessFlags::ENUM) {
        ClassKind::Enum
    } else if flags.contains(ClassAccessFlags::INTERFACE) {
        ClassKind::Interface
    } else {
        ClassKind::Class
    }
}

/// Source-level flags of this class when it is a member of another class.
fn inner_class_entry(class: &ClassFile, internal_name: &str) -> Option<InnerClassAccessFlags> {
    class.attributes.iter().find_map(|a| match &a.info_parsed {
        Some(AttributeInfoVariant::InnerClasses(ic)) => ic
            .classes
            .iter()
            .find(|e| class.const_pool.class_name(e.inner_class_info_index).ok() == Some(internal_name))
            .map(|e| e.inner_class_access_flags),
        _ => None,
    })
}

fn class_visibility(flags: ClassAccessFlags) -> Visibility {
    if flags.contains(ClassAccessFlags::PUBLIC) {
        Visibility::Public
    } else {
        Visibility::PackagePrivate
    }
}

fn inner_visibility(flags: InnerClassAccessFlags) -> Visibility {
    if flags.contains(InnerClassAccessFlags::PUBLIC) {
        Visibility::Public
    } else if flags.contains(InnerClassAccessFlags::PROTECTED) {
        Visibility::Protected
    } else if flags.contains(InnerClassAccessFlags::PRIVATE) {
        Visibility::Private
    } else {
        Visibility::PackagePrivate
    }
}

fn method_visibility(flags: MethodAccessFlags) -> Visibility {
    if flags.contains(MethodAccessFlags::PUBLIC) {
        Visibility::Public
    } else if flags.contains(MethodAccessFlags::PROTECTED) {
        Visibility::Protected
    } else if flags.contains(MethodAccessFlags::PRIVATE) {
        Visibility::Private
    } else {
        Visibility::PackagePrivate
    }
}

fn field_visibility(flags: FieldAccessFlags) -> Visibility {
    if flags.contains(FieldAccessFlags::PUBLIC) {
        Visibility::Public
    } else if flags.contains(FieldAccessFlags::PROTECTED) {
        Visibility::Protected
    } else if flags.contains(FieldAccessFlags::PRIVATE) {
        Visibility::Private
    } else {
        Visibility::PackagePrivate
    }
}

/// Split an internal name into a dotted package and the simple name of the
/// innermost class.
pub fn split_class_name(internal_name: &str) -> (Option<String>, String) {
    let package = descriptor::package_name(internal_name).map(|p| p.replace('/', "."));
    let name = descriptor::simple_class_name(internal_name);
    let simple = match name.rfind('$') {
        Some(pos) if pos + 1 < name.len() => &name[pos + 1..],
        _ => name,
    };
    (package, simple.to_string())
}

fn build_java_field(
    field: &FieldInfo,
    pool: &ConstantPool,
    warnings: &mut Vec<String>,
) -> ClassFileResult<JavaField> {
    let name = pool.utf8(field.name_index)?.to_string();
    let desc = pool.utf8(field.descriptor_index)?;
    let jvm_type = descriptor::parse_type_descriptor(desc).unwrap_or(JvmType::Unknown);
    let flags = field.access_flags;

    let generic = match field.signature_index() {
        Some(idx) => {
            let sig = pool.utf8(idx)?;
            let parsed = signature::parse_field_signature(sig);
            if parsed.is_none() {
                warnings.push(format!("malformed signature {:?} on field {}", sig, name));
            }
            parsed
        }
        None => None,
    };

    let initializer = match field.constant_value_index() {
        Some(idx) => constant_value(pool, idx)?.map(|e| retype_literal(e, &jvm_type)),
        None => None,
    };

    Ok(JavaField {
        visibility: field_visibility(flags),
        is_static: flags.contains(FieldAccessFlags::STATIC),
        is_final: flags.contains(FieldAccessFlags::FINAL),
        is_volatile: flags.contains(FieldAccessFlags::VOLATILE),
        is_transient: flags.contains(FieldAccessFlags::TRANSIENT),
        is_synthetic: flags.contains(FieldAccessFlags::SYNTHETIC),
        is_enum_constant: flags.contains(FieldAccessFlags::ENUM),
        annotations: collect_annotations(&field.attributes, pool),
        field_type: generic.unwrap_or_else(|| JavaType::from(&jvm_type)),
        name,
        initializer,
    })
}

fn constant_value(pool: &ConstantPool, idx: u16) -> ClassFileResult<Option<Expr>> {
    Ok(match pool.get(idx)? {
        ConstantInfo::Integer(c) => Some(Expr::IntLiteral(c.value)),
        ConstantInfo::Long(c) => Some(Expr::LongLiteral(c.value)),
        ConstantInfo::Float(c) => Some(Expr::FloatLiteral(c.value)),
        ConstantInfo::Double(c) => Some(Expr::DoubleLiteral(c.value)),
        ConstantInfo::String(s) => Some(Expr::StringLiteral(pool.utf8(s.string_index)?.to_string())),
        _ => None,
    })
}

fn build_java_method(
    method: &MethodInfo,
    pool: &ConstantPool,
    class_kind: ClassKind,
    warnings: &mut Vec<String>,
) -> ClassFileResult<JavaMethod> {
    let name = pool.utf8(method.name_index)?.to_string();
    let desc = pool.utf8(method.descriptor_index)?.to_string();
    let flags = method.access_flags;

    let (param_types, ret_type) = match descriptor::parse_method_descriptor(&desc) {
        Some(parsed) => parsed,
        None => {
            warnings.push(format!("malformed descriptor {:?} on method {}", desc, name));
            (Vec::new(), JvmType::Void)
        }
    };

    let generic = match method.signature_index() {
        Some(idx) => {
            let sig = pool.utf8(idx)?;
            let parsed = signature::parse_method_signature(sig);
            if parsed.is_none() {
                warnings.push(format!("malformed signature {:?} on method {}", sig, name));
            }
            parsed
        }
        None => None,
    };

    // Synthetic outer-instance and enum name/ordinal parameters are absent
    // from the signature, so it only replaces the descriptor when the
    // counts agree.
    let (type_parameters, param_java, return_type, generic_throws) = match generic {
        Some(sig) if sig.parameters.len() == param_types.len() => {
            (sig.type_parameters, sig.parameters, sig.return_type, sig.throws)
        }
        Some(sig) => (
            sig.type_parameters,
            param_types.iter().map(JavaType::from).collect(),
            sig.return_type,
            sig.throws,
        ),
        None => (
            Vec::new(),
            param_types.iter().map(JavaType::from).collect(),
            JavaType::from(&ret_type),
            Vec::new(),
        ),
    };

    let names = parameter_names(method, pool, &param_types)?;
    let count = param_java.len();
    let parameters = param_java
        .into_iter()
        .zip(names)
        .enumerate()
        .map(|(i, (param_type, (name, is_final)))| JavaParameter {
            param_type,
            name,
            is_final,
            is_varargs: i + 1 == count && flags.contains(MethodAccessFlags::VARARGS),
        })
        .collect();

    let throws = if generic_throws.is_empty() {
        method
            .thrown_exceptions()
            .iter()
            .map(|&idx| pool.class_name(idx).map(class_type_from_internal))
            .collect::<ClassFileResult<Vec<_>>>()?
    } else {
        generic_throws
    };

    let is_default = class_kind == ClassKind::Interface
        && !flags.contains(MethodAccessFlags::ABSTRACT)
        && !flags.contains(MethodAccessFlags::STATIC)
        && !flags.contains(MethodAccessFlags::PRIVATE);

    Ok(JavaMethod {
        visibility: method_visibility(flags),
        is_static: flags.contains(MethodAccessFlags::STATIC),
        is_final: flags.contains(MethodAccessFlags::FINAL),
        is_abstract: flags.contains(MethodAccessFlags::ABSTRACT),
        is_synchronized: flags.contains(MethodAccessFlags::SYNCHRONIZED),
        is_native: flags.contains(MethodAccessFlags::NATIVE),
        is_default,
        is_synthetic: flags.contains(MethodAccessFlags::SYNTHETIC),
        is_bridge: flags.contains(MethodAccessFlags::BRIDGE),
        annotations: collect_annotations(&method.attributes, pool),
        type_parameters,
        return_type,
        name,
        descriptor: desc,
        parameters,
        throws,
        body: None,
        error: None,
    })
}

/// Parameter names and finality: MethodParameters first, then the
/// LocalVariableTable entry live at pc 0 in the parameter's slot, then
/// `paramN`.
fn parameter_names(
    method: &MethodInfo,
    pool: &ConstantPool,
    params: &[JvmType],
) -> ClassFileResult<Vec<(String, bool)>> {
    let declared = method.attributes.iter().find_map(|a| match &a.info_parsed {
        Some(AttributeInfoVariant::MethodParameters(mp)) if mp.parameters.len() == params.len() => {
            Some(&mp.parameters)
        }
        _ => None,
    });
    if let Some(declared) = declared {
        return declared
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let name = if p.name_index == 0 {
                    format!("param{}", i)
                } else {
                    pool.utf8(p.name_index)?.to_string()
                };
                Ok((name, p.access_flags & 0x0010 != 0))
            })
            .collect();
    }

    let table = method.code().and_then(|c| c.local_variable_table());
    let mut slot: u16 = if method.is_static() { 0 } else { 1 };
    let mut names = Vec::with_capacity(params.len());
    for (i, ty) in params.iter().enumerate() {
        let entry = table.and_then(|t| t.items.iter().find(|item| item.index == slot && item.start_pc == 0));
        let name = match entry {
            Some(item) => pool.utf8(item.name_index)?.to_string(),
            None => format!("param{}", i),
        };
        names.push((name, false));
        slot += if ty.is_wide() { 2 } else { 1 };
    }
    Ok(names)
}

/// Visible and invisible annotations, plus `@Deprecated` from the
/// Deprecated attribute when it is not already present.
fn collect_annotations(attributes: &[AttributeInfo], pool: &ConstantPool) -> Vec<JavaAnnotation> {
    let mut annotations = Vec::new();
    let mut deprecated = false;
    for attr in attributes {
        match &attr.info_parsed {
            Some(AttributeInfoVariant::RuntimeVisibleAnnotations(ra))
            | Some(AttributeInfoVariant::RuntimeInvisibleAnnotations(ra)) => {
                annotations.extend(ra.annotations.iter().filter_map(|a| convert_annotation(a, pool)));
            }
            Some(AttributeInfoVariant::Deprecated) => deprecated = true,
            _ => {}
        }
    }
    if deprecated && !annotations.iter().any(|a| a.type_name == "java/lang/Deprecated") {
        annotations.push(JavaAnnotation {
            type_name: "java/lang/Deprecated".into(),
            arguments: Vec::new(),
        });
    }
    annotations
}

fn descriptor_class(desc: &str) -> String {
    match descriptor::parse_type_descriptor(desc) {
        Some(JvmType::Reference(name)) => name,
        _ => desc.to_string(),
    }
}

fn convert_annotation(ann: &RuntimeAnnotation, pool: &ConstantPool) -> Option<JavaAnnotation> {
    let type_name = descriptor_class(pool.utf8(ann.type_index).ok()?);
    let arguments = ann
        .element_value_pairs
        .iter()
        .filter_map(|evp| {
            let name = pool.utf8(evp.element_name_index).ok()?.to_string();
            let value = convert_element_value(&evp.value, pool)?;
            Some(AnnotationArgument { name, value })
        })
        .collect();
    Some(JavaAnnotation { type_name, arguments })
}

fn convert_element_value(ev: &ElementValue, pool: &ConstantPool) -> Option<AnnotationValue> {
    match ev {
        ElementValue::ConstValueIndex { tag, value } => match (tag, pool.get(*value).ok()?) {
            ('Z', ConstantInfo::Integer(c)) => Some(AnnotationValue::BooleanLiteral(c.value != 0)),
            ('C', ConstantInfo::Integer(c)) => {
                char::from_u32(c.value as u32).map(AnnotationValue::CharLiteral)
            }
            ('B' | 'I' | 'S', ConstantInfo::Integer(c)) => Some(AnnotationValue::IntLiteral(c.value)),
            ('J', ConstantInfo::Long(c)) => Some(AnnotationValue::LongLiteral(c.value)),
            ('F', ConstantInfo::Float(c)) => Some(AnnotationValue::FloatLiteral(c.value)),
            ('D', ConstantInfo::Double(c)) => Some(AnnotationValue::DoubleLiteral(c.value)),
            ('s', ConstantInfo::Utf8(u)) => Some(AnnotationValue::StringLiteral(u.value.clone())),
            _ => None,
        },
        ElementValue::EnumConst(ec) => Some(AnnotationValue::EnumConstant {
            type_name: descriptor_class(pool.utf8(ec.type_name_index).ok()?),
            const_name: pool.utf8(ec.const_name_index).ok()?.to_string(),
        }),
        ElementValue::ClassInfoIndex(idx) => {
            Some(AnnotationValue::ClassLiteral(descriptor_class(pool.utf8(*idx).ok()?)))
        }
        ElementValue::AnnotationValue(ann) => {
            convert_annotation(ann, pool).map(AnnotationValue::AnnotationLiteral)
        }
        ElementValue::ElementArray(arr) => Some(AnnotationValue::ArrayLiteral(
            arr.values
                .iter()
                .filter_map(|v| convert_element_value(v, pool))
                .collect(),
        )),
    }
}
