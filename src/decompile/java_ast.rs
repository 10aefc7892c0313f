use super::expr::Expr;
use super::references::ReferenceTracker;
use super::structured_types::MethodBody;

/// Primitive types in Java.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

/// A Java type as it appears in source code (with generics).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum JavaType {
    Primitive(PrimitiveType),
    /// `package` is dotted; `owner` is set for a member of a parameterized
    /// outer type, e.g. `Outer<T>.Inner`.
    ClassType {
        package: Option<String>,
        name: String,
        type_args: Vec<JavaType>,
        owner: Option<Box<JavaType>>,
    },
    ArrayType(Box<JavaType>),
    WildcardType {
        bound: Option<Box<JavaType>>,
        is_upper: bool,
    },
    TypeVariable(String),
    Void,
}

impl JavaType {
    pub fn raw(package: Option<String>, name: impl Into<String>) -> Self {
        JavaType::ClassType {
            package,
            name: name.into(),
            type_args: Vec::new(),
            owner: None,
        }
    }

    /// Get the simple display name for this type.
    pub fn display_name(&self) -> String {
        match self {
            JavaType::Primitive(p) => match p {
                PrimitiveType::Boolean => "boolean".into(),
                PrimitiveType::Byte => "byte".into(),
                PrimitiveType::Char => "char".into(),
                PrimitiveType::Short => "short".into(),
                PrimitiveType::Int => "int".into(),
                PrimitiveType::Long => "long".into(),
                PrimitiveType::Float => "float".into(),
                PrimitiveType::Double => "double".into(),
            },
            JavaType::ClassType {
                name,
                type_args,
                owner,
                ..
            } => {
                let mut out = match owner {
                    Some(o) => format!("{}.{}", o.display_name(), name),
                    None => name.clone(),
                };
                if !type_args.is_empty() {
                    let args: Vec<String> = type_args.iter().map(|a| a.display_name()).collect();
                    out.push('<');
                    out.push_str(&args.join(", "));
                    out.push('>');
                }
                out
            }
            JavaType::ArrayType(inner) => format!("{}[]", inner.display_name()),
            JavaType::WildcardType { bound, is_upper } => match bound {
                Some(b) => {
                    if *is_upper {
                        format!("? extends {}", b.display_name())
                    } else {
                        format!("? super {}", b.display_name())
                    }
                }
                None => "?".into(),
            },
            JavaType::TypeVariable(name) => name.clone(),
            JavaType::Void => "void".into(),
        }
    }

    /// Internal (slash separated, `$` for nesting) name of the erased class.
    pub fn internal_name(&self) -> Option<String> {
        match self {
            JavaType::ClassType {
                package,
                name,
                owner,
                ..
            } => {
                if let Some(owner) = owner {
                    return owner.internal_name().map(|o| format!("{}${}", o, name));
                }
                Some(match package {
                    Some(p) => format!("{}/{}", p.replace('.', "/"), name),
                    None => name.clone(),
                })
            }
            JavaType::ArrayType(inner) => inner.internal_name(),
            _ => None,
        }
    }

    /// Every class type mentioned by this type, including type arguments and bounds.
    pub fn mentioned_classes(&self, out: &mut Vec<String>) {
        match self {
            JavaType::ClassType {
                type_args, owner, ..
            } => {
                if let Some(name) = self.internal_name() {
                    out.push(name);
                }
                if let Some(owner) = owner {
                    owner.mentioned_classes(out);
                }
                for arg in type_args {
                    arg.mentioned_classes(out);
                }
            }
            JavaType::ArrayType(inner) => inner.mentioned_classes(out),
            JavaType::WildcardType { bound: Some(b), .. } => b.mentioned_classes(out),
            _ => {}
        }
    }

    /// Check if this is the java.lang.Object type.
    pub fn is_object(&self) -> bool {
        matches!(self, JavaType::ClassType { name, package: Some(p), .. } if name == "Object" && p == "java.lang")
    }
}

/// Visibility level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    PackagePrivate,
    Private,
}

/// What kind of class-like entity this is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Annotation,
    Module,
    PackageInfo,
}

/// A generic type parameter declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeParameter {
    pub name: String,
    pub bounds: Vec<JavaType>,
}

/// A Java annotation usage.
#[derive(Clone, Debug)]
pub struct JavaAnnotation {
    /// Internal name of the annotation type.
    pub type_name: String,
    pub arguments: Vec<AnnotationArgument>,
}

/// An annotation argument: `@Foo(name = value)`
#[derive(Clone, Debug)]
pub struct AnnotationArgument {
    pub name: String,
    pub value: AnnotationValue,
}

/// An annotation element value.
#[derive(Clone, Debug)]
pub enum AnnotationValue {
    IntLiteral(i32),
    LongLiteral(i64),
    FloatLiteral(f32),
    DoubleLiteral(f64),
    StringLiteral(String),
    BooleanLiteral(bool),
    CharLiteral(char),
    ClassLiteral(String),
    EnumConstant { type_name: String, const_name: String },
    AnnotationLiteral(JavaAnnotation),
    ArrayLiteral(Vec<AnnotationValue>),
}

/// One reconstructed class file.
#[derive(Clone, Debug)]
pub struct CompilationUnit {
    /// Dotted package name, `None` for the default package.
    pub package: Option<String>,
    pub class: JavaClass,
    pub references: ReferenceTracker,
    /// Resolution and structuring gaps for the whole unit.
    pub warnings: Vec<String>,
}

impl CompilationUnit {
    /// True when any method body had to fall back to approximate output.
    pub fn is_approximate(&self) -> bool {
        self.class
            .methods
            .iter()
            .any(|m| m.error.is_some() || m.body.as_ref().map(|b| b.approximate).unwrap_or(false))
    }
}

/// A Java class / interface / enum / annotation.
#[derive(Clone, Debug)]
pub struct JavaClass {
    pub kind: ClassKind,
    pub visibility: Visibility,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_static: bool,
    pub is_synthetic: bool,
    pub annotations: Vec<JavaAnnotation>,
    pub type_parameters: Vec<TypeParameter>,
    /// Internal name, e.g. `com/example/Outer$Inner`.
    pub internal_name: String,
    pub name: String,
    pub super_class: Option<JavaType>,
    pub interfaces: Vec<JavaType>,
    pub fields: Vec<JavaField>,
    pub methods: Vec<JavaMethod>,
    pub source_file: Option<String>,
}

/// A method parameter declaration.
#[derive(Clone, Debug)]
pub struct JavaParameter {
    pub param_type: JavaType,
    pub name: String,
    pub is_final: bool,
    pub is_varargs: bool,
}

/// A Java method declaration.
#[derive(Clone, Debug)]
pub struct JavaMethod {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_synchronized: bool,
    pub is_native: bool,
    pub is_default: bool,
    pub is_synthetic: bool,
    pub is_bridge: bool,
    pub annotations: Vec<JavaAnnotation>,
    pub type_parameters: Vec<TypeParameter>,
    pub return_type: JavaType,
    pub name: String,
    pub descriptor: String,
    pub parameters: Vec<JavaParameter>,
    pub throws: Vec<JavaType>,
    pub body: Option<MethodBody>,
    /// If decompilation failed, this holds the error message and bytecode fallback.
    pub error: Option<String>,
}

impl JavaMethod {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

/// A Java field declaration.
#[derive(Clone, Debug)]
pub struct JavaField {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_volatile: bool,
    pub is_transient: bool,
    pub is_synthetic: bool,
    pub is_enum_constant: bool,
    pub annotations: Vec<JavaAnnotation>,
    pub field_type: JavaType,
    pub name: String,
    pub initializer: Option<Expr>,
}
