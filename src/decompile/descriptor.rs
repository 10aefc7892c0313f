//! JVM type descriptor and method descriptor parser.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1},
    character::complete::{char, one_of},
    combinator::{all_consuming, map},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};

use crate::code_attribute::{ArrayKind, ValueKind};

/// Represents a JVM type from a descriptor string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum JvmType {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
    Boolean,
    Void,
    Reference(String),
    Array(Box<JvmType>),
    Null,
    Unknown,
}

impl JvmType {
    pub fn object() -> Self {
        JvmType::Reference("java/lang/Object".into())
    }

    /// Returns true if this type occupies two slots on the JVM stack.
    pub fn is_wide(&self) -> bool {
        matches!(self, JvmType::Long | JvmType::Double)
    }

    /// Types the JVM computes with as `int`.
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            JvmType::Int | JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Boolean
        )
    }

    pub fn from_value_kind(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int => JvmType::Int,
            ValueKind::Long => JvmType::Long,
            ValueKind::Float => JvmType::Float,
            ValueKind::Double => JvmType::Double,
            ValueKind::Reference => JvmType::object(),
        }
    }

    pub fn from_array_kind(kind: ArrayKind) -> Self {
        match kind {
            ArrayKind::Int => JvmType::Int,
            ArrayKind::Long => JvmType::Long,
            ArrayKind::Float => JvmType::Float,
            ArrayKind::Double => JvmType::Double,
            ArrayKind::Reference => JvmType::object(),
            ArrayKind::Byte => JvmType::Byte,
            ArrayKind::Char => JvmType::Char,
            ArrayKind::Short => JvmType::Short,
        }
    }

    /// Element type of an array type; `Unknown` for anything else.
    pub fn element(&self) -> JvmType {
        match self {
            JvmType::Array(inner) => (**inner).clone(),
            _ => JvmType::Unknown,
        }
    }

    /// Internal name of the class this type mentions, looking through arrays.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            JvmType::Reference(name) => Some(name),
            JvmType::Array(inner) => inner.class_name(),
            _ => None,
        }
    }

    /// Returns the JVM descriptor string for this type.
    pub fn to_descriptor(&self) -> String {
        match self {
            JvmType::Int => "I".into(),
            JvmType::Long => "J".into(),
            JvmType::Float => "F".into(),
            JvmType::Double => "D".into(),
            JvmType::Byte => "B".into(),
            JvmType::Char => "C".into(),
            JvmType::Short => "S".into(),
            JvmType::Boolean => "Z".into(),
            JvmType::Void => "V".into(),
            JvmType::Reference(name) => format!("L{};", name),
            JvmType::Array(inner) => format!("[{}", inner.to_descriptor()),
            JvmType::Null | JvmType::Unknown => "Ljava/lang/Object;".into(),
        }
    }

    /// Returns the simple (unqualified) name for display.
    pub fn simple_name(&self) -> String {
        match self {
            JvmType::Int => "int".into(),
            JvmType::Long => "long".into(),
            JvmType::Float => "float".into(),
            JvmType::Double => "double".into(),
            JvmType::Byte => "byte".into(),
            JvmType::Char => "char".into(),
            JvmType::Short => "short".into(),
            JvmType::Boolean => "boolean".into(),
            JvmType::Void => "void".into(),
            JvmType::Reference(name) => internal_to_source_name(name),
            JvmType::Array(inner) => format!("{}[]", inner.simple_name()),
            JvmType::Null => "null".into(),
            JvmType::Unknown => "/* unknown */".into(),
        }
    }
}

fn base_type(input: &str) -> IResult<&str, JvmType> {
    map(one_of("BCDFIJSZ"), |c| match c {
        'B' => JvmType::Byte,
        'C' => JvmType::Char,
        'D' => JvmType::Double,
        'F' => JvmType::Float,
        'I' => JvmType::Int,
        'J' => JvmType::Long,
        'S' => JvmType::Short,
        _ => JvmType::Boolean,
    })(input)
}

fn object_type(input: &str) -> IResult<&str, JvmType> {
    map(
        delimited(char('L'), take_till1(|c| c == ';'), char(';')),
        |name: &str| JvmType::Reference(name.to_string()),
    )(input)
}

fn array_type(input: &str) -> IResult<&str, JvmType> {
    map(preceded(char('['), field_type), |inner| {
        JvmType::Array(Box::new(inner))
    })(input)
}

/// One FieldType production.
pub fn field_type(input: &str) -> IResult<&str, JvmType> {
    alt((base_type, object_type, array_type))(input)
}

fn return_type(input: &str) -> IResult<&str, JvmType> {
    alt((map(char('V'), |_| JvmType::Void), field_type))(input)
}

fn method_descriptor(input: &str) -> IResult<&str, (Vec<JvmType>, JvmType)> {
    let (input, params) = delimited(tag("("), many0(field_type), tag(")"))(input)?;
    let (input, ret) = return_type(input)?;
    Ok((input, (params, ret)))
}

/// Parse a full type descriptor string.
pub fn parse_type_descriptor(desc: &str) -> Option<JvmType> {
    all_consuming(field_type)(desc).ok().map(|(_, t)| t)
}

/// Parse a method descriptor, e.g. "(II)V" -> ([Int, Int], Void)
pub fn parse_method_descriptor(desc: &str) -> Option<(Vec<JvmType>, JvmType)> {
    all_consuming(method_descriptor)(desc).ok().map(|(_, m)| m)
}

/// Parse the operand of `checkcast`/`anewarray`/`instanceof`, which is either
/// an internal class name or an array descriptor.
pub fn parse_class_operand(name: &str) -> JvmType {
    if name.starts_with('[') {
        parse_type_descriptor(name).unwrap_or(JvmType::Unknown)
    } else {
        JvmType::Reference(name.to_string())
    }
}

/// Local slots taken by a method's parameters, including `this`.
pub fn parameter_slots(params: &[JvmType], is_static: bool) -> u16 {
    let base = if is_static { 0 } else { 1 };
    params
        .iter()
        .fold(base, |acc, p| acc + if p.is_wide() { 2 } else { 1 })
}

/// Convert internal class name to source name.
pub fn internal_to_source_name(name: &str) -> String {
    name.replace('/', ".")
}

/// Get just the simple class name from an internal name.
pub fn simple_class_name(name: &str) -> &str {
    match name.rfind('/') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Get the package from an internal name.
pub fn package_name(name: &str) -> Option<&str> {
    match name.rfind('/') {
        Some(pos) => Some(&name[..pos]),
        None => None,
    }
}

/// Convert a newarray type code to JvmType.
pub fn newarray_type(atype: u8) -> JvmType {
    match atype {
        4 => JvmType::Boolean,
        5 => JvmType::Char,
        6 => JvmType::Float,
        7 => JvmType::Double,
        8 => JvmType::Byte,
        9 => JvmType::Short,
        10 => JvmType::Int,
        11 => JvmType::Long,
        _ => JvmType::Unknown,
    }
}
