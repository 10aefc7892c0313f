//! Generic signature grammar (JVMS 4.7.9.1) parsed into [`JavaType`] trees.
//!
//! A malformed signature is a resolution gap, not an error: the parse
//! functions log a warning and return `None`, and callers fall back to the
//! erased descriptor.

use nom::{
    branch::alt,
    bytes::complete::take_till1,
    character::complete::{char, one_of},
    combinator::{all_consuming, map, opt},
    multi::{many0, many1},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

use super::descriptor::{self, JvmType};
use super::java_ast::{JavaType, PrimitiveType, TypeParameter};

/// Parsed `ClassSignature`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub super_class: JavaType,
    pub interfaces: Vec<JavaType>,
}

/// Parsed `MethodSignature`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub parameters: Vec<JavaType>,
    pub return_type: JavaType,
    pub throws: Vec<JavaType>,
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_till1(|c| ".;[/<>:".contains(c))(input)
}

fn base_type(input: &str) -> IResult<&str, JavaType> {
    map(one_of("BCDFIJSZ"), |c| {
        JavaType::Primitive(match c {
            'B' => PrimitiveType::Byte,
            'C' => PrimitiveType::Char,
            'D' => PrimitiveType::Double,
            'F' => PrimitiveType::Float,
            'I' => PrimitiveType::Int,
            'J' => PrimitiveType::Long,
            'S' => PrimitiveType::Short,
            _ => PrimitiveType::Boolean,
        })
    })(input)
}

fn type_argument(input: &str) -> IResult<&str, JavaType> {
    alt((
        map(char('*'), |_| JavaType::WildcardType {
            bound: None,
            is_upper: true,
        }),
        map(preceded(char('+'), reference_type), |t| JavaType::WildcardType {
            bound: Some(Box::new(t)),
            is_upper: true,
        }),
        map(preceded(char('-'), reference_type), |t| JavaType::WildcardType {
            bound: Some(Box::new(t)),
            is_upper: false,
        }),
        reference_type,
    ))(input)
}

fn type_arguments(input: &str) -> IResult<&str, Vec<JavaType>> {
    delimited(char('<'), many1(type_argument), char('>'))(input)
}

fn simple_class_type(input: &str) -> IResult<&str, (&str, Vec<JavaType>)> {
    let (input, name) = identifier(input)?;
    let (input, args) = opt(type_arguments)(input)?;
    Ok((input, (name, args.unwrap_or_default())))
}

fn class_type(input: &str) -> IResult<&str, JavaType> {
    let (input, _) = char('L')(input)?;
    let (input, segments) = many0(terminated(identifier, char('/')))(input)?;
    let (input, (name, type_args)) = simple_class_type(input)?;
    let (input, nested) = many0(preceded(char('.'), simple_class_type))(input)?;
    let (input, _) = char(';')(input)?;

    let package = if segments.is_empty() {
        None
    } else {
        Some(segments.join("."))
    };
    let mut ty = JavaType::ClassType {
        package: package.clone(),
        name: name.to_string(),
        type_args,
        owner: None,
    };
    for (name, type_args) in nested {
        ty = JavaType::ClassType {
            package: package.clone(),
            name: name.to_string(),
            type_args,
            owner: Some(Box::new(ty)),
        };
    }
    Ok((input, ty))
}

fn type_variable(input: &str) -> IResult<&str, JavaType> {
    map(delimited(char('T'), identifier, char(';')), |name: &str| {
        JavaType::TypeVariable(name.to_string())
    })(input)
}

fn array_type(input: &str) -> IResult<&str, JavaType> {
    map(preceded(char('['), java_type), |t| JavaType::ArrayType(Box::new(t)))(input)
}

fn reference_type(input: &str) -> IResult<&str, JavaType> {
    alt((class_type, type_variable, array_type))(input)
}

fn java_type(input: &str) -> IResult<&str, JavaType> {
    alt((base_type, reference_type))(input)
}

fn type_parameter(input: &str) -> IResult<&str, TypeParameter> {
    let (input, name) = identifier(input)?;
    let (input, class_bound) = preceded(char(':'), opt(reference_type))(input)?;
    let (input, interface_bounds) = many0(preceded(char(':'), reference_type))(input)?;
    let bounds = class_bound.into_iter().chain(interface_bounds).collect();
    Ok((
        input,
        TypeParameter {
            name: name.to_string(),
            bounds,
        },
    ))
}

fn type_parameters(input: &str) -> IResult<&str, Vec<TypeParameter>> {
    map(
        opt(delimited(char('<'), many1(type_parameter), char('>'))),
        Option::unwrap_or_default,
    )(input)
}

fn class_signature(input: &str) -> IResult<&str, ClassSignature> {
    map(
        tuple((type_parameters, class_type, many0(class_type))),
        |(type_parameters, super_class, interfaces)| ClassSignature {
            type_parameters,
            super_class,
            interfaces,
        },
    )(input)
}

fn method_signature(input: &str) -> IResult<&str, MethodSignature> {
    map(
        tuple((
            type_parameters,
            delimited(char('('), many0(java_type), char(')')),
            alt((map(char('V'), |_| JavaType::Void), java_type)),
            many0(preceded(char('^'), alt((class_type, type_variable)))),
        )),
        |(type_parameters, parameters, return_type, throws)| MethodSignature {
            type_parameters,
            parameters,
            return_type,
            throws,
        },
    )(input)
}

fn complete<T>(
    kind: &str,
    sig: &str,
    parser: impl FnMut(&str) -> IResult<&str, T>,
) -> Option<T> {
    match all_consuming(parser)(sig) {
        Ok((_, parsed)) => Some(parsed),
        Err(_) => {
            log::warn!("malformed {} signature {:?}, using the erased type", kind, sig);
            None
        }
    }
}

pub fn parse_class_signature(sig: &str) -> Option<ClassSignature> {
    complete("class", sig, class_signature)
}

pub fn parse_method_signature(sig: &str) -> Option<MethodSignature> {
    complete("method", sig, method_signature)
}

/// Field and local-variable signatures are a single `ReferenceTypeSignature`.
pub fn parse_field_signature(sig: &str) -> Option<JavaType> {
    complete("field", sig, reference_type)
}

/// Raw class type for an internal name.
pub fn class_type_from_internal(name: &str) -> JavaType {
    JavaType::raw(
        descriptor::package_name(name).map(|p| p.replace('/', ".")),
        descriptor::simple_class_name(name),
    )
}

impl From<&JvmType> for JavaType {
    fn from(ty: &JvmType) -> Self {
        match ty {
            JvmType::Int => JavaType::Primitive(PrimitiveType::Int),
            JvmType::Long => JavaType::Primitive(PrimitiveType::Long),
            JvmType::Float => JavaType::Primitive(PrimitiveType::Float),
            JvmType::Double => JavaType::Primitive(PrimitiveType::Double),
            JvmType::Byte => JavaType::Primitive(PrimitiveType::Byte),
            JvmType::Char => JavaType::Primitive(PrimitiveType::Char),
            JvmType::Short => JavaType::Primitive(PrimitiveType::Short),
            JvmType::Boolean => JavaType::Primitive(PrimitiveType::Boolean),
            JvmType::Void => JavaType::Void,
            JvmType::Reference(name) => class_type_from_internal(name),
            JvmType::Array(inner) => JavaType::ArrayType(Box::new(JavaType::from(&**inner))),
            JvmType::Null | JvmType::Unknown => class_type_from_internal("java/lang/Object"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(pkg: &str, name: &str, args: Vec<JavaType>) -> JavaType {
        JavaType::ClassType {
            package: Some(pkg.into()),
            name: name.into(),
            type_args: args,
            owner: None,
        }
    }

    #[test]
    fn test_field_signature_parameterized() {
        let ty = parse_field_signature("Ljava/util/Map<Ljava/lang/String;+Ljava/lang/Number;>;")
            .unwrap();
        assert_eq!(ty.display_name(), "Map<String, ? extends Number>");
        assert_eq!(ty.internal_name().as_deref(), Some("java/util/Map"));
    }

    #[test]
    fn test_wildcards_and_type_variables() {
        let ty = parse_field_signature("Ljava/util/List<*>;").unwrap();
        assert_eq!(ty.display_name(), "List<?>");
        let ty = parse_field_signature("Ljava/util/List<-TT;>;").unwrap();
        assert_eq!(ty.display_name(), "List<? super T>");
        let ty = parse_field_signature("[TE;").unwrap();
        assert_eq!(ty, JavaType::ArrayType(Box::new(JavaType::TypeVariable("E".into()))));
    }

    #[test]
    fn test_inner_class_owner() {
        let ty = parse_field_signature("Lcom/x/Outer<TT;>.Inner<Ljava/lang/String;>;").unwrap();
        assert_eq!(ty.display_name(), "Outer<T>.Inner<String>");
        assert_eq!(ty.internal_name().as_deref(), Some("com/x/Outer$Inner"));
    }

    #[test]
    fn test_class_signature() {
        let sig = parse_class_signature(
            "<K:Ljava/lang/Object;V::Ljava/lang/Comparable<TV;>;>Ljava/util/AbstractMap<TK;TV;>;Ljava/io/Serializable;",
        )
        .unwrap();
        assert_eq!(sig.type_parameters.len(), 2);
        assert_eq!(sig.type_parameters[0].name, "K");
        assert_eq!(sig.type_parameters[1].bounds[0].display_name(), "Comparable<V>");
        assert_eq!(sig.super_class.display_name(), "AbstractMap<K, V>");
        assert_eq!(sig.interfaces, vec![class("java.io", "Serializable", vec![])]);
    }

    #[test]
    fn test_method_signature() {
        let sig = parse_method_signature(
            "<T:Ljava/lang/Object;>(Ljava/util/List<TT;>;I)TT;^Ljava/io/IOException;",
        )
        .unwrap();
        assert_eq!(sig.parameters.len(), 2);
        assert_eq!(sig.parameters[1], JavaType::Primitive(PrimitiveType::Int));
        assert_eq!(sig.return_type, JavaType::TypeVariable("T".into()));
        assert_eq!(sig.throws, vec![class("java.io", "IOException", vec![])]);

        let sig = parse_method_signature("()V").unwrap();
        assert_eq!(sig.return_type, JavaType::Void);
    }

    #[test]
    fn test_malformed_signature_is_none() {
        assert!(parse_field_signature("Ljava/util/List<>;").is_none());
        assert!(parse_method_signature("(I").is_none());
        assert!(parse_class_signature("Ljava/lang/Object").is_none());
    }
}
