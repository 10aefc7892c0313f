use nom::{
    bytes::complete::take,
    combinator::map,
    error::{Error, ErrorKind},
    multi::count,
    number::complete::{be_u16, be_u32, be_u8},
    Err as BaseErr,
};

use super::types::*;

// Using a type alias here evades a Clippy warning about complex types.
type Err<E> = BaseErr<Error<E>>;
type ParseResult<'a, T> = Result<(&'a [u8], T), Err<&'a [u8]>>;

pub fn attribute_parser(input: &[u8]) -> ParseResult<'_, AttributeInfo> {
    let (input, attribute_name_index) = be_u16(input)?;
    let (input, attribute_length) = be_u32(input)?;
    let (input, info) = take(attribute_length)(input)?;
    Ok((
        input,
        AttributeInfo {
            attribute_name_index,
            attribute_length,
            info: info.to_owned(),
            info_parsed: None,
        },
    ))
}

pub fn exception_entry_parser(input: &[u8]) -> ParseResult<'_, ExceptionEntry> {
    let (input, start_pc) = be_u16(input)?;
    let (input, end_pc) = be_u16(input)?;
    let (input, handler_pc) = be_u16(input)?;
    let (input, catch_type) = be_u16(input)?;
    Ok((
        input,
        ExceptionEntry {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        },
    ))
}

pub fn code_attribute_parser(input: &[u8]) -> ParseResult<'_, CodeAttribute> {
    let (input, max_stack) = be_u16(input)?;
    let (input, max_locals) = be_u16(input)?;
    let (input, code_length) = be_u32(input)?;
    let (input, code) = take(code_length)(input)?;
    let (input, exception_table_length) = be_u16(input)?;
    let (input, exception_table) =
        count(exception_entry_parser, exception_table_length as usize)(input)?;
    let (input, attributes_count) = be_u16(input)?;
    let (input, attributes) = count(attribute_parser, attributes_count as usize)(input)?;
    Ok((
        input,
        CodeAttribute {
            max_stack,
            max_locals,
            code_length,
            code: code.to_owned(),
            exception_table_length,
            exception_table,
            attributes_count,
            attributes,
        },
    ))
}

pub fn method_parameters_attribute_parser(input: &[u8]) -> ParseResult<'_, MethodParametersAttribute> {
    let (input, parameters_count) = be_u8(input)?;
    let (input, parameters) = count(parameters_parser, parameters_count as usize)(input)?;
    Ok((
        input,
        MethodParametersAttribute {
            parameters_count,
            parameters,
        },
    ))
}

fn parameters_parser(input: &[u8]) -> ParseResult<'_, ParameterAttribute> {
    let (input, name_index) = be_u16(input)?;
    let (input, access_flags) = be_u16(input)?;
    Ok((
        input,
        ParameterAttribute {
            name_index,
            access_flags,
        },
    ))
}

pub fn inner_classes_attribute_parser(input: &[u8]) -> ParseResult<'_, InnerClassesAttribute> {
    let (input, number_of_classes) = be_u16(input)?;
    let (input, classes) = count(inner_class_info_parser, number_of_classes as usize)(input)?;
    Ok((
        input,
        InnerClassesAttribute {
            number_of_classes,
            classes,
        },
    ))
}

fn inner_class_info_parser(input: &[u8]) -> ParseResult<'_, InnerClassInfo> {
    let (input, inner_class_info_index) = be_u16(input)?;
    let (input, outer_class_info_index) = be_u16(input)?;
    let (input, inner_name_index) = be_u16(input)?;
    let (input, flags) = be_u16(input)?;
    Ok((
        input,
        InnerClassInfo {
            inner_class_info_index,
            outer_class_info_index,
            inner_name_index,
            inner_class_access_flags: InnerClassAccessFlags::from_bits_truncate(flags),
        },
    ))
}

pub fn enclosing_method_attribute_parser(input: &[u8]) -> ParseResult<'_, EnclosingMethodAttribute> {
    let (input, class_index) = be_u16(input)?;
    let (input, method_index) = be_u16(input)?;
    Ok((
        input,
        EnclosingMethodAttribute {
            class_index,
            method_index,
        },
    ))
}

pub fn signature_attribute_parser(input: &[u8]) -> ParseResult<'_, SignatureAttribute> {
    let (input, signature_index) = be_u16(input)?;
    Ok((input, SignatureAttribute { signature_index }))
}

pub fn annotations_attribute_parser(input: &[u8]) -> ParseResult<'_, AnnotationsAttribute> {
    let (input, num_annotations) = be_u16(input)?;
    let (input, annotations) = count(annotation_parser, num_annotations as usize)(input)?;
    Ok((
        input,
        AnnotationsAttribute {
            num_annotations,
            annotations,
        },
    ))
}

fn annotation_parser(input: &[u8]) -> ParseResult<'_, RuntimeAnnotation> {
    let (input, type_index) = be_u16(input)?;
    let (input, num_element_value_pairs) = be_u16(input)?;
    let (input, element_value_pairs) =
        count(element_value_pair_parser, num_element_value_pairs as usize)(input)?;
    Ok((
        input,
        RuntimeAnnotation {
            type_index,
            num_element_value_pairs,
            element_value_pairs,
        },
    ))
}

fn element_value_pair_parser(input: &[u8]) -> ParseResult<'_, ElementValuePair> {
    let (input, element_name_index) = be_u16(input)?;
    let (input, value) = element_value_parser(input)?;
    Ok((
        input,
        ElementValuePair {
            element_name_index,
            value,
        },
    ))
}

fn array_value_parser(input: &[u8]) -> ParseResult<'_, ElementArrayValue> {
    let (input, num_values) = be_u16(input)?;
    let (input, values) = count(element_value_parser, num_values as usize)(input)?;
    Ok((input, ElementArrayValue { num_values, values }))
}

pub fn element_value_parser(input: &[u8]) -> ParseResult<'_, ElementValue> {
    let (input, tag) = be_u8(input)?;
    match tag as char {
        'B' | 'C' | 'I' | 'S' | 'Z' | 'D' | 'F' | 'J' | 's' => map(be_u16, |value| {
            ElementValue::ConstValueIndex {
                tag: tag as char,
                value,
            }
        })(input),
        'e' => map(enum_const_value_parser, ElementValue::EnumConst)(input),
        'c' => map(be_u16, ElementValue::ClassInfoIndex)(input),
        '@' => map(annotation_parser, ElementValue::AnnotationValue)(input),
        '[' => map(array_value_parser, ElementValue::ElementArray)(input),
        _ => Result::Err(BaseErr::Error(Error::new(input, ErrorKind::NoneOf))),
    }
}

fn enum_const_value_parser(input: &[u8]) -> ParseResult<'_, EnumConstValue> {
    let (input, type_name_index) = be_u16(input)?;
    let (input, const_name_index) = be_u16(input)?;
    Ok((
        input,
        EnumConstValue {
            type_name_index,
            const_name_index,
        },
    ))
}

pub fn line_number_table_attribute_parser(input: &[u8]) -> ParseResult<'_, LineNumberTableAttribute> {
    let (input, line_number_table_length) = be_u16(input)?;
    let (input, line_number_table) = count(
        line_number_table_entry_parser,
        line_number_table_length as usize,
    )(input)?;
    Ok((
        input,
        LineNumberTableAttribute {
            line_number_table_length,
            line_number_table,
        },
    ))
}

fn line_number_table_entry_parser(input: &[u8]) -> ParseResult<'_, LineNumberTableEntry> {
    let (input, start_pc) = be_u16(input)?;
    let (input, line_number) = be_u16(input)?;
    Ok((
        input,
        LineNumberTableEntry {
            start_pc,
            line_number,
        },
    ))
}

pub fn local_variable_table_parser(input: &[u8]) -> ParseResult<'_, LocalVariableTableAttribute> {
    let (input, local_variable_table_length) = be_u16(input)?;
    let (input, items) = count(
        local_variable_table_item_parser,
        local_variable_table_length as usize,
    )(input)?;
    Ok((
        input,
        LocalVariableTableAttribute {
            local_variable_table_length,
            items,
        },
    ))
}

fn local_variable_table_item_parser(input: &[u8]) -> ParseResult<'_, LocalVariableTableItem> {
    let (input, start_pc) = be_u16(input)?;
    let (input, length) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, descriptor_index) = be_u16(input)?;
    let (input, index) = be_u16(input)?;
    Ok((
        input,
        LocalVariableTableItem {
            start_pc,
            length,
            name_index,
            descriptor_index,
            index,
        },
    ))
}

pub fn local_variable_type_table_parser(
    input: &[u8],
) -> ParseResult<'_, LocalVariableTypeTableAttribute> {
    let (input, local_variable_type_table_length) = be_u16(input)?;
    let (input, items) = count(
        local_variable_type_table_item_parser,
        local_variable_type_table_length as usize,
    )(input)?;
    Ok((
        input,
        LocalVariableTypeTableAttribute {
            local_variable_type_table_length,
            items,
        },
    ))
}

fn local_variable_type_table_item_parser(input: &[u8]) -> ParseResult<'_, LocalVariableTypeTableItem> {
    let (input, start_pc) = be_u16(input)?;
    let (input, length) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, signature_index) = be_u16(input)?;
    let (input, index) = be_u16(input)?;
    Ok((
        input,
        LocalVariableTypeTableItem {
            start_pc,
            length,
            name_index,
            signature_index,
            index,
        },
    ))
}

pub fn exceptions_attribute_parser(input: &[u8]) -> ParseResult<'_, ExceptionsAttribute> {
    let (input, exception_table_length) = be_u16(input)?;
    let (input, exception_table) = count(be_u16, exception_table_length as usize)(input)?;
    Ok((
        input,
        ExceptionsAttribute {
            exception_table_length,
            exception_table,
        },
    ))
}

pub fn constant_value_attribute_parser(input: &[u8]) -> ParseResult<'_, ConstantValueAttribute> {
    let (input, constant_value_index) = be_u16(input)?;
    Ok((
        input,
        ConstantValueAttribute {
            constant_value_index,
        },
    ))
}

fn bootstrap_method_parser(input: &[u8]) -> ParseResult<'_, BootstrapMethod> {
    let (input, bootstrap_method_ref) = be_u16(input)?;
    let (input, num_bootstrap_arguments) = be_u16(input)?;
    let (input, bootstrap_arguments) = count(be_u16, num_bootstrap_arguments as usize)(input)?;
    Ok((
        input,
        BootstrapMethod {
            bootstrap_method_ref,
            num_bootstrap_arguments,
            bootstrap_arguments,
        },
    ))
}

pub fn bootstrap_methods_attribute_parser(input: &[u8]) -> ParseResult<'_, BootstrapMethodsAttribute> {
    let (input, num_bootstrap_methods) = be_u16(input)?;
    let (input, bootstrap_methods) =
        count(bootstrap_method_parser, num_bootstrap_methods as usize)(input)?;
    Ok((
        input,
        BootstrapMethodsAttribute {
            num_bootstrap_methods,
            bootstrap_methods,
        },
    ))
}

pub fn sourcefile_attribute_parser(input: &[u8]) -> ParseResult<'_, SourceFileAttribute> {
    let (input, sourcefile_index) = be_u16(input)?;
    Ok((input, SourceFileAttribute { sourcefile_index }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_attribute_keeps_exception_table_order() {
        let mut body = vec![0, 2, 0, 1, 0, 0, 0, 1, 0xb1];
        body.extend_from_slice(&[0, 2]);
        body.extend_from_slice(&[0, 0, 0, 10, 0, 20, 0, 0]);
        body.extend_from_slice(&[0, 0, 0, 5, 0, 30, 0, 7]);
        body.extend_from_slice(&[0, 0]);
        let (rest, code) = code_attribute_parser(&body).unwrap();
        assert!(rest.is_empty());
        assert_eq!(code.code, vec![0xb1]);
        assert_eq!(code.exception_table[0].handler_pc, 20);
        assert_eq!(code.exception_table[1].handler_pc, 30);
        assert_eq!(code.exception_table[1].catch_type, 7);
    }

    #[test]
    fn test_truncated_code_attribute_is_an_error() {
        let body = [0, 2, 0, 1, 0, 0, 0, 9, 0xb1];
        assert!(code_attribute_parser(&body).is_err());
    }

    #[test]
    fn test_nested_annotation_values() {
        let body = [
            0, 1, // one annotation
            0, 3, 0, 2, // type 3, two pairs
            0, 4, b'e', 0, 5, 0, 6, // enum constant
            0, 7, b'[', 0, 2, b'I', 0, 8, b's', 0, 9, // array of two
        ];
        let (rest, attr) = annotations_attribute_parser(&body).unwrap();
        assert!(rest.is_empty());
        let pairs = &attr.annotations[0].element_value_pairs;
        assert!(matches!(pairs[0].value, ElementValue::EnumConst(_)));
        match &pairs[1].value {
            ElementValue::ElementArray(arr) => assert_eq!(arr.values.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
