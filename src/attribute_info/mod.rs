mod parser;
mod types;

pub use self::parser::*;
pub use self::types::*;

use crate::constant_info::ConstantPool;
use crate::error::{ClassFileError, ClassFileResult};
use crate::InterpretInner;

impl AttributeInfo {
    /// Build an uninterpreted attribute from its name index and body.
    pub fn new(attribute_name_index: u16, info: Vec<u8>) -> Self {
        Self {
            attribute_name_index,
            attribute_length: info.len() as u32,
            info,
            info_parsed: None,
        }
    }

    /// Parse the raw body according to the attribute's name.
    ///
    /// Unknown attribute names yield `Ok(None)` and stay raw. A body that the
    /// parser does not consume exactly is a length error.
    pub fn interpret(&self, const_pool: &ConstantPool) -> ClassFileResult<Option<AttributeInfoVariant>> {
        let name = const_pool.utf8(self.attribute_name_index)?;
        let input = self.info.as_slice();
        let malformed = |_| ClassFileError::MalformedAttribute {
            name: name.to_string(),
        };
        let (rest, variant) = match name {
            "Code" => {
                let (rest, mut code) = code_attribute_parser(input).map_err(malformed)?;
                for attr in &mut code.attributes {
                    attr.interpret_inner(const_pool);
                }
                (rest, AttributeInfoVariant::Code(code))
            }
            "LineNumberTable" => {
                let (rest, a) = line_number_table_attribute_parser(input).map_err(malformed)?;
                (rest, AttributeInfoVariant::LineNumberTable(a))
            }
            "LocalVariableTable" => {
                let (rest, a) = local_variable_table_parser(input).map_err(malformed)?;
                (rest, AttributeInfoVariant::LocalVariableTable(a))
            }
            "LocalVariableTypeTable" => {
                let (rest, a) = local_variable_type_table_parser(input).map_err(malformed)?;
                (rest, AttributeInfoVariant::LocalVariableTypeTable(a))
            }
            "Signature" => {
                let (rest, a) = signature_attribute_parser(input).map_err(malformed)?;
                (rest, AttributeInfoVariant::Signature(a))
            }
            "Exceptions" => {
                let (rest, a) = exceptions_attribute_parser(input).map_err(malformed)?;
                (rest, AttributeInfoVariant::Exceptions(a))
            }
            "SourceFile" => {
                let (rest, a) = sourcefile_attribute_parser(input).map_err(malformed)?;
                (rest, AttributeInfoVariant::SourceFile(a))
            }
            "ConstantValue" => {
                let (rest, a) = constant_value_attribute_parser(input).map_err(malformed)?;
                (rest, AttributeInfoVariant::ConstantValue(a))
            }
            "InnerClasses" => {
                let (rest, a) = inner_classes_attribute_parser(input).map_err(malformed)?;
                (rest, AttributeInfoVariant::InnerClasses(a))
            }
            "EnclosingMethod" => {
                let (rest, a) = enclosing_method_attribute_parser(input).map_err(malformed)?;
                (rest, AttributeInfoVariant::EnclosingMethod(a))
            }
            "BootstrapMethods" => {
                let (rest, a) = bootstrap_methods_attribute_parser(input).map_err(malformed)?;
                (rest, AttributeInfoVariant::BootstrapMethods(a))
            }
            "MethodParameters" => {
                let (rest, a) = method_parameters_attribute_parser(input).map_err(malformed)?;
                (rest, AttributeInfoVariant::MethodParameters(a))
            }
            "RuntimeVisibleAnnotations" => {
                let (rest, a) = annotations_attribute_parser(input).map_err(malformed)?;
                (rest, AttributeInfoVariant::RuntimeVisibleAnnotations(a))
            }
            "RuntimeInvisibleAnnotations" => {
                let (rest, a) = annotations_attribute_parser(input).map_err(malformed)?;
                (rest, AttributeInfoVariant::RuntimeInvisibleAnnotations(a))
            }
            "Synthetic" => (input, AttributeInfoVariant::Synthetic),
            "Deprecated" => (input, AttributeInfoVariant::Deprecated),
            _ => return Ok(None),
        };
        if !rest.is_empty() {
            return Err(ClassFileError::AttributeLength {
                name: name.to_string(),
                declared: self.info.len(),
                parsed: self.info.len() - rest.len(),
            });
        }
        Ok(Some(variant))
    }
}

impl InterpretInner for AttributeInfo {
    fn interpret_inner(&mut self, const_pool: &ConstantPool) {
        match self.interpret(const_pool) {
            Ok(parsed) => self.info_parsed = parsed,
            Err(e) => log::warn!("leaving attribute uninterpreted: {}", e),
        }
    }
}
