use binrw::BinRead;

#[derive(Clone, Debug, BinRead)]
#[br(big)]
pub struct AttributeInfo {
    pub attribute_name_index: u16,
    pub attribute_length: u32,
    #[br(count = attribute_length)]
    pub info: Vec<u8>,
    #[br(calc = None)]
    pub info_parsed: Option<AttributeInfoVariant>,
}

#[derive(Clone, Debug)]
pub enum AttributeInfoVariant {
    Code(CodeAttribute),
    LineNumberTable(LineNumberTableAttribute),
    LocalVariableTable(LocalVariableTableAttribute),
    LocalVariableTypeTable(LocalVariableTypeTableAttribute),
    Signature(SignatureAttribute),
    Exceptions(ExceptionsAttribute),
    SourceFile(SourceFileAttribute),
    ConstantValue(ConstantValueAttribute),
    InnerClasses(InnerClassesAttribute),
    EnclosingMethod(EnclosingMethodAttribute),
    BootstrapMethods(BootstrapMethodsAttribute),
    MethodParameters(MethodParametersAttribute),
    RuntimeVisibleAnnotations(AnnotationsAttribute),
    RuntimeInvisibleAnnotations(AnnotationsAttribute),
    Synthetic,
    Deprecated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Zero for catch-all handlers (finally, synchronized unlock).
    pub catch_type: u16,
}

impl ExceptionEntry {
    pub fn covers(&self, pc: u32) -> bool {
        (self.start_pc as u32) <= pc && pc < (self.end_pc as u32)
    }
}

#[derive(Clone, Debug)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_length: u32,
    pub code: Vec<u8>,
    pub exception_table_length: u16,
    /// Kept in table order; the order is the handler priority.
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes_count: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    pub fn line_number_table(&self) -> Option<&LineNumberTableAttribute> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::LineNumberTable(t)) => Some(t),
            _ => None,
        })
    }

    pub fn local_variable_table(&self) -> Option<&LocalVariableTableAttribute> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::LocalVariableTable(t)) => Some(t),
            _ => None,
        })
    }

    pub fn local_variable_type_table(&self) -> Option<&LocalVariableTypeTableAttribute> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::LocalVariableTypeTable(t)) => Some(t),
            _ => None,
        })
    }

    /// Best-known source line for `pc`: the entry with the greatest start not after it.
    pub fn line_for(&self, pc: u32) -> Option<u16> {
        self.line_number_table()?
            .line_number_table
            .iter()
            .filter(|e| (e.start_pc as u32) <= pc)
            .max_by_key(|e| e.start_pc)
            .map(|e| e.line_number)
    }
}

#[derive(Clone, Debug)]
pub struct LineNumberTableAttribute {
    pub line_number_table_length: u16,
    pub line_number_table: Vec<LineNumberTableEntry>,
}

#[derive(Clone, Copy, Debug)]
pub struct LineNumberTableEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Clone, Debug)]
pub struct LocalVariableTableAttribute {
    pub local_variable_table_length: u16,
    pub items: Vec<LocalVariableTableItem>,
}

#[derive(Clone, Copy, Debug)]
pub struct LocalVariableTableItem {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

#[derive(Clone, Debug)]
pub struct LocalVariableTypeTableAttribute {
    pub local_variable_type_table_length: u16,
    pub items: Vec<LocalVariableTypeTableItem>,
}

#[derive(Clone, Copy, Debug)]
pub struct LocalVariableTypeTableItem {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub signature_index: u16,
    pub index: u16,
}

#[derive(Clone, Debug)]
pub struct MethodParametersAttribute {
    pub parameters_count: u8,
    pub parameters: Vec<ParameterAttribute>,
}

#[derive(Clone, Debug)]
pub struct ParameterAttribute {
    pub name_index: u16,
    pub access_flags: u16,
}

#[derive(Clone, Debug)]
pub struct InnerClassesAttribute {
    pub number_of_classes: u16,
    pub classes: Vec<InnerClassInfo>,
}

#[derive(Clone, Debug)]
pub struct InnerClassInfo {
    pub inner_class_info_index: u16,
    pub outer_class_info_index: u16,
    pub inner_name_index: u16,
    pub inner_class_access_flags: InnerClassAccessFlags,
}

bitflags::bitflags! {
    #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
    pub struct InnerClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     //	Declared public; may be accessed from outside its package.
        const PRIVATE = 0x0002;    //	Marked private in source.
        const PROTECTED = 0x0004;  //	Marked protected in source.
        const STATIC = 0x0008;     //	Marked or implicitly static in source.
        const FINAL = 0x0010;      //	Marked or implicitly final in source.
        const INTERFACE = 0x0200;  //	Was an interface in source.
        const ABSTRACT = 0x0400;   //	Marked or implicitly abstract in source.
        const SYNTHETIC = 0x1000;  //	Declared synthetic; not present in the source code.
        const ANNOTATION = 0x2000; //	Declared as an annotation type.
        const ENUM = 0x4000;       //	Declared as an enum type.
    }
}

#[derive(Clone, Debug)]
pub struct EnclosingMethodAttribute {
    pub class_index: u16,
    pub method_index: u16,
}

#[derive(Clone, Debug)]
pub struct SignatureAttribute {
    pub signature_index: u16,
}

#[derive(Clone, Debug)]
pub struct AnnotationsAttribute {
    pub num_annotations: u16,
    pub annotations: Vec<RuntimeAnnotation>,
}

#[derive(Clone, Debug)]
pub struct RuntimeAnnotation {
    pub type_index: u16,
    pub num_element_value_pairs: u16,
    pub element_value_pairs: Vec<ElementValuePair>,
}

#[derive(Clone, Debug)]
pub struct ElementValuePair {
    pub element_name_index: u16,
    pub value: ElementValue,
}

#[derive(Clone, Debug)]
pub enum ElementValue {
    ConstValueIndex { tag: char, value: u16 },
    EnumConst(EnumConstValue),
    ClassInfoIndex(u16),
    AnnotationValue(RuntimeAnnotation),
    ElementArray(ElementArrayValue),
}

#[derive(Clone, Debug)]
pub struct ElementArrayValue {
    pub num_values: u16,
    pub values: Vec<ElementValue>,
}

#[derive(Clone, Debug)]
pub struct EnumConstValue {
    pub type_name_index: u16,
    pub const_name_index: u16,
}

#[derive(Clone, Debug)]
pub struct ExceptionsAttribute {
    pub exception_table_length: u16,
    pub exception_table: Vec<u16>,
}

#[derive(Clone, Debug)]
pub struct ConstantValueAttribute {
    pub constant_value_index: u16,
}

#[derive(Clone, Debug)]
pub struct BootstrapMethod {
    pub bootstrap_method_ref: u16,
    pub num_bootstrap_arguments: u16,
    pub bootstrap_arguments: Vec<u16>,
}

#[derive(Clone, Debug)]
pub struct BootstrapMethodsAttribute {
    pub num_bootstrap_methods: u16,
    pub bootstrap_methods: Vec<BootstrapMethod>,
}

/// The SourceFile attribute is an optional fixed-length attribute in the attributes table of a ClassFile structure.
///
/// There may be at most one SourceFile attribute in the attributes table of a ClassFile structure.
/// [see more](https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.7.10)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SourceFileAttribute {
    /// The value of the sourcefile_index item must be a valid index into the constant_pool table.
    /// The constant_pool entry at that index must be a CONSTANT_Utf8_info structure representing a string.
    pub sourcefile_index: u16,
}
