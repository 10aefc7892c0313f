use binrw::BinRead;

#[derive(Clone, Debug, PartialEq, BinRead)]
#[br(big)]
pub enum ConstantInfo {
    #[br(magic = 1u8)]
    Utf8(Utf8Constant),
    #[br(magic = 3u8)]
    Integer(IntegerConstant),
    #[br(magic = 4u8)]
    Float(FloatConstant),
    #[br(magic = 5u8)]
    Long(LongConstant),
    #[br(magic = 6u8)]
    Double(DoubleConstant),
    #[br(magic = 7u8)]
    Class(ClassConstant),
    #[br(magic = 8u8)]
    String(StringConstant),
    #[br(magic = 9u8)]
    FieldRef(FieldRefConstant),
    #[br(magic = 10u8)]
    MethodRef(MethodRefConstant),
    #[br(magic = 11u8)]
    InterfaceMethodRef(InterfaceMethodRefConstant),
    #[br(magic = 12u8)]
    NameAndType(NameAndTypeConstant),
    #[br(magic = 15u8)]
    MethodHandle(MethodHandleConstant),
    #[br(magic = 16u8)]
    MethodType(MethodTypeConstant),
    #[br(magic = 17u8)]
    Dynamic(DynamicConstant),
    #[br(magic = 18u8)]
    InvokeDynamic(InvokeDynamicConstant),
    #[br(magic = 19u8)]
    Module(ModuleConstant),
    #[br(magic = 20u8)]
    Package(PackageConstant),
}

impl ConstantInfo {
    /// Long and Double entries occupy two constant pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantInfo::Long(_) | ConstantInfo::Double(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ConstantInfo::Utf8(_) => "Utf8",
            ConstantInfo::Integer(_) => "Integer",
            ConstantInfo::Float(_) => "Float",
            ConstantInfo::Long(_) => "Long",
            ConstantInfo::Double(_) => "Double",
            ConstantInfo::Class(_) => "Class",
            ConstantInfo::String(_) => "String",
            ConstantInfo::FieldRef(_) => "FieldRef",
            ConstantInfo::MethodRef(_) => "MethodRef",
            ConstantInfo::InterfaceMethodRef(_) => "InterfaceMethodRef",
            ConstantInfo::NameAndType(_) => "NameAndType",
            ConstantInfo::MethodHandle(_) => "MethodHandle",
            ConstantInfo::MethodType(_) => "MethodType",
            ConstantInfo::Dynamic(_) => "Dynamic",
            ConstantInfo::InvokeDynamic(_) => "InvokeDynamic",
            ConstantInfo::Module(_) => "Module",
            ConstantInfo::Package(_) => "Package",
        }
    }
}

/// Modified UTF-8 string. `value` is decoded once at read time.
#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct Utf8Constant {
    pub length: u16,
    #[br(count = length)]
    pub bytes: Vec<u8>,
    #[br(calc = decode_modified_utf8(&bytes))]
    pub value: String,
}

impl Utf8Constant {
    pub fn new(value: &str) -> Self {
        let bytes = encode_modified_utf8(value);
        Self {
            length: bytes.len() as u16,
            bytes,
            value: value.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct IntegerConstant {
    pub value: i32,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct FloatConstant {
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct LongConstant {
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct DoubleConstant {
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct ClassConstant {
    pub name_index: u16,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct StringConstant {
    pub string_index: u16,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct FieldRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct MethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct InterfaceMethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct NameAndTypeConstant {
    pub name_index: u16,
    pub descriptor_index: u16,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct MethodHandleConstant {
    pub reference_kind: u8,
    pub reference_index: u16,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct MethodTypeConstant {
    pub descriptor_index: u16,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct DynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct InvokeDynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct ModuleConstant {
    pub name_index: u16,
}

#[derive(Clone, Debug, PartialEq, BinRead)]
pub struct PackageConstant {
    pub name_index: u16,
}

/// Decode the JVM's modified UTF-8: `C0 80` encodes NUL and supplementary
/// characters arrive as surrogate pairs of three-byte sequences.
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            units.push((((b & 0x1F) as u16) << 6) | (bytes[i + 1] & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            units.push(
                (((b & 0x0F) as u16) << 12)
                    | (((bytes[i + 1] & 0x3F) as u16) << 6)
                    | (bytes[i + 2] & 0x3F) as u16,
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    char::decode_utf16(units.iter().copied())
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}
