use binrw::BinRead;

use crate::attribute_info::{AttributeInfo, AttributeInfoVariant, CodeAttribute};
use crate::constant_info::ConstantPool;
use crate::error::ClassFileError;
use crate::InterpretInner;

#[derive(Clone, Debug, BinRead)]
#[br(big)]
pub struct MethodInfo {
    pub access_flags: MethodAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

impl InterpretInner for MethodInfo {
    fn interpret_inner(&mut self, const_pool: &ConstantPool) {
        for attr in &mut self.attributes {
            attr.interpret_inner(const_pool);
        }
    }
}

impl MethodInfo {
    /// The interpreted Code attribute, absent for abstract and native methods.
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::Code(code)) => Some(code),
            _ => None,
        })
    }

    /// The error behind a Code attribute that is present but could not be
    /// interpreted. `None` when the method has no Code attribute or it parsed.
    pub fn code_error(&self, const_pool: &ConstantPool) -> Option<ClassFileError> {
        self.attributes
            .iter()
            .filter(|a| a.info_parsed.is_none())
            .filter(|a| const_pool.utf8(a.attribute_name_index).ok() == Some("Code"))
            .find_map(|a| a.interpret(const_pool).err())
    }

    pub fn signature_index(&self) -> Option<u16> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::Signature(s)) => Some(s.signature_index),
            _ => None,
        })
    }

    /// Class indices listed in the Exceptions attribute.
    pub fn thrown_exceptions(&self) -> &[u16] {
        self.attributes
            .iter()
            .find_map(|a| match &a.info_parsed {
                Some(AttributeInfoVariant::Exceptions(e)) => Some(e.exception_table.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BinRead)]
pub struct MethodAccessFlags(u16);

bitflags::bitflags! {
    impl MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;       // 	Declared public; may be accessed from outside its package.
        const PRIVATE = 0x0002;      // 	Declared private; accessible only within the defining class.
        const PROTECTED = 0x0004;    // 	Declared protected; may be accessed within subclasses.
        const STATIC = 0x0008;       // 	Declared static.
        const FINAL = 0x0010;        // 	Declared final; must not be overridden.
        const SYNCHRONIZED = 0x0020; // 	Declared synchronized; invocation is wrapped by a monitor use.
        const BRIDGE = 0x0040;       // 	A bridge method, generated by the compiler.
        const VARARGS = 0x0080;      // 	Declared with variable number of arguments.
        const NATIVE = 0x0100;       // 	Declared native; implemented in a language other than Java.
        const ABSTRACT = 0x0400;     // 	Declared abstract; no implementation is provided.
        const STRICT = 0x0800;       // 	Declared strictfp; floating-point mode is FP-strict.
        const SYNTHETIC = 0x1000;    // 	Declared synthetic; not present in the source code.
    }
}
