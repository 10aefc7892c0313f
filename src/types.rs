use binrw::BinRead;

use crate::attribute_info::{AttributeInfo, AttributeInfoVariant};
use crate::constant_info::{parse_pool, ConstantPool};
use crate::field_info::FieldInfo;
use crate::method_info::MethodInfo;
use crate::InterpretInner;

#[derive(Clone, Debug, BinRead)]
#[br(big, magic = b"\xca\xfe\xba\xbe")]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub const_pool_size: u16,
    #[br(parse_with = parse_pool, args(const_pool_size))]
    pub const_pool: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces_count: u16,
    #[br(count = interfaces_count)]
    pub interfaces: Vec<u16>,
    pub fields_count: u16,
    #[br(count = fields_count)]
    pub fields: Vec<FieldInfo>,
    pub methods_count: u16,
    #[br(count = methods_count)]
    pub methods: Vec<MethodInfo>,
    pub attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    /// Interpret every attribute table against the constant pool.
    pub fn interpret(&mut self) {
        let pool = self.const_pool.clone();
        for attr in &mut self.attributes {
            attr.interpret_inner(&pool);
        }
        for field in &mut self.fields {
            field.interpret_inner(&pool);
        }
        for method in &mut self.methods {
            method.interpret_inner(&pool);
        }
    }

    /// Internal name of this class, e.g. `java/lang/String`.
    pub fn this_class_name(&self) -> crate::ClassFileResult<&str> {
        self.const_pool.class_name(self.this_class)
    }

    /// Internal name of the superclass; `None` for `java/lang/Object` itself.
    pub fn super_class_name(&self) -> crate::ClassFileResult<Option<&str>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.const_pool.class_name(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> crate::ClassFileResult<Vec<&str>> {
        self.interfaces
            .iter()
            .map(|&i| self.const_pool.class_name(i))
            .collect()
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| self.const_pool.utf8(m.name_index).map(|n| n == name).unwrap_or(false))
    }

    pub fn find_method_with_descriptor(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| {
            self.const_pool.utf8(m.name_index).ok() == Some(name)
                && self.const_pool.utf8(m.descriptor_index).ok() == Some(descriptor)
        })
    }

    /// Generic signature string from the class-level Signature attribute.
    pub fn signature(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::Signature(s)) => self.const_pool.utf8(s.signature_index).ok(),
            _ => None,
        })
    }

    pub fn source_file(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::SourceFile(s)) => self.const_pool.utf8(s.sourcefile_index).ok(),
            _ => None,
        })
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BinRead)]
pub struct ClassAccessFlags(u16);

bitflags::bitflags! {
    impl ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     //	Declared public; may be accessed from outside its package.
        const FINAL = 0x0010;      //	Declared final; no subclasses allowed.
        const SUPER = 0x0020;      //	Treat superclass methods specially when invoked by the invokespecial instruction.
        const INTERFACE = 0x0200;  //	Is an interface, not a class.
        const ABSTRACT = 0x0400;   //	Declared abstract; must not be instantiated.
        const SYNTHETIC = 0x1000;  //	Declared synthetic; not present in the source code.
        const ANNOTATION = 0x2000; //	Declared as an annotation type.
        const ENUM = 0x4000;       //	Declared as an enum type.
        const MODULE = 0x8000;     //	Declared as a module type.
    }
}
