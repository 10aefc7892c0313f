//! Reconstructs structured Java syntax trees from [Java Classfiles](https://docs.oracle.com/javase/specs/jvms/se10/html/jvms-4.html).
//!
//! The crate reads the class-file container with `binrw`, interprets attribute
//! bodies with `nom`, and runs every method body through the pipeline in
//! [`decompile`]: instruction decoding, stack simulation, control-flow
//! structuring and desugaring.

use std::fs::File;
use std::io::{prelude::*, BufReader, Cursor};
use std::path::Path;

use binrw::BinRead;

pub mod attribute_info;
pub mod code_attribute;
pub mod constant_info;
pub mod decompile;
pub mod error;
pub mod field_info;
pub mod method_info;
pub mod source;
pub mod types;

pub use error::{
    ClassFileError, ClassFileResult, DecodeError, DecodeResult, DecompileError, DecompileResult,
};
pub use types::*;

use constant_info::ConstantPool;

/// Types holding raw attributes implement this to turn them into
/// [`attribute_info::AttributeInfoVariant`]s once the constant pool is known.
pub trait InterpretInner {
    fn interpret_inner(&mut self, const_pool: &ConstantPool);
}

/// Attempt to parse a class file given a path to a class file (without .class extension)
///
/// ```no_run
/// match classfile_decompiler::parse_class("./java-assets/compiled-classes/BasicClass") {
///     Ok(class_file) => {
///         println!("version {},{}", class_file.major_version, class_file.minor_version);
///     }
///     Err(ex) => panic!("Failed to parse: {}", ex),
/// };
/// ```
pub fn parse_class(class_name: &str) -> ClassFileResult<ClassFile> {
    let class_file_name = format!("{}.class", class_name);
    let file = File::open(Path::new(&class_file_name))?;
    let mut reader = BufReader::new(file);
    parse_class_from_reader(&mut reader)
}

/// Attempt to parse a class file given a reader that implements the std::io::Read trait.
///
/// ```rust
/// let mut reader = "this_will_be_parsed_as_classfile".as_bytes();
/// let result = classfile_decompiler::parse_class_from_reader(&mut reader);
/// assert!(result.is_err());
/// ```
pub fn parse_class_from_reader<T: Read>(reader: &mut T) -> ClassFileResult<ClassFile> {
    let mut class_bytes = Vec::new();
    reader.read_to_end(&mut class_bytes)?;
    parse_class_bytes(&class_bytes)
}

/// Parse a class file held in memory and interpret its attributes.
pub fn parse_class_bytes(bytes: &[u8]) -> ClassFileResult<ClassFile> {
    let mut cursor = Cursor::new(bytes);
    let mut class = ClassFile::read(&mut cursor)?;
    let consumed = cursor.position() as usize;
    if consumed < bytes.len() {
        log::warn!(
            "not all bytes were consumed when parsing classfile, {} bytes remaining",
            bytes.len() - consumed
        );
    }
    class.interpret();
    Ok(class)
}
