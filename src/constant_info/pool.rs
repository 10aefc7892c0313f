use binrw::io::{Read, Seek};
use binrw::{BinRead, BinResult, Endian};

use crate::error::{ClassFileError, ClassFileResult};

use super::types::*;

/// The constant pool, addressed with the 1-based indices used in the class file.
///
/// Slot 0 is reserved and the slot following every Long/Double entry is
/// unusable; both are stored as `None` so indices never need adjusting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Option<ConstantInfo>>,
}

/// What kind of member a FieldRef/MethodRef/InterfaceMethodRef names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

/// A resolved member reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub kind: MemberKind,
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// Reads `count - 1` logical entries, inserting the phantom slot after wide constants.
pub(crate) fn parse_pool<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    (count,): (u16,),
) -> BinResult<ConstantPool> {
    let count = count as usize;
    let mut entries = Vec::with_capacity(count.max(1));
    entries.push(None);
    while entries.len() < count {
        let entry = ConstantInfo::read_options(reader, endian, ())?;
        let wide = entry.is_wide();
        entries.push(Some(entry));
        if wide {
            entries.push(None);
        }
    }
    Ok(ConstantPool { entries })
}

impl ConstantPool {
    /// Build a pool from logical entries; the reserved slot 0 and the phantom
    /// slots after wide entries are inserted automatically.
    pub fn from_entries(entries: impl IntoIterator<Item = ConstantInfo>) -> Self {
        let mut slots = vec![None];
        for entry in entries {
            let wide = entry.is_wide();
            slots.push(Some(entry));
            if wide {
                slots.push(None);
            }
        }
        Self { entries: slots }
    }

    /// Number of slots, including the reserved slot 0. Matches `constant_pool_count`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Iterate `(index, entry)` over the usable slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantInfo)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i as u16, e)))
    }

    pub fn get(&self, index: u16) -> ClassFileResult<&ConstantInfo> {
        match self.entries.get(index as usize) {
            None => Err(ClassFileError::PoolIndexOutOfRange {
                index,
                size: self.entries.len(),
            }),
            Some(None) => Err(ClassFileError::kind_mismatch(index, "usable entry", "unusable slot")),
            Some(Some(entry)) => Ok(entry),
        }
    }

    pub fn utf8(&self, index: u16) -> ClassFileResult<&str> {
        match self.get(index)? {
            ConstantInfo::Utf8(u) => Ok(&u.value),
            other => Err(ClassFileError::kind_mismatch(index, "Utf8", other.kind_name())),
        }
    }

    pub fn class_name(&self, index: u16) -> ClassFileResult<&str> {
        match self.get(index)? {
            ConstantInfo::Class(c) => self.utf8(c.name_index),
            other => Err(ClassFileError::kind_mismatch(index, "Class", other.kind_name())),
        }
    }

    pub fn name_and_type(&self, index: u16) -> ClassFileResult<(&str, &str)> {
        match self.get(index)? {
            ConstantInfo::NameAndType(nat) => {
                Ok((self.utf8(nat.name_index)?, self.utf8(nat.descriptor_index)?))
            }
            other => Err(ClassFileError::kind_mismatch(index, "NameAndType", other.kind_name())),
        }
    }

    pub fn member_ref(&self, index: u16) -> ClassFileResult<MemberRef<'_>> {
        let (kind, class_index, nat_index) = match self.get(index)? {
            ConstantInfo::FieldRef(r) => (MemberKind::Field, r.class_index, r.name_and_type_index),
            ConstantInfo::MethodRef(r) => (MemberKind::Method, r.class_index, r.name_and_type_index),
            ConstantInfo::InterfaceMethodRef(r) => {
                (MemberKind::InterfaceMethod, r.class_index, r.name_and_type_index)
            }
            other => {
                return Err(ClassFileError::kind_mismatch(index, "member reference", other.kind_name()))
            }
        };
        let class_name = self.class_name(class_index)?;
        let (name, descriptor) = self.name_and_type(nat_index)?;
        Ok(MemberRef {
            kind,
            class_name,
            name,
            descriptor,
        })
    }

    /// Resolve an InvokeDynamic entry to `(bootstrap index, name, descriptor)`.
    pub fn invoke_dynamic(&self, index: u16) -> ClassFileResult<(u16, &str, &str)> {
        match self.get(index)? {
            ConstantInfo::InvokeDynamic(indy) => {
                let (name, desc) = self.name_and_type(indy.name_and_type_index)?;
                Ok((indy.bootstrap_method_attr_index, name, desc))
            }
            other => Err(ClassFileError::kind_mismatch(index, "InvokeDynamic", other.kind_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pool() -> ConstantPool {
        ConstantPool::from_entries([
            ConstantInfo::Utf8(Utf8Constant::new("java/lang/Object")),
            ConstantInfo::Class(ClassConstant { name_index: 1 }),
            ConstantInfo::Long(LongConstant { value: 7 }),
            ConstantInfo::Utf8(Utf8Constant::new("after")),
        ])
    }

    #[test]
    fn test_wide_entries_take_two_slots() {
        let pool = sample_pool();
        assert_eq!(pool.len(), 6);
        assert!(matches!(pool.get(3), Ok(ConstantInfo::Long(_))));
        assert!(matches!(pool.get(4), Err(ClassFileError::PoolKindMismatch { index: 4, .. })));
        assert_eq!(pool.utf8(5).unwrap(), "after");
    }

    #[test]
    fn test_slot_zero_is_reserved() {
        let pool = sample_pool();
        assert!(pool.get(0).is_err());
        assert!(matches!(pool.get(9), Err(ClassFileError::PoolIndexOutOfRange { index: 9, .. })));
    }

    #[test]
    fn test_kind_mismatch_is_reported() {
        let pool = sample_pool();
        assert_eq!(pool.class_name(2).unwrap(), "java/lang/Object");
        match pool.class_name(1) {
            Err(ClassFileError::PoolKindMismatch { expected, found, .. }) => {
                assert_eq!(expected, "Class");
                assert_eq!(found, "Utf8");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_modified_utf8_nul_and_supplementary() {
        assert_eq!(decode_modified_utf8(&[0x41, 0xC0, 0x80, 0x42]), "A\u{0}B");
        let encoded = encode_modified_utf8("x\u{1F600}");
        assert_eq!(encoded.len(), 7);
        assert_eq!(decode_modified_utf8(&encoded), "x\u{1F600}");
    }
}
