//! Constant pool model.
//!
//! Entries are a closed enum keyed by the JVMS tag values. Pool indices are
//! 1-based; slot 0 and the slot following a `Long`/`Double` hold
//! [`ConstantPoolEntry::Unusable`] and are rejected by every lookup.

use std::fmt::Write as _;

use crate::error::ClassFileError;
use crate::reader::Reader;

type Result<T> = std::result::Result<T, ClassFileError>;

pub const TAG_UTF8: u8 = 1;
pub const TAG_INTEGER: u8 = 3;
pub const TAG_FLOAT: u8 = 4;
pub const TAG_LONG: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_CLASS: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_FIELD_REF: u8 = 9;
pub const TAG_METHOD_REF: u8 = 10;
pub const TAG_INTERFACE_METHOD_REF: u8 = 11;
pub const TAG_NAME_AND_TYPE: u8 = 12;
pub const TAG_METHOD_HANDLE: u8 = 15;
pub const TAG_METHOD_TYPE: u8 = 16;
pub const TAG_DYNAMIC: u8 = 17;
pub const TAG_INVOKE_DYNAMIC: u8 = 18;
pub const TAG_MODULE: u8 = 19;
pub const TAG_PACKAGE: u8 = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum ConstantPoolEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    Unusable,
}

impl ConstantPoolEntry {
    pub fn tag(&self) -> Option<u8> {
        Some(match self {
            ConstantPoolEntry::Utf8(_) => TAG_UTF8,
            ConstantPoolEntry::Integer(_) => TAG_INTEGER,
            ConstantPoolEntry::Float(_) => TAG_FLOAT,
            ConstantPoolEntry::Long(_) => TAG_LONG,
            ConstantPoolEntry::Double(_) => TAG_DOUBLE,
            ConstantPoolEntry::Class { .. } => TAG_CLASS,
            ConstantPoolEntry::String { .. } => TAG_STRING,
            ConstantPoolEntry::FieldRef { .. } => TAG_FIELD_REF,
            ConstantPoolEntry::MethodRef { .. } => TAG_METHOD_REF,
            ConstantPoolEntry::InterfaceMethodRef { .. } => TAG_INTERFACE_METHOD_REF,
            ConstantPoolEntry::NameAndType { .. } => TAG_NAME_AND_TYPE,
            ConstantPoolEntry::MethodHandle { .. } => TAG_METHOD_HANDLE,
            ConstantPoolEntry::MethodType { .. } => TAG_METHOD_TYPE,
            ConstantPoolEntry::Dynamic { .. } => TAG_DYNAMIC,
            ConstantPoolEntry::InvokeDynamic { .. } => TAG_INVOKE_DYNAMIC,
            ConstantPoolEntry::Module { .. } => TAG_MODULE,
            ConstantPoolEntry::Package { .. } => TAG_PACKAGE,
            ConstantPoolEntry::Unusable => return None,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ConstantPoolEntry::Utf8(_) => "Utf8",
            ConstantPoolEntry::Integer(_) => "Integer",
            ConstantPoolEntry::Float(_) => "Float",
            ConstantPoolEntry::Long(_) => "Long",
            ConstantPoolEntry::Double(_) => "Double",
            ConstantPoolEntry::Class { .. } => "Class",
            ConstantPoolEntry::String { .. } => "String",
            ConstantPoolEntry::FieldRef { .. } => "Fieldref",
            ConstantPoolEntry::MethodRef { .. } => "Methodref",
            ConstantPoolEntry::InterfaceMethodRef { .. } => "InterfaceMethodref",
            ConstantPoolEntry::NameAndType { .. } => "NameAndType",
            ConstantPoolEntry::MethodHandle { .. } => "MethodHandle",
            ConstantPoolEntry::MethodType { .. } => "MethodType",
            ConstantPoolEntry::Dynamic { .. } => "Dynamic",
            ConstantPoolEntry::InvokeDynamic { .. } => "InvokeDynamic",
            ConstantPoolEntry::Module { .. } => "Module",
            ConstantPoolEntry::Package { .. } => "Package",
            ConstantPoolEntry::Unusable => "Unusable",
        }
    }

    /// Debug rendering with nested references resolved against `pool`.
    pub fn dump(&self, pool: &ConstantPool) -> String {
        let utf8 = |index: u16| -> String {
            pool.utf8(index)
                .map(str::to_string)
                .unwrap_or_else(|_| format!("<invalid #{index}>"))
        };
        let class = |index: u16| -> String {
            pool.class_name(index)
                .map(str::to_string)
                .unwrap_or_else(|_| format!("<invalid #{index}>"))
        };
        let nat = |index: u16| -> String {
            pool.name_and_type(index)
                .map(|(name, desc)| format!("{name}:{desc}"))
                .unwrap_or_else(|_| format!("<invalid #{index}>"))
        };

        match self {
            ConstantPoolEntry::Utf8(text) => format!("utf8: {text}"),
            ConstantPoolEntry::Integer(v) => format!("int: {v}"),
            ConstantPoolEntry::Float(v) => format!("float: {v}"),
            ConstantPoolEntry::Long(v) => format!("long: {v}"),
            ConstantPoolEntry::Double(v) => format!("double: {v}"),
            ConstantPoolEntry::Class { name_index } => format!("class: {}", utf8(*name_index)),
            ConstantPoolEntry::String { string_index } => {
                format!("string: {:?}", utf8(*string_index))
            }
            ConstantPoolEntry::FieldRef {
                class_index,
                name_and_type_index,
            } => format!(
                "field: {}.{}",
                class(*class_index),
                nat(*name_and_type_index)
            ),
            ConstantPoolEntry::MethodRef {
                class_index,
                name_and_type_index,
            } => format!(
                "method: {}.{}",
                class(*class_index),
                nat(*name_and_type_index)
            ),
            ConstantPoolEntry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => format!(
                "interface method: {}.{}",
                class(*class_index),
                nat(*name_and_type_index)
            ),
            ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => format!(
                "name and type: {}:{}",
                utf8(*name_index),
                utf8(*descriptor_index)
            ),
            ConstantPoolEntry::MethodHandle {
                reference_kind,
                reference_index,
            } => {
                let target = pool
                    .get(*reference_index)
                    .map(|e| e.dump(pool))
                    .unwrap_or_else(|_| format!("<invalid #{reference_index}>"));
                format!("method handle: kind {reference_kind} -> {target}")
            }
            ConstantPoolEntry::MethodType { descriptor_index } => {
                format!("method type: {}", utf8(*descriptor_index))
            }
            ConstantPoolEntry::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => format!(
                "dynamic: bootstrap #{bootstrap_method_attr_index} {}",
                nat(*name_and_type_index)
            ),
            ConstantPoolEntry::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => format!(
                "invokedynamic: bootstrap #{bootstrap_method_attr_index} {}",
                nat(*name_and_type_index)
            ),
            ConstantPoolEntry::Module { name_index } => format!("module: {}", utf8(*name_index)),
            ConstantPoolEntry::Package { name_index } => format!("package: {}", utf8(*name_index)),
            ConstantPoolEntry::Unusable => "unusable".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<ConstantPoolEntry>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.read_u2()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(ConstantPoolEntry::Unusable);

        let mut index: u16 = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                TAG_UTF8 => {
                    let len = reader.read_u2()? as usize;
                    let bytes = reader.read_bytes(len)?;
                    let text = decode_modified_utf8(bytes)
                        .ok_or(ClassFileError::InvalidModifiedUtf8(index))?;
                    ConstantPoolEntry::Utf8(text)
                }
                TAG_INTEGER => ConstantPoolEntry::Integer(reader.read_u4()? as i32),
                TAG_FLOAT => ConstantPoolEntry::Float(f32::from_bits(reader.read_u4()?)),
                TAG_LONG => ConstantPoolEntry::Long(reader.read_u8()? as i64),
                TAG_DOUBLE => ConstantPoolEntry::Double(f64::from_bits(reader.read_u8()?)),
                TAG_CLASS => ConstantPoolEntry::Class {
                    name_index: reader.read_u2()?,
                },
                TAG_STRING => ConstantPoolEntry::String {
                    string_index: reader.read_u2()?,
                },
                TAG_FIELD_REF => ConstantPoolEntry::FieldRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                TAG_METHOD_REF => ConstantPoolEntry::MethodRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                TAG_INTERFACE_METHOD_REF => ConstantPoolEntry::InterfaceMethodRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                TAG_NAME_AND_TYPE => ConstantPoolEntry::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                TAG_METHOD_HANDLE => ConstantPoolEntry::MethodHandle {
                    reference_kind: reader.read_u1()?,
                    reference_index: reader.read_u2()?,
                },
                TAG_METHOD_TYPE => ConstantPoolEntry::MethodType {
                    descriptor_index: reader.read_u2()?,
                },
                TAG_DYNAMIC => ConstantPoolEntry::Dynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                TAG_INVOKE_DYNAMIC => ConstantPoolEntry::InvokeDynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                TAG_MODULE => ConstantPoolEntry::Module {
                    name_index: reader.read_u2()?,
                },
                TAG_PACKAGE => ConstantPoolEntry::Package {
                    name_index: reader.read_u2()?,
                },
                other => return Err(ClassFileError::InvalidConstantPoolTag { tag: other, index }),
            };

            let wide = matches!(
                entry,
                ConstantPoolEntry::Long(_) | ConstantPoolEntry::Double(_)
            );
            entries.push(entry);
            index += 1;
            if wide {
                // long and double take two slots; the second one is never addressable
                if index >= count {
                    return Err(ClassFileError::InvalidConstantPoolIndex(index));
                }
                entries.push(ConstantPoolEntry::Unusable);
                index += 1;
            }
        }

        let pool = Self { entries };
        pool.validate()?;
        Ok(pool)
    }

    /// Number of slots including the unused slot 0, i.e. `constant_pool_count`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> Result<&ConstantPoolEntry> {
        match self.entries.get(index as usize) {
            Some(ConstantPoolEntry::Unusable) | None => {
                Err(ClassFileError::InvalidConstantPoolIndex(index))
            }
            Some(entry) => Ok(entry),
        }
    }

    /// Addressable entries with their pool index.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantPoolEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !matches!(e, ConstantPoolEntry::Unusable))
            .map(|(i, e)| (i as u16, e))
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            ConstantPoolEntry::Utf8(text) => Ok(text),
            other => Err(mismatch(index, "Utf8", other)),
        }
    }

    /// Internal (slash separated) name of a `Class` entry.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            ConstantPoolEntry::Class { name_index } => self.utf8(*name_index),
            other => Err(mismatch(index, "Class", other)),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => Err(mismatch(index, "NameAndType", other)),
        }
    }

    /// Checks that every reference between entries points at an entry of the
    /// expected variant.
    fn validate(&self) -> Result<()> {
        for (_, entry) in self.iter() {
            match entry {
                ConstantPoolEntry::Class { name_index }
                | ConstantPoolEntry::Module { name_index }
                | ConstantPoolEntry::Package { name_index } => {
                    self.utf8(*name_index)?;
                }
                ConstantPoolEntry::String { string_index } => {
                    self.utf8(*string_index)?;
                }
                ConstantPoolEntry::MethodType { descriptor_index } => {
                    self.utf8(*descriptor_index)?;
                }
                ConstantPoolEntry::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    self.utf8(*name_index)?;
                    self.utf8(*descriptor_index)?;
                }
                ConstantPoolEntry::FieldRef {
                    class_index,
                    name_and_type_index,
                }
                | ConstantPoolEntry::MethodRef {
                    class_index,
                    name_and_type_index,
                }
                | ConstantPoolEntry::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    self.class_name(*class_index)?;
                    self.name_and_type(*name_and_type_index)?;
                }
                ConstantPoolEntry::Dynamic {
                    name_and_type_index,
                    ..
                }
                | ConstantPoolEntry::InvokeDynamic {
                    name_and_type_index,
                    ..
                } => {
                    self.name_and_type(*name_and_type_index)?;
                }
                ConstantPoolEntry::MethodHandle {
                    reference_index, ..
                } => match self.get(*reference_index)? {
                    ConstantPoolEntry::FieldRef { .. }
                    | ConstantPoolEntry::MethodRef { .. }
                    | ConstantPoolEntry::InterfaceMethodRef { .. } => {}
                    other => return Err(mismatch(*reference_index, "member reference", other)),
                },
                ConstantPoolEntry::Utf8(_)
                | ConstantPoolEntry::Integer(_)
                | ConstantPoolEntry::Float(_)
                | ConstantPoolEntry::Long(_)
                | ConstantPoolEntry::Double(_)
                | ConstantPoolEntry::Unusable => {}
            }
        }
        Ok(())
    }

    /// One line per addressable entry: `#index = rendering`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (index, entry) in self.iter() {
            let _ = writeln!(out, "{index:>5}: {}", entry.dump(self));
        }
        out
    }
}

fn mismatch(index: u16, expected: &'static str, found: &ConstantPoolEntry) -> ClassFileError {
    ClassFileError::ConstantPoolTypeMismatch {
        index,
        expected,
        found: found.kind(),
    }
}

/// Decodes the JVM's modified UTF-8 (`C0 80` for NUL, supplementary
/// characters as surrogate pairs). Unpaired surrogates are replaced.
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(bytes)
        && !bytes.contains(&0)
    {
        return Some(text.to_string());
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        let a = bytes[i] as u16;
        if a & 0x80 == 0 {
            if a == 0 {
                return None;
            }
            units.push(a);
            i += 1;
        } else if a & 0xE0 == 0xC0 {
            let b = continuation(bytes, i + 1)?;
            units.push(((a & 0x1F) << 6) | b);
            i += 2;
        } else if a & 0xF0 == 0xE0 {
            let b = continuation(bytes, i + 1)?;
            let c = continuation(bytes, i + 2)?;
            units.push(((a & 0x0F) << 12) | (b << 6) | c);
            i += 3;
        } else {
            return None;
        }
    }

    Some(
        char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect(),
    )
}

fn continuation(bytes: &[u8], i: usize) -> Option<u16> {
    let b = *bytes.get(i)?;
    (b & 0xC0 == 0x80).then_some((b & 0x3F) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_bytes(count: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = count.to_be_bytes().to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    fn utf8(text: &str) -> Vec<u8> {
        let mut out = vec![TAG_UTF8];
        out.extend_from_slice(&(text.len() as u16).to_be_bytes());
        out.extend_from_slice(text.as_bytes());
        out
    }

    #[test]
    fn long_and_double_take_two_slots() {
        let mut body = vec![TAG_LONG, 0, 0, 0, 0, 0, 0, 0, 42];
        body.extend(utf8("after"));
        body.extend([TAG_DOUBLE]);
        body.extend(1.5f64.to_bits().to_be_bytes());
        let bytes = pool_bytes(6, &body);

        let pool = ConstantPool::parse(&mut Reader::new(&bytes)).unwrap();
        assert_eq!(pool.len(), 6);
        assert_eq!(pool.get(1).unwrap(), &ConstantPoolEntry::Long(42));
        assert_eq!(
            pool.get(2).unwrap_err(),
            ClassFileError::InvalidConstantPoolIndex(2)
        );
        assert_eq!(pool.utf8(3).unwrap(), "after");
        assert_eq!(pool.get(4).unwrap(), &ConstantPoolEntry::Double(1.5));
        assert!(pool.get(0).is_err());
        assert!(pool.get(6).is_err());
        assert_eq!(pool.get(1).unwrap().dump(&pool), "long: 42");
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let bytes = pool_bytes(2, &[2, 0, 0]);
        assert_eq!(
            ConstantPool::parse(&mut Reader::new(&bytes)).unwrap_err(),
            ClassFileError::InvalidConstantPoolTag { tag: 2, index: 1 }
        );
    }

    #[test]
    fn class_entry_must_point_at_utf8() {
        // #1 = Class #2, #2 = Integer
        let bytes = pool_bytes(3, &[TAG_CLASS, 0, 2, TAG_INTEGER, 0, 0, 0, 1]);
        assert_eq!(
            ConstantPool::parse(&mut Reader::new(&bytes)).unwrap_err(),
            ClassFileError::ConstantPoolTypeMismatch {
                index: 2,
                expected: "Utf8",
                found: "Integer"
            }
        );
    }

    #[test]
    fn out_of_range_reference_is_rejected() {
        let bytes = pool_bytes(2, &[TAG_CLASS, 0, 9]);
        assert_eq!(
            ConstantPool::parse(&mut Reader::new(&bytes)).unwrap_err(),
            ClassFileError::InvalidConstantPoolIndex(9)
        );
    }

    #[test]
    fn truncated_pool_is_rejected() {
        let bytes = pool_bytes(3, &utf8("only-one"));
        assert!(matches!(
            ConstantPool::parse(&mut Reader::new(&bytes)).unwrap_err(),
            ClassFileError::UnexpectedEof { .. }
        ));
    }

    #[test]
    fn dump_resolves_member_references() {
        let mut body = utf8("com/a/Foo");
        body.extend([TAG_CLASS, 0, 1]);
        body.extend(utf8("run"));
        body.extend(utf8("()V"));
        body.extend([TAG_NAME_AND_TYPE, 0, 3, 0, 4]);
        body.extend([TAG_METHOD_REF, 0, 2, 0, 5]);
        let bytes = pool_bytes(7, &body);

        let pool = ConstantPool::parse(&mut Reader::new(&bytes)).unwrap();
        assert_eq!(pool.class_name(2).unwrap(), "com/a/Foo");
        assert_eq!(
            pool.get(6).unwrap().dump(&pool),
            "method: com/a/Foo.run:()V"
        );
        assert!(pool.dump().contains("    2: class: com/a/Foo"));
    }

    #[test]
    fn modified_utf8_decodes_nul_and_surrogate_pairs() {
        assert_eq!(decode_modified_utf8(&[0x61, 0xC0, 0x80]).as_deref(), Some("a\0"));
        // U+1F600 as a surrogate pair, each half three bytes
        let smiley = [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert_eq!(decode_modified_utf8(&smiley).as_deref(), Some("\u{1F600}"));
        assert_eq!(decode_modified_utf8(&[0x61, 0x00]), None);
        assert_eq!(decode_modified_utf8(&[0xC3]), None);
    }
}
