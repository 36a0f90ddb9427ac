use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::report::ViolationReport;
use crate::root::ClassLocation;

pub type Result<T> = std::result::Result<T, Error>;

/// Structural decode failure of a single class file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFileError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("invalid classfile magic: 0x{0:08x}")]
    InvalidMagic(u32),
    #[error("invalid constant pool index: {0}")]
    InvalidConstantPoolIndex(u16),
    #[error("invalid constant pool tag {tag} at index {index}")]
    InvalidConstantPoolTag { tag: u8, index: u16 },
    #[error("constant pool type mismatch at index {index}: expected {expected}, found {found}")]
    ConstantPoolTypeMismatch {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid modified UTF-8 constant at index {0}")]
    InvalidModifiedUtf8(u16),
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("malformed {0} attribute")]
    MalformedAttribute(&'static str),
    #[error("{0} has no super class")]
    MissingSuperClass(String),
    #[error("{0} trailing bytes after class file")]
    TrailingBytes(usize),
}

/// Why a class location could not be turned into a record.
#[derive(Debug, Clone, Error)]
pub enum DecodeFailure {
    #[error(transparent)]
    Malformed(#[from] ClassFileError),
    #[error("cannot read class bytes: {0}")]
    Io(Arc<std::io::Error>),
}

/// A decode failure with the location it happened at. Cloneable so it can be
/// memoized inside a class handle.
#[derive(Debug, Clone, Error)]
#[error("cannot decode {location}: {failure}")]
pub struct DecodeError {
    pub location: ClassLocation,
    #[source]
    pub failure: DecodeFailure,
}

impl DecodeError {
    pub fn is_malformed(&self) -> bool {
        matches!(self.failure, DecodeFailure::Malformed(_))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed class file: {0}")]
    MalformedClassFile(#[from] ClassFileError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("cannot read {name} in {}: {source}", .root.display())]
    ClassIo {
        root: PathBuf,
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot open class root {}: {source}", .root.display())]
    RootIo {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} has not been registered with this context", .0.display())]
    UnresolvedRoot(PathBuf),
    #[error("duplicate class {name} in {first} and {second}")]
    DuplicateClass {
        name: String,
        first: ClassLocation,
        second: ClassLocation,
    },
    #[error("{0}")]
    AssertionViolation(Box<ViolationReport>),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("slice {0} cannot be materialized without a class source")]
    NotIterable(String),
    #[error("invalid name pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },
    #[error("unknown hash algorithm: {0}")]
    UnknownHashAlgorithm(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
