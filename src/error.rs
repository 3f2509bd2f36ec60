use thiserror::Error;

/// The closed error taxonomy for dictionary loading and BEJ decoding.
///
/// `UnsupportedFormat` and `DictionaryOutOfRange` are non-fatal by design:
/// callers log them and keep going (a missing name becomes a `seq_<N>`
/// placeholder, an unsupported format becomes `null`). Every other variant
/// aborts the decode at the point it is raised.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("malformed NNINT length byte {length_byte} (must be 1..=4)")]
    MalformedNnint { length_byte: u8 },

    #[error("allocation failure requesting {requested} bytes")]
    AllocationFailure { requested: usize },

    #[error("unknown BEJ format nibble 0x{nibble:x}")]
    UnknownFormat { nibble: u8 },

    #[error("format {0:?} is recognized but not decoded")]
    UnsupportedFormat(crate::primitive::Format),

    #[error("dictionary entry name out of range: offset {offset} length {length} size {size}")]
    DictionaryOutOfRange {
        offset: usize,
        length: usize,
        size: usize,
    },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
