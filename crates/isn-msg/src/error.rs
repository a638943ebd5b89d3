use isn_layer::{LayerError, TableError};

/// Errors in a message descriptor string or in values coded with one.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DescriptorError {
    #[error("unterminated brace at offset {position}")]
    Unterminated { position: usize },

    #[error("unknown directive at offset {position}")]
    InvalidDirective { position: usize },

    #[error("invalid field format {format:?} at offset {position}")]
    InvalidFormat { position: usize, format: String },

    #[error("arguments are {found} bytes, descriptor needs {expected}")]
    SizeMismatch { expected: usize, found: usize },

    #[error("{found} values given for {expected} fields")]
    ValueCount { expected: usize, found: usize },

    #[error("value for field {field:?} has the wrong type")]
    ValueType { field: String },

    #[error("value for field {field:?} does not fit its width")]
    ValueRange { field: String },
}

/// Errors building or driving a message catalog.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("message table: {0}")]
    Table(#[from] TableError),

    #[error("message {index}: {source}")]
    Descriptor {
        index: usize,
        #[source]
        source: DescriptorError,
    },

    #[error("{count} messages exceed the limit of {max}")]
    TooManyMessages { count: usize, max: usize },

    #[error("the last message must be the terminator")]
    MissingTerminator,

    #[error("terminator at message {index} is not last")]
    MisplacedTerminator { index: usize },

    #[error("title at message {index}; only message 0 may carry one")]
    MisplacedTitle { index: usize },

    #[error("priority {priority} out of range")]
    InvalidPriority { priority: u8 },

    #[error("message {index} arguments are {size} bytes, limit is {max}")]
    ArgsTooLarge { index: usize, size: usize, max: usize },

    #[error("message {index} declares {declared} bytes but its fields take {fields}")]
    SizeMismatch {
        index: usize,
        declared: usize,
        fields: usize,
    },

    #[error("no message number {0}")]
    UnknownMessage(u8),

    #[error(transparent)]
    Layer(#[from] LayerError),
}

pub type Result<T> = std::result::Result<T, MessageError>;
