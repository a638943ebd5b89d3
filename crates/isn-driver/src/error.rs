use isn_layer::LayerError;

/// Errors raised while setting up a driver.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Failed to bind a socket to the requested address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to resolve a peer address.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// The peer name resolved to no usable address.
    #[error("no address found for {host}:{port}")]
    NoAddress { host: String, port: u16 },

    /// The client table is full.
    #[error("too many clients (max {max})")]
    TooManyClients { max: usize },

    /// Driver parameters are out of range.
    #[error("invalid driver configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Failed to open a serial port.
    #[cfg(feature = "serial")]
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: serialport::Error,
    },

    /// Linking the driver into a stack failed.
    #[error(transparent)]
    Layer(#[from] LayerError),

    /// An I/O error occurred on the underlying device.
    #[error("driver I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DriverError>;
