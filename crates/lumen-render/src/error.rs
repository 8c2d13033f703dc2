//! Error types for batch configuration and GPU context creation.

use std::fmt;

/// Configuration errors raised while constructing a batcher.
///
/// These are static authoring mistakes. They surface from constructors and
/// never from the per-frame `render`/`flush` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// A built-in attribute definition named an identifier the batcher does not know.
    UnknownBuiltinAttribute {
        /// The unrecognized identifier.
        identifier: String,
    },

    /// A custom attribute's byte size is not a multiple of 4.
    AttributeSizeMisaligned {
        /// The attribute identifier.
        identifier: String,
        /// Byte size of the declared format.
        size: u32,
    },

    /// The CPU-side source size of a custom attribute disagrees with its GPU format.
    AttributeSizeMismatch {
        /// The attribute identifier.
        identifier: String,
        /// Bytes per vertex supplied by the element.
        source_size: u32,
        /// Bytes per vertex declared by the GPU format.
        gpu_size: u32,
    },

    /// The attribute definition list was empty.
    EmptyVertexLayout,

    /// The configured batch size is zero or its vertex capacity overflows `u32`.
    InvalidBatchSize {
        /// The rejected size, in quads.
        size: u32,
    },

    /// The configured texture-unit cap was zero.
    InvalidMaxTextures {
        /// The rejected cap.
        max_textures: u32,
    },
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::UnknownBuiltinAttribute { identifier } => {
                write!(f, "Unknown built-in vertex attribute: {}", identifier)
            }
            BatchError::AttributeSizeMisaligned { identifier, size } => {
                write!(
                    f,
                    "Vertex attribute '{}' is {} bytes, which is not a multiple of 4",
                    identifier, size
                )
            }
            BatchError::AttributeSizeMismatch {
                identifier,
                source_size,
                gpu_size,
            } => {
                write!(
                    f,
                    "Vertex attribute '{}' supplies {} bytes per vertex but its GPU format is {} bytes",
                    identifier, source_size, gpu_size
                )
            }
            BatchError::EmptyVertexLayout => {
                write!(f, "Vertex layout has no attributes")
            }
            BatchError::InvalidBatchSize { size } => {
                write!(f, "Invalid batch size: {} quads", size)
            }
            BatchError::InvalidMaxTextures { max_textures } => {
                write!(f, "Invalid texture unit cap: {}", max_textures)
            }
        }
    }
}

impl std::error::Error for BatchError {}

/// Result type alias for batch configuration.
pub type BatchResult<T> = Result<T, BatchError>;

/// Errors raised while creating a wgpu graphics context.
#[derive(Debug)]
pub enum GraphicsError {
    /// No adapter matched the requested options.
    NoAdapter,

    /// The adapter refused to create a device.
    DeviceRequest {
        /// Message reported by wgpu.
        message: String,
    },
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::NoAdapter => write!(f, "No suitable GPU adapter found"),
            GraphicsError::DeviceRequest { message } => {
                write!(f, "Failed to create device: {}", message)
            }
        }
    }
}

impl std::error::Error for GraphicsError {}
