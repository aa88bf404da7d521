use thiserror::Error;

/// The asset is malformed or uses something this loader does not decode.
/// Always fatal to the load it occurs in.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("invalid glTF json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown accessor component type {0}")]
    UnknownComponentType(u32),

    #[error("{kind} index {index} out of range (len {len})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    #[error("accessor reads bytes {start}..{end} but its source only has {len}")]
    AccessorOutOfBounds { start: usize, end: usize, len: usize },

    #[error("byte stride {stride} is smaller than the element size {element_size}")]
    StrideTooSmall { stride: usize, element_size: usize },

    #[error("not a GLB container (magic {0:#010x})")]
    BadMagic(u32),

    #[error("unsupported GLB version {0}")]
    UnsupportedVersion(u32),

    #[error("GLB chunk {index} has type {found:#010x}, expected {expected:#010x}")]
    ChunkTypeMismatch {
        index: usize,
        expected: u32,
        found: u32,
    },

    #[error("truncated GLB: {0}")]
    TruncatedGlb(&'static str),

    #[error("primitive is missing the required {0} attribute")]
    MissingAttribute(&'static str),

    #[error("{attribute} accessor has {found} components per element, expected {expected}")]
    UnexpectedArity {
        attribute: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{attribute} has {found} elements but POSITION has {expected}")]
    AttributeCountMismatch {
        attribute: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("index accessors must be unsigned integers")]
    InvalidIndexType,

    #[error("vertex index {index} out of range ({vertex_count} vertices)")]
    VertexIndexOutOfRange { index: u32, vertex_count: usize },

    #[error("animation sampler {sampler}: {reason}")]
    InvalidKeyframes { sampler: usize, reason: String },

    #[error("unknown sampler {field} code {code}")]
    UnknownSamplerCode { field: &'static str, code: u32 },

    #[error("node {0} appears more than once in the scene hierarchy")]
    NodeReused(usize),

    #[error("invalid data uri: {0}")]
    InvalidDataUri(String),

    #[error("image {0} has neither a uri nor a bufferView")]
    ImageWithoutSource(usize),

    #[error("buffer {0} has no uri and there is no GLB binary chunk for it")]
    MissingBufferSource(usize),

    #[error("buffer {index} holds {found} bytes, {expected} declared")]
    BufferTooShort {
        index: usize,
        expected: usize,
        found: usize,
    },
}

/// Bytes could not be obtained or decoded. Fatal to the load, never to a scene
/// that is already installed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("failed to read {uri}: {source}")]
    Io {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image {index}: {source}")]
    ImageDecode {
        index: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("image {index} has unsupported mime type {mime_type:?}")]
    UnsupportedImage { index: usize, mime_type: String },
}

/// The device sink refused to create an object.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to create buffer {label:?}: {reason}")]
    BufferCreationFailed { label: String, reason: String },

    #[error("failed to create texture {label:?}: {reason}")]
    TextureCreationFailed { label: String, reason: String },

    #[error("failed to create pipeline: {0}")]
    PipelineCreationFailed(String),

    #[error("out of device memory")]
    OutOfMemory,

    #[error("write of {len} bytes at offset {offset} overflows a {size} byte buffer")]
    WriteOutOfBounds { offset: usize, len: usize, size: usize },

    #[error("stale {0} handle")]
    StaleHandle(&'static str),
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

pub type FormatResult<T> = Result<T, FormatError>;
