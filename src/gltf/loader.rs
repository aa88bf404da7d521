use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;

use base64::Engine as _;
use futures::future::try_join_all;
use log::{debug, info};

use crate::config::LoaderConfig;
use crate::error::{FetchError, FormatError, LoadError};

use super::accessor;
use super::asset::Asset;
use super::glb::{self, Glb};
use super::material::Bitmap;
use super::schema::{self, Document};

/// Source of asset bytes. `uri` is already resolved against the document's
/// directory.
pub trait Fetch {
    fn fetch(&self, uri: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>>;
}

/// Reads files below a root directory.
#[derive(Debug, Clone)]
pub struct FsFetcher {
    pub root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Fetch for FsFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.root.join(uri);
        std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(uri.to_string()),
            _ => FetchError::Io { uri: uri.to_string(), source },
        })
    }
}

/// Serves bytes from a map, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    pub files: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uri: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(uri.into(), bytes.into());
    }

    pub fn with(mut self, uri: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(uri, bytes);
        self
    }
}

impl Fetch for MemoryFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        self.files.get(uri).cloned().ok_or_else(|| FetchError::NotFound(uri.to_string()))
    }
}

/// Payload of a `data:` URI and its media type.
#[derive(Debug, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Parses `data:[<mime>];base64,<payload>`. Only base64 payloads are accepted.
pub fn parse_data_uri(uri: &str) -> Result<DataUri, FormatError> {
    let invalid = || FormatError::InvalidDataUri(uri.chars().take(48).collect());
    let rest = uri.strip_prefix("data:").ok_or_else(invalid)?;
    let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let mime = header.strip_suffix(";base64").ok_or_else(invalid)?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload).map_err(|_| invalid())?;
    Ok(DataUri { mime_type: (!mime.is_empty()).then(|| mime.to_string()), bytes })
}

/// Directory part of `uri` including the trailing slash.
fn base_dir(uri: &str) -> &str {
    uri.rfind('/').map_or("", |i| &uri[..=i])
}

async fn fetch_buffer<F: Fetch>(
    fetcher: &F,
    base: &str,
    index: usize,
    buffer: &schema::Buffer,
    bin: Option<&[u8]>,
) -> Result<Vec<u8>, LoadError> {
    let bytes = match buffer.uri.as_deref() {
        None if index == 0 => bin.ok_or(FormatError::MissingBufferSource(index))?.to_vec(),
        None => return Err(FormatError::MissingBufferSource(index).into()),
        Some(uri) if uri.starts_with("data:") => parse_data_uri(uri)?.bytes,
        Some(uri) => fetcher.fetch(&format!("{}{}", base, uri)).await?,
    };
    if bytes.len() < buffer.byte_length {
        return Err(FormatError::BufferTooShort { index, expected: buffer.byte_length, found: bytes.len() }.into());
    }
    Ok(bytes)
}

/// Encoded image bytes, decoded once every fetch has completed.
struct EncodedImage {
    index: usize,
    mime_type: Option<String>,
    bytes: Vec<u8>,
}

async fn fetch_image<F: Fetch>(
    fetcher: &F,
    base: &str,
    index: usize,
    image: &schema::Image,
    uri: &str,
) -> Result<EncodedImage, LoadError> {
    if uri.starts_with("data:") {
        let data = parse_data_uri(uri)?;
        return Ok(EncodedImage { index, mime_type: image.mime_type.clone().or(data.mime_type), bytes: data.bytes });
    }
    let bytes = fetcher.fetch(&format!("{}{}", base, uri)).await?;
    Ok(EncodedImage { index, mime_type: image.mime_type.clone(), bytes })
}

fn buffer_view_bytes<'a>(document: &Document, buffers: &'a [Vec<u8>], view_idx: usize) -> Result<&'a [u8], FormatError> {
    let view = &document.buffer_views[view_idx];
    accessor::buffer_view_slice(&buffers[view.buffer], view)
}

/// Fetches and decodes the asset at `uri`. Buffers and external images are
/// fetched concurrently; decoding starts once all of them arrived.
pub async fn load<F: Fetch>(fetcher: &F, uri: &str, config: &LoaderConfig) -> Result<Asset, LoadError> {
    let start = Instant::now();
    info!("loading {}", uri);
    let root = fetcher.fetch(uri).await?;
    let (json, bin) = if glb::is_glb(&root) {
        let glb = Glb::parse(&root)?;
        (glb.json, glb.bin)
    } else {
        (&root[..], None)
    };
    let document = Document::from_slice(json)?;
    let base = base_dir(uri);

    let buffer_fetches = document
        .buffers
        .iter()
        .enumerate()
        .map(|(index, buffer)| fetch_buffer(fetcher, base, index, buffer, bin));
    let image_fetches = document
        .images
        .iter()
        .enumerate()
        .filter_map(|(index, image)| image.uri.as_deref().map(|u| fetch_image(fetcher, base, index, image, u)));
    let (buffers, encoded) = futures::try_join!(try_join_all(buffer_fetches), try_join_all(image_fetches))?;
    debug!("fetched {} buffers and {} external images", buffers.len(), encoded.len());

    let mut images: Vec<Option<Bitmap>> = vec![None; document.images.len()];
    for image in encoded {
        images[image.index] = Some(Bitmap::decode(&image.bytes, image.mime_type.as_deref(), image.index)?);
    }
    for (index, image) in document.images.iter().enumerate() {
        if let (None, Some(view)) = (image.uri.as_ref(), image.buffer_view) {
            let bytes = buffer_view_bytes(&document, &buffers, view)?;
            images[index] = Some(Bitmap::decode(bytes, image.mime_type.as_deref(), index)?);
        }
    }
    let images = images
        .into_iter()
        .enumerate()
        .map(|(index, image)| image.ok_or(FormatError::ImageWithoutSource(index)))
        .collect::<Result<Vec<_>, _>>()?;

    let asset = Asset::from_document(&document, &buffers, images, config)?;
    info!("loaded {} in {:?}", uri, start.elapsed());
    Ok(asset)
}

/// Blocking wrapper around `load` for native callers.
pub fn load_blocking<F: Fetch>(fetcher: &F, uri: &str, config: &LoaderConfig) -> Result<Asset, LoadError> {
    pollster::block_on(load(fetcher, uri, config))
}
