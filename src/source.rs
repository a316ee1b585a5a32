//! Base image handles and their resolution into decoded pixels.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbaImage;
use tracing::debug;
use url::Url;

use crate::cancel::CancelToken;
use crate::error::CompositeError;
use crate::templates::TemplateCatalog;

pub const IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_CHUNK: usize = 64 * 1024;
/// Remote bodies larger than this are refused.
pub const MAX_REMOTE_BYTES: usize = 64 * 1024 * 1024;

/// Where a base image comes from. Opaque to the editor; only a
/// [`SourceResolver`] looks inside.
#[derive(Clone, PartialEq)]
pub enum ImageSource {
    /// Already-encoded bytes, e.g. a camera capture.
    Bytes { label: String, bytes: Arc<[u8]> },
    File(PathBuf),
    /// `data:<mime>;base64,<payload>`
    DataUrl(String),
    /// Id into the [`TemplateCatalog`].
    Template(String),
    Remote(Url),
}

impl ImageSource {
    pub fn from_bytes(label: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes {
            label: label.into(),
            bytes: bytes.into(),
        }
    }

    /// Interprets a user-facing source string: `data:` URLs, `http(s)://`
    /// URLs, `ipfs://<cid>`, `template:<id>`, and otherwise a file path.
    pub fn parse(value: &str) -> Result<Self, CompositeError> {
        let value = value.trim();
        if value.starts_with("data:") {
            return Ok(Self::DataUrl(value.to_owned()));
        }
        if let Some(id) = value.strip_prefix("template:") {
            return Ok(Self::Template(id.trim().to_owned()));
        }
        if let Some(cid) = value.strip_prefix("ipfs://") {
            return gateway_url(cid).map(Self::Remote);
        }
        if value.starts_with("http://") || value.starts_with("https://") {
            return Url::parse(value)
                .map(Self::Remote)
                .map_err(|error| CompositeError::image_load(value, error));
        }
        Ok(Self::File(PathBuf::from(value)))
    }

    pub fn label(&self) -> String {
        match self {
            Self::Bytes { label, .. } => label.clone(),
            Self::File(path) => path.display().to_string(),
            Self::DataUrl(data) => {
                let header = data.split(',').next().unwrap_or("data:");
                format!("{header},…")
            }
            Self::Template(id) => format!("template:{id}"),
            Self::Remote(url) => url.to_string(),
        }
    }

    /// The IPFS content id when this source lives on an IPFS gateway.
    pub fn ipfs_cid(&self) -> Option<&str> {
        match self {
            Self::Remote(url) => ipfs_cid(url.as_str()),
            _ => None,
        }
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes { label, bytes } => f
                .debug_struct("Bytes")
                .field("label", label)
                .field("len", &bytes.len())
                .finish(),
            other => f.debug_tuple("ImageSource").field(&other.label()).finish(),
        }
    }
}

/// Extracts the content id from an `…/ipfs/<cid>` gateway URL.
pub fn ipfs_cid(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("/ipfs/")?;
    let cid = rest.split(['/', '?', '#']).next()?;
    (!cid.is_empty()).then_some(cid)
}

pub fn gateway_url(cid: &str) -> Result<Url, CompositeError> {
    let cid = cid.trim().trim_matches('/');
    if cid.is_empty() {
        return Err(CompositeError::image_load("ipfs://", "empty content id"));
    }
    Url::parse(&format!("{IPFS_GATEWAY}{cid}"))
        .map_err(|error| CompositeError::image_load(format!("ipfs://{cid}"), error))
}

pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, CompositeError> {
    let label = "data: URL";
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| CompositeError::image_load(label, "missing 'data:' prefix"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| CompositeError::image_load(label, "missing ',' separator"))?;
    if !header.ends_with(";base64") {
        return Err(CompositeError::image_load(
            label,
            "only base64-encoded data URLs are supported",
        ));
    }
    STANDARD
        .decode(payload.trim())
        .map_err(|error| CompositeError::image_load(label, error))
}

/// The selected base image. Immutable once selected; choosing another image
/// means building a new `BaseImage`.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseImage {
    source: ImageSource,
}

impl BaseImage {
    pub fn new(source: ImageSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }
}

impl From<ImageSource> for BaseImage {
    fn from(source: ImageSource) -> Self {
        Self::new(source)
    }
}

/// Turns an [`ImageSource`] into encoded image bytes. Fetching is the only
/// step of compositing allowed to block; implementations should check
/// `cancel` around slow work.
pub trait SourceResolver: Send + Sync {
    fn fetch(&self, source: &ImageSource, cancel: &CancelToken) -> Result<Vec<u8>, CompositeError>;
}

#[derive(Debug, Clone)]
pub struct LocalResolver {
    templates: TemplateCatalog,
    fetch_timeout: Duration,
}

impl LocalResolver {
    pub fn new(templates: TemplateCatalog) -> Self {
        Self {
            templates,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn templates(&self) -> &TemplateCatalog {
        &self.templates
    }
}

impl Default for LocalResolver {
    fn default() -> Self {
        Self::new(TemplateCatalog::default())
    }
}

impl SourceResolver for LocalResolver {
    fn fetch(&self, source: &ImageSource, cancel: &CancelToken) -> Result<Vec<u8>, CompositeError> {
        cancel.check()?;
        match source {
            ImageSource::Bytes { bytes, .. } => Ok(bytes.to_vec()),
            ImageSource::File(path) => read_file(path),
            ImageSource::DataUrl(data) => decode_data_url(data),
            ImageSource::Template(id) => {
                let path = self.templates.path_of(id).ok_or_else(|| {
                    CompositeError::image_load(source.label(), "unknown template id")
                })?;
                read_file(&path)
            }
            ImageSource::Remote(url) => {
                debug!(url = %url, "fetching remote base image");
                let bytes = fetch_remote(url, self.fetch_timeout, cancel)?;
                cancel.check()?;
                Ok(bytes)
            }
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, CompositeError> {
    std::fs::read(path).map_err(|error| CompositeError::image_load(path.display().to_string(), error))
}

#[cfg(feature = "remote")]
fn fetch_remote(url: &Url, timeout: Duration, cancel: &CancelToken) -> Result<Vec<u8>, CompositeError> {
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(|error| CompositeError::image_load(url.as_str(), error))?;
    let response = client
        .get(url.as_str())
        .send()
        .map_err(|error| CompositeError::image_load(url.as_str(), error))?;
    let status = response.status();
    if !status.is_success() {
        return Err(CompositeError::image_load(url.as_str(), format!("HTTP {status}")));
    }
    read_cancellable(response, url.as_str(), cancel)
}

#[cfg(not(feature = "remote"))]
fn fetch_remote(url: &Url, _timeout: Duration, _cancel: &CancelToken) -> Result<Vec<u8>, CompositeError> {
    Err(CompositeError::image_load(
        url.as_str(),
        "remote sources need the `remote` feature",
    ))
}

/// Reads `reader` to the end in chunks, giving up as soon as `cancel` fires
/// or the body passes [`MAX_REMOTE_BYTES`].
#[cfg_attr(not(feature = "remote"), allow(dead_code))]
fn read_cancellable(mut reader: impl Read, label: &str, cancel: &CancelToken) -> Result<Vec<u8>, CompositeError> {
    let mut body = Vec::new();
    let mut chunk = vec![0; FETCH_CHUNK];
    loop {
        cancel.check()?;
        let read = match reader.read(&mut chunk) {
            Ok(0) => return Ok(body),
            Ok(read) => read,
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(CompositeError::image_load(label, error)),
        };
        if body.len() + read > MAX_REMOTE_BYTES {
            return Err(CompositeError::image_load(
                label,
                format!("body exceeds {MAX_REMOTE_BYTES} bytes"),
            ));
        }
        body.extend_from_slice(&chunk[..read]);
    }
}

pub fn decode_image(bytes: &[u8], label: &str) -> Result<RgbaImage, CompositeError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|error| CompositeError::image_load(label, error))?
        .to_rgba8();
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(CompositeError::image_load(label, "image has no pixels"));
    }
    Ok(decoded)
}
