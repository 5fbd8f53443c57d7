//! Path codec
//!
//! Pure functions translating an incoming image URL into the storage keys used by
//! the bucket:
//!
//! - the **original key**: the canonical identity of the uploaded asset, with the
//!   bucket domain, any `/wNNN/` size marker and any trailing `.webp` removed;
//! - the **variant key**: the same path with the size marker preserved, used as the
//!   storage location of a derived (resized) asset. The `.webp` suffix is stripped
//!   and re-applied separately when the WebP counterpart is written.
//!
//! Nothing in this module performs I/O.

use crate::constants::{DEFAULT_IMAGE_SIZES, WEBP_SUFFIX};
use regex::Regex;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::LazyLock;

static SIZE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/w(\d+)/").expect("size marker regex is valid"));

static LOOSE_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)w(\d+)").expect("width regex is valid"));

/// Output format requested by an image reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestedFormat {
    /// Keep the format of the original asset.
    #[default]
    Original,
    /// Re-encode as WebP (`.webp` suffix on the URL).
    Webp,
}

/// Canonical storage key of an original asset (no leading slash, no size or format markers).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        ObjectKey(key.trim_start_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the WebP counterpart of the original asset (`<key>.webp`).
    pub fn webp(&self) -> VariantKey {
        VariantKey(format!("{}{}", self.0, WEBP_SUFFIX))
    }

    /// Build the variant key for a width and format.
    ///
    /// The size marker is inserted as its own directory right before the file name:
    /// `2025/09/photo.jpg` with width 300 becomes `2025/09/w300/photo.jpg`.
    pub fn variant(&self, width: Option<u32>, format: RequestedFormat) -> VariantKey {
        let mut key = match width {
            Some(w) => match self.0.rsplit_once('/') {
                Some((dir, file)) => format!("{}/w{}/{}", dir, w, file),
                None => format!("w{}/{}", w, self.0),
            },
            None => self.0.clone(),
        };
        if format == RequestedFormat::Webp {
            key.push_str(WEBP_SUFFIX);
        }
        VariantKey(key)
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Storage key of a derived asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey(String);

impl VariantKey {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        VariantKey(key.trim_start_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_webp(&self) -> bool {
        has_webp_suffix(&self.0)
    }

    /// The WebP counterpart of this variant. Already-WebP keys are returned unchanged.
    pub fn with_webp_suffix(&self) -> VariantKey {
        if self.is_webp() {
            self.clone()
        } else {
            VariantKey(format!("{}{}", self.0, WEBP_SUFFIX))
        }
    }
}

impl Display for VariantKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VariantKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fixed, ascending set of widths that may be generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeAllowList(Vec<u32>);

impl SizeAllowList {
    pub fn new(sizes: impl IntoIterator<Item = u32>) -> Self {
        let mut sizes: Vec<u32> = sizes.into_iter().filter(|&s| s > 0).collect();
        sizes.sort_unstable();
        sizes.dedup();
        SizeAllowList(sizes)
    }

    pub fn contains(&self, width: u32) -> bool {
        self.0.binary_search(&width).is_ok()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for SizeAllowList {
    fn default() -> Self {
        SizeAllowList::new(DEFAULT_IMAGE_SIZES.iter().copied())
    }
}

impl FromStr for SizeAllowList {
    type Err = anyhow::Error;

    /// Parse a comma-separated list such as `"100,200,300"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sizes = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| anyhow::anyhow!("Invalid image size: {}", part))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SizeAllowList::new(sizes))
    }
}

/// Derived attributes of a URL believed to reference an image.
#[derive(Debug, Clone, Copy)]
pub struct ImageReference<'a> {
    url: &'a str,
}

impl<'a> ImageReference<'a> {
    pub fn new(url: &'a str) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &'a str {
        self.url
    }

    /// Host of an absolute (or protocol-relative) URL.
    pub fn host(&self) -> Option<&'a str> {
        let rest = after_scheme(self.url)?;
        let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let host = &rest[..end];
        (!host.is_empty()).then_some(host)
    }

    /// Path component without query string or fragment.
    pub fn path(&self) -> &'a str {
        let without_query = strip_query(self.url);
        match after_scheme(without_query) {
            Some(rest) => rest.find('/').map(|i| &rest[i..]).unwrap_or(""),
            None => without_query,
        }
    }

    /// Width carried by a `/wNNN/` size marker in the path.
    pub fn requested_width(&self) -> Option<u32> {
        size_marker(self.path())
    }

    pub fn requested_format(&self) -> RequestedFormat {
        if has_webp_suffix(self.url) {
            RequestedFormat::Webp
        } else {
            RequestedFormat::Original
        }
    }
}

/// Translates URLs into object keys relative to a bucket's public domain.
#[derive(Debug, Clone)]
pub struct PathCodec {
    bucket_domain: String,
    bucket_prefix: Option<String>,
}

impl PathCodec {
    /// Create a codec for the bucket served at `bucket_domain`
    /// (e.g. `https://storage.example.com/my-bucket`).
    pub fn new(bucket_domain: impl Into<String>) -> Self {
        Self {
            bucket_domain: bucket_domain.into().trim_end_matches('/').to_string(),
            bucket_prefix: None,
        }
    }

    /// Strip `<bucket>/` from the start of path-style URLs.
    pub fn with_bucket_prefix(mut self, bucket: Option<String>) -> Self {
        self.bucket_prefix = bucket
            .map(|b| b.trim_matches('/').to_string())
            .filter(|b| !b.is_empty());
        self
    }

    pub fn bucket_domain(&self) -> &str {
        &self.bucket_domain
    }

    /// Canonical key of the original asset referenced by `url`.
    ///
    /// URLs that differ only in size marker and/or `.webp` suffix map to the same key.
    pub fn original_key(&self, url: &str) -> ObjectKey {
        let path = self.relative_path(url);
        let path = strip_size_markers(&path);
        let path = strip_webp_suffix(&path);
        ObjectKey::new(path.trim_start_matches('/'))
    }

    /// Storage key of the variant addressed by `url` (size marker kept, `.webp` removed).
    pub fn variant_key(&self, url: &str) -> VariantKey {
        let path = self.relative_path(url);
        VariantKey::new(strip_webp_suffix(&path))
    }

    /// Public URL of a key on the bucket domain.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.bucket_domain, key.trim_start_matches('/'))
    }

    /// Path of `url` relative to the bucket root, with no leading slash.
    fn relative_path(&self, url: &str) -> String {
        let url = strip_query(url.trim());

        let path = match self.strip_bucket_domain(url) {
            Some(rest) => rest,
            None => match after_scheme(url) {
                Some(rest) => rest.find('/').map(|i| &rest[i..]).unwrap_or(""),
                None => url,
            },
        };

        let mut path = path.trim_start_matches('/');
        if let Some(prefix) = &self.bucket_prefix {
            if let Some(rest) = path.strip_prefix(prefix.as_str()) {
                if rest.starts_with('/') {
                    path = rest.trim_start_matches('/');
                }
            }
        }
        path.to_string()
    }

    /// Remainder of `url` after the bucket domain, ignoring the scheme on both sides.
    fn strip_bucket_domain<'u>(&self, url: &'u str) -> Option<&'u str> {
        if self.bucket_domain.is_empty() {
            return None;
        }
        let domain = after_scheme(&self.bucket_domain).unwrap_or(&self.bucket_domain);
        let candidate = after_scheme(url).unwrap_or(url);
        if candidate.len() < domain.len()
            || !candidate.is_char_boundary(domain.len())
            || !candidate[..domain.len()].eq_ignore_ascii_case(domain)
        {
            return None;
        }
        let rest = &candidate[domain.len()..];
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }
}

/// First `wNNN` anywhere in the URL (case-insensitive).
pub fn extract_width(url: &str) -> Option<u32> {
    LOOSE_WIDTH
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Width of the first `/wNNN/` path segment.
pub fn size_marker(path: &str) -> Option<u32> {
    SIZE_MARKER
        .captures(path)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// True when the URL path ends in `.webp` (case-insensitive).
pub fn has_webp_suffix(url: &str) -> bool {
    let path = strip_query(url);
    path.len() >= WEBP_SUFFIX.len()
        && path.is_char_boundary(path.len() - WEBP_SUFFIX.len())
        && path[path.len() - WEBP_SUFFIX.len()..].eq_ignore_ascii_case(WEBP_SUFFIX)
}

/// Collapse every `/wNNN/` segment to `/` until none remain.
pub fn strip_size_markers(path: &str) -> String {
    let mut current = path.to_string();
    while SIZE_MARKER.is_match(&current) {
        current = SIZE_MARKER.replace_all(&current, "/").into_owned();
    }
    current
}

/// Remove a single trailing `.webp` suffix (case-insensitive). Any query or fragment
/// is dropped first.
pub fn strip_webp_suffix(path: &str) -> &str {
    let path = strip_query(path);
    if has_webp_suffix(path) {
        &path[..path.len() - WEBP_SUFFIX.len()]
    } else {
        path
    }
}

fn strip_query(url: &str) -> &str {
    match url.find(['?', '#']) {
        Some(i) => &url[..i],
        None => url,
    }
}

/// Everything after `scheme://` (or after `//` for protocol-relative URLs).
fn after_scheme(url: &str) -> Option<&str> {
    if let Some(rest) = url.strip_prefix("//") {
        return Some(rest);
    }
    let idx = url.find("://")?;
    let scheme = &url[..idx];
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
        return None;
    }
    Some(&url[idx + 3..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> PathCodec {
        PathCodec::new("https://storage.example.com/bucket")
    }

    #[test]
    fn test_original_key_ignores_size_and_format_markers() {
        let codec = codec();
        let expected = ObjectKey::new("2025/09/photo.jpg");
        for url in [
            "https://storage.example.com/bucket/2025/09/photo.jpg",
            "https://storage.example.com/bucket/2025/09/w300/photo.jpg",
            "https://storage.example.com/bucket/2025/09/w300/photo.jpg.webp",
            "https://storage.example.com/bucket/2025/09/photo.jpg.WEBP",
            "https://old.cdn/2025/09/w300/photo.jpg",
            "http://storage.example.com/bucket/2025/09/w1400/photo.jpg?v=3",
        ] {
            assert_eq!(codec.original_key(url), expected, "url: {}", url);
        }
    }

    #[test]
    fn test_original_key_is_stable_on_stripped_paths() {
        let codec = codec();
        let once = codec.original_key("https://old.cdn/a/w100/w200/b/pic.png.webp");
        let twice = codec.original_key(once.as_str());
        assert_eq!(once.as_str(), "a/b/pic.png");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_variant_key_keeps_size_marker() {
        let codec = codec();
        assert_eq!(
            codec.variant_key("https://old.cdn/2025/09/w300/photo.jpg.webp").as_str(),
            "2025/09/w300/photo.jpg"
        );
        assert_eq!(
            codec.variant_key("https://storage.example.com/bucket/2025/09/w300/photo.jpg").as_str(),
            "2025/09/w300/photo.jpg"
        );
    }

    #[test]
    fn test_bucket_prefix_is_stripped_from_path_style_urls() {
        let codec = PathCodec::new("https://cdn.example.com").with_bucket_prefix(Some("media".into()));
        assert_eq!(
            codec.original_key("https://s3.region.example.com/media/2024/01/w200/a.png").as_str(),
            "2024/01/a.png"
        );
        // A directory that merely starts with the bucket name is left alone.
        assert_eq!(
            codec.original_key("https://s3.region.example.com/media-old/a.png").as_str(),
            "media-old/a.png"
        );
    }

    #[test]
    fn test_bucket_domain_requires_segment_boundary() {
        let codec = codec();
        assert_eq!(
            codec.original_key("https://storage.example.com/bucket-two/x.jpg").as_str(),
            "bucket-two/x.jpg"
        );
    }

    #[test]
    fn test_variant_from_object_key_is_deterministic() {
        let key = ObjectKey::new("2025/09/photo.jpg");
        let a = key.variant(Some(300), RequestedFormat::Webp);
        let b = key.variant(Some(300), RequestedFormat::Webp);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "2025/09/w300/photo.jpg.webp");
        assert_eq!(
            key.variant(Some(300), RequestedFormat::Original).as_str(),
            "2025/09/w300/photo.jpg"
        );
        assert_eq!(
            ObjectKey::new("photo.jpg").variant(Some(50), RequestedFormat::Original).as_str(),
            "w50/photo.jpg"
        );
        assert_eq!(key.variant(None, RequestedFormat::Original).as_str(), key.as_str());
    }

    #[test]
    fn test_extract_width() {
        assert_eq!(extract_width("https://old.cdn/2025/09/w300/photo.jpg"), Some(300));
        assert_eq!(extract_width("https://old.cdn/W640/photo.jpg"), Some(640));
        assert_eq!(extract_width("https://old.cdn/2025/09/photo.jpg"), None);
    }

    #[test]
    fn test_size_marker_requires_segment() {
        assert_eq!(size_marker("/2025/09/w300/photo.jpg"), Some(300));
        assert_eq!(size_marker("/2025/09/photo_w300.jpg"), None);
        let reference = ImageReference::new("https://w3.example.com/2025/photo.jpg");
        assert_eq!(reference.requested_width(), None);
        assert_eq!(reference.host(), Some("w3.example.com"));
    }

    #[test]
    fn test_has_webp_suffix() {
        assert!(has_webp_suffix("https://x/a.jpg.webp"));
        assert!(has_webp_suffix("https://x/a.WebP?x=1"));
        assert!(!has_webp_suffix("https://x/a.webp.jpg"));
        assert!(!has_webp_suffix("webp"));
    }

    #[test]
    fn test_strip_webp_suffix_ignores_query() {
        assert_eq!(strip_webp_suffix("x.jpg.webp"), "x.jpg");
        assert_eq!(strip_webp_suffix("x.webp?ab"), "x");
        assert_eq!(strip_webp_suffix("a.webp#ééé"), "a");
        assert_eq!(strip_webp_suffix("a.jpg?v=é.webp"), "a.jpg");
        assert_eq!(strip_webp_suffix("éé"), "éé");
    }

    #[test]
    fn test_image_reference_attributes() {
        let reference = ImageReference::new("https://old.cdn/2025/09/w300/photo.jpg.webp?x=1#top");
        assert_eq!(reference.host(), Some("old.cdn"));
        assert_eq!(reference.path(), "/2025/09/w300/photo.jpg.webp");
        assert_eq!(reference.requested_width(), Some(300));
        assert_eq!(reference.requested_format(), RequestedFormat::Webp);
    }

    #[test]
    fn test_size_allow_list() {
        let sizes: SizeAllowList = "300, 100,200,100".parse().unwrap();
        assert_eq!(sizes.as_slice(), &[100, 200, 300]);
        assert!(sizes.contains(200));
        assert!(!sizes.contains(250));
        assert!("100,abc".parse::<SizeAllowList>().is_err());
        assert!(SizeAllowList::default().contains(1400));
        assert!(!SizeAllowList::default().contains(1401));
    }

    #[test]
    fn test_public_url_joins_domain_and_key() {
        let codec = PathCodec::new("https://storage.example.com/bucket/");
        assert_eq!(
            codec.public_url("/2025/a.jpg"),
            "https://storage.example.com/bucket/2025/a.jpg"
        );
    }
}
