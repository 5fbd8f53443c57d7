/// Host-assigned identity of an `<img>` element, stable for the page's lifetime.
pub type ElementId = u64;

/// What the agent needs to know about one `<img>` element at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSnapshot {
    pub id: ElementId,
    pub src: Option<String>,
    /// `data-original` (Owl Carousel, Lazy Load XT).
    pub data_original: Option<String>,
    /// `data-src` (LazyLoad and friends).
    pub data_src: Option<String>,
    /// `data-lazy-src`.
    pub data_lazy_src: Option<String>,
    /// `data-original-src`, recorded by the agent itself on bind.
    pub data_original_src: Option<String>,
    /// `loading="lazy"`.
    pub loading_lazy: bool,
    /// `img.complete`
    pub complete: bool,
    /// `img.naturalWidth`
    pub natural_width: u32,
}

impl ImageSnapshot {
    pub fn new(id: ElementId, src: impl Into<String>) -> Self {
        Self {
            id,
            src: Some(src.into()),
            ..Default::default()
        }
    }

    pub fn with_data_src(mut self, url: impl Into<String>) -> Self {
        self.data_src = Some(url.into());
        self
    }

    pub fn with_data_original(mut self, url: impl Into<String>) -> Self {
        self.data_original = Some(url.into());
        self
    }

    pub fn lazy(mut self) -> Self {
        self.loading_lazy = true;
        self
    }

    /// Mark as finished loading with the given natural width (0 means broken).
    pub fn loaded(mut self, natural_width: u32) -> Self {
        self.complete = true;
        self.natural_width = natural_width;
        self
    }

    /// Deferred URL from the first lazy-source attribute present.
    pub fn lazy_url(&self) -> Option<&str> {
        first_non_empty([
            self.data_original.as_deref(),
            self.data_src.as_deref(),
            self.data_lazy_src.as_deref(),
        ])
    }

    /// Best-known original URL: lazy sources, then the recorded original, then `src`.
    pub fn original_url(&self) -> Option<&str> {
        self.lazy_url().or_else(|| {
            first_non_empty([self.data_original_src.as_deref(), self.src.as_deref()])
        })
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy_url().is_some() || self.loading_lazy
    }

    /// Already finished loading without producing any pixels.
    pub fn is_broken(&self) -> bool {
        self.complete && self.natural_width == 0
    }
}

fn first_non_empty<'a, const N: usize>(candidates: [Option<&'a str>; N]) -> Option<&'a str> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|url| !url.is_empty())
}
