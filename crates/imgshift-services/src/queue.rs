use crate::resolver::VariantResolver;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};

/// Background resolution of URLs found by the rewrite filter.
///
/// Submitting never waits: when the bounded channel is full the URL is dropped
/// with a warning. The browser agent resolves anything that was skipped.
#[derive(Clone)]
pub struct ResolutionQueue {
    tx: mpsc::Sender<String>,
}

impl ResolutionQueue {
    /// Create a queue holding up to `capacity` URLs and spawn its worker pool.
    pub fn spawn(resolver: Arc<VariantResolver>, capacity: usize, max_concurrent: usize) -> Self {
        let capacity = capacity.max(1);
        let max_concurrent = max_concurrent.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        tokio::spawn(async move {
            Self::worker_pool(rx, resolver, max_concurrent).await;
        });

        tracing::info!(
            queue_size = capacity,
            max_concurrent = max_concurrent,
            "Resolution queue initialized"
        );

        Self { tx }
    }

    /// Enqueue `url`. Returns false when it was dropped.
    pub fn submit(&self, url: &str) -> bool {
        match self.tx.try_send(url.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(url)) => {
                tracing::warn!(url = %url, "Resolution queue is full, dropping URL");
                false
            }
            Err(TrySendError::Closed(url)) => {
                tracing::warn!(url = %url, "Resolution queue is closed, dropping URL");
                false
            }
        }
    }

    async fn worker_pool(
        mut rx: mpsc::Receiver<String>,
        resolver: Arc<VariantResolver>,
        max_concurrent: usize,
    ) {
        let semaphore = Arc::new(Semaphore::new(max_concurrent));

        while let Some(url) = rx.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let resolver = resolver.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let resolution = resolver.resolve_detailed(&url).await;
                tracing::debug!(
                    url = %url,
                    resolved = %resolution.url,
                    outcome = ?resolution.outcome,
                    "Background resolution finished"
                );
            });
        }

        tracing::debug!("Resolution queue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgshift_core::{PathCodec, SizeAllowList};
    use imgshift_storage::MemoryStorage;
    use std::time::Duration;

    #[tokio::test]
    async fn test_full_queue_drops() {
        let (tx, _rx) = mpsc::channel(1);
        let queue = ResolutionQueue { tx };
        assert!(queue.submit("https://old.cdn/a.jpg"));
        assert!(!queue.submit("https://old.cdn/b.jpg"));
    }

    #[tokio::test]
    async fn test_closed_queue_drops() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let queue = ResolutionQueue { tx };
        assert!(!queue.submit("https://old.cdn/a.jpg"));
    }

    #[tokio::test]
    async fn test_worker_resolves_submitted_urls() {
        let storage = MemoryStorage::new("https://storage.example.com/bucket");
        let mut png = Vec::new();
        image::DynamicImage::new_rgb8(400, 200)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        storage.set_file("img/a.png", png, "image/png");

        let resolver = Arc::new(VariantResolver::new(
            Arc::new(storage.clone()),
            PathCodec::new("https://storage.example.com/bucket"),
            SizeAllowList::default(),
        ));
        let queue = ResolutionQueue::spawn(resolver, 8, 2);
        assert!(queue.submit("https://old.cdn/img/w100/a.png"));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !storage.has_file("img/w100/a.png") {
            assert!(tokio::time::Instant::now() < deadline, "variant was never generated");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(storage.content_type("img/w100/a.png").as_deref(), Some("image/png"));
    }
}
