//! Broken image recovery state machine
//!
//! [`RecoveryAgent`] performs no I/O. The host (a browser binding, or a test) feeds it
//! element snapshots and events, executes the [`Command`]s it returns and reports
//! the outcome of each asynchronous step back as another event. Time is passed in
//! explicitly, as the time elapsed since the page loaded (`performance.now()` in a
//! browser), so the mutation debounce can be driven by a fake clock.
//!
//! Per element: `Bound -> (Loaded | Resolving) -> (Resolved | Placeholder)`, with
//! lazy images passing through `Observed` and `TrialLoading` first.

use crate::snapshot::{ElementId, ImageSnapshot};
use imgshift_core::constants::DEFAULT_FALLBACK_IMAGE;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Bursts of DOM insertions closer together than this trigger a single rescan.
pub const MUTATION_DEBOUNCE: Duration = Duration::from_millis(100);

/// Margin around the viewport used by the host's intersection observer.
pub const INTERSECTION_ROOT_MARGIN_PX: u32 = 100;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Local image shown while (or instead of) resolving a broken one.
    pub placeholder: String,
    /// Anti-forgery token read from `<meta name="csrf-token">`.
    pub csrf_token: Option<String>,
    pub debounce: Duration,
    /// Whether the host can observe viewport intersection. Without it lazy images are
    /// bound like eager ones.
    pub intersection_supported: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            placeholder: DEFAULT_FALLBACK_IMAGE.to_string(),
            csrf_token: None,
            debounce: MUTATION_DEBOUNCE,
            intersection_supported: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// Error listener attached, nothing has happened yet.
    Bound,
    /// Lazy image waiting to enter the viewport.
    Observed,
    /// In-memory trial load of the deferred URL in flight.
    TrialLoading,
    /// Loaded fine.
    Loaded,
    /// Fallback request in flight.
    Resolving,
    /// Replacement applied.
    Resolved,
    /// Stuck on the placeholder.
    Placeholder,
}

/// Side effects requested from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Attach a one-shot `error` listener.
    ListenForError { element: ElementId },
    /// Record `data-original-src`.
    RecordOriginalSrc { element: ElementId, url: String },
    Observe { element: ElementId },
    Unobserve { element: ElementId },
    /// Load `url` into a detached image and report back via `on_trial_load`.
    TrialLoad { element: ElementId, url: String },
    SetSrc { element: ElementId, url: String },
    /// Remove `data-original`, `data-src` and `data-lazy-src`.
    ClearLazyAttributes { element: ElementId },
    /// POST to the fallback endpoint and report back via `on_fallback_reply`.
    RequestFallback {
        element: ElementId,
        image_url: String,
        csrf_token: String,
    },
    /// Call `poll` at (or after) `at`. Replaces any previously scheduled rescan.
    ScheduleRescan { at: Duration },
    CancelRescan,
    /// Collect fresh snapshots of every `<img>` and pass them to `scan`.
    Rescan,
    /// Disconnect the intersection and mutation observers.
    DisconnectObservers,
}

/// Answer from the fallback endpoint as seen by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReply {
    Resolved(String),
    /// Network error, non-2xx status or unreadable body.
    Failed,
}

#[derive(Debug)]
struct Tracked {
    state: ElementState,
    original_url: Option<String>,
    lazy_url: Option<String>,
    /// Entered the viewport at least once.
    intersected: bool,
    observed: bool,
}

/// Recovery agent for one page.
#[derive(Debug)]
pub struct RecoveryAgent {
    config: AgentConfig,
    elements: HashMap<ElementId, Tracked>,
    pending: HashSet<ElementId>,
    cache: HashMap<String, String>,
    rescan_at: Option<Duration>,
    torn_down: bool,
}

impl RecoveryAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            elements: HashMap::new(),
            pending: HashSet::new(),
            cache: HashMap::new(),
            rescan_at: None,
            torn_down: false,
        }
    }

    pub fn state(&self, element: ElementId) -> Option<ElementState> {
        self.elements.get(&element).map(|t| t.state)
    }

    pub fn is_pending(&self, element: ElementId) -> bool {
        self.pending.contains(&element)
    }

    pub fn cached(&self, original_url: &str) -> Option<&str> {
        self.cache.get(original_url).map(String::as_str)
    }

    /// Bind every unbound image and start observing lazy ones.
    ///
    /// Re-scanning already bound elements is a no-op, so hosts may pass the full
    /// image list after each mutation burst.
    pub fn scan(&mut self, images: &[ImageSnapshot]) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.torn_down {
            return commands;
        }
        for image in images {
            if !self.elements.contains_key(&image.id) {
                self.bind(image, &mut commands);
            }
            self.observe_if_lazy(image, &mut commands);
        }
        commands
    }

    fn bind(&mut self, image: &ImageSnapshot, commands: &mut Vec<Command>) {
        let original_url = image.original_url().map(str::to_string);
        if image.data_original_src.is_none() {
            if let Some(url) = &original_url {
                commands.push(Command::RecordOriginalSrc {
                    element: image.id,
                    url: url.clone(),
                });
            }
        }

        self.elements.insert(
            image.id,
            Tracked {
                state: ElementState::Bound,
                original_url,
                lazy_url: image.lazy_url().map(str::to_string),
                intersected: false,
                observed: false,
            },
        );

        // Images with a deferred source are left to the intersection observer when
        // there is one. Native `loading="lazy"` images keep their real `src` and can
        // fail whenever the browser gets to them, so they are listened to as well.
        if image.lazy_url().is_some() && self.config.intersection_supported {
            return;
        }
        if image.is_broken() {
            commands.extend(self.handle_error(image.id));
        } else {
            commands.push(Command::ListenForError { element: image.id });
        }
    }

    fn observe_if_lazy(&mut self, image: &ImageSnapshot, commands: &mut Vec<Command>) {
        if !self.config.intersection_supported || !image.is_lazy() {
            return;
        }
        let Some(tracked) = self.elements.get_mut(&image.id) else {
            return;
        };
        if tracked.intersected || tracked.observed {
            return;
        }
        tracked.observed = true;
        if tracked.state == ElementState::Bound {
            tracked.state = ElementState::Observed;
        }
        commands.push(Command::Observe { element: image.id });
    }

    /// The element entered the viewport.
    pub fn on_intersect(&mut self, image: &ImageSnapshot) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.torn_down {
            return commands;
        }
        let Some(tracked) = self.elements.get_mut(&image.id) else {
            return commands;
        };
        tracked.observed = false;
        let first_intersection = !std::mem::replace(&mut tracked.intersected, true);

        match image.lazy_url() {
            Some(lazy_url) if first_intersection => {
                tracked.lazy_url = Some(lazy_url.to_string());
                tracked.original_url = Some(lazy_url.to_string());
                tracked.state = ElementState::TrialLoading;
                commands.push(Command::RecordOriginalSrc {
                    element: image.id,
                    url: lazy_url.to_string(),
                });
                commands.push(Command::TrialLoad {
                    element: image.id,
                    url: lazy_url.to_string(),
                });
            }
            _ if image.is_broken() => commands.extend(self.handle_error(image.id)),
            _ => {
                if tracked.state == ElementState::Observed {
                    tracked.state = ElementState::Bound;
                }
            }
        }

        commands.push(Command::Unobserve { element: image.id });
        commands
    }

    /// Result of a `TrialLoad`.
    pub fn on_trial_load(&mut self, element: ElementId, loaded: bool) -> Vec<Command> {
        if self.torn_down {
            return Vec::new();
        }
        let Some(tracked) = self.elements.get_mut(&element) else {
            return Vec::new();
        };
        if tracked.state != ElementState::TrialLoading {
            return Vec::new();
        }

        if !loaded {
            tracing::debug!(element, url = ?tracked.lazy_url, "Trial load failed");
            return self.handle_error(element);
        }

        tracked.state = ElementState::Loaded;
        match tracked.lazy_url.clone() {
            Some(url) => vec![
                Command::SetSrc { element, url },
                Command::ClearLazyAttributes { element },
            ],
            None => Vec::new(),
        }
    }

    /// The element fired `error`.
    pub fn on_error(&mut self, element: ElementId) -> Vec<Command> {
        if self.torn_down {
            return Vec::new();
        }
        self.handle_error(element)
    }

    fn handle_error(&mut self, element: ElementId) -> Vec<Command> {
        if self.pending.contains(&element) {
            return Vec::new();
        }
        let Some(tracked) = self.elements.get_mut(&element) else {
            return Vec::new();
        };
        // The error listener is one-shot; later failures (of the placeholder or the
        // replacement) are not handled again.
        if matches!(
            tracked.state,
            ElementState::Resolved | ElementState::Placeholder | ElementState::Resolving
        ) {
            return Vec::new();
        }

        let original_url = match tracked.original_url.clone() {
            Some(url) if url != self.config.placeholder => url,
            _ => return Vec::new(),
        };

        let mut commands = vec![Command::SetSrc {
            element,
            url: self.config.placeholder.clone(),
        }];
        tracked.state = ElementState::Placeholder;

        let Some(token) = self.config.csrf_token.clone() else {
            tracing::debug!(element, "No CSRF token on page, keeping placeholder");
            return commands;
        };

        if let Some(cached) = self.cache.get(&original_url) {
            tracked.state = ElementState::Resolved;
            commands.push(Command::SetSrc {
                element,
                url: cached.clone(),
            });
            return commands;
        }

        tracked.state = ElementState::Resolving;
        self.pending.insert(element);
        commands.push(Command::RequestFallback {
            element,
            image_url: original_url,
            csrf_token: token,
        });
        commands
    }

    /// Result of a `RequestFallback`.
    pub fn on_fallback_reply(&mut self, element: ElementId, reply: FallbackReply) -> Vec<Command> {
        // Released whatever the outcome.
        self.pending.remove(&element);
        if self.torn_down {
            return Vec::new();
        }
        let Some(tracked) = self.elements.get_mut(&element) else {
            return Vec::new();
        };
        if tracked.state != ElementState::Resolving {
            return Vec::new();
        }

        match reply {
            FallbackReply::Resolved(url) if !url.trim().is_empty() => {
                if let Some(original) = &tracked.original_url {
                    self.cache.insert(original.clone(), url.clone());
                }
                tracked.state = ElementState::Resolved;
                vec![Command::SetSrc { element, url }]
            }
            _ => {
                tracked.state = ElementState::Placeholder;
                Vec::new()
            }
        }
    }

    /// A DOM subtree was inserted. (Re)starts the debounce window.
    pub fn on_mutation(&mut self, now: Duration) -> Vec<Command> {
        if self.torn_down {
            return Vec::new();
        }
        let at = now + self.config.debounce;
        self.rescan_at = Some(at);
        vec![Command::ScheduleRescan { at }]
    }

    /// Timer tick. Emits `Rescan` once the debounce window has elapsed.
    pub fn poll(&mut self, now: Duration) -> Vec<Command> {
        match self.rescan_at {
            Some(at) if !self.torn_down && now >= at => {
                self.rescan_at = None;
                vec![Command::Rescan]
            }
            _ => Vec::new(),
        }
    }

    /// Page navigation: stop observing, drop the timer and forget resolved URLs.
    pub fn teardown(&mut self) -> Vec<Command> {
        self.torn_down = true;
        self.rescan_at = None;
        self.cache.clear();
        vec![Command::DisconnectObservers, Command::CancelRescan]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "token-from-meta";
    const PLACEHOLDER: &str = "/img/placeholder.png";

    fn agent() -> RecoveryAgent {
        RecoveryAgent::new(AgentConfig {
            placeholder: PLACEHOLDER.to_string(),
            csrf_token: Some(TOKEN.to_string()),
            ..AgentConfig::default()
        })
    }

    fn set_src(element: ElementId, url: &str) -> Command {
        Command::SetSrc {
            element,
            url: url.to_string(),
        }
    }

    fn request(element: ElementId, url: &str) -> Command {
        Command::RequestFallback {
            element,
            image_url: url.to_string(),
            csrf_token: TOKEN.to_string(),
        }
    }

    #[test]
    fn test_eager_image_binds_listener_once() {
        let mut agent = agent();
        let img = ImageSnapshot::new(1, "https://old.cdn/a.jpg");

        let commands = agent.scan(std::slice::from_ref(&img));
        assert_eq!(
            commands,
            vec![
                Command::RecordOriginalSrc {
                    element: 1,
                    url: "https://old.cdn/a.jpg".into()
                },
                Command::ListenForError { element: 1 },
            ]
        );
        assert_eq!(agent.state(1), Some(ElementState::Bound));
        assert!(agent.scan(&[img]).is_empty());
    }

    #[test]
    fn test_already_broken_image_resolved_immediately() {
        let mut agent = agent();
        let img = ImageSnapshot::new(1, "https://old.cdn/a.jpg").loaded(0);

        let commands = agent.scan(&[img]);
        assert!(commands.contains(&set_src(1, PLACEHOLDER)));
        assert!(commands.contains(&request(1, "https://old.cdn/a.jpg")));
        assert!(!commands.contains(&Command::ListenForError { element: 1 }));
        assert_eq!(agent.state(1), Some(ElementState::Resolving));
    }

    #[test]
    fn test_error_swaps_placeholder_then_applies_reply() {
        let mut agent = agent();
        agent.scan(&[ImageSnapshot::new(1, "https://old.cdn/a.jpg")]);

        let commands = agent.on_error(1);
        assert_eq!(
            commands,
            vec![set_src(1, PLACEHOLDER), request(1, "https://old.cdn/a.jpg")]
        );
        assert!(agent.is_pending(1));

        let applied = agent.on_fallback_reply(
            1,
            FallbackReply::Resolved("https://img.example.com/a.jpg".into()),
        );
        assert_eq!(applied, vec![set_src(1, "https://img.example.com/a.jpg")]);
        assert!(!agent.is_pending(1));
        assert_eq!(agent.state(1), Some(ElementState::Resolved));
        assert_eq!(
            agent.cached("https://old.cdn/a.jpg"),
            Some("https://img.example.com/a.jpg")
        );
    }

    #[test]
    fn test_second_error_while_pending_is_ignored() {
        let mut agent = agent();
        agent.scan(&[ImageSnapshot::new(1, "https://old.cdn/a.jpg")]);

        assert_eq!(agent.on_error(1).len(), 2);
        assert!(agent.on_error(1).is_empty());
    }

    #[test]
    fn test_failed_reply_keeps_placeholder_and_releases_guard() {
        let mut agent = agent();
        agent.scan(&[ImageSnapshot::new(1, "https://old.cdn/a.jpg")]);
        agent.on_error(1);

        assert!(agent.on_fallback_reply(1, FallbackReply::Failed).is_empty());
        assert!(!agent.is_pending(1));
        assert_eq!(agent.state(1), Some(ElementState::Placeholder));
        assert_eq!(agent.cached("https://old.cdn/a.jpg"), None);
    }

    #[test]
    fn test_cached_url_applied_without_request() {
        let mut agent = agent();
        agent.scan(&[
            ImageSnapshot::new(1, "https://old.cdn/a.jpg"),
            ImageSnapshot::new(2, "https://old.cdn/a.jpg"),
        ]);
        agent.on_error(1);
        agent.on_fallback_reply(1, FallbackReply::Resolved("https://img.example.com/a.jpg".into()));

        let commands = agent.on_error(2);
        assert_eq!(
            commands,
            vec![set_src(2, PLACEHOLDER), set_src(2, "https://img.example.com/a.jpg")]
        );
        assert!(!agent.is_pending(2));
        assert_eq!(agent.state(2), Some(ElementState::Resolved));
    }

    #[test]
    fn test_missing_token_stays_on_placeholder() {
        let mut agent = RecoveryAgent::new(AgentConfig {
            placeholder: PLACEHOLDER.to_string(),
            ..AgentConfig::default()
        });
        agent.scan(&[ImageSnapshot::new(1, "https://old.cdn/a.jpg")]);

        assert_eq!(agent.on_error(1), vec![set_src(1, PLACEHOLDER)]);
        assert!(!agent.is_pending(1));
        assert_eq!(agent.state(1), Some(ElementState::Placeholder));
    }

    #[test]
    fn test_placeholder_failure_is_not_resolved() {
        let mut agent = agent();
        agent.scan(&[ImageSnapshot::new(1, PLACEHOLDER)]);
        assert!(agent.on_error(1).is_empty());
    }

    #[test]
    fn test_lazy_image_trial_load_failure_goes_to_fallback() {
        let mut agent = agent();
        let img = ImageSnapshot::new(1, "data:image/gif;base64,R0lGOD")
            .with_data_src("https://old.cdn/2025/09/w300/photo.jpg");

        let bound = agent.scan(std::slice::from_ref(&img));
        assert!(bound.contains(&Command::Observe { element: 1 }));
        assert!(!bound.contains(&Command::ListenForError { element: 1 }));
        assert_eq!(agent.state(1), Some(ElementState::Observed));

        let visible = agent.on_intersect(&img);
        assert!(visible.contains(&Command::TrialLoad {
            element: 1,
            url: "https://old.cdn/2025/09/w300/photo.jpg".into()
        }));
        assert!(visible.contains(&Command::Unobserve { element: 1 }));

        let failed = agent.on_trial_load(1, false);
        assert_eq!(
            failed,
            vec![
                set_src(1, PLACEHOLDER),
                request(1, "https://old.cdn/2025/09/w300/photo.jpg")
            ]
        );

        // The broken deferred URL never becomes the element's src.
        let all: Vec<Command> = bound.into_iter().chain(visible).chain(failed).collect();
        assert!(!all.contains(&set_src(1, "https://old.cdn/2025/09/w300/photo.jpg")));
    }

    #[test]
    fn test_lazy_image_trial_load_success_swaps_src() {
        let mut agent = agent();
        let img = ImageSnapshot::new(1, "blank.gif").with_data_original("https://img.example.com/a.jpg");
        agent.scan(std::slice::from_ref(&img));
        agent.on_intersect(&img);

        assert_eq!(
            agent.on_trial_load(1, true),
            vec![
                set_src(1, "https://img.example.com/a.jpg"),
                Command::ClearLazyAttributes { element: 1 },
            ]
        );
        assert_eq!(agent.state(1), Some(ElementState::Loaded));

        // Already loaded: a rescan does not observe it again.
        assert!(agent.scan(&[img]).is_empty());
    }

    #[test]
    fn test_native_lazy_broken_on_intersect() {
        let mut agent = agent();
        let img = ImageSnapshot::new(1, "https://old.cdn/a.jpg").lazy();
        agent.scan(std::slice::from_ref(&img));

        let commands = agent.on_intersect(&img.loaded(0));
        assert!(commands.contains(&request(1, "https://old.cdn/a.jpg")));
        assert!(commands.contains(&Command::Unobserve { element: 1 }));
    }

    #[test]
    fn test_native_lazy_failing_after_intersect_is_recovered() {
        let mut agent = agent();
        let img = ImageSnapshot::new(1, "https://old.cdn/a.jpg").lazy();

        let bound = agent.scan(std::slice::from_ref(&img));
        assert!(bound.contains(&Command::ListenForError { element: 1 }));
        assert!(bound.contains(&Command::Observe { element: 1 }));

        // Still loading when it scrolls into view.
        assert_eq!(agent.on_intersect(&img), vec![Command::Unobserve { element: 1 }]);
        assert_eq!(agent.state(1), Some(ElementState::Bound));
        assert!(agent.scan(std::slice::from_ref(&img)).is_empty());

        assert_eq!(
            agent.on_error(1),
            vec![set_src(1, PLACEHOLDER), request(1, "https://old.cdn/a.jpg")]
        );
    }

    #[test]
    fn test_lazy_without_intersection_support_binds_listener() {
        let mut agent = RecoveryAgent::new(AgentConfig {
            intersection_supported: false,
            ..AgentConfig::default()
        });
        let img = ImageSnapshot::new(1, "x.gif").with_data_src("https://old.cdn/a.jpg");

        let commands = agent.scan(&[img]);
        assert!(commands.contains(&Command::ListenForError { element: 1 }));
        assert!(!commands.contains(&Command::Observe { element: 1 }));
    }

    #[test]
    fn test_mutation_burst_debounced_into_one_rescan() {
        let mut agent = agent();
        let t0 = Duration::from_secs(5);

        agent.on_mutation(t0);
        agent.on_mutation(t0 + Duration::from_millis(40));
        let last = agent.on_mutation(t0 + Duration::from_millis(80));
        assert_eq!(
            last,
            vec![Command::ScheduleRescan {
                at: t0 + Duration::from_millis(180)
            }]
        );

        assert!(agent.poll(t0 + Duration::from_millis(120)).is_empty());
        assert_eq!(
            agent.poll(t0 + Duration::from_millis(180)),
            vec![Command::Rescan]
        );
        assert!(agent.poll(t0 + Duration::from_millis(400)).is_empty());
    }

    #[test]
    fn test_teardown_stops_everything() {
        let mut agent = agent();
        let t0 = Duration::from_secs(5);
        agent.scan(&[ImageSnapshot::new(1, "https://old.cdn/a.jpg")]);
        agent.on_error(1);
        agent.on_fallback_reply(1, FallbackReply::Resolved("https://img.example.com/a.jpg".into()));
        agent.on_mutation(t0);

        assert_eq!(
            agent.teardown(),
            vec![Command::DisconnectObservers, Command::CancelRescan]
        );
        assert_eq!(agent.cached("https://old.cdn/a.jpg"), None);
        assert!(agent.poll(t0 + Duration::from_secs(1)).is_empty());
        assert!(agent
            .scan(&[ImageSnapshot::new(2, "https://old.cdn/b.jpg")])
            .is_empty());
        assert!(agent.on_mutation(t0).is_empty());
    }
}
