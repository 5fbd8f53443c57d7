//! Reading `<img>` state out of the DOM.

use imgshift_agent::{ElementId, ImageSnapshot};
use std::time::Duration;
use web_sys::HtmlImageElement;

/// Attribute carrying the agent's id for an element across rescans.
pub const ID_ATTRIBUTE: &str = "data-imgshift-id";

/// Lazy-source attributes removed after a successful trial load.
pub const LAZY_ATTRIBUTES: [&str; 3] = ["data-original", "data-src", "data-lazy-src"];

pub fn snapshot(id: ElementId, img: &HtmlImageElement) -> ImageSnapshot {
    ImageSnapshot {
        id,
        src: img.get_attribute("src"),
        data_original: img.get_attribute("data-original"),
        data_src: img.get_attribute("data-src"),
        data_lazy_src: img.get_attribute("data-lazy-src"),
        data_original_src: img.get_attribute("data-original-src"),
        loading_lazy: is_lazy_loading(img.get_attribute("loading").as_deref()),
        complete: img.complete(),
        natural_width: img.natural_width(),
    }
}

pub fn is_lazy_loading(loading: Option<&str>) -> bool {
    loading.is_some_and(|value| value.trim().eq_ignore_ascii_case("lazy"))
}

pub fn parse_element_id(value: Option<&str>) -> Option<ElementId> {
    value?.trim().parse().ok()
}

/// `performance.now()` milliseconds as the agent's clock.
pub fn page_clock(millis: f64) -> Duration {
    if millis.is_finite() && millis > 0.0 {
        Duration::from_secs_f64(millis / 1000.0)
    } else {
        Duration::ZERO
    }
}

/// `setTimeout` delay that fires no earlier than `at`.
pub fn timer_delay_ms(at: Duration, now: Duration) -> i32 {
    let remaining = at.saturating_sub(now).as_millis() + 1;
    i32::try_from(remaining).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_loading_attribute() {
        assert!(is_lazy_loading(Some("lazy")));
        assert!(is_lazy_loading(Some(" LAZY ")));
        assert!(!is_lazy_loading(Some("eager")));
        assert!(!is_lazy_loading(None));
    }

    #[test]
    fn test_parse_element_id() {
        assert_eq!(parse_element_id(Some("42")), Some(42));
        assert_eq!(parse_element_id(Some("x")), None);
        assert_eq!(parse_element_id(None), None);
    }

    #[test]
    fn test_timer_delay_never_fires_early() {
        let now = page_clock(1_000.0);
        assert_eq!(now, Duration::from_secs(1));
        assert_eq!(timer_delay_ms(now + Duration::from_millis(100), now), 101);
        assert_eq!(timer_delay_ms(now, now + Duration::from_millis(5)), 1);
        assert_eq!(page_clock(f64::NAN), Duration::ZERO);
    }
}
