//! Application-wide constants.

/// Widths (in pixels) that may be requested through a `/wNNN/` size marker.
///
/// Any other width is treated as "no resize requested" so that arbitrary inputs
/// cannot fan out into an unbounded number of stored variants.
pub const DEFAULT_IMAGE_SIZES: &[u32] = &[
    30, 40, 50, 60, 70, 80, 90, //
    100, 110, 120, 130, 140, 150, 160, 170, 180, 190, //
    200, 210, 215, 220, 230, 240, 250, 260, 270, 280, 290, //
    300, 310, 320, 330, 340, 350, 360, 370, 380, 390, //
    400, 410, 420, 430, 440, 450, 460, 470, 480, 490, //
    500, 510, 520, 530, 540, 550, 560, 570, 580, 590, //
    600, 620, 640, 650, 660, 680, //
    700, 720, 740, 750, 760, 780, //
    800, 810, 820, 840, 850, 860, 880, //
    900, 960, 1000, 1020, 1050, 1080, 1100, 1150, 1200, 1250, 1300, 1350, 1400,
];

/// Placeholder served when no working replacement for an image can be found.
pub const DEFAULT_FALLBACK_IMAGE: &str = "/vendor/core/core/base/img/placeholder.png";

/// Location of the client recovery agent injected into HTML pages.
pub const DEFAULT_AGENT_SCRIPT_PATH: &str = "/vendor/image-domain-replace/js/script.js";

/// CDN suffix combined with every configured prefix token.
pub const DEFAULT_CDN_SUFFIX: &str = "sudospaces.com";

/// Path of the fallback-resolution endpoint consumed by the client agent.
pub const FALLBACK_ENDPOINT_PATH: &str = "/ajax/get-fallback-image-url";

/// Issues anti-forgery tokens for pages that do not embed one.
pub const CSRF_TOKEN_PATH: &str = "/ajax/csrf-token";

/// Header carrying the anti-forgery token on fallback requests.
pub const CSRF_HEADER: &str = "X-CSRF-TOKEN";

/// Suffix appended to an object key to address its WebP counterpart.
pub const WEBP_SUFFIX: &str = ".webp";

/// Upper bound on fetching an original before generating a variant.
pub const SOURCE_TIMEOUT_SECS: u64 = 30;
