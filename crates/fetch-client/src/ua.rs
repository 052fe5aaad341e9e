//! User-Agent rotation.
//!
//! Each upstream fetch goes out with a User-Agent composed from a small
//! platform x browser matrix, picked uniformly per request.

use rand::Rng;

const PLATFORMS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "X11; Linux x86_64",
];

const BROWSERS: &[&str] = &[
    "Chrome/123.0.0.0 Safari/537.36",
    "Chrome/124.0.0.0 Safari/537.36",
    "Edg/124.0.0.0 Safari/537.36",
];

/// Compose a User-Agent from a uniformly random platform and browser.
pub fn pick_user_agent<R: Rng>(rng: &mut R) -> String {
    let platform = PLATFORMS[rng.gen_range(0..PLATFORMS.len())];
    let browser = BROWSERS[rng.gen_range(0..BROWSERS.len())];
    format!("Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) {browser}")
}
