//! Per-visitor view throttling.
//!
//! A counted view leaves a `viewed_post_<slug>` cookie holding the epoch
//! milliseconds of the visit. A later visit only counts again once the window
//! has passed.

use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

pub fn cookie_name(slug: &str) -> String {
    let safe: String = slug
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("viewed_post_{}", safe)
}

/// Epoch millis of the last counted view, as sent back by the visitor.
pub fn last_view<'j>(jar: &'j CookieJar, name: &str) -> Option<&'j str> {
    jar.get(name).map(|cookie| cookie.value())
}

/// Whether a visit at `now_ms` should count, given the cookie from the last counted one.
pub fn should_count(previous: Option<&str>, now_ms: i64, window: Duration) -> bool {
    let Some(viewed_at) = previous.and_then(|v| v.trim().parse::<i64>().ok()) else {
        return true;
    };
    now_ms.saturating_sub(viewed_at) >= window.as_millis() as i64
}

/// Cookie recording a counted view, living as long as the window.
pub fn view_cookie(name: String, now_ms: i64, window: Duration) -> Cookie<'static> {
    Cookie::build((name, now_ms.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(window.as_secs() as i64))
        .build()
}
