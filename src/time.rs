//! Platform-aware clock and timer helpers.
//!
//! Wall-clock time comes from `chrono::Utc::now()` natively and from
//! `js_sys::Date::now()` on WASM, where `std::time::SystemTime` is not
//! available. Timers use tokio natively. The browser has no tokio timer
//! driver, so on WASM [`sleep`] returns immediately and [`timeout`] defers
//! to the fetch layer's own limits.

use std::future::Future;
use std::time::Duration;

/// Returns the current Unix timestamp in milliseconds.
pub fn now_timestamp_millis() -> i64 {
    #[cfg(target_arch = "wasm32")]
    {
        js_sys::Date::now() as i64
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Milliseconds in one day
pub const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Wait for `duration`
pub(crate) async fn sleep(duration: Duration) {
    #[cfg(not(target_arch = "wasm32"))]
    tokio::time::sleep(duration).await;
    #[cfg(target_arch = "wasm32")]
    let _ = duration;
}

/// Run `future` to completion or give up after `limit`
///
/// Returns `None` on timeout.
pub(crate) async fn timeout<F: Future>(limit: Duration, future: F) -> Option<F::Output> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        tokio::time::timeout(limit, future).await.ok()
    }
    #[cfg(target_arch = "wasm32")]
    {
        let _ = limit;
        Some(future.await)
    }
}
