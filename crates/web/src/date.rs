//! HTTP `Date` header values.
//!
//! Formatting a date for every response is wasted work when thousands of responses share
//! the same second. The service keeps the last formatted value behind an [`ArcSwap`] and
//! reformats it at most once per refresh interval, on the first read that finds it stale.
//! No background task is needed, so the service works with or without a runtime.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::HeaderValue;
use once_cell::sync::Lazy;

const REFRESH_INTERVAL: Duration = Duration::from_millis(800);

static DATE_SERVICE: Lazy<DateService> = Lazy::new(|| DateService::new_with_refresh_interval(REFRESH_INTERVAL));

#[derive(Debug)]
struct CachedDate {
    formatted_at: Instant,
    value: Bytes,
}

impl CachedDate {
    fn now() -> Self {
        let mut buf = faf_http_date::get_date_buff_no_key();
        faf_http_date::get_date_no_key(&mut buf);
        Self { formatted_at: Instant::now(), value: Bytes::from_owner(buf) }
    }
}

/// Shared source of RFC 7231 formatted dates.
#[derive(Debug)]
pub struct DateService {
    current: ArcSwap<CachedDate>,
    refresh_interval: Duration,
}

impl DateService {
    /// Returns a reference to the process wide instance.
    pub fn get_global_instance() -> &'static DateService {
        &DATE_SERVICE
    }

    fn new_with_refresh_interval(refresh_interval: Duration) -> Self {
        Self { current: ArcSwap::from_pointee(CachedDate::now()), refresh_interval }
    }

    /// The current date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
    pub fn http_date(&self) -> Bytes {
        let cached = self.current.load();
        if cached.formatted_at.elapsed() < self.refresh_interval {
            return cached.value.clone();
        }

        let fresh = Arc::new(CachedDate::now());
        let value = fresh.value.clone();
        self.current.store(fresh);
        value
    }

    pub(crate) fn with_http_date<F>(&self, f: F)
    where
        F: FnOnce(HeaderValue),
    {
        if let Ok(header_value) = HeaderValue::from_maybe_shared(self.http_date()) {
            f(header_value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_has_http_format() {
        let date = DateService::get_global_instance().http_date();
        let text = std::str::from_utf8(&date).unwrap();

        assert_eq!(text.len(), 29);
        assert!(text.ends_with(" GMT"));
        assert_eq!(&text[3..5], ", ");
    }

    #[test]
    fn stale_value_is_refreshed() {
        let service = DateService::new_with_refresh_interval(Duration::ZERO);
        let first = service.current.load_full();
        service.http_date();
        assert!(!Arc::ptr_eq(&first, &service.current.load_full()));
    }

    #[test]
    fn header_value_is_produced() {
        let mut seen = None;
        DateService::get_global_instance().with_http_date(|value| seen = Some(value));
        assert!(seen.is_some());
    }
}
