use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, TimeDelta, Utc};

use crate::error::WebbyError;

const ONE_YEAR_SECS: i64 = 31_536_000;

/// `Expires`/`Pragma`/`Cache-Control` for responses that change with the repository.
pub fn no_cache(headers: &mut HeaderMap) {
    headers.insert(
        header::EXPIRES,
        HeaderValue::from_static("Fri, 01 Jan 1980 00:00:00 GMT"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, max-age=0, must-revalidate"),
    );
}

/// Objects and packs are content addressed and never change.
pub fn cache_forever(headers: &mut HeaderMap) -> Result<(), WebbyError> {
    let now = Utc::now();
    headers.insert(header::DATE, http_date(now)?);
    headers.insert(
        header::EXPIRES,
        http_date(now + TimeDelta::seconds(ONE_YEAR_SECS))?,
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000"),
    );
    Ok(())
}

pub fn http_date(at: DateTime<Utc>) -> Result<HeaderValue, WebbyError> {
    Ok(HeaderValue::from_str(
        &at.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_rfc_7231_dates() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(http_date(at).unwrap(), "Tue, 05 Mar 2024 07:08:09 GMT");
    }

    #[test]
    fn cache_headers() {
        let mut headers = HeaderMap::new();
        no_cache(&mut headers);
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-cache, max-age=0, must-revalidate"
        );

        let mut headers = HeaderMap::new();
        cache_forever(&mut headers).unwrap();
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=31536000");
        assert!(headers.contains_key(header::DATE));
        assert_ne!(headers[header::EXPIRES], headers[header::DATE]);
    }
}
