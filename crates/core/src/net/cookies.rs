//! Cookie jar that can be exported to and restored from a session store.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use cookie::time::OffsetDateTime;
use cookie_store::{CookieDomain, CookieExpiration, RawCookie};
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::Url;
use tracing::debug;

use crate::session::StoredCookie;

/// Per-source cookie jar.
///
/// Backed by [`cookie_store::CookieStore`], which applies the RFC 6265
/// storage rules (domain matching, path, `Secure`, `Expires`/`Max-Age`).
/// Implements reqwest's [`CookieStore`] so reqwest fills it from
/// `Set-Cookie` headers, while still letting the worker read and persist
/// its content.
#[derive(Debug, Default)]
pub struct SessionJar {
    store: Mutex<cookie_store::CookieStore>,
}

impl SessionJar {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, cookie_store::CookieStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store one `Set-Cookie` header received in a response from `url`.
    pub fn store_set_cookie(&self, header: &str, url: &Url) {
        match RawCookie::parse(header) {
            Ok(cookie) => {
                let cookie = cookie.into_owned();
                self.lock()
                    .store_response_cookies(std::iter::once(cookie), url);
            }
            Err(e) => debug!(url = %url, error = %e, "Ignoring malformed Set-Cookie"),
        }
    }

    /// `name=value; ...` for unexpired cookies a request to `url` would carry.
    pub fn header_for_url(&self, url: &Url) -> Option<String> {
        let store = self.lock();
        let pairs: Vec<String> = store
            .matches(url)
            .into_iter()
            .map(|c| format!("{}={}", c.name(), c.value()))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    /// `name=value; ...` for unexpired cookies whose domain contains
    /// `fragment` (with any leading `www.` removed).
    pub fn header_matching(&self, fragment: &str) -> Option<String> {
        let fragment = fragment.trim_start_matches("www.").to_lowercase();
        let store = self.lock();
        let pairs: Vec<String> = store
            .iter_unexpired()
            .filter(|c| {
                c.domain
                    .as_cow()
                    .is_some_and(|domain| domain.contains(fragment.as_str()))
            })
            .map(|c| format!("{}={}", c.name(), c.value()))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    /// Unexpired cookies, session cookies included.
    pub fn export(&self) -> Vec<StoredCookie> {
        self.lock()
            .iter_unexpired()
            .filter_map(|c| {
                let domain = c.domain.as_cow()?.into_owned();
                let expires = match c.expires {
                    CookieExpiration::AtUtc(at) => {
                        DateTime::<Utc>::from_timestamp(at.unix_timestamp(), 0)
                    }
                    CookieExpiration::SessionEnd => None,
                };
                Some(StoredCookie {
                    domain,
                    name: c.name().to_string(),
                    value: c.value().to_string(),
                    path: String::from(&c.path),
                    host_only: matches!(c.domain, CookieDomain::HostOnly(_)),
                    secure: c.secure().unwrap_or(false),
                    expires,
                })
            })
            .collect()
    }

    /// Restore persisted cookies; ones that expired meanwhile are skipped.
    pub fn import(&self, cookies: &[StoredCookie]) {
        let now = Utc::now();
        let mut store = self.lock();
        for stored in cookies {
            if stored.expires.is_some_and(|at| at <= now) {
                continue;
            }
            let Ok(url) = Url::parse(&format!("https://{}{}", stored.domain, stored.path)) else {
                debug!(domain = %stored.domain, "Skipping cookie with unusable domain");
                continue;
            };

            let mut builder = RawCookie::build((stored.name.clone(), stored.value.clone()))
                .path(stored.path.clone())
                .secure(stored.secure);
            if !stored.host_only {
                builder = builder.domain(stored.domain.clone());
            }
            if let Some(at) = stored
                .expires
                .and_then(|at| OffsetDateTime::from_unix_timestamp(at.timestamp()).ok())
            {
                builder = builder.expires(at);
            }

            if let Err(e) = store.insert_raw(&builder.build(), &url) {
                debug!(name = %stored.name, error = %e, "Rejected persisted cookie");
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock().iter_unexpired().next().is_none()
    }
}

impl CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let cookies = cookie_headers
            .filter_map(|header| header.to_str().ok())
            .filter_map(|value| RawCookie::parse(value).ok())
            .map(RawCookie::into_owned)
            .collect::<Vec<_>>();
        self.lock().store_response_cookies(cookies.into_iter(), url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self.header_for_url(url)?;
        HeaderValue::from_str(&header).ok()
    }
}
