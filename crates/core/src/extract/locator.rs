//! Locator strings with embedded request headers (`url|Name=value&...`).

use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::Url;

static BTIH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)xt=urn:btih:([a-z0-9]{32,40})").unwrap());

pub fn is_magnet(uri: &str) -> bool {
    uri.trim_start().starts_with("magnet:")
}

/// Info hash of a magnet link, lowercased.
pub fn magnet_info_hash(uri: &str) -> Option<String> {
    if !is_magnet(uri) {
        return None;
    }
    BTIH.captures(uri)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Append headers to a locator. Magnet links and empty header lists are
/// returned unchanged.
pub fn append_headers(uri: &str, headers: &[(String, String)]) -> String {
    if headers.is_empty() || is_magnet(uri) {
        return uri.to_string();
    }
    let encoded: Vec<String> = headers
        .iter()
        .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
        .collect();
    format!("{}|{}", uri, encoded.join("&"))
}

/// Split a locator into the bare URL and its embedded headers.
pub fn split_headers(uri: &str) -> (&str, Vec<(String, String)>) {
    match uri.split_once('|') {
        Some((url, headers)) => (url, parse_headers(headers)),
        None => (uri, Vec::new()),
    }
}

/// Parse `Name=value&...` with percent-encoded values.
pub fn parse_headers(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| {
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            (name.to_string(), value)
        })
        .collect()
}

/// Resolve a possibly relative link against the page it was found on.
pub fn absolute_url(base: &str, link: &str) -> String {
    let link = link.trim();
    if link.is_empty() || is_magnet(link) {
        return link.to_string();
    }
    Url::parse(base)
        .and_then(|b| b.join(link))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| link.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<(String, String)> {
        vec![
            ("Cookie".to_string(), "uid=1; pass=a b".to_string()),
            ("User-Agent".to_string(), "trawl/1.0".to_string()),
        ]
    }

    #[test]
    fn test_append_and_split() {
        let uri = append_headers("https://t.example/dl/1.torrent", &headers());
        assert_eq!(
            uri,
            "https://t.example/dl/1.torrent|Cookie=uid%3D1%3B%20pass%3Da%20b&User-Agent=trawl%2F1.0"
        );

        let (url, parsed) = split_headers(&uri);
        assert_eq!(url, "https://t.example/dl/1.torrent");
        assert_eq!(parsed, headers());
    }

    #[test]
    fn test_magnet_never_gets_headers() {
        let magnet = "magnet:?xt=urn:btih:abc";
        assert_eq!(append_headers(magnet, &headers()), magnet);
    }

    #[test]
    fn test_magnet_info_hash() {
        let hash = "C9E15763F722F23E98A29DECDFAE341B98D53056";
        assert_eq!(
            magnet_info_hash(&format!("magnet:?xt=urn:btih:{}&dn=x", hash)),
            Some(hash.to_lowercase())
        );
        assert_eq!(magnet_info_hash("https://t.example/a.torrent"), None);
        assert_eq!(magnet_info_hash("magnet:?dn=nohash"), None);
    }

    #[test]
    fn test_split_without_headers() {
        let (url, parsed) = split_headers("https://t.example/x");
        assert_eq!(url, "https://t.example/x");
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(
            absolute_url("https://t.example/browse?q=x", "/go/123"),
            "https://t.example/go/123"
        );
        assert_eq!(
            absolute_url("https://t.example/browse/", "details.php?id=4"),
            "https://t.example/browse/details.php?id=4"
        );
        assert_eq!(
            absolute_url("https://t.example/", "https://cdn.example/a.torrent"),
            "https://cdn.example/a.torrent"
        );
        assert_eq!(absolute_url("https://t.example/", "magnet:?xt=1"), "magnet:?xt=1");
    }
}
