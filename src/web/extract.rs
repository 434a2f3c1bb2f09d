use std::net::SocketAddr;

use hyper::Uri;
use hyper::header::{HeaderMap, ORIGIN, REFERER};
use url::{Url, form_urlencoded};

/// Header set by a fronting reverse proxy carrying the client address.
pub const REAL_IP: &str = "x-real-ip";

/// Client address, preferring `X-Real-IP` over the TCP peer.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get(REAL_IP)
        .and_then(|val| val.to_str().ok())
        .map(str::trim)
        .filter(|val| !val.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Domain a counting request comes from: the host of `Origin`, or of
/// `Referer` when no `Origin` was sent.
pub fn request_domain(headers: &HeaderMap) -> Option<String> {
    [ORIGIN, REFERER]
        .iter()
        .find_map(|name| {
            headers
                .get(name)
                .and_then(|val| val.to_str().ok())
                .filter(|val| !val.trim().is_empty())
        })
        .and_then(host_of)
}

/// `?domain=` of a read request, percent-decoded with `+` read as a space.
pub fn query_domain(uri: &Uri) -> Option<String> {
    form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, _)| key == "domain")
        .map(|(_, val)| val.trim().to_lowercase())
        .filter(|val| !val.is_empty())
}

/// Lower-cased host of an absolute URL, without port or IPv6 brackets.
///
/// Parsed as a WHATWG URL, so browser-sent values with unescaped characters
/// such as `"` in the query are still accepted.
pub fn host_of(url: &str) -> Option<String> {
    let url = Url::parse(url.trim()).ok()?;
    let host = url
        .host_str()?
        .trim_start_matches('[')
        .trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some(host.to_ascii_lowercase())
}
