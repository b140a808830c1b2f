//! Set-Cookie parsing.
//!
//! Some servers fold multiple Set-Cookie values into one comma-joined
//! header line, and cookie values themselves may contain commas (an
//! Expires date does). Splitting therefore only happens at `", "`
//! followed by a `token=` pattern.

use cookie::Cookie;

use crate::models::CookieInfo;

/// Splits a combined Set-Cookie value into individual cookie strings.
pub fn split_set_cookie(header: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let bytes = header.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b',' && i + 1 < bytes.len() && bytes[i + 1] == b' ' {
            // The comma and space are ASCII, so slicing here stays on
            // char boundaries.
            if starts_new_cookie(&header[i + 2..]) {
                let piece = header[start..i].trim();
                if !piece.is_empty() {
                    parts.push(piece.to_string());
                }
                start = i + 2;
                i += 2;
                continue;
            }
        }
        i += 1;
    }

    let piece = header[start..].trim();
    if !piece.is_empty() {
        parts.push(piece.to_string());
    }
    parts
}

/// True when the text opens with a `token=` cookie-name pattern.
fn starts_new_cookie(s: &str) -> bool {
    let mut seen_token = false;
    for c in s.chars() {
        match c {
            '=' => return seen_token,
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => seen_token = true,
            _ => return false,
        }
    }
    false
}

/// Parses one Set-Cookie header value into cookie records. Pieces the
/// cookie grammar rejects are dropped.
pub fn parse_set_cookie(header: &str) -> Vec<CookieInfo> {
    split_set_cookie(header)
        .into_iter()
        .filter_map(|piece| Cookie::parse(piece).ok())
        .map(|c| cookie_info(&c))
        .collect()
}

fn cookie_info(c: &Cookie<'_>) -> CookieInfo {
    CookieInfo {
        name: c.name().to_string(),
        value: c.value().to_string(),
        domain: c.domain().map(str::to_string),
        path: c.path().map(str::to_string),
        expires: c.expires_datetime().map(|t| t.unix_timestamp()),
        secure: c.secure().unwrap_or(false),
        http_only: c.http_only().unwrap_or(false),
    }
}
