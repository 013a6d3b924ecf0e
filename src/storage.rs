// src/storage.rs

//! Page persistence helpers.
//!
//! Hosts may block local storage or cookies. Every helper here catches that at
//! the point of use, logs a warning and does nothing; none of them return an
//! error.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::dom::PageStorage;

const SECONDS_PER_DAY: u64 = 86_400;

/// What `encodeURIComponent` escapes: everything but alphanumerics and ``-_.!~*'()``.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Merge `values` into the JSON object stored under `key`.
///
/// A missing entry starts from `{}`; an entry that is valid JSON but not an
/// object is replaced. An entry that is not JSON at all is left untouched.
pub fn update_local_storage_object<S: PageStorage + ?Sized>(
    storage: &S,
    key: &str,
    values: Map<String, Value>,
) {
    let existing = match storage.get_item(key) {
        Ok(existing) => existing,
        Err(err) => {
            warn!(key, error = %err, "local storage unavailable");
            return;
        }
    };

    let mut data = match existing.as_deref().map(serde_json::from_str::<Value>) {
        None => Map::new(),
        Some(Ok(Value::Object(map))) => map,
        Some(Ok(_)) => Map::new(),
        Some(Err(err)) => {
            warn!(key, error = %err, "stored value is not JSON; leaving it alone");
            return;
        }
    };
    data.extend(values);

    let encoded = Value::Object(data).to_string();
    if let Err(err) = storage.set_item(key, &encoded) {
        warn!(key, error = %err, "local storage unavailable");
        return;
    }
    debug!(key, "local storage object updated");
}

/// Read `field` of the JSON object under `key` as an integer.
///
/// Accepts numbers and numeric strings (`{"quality": "720"}`). Anything else,
/// including blocked storage, reads as `None`.
pub fn read_preference<S: PageStorage + ?Sized>(
    storage: &S,
    key: &str,
    field: &str,
) -> Option<i64> {
    let raw = match storage.get_item(key) {
        Ok(raw) => raw?,
        Err(err) => {
            warn!(key, error = %err, "local storage unavailable");
            return None;
        }
    };
    let value: Value = serde_json::from_str(&raw).ok()?;
    match value.get(field)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => leading_int(s),
        _ => None,
    }
}

/// Set a cookie for `days` days on path `/`. The value is URI-encoded.
pub fn set_cookie<S: PageStorage + ?Sized>(storage: &S, name: &str, value: &str, days: u64) {
    let cookie = format!(
        "{name}={}; max-age={}; path=/",
        utf8_percent_encode(value, URI_COMPONENT),
        max_age(days)
    );
    if let Err(err) = storage.set_cookie(&cookie) {
        warn!(name, error = %err, "cookies unavailable");
    }
}

/// Current value of cookie `name`, as stored (not decoded).
pub fn cookie_value<S: PageStorage + ?Sized>(storage: &S, name: &str) -> Option<String> {
    let all = match storage.cookie_string() {
        Ok(all) => all,
        Err(err) => {
            warn!(name, error = %err, "cookies unavailable");
            return None;
        }
    };
    all.split("; ")
        .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
        .map(str::to_string)
}

/// Re-store cookie `name` with its current value and a fresh `days` expiry.
/// Returns the value, or `None` if there was no such cookie.
pub fn copy_cookie<S: PageStorage + ?Sized>(storage: &S, name: &str, days: u64) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let value = cookie_value(storage, name)?;
    let cookie = format!("{name}={value}; max-age={}; path=/", max_age(days));
    if let Err(err) = storage.set_cookie(&cookie) {
        warn!(name, error = %err, "cookies unavailable");
    }
    Some(value)
}

/// Cookie lifetime in seconds; absurd day counts saturate instead of
/// overflowing.
fn max_age(days: u64) -> u64 {
    days.saturating_mul(SECONDS_PER_DAY)
}

/// Parse the leading integer of `s`, ignoring whatever follows it.
pub(crate) fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().ok()
}
