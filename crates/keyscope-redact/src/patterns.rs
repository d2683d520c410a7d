//! Masking passes
//!
//! Each pass takes text and returns the rewritten text together with the
//! number of spans it masked. The mask never matches any pass, which is what
//! makes redaction idempotent.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Replacement for every masked span
pub const MASK: &str = "[REDACTED]";

/// Minimum length of a token considered by the entropy pass
const HIGH_ENTROPY_MIN_LEN: usize = 32;

/// Key names whose values are always sensitive, as a regex alternation
const SENSITIVE_KEYWORDS: &str = concat!(
    r"password|passwd|pwd|secret|token|api[_\-\s]?key|apikey|",
    r"access[_\-\s]?key|private[_\-\s]?key|client[_\-\s]?secret|credentials?",
);

// `db_password = x`, `"apiKey": "x"`, `SECRET_KEY:x`, `password_hash=x`
static SENSITIVE_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)(\b(?:[a-z0-9]+[_\-.])*(?:{})(?:[_\-.][a-z0-9]+)*)(["']?\s*[:=]\s*)("[^"]*"?|'[^']*'?|[^\s,;&"'}})]+)"#,
        SENSITIVE_KEYWORDS
    ))
    .expect("sensitive pair pattern is valid")
});

// A bare key name such as a hash field or stream field
static SENSITIVE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:[a-z0-9]+[_\-.])*(?:{})(?:[_\-.][a-z0-9]+)*$",
        SENSITIVE_KEYWORDS
    ))
    .expect("sensitive name pattern is valid")
});

static JWT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}\b")
        .expect("jwt pattern is valid")
});

static BEARER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(bearer)(\s+)([A-Za-z0-9\-._~+/]+=*)").expect("bearer pattern is valid")
});

static ENTROPY_CANDIDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("[A-Za-z0-9_-]{{{},}}", HIGH_ENTROPY_MIN_LEN))
        .expect("entropy pattern is valid")
});

/// Mask the value of sensitive key/value pairs, keeping its quotes
pub(crate) fn mask_sensitive_pairs(text: &str) -> (String, usize) {
    let mut count = 0;
    let out = SENSITIVE_PAIR.replace_all(text, |caps: &Captures| {
        let value = &caps[3];
        let (open, inner, close) = split_quotes(value);
        if inner.is_empty() || inner == MASK {
            return caps[0].to_string();
        }
        count += 1;
        format!("{}{}{}{}{}", &caps[1], &caps[2], open, MASK, close)
    });
    (out.into_owned(), count)
}

/// True when `name` on its own marks its value as a secret
pub(crate) fn is_sensitive_name(name: &str) -> bool {
    SENSITIVE_NAME.is_match(name.trim())
}

/// Mask three-segment base64url tokens
pub(crate) fn mask_jwts(text: &str) -> (String, usize) {
    let mut count = 0;
    let out = JWT.replace_all(text, |_: &Captures| {
        count += 1;
        MASK.to_string()
    });
    (out.into_owned(), count)
}

/// Mask the credential after `Bearer`
pub(crate) fn mask_bearer_tokens(text: &str) -> (String, usize) {
    let mut count = 0;
    let out = BEARER.replace_all(text, |caps: &Captures| {
        count += 1;
        format!("{}{}{}", &caps[1], &caps[2], MASK)
    });
    (out.into_owned(), count)
}

/// Mask long tokens that mix upper case, lower case and digits
pub(crate) fn mask_high_entropy(text: &str) -> (String, usize) {
    let mut count = 0;
    let out = ENTROPY_CANDIDATE.replace_all(text, |caps: &Captures| {
        let token = &caps[0];
        if !looks_high_entropy(token) {
            return token.to_string();
        }
        count += 1;
        MASK.to_string()
    });
    (out.into_owned(), count)
}

fn looks_high_entropy(token: &str) -> bool {
    if token.contains(MASK) || token.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let mut bytes = token.bytes();
    if let Some(first) = bytes.next()
        && bytes.all(|b| b == first)
    {
        return false;
    }

    token.bytes().any(|b| b.is_ascii_uppercase())
        && token.bytes().any(|b| b.is_ascii_lowercase())
        && token.bytes().any(|b| b.is_ascii_digit())
}

// A value cut short by truncation may have lost its closing quote
fn split_quotes(value: &str) -> (&str, &str, &str) {
    for quote in ["\"", "'"] {
        if let Some(rest) = value.strip_prefix(quote) {
            return match rest.strip_suffix(quote) {
                Some(inner) => (quote, inner, quote),
                None => (quote, rest, ""),
            };
        }
    }
    ("", value, "")
}
