//! Hostname matching against pin-statement domain patterns.
//!
//! A pattern is either a literal host, compared ASCII case-insensitively, or
//! `*.suffix`, which covers exactly one additional non-empty label in front
//! of `suffix`. `*.example.com` therefore matches `api.example.com` but not
//! `example.com`, `a.b.example.com` or `evilexample.com`.

const WILDCARD_PREFIX: &str = "*.";

/// Does `pattern` cover `hostname`?
pub fn matches(hostname: &str, pattern: &str) -> bool {
    if hostname.is_empty() || pattern.is_empty() {
        return false;
    }

    let Some(suffix) = pattern.strip_prefix(WILDCARD_PREFIX) else {
        return hostname.eq_ignore_ascii_case(pattern);
    };

    // "*." alone, or a suffix that is itself empty-labelled, covers nothing.
    if suffix.is_empty() || suffix.starts_with('.') || suffix.contains('*') {
        return false;
    }

    // Need "<label>.<suffix>"; compare on bytes so a non-ASCII hostname
    // cannot split a character at the boundary.
    let host = hostname.as_bytes();
    let suffix_len = suffix.len();
    if host.len() < suffix_len + 2 {
        return false;
    }
    let split = host.len() - suffix_len;
    if host[split - 1] != b'.' || !host[split..].eq_ignore_ascii_case(suffix.as_bytes()) {
        return false;
    }

    let label = &host[..split - 1];
    !label.is_empty() && !label.contains(&b'.')
}

/// Is `pattern` a single-label wildcard?
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.starts_with(WILDCARD_PREFIX)
}
