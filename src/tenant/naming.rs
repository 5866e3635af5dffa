/// Maximum identifier length; matches the PostgreSQL/MySQL identifier limit.
pub const MAX_NAME_LEN: usize = 63;

/// Validate a tenant identifier: 1-63 chars of lowercase alphanumerics, `-` and `_`,
/// starting with an alphanumeric. Identifiers become database and file names.
pub fn is_valid_name(name: &str) -> bool {
    let len = name.len();
    if !(1..=MAX_NAME_LEN).contains(&len) {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Validate a routing alias (hostname): lowercase alphanumerics, `-` and `.`,
/// no empty labels.
pub fn is_valid_alias(alias: &str) -> bool {
    if alias.is_empty() || alias.len() > 253 {
        return false;
    }
    alias.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    })
}

/// Normalise a hostname attribute for alias lookup: lowercase, strip port.
pub fn normalize_alias(raw: &str) -> String {
    let host = raw.trim();
    let host = match host.rsplit_once(':') {
        Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h,
        _ => host,
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        assert!(is_valid_name("acme"));
        assert!(is_valid_name("a"));
        assert!(is_valid_name("tenant_01"));
        assert!(is_valid_name("my-shop"));
    }

    #[test]
    fn rejects_unsafe_names() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Acme"));
        assert!(!is_valid_name("-lead"));
        assert!(!is_valid_name("../etc"));
        assert!(!is_valid_name("a b"));
        assert!(!is_valid_name("quote\"d"));
        assert!(!is_valid_name(&"x".repeat(MAX_NAME_LEN + 1)));
    }

    #[test]
    fn alias_rules() {
        assert!(is_valid_alias("acme.example.com"));
        assert!(is_valid_alias("localhost"));
        assert!(!is_valid_alias("acme..com"));
        assert!(!is_valid_alias("-acme.com"));
        assert!(!is_valid_alias("ACME.com"));
        assert!(!is_valid_alias(""));
    }

    #[test]
    fn normalize_strips_port_and_case() {
        assert_eq!(normalize_alias("Acme.Example.com:8443"), "acme.example.com");
        assert_eq!(normalize_alias(" acme.example.com. "), "acme.example.com");
        assert_eq!(normalize_alias("acme"), "acme");
    }
}
