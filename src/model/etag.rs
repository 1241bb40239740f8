use chrono::Utc;

/// MD5 of the current time's textual representation, per spec §6. The
/// quoting/stripping dance for the wire happens at the edges
/// (`quoted`/`unquoted`), not here, so callers can compare raw values.
#[must_use]
pub fn generate() -> String {
    let now = Utc::now().to_rfc3339();
    format!("{:x}", md5::compute(now.as_bytes()))
}

#[must_use]
pub fn quoted(etag: &str) -> String {
    format!("\"{etag}\"")
}

#[must_use]
pub fn unquoted(etag: &str) -> &str {
    etag.trim_matches('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_round_trips() {
        let tag = generate();
        assert_eq!(unquoted(&quoted(&tag)), tag);
    }

    #[test]
    fn generate_is_32_hex_chars() {
        let tag = generate();
        assert_eq!(tag.len(), 32);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
