//! Minimal URL splitting for relay requests.
//!
//! The grammar is `[http://]host[:port][/path]` — scheme optional and
//! case-insensitive, port defaulting to 80, path defaulting to `/`.
//! The general-purpose `url` crate is not used because it rejects the
//! scheme-less form the emulator writes through its ports.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub host: String,
    pub port: u16,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("empty host")]
    EmptyHost,
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
}

/// Split a request URL into host, port, and path.
///
/// Port validation happens here, before any connection attempt: the
/// port must be 1..=65535 and consist of at least one digit.
pub fn parse_url(url: &str) -> Result<ParsedUrl, UrlError> {
    let rest = if url.len() >= 7 && url.as_bytes()[..7].eq_ignore_ascii_case(b"http://") {
        &url[7..]
    } else {
        url
    };

    let host_end = rest
        .find(|c| c == ':' || c == '/')
        .unwrap_or(rest.len());
    let host = &rest[..host_end];
    if host.is_empty() {
        return Err(UrlError::EmptyHost);
    }

    let mut tail = &rest[host_end..];
    let mut port = 80u16;

    if let Some(stripped) = tail.strip_prefix(':') {
        let digits_end = stripped
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(stripped.len());
        let digits = &stripped[..digits_end];

        let parsed = digits
            .parse::<u32>()
            .ok()
            .filter(|p| (1..=65_535).contains(p));
        port = match parsed {
            Some(p) => p as u16,
            None => return Err(UrlError::InvalidPort(url.to_string())),
        };
        tail = &stripped[digits_end..];
    }

    let path = if tail.starts_with('/') {
        tail.to_string()
    } else {
        "/".to_string()
    };

    Ok(ParsedUrl {
        host: host.to_string(),
        port,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url_with_port_and_path() {
        assert_eq!(
            parse_url("http://example.com:8080/a/b.txt").unwrap(),
            ParsedUrl {
                host: "example.com".into(),
                port: 8080,
                path: "/a/b.txt".into(),
            }
        );
    }

    #[test]
    fn scheme_is_optional_and_port_defaults_to_80() {
        assert_eq!(
            parse_url("example.com/b.txt").unwrap(),
            ParsedUrl {
                host: "example.com".into(),
                port: 80,
                path: "/b.txt".into(),
            }
        );
    }

    #[test]
    fn scheme_match_is_case_insensitive() {
        let parsed = parse_url("HTTP://example.com").unwrap();
        assert_eq!(parsed.host, "example.com");
        assert_eq!(parsed.path, "/");
    }

    #[test]
    fn out_of_range_port_is_rejected() {
        assert!(matches!(
            parse_url("example.com:99999"),
            Err(UrlError::InvalidPort(_))
        ));
    }

    #[test]
    fn port_zero_and_missing_digits_are_rejected() {
        assert!(matches!(
            parse_url("example.com:0/x"),
            Err(UrlError::InvalidPort(_))
        ));
        assert!(matches!(
            parse_url("example.com:/x"),
            Err(UrlError::InvalidPort(_))
        ));
    }

    #[test]
    fn missing_path_defaults_to_root() {
        let parsed = parse_url("example.com:8081").unwrap();
        assert_eq!(parsed.port, 8081);
        assert_eq!(parsed.path, "/");
    }

    #[test]
    fn empty_host_is_rejected() {
        assert_eq!(parse_url("http:///x"), Err(UrlError::EmptyHost));
        assert_eq!(parse_url(""), Err(UrlError::EmptyHost));
    }
}
