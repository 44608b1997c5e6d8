//! Small path and formatting helpers shared by discoverers and renderers.

/// Truncate to `max` characters, appending "..." when shortened.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Replace the home directory prefix with "~" for display.
pub fn shorten_home(path: &str) -> String {
    let Some(home) = dirs::home_dir() else {
        return path.to_string();
    };
    let Some(home) = home.to_str() else {
        return path.to_string();
    };
    match path.strip_prefix(home) {
        Some(rest) => format!("~{rest}"),
        None => path.to_string(),
    }
}

/// Convert a file:// URI to a local filesystem path, percent-decoded.
///
/// Returns None for other schemes or undecodable input. An authority
/// component ("file://localhost/x") is stripped.
pub fn uri_to_path(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("file://")?;
    let path = if rest.starts_with('/') {
        rest
    } else {
        &rest[rest.find('/')?..]
    };
    urlencoding::decode(path).ok().map(|decoded| decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_strings_intact() {
        assert_eq!(truncate("short", 28), "short");
        assert_eq!(truncate("", 10), "");
    }

    #[test]
    fn truncate_appends_ellipsis() {
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("abcdefghij", 10), "abcdefghij");
    }

    #[test]
    fn truncate_is_char_boundary_safe() {
        // Multi-byte input must not be sliced mid-codepoint.
        let s = "ドキュメント整理セッション";
        let out = truncate(s, 6);
        assert_eq!(out.chars().count(), 6);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn shorten_home_replaces_prefix() {
        if let Some(home) = dirs::home_dir().and_then(|h| h.to_str().map(String::from)) {
            assert_eq!(shorten_home(&format!("{home}/project")), "~/project");
            assert_eq!(shorten_home("/srv/elsewhere"), "/srv/elsewhere");
        }
    }

    #[test]
    fn uri_to_path_decodes_file_uris() {
        assert_eq!(
            uri_to_path("file:///home/dev/project").as_deref(),
            Some("/home/dev/project")
        );
        assert_eq!(
            uri_to_path("file:///home/dev/my%20project").as_deref(),
            Some("/home/dev/my project")
        );
        assert_eq!(
            uri_to_path("file://localhost/home/dev").as_deref(),
            Some("/home/dev")
        );
        assert_eq!(uri_to_path("https://example.com/x"), None);
        assert_eq!(uri_to_path("/plain/path"), None);
    }
}
