use heapless::String as HeaplessString;

/// Copies `text` into a bounded string, cutting at the last char boundary that fits.
pub fn truncated<const N: usize>(text: &str) -> HeaplessString<N> {
    let mut out = HeaplessString::<N>::new();
    let mut end = text.len().min(N);
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    let _ = out.push_str(&text[..end]);
    out
}

/// Copies `text` into a bounded string, failing instead of truncating.
pub fn exact<const N: usize>(text: &str) -> Option<HeaplessString<N>> {
    let mut out = HeaplessString::<N>::new();
    out.push_str(text).ok()?;
    Some(out)
}

/// Compares two database paths ignoring a trailing slash.
pub fn same_path(a: &str, b: &str) -> bool {
    normalize_path(a) == normalize_path(b)
}

fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let out: HeaplessString<4> = truncated("abé€");
        assert_eq!(out.as_str(), "abé");

        let fits: HeaplessString<8> = truncated("relay");
        assert_eq!(fits.as_str(), "relay");
    }

    #[test]
    fn exact_rejects_overflow() {
        assert!(exact::<3>("abcd").is_none());
        assert_eq!(exact::<4>("abcd").as_deref(), Some("abcd"));
    }

    #[test]
    fn paths_compare_without_trailing_slash() {
        assert!(same_path("/control/relay", "/control/relay/"));
        assert!(same_path("/", ""));
        assert!(!same_path("/control/relay", "/control/relays"));
    }
}
