use unicode_general_category::{GeneralCategory, get_general_category};

/// Normalizes a key or scope into its stored identity.
///
/// The input is lower-cased and every run of non-alphanumeric characters becomes a
/// single `_`. Runs at either end are dropped, so `"Hello World!"` and `"hello_world"`
/// name the same entry. Combining marks count as alphanumeric: a decomposed `"café"`
/// keeps its accent and stays distinct from `"cafe"`.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for ch in raw.chars() {
        if is_identity_char(ch) {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    out
}

fn is_identity_char(ch: char) -> bool {
    ch.is_alphanumeric()
        || matches!(
            get_general_category(ch),
            GeneralCategory::NonspacingMark
                | GeneralCategory::SpacingMark
                | GeneralCategory::EnclosingMark
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases() {
        assert_eq!(normalize("HelloWorld"), "helloworld");
    }

    #[test]
    fn normalize_collapses_runs() {
        let inputs = vec![
            ("hello world", "hello_world"),
            ("hello -- world", "hello_world"),
            ("hello_world", "hello_world"),
            ("a.b/c", "a_b_c"),
            ("My-Scope", "my_scope"),
        ];

        for (raw, expected) in inputs {
            assert_eq!(normalize(raw), expected, "input: {raw:?}");
        }
    }

    #[test]
    fn normalize_trims_edges() {
        assert_eq!(normalize("Hello World!"), "hello_world");
        assert_eq!(normalize("  __key__  "), "key");
    }

    #[test]
    fn normalize_unicode_alphanumerics() {
        assert_eq!(normalize("Ünïcödé Kéy"), "ünïcödé_kéy");
        assert_eq!(normalize("ключ 42"), "ключ_42");
    }

    #[test]
    fn normalize_keeps_combining_marks() {
        assert_eq!(normalize("Cafe\u{301}"), "cafe\u{301}");
        assert_ne!(normalize("cafe\u{301}"), normalize("cafe"));
        assert_eq!(normalize("e\u{301} x"), "e\u{301}_x");
    }

    #[test]
    fn normalize_separators_only() {
        assert_eq!(normalize("!!!"), "");
        assert_eq!(normalize(""), "");
    }
}
