/// Sanitizes a tag to upstream's accepted alphabet: `[a-zA-Z0-9_]`. Hyphens
/// are stripped (not replaced), spaces become underscores, everything else
/// is dropped.
pub fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .filter_map(|c| {
            if c == '-' {
                None
            } else if c == ' ' {
                Some('_')
            } else if c.is_ascii_alphanumeric() || c == '_' {
                Some(c)
            } else {
                None
            }
        })
        .collect()
}

/// Sanitizes every tag in `tags`, dropping any that become empty.
pub fn sanitize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|t| sanitize_tag(t))
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_hyphens_without_leaving_a_gap() {
        assert_eq!(sanitize_tag("sci-fi"), "scifi");
    }

    #[test]
    fn spaces_become_underscores() {
        assert_eq!(sanitize_tag("digital art"), "digital_art");
    }

    #[test]
    fn drops_unsupported_punctuation() {
        assert_eq!(sanitize_tag("#trending!"), "trending");
    }

    #[test]
    fn preserves_already_clean_tags() {
        assert_eq!(sanitize_tag("fantasy_art_2024"), "fantasy_art_2024");
    }

    #[test]
    fn sanitize_tags_drops_entries_that_become_empty() {
        let tags = vec!["---".to_string(), "ok".to_string(), "!!!".to_string()];
        assert_eq!(sanitize_tags(&tags), vec!["ok".to_string()]);
    }

    proptest! {
        #[test]
        fn sanitized_output_only_ever_contains_the_accepted_alphabet(s in ".*") {
            let sanitized = sanitize_tag(&s);
            prop_assert!(sanitized.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }

        #[test]
        fn sanitizing_is_idempotent(s in ".*") {
            let once = sanitize_tag(&s);
            let twice = sanitize_tag(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
