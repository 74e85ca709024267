//! URL slugs
//!
//! Slugs are lowercase ASCII letters, digits and single hyphens. Uniqueness
//! is reached by suffixing `-2`, `-3`, ... until the slug is free.

use anyhow::Result;
use std::future::Future;

/// Generate a URL-friendly slug from a name.
///
/// Non-alphanumeric characters become hyphens; runs of hyphens collapse and
/// leading or trailing hyphens are dropped.
pub fn generate_slug(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut prev_hyphen = false;

    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c);
            prev_hyphen = false;
        } else if !prev_hyphen && !result.is_empty() {
            result.push('-');
            prev_hyphen = true;
        }
    }

    result.trim_end_matches('-').to_string()
}

/// Slug for `name` that `taken` reports as free.
///
/// `fallback` is used as the base when the name has no usable characters.
pub async fn unique_slug<F, Fut>(name: &str, fallback: &str, mut taken: F) -> Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let mut base = generate_slug(name);
    if base.is_empty() {
        base = fallback.to_string();
    }

    if !taken(base.clone()).await? {
        return Ok(base);
    }

    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(candidate.clone()).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Renewable Energy"), "renewable-energy");
        assert_eq!(generate_slug("  CO2 & You!  "), "co2-you");
        assert_eq!(generate_slug("solar__power--basics"), "solar-power-basics");
        assert_eq!(generate_slug("Écologie"), "cologie");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[tokio::test]
    async fn test_unique_slug_suffixes() {
        let existing: HashSet<String> = ["recycling", "recycling-2"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let slug = unique_slug("Recycling", "item", |s| {
            let found = existing.contains(&s);
            async move { Ok(found) }
        })
        .await
        .unwrap();
        assert_eq!(slug, "recycling-3");

        let slug = unique_slug("???", "tag", |_| async { Ok(false) }).await.unwrap();
        assert_eq!(slug, "tag");
    }

    proptest! {
        #[test]
        fn prop_slug_is_lowercase_hyphenated(name in ".{0,40}") {
            let slug = generate_slug(&name);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }
    }
}
