//! Domain ID generation and resolution
//!
//! All IDs use the format: `{8-char-hex}-{type}-{slug}`
//! Example: `3f9c2ab7-session-b1-german-food`

/// Generate a domain ID from type and a descriptive text
///
/// The hex prefix comes from the random tail of the UUID, not its
/// timestamp prefix: ids generated close together (a retried stage, two
/// sessions with the same prompt) must still differ.
pub fn generate_id(domain_type: &str, text: &str) -> String {
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    let hex_prefix = &uuid[24..32];
    let slug = slugify(text);
    format!("{}-{}-{}", hex_prefix, domain_type, slug)
}

/// Slugify a text fragment for use in IDs
fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None // Strip apostrophes (straight and curly)
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .take(6)
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(48)
        .collect()
}

/// Resolution of partial ID references (hex prefix or slug fragment)
pub struct IdResolver<'a> {
    ids: &'a [String],
}

impl<'a> IdResolver<'a> {
    pub fn new(ids: &'a [String]) -> Self {
        Self { ids }
    }

    /// Resolve a partial reference to a full ID
    ///
    /// Returns:
    /// - Ok(Some(id)) if exactly one match
    /// - Ok(None) if no matches
    /// - Err with candidates if ambiguous
    pub fn resolve(&self, reference: &str) -> Result<Option<String>, Vec<String>> {
        let matches: Vec<String> = self
            .ids
            .iter()
            .filter(|id| Self::matches(id, reference))
            .cloned()
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches.into_iter().next().unwrap())),
            _ => Err(matches),
        }
    }

    fn matches(id: &str, reference: &str) -> bool {
        if id == reference || id.starts_with(reference) {
            return true;
        }

        // Slug contains match
        if let Some(slug_start) = id.find('-') {
            let slug_part = &id[slug_start + 1..];
            if slug_part.contains(reference) {
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let id = generate_id("session", "5 B1 German exercises about food");
        assert!(id.len() > 10);
        assert!(id.contains("-session-"));
        assert!(id.contains("5-b1-german"));
    }

    #[test]
    fn test_generate_id_unique_for_same_text() {
        let a = generate_id("step", "validation s-1");
        let b = generate_id("step", "validation s-1");
        assert_ne!(a, b);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Multiple   Spaces"), "multiple-spaces");
        assert_eq!(slugify("don't stop"), "dont-stop");
        // Long prompts are truncated to the leading words
        let slug = slugify("one two three four five six seven eight");
        assert_eq!(slug, "one-two-three-four-five-six");
    }

    #[test]
    fn test_id_resolver_hex_prefix() {
        let ids = vec![
            "3f9c2ab7-session-b1-food".to_string(),
            "4d81e0c2-session-a2-travel".to_string(),
        ];
        let resolver = IdResolver::new(&ids);
        assert_eq!(resolver.resolve("3f9c2ab7").unwrap(), Some(ids[0].clone()));
    }

    #[test]
    fn test_id_resolver_slug_match() {
        let ids = vec![
            "3f9c2ab7-session-b1-food".to_string(),
            "4d81e0c2-session-a2-travel".to_string(),
        ];
        let resolver = IdResolver::new(&ids);
        assert_eq!(resolver.resolve("travel").unwrap(), Some(ids[1].clone()));
    }

    #[test]
    fn test_id_resolver_ambiguous() {
        let ids = vec![
            "3f9c2ab7-session-b1-food".to_string(),
            "4d81e0c2-session-b1-sport".to_string(),
        ];
        let resolver = IdResolver::new(&ids);
        let err = resolver.resolve("b1").unwrap_err();
        assert_eq!(err.len(), 2);
    }

    #[test]
    fn test_id_resolver_no_match() {
        let ids = vec!["3f9c2ab7-session-b1-food".to_string()];
        let resolver = IdResolver::new(&ids);
        assert_eq!(resolver.resolve("zzz").unwrap(), None);
    }
}
