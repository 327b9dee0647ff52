//! Case-insensitive entry name filter.

/// Matches entry names against a pattern.
///
/// A pattern without `*` matches any name containing it. With `*`, the
/// pattern must match the whole name, each `*` standing for any run of
/// characters. `/` in the pattern matches the `\` separator of entry names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameFilter {
    pattern: String,
    parts: Option<Vec<String>>,
}

impl NameFilter {
    pub fn new(pattern: &str) -> Self {
        let pattern = pattern.replace('/', "\\").to_lowercase();
        let parts = pattern
            .contains('*')
            .then(|| pattern.split('*').map(str::to_string).collect());
        Self { pattern, parts }
    }

    /// The normalized pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        let Some(parts) = &self.parts else {
            return name.contains(&self.pattern);
        };

        let (first, rest) = match parts.split_first() {
            Some(split) => split,
            None => return true,
        };
        let Some(mut tail) = name.strip_prefix(first.as_str()) else {
            return false;
        };

        let Some((last, middle)) = rest.split_last() else {
            return tail.is_empty();
        };
        for part in middle {
            match tail.find(part.as_str()) {
                Some(found) => tail = &tail[found + part.len()..],
                None => return false,
            }
        }
        tail.ends_with(last.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring() {
        let filter = NameFilter::new("Logo");
        assert!(filter.matches("gfx\\ui\\logo.png"));
        assert!(!filter.matches("gfx\\ui\\icon.png"));
    }

    #[test]
    fn test_wildcards() {
        let filter = NameFilter::new("*.xml");
        assert!(filter.matches("data\\a.XML"));
        assert!(!filter.matches("data\\a.xml.bak"));

        let filter = NameFilter::new("gfx/*/*.dds");
        assert!(filter.matches("gfx\\ui\\x.dds"));
        assert!(!filter.matches("sfx\\ui\\x.dds"));

        let filter = NameFilter::new("a*a");
        assert!(filter.matches("aba"));
        assert!(!filter.matches("a"));
    }

    #[test]
    fn test_star_only() {
        let filter = NameFilter::new("*");
        assert!(filter.matches("anything"));
        assert!(filter.matches(""));
    }
}
