// Origin allow-list

use reqwest::Url;
use std::collections::HashSet;
use thiserror::Error;

/// Rejected allow-list entry
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OriginError {
    #[error("Invalid origin '{0}': not an absolute URL")]
    Unparseable(String),

    #[error("Invalid origin '{0}': opaque origins cannot be allow-listed")]
    Opaque(String),

    #[error("Invalid origin '{0}': origins must not carry a path, query or fragment")]
    NotAnOrigin(String),
}

/// Set of origins permitted to talk to the relay.
///
/// Entries are stored in ASCII serialization (`scheme://host[:port]`, default
/// ports elided), which is the form a browser reports in `MessageEvent.origin`.
/// Incoming origins are compared byte for byte against that form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    origins: HashSet<String>,
}

impl AllowList {
    /// Build an allow-list, rejecting entries that are not plain origins
    pub fn parse<I, S>(entries: I) -> Result<Self, OriginError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut origins = HashSet::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            origins.insert(serialize_origin(entry)?);
        }
        Ok(Self { origins })
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.origins.contains(origin)
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.origins.iter().map(String::as_str)
    }
}

fn serialize_origin(entry: &str) -> Result<String, OriginError> {
    let url = Url::parse(entry).map_err(|_| OriginError::Unparseable(entry.to_string()))?;

    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(OriginError::Opaque(entry.to_string()));
    }

    // A trailing slash is tolerated; anything more is a full URL, not an origin
    if (url.path() != "/" && !url.path().is_empty())
        || url.query().is_some()
        || url.fragment().is_some()
        || !url.username().is_empty()
        || url.password().is_some()
    {
        return Err(OriginError::NotAnOrigin(entry.to_string()));
    }

    Ok(origin.ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_entries() {
        let list = AllowList::parse([
            "https://App.Example.com/",
            "http://localhost:3000",
            "https://example.org:443",
        ])
        .unwrap();

        assert_eq!(list.len(), 3);
        assert!(list.contains("https://app.example.com"));
        assert!(list.contains("http://localhost:3000"));
        // Default port is elided, as browsers do
        assert!(list.contains("https://example.org"));
    }

    #[test]
    fn test_exact_match_only() {
        let list = AllowList::parse(["https://example.com"]).unwrap();

        assert!(list.contains("https://example.com"));
        assert!(!list.contains("http://example.com"));
        assert!(!list.contains("https://example.com:8443"));
        assert!(!list.contains("https://evil.example.com"));
        assert!(!list.contains("https://example.com.evil.net"));
        assert!(!list.contains("https://example.com/"));
        assert!(!list.contains("null"));
        assert!(!list.contains("*"));
    }

    #[test]
    fn test_blank_entries_are_skipped() {
        let list = AllowList::parse(["", "  ", "https://example.com"]).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_rejects_wildcard_and_garbage() {
        assert_eq!(
            AllowList::parse(["*"]),
            Err(OriginError::Unparseable("*".to_string()))
        );
        assert_eq!(
            AllowList::parse(["example.com"]),
            Err(OriginError::Unparseable("example.com".to_string()))
        );
    }

    #[test]
    fn test_rejects_opaque_origins() {
        assert!(matches!(
            AllowList::parse(["data:text/plain,hi"]),
            Err(OriginError::Opaque(_))
        ));
    }

    #[test]
    fn test_rejects_full_urls() {
        assert!(matches!(
            AllowList::parse(["https://example.com/login"]),
            Err(OriginError::NotAnOrigin(_))
        ));
        assert!(matches!(
            AllowList::parse(["https://example.com/?next=1"]),
            Err(OriginError::NotAnOrigin(_))
        ));
        assert!(matches!(
            AllowList::parse(["https://user:pw@example.com"]),
            Err(OriginError::NotAnOrigin(_))
        ));
    }

    #[test]
    fn test_empty_list_allows_nothing() {
        let list = AllowList::default();
        assert!(list.is_empty());
        assert!(!list.contains("https://example.com"));
    }
}
