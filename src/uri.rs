use url::Url;

use crate::error::{JsonVetError, JsonVetResult};

/// Split a URI into its fragment-less base and optional fragment.
pub fn split_fragment(uri: &str) -> (&str, Option<&str>) {
    match uri.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (uri, None),
    }
}

/// Attach a fragment to a base URI. An empty fragment is dropped so that
/// `https://example.com` and `https://example.com#` key identically.
pub fn with_fragment(base: &str, fragment: &str) -> String {
    if fragment.is_empty() {
        base.to_string()
    } else {
        format!("{base}#{fragment}")
    }
}

/// Whether the given identifier is an absolute URI (has a scheme).
pub fn is_absolute(identifier: &str) -> bool {
    Url::parse(identifier).is_ok()
}

/// RFC 3986 resolution of a (possibly relative) identifier against an
/// optional base. Covers relative paths (`../foo`), absolute paths
/// (`/base`), and same-document fragments (`#foo`). Without a base an
/// absolute reference resolves to itself and a relative one is returned
/// verbatim, which is how anonymous schema resources keep fragment-only
/// identifiers.
pub fn resolve(base: Option<&str>, reference: &str) -> JsonVetResult<String> {
    if let Ok(url) = Url::parse(reference) {
        return Ok(normalize(url));
    }

    match base {
        Some(base) if !base.is_empty() => {
            let base_url = Url::parse(base)
                .map_err(|_| JsonVetError::InvalidUri(base.to_string()))?;
            let joined = base_url
                .join(reference)
                .map_err(|_| JsonVetError::InvalidUri(reference.to_string()))?;
            Ok(normalize(joined))
        }
        _ => Ok(reference.to_string()),
    }
}

fn normalize(url: Url) -> String {
    let mut result = url.to_string();
    if result.ends_with('#') {
        result.pop();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_forms() {
        let base = Some("https://example.com/nested/schema.json");
        assert_eq!(
            resolve(base, "../foo").unwrap(),
            "https://example.com/foo"
        );
        assert_eq!(resolve(base, "/base").unwrap(), "https://example.com/base");
        assert_eq!(
            resolve(base, "#foo").unwrap(),
            "https://example.com/nested/schema.json#foo"
        );
        assert_eq!(
            resolve(base, "https://other.example.com/x").unwrap(),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn anonymous_base_keeps_relative_identifiers() {
        assert_eq!(resolve(None, "#/properties/foo").unwrap(), "#/properties/foo");
    }
}
