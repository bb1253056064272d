use crate::UrlError;
use url::Url;

/// Normalizes a product URL into its identity form
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an http or https scheme
/// 3. Lowercase the host (the `www.` label is kept, seller prefixes depend on it)
/// 4. Normalize path:
///    - Remove dot segments and repeated slashes
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 5. Remove the fragment
/// 6. Remove the query string; product identity never lives in query parameters
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
///
/// # Examples
///
/// ```
/// use shelf_scout::url::normalize_url;
///
/// let url = normalize_url("https://WWW.Tesco.com/groceries/en-GB/products/123/?ref=nav").unwrap();
/// assert_eq!(url.as_str(), "https://www.tesco.com/groceries/en-GB/products/123");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?.to_lowercase();
    if host.is_empty() {
        return Err(UrlError::MissingDomain);
    }
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);
    url.set_query(None);

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_www() {
        let result = normalize_url("https://www.sainsburys.co.uk/gol-ui/product/milk").unwrap();
        assert_eq!(
            result.as_str(),
            "https://www.sainsburys.co.uk/gol-ui/product/milk"
        );
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = normalize_url("https://groceries.asda.com/product/milk/123/").unwrap();
        assert_eq!(result.as_str(), "https://groceries.asda.com/product/milk/123");
    }

    #[test]
    fn test_keep_root_slash() {
        let result = normalize_url("https://groceries.asda.com/").unwrap();
        assert_eq!(result.as_str(), "https://groceries.asda.com/");
    }

    #[test]
    fn test_empty_path_becomes_root() {
        let result = normalize_url("https://groceries.asda.com").unwrap();
        assert_eq!(result.as_str(), "https://groceries.asda.com/");
    }

    #[test]
    fn test_remove_fragment_and_query() {
        let result =
            normalize_url("https://groceries.asda.com/product/milk/123?sku=1&utm_source=x#reviews")
                .unwrap();
        assert_eq!(result.as_str(), "https://groceries.asda.com/product/milk/123");
    }

    #[test]
    fn test_lowercase_host_only() {
        let result = normalize_url("https://GROCERIES.ASDA.COM/Product/Milk/123").unwrap();
        assert_eq!(result.as_str(), "https://groceries.asda.com/Product/Milk/123");
    }

    #[test]
    fn test_collapse_slashes_and_dots() {
        let result = normalize_url("https://groceries.asda.com//product/./x/../milk//123").unwrap();
        assert_eq!(result.as_str(), "https://groceries.asda.com/product/milk/123");
    }

    #[test]
    fn test_surrounding_whitespace() {
        let result = normalize_url("  https://groceries.asda.com/product/milk/123\n").unwrap();
        assert_eq!(result.as_str(), "https://groceries.asda.com/product/milk/123");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://groceries.asda.com/product");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_malformed_url() {
        assert!(matches!(normalize_url("not a url"), Err(UrlError::Parse(_))));
        assert!(normalize_url("/product/milk/123").is_err());
    }

    #[test]
    fn test_idempotent() {
        let once = normalize_url("https://WWW.TESCO.COM/groceries/en-GB/products/1/?x=1").unwrap();
        let twice = normalize_url(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }
}
