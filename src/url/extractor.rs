use crate::seller::SellerRegistry;
use crate::url::normalize_url;
use crate::{ConfigError, ConfigResult};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use tracing::trace;
use url::Url;

/// How one seller encodes product links
#[derive(Debug, Clone)]
pub struct ProductUrlRule {
    pub seller: String,
    base: Url,
    pattern: Regex,
}

impl ProductUrlRule {
    /// Compiles a rule
    ///
    /// # Arguments
    ///
    /// * `seller` - Seller identifier
    /// * `base` - Absolute URL that matched paths are joined onto
    /// * `pattern` - Regex whose whole match is a product path (`/product/...`)
    pub fn new(seller: &str, base: &str, pattern: &str) -> ConfigResult<Self> {
        let invalid = |message: String| ConfigError::InvalidPattern {
            seller: seller.to_string(),
            message,
        };

        let base = Url::parse(base).map_err(|e| invalid(format!("bad base URL: {}", e)))?;
        let pattern = Regex::new(pattern).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            seller: seller.to_string(),
            base,
            pattern,
        })
    }

    /// Every product URL referenced in `content`, normalized
    ///
    /// Matches that cannot be turned into a valid URL are skipped.
    pub fn extract(&self, content: &str) -> BTreeSet<String> {
        self.pattern
            .find_iter(content)
            .filter_map(|m| self.base.join(m.as_str()).ok())
            .filter_map(|joined| normalize_url(joined.as_str()).ok())
            .map(String::from)
            .collect()
    }
}

/// Maps rendered page content to the product URLs it references
///
/// The extractor is a pure function of its input: the same content always yields
/// the same set, whatever order the links appear in. Broken or truncated markup
/// only yields fewer matches, since the rules scan raw text rather than a DOM.
///
/// # Examples
///
/// ```
/// use shelf_scout::url::UrlExtractor;
///
/// let mut extractor = UrlExtractor::new();
/// extractor.add_rule("asda", "https://groceries.asda.com/", r"/product/[\-/a-zA-Z0-9]+").unwrap();
///
/// let html = r#"<a href="/product/milk/910000">Milk</a><a href="/product/milk/910000/">"#;
/// let urls = extractor.extract("asda", html).unwrap();
/// assert_eq!(urls.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct UrlExtractor {
    rules: HashMap<String, ProductUrlRule>,
}

impl UrlExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one rule per registered seller
    pub fn from_registry(registry: &SellerRegistry) -> ConfigResult<Self> {
        let mut extractor = Self::new();
        for profile in registry.profiles() {
            extractor.add_rule(profile.name, profile.base_url, profile.product_pattern)?;
        }
        Ok(extractor)
    }

    /// Adds or replaces the rule for one seller, leaving the others untouched
    pub fn add_rule(&mut self, seller: &str, base: &str, pattern: &str) -> ConfigResult<()> {
        let rule = ProductUrlRule::new(seller, base, pattern)?;
        self.rules.insert(seller.to_string(), rule);
        Ok(())
    }

    pub fn has_rule(&self, seller: &str) -> bool {
        self.rules.contains_key(seller)
    }

    /// Extracts the set of product URLs in `content` for `seller`
    ///
    /// # Returns
    ///
    /// * `Ok(BTreeSet<String>)` - Normalized product URLs, possibly empty
    /// * `Err(ConfigError::UnknownSeller)` - No rule is registered for the seller
    pub fn extract(&self, seller: &str, content: &str) -> ConfigResult<BTreeSet<String>> {
        let rule = self
            .rules
            .get(seller)
            .ok_or_else(|| ConfigError::UnknownSeller(seller.to_string()))?;

        let urls = rule.extract(content);
        trace!("Extracted {} product URLs for {}", urls.len(), seller);
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> UrlExtractor {
        UrlExtractor::from_registry(&SellerRegistry::builtin().unwrap()).unwrap()
    }

    #[test]
    fn test_distinct_links_with_duplicates() {
        let extractor = builtin();
        let html = r#"
            <a href="/product/milk/asda-semi-skimmed/910000">Milk</a>
            <a href="https://groceries.asda.com/product/milk/asda-semi-skimmed/910000">Milk</a>
            <a href="/product/bread/hovis-wholemeal/910001/">Bread</a>
            <a href="/product/bread/hovis-wholemeal/910001#reviews">Reviews</a>
            <a href="/product/eggs/free-range/910002">Eggs</a>
            <a href="/cat/dairy/1215">Dairy</a>
        "#;

        let urls = extractor.extract("asda", html).unwrap();
        assert_eq!(urls.len(), 3);
        assert!(urls.contains("https://groceries.asda.com/product/milk/asda-semi-skimmed/910000"));
        assert!(urls.contains("https://groceries.asda.com/product/bread/hovis-wholemeal/910001"));
        assert!(urls.contains("https://groceries.asda.com/product/eggs/free-range/910002"));
    }

    #[test]
    fn test_order_independent() {
        let extractor = builtin();
        let links = [
            r#"<a href="/groceries/en-GB/products/300">"#,
            r#"<a href="/groceries/en-GB/products/100">"#,
            r#"<a href="/groceries/en-GB/products/200">"#,
            r#"<a href="/groceries/en-GB/products/100?sc_cmp=x">"#,
        ];
        let forward = links.concat();
        let backward: String = links.iter().rev().copied().collect();

        let a = extractor.extract("tesco", &forward).unwrap();
        let b = extractor.extract("tesco", &backward).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_links_inside_inline_json() {
        let extractor = builtin();
        let content = r#"<script>window.__STATE__={"items":[{"href":"/gol-ui/product/js-bananas"}]}</script>"#;
        let urls = extractor.extract("sainsburys", content).unwrap();
        assert!(urls.contains("https://www.sainsburys.co.uk/gol-ui/product/js-bananas"));
    }

    #[test]
    fn test_malformed_markup_degrades() {
        let extractor = builtin();
        let content = r#"<div><a href="/products/morrisons-milk/111"><span>unterminated <a href="/products/"#;
        let urls = extractor.extract("morrisons", content).unwrap();
        assert_eq!(urls.len(), 1);

        assert!(extractor.extract("morrisons", "").unwrap().is_empty());
        assert!(extractor.extract("morrisons", "<<<>>>\u{0}").unwrap().is_empty());
    }

    #[test]
    fn test_rules_are_isolated_per_seller() {
        let extractor = builtin();
        let content = r#"<a href="/groceries/en-GB/products/100">"#;
        assert!(extractor.extract("asda", content).unwrap().is_empty());
        assert_eq!(extractor.extract("tesco", content).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_seller() {
        let extractor = builtin();
        assert!(matches!(
            extractor.extract("lidl", "<a href='/product/1'>"),
            Err(ConfigError::UnknownSeller(_))
        ));
    }

    #[test]
    fn test_add_rule_leaves_others_untouched() {
        let mut extractor = builtin();
        let before = extractor.extract("asda", r#"/product/milk/1"#).unwrap();

        extractor
            .add_rule("iceland", "https://www.iceland.co.uk/", r"/p/[a-z\-]+/[0-9]+\.html")
            .unwrap();

        assert!(extractor.has_rule("iceland"));
        assert_eq!(extractor.extract("asda", r#"/product/milk/1"#).unwrap(), before);
        let urls = extractor
            .extract("iceland", r#"<a href="/p/iceland-chips/12345.html">"#)
            .unwrap();
        assert!(urls.contains("https://www.iceland.co.uk/p/iceland-chips/12345.html"));
    }

    #[test]
    fn test_invalid_rule() {
        let mut extractor = UrlExtractor::new();
        assert!(matches!(
            extractor.add_rule("x", "https://x.com/", "(unclosed"),
            Err(ConfigError::InvalidPattern { .. })
        ));
        assert!(matches!(
            extractor.add_rule("x", "not a base", "/p/[0-9]+"),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }
}
