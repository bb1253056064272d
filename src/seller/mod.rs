//! Seller profiles and product extraction strategies
//!
//! Every supported grocery site is described by one [`SellerProfile`]: the URL
//! prefix that identifies it, the pattern its product links follow, the selectors
//! used to walk its category menu, and the [`ProductStrategy`] that maps its
//! embedded schema.org payload into a [`ProductDetails`]. Adding a seller means
//! adding one module and one entry in [`SellerRegistry::builtin`].

pub mod fields;

mod asda;
mod morrisons;
mod sainsburys;
mod tesco;

use crate::state::FailureKind;
use crate::storage::ProductDetails;
use crate::url::normalize_url;
use crate::{ConfigError, ConfigResult};
use regex::Regex;
use serde_json::Value;

/// Fixed URL-prefix to seller mapping
///
/// Prefixes are compared against normalized URLs, so they are lowercase and keep
/// the `www.` label where the site uses one.
const SELLER_PREFIXES: &[(&str, &str)] = &[
    (asda::BASE_URL, asda::NAME),
    (sainsburys::BASE_URL, sainsburys::NAME),
    (tesco::BASE_URL, tesco::NAME),
    (morrisons::BASE_URL, morrisons::NAME),
];

/// Resolves the seller that owns a product URL
///
/// # Arguments
///
/// * `url` - An absolute product URL (normalized or not)
///
/// # Returns
///
/// * `Ok(&str)` - The seller identifier
/// * `Err(ConfigError::UnrecognizedUrl)` - No seller prefix matches
///
/// # Examples
///
/// ```
/// use shelf_scout::get_seller_from_url;
///
/// let seller = get_seller_from_url("https://groceries.asda.com/product/milk/123").unwrap();
/// assert_eq!(seller, "asda");
/// assert!(get_seller_from_url("https://shop.example.com/product/1").is_err());
/// ```
pub fn get_seller_from_url(url: &str) -> ConfigResult<&'static str> {
    let normalized =
        normalize_url(url).map_err(|_| ConfigError::UnrecognizedUrl(url.to_string()))?;

    SELLER_PREFIXES
        .iter()
        .find(|(prefix, _)| normalized.as_str().starts_with(prefix))
        .map(|(_, seller)| *seller)
        .ok_or_else(|| ConfigError::UnrecognizedUrl(url.to_string()))
}

/// CSS selectors used to walk a seller's category menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationSelectors {
    /// Cookie/consent accept button; absent on sites without a dialog
    pub consent_button: Option<&'static str>,

    /// Button that opens the top-level category menu
    pub menu_button: &'static str,

    /// Clickable category entries once the menu is open
    pub menu_item: &'static str,
}

/// Per-seller mapping from a structured-data payload to product fields
///
/// The payload is the parsed JSON of one `application/ld+json` block. How that
/// block is chosen and which document inside it describes the product are both
/// seller concerns, so both have overridable defaults here.
pub trait ProductStrategy: Send + Sync {
    /// Picks which ld+json block on the page carries the product
    ///
    /// `blocks` holds the raw script texts in document order. The default is the
    /// first block that declares a `Product` type.
    fn payload_block(&self, blocks: &[String]) -> Option<usize> {
        blocks.iter().position(|b| fields::declares_product(b))
    }

    /// Selects the product document within a payload
    ///
    /// The default accepts a bare Product object, a `@graph` container, or a list
    /// of documents, returning the first one typed `Product`.
    fn select_document<'a>(&self, payload: &'a Value) -> Option<&'a Value> {
        fields::first_product_document(payload)
    }

    /// Maps the selected document into product fields
    ///
    /// # Arguments
    ///
    /// * `url` - The product page URL
    /// * `doc` - The document returned by `select_document`
    /// * `payload` - The whole parsed block, for sellers that read sibling documents
    fn map(&self, url: &str, doc: &Value, payload: &Value) -> Result<ProductDetails, FailureKind>;
}

/// Everything the crawler needs to know about one seller
pub struct SellerProfile {
    /// Seller identifier stored with every row
    pub name: &'static str,

    /// URL prefix that identifies the seller; product paths are joined onto it
    pub base_url: &'static str,

    /// Page where discovery starts
    pub landing_url: &'static str,

    /// Root of the grocery category tree, revisited when the menu is exhausted
    pub grocery_root: &'static str,

    /// Regex matching a product path anywhere in page content
    pub product_pattern: &'static str,

    pub selectors: NavigationSelectors,

    pub strategy: Box<dyn ProductStrategy>,
}

impl std::fmt::Debug for SellerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SellerProfile")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("product_pattern", &self.product_pattern)
            .finish_non_exhaustive()
    }
}

/// Lookup table from seller identifier to profile
#[derive(Debug)]
pub struct SellerRegistry {
    profiles: Vec<SellerProfile>,
}

impl SellerRegistry {
    /// Builds a registry from explicit profiles
    ///
    /// Fails if a name is registered twice or a product pattern does not compile.
    pub fn new(profiles: Vec<SellerProfile>) -> ConfigResult<Self> {
        let mut registry = Self {
            profiles: Vec::with_capacity(profiles.len()),
        };
        for profile in profiles {
            registry.register(profile)?;
        }
        Ok(registry)
    }

    /// The sellers shipped with the crate
    pub fn builtin() -> ConfigResult<Self> {
        Self::new(vec![
            asda::profile(),
            sainsburys::profile(),
            tesco::profile(),
            morrisons::profile(),
        ])
    }

    /// Adds one seller without touching the existing ones
    pub fn register(&mut self, profile: SellerProfile) -> ConfigResult<()> {
        if self.profiles.iter().any(|p| p.name == profile.name) {
            return Err(ConfigError::Validation(format!(
                "seller {} registered twice",
                profile.name
            )));
        }

        Regex::new(profile.product_pattern).map_err(|e| ConfigError::InvalidPattern {
            seller: profile.name.to_string(),
            message: e.to_string(),
        })?;

        self.profiles.push(profile);
        Ok(())
    }

    pub fn get(&self, name: &str) -> ConfigResult<&SellerProfile> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownSeller(name.to_string()))
    }

    /// Finds the profile whose prefix matches a URL
    pub fn for_url(&self, url: &str) -> ConfigResult<&SellerProfile> {
        let normalized =
            normalize_url(url).map_err(|_| ConfigError::UnrecognizedUrl(url.to_string()))?;
        self.profiles
            .iter()
            .find(|p| normalized.as_str().starts_with(p.base_url))
            .ok_or_else(|| ConfigError::UnrecognizedUrl(url.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.profiles.iter().map(|p| p.name).collect()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &SellerProfile> {
        self.profiles.iter()
    }

    /// Resolves the sellers a run works on
    ///
    /// # Arguments
    ///
    /// * `filter` - A seller name, `"all"`, or None (same as `"all"`)
    /// * `configured` - The config's `sellers` list; empty means every registered seller
    pub fn select(&self, filter: Option<&str>, configured: &[String]) -> ConfigResult<Vec<&SellerProfile>> {
        let allowed = |name: &str| configured.is_empty() || configured.iter().any(|c| c == name);

        match filter {
            None | Some("all") => Ok(self.profiles.iter().filter(|p| allowed(p.name)).collect()),
            Some(name) => {
                let profile = self.get(name)?;
                if !allowed(name) {
                    return Err(ConfigError::Validation(format!(
                        "seller {} is not enabled in the configuration",
                        name
                    )));
                }
                Ok(vec![profile])
            }
        }
    }
}
