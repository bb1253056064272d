use super::{fields, NavigationSelectors, ProductStrategy, SellerProfile};
use crate::state::FailureKind;
use crate::storage::ProductDetails;
use serde_json::Value;

pub const NAME: &str = "sainsburys";
pub const BASE_URL: &str = "https://www.sainsburys.co.uk/";

/// Sainsbury's publishes relative offer URLs and the retailer's own product code
/// under `mpn` when `sku` is missing.
struct SainsburysStrategy;

impl ProductStrategy for SainsburysStrategy {
    fn map(&self, url: &str, doc: &Value, _payload: &Value) -> Result<ProductDetails, FailureKind> {
        if doc.get("sku").is_none() {
            if let Some(mpn) = doc.get("mpn") {
                let mut patched = doc.clone();
                patched["sku"] = mpn.clone();
                return fields::standard_details(url, &patched);
            }
        }
        fields::standard_details(url, doc)
    }
}

pub fn profile() -> SellerProfile {
    SellerProfile {
        name: NAME,
        base_url: BASE_URL,
        landing_url: "https://www.sainsburys.co.uk/gol-ui/groceries",
        grocery_root: "https://www.sainsburys.co.uk/gol-ui/groceries",
        product_pattern: r"/gol-ui/product/[a-zA-Z0-9\-]+",
        selectors: NavigationSelectors {
            consent_button: Some("#onetrust-accept-btn-handler"),
            menu_button: "button[data-testid='nav-menu-button']",
            menu_item: "a[data-testid='nav-menu-item']",
        },
        strategy: Box::new(SainsburysStrategy),
    }
}
