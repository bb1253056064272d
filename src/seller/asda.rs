use super::{fields, NavigationSelectors, ProductStrategy, SellerProfile};
use crate::state::FailureKind;
use crate::storage::ProductDetails;
use serde_json::Value;

pub const NAME: &str = "asda";
pub const BASE_URL: &str = "https://groceries.asda.com/";

/// ASDA product pages carry several ld+json blocks; the product is the last one.
struct AsdaStrategy;

impl ProductStrategy for AsdaStrategy {
    fn payload_block(&self, blocks: &[String]) -> Option<usize> {
        blocks
            .iter()
            .rposition(|b| fields::declares_product(b))
            .or_else(|| blocks.len().checked_sub(1))
    }

    fn map(&self, url: &str, doc: &Value, _payload: &Value) -> Result<ProductDetails, FailureKind> {
        fields::standard_details(url, doc)
    }
}

pub fn profile() -> SellerProfile {
    SellerProfile {
        name: NAME,
        base_url: BASE_URL,
        landing_url: BASE_URL,
        grocery_root: "https://groceries.asda.com/dept/groceries",
        product_pattern: r"/product/[\-/a-zA-Z0-9]+",
        selectors: NavigationSelectors {
            consent_button: Some("#onetrust-accept-btn-handler"),
            menu_button: "button.h-nav__item-button",
            menu_item: "a.h-nav__item-link, a.taxo-nav__link",
        },
        strategy: Box::new(AsdaStrategy),
    }
}
