use super::{fields, NavigationSelectors, ProductStrategy, SellerProfile};
use crate::state::FailureKind;
use crate::storage::ProductDetails;
use serde_json::Value;

pub const NAME: &str = "morrisons";
pub const BASE_URL: &str = "https://groceries.morrisons.com/";

struct MorrisonsStrategy;

impl ProductStrategy for MorrisonsStrategy {
    fn map(&self, url: &str, doc: &Value, _payload: &Value) -> Result<ProductDetails, FailureKind> {
        let mut details = fields::standard_details(url, doc)?;
        // Morrisons leaves `description` empty and puts the blurb in `disambiguatingDescription`
        if details.description.is_none() {
            details.description = fields::text_at(doc, "disambiguatingDescription");
        }
        Ok(details)
    }
}

pub fn profile() -> SellerProfile {
    SellerProfile {
        name: NAME,
        base_url: BASE_URL,
        landing_url: BASE_URL,
        grocery_root: "https://groceries.morrisons.com/categories",
        product_pattern: r"/products/[a-zA-Z0-9\-]+/[0-9]+",
        selectors: NavigationSelectors {
            consent_button: Some("#onetrust-accept-btn-handler"),
            menu_button: "button[data-test='browse-menu-button']",
            menu_item: "a[data-test='category-link']",
        },
        strategy: Box::new(MorrisonsStrategy),
    }
}
