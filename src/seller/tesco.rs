use super::{fields, NavigationSelectors, ProductStrategy, SellerProfile};
use crate::state::FailureKind;
use crate::storage::ProductDetails;
use serde_json::Value;

pub const NAME: &str = "tesco";
pub const BASE_URL: &str = "https://www.tesco.com/";

/// Position of the product document in Tesco's multi-document payload, used when
/// no document declares its type.
const PRODUCT_POSITION: usize = 2;

/// Tesco emits one array holding the store, the breadcrumb trail and the product.
struct TescoStrategy;

impl ProductStrategy for TescoStrategy {
    fn select_document<'a>(&self, payload: &'a Value) -> Option<&'a Value> {
        match payload {
            Value::Array(docs) => docs
                .iter()
                .find(|d| fields::has_type(d, "Product"))
                .or_else(|| docs.get(PRODUCT_POSITION))
                .filter(|d| d.is_object()),
            other => fields::first_product_document(other),
        }
    }

    fn map(&self, url: &str, doc: &Value, payload: &Value) -> Result<ProductDetails, FailureKind> {
        let mut details = fields::standard_details(url, doc)?;
        if details.categories.is_none() {
            details.categories = fields::breadcrumb_categories(payload);
        }
        Ok(details)
    }
}

pub fn profile() -> SellerProfile {
    SellerProfile {
        name: NAME,
        base_url: BASE_URL,
        landing_url: "https://www.tesco.com/groceries/en-GB/",
        grocery_root: "https://www.tesco.com/groceries/en-GB/shop",
        product_pattern: r"/groceries/en-GB/products/[0-9]+",
        selectors: NavigationSelectors {
            consent_button: Some("button[data-auto='accept-all-cookies']"),
            menu_button: "a[data-auto='menu-groceries']",
            menu_item: "ul.menu-tree li a",
        },
        strategy: Box::new(TescoStrategy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(product: Value) -> Value {
        json!([
            {"@type": "Organization", "name": "Tesco"},
            {"@type": "BreadcrumbList", "itemListElement": [
                {"@type": "ListItem", "position": 1, "item": {"name": "Groceries"}},
                {"@type": "ListItem", "position": 2, "item": {"name": "Fresh Food"}},
                {"@type": "ListItem", "position": 3, "item": {"name": "Milk"}}
            ]},
            product
        ])
    }

    fn product_doc() -> Value {
        json!({
            "@type": "Product",
            "name": "Tesco British Semi Skimmed Milk 2.272L",
            "sku": "254656543",
            "gtin13": "5000436589723",
            "brand": {"@type": "Brand", "name": "TESCO"},
            "offers": {
                "@type": "Offer",
                "price": 1.45,
                "availability": "https://schema.org/InStock",
                "url": "https://www.tesco.com/groceries/en-GB/products/254656543"
            }
        })
    }

    #[test]
    fn test_selects_product_by_type() {
        let payload = payload(product_doc());
        let doc = TescoStrategy.select_document(&payload).unwrap();
        assert_eq!(doc["sku"], "254656543");
    }

    #[test]
    fn test_selects_product_by_position_when_untyped() {
        let mut untyped = product_doc();
        untyped.as_object_mut().unwrap().remove("@type");
        let payload = payload(untyped);
        let doc = TescoStrategy.select_document(&payload).unwrap();
        assert_eq!(doc["sku"], "254656543");
    }

    #[test]
    fn test_short_payload_has_no_document() {
        let payload = json!([{"@type": "Organization"}]);
        assert!(TescoStrategy.select_document(&payload).is_none());
    }

    #[test]
    fn test_categories_from_breadcrumbs() {
        let payload = payload(product_doc());
        let url = "https://www.tesco.com/groceries/en-GB/products/254656543";
        let doc = TescoStrategy.select_document(&payload).unwrap();
        let details = TescoStrategy.map(url, doc, &payload).unwrap();
        assert_eq!(details.brand, "TESCO");
        assert_eq!(
            details.categories,
            Some(vec![
                "Groceries".to_string(),
                "Fresh Food".to_string(),
                "Milk".to_string()
            ])
        );
    }
}
