//! Readers for schema.org fields shared by the seller strategies
//!
//! Grocery sites disagree on the shape of almost every field: brand is a string or
//! an object, offers an object or a list, prices numbers or strings. These helpers
//! absorb that so each strategy only states what is specific to its seller.

use crate::state::FailureKind;
use crate::storage::ProductDetails;
use serde_json::Value;
use url::Url;

const GTIN_KEYS: &[&str] = &["gtin13", "gtin", "gtin14", "gtin12", "gtin8"];

/// Checks whether raw ld+json text declares a `Product` type
///
/// Works on the unparsed text so that a malformed block can still be recognized
/// as the product payload. Whitespace around the colon and a single-element type
/// list (`"@type": ["Product"]`) are accepted.
pub fn declares_product(text: &str) -> bool {
    let mut rest = text;
    while let Some(pos) = rest.find("\"@type\"") {
        rest = &rest[pos + "\"@type\"".len()..];
        let after_colon = match rest.trim_start().strip_prefix(':') {
            Some(s) => s.trim_start(),
            None => continue,
        };
        let value = after_colon
            .strip_prefix('[')
            .map(str::trim_start)
            .unwrap_or(after_colon);
        if value.starts_with("\"Product\"") {
            return true;
        }
    }
    false
}

/// Returns true if the document's `@type` is (or includes) `ty`
pub fn has_type(doc: &Value, ty: &str) -> bool {
    match doc.get("@type") {
        Some(Value::String(s)) => s == ty,
        Some(Value::Array(items)) => items.iter().any(|i| i.as_str() == Some(ty)),
        _ => false,
    }
}

/// Finds the first Product document in a payload
pub fn first_product_document(payload: &Value) -> Option<&Value> {
    match payload {
        Value::Object(_) if has_type(payload, "Product") => Some(payload),
        Value::Object(map) => map.get("@graph").and_then(first_product_document),
        Value::Array(items) => items.iter().find(|d| has_type(d, "Product")),
        _ => None,
    }
}

/// Reads a scalar as trimmed, non-empty text
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn text_at(doc: &Value, key: &str) -> Option<String> {
    doc.get(key).and_then(text)
}

/// Reads a number given either as a JSON number or a numeric string
pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('£').parse().ok(),
        _ => None,
    }
}

/// Brand as a plain string or a `{"@type": "Brand", "name": ...}` object
pub fn brand_name(doc: &Value) -> Option<String> {
    match doc.get("brand")? {
        Value::Object(_) => doc.get("brand").and_then(|b| text_at(b, "name")),
        Value::Array(items) => items.first().and_then(|b| text_at(b, "name").or_else(|| text(b))),
        other => text(other),
    }
}

/// The first offer of `offers`, whether it is an object or a list
pub fn first_offer(doc: &Value) -> Option<&Value> {
    match doc.get("offers")? {
        Value::Array(items) => items.first(),
        offer @ Value::Object(_) => Some(offer),
        _ => None,
    }
}

/// Offer price, falling back to a nested `priceSpecification`
pub fn offer_price(offer: &Value) -> Option<f64> {
    offer
        .get("price")
        .and_then(number)
        .or_else(|| offer.get("lowPrice").and_then(number))
        .or_else(|| {
            offer
                .get("priceSpecification")
                .and_then(|spec| spec.get("price"))
                .and_then(number)
        })
}

/// Availability reduced to its schema.org term (`InStock`, `OutOfStock`, ...)
pub fn availability(offer: &Value) -> Option<String> {
    let raw = text_at(offer, "availability")?;
    let term = raw.rsplit('/').next().unwrap_or(&raw).to_string();
    (!term.is_empty()).then_some(term)
}

/// Offer URL, resolved against the page URL when relative
pub fn offer_url(offer: &Value, page_url: &str) -> Option<String> {
    let raw = text_at(offer, "url")?;
    match Url::parse(&raw) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(_) => Url::parse(page_url)
            .ok()?
            .join(&raw)
            .ok()
            .map(|u| u.to_string()),
    }
}

pub fn image(doc: &Value) -> Option<String> {
    match doc.get("image")? {
        Value::Array(items) => items.iter().find_map(|i| text(i).or_else(|| text_at(i, "url"))),
        obj @ Value::Object(_) => text_at(obj, "url"),
        other => text(other),
    }
}

pub fn gtin(doc: &Value) -> Option<String> {
    GTIN_KEYS.iter().find_map(|key| text_at(doc, key))
}

pub fn rating(doc: &Value) -> Option<f64> {
    doc.get("aggregateRating")?.get("ratingValue").and_then(number)
}

/// Review count, 0 when the product has no aggregate rating
pub fn review_count(doc: &Value) -> u32 {
    doc.get("aggregateRating")
        .and_then(|r| r.get("reviewCount").or_else(|| r.get("ratingCount")))
        .and_then(number)
        .map(|n| n.max(0.0) as u32)
        .unwrap_or(0)
}

/// Category path from a Product's own `category` field
///
/// Accepts a list or a single string using `>` or `|` as the separator.
pub fn category_path(doc: &Value) -> Option<Vec<String>> {
    let parts: Vec<String> = match doc.get("category")? {
        Value::Array(items) => items.iter().filter_map(text).collect(),
        value => text(value)?
            .split(|c: char| c == '>' || c == '|')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    };
    (!parts.is_empty()).then_some(parts)
}

/// Category path from a `BreadcrumbList` document anywhere in the payload
pub fn breadcrumb_categories(payload: &Value) -> Option<Vec<String>> {
    let list = match payload {
        Value::Array(items) => items.iter().find(|d| has_type(d, "BreadcrumbList"))?,
        Value::Object(map) => match map.get("@graph") {
            Some(graph) => return breadcrumb_categories(graph),
            None if has_type(payload, "BreadcrumbList") => payload,
            None => return None,
        },
        _ => return None,
    };

    let mut items: Vec<(i64, String)> = list
        .get("itemListElement")?
        .as_array()?
        .iter()
        .filter_map(|item| {
            let name = text_at(item, "name")
                .or_else(|| item.get("item").and_then(|i| text_at(i, "name")))?;
            let position = item.get("position").and_then(number).unwrap_or(0.0) as i64;
            Some((position, name))
        })
        .collect();
    items.sort_by_key(|(position, _)| *position);

    let names: Vec<String> = items.into_iter().map(|(_, name)| name).collect();
    (!names.is_empty()).then_some(names)
}

/// Turns an absent required field into `MissingField`
pub fn require<T>(value: Option<T>) -> Result<T, FailureKind> {
    value.ok_or(FailureKind::MissingField)
}

/// Maps a conventional schema.org Product document
///
/// `name` is checked first so that a page rendered without product data reports
/// `MissingName` rather than whichever field happens to be read first.
pub fn standard_details(page_url: &str, doc: &Value) -> Result<ProductDetails, FailureKind> {
    let name = text_at(doc, "name").ok_or(FailureKind::MissingName)?;
    let sku = require(text_at(doc, "sku"))?;
    let brand = require(brand_name(doc))?;
    let offer = require(first_offer(doc))?;
    let price = require(offer_price(offer))?;
    let availability = require(availability(offer))?;
    let offer_url = require(offer_url(offer, page_url))?;

    Ok(ProductDetails {
        name,
        sku,
        brand,
        gtin: gtin(doc),
        description: text_at(doc, "description"),
        image: image(doc),
        categories: category_path(doc),
        price,
        availability,
        offer_url,
        rating: rating(doc),
        review_count: review_count(doc),
    })
}
