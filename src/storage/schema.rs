//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Shelf-Scout database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track batch runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mode TEXT NOT NULL,
    seller_filter TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    urls_processed INTEGER NOT NULL DEFAULT 0,
    urls_succeeded INTEGER NOT NULL DEFAULT 0,
    urls_failed INTEGER NOT NULL DEFAULT 0,
    urls_discovered INTEGER NOT NULL DEFAULT 0
);

-- One row per known product URL
-- scrape_success: NULL never attempted, 1 succeeded, 0 failed
-- fail_reason is set exactly when scrape_success = 0
CREATE TABLE IF NOT EXISTS scrape_status (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    seller TEXT NOT NULL,
    last_scraped TEXT,
    scrape_success INTEGER,
    fail_reason TEXT,
    CHECK ((COALESCE(scrape_success, 1) = 0) = (fail_reason IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_scrape_status_seller ON scrape_status(seller);
CREATE INDEX IF NOT EXISTS idx_scrape_status_last_scraped ON scrape_status(last_scraped);

-- One row per successfully parsed product
CREATE TABLE IF NOT EXISTS product (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    gtin TEXT,
    json_ld TEXT NOT NULL,
    name TEXT NOT NULL,
    sku TEXT NOT NULL,
    image TEXT,
    description TEXT,
    categories TEXT,
    rating REAL,
    review_count INTEGER NOT NULL DEFAULT 0,
    brand TEXT NOT NULL,
    price REAL NOT NULL,
    availability TEXT NOT NULL,
    offer_url TEXT NOT NULL,
    seller TEXT NOT NULL,
    scraped TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_product_gtin ON product(gtin);
CREATE INDEX IF NOT EXISTS idx_product_seller ON product(seller);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
