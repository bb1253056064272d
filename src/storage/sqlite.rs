//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Repository trait.

use crate::seller::get_seller_from_url;
use crate::state::{FailureKind, ScrapeState, ScrapeStatus, StatusUpdate};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Repository, StorageError, StorageResult};
use crate::storage::{
    ProductDetails, ProductField, ProductRecord, RunCounters, RunMode, RunRecord, RunStatus,
    StatusFilter,
};
use crate::ScoutError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{ffi, params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const STATUS_COLUMNS: &str = "url, seller, last_scraped, scrape_success, fail_reason";

const PRODUCT_COLUMNS: &str = "url, gtin, json_ld, name, sku, image, description, categories, \
     rating, review_count, brand, price, availability, offer_url, seller, scraped";

const RUN_COLUMNS: &str = "id, mode, seller_filter, started_at, finished_at, config_hash, status, \
     urls_processed, urls_succeeded, urls_failed, urls_discovered";

/// SQLite repository backend
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Creates a new SqliteRepository instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteRepository)` - Successfully opened/created database
    /// * `Err(ScoutError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, ScoutError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self, ScoutError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Timestamps are stored in one fixed-width UTC form so that SQL string
/// comparison orders them chronologically.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(url: &str, raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptRow {
            url: url.to_string(),
            reason: format!("bad timestamp {:?}: {}", raw, e),
        })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

/// Where-clause and parameters for a status filter
fn status_filter_sql(filter: &StatusFilter) -> (String, Vec<String>) {
    match filter {
        StatusFilter::All => (String::new(), vec![]),
        StatusFilter::Seller(seller) => ("WHERE seller = ?1".to_string(), vec![seller.clone()]),
        StatusFilter::NeverScraped => ("WHERE last_scraped IS NULL".to_string(), vec![]),
        StatusFilter::Failed(None) => ("WHERE scrape_success = 0".to_string(), vec![]),
        StatusFilter::Failed(Some(kind)) => (
            "WHERE scrape_success = 0 AND fail_reason = ?1".to_string(),
            vec![kind.to_db_string().to_string()],
        ),
        StatusFilter::ScrapedBefore(cutoff) => (
            "WHERE last_scraped IS NULL OR last_scraped < ?1".to_string(),
            vec![format_ts(cutoff)],
        ),
    }
}

/// Raw scrape_status columns, converted outside the row closure so that
/// inconsistent rows surface as `CorruptRow` rather than a SQLite error
type StatusRow = (String, String, Option<String>, Option<bool>, Option<String>);

fn read_status_row(row: &Row<'_>) -> rusqlite::Result<StatusRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn status_from_row(raw: StatusRow) -> StorageResult<ScrapeStatus> {
    let (url, seller, last_scraped, success, fail_reason) = raw;

    let state = ScrapeState::from_columns(success, fail_reason.as_deref()).ok_or_else(|| {
        StorageError::CorruptRow {
            url: url.clone(),
            reason: format!(
                "scrape_success={:?} inconsistent with fail_reason={:?}",
                success, fail_reason
            ),
        }
    })?;

    let last_scraped = match last_scraped {
        Some(raw) => Some(parse_ts(&url, &raw)?),
        None => None,
    };

    Ok(ScrapeStatus {
        url,
        seller,
        last_scraped,
        state,
    })
}

struct ProductRow {
    url: String,
    gtin: Option<String>,
    json_ld: String,
    name: String,
    sku: String,
    image: Option<String>,
    description: Option<String>,
    categories: Option<String>,
    rating: Option<f64>,
    review_count: u32,
    brand: String,
    price: f64,
    availability: String,
    offer_url: String,
    seller: String,
    scraped: String,
}

fn read_product_row(row: &Row<'_>) -> rusqlite::Result<ProductRow> {
    Ok(ProductRow {
        url: row.get(0)?,
        gtin: row.get(1)?,
        json_ld: row.get(2)?,
        name: row.get(3)?,
        sku: row.get(4)?,
        image: row.get(5)?,
        description: row.get(6)?,
        categories: row.get(7)?,
        rating: row.get(8)?,
        review_count: row.get(9)?,
        brand: row.get(10)?,
        price: row.get(11)?,
        availability: row.get(12)?,
        offer_url: row.get(13)?,
        seller: row.get(14)?,
        scraped: row.get(15)?,
    })
}

fn product_from_row(raw: ProductRow) -> StorageResult<ProductRecord> {
    let json_ld = serde_json::from_str(&raw.json_ld)
        .map_err(|e| StorageError::Serialization(format!("json_ld of {}: {}", raw.url, e)))?;

    let categories = match raw.categories {
        Some(text) => Some(
            serde_json::from_str(&text)
                .map_err(|e| StorageError::Serialization(format!("categories of {}: {}", raw.url, e)))?,
        ),
        None => None,
    };

    let scraped = parse_ts(&raw.url, &raw.scraped)?;

    Ok(ProductRecord {
        url: raw.url,
        seller: raw.seller,
        scraped,
        json_ld,
        details: ProductDetails {
            name: raw.name,
            sku: raw.sku,
            brand: raw.brand,
            gtin: raw.gtin,
            description: raw.description,
            image: raw.image,
            categories,
            price: raw.price,
            availability: raw.availability,
            offer_url: raw.offer_url,
            rating: raw.rating,
            review_count: raw.review_count,
        },
    })
}

fn read_run_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        mode: RunMode::from_db_string(&row.get::<_, String>(1)?).unwrap_or(RunMode::Scrape),
        seller_filter: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        config_hash: row.get(5)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(6)?)
            .unwrap_or(RunStatus::Running),
        counters: RunCounters {
            processed: row.get::<_, i64>(7)? as u64,
            succeeded: row.get::<_, i64>(8)? as u64,
            failed: row.get::<_, i64>(9)? as u64,
            discovered: row.get::<_, i64>(10)? as u64,
        },
    })
}

/// The URL prefix mapping is the authority on which seller owns a row
fn check_seller(url: &str, seller: &str) -> StorageResult<()> {
    let expected = get_seller_from_url(url).map_err(|_| StorageError::SellerMismatch {
        url: url.to_string(),
        expected: "<unrecognized>".to_string(),
        actual: seller.to_string(),
    })?;

    if expected != seller {
        return Err(StorageError::SellerMismatch {
            url: url.to_string(),
            expected: expected.to_string(),
            actual: seller.to_string(),
        });
    }
    Ok(())
}

fn write_product(conn: &Connection, record: &ProductRecord) -> StorageResult<()> {
    check_seller(&record.url, &record.seller)?;

    let json_ld = serde_json::to_string(&record.json_ld)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let categories = record
        .details
        .categories
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let d = &record.details;

    conn.execute(
        &format!(
            "INSERT INTO product ({PRODUCT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(url) DO UPDATE SET
                gtin = excluded.gtin,
                json_ld = excluded.json_ld,
                name = excluded.name,
                sku = excluded.sku,
                image = excluded.image,
                description = excluded.description,
                categories = excluded.categories,
                rating = excluded.rating,
                review_count = excluded.review_count,
                brand = excluded.brand,
                price = excluded.price,
                availability = excluded.availability,
                offer_url = excluded.offer_url,
                seller = excluded.seller,
                scraped = excluded.scraped"
        ),
        params![
            record.url,
            d.gtin,
            json_ld,
            d.name,
            d.sku,
            d.image,
            d.description,
            categories,
            d.rating,
            d.review_count,
            d.brand,
            d.price,
            d.availability,
            d.offer_url,
            record.seller,
            format_ts(&record.scraped),
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            StorageError::DuplicateUrl(record.url.clone())
        } else {
            StorageError::Sqlite(e)
        }
    })?;

    Ok(())
}

fn write_status(conn: &Connection, url: &str, update: &StatusUpdate) -> StorageResult<()> {
    let (success, fail_reason) = update.state.to_columns();
    let changed = conn.execute(
        "UPDATE scrape_status SET last_scraped = ?1, scrape_success = ?2, fail_reason = ?3
         WHERE url = ?4",
        params![format_ts(&update.last_scraped), success, fail_reason, url],
    )?;

    if changed == 0 {
        return Err(StorageError::UrlNotFound(url.to_string()));
    }
    Ok(())
}

impl Repository for SqliteRepository {
    // ===== Run Management =====

    fn create_run(
        &mut self,
        mode: RunMode,
        seller_filter: &str,
        config_hash: &str,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (mode, seller_filter, started_at, config_hash, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                mode.to_db_string(),
                seller_filter,
                now,
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                params![run_id],
                read_run_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY id DESC LIMIT 1"),
                [],
                read_run_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, urls_processed = ?3,
             urls_succeeded = ?4, urls_failed = ?5, urls_discovered = ?6 WHERE id = ?7",
            params![
                status.to_db_string(),
                now,
                counters.processed as i64,
                counters.succeeded as i64,
                counters.failed as i64,
                counters.discovered as i64,
                run_id
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Scrape Status =====

    fn upsert_scrape_status(&mut self, url: &str, seller: &str) -> StorageResult<bool> {
        check_seller(url, seller)?;
        let inserted = self.conn.execute(
            "INSERT INTO scrape_status (url, seller) VALUES (?1, ?2)
             ON CONFLICT(url) DO NOTHING",
            params![url, seller],
        )?;
        Ok(inserted > 0)
    }

    fn update_scrape_status(&mut self, url: &str, update: &StatusUpdate) -> StorageResult<()> {
        write_status(&self.conn, url, update)
    }

    fn get_scrape_status(&self, url: &str) -> StorageResult<Option<ScrapeStatus>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {STATUS_COLUMNS} FROM scrape_status WHERE url = ?1"),
                params![url],
                read_status_row,
            )
            .optional()?;
        raw.map(status_from_row).transpose()
    }

    fn find_urls(&self, filter: &StatusFilter) -> StorageResult<Vec<String>> {
        let (clause, args) = status_filter_sql(filter);
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT url FROM scrape_status {clause} ORDER BY url"))?;

        let urls = stmt
            .query_map(params_from_iter(args.iter()), |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }

    fn find_statuses(&self, filter: &StatusFilter) -> StorageResult<Vec<ScrapeStatus>> {
        let (clause, args) = status_filter_sql(filter);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STATUS_COLUMNS} FROM scrape_status {clause} ORDER BY url"
        ))?;

        let rows = stmt
            .query_map(params_from_iter(args.iter()), read_status_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(status_from_row).collect()
    }

    // ===== Products =====

    fn upsert_product(&mut self, record: &ProductRecord) -> StorageResult<()> {
        write_product(&self.conn, record)
    }

    fn record_scrape(
        &mut self,
        url: &str,
        product: Option<&ProductRecord>,
        update: &StatusUpdate,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        if let Some(record) = product {
            write_product(&tx, record)?;
        }
        write_status(&tx, url, update)?;
        tx.commit()?;
        Ok(())
    }

    fn get_product(&self, url: &str) -> StorageResult<Option<ProductRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE url = ?1"),
                params![url],
                read_product_row,
            )
            .optional()?;
        raw.map(product_from_row).transpose()
    }

    fn find_products_missing(&self, field: ProductField) -> StorageResult<Vec<ProductRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product WHERE {} IS NULL ORDER BY url",
            field.column()
        ))?;

        let rows = stmt
            .query_map([], read_product_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(product_from_row).collect()
    }

    // ===== Statistics =====

    fn count_statuses(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM scrape_status", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_products(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(DISTINCT url) FROM product", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_never_scraped(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM scrape_status WHERE last_scraped IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_scraped_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM scrape_status WHERE last_scraped < ?1",
            params![format_ts(&cutoff)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_statuses_by_seller(&self) -> StorageResult<HashMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT seller, COUNT(*) FROM scrape_status GROUP BY seller")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (seller, count) = row?;
            counts.insert(seller, count as u64);
        }
        Ok(counts)
    }

    fn count_failures(&self) -> StorageResult<HashMap<FailureKind, u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT fail_reason, COUNT(*) FROM scrape_status
             WHERE scrape_success = 0 GROUP BY fail_reason",
        )?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (reason, count) = row?;
            if let Some(kind) = FailureKind::from_db_string(&reason) {
                counts.insert(kind, count as u64);
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ScrapeOutcome;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    const MILK: &str = "https://groceries.asda.com/product/milk/asda-semi-skimmed/910000";
    const BREAD: &str = "https://www.tesco.com/groceries/en-GB/products/254656543";

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, 12, 0, 0).unwrap()
    }

    fn product(url: &str, seller: &str, name: &str) -> ProductRecord {
        ProductRecord {
            url: url.to_string(),
            seller: seller.to_string(),
            scraped: at(10),
            json_ld: json!({"@type": "Product", "name": name}),
            details: ProductDetails {
                name: name.to_string(),
                sku: "910000".to_string(),
                brand: "ASDA".to_string(),
                gtin: None,
                description: Some("Fresh milk".to_string()),
                image: None,
                categories: Some(vec!["Dairy".to_string()]),
                price: 1.45,
                availability: "InStock".to_string(),
                offer_url: url.to_string(),
                rating: None,
                review_count: 0,
            },
        }
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteRepository::open_in_memory().is_ok());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let run_id = repo.create_run(RunMode::Scrape, "all", "hash").unwrap();
        assert!(run_id > 0);

        let run = repo.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.mode, RunMode::Scrape);
        assert!(run.finished_at.is_none());

        let counters = RunCounters {
            processed: 3,
            succeeded: 2,
            failed: 1,
            discovered: 0,
        };
        repo.finish_run(run_id, RunStatus::Interrupted, &counters).unwrap();

        let run = repo.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, RunStatus::Interrupted);
        assert_eq!(run.counters, counters);
        assert!(run.finished_at.is_some());

        assert!(matches!(repo.get_run(999), Err(StorageError::RunNotFound(999))));
    }

    #[test]
    fn test_upsert_scrape_status_is_insert_if_absent() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        assert!(repo.upsert_scrape_status(MILK, "asda").unwrap());
        assert!(!repo.upsert_scrape_status(MILK, "asda").unwrap());

        // An existing row keeps its scrape history
        let update = StatusUpdate::from_outcome(ScrapeOutcome::Success, at(5));
        repo.update_scrape_status(MILK, &update).unwrap();
        assert!(!repo.upsert_scrape_status(MILK, "asda").unwrap());

        let status = repo.get_scrape_status(MILK).unwrap().unwrap();
        assert_eq!(status.state, ScrapeState::Succeeded);
        assert_eq!(status.last_scraped, Some(at(5)));
    }

    #[test]
    fn test_update_scrape_status_roundtrip() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        repo.upsert_scrape_status(MILK, "asda").unwrap();

        let update = StatusUpdate::from_outcome(ScrapeOutcome::Failure(FailureKind::Timeout), at(7));
        repo.update_scrape_status(MILK, &update).unwrap();

        let status = repo.get_scrape_status(MILK).unwrap().unwrap();
        assert_eq!(status.state, ScrapeState::Failed(FailureKind::Timeout));
        assert_eq!(status.last_scraped, Some(at(7)));

        // Success clears the failure reason
        repo.update_scrape_status(MILK, &StatusUpdate::from_outcome(ScrapeOutcome::Success, at(8)))
            .unwrap();
        let status = repo.get_scrape_status(MILK).unwrap().unwrap();
        assert_eq!(status.state, ScrapeState::Succeeded);
    }

    #[test]
    fn test_update_unknown_url() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let update = StatusUpdate::from_outcome(ScrapeOutcome::Success, at(1));
        assert!(matches!(
            repo.update_scrape_status(MILK, &update),
            Err(StorageError::UrlNotFound(_))
        ));
    }

    #[test]
    fn test_find_urls_filters() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        repo.upsert_scrape_status(MILK, "asda").unwrap();
        repo.upsert_scrape_status(BREAD, "tesco").unwrap();
        let eggs = "https://groceries.asda.com/product/eggs/free-range/910002";
        repo.upsert_scrape_status(eggs, "asda").unwrap();

        repo.update_scrape_status(
            MILK,
            &StatusUpdate::from_outcome(ScrapeOutcome::Failure(FailureKind::MissingName), at(1)),
        )
        .unwrap();
        repo.update_scrape_status(BREAD, &StatusUpdate::from_outcome(ScrapeOutcome::Success, at(9)))
            .unwrap();

        assert_eq!(repo.find_urls(&StatusFilter::All).unwrap().len(), 3);
        assert_eq!(
            repo.find_urls(&StatusFilter::Seller("asda".into())).unwrap(),
            vec![eggs.to_string(), MILK.to_string()]
        );
        assert_eq!(repo.find_urls(&StatusFilter::NeverScraped).unwrap(), vec![eggs]);
        assert_eq!(repo.find_urls(&StatusFilter::Failed(None)).unwrap(), vec![MILK]);
        assert_eq!(
            repo.find_urls(&StatusFilter::Failed(Some(FailureKind::MissingName)))
                .unwrap(),
            vec![MILK]
        );
        assert!(repo
            .find_urls(&StatusFilter::Failed(Some(FailureKind::Timeout)))
            .unwrap()
            .is_empty());
        assert_eq!(
            repo.find_urls(&StatusFilter::ScrapedBefore(at(5))).unwrap(),
            vec![eggs.to_string(), MILK.to_string()]
        );
    }

    #[test]
    fn test_product_upsert_and_get() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        repo.upsert_product(&product(MILK, "asda", "Milk")).unwrap();
        repo.upsert_product(&product(MILK, "asda", "Milk 4 Pints")).unwrap();

        let stored = repo.get_product(MILK).unwrap().unwrap();
        assert_eq!(stored.details.name, "Milk 4 Pints");
        assert_eq!(stored.json_ld["name"], "Milk 4 Pints");
        assert_eq!(stored.details.categories, Some(vec!["Dairy".to_string()]));
        assert_eq!(stored.scraped, at(10));
        assert_eq!(repo.count_products().unwrap(), 1);
    }

    #[test]
    fn test_product_seller_mismatch() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let err = repo.upsert_product(&product(MILK, "tesco", "Milk")).unwrap_err();
        assert!(matches!(err, StorageError::SellerMismatch { .. }));

        let err = repo
            .upsert_product(&product("https://example.com/p/1", "asda", "Milk"))
            .unwrap_err();
        assert!(matches!(err, StorageError::SellerMismatch { .. }));
        assert!(repo.get_product(MILK).unwrap().is_none());
    }

    #[test]
    fn test_scrape_status_seller_must_own_url() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();

        let err = repo.upsert_scrape_status(MILK, "tesco").unwrap_err();
        assert!(matches!(
            err,
            StorageError::SellerMismatch { ref expected, .. } if expected == "asda"
        ));

        let err = repo
            .upsert_scrape_status("https://shop.example.com/p/1", "asda")
            .unwrap_err();
        assert!(matches!(err, StorageError::SellerMismatch { .. }));

        assert!(repo.get_scrape_status(MILK).unwrap().is_none());
        assert_eq!(repo.count_statuses().unwrap(), 0);
    }

    #[test]
    fn test_record_scrape_is_atomic() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        repo.upsert_scrape_status(MILK, "asda").unwrap();

        // Rejected product: status must not move either
        let update = StatusUpdate::from_outcome(ScrapeOutcome::Success, at(3));
        let bad = product(MILK, "tesco", "Milk");
        assert!(repo.record_scrape(MILK, Some(&bad), &update).is_err());
        let status = repo.get_scrape_status(MILK).unwrap().unwrap();
        assert_eq!(status.state, ScrapeState::NeverAttempted);
        assert_eq!(status.last_scraped, None);

        // Unknown status row: product must not land
        let good = product(BREAD, "tesco", "Bread");
        assert!(matches!(
            repo.record_scrape(BREAD, Some(&good), &update),
            Err(StorageError::UrlNotFound(_))
        ));
        assert!(repo.get_product(BREAD).unwrap().is_none());

        let good = product(MILK, "asda", "Milk");
        repo.record_scrape(MILK, Some(&good), &update).unwrap();
        assert!(repo.get_product(MILK).unwrap().is_some());
        assert_eq!(
            repo.get_scrape_status(MILK).unwrap().unwrap().state,
            ScrapeState::Succeeded
        );
    }

    #[test]
    fn test_unique_violation_maps_to_duplicate_url() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        // An insert-only writer sharing the table hits the url constraint
        repo.upsert_product(&product(MILK, "asda", "Milk")).unwrap();
        let err = repo
            .conn
            .execute(
                "INSERT INTO product (url, json_ld, name, sku, brand, price, availability, offer_url, seller, scraped)
                 VALUES (?1, '{}', 'x', '1', 'b', 1.0, 'InStock', ?1, 'asda', 'now')",
                params![MILK],
            )
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn test_find_products_missing() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let mut with_gtin = product(MILK, "asda", "Milk");
        with_gtin.details.gtin = Some("5051413040001".to_string());
        repo.upsert_product(&with_gtin).unwrap();
        repo.upsert_product(&product(BREAD, "tesco", "Bread")).unwrap();

        let missing: Vec<_> = repo
            .find_products_missing(ProductField::Gtin)
            .unwrap()
            .into_iter()
            .map(|p| p.url)
            .collect();
        assert_eq!(missing, vec![BREAD.to_string()]);

        assert_eq!(repo.find_products_missing(ProductField::Image).unwrap().len(), 2);
        assert!(repo
            .find_products_missing(ProductField::Categories)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_statistics_counts() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        repo.upsert_scrape_status(MILK, "asda").unwrap();
        repo.upsert_scrape_status(BREAD, "tesco").unwrap();
        let eggs = "https://groceries.asda.com/product/eggs/free-range/910002";
        repo.upsert_scrape_status(eggs, "asda").unwrap();

        repo.update_scrape_status(
            MILK,
            &StatusUpdate::from_outcome(ScrapeOutcome::Failure(FailureKind::Timeout), at(1)),
        )
        .unwrap();
        repo.update_scrape_status(BREAD, &StatusUpdate::from_outcome(ScrapeOutcome::Success, at(9)))
            .unwrap();

        assert_eq!(repo.count_statuses().unwrap(), 3);
        assert_eq!(repo.count_never_scraped().unwrap(), 1);
        assert_eq!(repo.count_scraped_before(at(9) - Duration::days(2)).unwrap(), 1);

        let by_seller = repo.count_statuses_by_seller().unwrap();
        assert_eq!(by_seller.get("asda"), Some(&2));
        assert_eq!(by_seller.get("tesco"), Some(&1));

        let failures = repo.count_failures().unwrap();
        assert_eq!(failures.get(&FailureKind::Timeout), Some(&1));
        assert_eq!(failures.len(), 1);
    }
}
