//! CSV import of transaction rows
//!
//! Accepts both the snake_case headers (`account_id,amount,timestamp,...`) and
//! the CamelCase export headers (`AccountID,TransactionAmount,TransactionDate,...`).
//! Bad rows are logged and listed in the skip manifest; only a file missing a
//! required column fails as a whole.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::graph::TransactionRow;
use crate::models::{SkipReason, SkippedItem};
use crate::temporal::parse_time;

const ACCOUNT_HEADERS: &[&str] = &["account_id", "accountid", "account"];
const AMOUNT_HEADERS: &[&str] = &["amount", "transactionamount"];
const TIMESTAMP_HEADERS: &[&str] = &["timestamp", "transactiondate", "date"];
const TYPE_HEADERS: &[&str] = &["transaction_type", "transactiontype", "type"];
const LOCATION_HEADERS: &[&str] = &["location"];
const DEVICE_HEADERS: &[&str] = &["device_id", "deviceid"];
const COUNTERPARTY_HEADERS: &[&str] = &["counterparty", "counterparty_id", "merchantid"];

/// Parsed rows with their 1-based CSV line numbers
#[derive(Debug, Clone, Default)]
pub struct RowImport {
    pub rows: Vec<(usize, TransactionRow)>,
    pub skipped: Vec<SkippedItem>,
}

/// Column positions resolved from the header row
struct Columns {
    account: usize,
    amount: usize,
    timestamp: usize,
    transaction_type: Option<usize>,
    location: Option<usize>,
    device: Option<usize>,
    counterparty: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let find = |aliases: &[&str]| {
            headers
                .iter()
                .position(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
        };
        let required = |aliases: &[&str]| {
            find(aliases).ok_or_else(|| {
                Error::InvalidData(format!("CSV is missing a '{}' column", aliases[0]))
            })
        };

        Ok(Self {
            account: required(ACCOUNT_HEADERS)?,
            amount: required(AMOUNT_HEADERS)?,
            timestamp: required(TIMESTAMP_HEADERS)?,
            transaction_type: find(TYPE_HEADERS),
            location: find(LOCATION_HEADERS),
            device: find(DEVICE_HEADERS),
            counterparty: find(COUNTERPARTY_HEADERS),
        })
    }
}

/// Parse transaction rows from CSV, naming skipped rows `{unit}:{line}`
pub fn parse_rows<R: Read>(reader: R, unit: &str) -> Result<RowImport> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let columns = Columns::resolve(&headers)?;
    let mut import = RowImport::default();

    for (i, result) in rdr.records().enumerate() {
        // Header is line 1
        let line = i + 2;
        let item = format!("{}:{}", unit, line);

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping malformed row {}: {}", item, e);
                import.skipped.push(SkippedItem::new(
                    unit,
                    item,
                    SkipReason::InvalidRecord,
                    e.to_string(),
                ));
                continue;
            }
        };

        match parse_record(&record, &columns) {
            Ok(row) => import.rows.push((line, row)),
            Err((reason, detail)) => {
                warn!("Skipping row {}: {}", item, detail);
                import
                    .skipped
                    .push(SkippedItem::new(unit, item, reason, detail));
            }
        }
    }

    debug!(
        "Parsed {} rows from {} ({} skipped)",
        import.rows.len(),
        unit,
        import.skipped.len()
    );
    Ok(import)
}

fn parse_record(
    record: &StringRecord,
    columns: &Columns,
) -> std::result::Result<TransactionRow, (SkipReason, String)> {
    let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");
    let optional = |idx: Option<usize>| {
        idx.map(field)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let account_id = field(columns.account);
    if account_id.is_empty() {
        return Err((SkipReason::InvalidRecord, "missing account id".into()));
    }

    let amount = parse_amount(field(columns.amount))
        .map_err(|e| (SkipReason::InvalidRecord, e.to_string()))?;
    let timestamp =
        parse_time(field(columns.timestamp)).map_err(|e| (SkipReason::ParseError, e.to_string()))?;

    Ok(TransactionRow {
        account_id: account_id.to_string(),
        amount,
        timestamp,
        transaction_type: optional(columns.transaction_type),
        location: optional(columns.location),
        device_id: optional(columns.device),
        counterparty: optional(columns.counterparty),
    })
}

/// Parse an amount string, handling currency symbols, commas and `(negative)`
fn parse_amount(s: &str) -> Result<f64> {
    let cleaned: String = s
        .trim()
        .replace(['$', '¥', '￥', '€', '£', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::InvalidData(format!("Unable to parse amount: {}", s)))
}
