//! Capture decoding
//!
//! Captures arrive either as HTML pages with JSON embedded in data
//! attributes (the site renders its listing state that way) or as bare JSON
//! API responses. Both shapes decode to the same explicit document types;
//! anything else is a malformed document, skipped per row and counted.

use ingatlan_common::types::{CaptureEvent, HandlerKind};
use ingatlan_common::{IngestError, Result};
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;

use crate::schema::Row;

static DETAIL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#listing").expect("static selector"));
static CARD_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.listing-card").expect("static selector"));

/// Attribute carrying the subject JSON on a detail page.
const LISTING_ATTR: &str = "data-listing";
/// Attribute carrying the location hierarchy JSON on a detail page.
const LOCATION_ATTR: &str = "data-location-hierarchy";
/// Attribute carrying the card JSON on a listing page.
const CARD_ATTR: &str = "data-listing-card";

/// A decoded capture, tagged by the shape it carries.
#[derive(Debug, Clone)]
pub enum Document {
    Detail(DetailDocument),
    Listing(ListingDocument),
}

/// One subject's raw payload plus its location hierarchy.
#[derive(Debug, Clone)]
pub struct DetailDocument {
    /// Raw subject record, keys still in source form
    pub listing: Row,
    /// Location hierarchy entries, outermost first
    pub locations: Vec<Row>,
}

/// The listing cards found on one search-results page.
#[derive(Debug, Clone)]
pub struct ListingDocument {
    pub cards: Vec<Row>,
}

/// Decode one capture event into its document shape.
pub fn decode(event: &CaptureEvent) -> Result<Document> {
    let text = std::str::from_utf8(&event.content).map_err(|e| malformed(event, e))?;
    match event.kind {
        HandlerKind::Detail => decode_detail(event, text).map(Document::Detail),
        HandlerKind::Listing => decode_listing(event, text).map(Document::Listing),
    }
}

fn decode_detail(event: &CaptureEvent, text: &str) -> Result<DetailDocument> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') {
        return decode_detail_json(event, trimmed);
    }

    let html = Html::parse_document(text);
    let element = html
        .select(&DETAIL_SELECTOR)
        .next()
        .ok_or_else(|| malformed(event, "no #listing element"))?;

    let listing_json = element
        .value()
        .attr(LISTING_ATTR)
        .ok_or_else(|| malformed(event, "missing data-listing attribute"))?;
    let listing = parse_object(event, listing_json)?;

    let locations = match element.value().attr(LOCATION_ATTR) {
        Some(raw) => parse_object_array(event, raw)?,
        None => Vec::new(),
    };

    Ok(DetailDocument { listing, locations })
}

fn decode_detail_json(event: &CaptureEvent, text: &str) -> Result<DetailDocument> {
    let body: Value = serde_json::from_str(text).map_err(|e| malformed(event, e))?;
    let Value::Object(mut body) = body else {
        return Err(malformed(event, "detail body is not an object"));
    };

    let listing = match body.remove("listing") {
        Some(Value::Object(map)) => map,
        _ => return Err(malformed(event, "detail body has no listing object")),
    };
    let locations = match body.remove("locationHierarchy") {
        Some(Value::Array(items)) => object_rows(event, items)?,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err(malformed(event, "locationHierarchy is not an array")),
    };

    Ok(DetailDocument { listing, locations })
}

fn decode_listing(event: &CaptureEvent, text: &str) -> Result<ListingDocument> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        let body: Value = serde_json::from_str(trimmed).map_err(|e| malformed(event, e))?;
        let Value::Array(items) = body else {
            return Err(malformed(event, "listing body is not an array"));
        };
        return Ok(ListingDocument {
            cards: object_rows(event, items)?,
        });
    }

    if !trimmed.starts_with('<') {
        return Err(malformed(event, "listing body is neither HTML nor JSON"));
    }

    let html = Html::parse_document(text);
    let mut cards = Vec::new();
    for element in html.select(&CARD_SELECTOR) {
        let Some(raw) = element.value().attr(CARD_ATTR) else {
            // decorative card markup without data, e.g. ad slots
            continue;
        };
        cards.push(parse_object(event, raw)?);
    }
    // a page past the last result legitimately has zero cards
    Ok(ListingDocument { cards })
}

/// Recover the subject id from a detail URL's last path segment.
pub fn property_id_from_url(event: &CaptureEvent) -> Result<i64> {
    let path = event
        .url
        .split(['?', '#'])
        .next()
        .unwrap_or(&event.url)
        .trim_end_matches('/');
    let tail = path.rsplit('/').next().unwrap_or(path);
    tail.parse::<i64>()
        .map_err(|_| malformed(event, format!("no numeric id in url path segment '{tail}'")))
}

fn parse_object(event: &CaptureEvent, raw: &str) -> Result<Row> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(malformed(event, "embedded JSON is not an object")),
        Err(e) => Err(malformed(event, e)),
    }
}

fn parse_object_array(event: &CaptureEvent, raw: &str) -> Result<Vec<Row>> {
    match serde_json::from_str(raw) {
        Ok(Value::Array(items)) => object_rows(event, items),
        Ok(_) => Err(malformed(event, "embedded JSON is not an array")),
        Err(e) => Err(malformed(event, e)),
    }
}

fn object_rows(event: &CaptureEvent, items: Vec<Value>) -> Result<Vec<Row>> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            _ => Err(malformed(event, "array element is not an object")),
        })
        .collect()
}

fn malformed(event: &CaptureEvent, reason: impl ToString) -> IngestError {
    IngestError::MalformedDocument {
        url: event.url.clone(),
        reason: reason.to_string(),
    }
}
