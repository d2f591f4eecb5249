//! Source adapter contracts + the three supplier feed mappings.

mod sanitize;

pub use sanitize::{sanitize, sanitize_text};

use hmerge_core::{Amenities, HotelAttributes, ImageLink, Images, Location, NewAttributeRecord};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const CRATE_NAME: &str = "hmerge-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{source_id}: record is not a JSON object")]
    NotAnObject { source_id: &'static str },
    #[error("{source_id}: record is missing required field `{field}`")]
    MissingField {
        source_id: &'static str,
        field: String,
    },
    #[error("{source_id}: field `{field}` has unexpected value {found}")]
    InvalidField {
        source_id: &'static str,
        field: String,
        found: String,
    },
    #[error("record #{index}: {reason}")]
    Record {
        index: usize,
        reason: Box<AdapterError>,
    },
}

pub trait FeedAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    fn map_record(&self, record: &JsonValue) -> Result<HotelAttributes, AdapterError>;

    /// Sanitizes `raw` and maps it. Field extraction never sees the unsanitized payload.
    fn normalize(&self, raw: &JsonValue) -> Result<HotelAttributes, AdapterError> {
        if !raw.is_object() {
            return Err(AdapterError::NotAnObject {
                source_id: self.source_id(),
            });
        }
        let clean = sanitize(raw.clone());
        self.map_record(&clean)
    }
}

/// Normalizes a whole feed payload into one batch. The first rejected record fails the batch, so
/// a source contributes either every record or none.
pub fn normalize_feed(
    adapter: &dyn FeedAdapter,
    records: &[JsonValue],
) -> Result<Vec<NewAttributeRecord>, AdapterError> {
    records
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            adapter
                .normalize(raw)
                .map(|attributes| NewAttributeRecord::new(adapter.source_id(), attributes))
                .map_err(|reason| AdapterError::Record {
                    index,
                    reason: Box::new(reason),
                })
        })
        .collect()
}

fn json_at<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    if cur.is_null() {
        None
    } else {
        Some(cur)
    }
}

fn json_str(value: &JsonValue, path: &[&str]) -> Option<String> {
    match json_at(value, path)? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_f64(value: &JsonValue, path: &[&str]) -> Option<f64> {
    match json_at(value, path)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_string_vec(value: &JsonValue, path: &[&str]) -> Vec<String> {
    let Some(arr) = json_at(value, path).and_then(JsonValue::as_array) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn required_str(
    source_id: &'static str,
    value: &JsonValue,
    key: &str,
) -> Result<String, AdapterError> {
    match json_at(value, &[key]) {
        Some(JsonValue::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(JsonValue::Number(n)) => Ok(n.to_string()),
        None | Some(JsonValue::String(_)) => Err(AdapterError::MissingField {
            source_id,
            field: key.to_string(),
        }),
        Some(other) => Err(AdapterError::InvalidField {
            source_id,
            field: key.to_string(),
            found: other.to_string(),
        }),
    }
}

fn required_i64(
    source_id: &'static str,
    value: &JsonValue,
    key: &str,
) -> Result<i64, AdapterError> {
    let invalid = |found: &JsonValue| AdapterError::InvalidField {
        source_id,
        field: key.to_string(),
        found: found.to_string(),
    };
    let Some(found) = json_at(value, &[key]) else {
        return Err(AdapterError::MissingField {
            source_id,
            field: key.to_string(),
        });
    };
    match found {
        JsonValue::Number(n) => n.as_i64().ok_or_else(|| invalid(found)),
        JsonValue::String(s) => s.trim().parse().map_err(|_| invalid(found)),
        _ => Err(invalid(found)),
    }
}

fn json_images(
    source_id: &'static str,
    value: &JsonValue,
    path: &[&str],
    link_key: &str,
    description_key: &str,
) -> Result<Vec<ImageLink>, AdapterError> {
    let Some(arr) = json_at(value, path).and_then(JsonValue::as_array) else {
        return Ok(Vec::new());
    };
    arr.iter()
        .map(|entry| -> Result<ImageLink, AdapterError> {
            let link = json_str(entry, &[link_key]).ok_or_else(|| AdapterError::MissingField {
                source_id,
                field: format!("{}[].{link_key}", path.join(".")),
            })?;
            Ok(ImageLink {
                link,
                description: json_str(entry, &[description_key]).unwrap_or_default(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct AcmeAdapter;

#[derive(Debug, Clone, Copy)]
struct PatagoniaAdapter;

#[derive(Debug, Clone, Copy)]
struct PaperfliesAdapter;

impl FeedAdapter for AcmeAdapter {
    fn source_id(&self) -> &'static str {
        "acme"
    }

    fn map_record(&self, record: &JsonValue) -> Result<HotelAttributes, AdapterError> {
        let src = self.source_id();
        Ok(HotelAttributes {
            id: required_str(src, record, "Id")?,
            destination_id: required_i64(src, record, "DestinationId")?,
            name: required_str(src, record, "Name")?,
            description: required_str(src, record, "Description")?,
            location: Location {
                lat: json_f64(record, &["Latitude"]),
                lng: json_f64(record, &["Longitude"]),
                address: json_str(record, &["Address"]),
                city: json_str(record, &["City"]),
                country: json_str(record, &["Country"]),
                postal_code: json_str(record, &["PostalCode"]),
            },
            amenities: Amenities::normalized(json_string_vec(record, &["Facilities"]), Vec::new()),
            images: Images::default(),
            booking_conditions: Vec::new(),
        })
    }
}

impl FeedAdapter for PatagoniaAdapter {
    fn source_id(&self) -> &'static str {
        "patagonia"
    }

    fn map_record(&self, record: &JsonValue) -> Result<HotelAttributes, AdapterError> {
        let src = self.source_id();
        Ok(HotelAttributes {
            id: required_str(src, record, "id")?,
            destination_id: required_i64(src, record, "destination")?,
            name: required_str(src, record, "name")?,
            description: json_str(record, &["info"]).unwrap_or_default(),
            location: Location {
                lat: json_f64(record, &["lat"]),
                lng: json_f64(record, &["lng"]),
                address: json_str(record, &["address"]),
                ..Location::default()
            },
            amenities: Amenities::normalized(json_string_vec(record, &["amenities"]), Vec::new()),
            images: Images {
                rooms: json_images(src, record, &["images", "rooms"], "url", "description")?,
                site: json_images(src, record, &["images", "site"], "url", "description")?,
                amenities: json_images(src, record, &["images", "amenities"], "url", "description")?,
            },
            booking_conditions: Vec::new(),
        })
    }
}

impl FeedAdapter for PaperfliesAdapter {
    fn source_id(&self) -> &'static str {
        "paperflies"
    }

    fn map_record(&self, record: &JsonValue) -> Result<HotelAttributes, AdapterError> {
        let src = self.source_id();
        Ok(HotelAttributes {
            id: required_str(src, record, "hotel_id")?,
            destination_id: required_i64(src, record, "destination_id")?,
            name: required_str(src, record, "hotel_name")?,
            description: json_str(record, &["details"]).unwrap_or_default(),
            location: Location {
                lat: json_f64(record, &["location", "lat"]),
                lng: json_f64(record, &["location", "lng"]),
                address: json_str(record, &["location", "address"]),
                country: json_str(record, &["location", "country"]),
                ..Location::default()
            },
            amenities: Amenities::normalized(
                json_string_vec(record, &["amenities", "general"]),
                json_string_vec(record, &["amenities", "room"]),
            ),
            images: Images {
                rooms: json_images(src, record, &["images", "rooms"], "link", "caption")?,
                site: json_images(src, record, &["images", "site"], "link", "caption")?,
                amenities: json_images(src, record, &["images", "amenities"], "link", "caption")?,
            },
            booking_conditions: json_string_vec(record, &["booking_conditions"]),
        })
    }
}

pub fn acme_adapter() -> impl FeedAdapter {
    AcmeAdapter
}

pub fn patagonia_adapter() -> impl FeedAdapter {
    PatagoniaAdapter
}

pub fn paperflies_adapter() -> impl FeedAdapter {
    PaperfliesAdapter
}

pub fn adapter_for_source(source_id: &str) -> Option<Box<dyn FeedAdapter>> {
    match source_id {
        "acme" => Some(Box::new(AcmeAdapter)),
        "patagonia" => Some(Box::new(PatagoniaAdapter)),
        "paperflies" => Some(Box::new(PaperfliesAdapter)),
        _ => None,
    }
}
