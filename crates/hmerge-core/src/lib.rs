//! Core domain model for hmerge: the canonical attribute shape, per-source observations and the
//! reconciled hotel entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "hmerge-core";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Amenities {
    pub general: Vec<String>,
    pub room: Vec<String>,
}

impl Amenities {
    pub fn normalized(general: Vec<String>, room: Vec<String>) -> Self {
        Self {
            general: lower_all(general),
            room: lower_all(room),
        }
    }
}

fn lower_all(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.to_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLink {
    pub link: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Images {
    pub rooms: Vec<ImageLink>,
    pub site: Vec<ImageLink>,
    pub amenities: Vec<ImageLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelAttributes {
    pub id: String,
    pub destination_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub amenities: Amenities,
    #[serde(default)]
    pub images: Images,
    #[serde(default)]
    pub booking_conditions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttributeRecord {
    pub hotel_id: String,
    pub source: String,
    pub attributes: HotelAttributes,
}

impl NewAttributeRecord {
    pub fn new(source: impl Into<String>, attributes: HotelAttributes) -> Self {
        Self {
            hotel_id: attributes.id.clone(),
            source: source.into(),
            attributes,
        }
    }
}

/// A stored observation. `seq` is assigned by the repository and grows with every write, so a
/// larger `seq` always means a more recent ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub seq: i64,
    pub hotel_id: String,
    pub source: String,
    pub ingested_at: DateTime<Utc>,
    pub attributes: HotelAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: String,
    pub destination_id: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Location,
    pub amenities: Amenities,
    pub images: Images,
    pub booking_conditions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amenities_normalizer_lowercases_both_lists() {
        let amenities = Amenities::normalized(
            vec!["Outdoor Pool".into(), "WiFi".into(), " ".into()],
            vec!["TV".into(), "Mini-Bar".into()],
        );
        assert_eq!(amenities.general, vec!["outdoor pool", "wifi"]);
        assert_eq!(amenities.room, vec!["tv", "mini-bar"]);
    }

    #[test]
    fn attributes_tolerate_missing_nested_sections() {
        let attrs: HotelAttributes =
            serde_json::from_str(r#"{"id":"h1","destination_id":5432,"location":{"lat":1.5}}"#)
                .expect("parse attributes");
        assert_eq!(attrs.location.lat, Some(1.5));
        assert!(attrs.location.city.is_none());
        assert!(attrs.images.rooms.is_empty());
        assert!(attrs.booking_conditions.is_empty());
    }

    #[test]
    fn new_record_takes_hotel_id_from_attributes() {
        let attrs = HotelAttributes {
            id: "iJhz".into(),
            destination_id: 5432,
            name: "Beach Villas Singapore".into(),
            description: String::new(),
            location: Location::default(),
            amenities: Amenities::default(),
            images: Images::default(),
            booking_conditions: Vec::new(),
        };
        let record = NewAttributeRecord::new("acme", attrs);
        assert_eq!(record.hotel_id, "iJhz");
        assert_eq!(record.source, "acme");
    }
}
