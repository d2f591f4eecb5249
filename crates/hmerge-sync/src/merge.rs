//! Field-level reconciliation of per-source observations into canonical hotels.

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use hmerge_core::{Amenities, AttributeRecord, Hotel, HotelAttributes, Images, Location};
use hmerge_storage::{AttributeRepository, HotelStore};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePriority {
    ranks: HashMap<String, i32>,
}

impl SourcePriority {
    pub fn new<S: Into<String>>(ranks: impl IntoIterator<Item = (S, i32)>) -> Self {
        Self {
            ranks: ranks.into_iter().map(|(s, r)| (s.into(), r)).collect(),
        }
    }

    pub fn rank(&self, source: &str) -> Option<i32> {
        self.ranks.get(source).copied()
    }
}

/// Whether a value counts as reported. Empty strings and empty lists do not.
trait Presence {
    fn is_present(&self) -> bool;
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Presence for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for i64 {
    fn is_present(&self) -> bool {
        true
    }
}

impl Presence for f64 {
    fn is_present(&self) -> bool {
        !self.is_nan()
    }
}

impl<T: Presence> Presence for Option<T> {
    fn is_present(&self) -> bool {
        self.as_ref().is_some_and(Presence::is_present)
    }
}

fn resolve<'a, T, F>(ordered: &[&'a HotelAttributes], pick: F) -> Option<T>
where
    T: Presence + Clone + 'a,
    F: Fn(&'a HotelAttributes) -> &'a T,
{
    ordered
        .iter()
        .map(|attrs| pick(*attrs))
        .find(|value| value.is_present())
        .cloned()
}

#[derive(Debug, Clone)]
pub struct MergeEngine {
    priority: SourcePriority,
}

impl MergeEngine {
    pub fn new(priority: SourcePriority) -> Self {
        Self { priority }
    }

    /// Orders observations by source rank (descending), then by repository sequence
    /// (most recent first). Sources without a rank sort after every ranked source.
    fn order<'a>(&self, records: &'a [AttributeRecord]) -> Vec<&'a HotelAttributes> {
        let mut sorted = records.iter().collect::<Vec<_>>();
        sorted.sort_by(|a, b| {
            let rank_a = self.priority.rank(&a.source);
            let rank_b = self.priority.rank(&b.source);
            rank_b.cmp(&rank_a).then_with(|| b.seq.cmp(&a.seq))
        });
        for record in &sorted {
            if self.priority.rank(&record.source).is_none() {
                warn!(
                    source = %record.source,
                    hotel_id = %record.hotel_id,
                    "source has no configured priority; ranking it last"
                );
            }
        }
        sorted.into_iter().map(|r| &r.attributes).collect()
    }

    /// Reconciles every observation of `hotel_id` into one hotel. Each field, nested sub-fields
    /// included, takes the first present value in priority order. Returns `None` when there is
    /// nothing to merge.
    pub fn merge(&self, hotel_id: &str, records: &[AttributeRecord]) -> Option<Hotel> {
        if records.is_empty() {
            return None;
        }
        let ordered = self.order(records);

        Some(Hotel {
            id: hotel_id.to_string(),
            destination_id: resolve(&ordered, |a| &a.destination_id),
            name: resolve(&ordered, |a| &a.name),
            description: resolve(&ordered, |a| &a.description),
            location: Location {
                lat: resolve(&ordered, |a| &a.location.lat).flatten(),
                lng: resolve(&ordered, |a| &a.location.lng).flatten(),
                address: resolve(&ordered, |a| &a.location.address).flatten(),
                city: resolve(&ordered, |a| &a.location.city).flatten(),
                country: resolve(&ordered, |a| &a.location.country).flatten(),
                postal_code: resolve(&ordered, |a| &a.location.postal_code).flatten(),
            },
            amenities: Amenities {
                general: resolve(&ordered, |a| &a.amenities.general).unwrap_or_default(),
                room: resolve(&ordered, |a| &a.amenities.room).unwrap_or_default(),
            },
            images: Images {
                rooms: resolve(&ordered, |a| &a.images.rooms).unwrap_or_default(),
                site: resolve(&ordered, |a| &a.images.site).unwrap_or_default(),
                amenities: resolve(&ordered, |a| &a.images.amenities).unwrap_or_default(),
            },
            booking_conditions: resolve(&ordered, |a| &a.booking_conditions).unwrap_or_default(),
        })
    }

    pub async fn merge_hotels(
        &self,
        hotel_ids: &BTreeSet<String>,
        attributes: &dyn AttributeRepository,
        hotels: &dyn HotelStore,
    ) -> Result<usize> {
        let mut merged = 0usize;
        for hotel_id in hotel_ids {
            let records = attributes
                .load_by_hotel_id(hotel_id)
                .await
                .with_context(|| format!("loading attribute records for {hotel_id}"))?;
            let Some(hotel) = self.merge(hotel_id, &records) else {
                warn!(%hotel_id, "no attribute records stored; nothing to merge");
                continue;
            };
            hotels
                .upsert(&hotel)
                .await
                .with_context(|| format!("upserting canonical hotel {hotel_id}"))?;
            debug!(%hotel_id, sources = records.len(), "hotel merged");
            merged += 1;
        }
        info!(merged, "merge pass complete");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hmerge_core::ImageLink;

    fn engine() -> MergeEngine {
        MergeEngine::new(SourcePriority::new([
            ("acme", 0),
            ("patagonia", 4),
            ("paperflies", 6),
        ]))
    }

    fn blank(id: &str) -> HotelAttributes {
        HotelAttributes {
            id: id.to_string(),
            destination_id: 5432,
            name: String::new(),
            description: String::new(),
            location: Location::default(),
            amenities: Amenities::default(),
            images: Images::default(),
            booking_conditions: Vec::new(),
        }
    }

    fn record(seq: i64, source: &str, attributes: HotelAttributes) -> AttributeRecord {
        AttributeRecord {
            seq,
            hotel_id: attributes.id.clone(),
            source: source.to_string(),
            ingested_at: Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).single().unwrap(),
            attributes,
        }
    }

    #[test]
    fn nested_fields_resolve_independently_across_sources() {
        let mut low = blank("iJhz");
        low.location.city = Some("Singapore".into());
        low.location.country = Some("SG".into());
        low.location.lat = Some(1.264751);

        let mut high = blank("iJhz");
        high.location.city = Some(String::new());
        high.location.country = Some("Singapore".into());
        high.location.address = Some("8 Sentosa Gateway".into());

        let hotel = engine()
            .merge("iJhz", &[record(1, "acme", low), record(2, "paperflies", high)])
            .unwrap();

        assert_eq!(hotel.location.city.as_deref(), Some("Singapore"));
        assert_eq!(hotel.location.country.as_deref(), Some("Singapore"));
        assert_eq!(hotel.location.address.as_deref(), Some("8 Sentosa Gateway"));
        assert_eq!(hotel.location.lat, Some(1.264751));
        assert!(hotel.location.postal_code.is_none());
    }

    #[test]
    fn higher_priority_wins_regardless_of_load_order() {
        let mut acme = blank("iJhz");
        acme.name = "Beach Villas".into();
        acme.amenities.general = vec!["pool".into()];
        let mut patagonia = blank("iJhz");
        patagonia.name = "Beach Villas Singapore".into();
        patagonia.images.amenities = vec![ImageLink {
            link: "https://img.example/0.jpg".into(),
            description: "RWS".into(),
        }];

        let forward = engine()
            .merge(
                "iJhz",
                &[record(1, "acme", acme.clone()), record(2, "patagonia", patagonia.clone())],
            )
            .unwrap();
        let reversed = engine()
            .merge("iJhz", &[record(2, "patagonia", patagonia), record(1, "acme", acme)])
            .unwrap();

        assert_eq!(forward, reversed);
        assert_eq!(forward.name.as_deref(), Some("Beach Villas Singapore"));
        assert_eq!(forward.amenities.general, vec!["pool"]);
        assert_eq!(forward.images.amenities.len(), 1);
    }

    #[test]
    fn missing_values_fall_back_to_defaults() {
        let hotel = engine()
            .merge("f8c9", &[record(1, "acme", blank("f8c9"))])
            .unwrap();

        assert_eq!(hotel.destination_id, Some(5432));
        assert_eq!(hotel.name, None);
        assert_eq!(hotel.description, None);
        assert!(hotel.booking_conditions.is_empty());
        assert!(hotel.amenities.room.is_empty());
        assert_eq!(hotel.location, Location::default());

        let json = serde_json::to_value(&hotel).unwrap();
        assert_eq!(json["booking_conditions"], serde_json::json!([]));
    }

    #[test]
    fn same_source_prefers_most_recent_observation() {
        let mut old = blank("SjyX");
        old.description = "Old copy".into();
        let mut new = blank("SjyX");
        new.description = "New copy".into();

        let hotel = engine()
            .merge("SjyX", &[record(9, "acme", new), record(3, "acme", old)])
            .unwrap();
        assert_eq!(hotel.description.as_deref(), Some("New copy"));
    }

    #[test]
    fn unranked_sources_lose_to_ranked_ones() {
        let mut stray = blank("SjyX");
        stray.name = "Stray".into();
        stray.location.city = Some("Nowhere".into());
        let mut acme = blank("SjyX");
        acme.name = "InterContinental".into();

        let hotel = engine()
            .merge("SjyX", &[record(5, "legacy-feed", stray), record(1, "acme", acme)])
            .unwrap();
        assert_eq!(hotel.name.as_deref(), Some("InterContinental"));
        assert_eq!(hotel.location.city.as_deref(), Some("Nowhere"));
    }

    #[test]
    fn merge_output_is_byte_identical_across_runs() {
        let mut a = blank("iJhz");
        a.name = "Beach Villas".into();
        a.booking_conditions = vec!["Pets are not allowed.".into()];
        let mut b = blank("iJhz");
        b.location.lng = Some(103.824006);
        let records = [record(1, "acme", a), record(2, "patagonia", b)];

        let first = serde_json::to_vec(&engine().merge("iJhz", &records).unwrap()).unwrap();
        let second = serde_json::to_vec(&engine().merge("iJhz", &records).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn no_records_means_no_hotel() {
        assert!(engine().merge("ghost", &[]).is_none());
    }
}
