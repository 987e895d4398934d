use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::DispatchError;
use crate::models::courier::GeoPoint;
use crate::ports::Geocoder;

/// Lookup-table geocoder. Addresses are matched after trimming, lowercasing
/// and collapsing whitespace; anything unknown is a `GeocodeFailure`.
#[derive(Default)]
pub struct GazetteerGeocoder {
    places: DashMap<String, GeoPoint>,
}

impl GazetteerGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(self, address: &str, point: GeoPoint) -> Self {
        self.places.insert(normalize(address), point);
        self
    }

    pub fn insert(&self, address: &str, point: GeoPoint) {
        self.places.insert(normalize(address), point);
    }
}

#[async_trait]
impl Geocoder for GazetteerGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeoPoint, DispatchError> {
        let key = normalize(address);
        if key.is_empty() {
            return Err(DispatchError::GeocodeFailure("empty address".to_string()));
        }

        self.places
            .get(&key)
            .map(|point| *point)
            .ok_or_else(|| DispatchError::GeocodeFailure(format!("unknown address: {address}")))
    }
}

fn normalize(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
