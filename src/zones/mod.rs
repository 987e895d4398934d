use std::cmp::Ordering;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::ZoneOverlapPolicy;
use crate::engine::pricing::validate_rule;
use crate::error::DispatchError;
use crate::geo::{centroid, haversine_km, point_in_polygon};
use crate::models::courier::GeoPoint;
use crate::models::zone::{PricingRule, Zone};

/// Zone polygons and their pricing rules, shared by intake and dispatch.
pub struct ZoneRegistry {
    zones: DashMap<Uuid, Zone>,
    overlap: ZoneOverlapPolicy,
}

impl ZoneRegistry {
    pub fn new(overlap: ZoneOverlapPolicy) -> Self {
        Self {
            zones: DashMap::new(),
            overlap,
        }
    }

    pub fn insert(&self, zone: Zone) -> Result<Zone, DispatchError> {
        if zone.name.trim().is_empty() {
            return Err(DispatchError::InvalidZone("name cannot be empty".to_string()));
        }
        if zone.coordinates.len() < 3 {
            return Err(DispatchError::InvalidZone(format!(
                "polygon needs at least 3 vertices, got {}",
                zone.coordinates.len()
            )));
        }
        for rule in &zone.pricing_rules {
            validate_rule(rule)?;
        }

        self.zones.insert(zone.id, zone.clone());
        Ok(zone)
    }

    /// Appends a rule; when active it supersedes earlier active rules.
    pub fn add_rule(&self, zone_id: Uuid, rule: PricingRule) -> Result<Zone, DispatchError> {
        validate_rule(&rule)?;

        let mut zone = self
            .zones
            .get_mut(&zone_id)
            .ok_or(DispatchError::ZoneNotFound(zone_id))?;
        zone.pricing_rules.push(rule);
        Ok(zone.clone())
    }

    pub fn get(&self, zone_id: Uuid) -> Option<Zone> {
        self.zones.get(&zone_id).map(|zone| zone.clone())
    }

    pub fn list(&self) -> Vec<Zone> {
        self.zones.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Every active zone whose polygon contains `point`, in no particular order.
    pub fn containing(&self, point: &GeoPoint) -> Vec<Zone> {
        self.zones
            .iter()
            .filter(|entry| entry.is_active && point_in_polygon(point, &entry.coordinates))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// The single zone governing `point`. Overlaps are settled by the
    /// configured policy, then by centroid distance, then by id.
    pub fn resolve(&self, point: &GeoPoint) -> Option<Zone> {
        let overlap = self.overlap;
        let centroid_distance =
            |zone: &Zone| centroid(&zone.coordinates).map_or(f64::MAX, |c| haversine_km(&c, point));

        self.containing(point).into_iter().min_by(|a, b| {
            let by_priority = match overlap {
                ZoneOverlapPolicy::Priority => b.priority.cmp(&a.priority),
                ZoneOverlapPolicy::NearestCentroid => Ordering::Equal,
            };
            by_priority
                .then_with(|| centroid_distance(a).total_cmp(&centroid_distance(b)))
                .then_with(|| a.id.cmp(&b.id))
        })
    }
}
