use std::cmp::Ordering;

use uuid::Uuid;

use crate::geo::haversine_km;
use crate::models::courier::{CourierProfile, GeoPoint, LocationFix};
use crate::models::order::Package;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub courier: CourierProfile,
    pub location: LocationFix,
    pub distance_km: f64,
}

impl Candidate {
    pub fn new(courier: CourierProfile, location: LocationFix, pickup: &GeoPoint) -> Self {
        let distance_km = haversine_km(&location.point, pickup);
        Self {
            courier,
            location,
            distance_km,
        }
    }
}

/// Static eligibility: online, serving the zone, and able to carry the
/// package. Location freshness is checked separately at ranking time.
pub fn is_eligible(courier: &CourierProfile, zone_id: Uuid, package: &Package) -> bool {
    courier.is_online
        && courier.serves(zone_id)
        && courier
            .vehicle_type
            .can_carry(package.weight(), package.volume_liters())
}

/// Nearest first; ties go to the higher rating, then the older location fix.
pub fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then_with(|| b.courier.rating.total_cmp(&a.courier.rating))
        .then_with(|| a.location.recorded_at.cmp(&b.location.recorded_at))
        .then_with(|| a.courier.id.cmp(&b.courier.id))
}

pub fn rank(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(compare);
    candidates
}
