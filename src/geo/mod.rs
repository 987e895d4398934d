pub mod geocoder;

use crate::models::courier::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub const DEFAULT_AVERAGE_SPEED_KMH: f64 = 20.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * central_angle
}

/// Whole minutes needed to cover `distance_km` at `avg_speed_kmh`, falling
/// back to the default speed when none (or a non-positive one) is given.
pub fn eta_minutes(distance_km: f64, avg_speed_kmh: Option<f64>) -> u32 {
    let speed = avg_speed_kmh
        .filter(|speed| *speed > 0.0)
        .unwrap_or(DEFAULT_AVERAGE_SPEED_KMH);
    let minutes = (distance_km.max(0.0) / speed * 60.0).round();
    minutes as u32
}

/// Ray casting with longitude as x and latitude as y. Points exactly on an
/// edge may land either side.
pub fn point_in_polygon(point: &GeoPoint, polygon: &[GeoPoint]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].lng, polygon[i].lat);
        let (xj, yj) = (polygon[j].lng, polygon[j].lat);

        let crosses = (yi > point.lat) != (yj > point.lat)
            && point.lng < (xj - xi) * (point.lat - yi) / (yj - yi) + xi;
        if crosses {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Vertex average; good enough to order nearby overlapping zones.
pub fn centroid(polygon: &[GeoPoint]) -> Option<GeoPoint> {
    if polygon.is_empty() {
        return None;
    }

    let count = polygon.len() as f64;
    let (lat, lng) = polygon
        .iter()
        .fold((0.0, 0.0), |(lat, lng), p| (lat + p.lat, lng + p.lng));

    Some(GeoPoint {
        lat: lat / count,
        lng: lng / count,
    })
}

#[cfg(test)]
mod tests {
    use super::{centroid, eta_minutes, haversine_km, point_in_polygon};
    use crate::models::courier::GeoPoint;

    fn square() -> Vec<GeoPoint> {
        vec![
            GeoPoint { lat: 37.70, lng: -122.50 },
            GeoPoint { lat: 37.70, lng: -122.35 },
            GeoPoint { lat: 37.82, lng: -122.35 },
            GeoPoint { lat: 37.82, lng: -122.50 },
        ]
    }

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 53.5511,
            lng: 9.9937,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
        assert_eq!(eta_minutes(distance, None), 0);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let points = [
            GeoPoint { lat: 37.7749, lng: -122.4194 },
            GeoPoint { lat: -33.8688, lng: 151.2093 },
            GeoPoint { lat: 0.0, lng: 179.9 },
            GeoPoint { lat: 0.0, lng: -179.9 },
            GeoPoint { lat: 89.9, lng: 10.0 },
        ];
        for a in &points {
            for b in &points {
                assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn eta_rounds_to_nearest_minute() {
        assert_eq!(eta_minutes(3.2, None), 10);
        assert_eq!(eta_minutes(3.2, Some(20.0)), 10);
        assert_eq!(eta_minutes(10.0, Some(60.0)), 10);
        assert_eq!(eta_minutes(1.0, Some(0.0)), 3);
    }

    #[test]
    fn polygon_containment() {
        let polygon = square();
        assert!(point_in_polygon(
            &GeoPoint { lat: 37.7749, lng: -122.4194 },
            &polygon
        ));
        assert!(!point_in_polygon(
            &GeoPoint { lat: 37.90, lng: -122.4194 },
            &polygon
        ));
        assert!(!point_in_polygon(&GeoPoint { lat: 37.75, lng: -122.4 }, &polygon[..2]));
    }

    #[test]
    fn centroid_of_square() {
        let c = centroid(&square()).unwrap();
        assert!((c.lat - 37.76).abs() < 1e-9);
        assert!((c.lng + 122.425).abs() < 1e-9);
        assert!(centroid(&[]).is_none());
    }
}
