//! Domain entities and query arguments for the OpenStreetCam API.
//!
//! # Design
//! Entities are plain values with no shared state. Wire decoding lives in
//! `response`; the types here carry only domain invariants. `Photo` and
//! `Segment` implement equality by identity so they can be deduplicated when
//! several result pages overlap.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use geo::{Distance, Haversine, Point};

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in metres.
    pub fn distance_to(&self, other: &LatLon) -> f64 {
        Haversine::distance(self.to_point(), other.to_point())
    }

    /// Request parameter form: `"lat,lon"`.
    pub fn to_param(&self) -> String {
        format!("{},{}", self.lat, self.lon)
    }

    fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    fn bits(&self) -> (u64, u64) {
        (self.lat.to_bits(), self.lon.to_bits())
    }
}

/// Search area for nearby-photo queries. `radius` is in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: LatLon,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: LatLon, radius: f64) -> Self {
        Self { center, radius }
    }
}

/// Search area for matched-track queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub top_left: LatLon,
    pub bottom_right: LatLon,
}

impl BoundingBox {
    pub fn new(top_left: LatLon, bottom_right: LatLon) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    pub fn center(&self) -> LatLon {
        LatLon::new(
            (self.top_left.lat + self.bottom_right.lat) / 2.0,
            (self.top_left.lon + self.bottom_right.lon) / 2.0,
        )
    }

    /// The smallest circle around the centre that contains the whole box.
    pub fn circumscribed_circle(&self) -> Circle {
        let center = self.center();
        Circle::new(center, center.distance_to(&self.top_left))
    }
}

/// Page selector sent with list queries.
///
/// Both values are at least 1; use `Paging::new` to build one from
/// untrusted numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    page: u32,
    items_per_page: u32,
}

impl Paging {
    /// Single page used for nearby-photo queries.
    pub const NEARBY_PHOTOS_DEFAULT: Paging = Paging {
        page: 1,
        items_per_page: 1000,
    };

    /// First page of a matched-track query.
    pub const TRACKS_DEFAULT: Paging = Paging {
        page: 1,
        items_per_page: 1000,
    };

    /// Returns `None` when `page` or `items_per_page` is zero.
    pub fn new(page: u32, items_per_page: u32) -> Option<Self> {
        if page == 0 || items_per_page == 0 {
            return None;
        }
        Some(Self {
            page,
            items_per_page,
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn items_per_page(&self) -> u32 {
        self.items_per_page
    }
}

/// A single street-level photo.
///
/// Two photos are equal when they share sequence id and sequence index.
#[derive(Debug, Clone)]
pub struct Photo {
    pub id: u64,
    pub sequence_id: u64,
    pub sequence_index: u32,
    pub location: LatLon,
    pub heading: Option<f64>,
    pub username: Option<String>,
    /// Storage path of the full-size image, relative to the base URL.
    pub name: String,
    pub thumbnail_name: Option<String>,
    pub large_thumbnail_name: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl PartialEq for Photo {
    fn eq(&self, other: &Self) -> bool {
        self.sequence_id == other.sequence_id && self.sequence_index == other.sequence_index
    }
}

impl Eq for Photo {}

impl Hash for Photo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sequence_id.hash(state);
        self.sequence_index.hash(state);
    }
}

/// An ordered capture run. Photos are sorted by ascending, unique
/// sequence index.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub id: u64,
    pub photos: Vec<Photo>,
}

impl Sequence {
    pub fn photo_at(&self, index: u32) -> Option<&Photo> {
        self.photos
            .binary_search_by_key(&index, |p| p.sequence_index)
            .ok()
            .map(|pos| &self.photos[pos])
    }

    pub fn first(&self) -> Option<&Photo> {
        self.photos.first()
    }

    pub fn last(&self) -> Option<&Photo> {
        self.photos.last()
    }
}

/// A matched track: a polyline of road with OpenStreetCam coverage.
///
/// Identity is the exact geometry together with the id, when the service
/// sends one; `coverage` is metadata and does not take part in equality.
#[derive(Debug, Clone)]
pub struct Segment {
    pub id: Option<String>,
    pub geometry: Vec<LatLon>,
    /// Number of recorded passes over this segment.
    pub coverage: Option<u32>,
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.geometry.len() == other.geometry.len()
            && self
                .geometry
                .iter()
                .zip(&other.geometry)
                .all(|(a, b)| a.bits() == b.bits())
    }
}

impl Eq for Segment {}

impl Hash for Segment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        for point in &self.geometry {
            point.bits().hash(state);
        }
    }
}

/// What the map currently shows: photos when zoomed in, segments otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSet {
    Photos(Vec<Photo>),
    Segments(Vec<Segment>),
}

impl DataSet {
    pub fn photos(&self) -> Option<&[Photo]> {
        match self {
            DataSet::Photos(photos) => Some(photos),
            DataSet::Segments(_) => None,
        }
    }

    pub fn segments(&self) -> Option<&[Segment]> {
        match self {
            DataSet::Segments(segments) => Some(segments),
            DataSet::Photos(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn photo(sequence_id: u64, sequence_index: u32, lat: f64, lon: f64) -> Photo {
        Photo {
            id: sequence_id * 1000 + u64::from(sequence_index),
            sequence_id,
            sequence_index,
            location: LatLon::new(lat, lon),
            heading: None,
            username: None,
            name: format!("files/{sequence_id}/{sequence_index}.jpg"),
            thumbnail_name: None,
            large_thumbnail_name: None,
            timestamp: None,
        }
    }

    #[test]
    fn paging_rejects_zero_values() {
        assert!(Paging::new(0, 10).is_none());
        assert!(Paging::new(1, 0).is_none());
        let paging = Paging::new(3, 50).unwrap();
        assert_eq!(paging.page(), 3);
        assert_eq!(paging.items_per_page(), 50);
    }

    #[test]
    fn photo_identity_ignores_attributes() {
        let a = photo(7, 2, 1.0, 1.0);
        let mut b = photo(7, 2, 5.0, 5.0);
        b.username = Some("someone".to_string());
        assert_eq!(a, b);
        assert_ne!(a, photo(7, 3, 1.0, 1.0));
    }

    #[test]
    fn segments_dedupe_on_id_and_geometry() {
        let geometry = vec![LatLon::new(1.0, 2.0), LatLon::new(1.5, 2.5)];
        let a = Segment {
            id: Some("s1".to_string()),
            geometry: geometry.clone(),
            coverage: Some(1),
        };
        let b = Segment {
            id: Some("s1".to_string()),
            geometry,
            coverage: Some(4),
        };
        let c = Segment {
            id: Some("s1".to_string()),
            geometry: vec![LatLon::new(1.0, 2.0)],
            coverage: Some(1),
        };
        let set: HashSet<Segment> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn segments_without_id_dedupe_on_geometry() {
        let segment = |id: Option<&str>, lat: f64| Segment {
            id: id.map(str::to_string),
            geometry: vec![LatLon::new(lat, 2.0)],
            coverage: None,
        };
        let set: HashSet<Segment> = [
            segment(None, 1.0),
            segment(None, 1.0),
            segment(None, 3.0),
            segment(Some("s1"), 1.0),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn sequence_photo_at_uses_index() {
        let sequence = Sequence {
            id: 7,
            photos: vec![photo(7, 0, 0.0, 0.0), photo(7, 1, 0.0, 0.0), photo(7, 4, 0.0, 0.0)],
        };
        assert_eq!(sequence.photo_at(4).map(|p| p.sequence_index), Some(4));
        assert!(sequence.photo_at(2).is_none());
    }

    #[test]
    fn circumscribed_circle_reaches_corner() {
        let area = BoundingBox::new(LatLon::new(46.0, 23.0), LatLon::new(45.0, 24.0));
        let circle = area.circumscribed_circle();
        assert_eq!(circle.center, LatLon::new(45.5, 23.5));
        let to_corner = circle.center.distance_to(&area.bottom_right);
        assert!(circle.radius > 60_000.0);
        assert!((circle.radius - to_corner).abs() < 1_000.0);
    }

    #[test]
    fn latlon_param_format() {
        assert_eq!(LatLon::new(10.0, 20.5).to_param(), "10,20.5");
    }
}
