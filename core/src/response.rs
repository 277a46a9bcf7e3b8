//! Response envelopes and the field adapters for `Photo`, `Sequence` and
//! `Segment`.
//!
//! # Design
//! The API wraps every payload in an envelope with a `status` object. Most
//! fields map structurally, but photos and segments do not: numbers often
//! arrive as strings, coordinates arrive as nested arrays, and sequence
//! listings leave out the sequence id on each photo. Those three types get
//! hand-written `Deserialize` impls that go through private wire structs.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::MalformedResponseError;
use crate::types::{LatLon, Photo, Segment, Sequence};

/// Status block carried by every envelope.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default, deserialize_with = "lenient_string")]
    pub api_code: Option<String>,
    #[serde(default)]
    pub api_message: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub http_code: Option<u16>,
    #[serde(default)]
    pub http_message: Option<String>,
}

impl Status {
    pub fn is_error(&self) -> bool {
        self.http_code.is_some_and(|code| code >= 400)
    }

    /// Human-readable failure text, preferring the API's own message.
    pub fn message(&self) -> String {
        [&self.api_message, &self.http_message]
            .into_iter()
            .flatten()
            .find(|m| !m.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| match self.http_code {
                Some(code) => format!("the service reported error {code}"),
                None => "the service reported an error".to_string(),
            })
    }
}

/// Anything with a status block that must be checked before the payload is
/// trusted.
pub trait Envelope {
    fn status(&self) -> Option<&Status>;
}

/// Envelope carrying a single item.
#[derive(Debug, Deserialize)]
pub struct Response<T> {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

/// Envelope carrying one page of a list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default = "Option::default")]
    pub current_page_items: Option<Vec<T>>,
    #[serde(default, deserialize_with = "item_count")]
    pub total_items: u64,
}

impl<T> ListResponse<T> {
    pub fn into_items(self) -> Vec<T> {
        self.current_page_items.unwrap_or_default()
    }
}

/// Envelope of the sequence photo-list endpoint.
#[derive(Debug, Deserialize)]
pub struct SequenceResponse {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub osv: Option<Sequence>,
}

impl<T> Envelope for Response<T> {
    fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }
}

impl<T> Envelope for ListResponse<T> {
    fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }
}

impl Envelope for SequenceResponse {
    fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }
}

/// Decode an envelope. A blank body means the service sent nothing and
/// yields `None`.
pub fn parse<T: DeserializeOwned>(body: &str) -> Result<Option<T>, MalformedResponseError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(body)?))
}

pub fn parse_item<T: DeserializeOwned>(body: &str) -> Result<Option<Response<T>>, MalformedResponseError> {
    parse(body)
}

pub fn parse_list<T: DeserializeOwned>(
    body: &str,
) -> Result<Option<ListResponse<T>>, MalformedResponseError> {
    parse(body)
}

pub fn parse_sequence(body: &str) -> Result<Option<SequenceResponse>, MalformedResponseError> {
    parse(body)
}

// ---------------------------------------------------------------------------
// Photo
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct WirePhoto {
    id: Value,
    #[serde(default)]
    sequence_id: Option<Value>,
    sequence_index: Value,
    lat: Value,
    lng: Value,
    #[serde(default)]
    heading: Option<Value>,
    name: String,
    #[serde(default)]
    th_name: Option<String>,
    #[serde(default)]
    lth_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    timestamp: Option<Value>,
}

impl WirePhoto {
    /// `fallback_sequence_id` fills in the id that sequence listings omit.
    fn into_photo(self, fallback_sequence_id: Option<u64>) -> Result<Photo, String> {
        let sequence_id = match self.sequence_id.as_ref().and_then(number::<u64>) {
            Some(id) => id,
            None => fallback_sequence_id.ok_or("photo without sequence_id")?,
        };
        let timestamp = match self.timestamp.as_ref().and_then(number::<i64>) {
            Some(secs) => Some(
                DateTime::<Utc>::from_timestamp(secs, 0)
                    .ok_or_else(|| format!("timestamp {secs} out of range"))?,
            ),
            None => None,
        };
        Ok(Photo {
            id: required(&self.id, "id")?,
            sequence_id,
            sequence_index: required(&self.sequence_index, "sequence_index")?,
            location: LatLon::new(required(&self.lat, "lat")?, required(&self.lng, "lng")?),
            heading: self.heading.as_ref().and_then(number),
            username: non_empty(self.username),
            name: self.name,
            thumbnail_name: non_empty(self.th_name),
            large_thumbnail_name: non_empty(self.lth_name),
            timestamp,
        })
    }
}

impl<'de> Deserialize<'de> for Photo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        WirePhoto::deserialize(deserializer)?
            .into_photo(None)
            .map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Sequence
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct WireSequence {
    id: Value,
    #[serde(default)]
    photos: Vec<WirePhoto>,
}

impl<'de> Deserialize<'de> for Sequence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireSequence::deserialize(deserializer)?;
        let id: u64 = required(&wire.id, "id").map_err(D::Error::custom)?;
        let mut photos = wire
            .photos
            .into_iter()
            .map(|photo| photo.into_photo(Some(id)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(D::Error::custom)?;
        photos.sort_by_key(|photo| photo.sequence_index);
        if let Some(pair) = photos
            .windows(2)
            .find(|pair| pair[0].sequence_index == pair[1].sequence_index)
        {
            return Err(D::Error::custom(format!(
                "sequence {id} repeats index {}",
                pair[0].sequence_index
            )));
        }
        Ok(Sequence { id, photos })
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct WireSegment {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    track: Vec<Vec<Value>>,
    #[serde(default)]
    coverage: Option<Value>,
}

impl<'de> Deserialize<'de> for Segment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireSegment::deserialize(deserializer)?;
        let id = match wire.id {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => non_empty(Some(s)),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(other) => return Err(D::Error::custom(format!("invalid segment id {other}"))),
        };
        let label = id.as_deref().unwrap_or("without id");
        let geometry = wire
            .track
            .iter()
            .map(|pair| match pair.as_slice() {
                [lat, lon] => Ok(LatLon::new(
                    required(lat, "track latitude")?,
                    required(lon, "track longitude")?,
                )),
                _ => Err(format!(
                    "segment {label} has a track point with {} coordinates",
                    pair.len()
                )),
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(D::Error::custom)?;
        Ok(Segment {
            id,
            geometry,
            coverage: wire.coverage.as_ref().and_then(number),
        })
    }
}

// ---------------------------------------------------------------------------
// Lenient scalar helpers
// ---------------------------------------------------------------------------

/// A number sent either as a JSON number or as a numeric string.
fn number<T: FromStr>(value: &Value) -> Option<T> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn required<T: FromStr>(value: &Value, field: &str) -> Result<T, String> {
    number(value).ok_or_else(|| format!("invalid {field}: {value}"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn lenient_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number))
}

/// `totalItems` decides how many pages are fetched, so anything but a
/// non-negative whole number is malformed. `null` counts as 0.
fn item_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let Some(value) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(0);
    };
    let count = match &value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_number)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_number))
        }
        _ => None,
    };
    count.ok_or_else(|| D::Error::custom(format!("invalid totalItems: {value}")))
}

fn whole_number(value: f64) -> Option<u64> {
    let whole = value.is_finite() && value >= 0.0 && value.fract() == 0.0;
    (whole && value < u64::MAX as f64).then_some(value as u64)
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
