//! Form parameters for each OpenStreetCam query.
//!
//! Pure functions from typed arguments to `FormParams`. Absent optional
//! values produce no parameter at all.

use chrono::NaiveDate;

use crate::http::FormParams;
use crate::types::{BoundingBox, Circle, Paging};

pub const COORDINATE: &str = "coordinate";
pub const RADIUS: &str = "radius";
pub const PAGE: &str = "page";
pub const PAGE_ITEMS: &str = "ipp";
pub const DATE: &str = "date";
pub const SEQUENCE_ID: &str = "sequenceId";
pub const BBOX_TOP_LEFT: &str = "bbTopLeft";
pub const BBOX_BOTTOM_RIGHT: &str = "bbBottomRight";
pub const ZOOM: &str = "zoom";
pub const MY_TRACKS: &str = "myTracks";
pub const USER_TYPE: &str = "filterUserType";
pub const EXTERNAL_USER_ID: &str = "filterExternalUserId";

const MY_TRACKS_VALUE: &str = "true";
const USER_TYPE_OSM: &str = "osm";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Paths relative to `ServiceConfig::service_url`.
pub const LIST_NEARBY_PHOTOS: &str = "/list/nearby-photos/";
pub const SEQUENCE_PHOTO_LIST: &str = "/sequence/photo-list/";
/// Path relative to `ServiceConfig::base_url`.
pub const LIST_MATCHED_TRACKS: &str = "/tracks";

/// Parameters of a nearby-photo query.
pub fn nearby_photos(
    circle: &Circle,
    date: Option<NaiveDate>,
    osm_user_id: Option<u64>,
    paging: Paging,
) -> FormParams {
    let mut params = FormParams::new();
    push(&mut params, COORDINATE, circle.center.to_param());
    push(&mut params, RADIUS, circle.radius.to_string());
    if let Some(date) = date {
        push(&mut params, DATE, date.format(DATE_FORMAT).to_string());
    }
    push_user_filter(&mut params, osm_user_id);
    push_paging(&mut params, paging);
    params
}

/// Parameters of a sequence photo-list query.
pub fn sequence_photo_list(sequence_id: u64) -> FormParams {
    vec![(SEQUENCE_ID.to_string(), sequence_id.to_string())]
}

/// Parameters of one page of a matched-track query.
pub fn matched_tracks(
    area: &BoundingBox,
    osm_user_id: Option<u64>,
    zoom: u32,
    paging: Paging,
) -> FormParams {
    let mut params = FormParams::new();
    push(&mut params, BBOX_TOP_LEFT, area.top_left.to_param());
    push(&mut params, BBOX_BOTTOM_RIGHT, area.bottom_right.to_param());
    push(&mut params, ZOOM, zoom.to_string());
    push_user_filter(&mut params, osm_user_id);
    push_paging(&mut params, paging);
    params
}

fn push(params: &mut FormParams, key: &str, value: String) {
    params.push((key.to_string(), value));
}

fn push_user_filter(params: &mut FormParams, osm_user_id: Option<u64>) {
    if let Some(id) = osm_user_id {
        push(params, MY_TRACKS, MY_TRACKS_VALUE.to_string());
        push(params, USER_TYPE, USER_TYPE_OSM.to_string());
        push(params, EXTERNAL_USER_ID, id.to_string());
    }
}

fn push_paging(params: &mut FormParams, paging: Paging) {
    push(params, PAGE, paging.page().to_string());
    push(params, PAGE_ITEMS, paging.items_per_page().to_string());
}
