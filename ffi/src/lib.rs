//! C-ABI wrapper around `osc-core`.
//!
//! # Overview
//! Exposes the OpenStreetCam service through `extern "C"` functions so any
//! language with a C FFI can list photos, sequences and matched tracks, and
//! download photo files. The library performs the HTTP itself.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - One `osc_*` function per service operation.
//! - A single `OscResult` envelope with `OscDataTag` + `void* data`
//!   conveys success payloads and errors uniformly.
//! - The C caller owns all returned pointers and must call the matching
//!   `osc_*_free` / `osc_free_*` function to release them.

pub mod types;

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::NaiveDate;
use osc_core::{BoundingBox, Circle, LatLon, Service, ServiceConfig};

use types::*;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

/// A rejected argument, turned into an `OscResult` at the boundary.
enum ArgError {
    Null(&'static str),
    Invalid(String),
}

impl ArgError {
    fn into_result(self) -> *mut OscResult {
        match self {
            ArgError::Null(name) => OscResult::null_arg(name),
            ArgError::Invalid(message) => OscResult::invalid_arg(message),
        }
    }
}

/// Borrow a nullable C string argument.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives
/// the returned borrow.
unsafe fn optional_str<'a>(ptr: *const c_char, name: &str) -> Result<Option<&'a str>, ArgError> {
    if ptr.is_null() {
        return Ok(None);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(Some)
        .map_err(|_| ArgError::Invalid(format!("{name} is not valid UTF-8")))
}

/// Negative ids mean "no user filter".
fn osm_user(osm_user_id: i64) -> Option<u64> {
    u64::try_from(osm_user_id).ok()
}

fn coordinate(lat: f64, lon: f64) -> Result<LatLon, ArgError> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(ArgError::Invalid(format!("invalid coordinate {lat},{lon}")));
    }
    Ok(LatLon::new(lat, lon))
}

/// Run `f` against the service behind `service`, turning a null handle or
/// a rejected argument into an error result and a panic into `Panic`.
fn with_service(
    service: *const OscService,
    f: impl FnOnce(&Service) -> Result<*mut OscResult, ArgError>,
) -> *mut OscResult {
    catch_unwind(AssertUnwindSafe(|| {
        if service.is_null() {
            return OscResult::null_arg("service");
        }
        let service = unsafe { &*service };
        f(&service.inner).unwrap_or_else(ArgError::into_result)
    }))
    .unwrap_or_else(|_| OscResult::panic("panic inside osc-ffi"))
}

fn respond<T>(
    result: Result<T, osc_core::ServiceError>,
    ok: impl FnOnce(T) -> *mut OscResult,
) -> Result<*mut OscResult, ArgError> {
    Ok(result.map_or_else(OscResult::from_error, ok))
}

// ---------------------------------------------------------------------------
// Service lifecycle
// ---------------------------------------------------------------------------

/// Create a service.
///
/// `base_url` may be null to use the public OpenStreetCam host.
/// `service_url` may be null to use `{base_url}/1.0`.
/// Returns null if either string is not valid UTF-8 or an internal panic
/// occurs. The caller must free the returned pointer with `osc_service_free`.
#[unsafe(no_mangle)]
pub extern "C" fn osc_service_new(
    base_url: *const c_char,
    service_url: *const c_char,
) -> *mut OscService {
    catch_unwind(|| {
        let urls = unsafe {
            (
                optional_str(base_url, "base_url"),
                optional_str(service_url, "service_url"),
            )
        };
        let (Ok(base_url), Ok(service_url)) = urls else {
            return std::ptr::null_mut();
        };
        let mut config = match base_url {
            Some(url) => ServiceConfig::with_base_url(url),
            None => ServiceConfig::default(),
        };
        if let Some(url) = service_url {
            config.service_url = url.trim_end_matches('/').to_string();
        }
        Box::into_raw(Box::new(OscService {
            inner: Service::new(config),
        }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a service created by `osc_service_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn osc_service_free(service: *mut OscService) {
    if !service.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(service) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Service operations
// ---------------------------------------------------------------------------

/// List photos within `radius` metres of (`lat`, `lon`).
///
/// `date` is null or `YYYY-MM-DD`; only photos since that day are listed.
/// `osm_user_id` < 0 lists photos of every user.
/// On success `data_tag` is `PhotoList`.
#[unsafe(no_mangle)]
pub extern "C" fn osc_list_nearby_photos(
    service: *const OscService,
    lat: f64,
    lon: f64,
    radius: f64,
    date: *const c_char,
    osm_user_id: i64,
) -> *mut OscResult {
    with_service(service, |service| {
        let center = coordinate(lat, lon)?;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ArgError::Invalid(format!("invalid radius {radius}")));
        }
        let date = match unsafe { optional_str(date, "date")? } {
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, DATE_FORMAT)
                    .map_err(|_| ArgError::Invalid(format!("invalid date {raw:?}")))?,
            ),
            None => None,
        };
        let circle = Circle::new(center, radius);
        respond(
            service.list_nearby_photos(&circle, date, osm_user(osm_user_id)),
            OscResult::ok_photo_list,
        )
    })
}

/// Fetch the photos of one sequence.
///
/// On success `data_tag` is `Sequence`, or `None` with null data when the
/// service has no such sequence.
#[unsafe(no_mangle)]
pub extern "C" fn osc_retrieve_sequence(
    service: *const OscService,
    sequence_id: u64,
) -> *mut OscResult {
    with_service(service, |service| {
        respond(service.retrieve_sequence(sequence_id), OscResult::ok_sequence)
    })
}

/// List matched tracks inside the box spanned by the two corners, across
/// every result page. `osm_user_id` < 0 lists tracks of every user.
/// On success `data_tag` is `SegmentList`.
#[unsafe(no_mangle)]
pub extern "C" fn osc_list_matched_tracks(
    service: *const OscService,
    top_lat: f64,
    top_lon: f64,
    bottom_lat: f64,
    bottom_lon: f64,
    osm_user_id: i64,
    zoom: u32,
) -> *mut OscResult {
    with_service(service, |service| {
        let area = BoundingBox::new(
            coordinate(top_lat, top_lon)?,
            coordinate(bottom_lat, bottom_lon)?,
        );
        respond(
            service.list_matched_tracks(&area, osm_user(osm_user_id), zoom),
            OscResult::ok_segment_list,
        )
    })
}

/// Download the image stored under `name` (a photo's `name` or thumbnail
/// field). On success `data_tag` is `Bytes`.
#[unsafe(no_mangle)]
pub extern "C" fn osc_retrieve_photo(
    service: *const OscService,
    name: *const c_char,
) -> *mut OscResult {
    with_service(service, |service| {
        let name = unsafe { optional_str(name, "name")? }.ok_or(ArgError::Null("name"))?;
        respond(service.retrieve_photo(name), OscResult::ok_bytes)
    })
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `OscResult` returned by any `osc_*` operation.
/// Safe to call with null. Uses `data_tag` to determine what `data` points to.
#[unsafe(no_mangle)]
pub extern "C" fn osc_free_result(result: *mut OscResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let result = unsafe { Box::from_raw(result) };
        unsafe { free_c_string(result.error_message) };
        if result.data.is_null() {
            return;
        }
        match result.data_tag {
            OscDataTag::PhotoList => {
                let list = unsafe { Box::from_raw(result.data as *mut OscPhotoList) };
                unsafe { free_photos(list.items, list.len) };
            }
            OscDataTag::Sequence => {
                let sequence = unsafe { Box::from_raw(result.data as *mut OscSequence) };
                unsafe { free_photos(sequence.photos, sequence.len) };
            }
            OscDataTag::SegmentList => {
                let list = unsafe { Box::from_raw(result.data as *mut OscSegmentList) };
                let items = unsafe { from_raw_slice(list.items, list.len as usize) };
                for segment in items.iter() {
                    unsafe { segment.free_fields() };
                }
            }
            OscDataTag::Bytes => {
                let bytes = unsafe { Box::from_raw(result.data as *mut OscBytes) };
                drop(unsafe { from_raw_slice(bytes.data, bytes.len) });
            }
            OscDataTag::None => {}
        }
    }));
}

/// # Safety
/// `items` and `len` must describe a photo slice owned by a result.
unsafe fn free_photos(items: *mut OscPhoto, len: u32) {
    let photos = unsafe { from_raw_slice(items, len as usize) };
    for photo in photos.iter() {
        unsafe { photo.free_fields() };
    }
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn osc_free_string(s: *mut c_char) {
    let _ = catch_unwind(|| unsafe { free_c_string(s) });
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn text(ptr: *const c_char) -> &'static str {
        unsafe { CStr::from_ptr(ptr) }.to_str().unwrap()
    }

    fn unreachable_service() -> *mut OscService {
        let url = CString::new("http://127.0.0.1:9").unwrap();
        osc_service_new(url.as_ptr(), std::ptr::null())
    }

    /// Start the mock API on a random port and return its base URL.
    fn start_mock() -> CString {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_server::run(listener, mock_server::demo_fixtures()).await
            })
            .unwrap();
        });

        CString::new(format!("http://{addr}")).unwrap()
    }

    // --- lifecycle ---

    #[test]
    fn service_new_and_free() {
        let url = CString::new("http://localhost:3000").unwrap();
        let service = osc_service_new(url.as_ptr(), std::ptr::null());
        assert!(!service.is_null());
        let inner = unsafe { &(*service).inner };
        assert_eq!(inner.config().service_url, "http://localhost:3000/1.0");
        osc_service_free(service);
    }

    #[test]
    fn service_new_with_defaults() {
        let service = osc_service_new(std::ptr::null(), std::ptr::null());
        assert!(!service.is_null());
        let inner = unsafe { &(*service).inner };
        assert_eq!(inner.config().base_url, "http://openstreetcam.org");
        osc_service_free(service);
    }

    #[test]
    fn service_new_with_explicit_service_url() {
        let base = CString::new("http://host").unwrap();
        let api = CString::new("http://api.host/2.0/").unwrap();
        let service = osc_service_new(base.as_ptr(), api.as_ptr());
        let inner = unsafe { &(*service).inner };
        assert_eq!(inner.config().service_url, "http://api.host/2.0");
        osc_service_free(service);
    }

    #[test]
    fn service_new_rejects_invalid_utf8() {
        let bytes = [0xffu8, 0xfe, 0];
        let service = osc_service_new(bytes.as_ptr() as *const c_char, std::ptr::null());
        assert!(service.is_null());
    }

    #[test]
    fn service_free_null_is_safe() {
        osc_service_free(std::ptr::null_mut());
    }

    // --- argument checks ---

    #[test]
    fn null_service_returns_null_arg() {
        let result = osc_retrieve_sequence(std::ptr::null(), 1);
        let r = unsafe { &*result };
        assert_eq!(r.error_code, OscErrorCode::NullArg);
        assert_eq!(text(r.error_message), "null argument: service");
        osc_free_result(result);
    }

    #[test]
    fn null_photo_name_returns_null_arg() {
        let service = unreachable_service();
        let result = osc_retrieve_photo(service, std::ptr::null());
        let r = unsafe { &*result };
        assert_eq!(r.error_code, OscErrorCode::NullArg);
        osc_free_result(result);
        osc_service_free(service);
    }

    #[test]
    fn invalid_date_returns_invalid_arg() {
        let service = unreachable_service();
        let date = CString::new("09/03/2017").unwrap();
        let result = osc_list_nearby_photos(service, 46.77, 23.6, 50.0, date.as_ptr(), -1);
        let r = unsafe { &*result };
        assert_eq!(r.error_code, OscErrorCode::InvalidArg);
        assert!(text(r.error_message).contains("09/03/2017"));
        osc_free_result(result);
        osc_service_free(service);
    }

    #[test]
    fn invalid_radius_and_coordinates_return_invalid_arg() {
        let service = unreachable_service();

        let result = osc_list_nearby_photos(service, 46.77, 23.6, 0.0, std::ptr::null(), -1);
        assert_eq!(unsafe { &*result }.error_code, OscErrorCode::InvalidArg);
        osc_free_result(result);

        let result = osc_list_matched_tracks(service, 91.0, 23.6, 46.7, 23.7, -1, 12);
        assert_eq!(unsafe { &*result }.error_code, OscErrorCode::InvalidArg);
        osc_free_result(result);

        osc_service_free(service);
    }

    #[test]
    fn osm_user_filter_from_signed_id() {
        assert_eq!(osm_user(-1), None);
        assert_eq!(osm_user(0), Some(0));
        assert_eq!(osm_user(4242), Some(4242));
    }

    #[test]
    fn free_result_null_is_safe() {
        osc_free_result(std::ptr::null_mut());
    }

    #[test]
    fn free_string_null_is_safe() {
        osc_free_string(std::ptr::null_mut());
    }

    // --- against the mock API ---

    #[test]
    fn round_trip_against_mock_server() {
        let base = start_mock();
        let service = osc_service_new(base.as_ptr(), std::ptr::null());
        assert!(!service.is_null());

        // nearby photos
        let result = osc_list_nearby_photos(service, 46.7712, 23.6236, 50.0, std::ptr::null(), -1);
        let r = unsafe { &*result };
        assert_eq!(r.error_code, OscErrorCode::Ok);
        assert_eq!(r.data_tag, OscDataTag::PhotoList);
        let list = unsafe { &*(r.data as *const OscPhotoList) };
        assert_eq!(list.len, 3);
        let photos = unsafe { std::slice::from_raw_parts(list.items, list.len as usize) };
        assert_eq!(photos[0].sequence_id, 77);
        assert_eq!(text(photos[0].username), "demo");
        assert_eq!(text(photos[1].name), "files/77/1.jpg");
        assert!(photos[1].large_thumbnail_name.is_null());
        assert!(photos[2].has_timestamp);
        assert_eq!(photos[2].timestamp, 1_489_050_000);
        osc_free_result(result);

        // sequence present
        let result = osc_retrieve_sequence(service, 77);
        let r = unsafe { &*result };
        assert_eq!(r.data_tag, OscDataTag::Sequence);
        let sequence = unsafe { &*(r.data as *const OscSequence) };
        assert_eq!(sequence.id, 77);
        assert_eq!(sequence.len, 3);
        let photos = unsafe { std::slice::from_raw_parts(sequence.photos, 3) };
        assert!(photos.iter().all(|p| p.username.is_null()));
        let indexes: Vec<u32> = photos.iter().map(|p| p.sequence_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        osc_free_result(result);

        // sequence absent
        let result = osc_retrieve_sequence(service, 5);
        let r = unsafe { &*result };
        assert_eq!(r.error_code, OscErrorCode::Ok);
        assert_eq!(r.data_tag, OscDataTag::None);
        assert!(r.data.is_null());
        osc_free_result(result);

        // matched tracks
        let result = osc_list_matched_tracks(service, 46.78, 23.61, 46.76, 23.64, -1, 12);
        let r = unsafe { &*result };
        assert_eq!(r.data_tag, OscDataTag::SegmentList);
        let list = unsafe { &*(r.data as *const OscSegmentList) };
        assert_eq!(list.len, 5);
        let segments = unsafe { std::slice::from_raw_parts(list.items, 5) };
        assert_eq!(text(segments[0].id), "way-0");
        assert_eq!(segments[0].points_len, 2);
        assert_eq!(segments[0].coverage, 1);
        osc_free_result(result);

        // photo bytes
        let name = CString::new("files/77/2.jpg").unwrap();
        let result = osc_retrieve_photo(service, name.as_ptr());
        let r = unsafe { &*result };
        assert_eq!(r.data_tag, OscDataTag::Bytes);
        let bytes = unsafe { &*(r.data as *const OscBytes) };
        let data = unsafe { std::slice::from_raw_parts(bytes.data, bytes.len) };
        assert_eq!(data, &[0xff, 0xd8, 0xff, 2]);
        osc_free_result(result);

        // missing photo
        let name = CString::new("files/77/9.jpg").unwrap();
        let result = osc_retrieve_photo(service, name.as_ptr());
        let r = unsafe { &*result };
        assert_eq!(r.error_code, OscErrorCode::Transport);
        assert_eq!(r.status_code, 404);
        assert!(!r.error_message.is_null());
        osc_free_result(result);

        osc_service_free(service);
    }

    #[test]
    fn unreachable_host_is_transport_error() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let url = CString::new(format!("http://{addr}")).unwrap();
        let service = osc_service_new(url.as_ptr(), std::ptr::null());

        let result = osc_retrieve_sequence(service, 1);
        let r = unsafe { &*result };
        assert_eq!(r.error_code, OscErrorCode::Transport);
        assert_eq!(r.status_code, 0);
        osc_free_result(result);
        osc_service_free(service);
    }
}
