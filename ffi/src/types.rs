//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type in C-compatible form: `*mut c_char` for
//! strings, pointer plus length for lists, and enums with explicit
//! discriminants. Lists are handed out as boxed slices so they can be
//! reclaimed with exactly the layout they were allocated with. Conversions
//! live here to keep `lib.rs` focused on the `extern "C"` surface.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;

use osc_core::{LatLon, Photo, Segment, Sequence, ServiceError, TransportError};

/// Opaque handle to an `osc_core::Service`. C callers receive a pointer to
/// this and pass it back into every FFI function.
pub struct OscService {
    pub(crate) inner: osc_core::Service,
}

// ---------------------------------------------------------------------------
// Result envelope
// ---------------------------------------------------------------------------

/// Error categories reported in `OscResult::error_code`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscErrorCode {
    Ok = 0,
    Transport = 1,
    MalformedResponse = 2,
    Api = 3,
    PageFetch = 4,
    Panic = 5,
    NullArg = 6,
    InvalidArg = 7,
}

/// Tag that tells `osc_free_result` what `OscResult::data` points to.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscDataTag {
    None = 0,
    PhotoList = 1,
    Sequence = 2,
    SegmentList = 3,
    Bytes = 4,
}

/// Result envelope for every service call.
///
/// On success `error_code` is `Ok`, `error_message` is null, and `data`
/// points to the payload named by `data_tag` (null with tag `None`).
/// On failure `error_message` is a C string and `data` is null.
/// `status_code` carries the status block's `httpCode` for `Api` errors
/// (and for `PageFetch` errors caused by one) and the HTTP status for failed
/// downloads; otherwise it is 0.
#[repr(C)]
pub struct OscResult {
    pub error_code: OscErrorCode,
    pub error_message: *mut c_char,
    pub status_code: u16,
    pub data_tag: OscDataTag,
    pub data: *mut c_void,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscLatLon {
    pub lat: f64,
    pub lon: f64,
}

/// A photo exposed to C. Absent strings are null, an absent heading is NaN,
/// and `timestamp` is only meaningful when `has_timestamp` is set.
#[repr(C)]
pub struct OscPhoto {
    pub id: u64,
    pub sequence_id: u64,
    pub sequence_index: u32,
    pub location: OscLatLon,
    pub heading: f64,
    pub username: *mut c_char,
    pub name: *mut c_char,
    pub thumbnail_name: *mut c_char,
    pub large_thumbnail_name: *mut c_char,
    pub has_timestamp: bool,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

#[repr(C)]
pub struct OscPhotoList {
    pub items: *mut OscPhoto,
    pub len: u32,
}

#[repr(C)]
pub struct OscSequence {
    pub id: u64,
    pub photos: *mut OscPhoto,
    pub len: u32,
}

/// A matched track. `id` is null when the service sent none and
/// `coverage` is -1 when unknown.
#[repr(C)]
pub struct OscSegment {
    pub id: *mut c_char,
    pub points: *mut OscLatLon,
    pub points_len: u32,
    pub coverage: i64,
}

#[repr(C)]
pub struct OscSegmentList {
    pub items: *mut OscSegment,
    pub len: u32,
}

#[repr(C)]
pub struct OscBytes {
    pub data: *mut u8,
    pub len: usize,
}

// ---------------------------------------------------------------------------
// Allocation helpers
// ---------------------------------------------------------------------------

/// Move `s` to the C heap. Interior NULs yield an empty string.
pub(crate) fn c_string(s: String) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

fn optional_c_string(s: Option<String>) -> *mut c_char {
    s.map_or(std::ptr::null_mut(), c_string)
}

/// Free a string made by `c_string`. Null is ignored.
///
/// # Safety
/// `s` must be null or come from `c_string` and not have been freed.
pub(crate) unsafe fn free_c_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

/// Hand a vector to C as pointer and length. Empty vectors become null.
fn into_raw_slice<T>(items: Vec<T>) -> (*mut T, usize) {
    if items.is_empty() {
        return (std::ptr::null_mut(), 0);
    }
    let len = items.len();
    (Box::into_raw(items.into_boxed_slice()) as *mut T, len)
}

/// Take back a slice made by `into_raw_slice`.
///
/// # Safety
/// `ptr` and `len` must come from one `into_raw_slice` call, not yet
/// reclaimed.
pub(crate) unsafe fn from_raw_slice<T>(ptr: *mut T, len: usize) -> Box<[T]> {
    if ptr.is_null() {
        return Box::default();
    }
    unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)) }
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<LatLon> for OscLatLon {
    fn from(p: LatLon) -> Self {
        OscLatLon {
            lat: p.lat,
            lon: p.lon,
        }
    }
}

impl OscPhoto {
    fn from_core(photo: Photo) -> Self {
        OscPhoto {
            id: photo.id,
            sequence_id: photo.sequence_id,
            sequence_index: photo.sequence_index,
            location: photo.location.into(),
            heading: photo.heading.unwrap_or(f64::NAN),
            username: optional_c_string(photo.username),
            name: c_string(photo.name),
            thumbnail_name: optional_c_string(photo.thumbnail_name),
            large_thumbnail_name: optional_c_string(photo.large_thumbnail_name),
            has_timestamp: photo.timestamp.is_some(),
            timestamp: photo.timestamp.map_or(0, |t| t.timestamp()),
        }
    }

    /// # Safety
    /// The string fields must come from `from_core`.
    pub(crate) unsafe fn free_fields(&self) {
        unsafe {
            free_c_string(self.username);
            free_c_string(self.name);
            free_c_string(self.thumbnail_name);
            free_c_string(self.large_thumbnail_name);
        }
    }
}

fn photos_to_raw(photos: Vec<Photo>) -> (*mut OscPhoto, u32) {
    let (items, len) = into_raw_slice(photos.into_iter().map(OscPhoto::from_core).collect());
    (items, len_u32(len))
}

impl OscSegment {
    fn from_core(segment: Segment) -> Self {
        let points = segment.geometry.into_iter().map(OscLatLon::from).collect();
        let (points, points_len) = into_raw_slice(points);
        OscSegment {
            id: optional_c_string(segment.id),
            points,
            points_len: len_u32(points_len),
            coverage: segment.coverage.map_or(-1, i64::from),
        }
    }

    /// # Safety
    /// Must have been built by `from_core`.
    pub(crate) unsafe fn free_fields(&self) {
        unsafe {
            free_c_string(self.id);
            drop(from_raw_slice(self.points, self.points_len as usize));
        }
    }
}

// ---------------------------------------------------------------------------
// Result constructors
// ---------------------------------------------------------------------------

impl OscResult {
    fn ok(data_tag: OscDataTag, data: *mut c_void) -> *mut Self {
        Box::into_raw(Box::new(OscResult {
            error_code: OscErrorCode::Ok,
            error_message: std::ptr::null_mut(),
            status_code: 0,
            data_tag,
            data,
        }))
    }

    fn error(error_code: OscErrorCode, status_code: u16, message: String) -> *mut Self {
        Box::into_raw(Box::new(OscResult {
            error_code,
            error_message: c_string(message),
            status_code,
            data_tag: OscDataTag::None,
            data: std::ptr::null_mut(),
        }))
    }

    pub(crate) fn ok_photo_list(photos: Vec<Photo>) -> *mut Self {
        let (items, len) = photos_to_raw(photos);
        let list = Box::new(OscPhotoList { items, len });
        Self::ok(OscDataTag::PhotoList, Box::into_raw(list) as *mut c_void)
    }

    /// `None` becomes a success with tag `None` and null data.
    pub(crate) fn ok_sequence(sequence: Option<Sequence>) -> *mut Self {
        let Some(sequence) = sequence else {
            return Self::ok(OscDataTag::None, std::ptr::null_mut());
        };
        let (photos, len) = photos_to_raw(sequence.photos);
        let sequence = Box::new(OscSequence {
            id: sequence.id,
            photos,
            len,
        });
        Self::ok(OscDataTag::Sequence, Box::into_raw(sequence) as *mut c_void)
    }

    pub(crate) fn ok_segment_list(segments: Vec<Segment>) -> *mut Self {
        let segments = segments.into_iter().map(OscSegment::from_core).collect();
        let (items, len) = into_raw_slice(segments);
        let list = Box::new(OscSegmentList {
            items,
            len: len_u32(len),
        });
        Self::ok(OscDataTag::SegmentList, Box::into_raw(list) as *mut c_void)
    }

    pub(crate) fn ok_bytes(bytes: Vec<u8>) -> *mut Self {
        let (data, len) = into_raw_slice(bytes);
        let bytes = Box::new(OscBytes { data, len });
        Self::ok(OscDataTag::Bytes, Box::into_raw(bytes) as *mut c_void)
    }

    /// Map a `ServiceError` onto an error code, keeping its display text.
    pub(crate) fn from_error(err: ServiceError) -> *mut Self {
        let message = err.to_string();
        let (code, status) = classify(&err);
        Self::error(code, status, message)
    }

    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::error(OscErrorCode::NullArg, 0, format!("null argument: {name}"))
    }

    pub(crate) fn invalid_arg(message: String) -> *mut Self {
        Self::error(OscErrorCode::InvalidArg, 0, message)
    }

    pub(crate) fn panic(message: &str) -> *mut Self {
        Self::error(OscErrorCode::Panic, 0, message.to_string())
    }
}

fn classify(err: &ServiceError) -> (OscErrorCode, u16) {
    match err {
        ServiceError::Transport(TransportError::Status { status, .. }) => {
            (OscErrorCode::Transport, *status)
        }
        ServiceError::Transport(_) => (OscErrorCode::Transport, 0),
        ServiceError::MalformedResponse(_) => (OscErrorCode::MalformedResponse, 0),
        ServiceError::Api { code, .. } => (OscErrorCode::Api, *code),
        ServiceError::PageFetch { source, .. } => (OscErrorCode::PageFetch, classify(source).1),
        ServiceError::WorkerPanicked { .. } => (OscErrorCode::Panic, 0),
        ServiceError::Spawn(_) => (OscErrorCode::PageFetch, 0),
    }
}
