//! The OpenStreetCam data service.
//!
//! # Design
//! `Service` is constructed explicitly and holds only configuration and an
//! `HttpClient`; no state survives between calls. Every operation follows
//! the same steps: build form parameters, POST, parse the envelope, check
//! its status, then unwrap the payload. `list_matched_tracks` additionally
//! fans the remaining pages out to a bounded set of scoped worker threads
//! and merges all pages only if every one of them succeeded.

use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::{MalformedResponseError, ServiceError};
use crate::http::{FormParams, HttpClient, Transport, UreqTransport};
use crate::request;
use crate::response::{self, Envelope, ListResponse};
use crate::types::{BoundingBox, Circle, Paging, Photo, Segment, Sequence};

type PageResult = Result<Vec<Segment>, ServiceError>;

/// Client for the OpenStreetCam API.
///
/// Cheap to clone and safe to share between threads.
#[derive(Debug, Clone)]
pub struct Service {
    config: ServiceConfig,
    http: HttpClient,
}

impl Service {
    /// A service that talks to the network through `ureq`.
    pub fn new(config: ServiceConfig) -> Self {
        let transport = Arc::new(UreqTransport::new(&config));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: ServiceConfig, transport: Arc<dyn Transport>) -> Self {
        let http = HttpClient::new(transport, &config.user_agent);
        Self { config, http }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Photos inside `circle`, optionally only those uploaded since `date`
    /// or by the OSM user `osm_user_id`.
    pub fn list_nearby_photos(
        &self,
        circle: &Circle,
        date: Option<NaiveDate>,
        osm_user_id: Option<u64>,
    ) -> Result<Vec<Photo>, ServiceError> {
        let paging = Paging::new(1, self.config.nearby_photos_max_items)
            .unwrap_or(Paging::NEARBY_PHOTOS_DEFAULT);
        let params = request::nearby_photos(circle, date, osm_user_id, paging);
        let url = format!("{}{}", self.config.service_url, request::LIST_NEARBY_PHOTOS);
        let response: Option<ListResponse<Photo>> = self.post(&url, params, response::parse)?;
        Ok(response.map(ListResponse::into_items).unwrap_or_default())
    }

    /// The photos of one sequence, or `None` when the service has no such
    /// sequence.
    pub fn retrieve_sequence(&self, sequence_id: u64) -> Result<Option<Sequence>, ServiceError> {
        let params = request::sequence_photo_list(sequence_id);
        let url = format!("{}{}", self.config.service_url, request::SEQUENCE_PHOTO_LIST);
        let response = self.post(&url, params, response::parse_sequence)?;
        Ok(response.and_then(|r| r.osv))
    }

    /// Raw image bytes of the photo stored under `name`.
    pub fn retrieve_photo(&self, name: &str) -> Result<Vec<u8>, ServiceError> {
        let url = format!("{}/{}", self.config.base_url, name.trim_start_matches('/'));
        Ok(self.http.get_bytes(&url)?)
    }

    /// Segments with coverage inside `area`, fetched across as many pages as
    /// the service reports and deduplicated.
    pub fn list_matched_tracks(
        &self,
        area: &BoundingBox,
        osm_user_id: Option<u64>,
        zoom: u32,
    ) -> Result<Vec<Segment>, ServiceError> {
        let max_items = self.config.tracks_max_items;
        let first_page = Paging::new(1, max_items).unwrap_or(Paging::TRACKS_DEFAULT);
        let Some(first) = self.matched_tracks_page(area, osm_user_id, zoom, first_page)? else {
            return Ok(Vec::new());
        };

        let total_items = first.total_items;
        let mut pages = vec![first.into_items()];
        let page_count = page_count(total_items, max_items);
        if page_count > 1 {
            info!(total_items, page_count, "fetching remaining track pages");
            pages.extend(self.fetch_remaining_pages(area, osm_user_id, zoom, page_count)?);
        }
        Ok(merge_unique(pages))
    }

    /// Fetch pages `2..=page_count` on at most `tracks_max_workers` scoped
    /// threads draining a shared page counter. Pages are claimed in
    /// ascending order, so when one fails every lower page has already been
    /// claimed and the first failure in page order is still the one
    /// reported. Either every page succeeds or nothing is kept.
    fn fetch_remaining_pages(
        &self,
        area: &BoundingBox,
        osm_user_id: Option<u64>,
        zoom: u32,
        page_count: u32,
    ) -> Result<Vec<Vec<Segment>>, ServiceError> {
        let next_page = AtomicU64::new(2);
        let failed = AtomicBool::new(false);
        let extra_pages = usize::try_from(page_count - 1).unwrap_or(usize::MAX);
        let worker_count = self.config.tracks_max_workers.clamp(1, extra_pages);
        debug!(worker_count, extra_pages, "starting track page workers");

        let mut fetched = thread::scope(|scope| -> Result<BTreeMap<u32, PageResult>, ServiceError> {
            let mut workers = Vec::with_capacity(worker_count);
            for n in 0..worker_count {
                let spawned = thread::Builder::new()
                    .name(format!("osc-tracks-{n}"))
                    .spawn_scoped(scope, || {
                        let mut done = Vec::new();
                        while !failed.load(Ordering::Acquire) {
                            let claimed = next_page.fetch_add(1, Ordering::AcqRel);
                            let Some(page) = u32::try_from(claimed).ok().filter(|p| *p <= page_count)
                            else {
                                break;
                            };
                            let result = self.fetch_extra_page(area, osm_user_id, zoom, page);
                            if result.is_err() {
                                failed.store(true, Ordering::Release);
                            }
                            done.push((page, result));
                        }
                        done
                    });
                match spawned {
                    Ok(worker) => workers.push(worker),
                    Err(err) if workers.is_empty() => return Err(ServiceError::Spawn(err)),
                    Err(err) => {
                        warn!(workers = workers.len(), error = %err, "continuing with fewer track workers");
                        break;
                    }
                }
            }
            Ok(workers
                .into_iter()
                .filter_map(|worker| worker.join().ok())
                .flatten()
                .collect())
        })?;

        let mut pages = Vec::with_capacity(fetched.len());
        for page in 2..=page_count {
            match fetched.remove(&page) {
                Some(Ok(items)) => pages.push(items),
                Some(Err(ServiceError::WorkerPanicked { .. })) | None => {
                    warn!(page, "track page worker panicked");
                    return Err(ServiceError::WorkerPanicked { page });
                }
                Some(Err(source)) => {
                    warn!(page, error = %source, "track page failed");
                    return Err(ServiceError::PageFetch {
                        page,
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(pages)
    }

    /// One extra page of tracks; a panic while fetching it is reported
    /// against the page.
    fn fetch_extra_page(
        &self,
        area: &BoundingBox,
        osm_user_id: Option<u64>,
        zoom: u32,
        page: u32,
    ) -> PageResult {
        let paging = Paging::new(page, self.config.tracks_max_items.max(1))
            .unwrap_or(Paging::TRACKS_DEFAULT);
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.matched_tracks_page(area, osm_user_id, zoom, paging)
        }))
        .unwrap_or_else(|_| Err(ServiceError::WorkerPanicked { page }))
        .map(|response| response.map(ListResponse::into_items).unwrap_or_default())
    }

    fn matched_tracks_page(
        &self,
        area: &BoundingBox,
        osm_user_id: Option<u64>,
        zoom: u32,
        paging: Paging,
    ) -> Result<Option<ListResponse<Segment>>, ServiceError> {
        let params = request::matched_tracks(area, osm_user_id, zoom, paging);
        let url = format!("{}{}", self.config.base_url, request::LIST_MATCHED_TRACKS);
        self.post(&url, params, response::parse)
    }

    /// POST, parse with `parse`, and reject envelopes with an error status.
    fn post<T, P>(&self, url: &str, params: FormParams, parse: P) -> Result<Option<T>, ServiceError>
    where
        T: Envelope,
        P: FnOnce(&str) -> Result<Option<T>, MalformedResponseError>,
    {
        let body = self.http.post_form(url, params)?;
        let envelope = parse(&body)?;
        if let Some(status) = envelope.as_ref().and_then(Envelope::status) {
            debug!(url, http_code = ?status.http_code, api_code = ?status.api_code, "envelope");
            if status.is_error() {
                let message = status.message();
                warn!(url, %message, "service reported an error");
                return Err(ServiceError::Api {
                    code: status.http_code.unwrap_or_default(),
                    message,
                });
            }
        }
        Ok(envelope)
    }
}

/// Number of pages needed for `total_items`, never less than one.
fn page_count(total_items: u64, max_items: u32) -> u32 {
    let max_items = u64::from(max_items.max(1));
    if total_items <= max_items {
        return 1;
    }
    u32::try_from(total_items.div_ceil(max_items)).unwrap_or(u32::MAX)
}

/// Concatenate pages in order, keeping the first occurrence of each segment.
fn merge_unique(pages: Vec<Vec<Segment>>) -> Vec<Segment> {
    let mut seen = HashSet::new();
    pages
        .into_iter()
        .flatten()
        .filter(|segment| seen.insert(segment.clone()))
        .collect()
}
