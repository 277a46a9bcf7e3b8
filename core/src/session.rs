//! Browsing state for one map view: what is displayed and what is selected.
//!
//! # Design
//! A `Session` is an ordinary owned value; the host creates one per view and
//! drives it from its event handlers. Interested parties observe changes
//! through `subscribe`, which hands out an `mpsc::Receiver<SessionEvent>`.
//!
//! The sequence endpoint does not return uploader names, so a selected
//! sequence inherits the username of the selected photo.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

use chrono::NaiveDate;
use tracing::debug;

use crate::error::ServiceError;
use crate::service::Service;
use crate::types::{BoundingBox, DataSet, LatLon, Photo, Sequence};

/// Notifications sent to subscribers after the state changed.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DataSetChanged,
    PhotoSelected(Option<Photo>),
    SequenceSelected(Option<u64>),
}

#[derive(Debug)]
pub struct Session {
    data_set: Option<DataSet>,
    selected_photo: Option<Photo>,
    selected_sequence: Option<Sequence>,
    start_photo: Option<Photo>,
    closest_photos: Option<VecDeque<Photo>>,
    closest_photos_max_items: usize,
    subscribers: Vec<Sender<SessionEvent>>,
}

impl Session {
    /// `closest_photos_max_items` bounds each refill of the closest-photo
    /// queue.
    pub fn new(closest_photos_max_items: usize) -> Self {
        Self {
            data_set: None,
            selected_photo: None,
            selected_sequence: None,
            start_photo: None,
            closest_photos: None,
            closest_photos_max_items,
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn data_set(&self) -> Option<&DataSet> {
        self.data_set.as_ref()
    }

    pub fn selected_photo(&self) -> Option<&Photo> {
        self.selected_photo.as_ref()
    }

    pub fn selected_sequence(&self) -> Option<&Sequence> {
        self.selected_sequence.as_ref()
    }

    /// Replace the displayed data. With `check_selected_photo`, a selected
    /// photo that is not part of the new photos is dropped, and an active
    /// closest-photo queue is rebuilt around what remains selected.
    pub fn set_data_set(&mut self, data_set: Option<DataSet>, check_selected_photo: bool) {
        self.data_set = data_set;
        self.notify(SessionEvent::DataSetChanged);
        if check_selected_photo && self.selected_photo.is_some() {
            let still_present = match (&self.selected_photo, self.photos()) {
                (Some(selected), Some(photos)) => photos.contains(selected),
                _ => false,
            };
            if !still_present {
                self.select_photo(None);
            }
            if self.closest_photos.is_some() {
                self.select_start_photo_for_closest_action(self.selected_photo.clone());
            }
        }
    }

    /// Fetch what the map should show for `area` at `zoom`: photos from the
    /// configured photo zoom upwards, matched tracks below it.
    pub fn load_data_set(
        &mut self,
        service: &Service,
        area: &BoundingBox,
        zoom: u32,
        since: Option<NaiveDate>,
        osm_user_id: Option<u64>,
    ) -> Result<(), ServiceError> {
        let data_set = if zoom >= service.config().map_photo_zoom {
            let circle = area.circumscribed_circle();
            DataSet::Photos(service.list_nearby_photos(&circle, since, osm_user_id)?)
        } else {
            DataSet::Segments(service.list_matched_tracks(area, osm_user_id, zoom)?)
        };
        self.set_data_set(Some(data_set), true);
        Ok(())
    }

    pub fn select_photo(&mut self, photo: Option<Photo>) {
        self.selected_photo = photo;
        self.notify(SessionEvent::PhotoSelected(self.selected_photo.clone()));
    }

    /// Select a sequence, filling in missing usernames from the selected
    /// photo. If that photo has no username either, they stay empty.
    pub fn select_sequence(&mut self, sequence: Option<Sequence>) {
        self.selected_sequence = sequence.map(|mut sequence| {
            if let Some(username) = self.selected_photo.as_ref().and_then(|p| p.username.clone()) {
                for photo in sequence.photos.iter_mut().filter(|p| p.username.is_none()) {
                    photo.username = Some(username.clone());
                }
            }
            sequence
        });
        self.notify(SessionEvent::SequenceSelected(
            self.selected_sequence.as_ref().map(|s| s.id),
        ));
    }

    /// The photo at `index` in the selected sequence, or, with no sequence
    /// selected, the data-set photo at `index` in the selected photo's
    /// sequence.
    pub fn sequence_photo(&self, index: u32) -> Option<Photo> {
        if let Some(sequence) = &self.selected_sequence {
            return sequence.photo_at(index).cloned();
        }
        let sequence_id = self.selected_photo.as_ref()?.sequence_id;
        self.photos()?
            .iter()
            .find(|p| p.sequence_index == index && p.sequence_id == sequence_id)
            .cloned()
    }

    pub fn is_photo_part_of_sequence(&self, photo: &Photo) -> bool {
        self.selected_sequence
            .as_ref()
            .is_some_and(|sequence| sequence.photos.contains(photo))
    }

    /// True when a previous photo exists in the selected sequence.
    pub fn enable_previous_photo_action(&self) -> bool {
        match (&self.selected_sequence, &self.selected_photo) {
            (Some(sequence), Some(photo)) => sequence
                .first()
                .is_some_and(|first| first.sequence_index != photo.sequence_index),
            _ => false,
        }
    }

    /// True when a next photo exists in the selected sequence.
    pub fn enable_next_photo_action(&self) -> bool {
        match (&self.selected_sequence, &self.selected_photo) {
            (Some(sequence), Some(photo)) => sequence
                .last()
                .is_some_and(|last| last.sequence_index != photo.sequence_index),
            _ => false,
        }
    }

    /// The `prev_next_count` sequence neighbours on each side of the
    /// selected photo plus its `nearby_count` closest data-set photos.
    pub fn nearby_photos(&self, prev_next_count: u32, nearby_count: usize) -> Vec<Photo> {
        let Some(selected) = &self.selected_photo else {
            return Vec::new();
        };
        let mut result: Vec<Photo> = Vec::new();
        let mut add = |photo: Photo| {
            if !result.contains(&photo) {
                result.push(photo);
            }
        };
        for offset in 1..=prev_next_count {
            if let Some(next) = selected
                .sequence_index
                .checked_add(offset)
                .and_then(|index| self.sequence_photo(index))
            {
                add(next);
            }
            if let Some(prev) = selected
                .sequence_index
                .checked_sub(offset)
                .and_then(|index| self.sequence_photo(index))
            {
                add(prev);
            }
        }
        if let Some(photos) = self.photos() {
            for photo in closest_to(photos, selected, nearby_count) {
                add(photo);
            }
        }
        result
    }

    /// Start a fresh cycle of "jump to closest photo" from `photo`.
    pub fn select_start_photo_for_closest_action(&mut self, photo: Option<Photo>) {
        self.closest_photos = Some(match (&photo, self.photos()) {
            (Some(start), Some(photos)) => {
                closest_to(photos, start, self.closest_photos_max_items).into()
            }
            _ => VecDeque::new(),
        });
        self.start_photo = photo;
    }

    /// Next photo of the closest-photo cycle; refills the queue from the
    /// start photo once it is exhausted.
    pub fn closest_selected_photo(&mut self) -> Option<Photo> {
        let needs_refill = self.closest_photos.as_ref().map_or(true, VecDeque::is_empty);
        if needs_refill {
            let refill = match (&self.start_photo, self.photos()) {
                (Some(start), Some(photos)) => closest_to(photos, start, self.closest_photos_max_items),
                _ => Vec::new(),
            };
            debug!(count = refill.len(), "refilled closest photos");
            self.closest_photos = Some(refill.into());
        }
        self.closest_photos.as_mut()?.pop_front()
    }

    /// The photo nearest to `point` within `max_distance` metres, looking in
    /// the selected sequence first and then in the data set.
    pub fn nearby_photo(&self, point: &LatLon, max_distance: f64) -> Option<Photo> {
        let nearest = |photos: &[Photo]| {
            photos
                .iter()
                .map(|p| (p.location.distance_to(point), p))
                .filter(|(distance, _)| *distance <= max_distance)
                .min_by(|a, b| a.0.total_cmp(&b.0))
                .map(|(_, p)| p.clone())
        };
        self.selected_sequence
            .as_ref()
            .and_then(|s| nearest(&s.photos))
            .or_else(|| self.photos().and_then(nearest))
    }

    fn photos(&self) -> Option<&[Photo]> {
        self.data_set.as_ref().and_then(DataSet::photos)
    }

    fn notify(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Up to `count` photos nearest to `origin`, closest first, excluding
/// `origin` itself.
fn closest_to(photos: &[Photo], origin: &Photo, count: usize) -> Vec<Photo> {
    let mut by_distance: Vec<(f64, &Photo)> = photos
        .iter()
        .filter(|p| *p != origin)
        .map(|p| (p.location.distance_to(&origin.location), p))
        .collect();
    by_distance.sort_by(|a, b| a.0.total_cmp(&b.0));
    by_distance
        .into_iter()
        .take(count)
        .map(|(_, p)| p.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Segment;

    fn photo(sequence_id: u64, index: u32, lat: f64, lon: f64) -> Photo {
        Photo {
            id: sequence_id * 100 + u64::from(index),
            sequence_id,
            sequence_index: index,
            location: LatLon::new(lat, lon),
            heading: None,
            username: None,
            name: format!("{sequence_id}_{index}.jpg"),
            thumbnail_name: None,
            large_thumbnail_name: None,
            timestamp: None,
        }
    }

    fn with_user(mut photo: Photo, username: &str) -> Photo {
        photo.username = Some(username.to_string());
        photo
    }

    fn sequence(id: u64, count: u32) -> Sequence {
        Sequence {
            id,
            photos: (0..count).map(|i| photo(id, i, 46.0, 23.0 + f64::from(i) * 0.001)).collect(),
        }
    }

    #[test]
    fn selected_sequence_inherits_username() {
        let mut session = Session::new(5);
        session.select_photo(Some(with_user(photo(7, 1, 46.0, 23.0), "ana")));
        session.select_sequence(Some(sequence(7, 3)));
        let selected = session.selected_sequence().unwrap();
        assert!(selected
            .photos
            .iter()
            .all(|p| p.username.as_deref() == Some("ana")));
        assert_eq!(session.sequence_photo(2).unwrap().username.as_deref(), Some("ana"));
    }

    #[test]
    fn username_stays_empty_without_selected_username() {
        let mut session = Session::new(5);
        session.select_photo(Some(photo(7, 1, 46.0, 23.0)));
        session.select_sequence(Some(sequence(7, 3)));
        assert!(session
            .selected_sequence()
            .unwrap()
            .photos
            .iter()
            .all(|p| p.username.is_none()));
    }

    #[test]
    fn existing_usernames_are_kept() {
        let mut session = Session::new(5);
        session.select_photo(Some(with_user(photo(7, 0, 46.0, 23.0), "ana")));
        let mut seq = sequence(7, 2);
        seq.photos[1].username = Some("bob".to_string());
        session.select_sequence(Some(seq));
        let photos = &session.selected_sequence().unwrap().photos;
        assert_eq!(photos[0].username.as_deref(), Some("ana"));
        assert_eq!(photos[1].username.as_deref(), Some("bob"));
    }

    #[test]
    fn data_set_without_selected_photo_clears_selection() {
        let mut session = Session::new(5);
        let kept = photo(1, 0, 46.0, 23.0);
        session.set_data_set(Some(DataSet::Photos(vec![kept.clone()])), true);
        session.select_photo(Some(kept.clone()));

        session.set_data_set(Some(DataSet::Photos(vec![kept.clone(), photo(2, 0, 46.0, 23.1)])), true);
        assert_eq!(session.selected_photo(), Some(&kept));

        session.set_data_set(Some(DataSet::Segments(Vec::<Segment>::new())), true);
        assert!(session.selected_photo().is_none());
    }

    #[test]
    fn data_set_unchecked_keeps_selection() {
        let mut session = Session::new(5);
        session.select_photo(Some(photo(1, 0, 46.0, 23.0)));
        session.set_data_set(None, false);
        assert!(session.selected_photo().is_some());
    }

    #[test]
    fn sequence_photo_falls_back_to_data_set() {
        let mut session = Session::new(5);
        session.set_data_set(
            Some(DataSet::Photos(vec![
                photo(1, 0, 46.0, 23.0),
                photo(1, 1, 46.0, 23.001),
                photo(2, 1, 46.0, 23.002),
            ])),
            false,
        );
        session.select_photo(Some(photo(1, 0, 46.0, 23.0)));
        let next = session.sequence_photo(1).unwrap();
        assert_eq!(next.sequence_id, 1);
        assert!(session.sequence_photo(5).is_none());
    }

    #[test]
    fn previous_and_next_actions() {
        let mut session = Session::new(5);
        session.select_sequence(Some(sequence(3, 3)));
        session.select_photo(Some(photo(3, 0, 0.0, 0.0)));
        assert!(!session.enable_previous_photo_action());
        assert!(session.enable_next_photo_action());

        session.select_photo(Some(photo(3, 2, 0.0, 0.0)));
        assert!(session.enable_previous_photo_action());
        assert!(!session.enable_next_photo_action());

        assert!(session.is_photo_part_of_sequence(&photo(3, 1, 9.0, 9.0)));
        assert!(!session.is_photo_part_of_sequence(&photo(4, 1, 0.0, 0.0)));
    }

    #[test]
    fn nearby_photos_combines_neighbours_and_closest() {
        let mut session = Session::new(5);
        let selected = photo(1, 5, 46.0, 23.0);
        session.set_data_set(
            Some(DataSet::Photos(vec![
                selected.clone(),
                photo(1, 4, 46.0, 23.0001),
                photo(1, 6, 46.0, 23.0002),
                photo(9, 0, 46.0001, 23.0),
                photo(9, 1, 47.0, 24.0),
            ])),
            false,
        );
        session.select_photo(Some(selected));
        let nearby = session.nearby_photos(1, 2);
        let ids: Vec<(u64, u32)> = nearby.iter().map(|p| (p.sequence_id, p.sequence_index)).collect();
        assert_eq!(ids, vec![(1, 6), (1, 4), (9, 0)]);
    }

    #[test]
    fn closest_photo_cycle_refills() {
        let mut session = Session::new(2);
        let start = photo(1, 0, 46.0, 23.0);
        session.set_data_set(
            Some(DataSet::Photos(vec![
                start.clone(),
                photo(2, 0, 46.0, 23.001),
                photo(3, 0, 46.0, 23.002),
                photo(4, 0, 46.0, 23.003),
            ])),
            false,
        );
        session.select_start_photo_for_closest_action(Some(start));
        assert_eq!(session.closest_selected_photo().unwrap().sequence_id, 2);
        assert_eq!(session.closest_selected_photo().unwrap().sequence_id, 3);
        // queue held two photos; the next call starts over
        assert_eq!(session.closest_selected_photo().unwrap().sequence_id, 2);
    }

    #[test]
    fn closest_photo_without_start_is_none() {
        let mut session = Session::new(2);
        session.set_data_set(Some(DataSet::Photos(vec![photo(1, 0, 0.0, 0.0)])), false);
        assert!(session.closest_selected_photo().is_none());
    }

    #[test]
    fn nearby_photo_prefers_sequence() {
        let mut session = Session::new(2);
        session.set_data_set(Some(DataSet::Photos(vec![photo(9, 0, 46.0, 23.0)])), false);
        session.select_sequence(Some(sequence(3, 2)));
        let clicked = LatLon::new(46.0, 23.0);
        assert_eq!(session.nearby_photo(&clicked, 500.0).unwrap().sequence_id, 3);
        assert!(session.nearby_photo(&LatLon::new(10.0, 10.0), 500.0).is_none());
    }

    #[test]
    fn subscribers_receive_events() {
        let mut session = Session::new(2);
        let events = session.subscribe();
        session.select_photo(Some(photo(1, 0, 0.0, 0.0)));
        session.select_sequence(Some(sequence(1, 1)));
        session.set_data_set(None, false);
        let received: Vec<SessionEvent> = events.try_iter().collect();
        assert_eq!(received.len(), 3);
        assert!(matches!(received[0], SessionEvent::PhotoSelected(Some(_))));
        assert_eq!(received[1], SessionEvent::SequenceSelected(Some(1)));
        assert_eq!(received[2], SessionEvent::DataSetChanged);
    }

    #[test]
    fn dropped_subscriber_is_forgotten() {
        let mut session = Session::new(2);
        drop(session.subscribe());
        session.select_photo(None);
        assert!(session.subscribers.is_empty());
    }
}
