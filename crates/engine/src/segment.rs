use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::time::{clamp_non_negative, format_seconds, round_for_display};

/// Length of a segment created by [`SegmentList::appended`].
pub const DEFAULT_SEGMENT_SECONDS: f64 = 5.0;

/// A `(start, end)` time range in source seconds.
///
/// Serialized as a two-element array `[start, end]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Segment {
    pub start: f64,
    pub end: f64,
}

/// Which boundary of a segment an edit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Start,
    End,
}

impl Segment {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Returns `end - start`; negative for inverted ranges.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Returns true when the range covers a positive amount of time.
    ///
    /// Zero-length and inverted ranges are kept in lists but never played.
    pub fn is_playable(&self) -> bool {
        self.end > self.start
    }

    pub fn display_start(&self) -> f64 {
        round_for_display(self.start)
    }

    pub fn display_end(&self) -> f64 {
        round_for_display(self.end)
    }

    /// Human-readable `start -> end` label with two decimals.
    pub fn label(&self) -> String {
        format!("{} -> {}", format_seconds(self.start), format_seconds(self.end))
    }

    fn edge(&self, edge: Edge) -> f64 {
        match edge {
            Edge::Start => self.start,
            Edge::End => self.end,
        }
    }

    fn with_edge(self, edge: Edge, value: f64) -> Self {
        match edge {
            Edge::Start => Self {
                start: value,
                ..self
            },
            Edge::End => Self { end: value, ..self },
        }
    }
}

impl From<[f64; 2]> for Segment {
    fn from([start, end]: [f64; 2]) -> Self {
        Self { start, end }
    }
}

impl From<Segment> for [f64; 2] {
    fn from(value: Segment) -> Self {
        [value.start, value.end]
    }
}

/// Immutable, index-addressed list of segments in playback order.
///
/// Every edit returns a new list; clones share storage, so a clone taken when
/// playback starts is unaffected by later edits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Segment>", into = "Vec<Segment>")]
pub struct SegmentList {
    segments: Arc<[Segment]>,
}

impl SegmentList {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            segments: segments.into(),
        }
    }

    /// Builds a list from `[start, end]` pairs without clamping.
    pub fn from_pairs(pairs: &[[f64; 2]]) -> Self {
        pairs.iter().copied().map(Segment::from).collect()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Segment> {
        self.segments.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn as_slice(&self) -> &[Segment] {
        &self.segments
    }

    pub fn to_pairs(&self) -> Vec<[f64; 2]> {
        self.segments.iter().copied().map(<[f64; 2]>::from).collect()
    }

    /// End of the last segment, or `0` for an empty list.
    pub fn last_end(&self) -> f64 {
        self.segments
            .last()
            .map(|segment| clamp_non_negative(segment.end))
            .unwrap_or(0.0)
    }

    /// Returns a list with `[last_end, last_end + length]` appended.
    ///
    /// # Example
    /// ```
    /// use seam_engine::SegmentList;
    ///
    /// let list = SegmentList::default().appended(5.0).appended(5.0);
    /// assert_eq!(list.to_pairs(), vec![[0.0, 5.0], [5.0, 10.0]]);
    /// ```
    #[must_use]
    pub fn appended(&self, length: f64) -> Self {
        let start = self.last_end();
        let mut segments = self.segments.to_vec();
        segments.push(Segment::new(start, start + length));
        Self::new(segments)
    }

    /// Returns a list where one boundary moved by `delta`, clamped to `>= 0`.
    pub fn with_adjusted_boundary(&self, index: usize, edge: Edge, delta: f64) -> Result<Self> {
        let current = self.checked(index)?;
        let value = clamp_non_negative(current.edge(edge) + delta);
        debug!(index, ?edge, delta, value, "segment boundary adjusted");
        Ok(self.replacing(index, current.with_edge(edge, value)))
    }

    /// Returns a list with the segment at `index` replaced, both values clamped to `>= 0`.
    pub fn with_updated(&self, index: usize, segment: Segment) -> Result<Self> {
        self.checked(index)?;
        let clamped = Segment::new(
            clamp_non_negative(segment.start),
            clamp_non_negative(segment.end),
        );
        Ok(self.replacing(index, clamped))
    }

    /// Returns a list without the segment at `index`; later entries shift down by one.
    pub fn without(&self, index: usize) -> Result<Self> {
        self.checked(index)?;
        let mut segments = self.segments.to_vec();
        segments.remove(index);
        Ok(Self::new(segments))
    }

    /// Serializes into the `[[start, end], ...]` wire format.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(PlayerError::SegmentSerialization)
    }

    /// Parses the `[[start, end], ...]` wire format.
    ///
    /// Anything other than an array of two-number arrays is rejected here, so
    /// playback never sees a malformed list. Values are kept as-is.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|error| PlayerError::InvalidSegmentList {
            reason: error.to_string(),
        })
    }

    fn checked(&self, index: usize) -> Result<Segment> {
        self.get(index).ok_or(PlayerError::IndexOutOfRange {
            index,
            len: self.len(),
        })
    }

    fn replacing(&self, index: usize, segment: Segment) -> Self {
        let mut segments = self.segments.to_vec();
        segments[index] = segment;
        Self::new(segments)
    }
}

impl From<Vec<Segment>> for SegmentList {
    fn from(value: Vec<Segment>) -> Self {
        Self::new(value)
    }
}

impl From<SegmentList> for Vec<Segment> {
    fn from(value: SegmentList) -> Self {
        value.segments.to_vec()
    }
}

impl FromIterator<Segment> for SegmentList {
    fn from_iter<T: IntoIterator<Item = Segment>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Editable segment list owned by the editing surface.
///
/// Each edit replaces the whole list. [`SegmentStore::snapshot`] hands out a
/// cheap copy that later edits never touch.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    segments: SegmentList,
    default_segment_seconds: f64,
}

impl Default for SegmentStore {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_SECONDS)
    }
}

impl SegmentStore {
    pub fn new(default_segment_seconds: f64) -> Self {
        Self {
            segments: SegmentList::default(),
            default_segment_seconds,
        }
    }

    /// Creates an empty store appending `config.default_segment_seconds`.
    pub fn with_config(config: &PlayerConfig) -> Self {
        Self::new(config.default_segment_seconds)
    }

    pub fn segments(&self) -> &SegmentList {
        &self.segments
    }

    pub fn snapshot(&self) -> SegmentList {
        self.segments.clone()
    }

    /// Appends a default-length segment after the current last one.
    pub fn append(&mut self) -> &SegmentList {
        self.segments = self.segments.appended(self.default_segment_seconds);
        &self.segments
    }

    pub fn adjust_boundary(&mut self, index: usize, edge: Edge, delta: f64) -> Result<&SegmentList> {
        self.segments = self.segments.with_adjusted_boundary(index, edge, delta)?;
        Ok(&self.segments)
    }

    pub fn update(&mut self, index: usize, segment: Segment) -> Result<&SegmentList> {
        self.segments = self.segments.with_updated(index, segment)?;
        Ok(&self.segments)
    }

    pub fn remove(&mut self, index: usize) -> Result<&SegmentList> {
        self.segments = self.segments.without(index)?;
        Ok(&self.segments)
    }

    /// Replaces the whole list, for example after loading it from storage.
    ///
    /// Bulk replacement keeps values unclamped.
    pub fn replace(&mut self, segments: SegmentList) {
        self.segments = segments;
    }
}

#[cfg(test)]
mod tests {
    use super::{Edge, Segment, SegmentList, SegmentStore};
    use crate::config::PlayerConfig;
    use crate::error::PlayerError;

    #[test]
    fn configured_segment_length_drives_append() {
        let config = PlayerConfig::from_toml_str("default_segment_seconds = 2.5")
            .expect("valid config");
        let mut store = SegmentStore::with_config(&config);

        store.append();
        store.append();

        assert_eq!(store.segments().to_pairs(), vec![[0.0, 2.5], [2.5, 5.0]]);
    }

    #[test]
    fn append_to_empty_list_starts_at_zero() {
        let mut store = SegmentStore::default();

        store.append();

        assert_eq!(store.segments().to_pairs(), vec![[0.0, 5.0]]);
    }

    #[test]
    fn append_starts_at_last_end_even_when_unordered() {
        let list = SegmentList::from_pairs(&[[10.0, 12.5], [2.0, 3.0]]);

        let appended = list.appended(5.0);

        assert_eq!(appended.get(2), Some(Segment::new(3.0, 8.0)));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn remove_shifts_later_indices_without_touching_values() {
        let mut store = SegmentStore::default();
        store.replace(SegmentList::from_pairs(&[[0.0, 2.0], [2.0, 4.0], [4.0, 6.0]]));

        store.remove(0).expect("remove should succeed");

        assert_eq!(store.segments().to_pairs(), vec![[2.0, 4.0], [4.0, 6.0]]);
    }

    #[test]
    fn adjust_start_below_zero_clamps_to_zero() {
        let list = SegmentList::from_pairs(&[[0.0, 5.0]]);

        let adjusted = list
            .with_adjusted_boundary(0, Edge::Start, -0.1)
            .expect("adjust should succeed");

        assert_eq!(adjusted.get(0), Some(Segment::new(0.0, 5.0)));
    }

    #[test]
    fn adjust_keeps_full_precision_while_display_rounds() {
        let list = SegmentList::from_pairs(&[[1.0, 5.0]]);

        let adjusted = list
            .with_adjusted_boundary(0, Edge::End, 0.004)
            .expect("adjust should succeed");
        let segment = adjusted.get(0).expect("segment exists");

        assert!((segment.end - 5.004).abs() < 1e-12);
        assert_eq!(segment.display_end(), 5.0);
        assert_eq!(segment.label(), "1.00 -> 5.00");
    }

    #[test]
    fn update_clamps_negative_values() {
        let list = SegmentList::from_pairs(&[[1.0, 2.0]]);

        let updated = list
            .with_updated(0, Segment::new(-3.0, 4.0))
            .expect("update should succeed");

        assert_eq!(updated.get(0), Some(Segment::new(0.0, 4.0)));
    }

    #[test]
    fn out_of_range_edits_report_index_and_length() {
        let list = SegmentList::from_pairs(&[[0.0, 1.0]]);

        assert!(matches!(
            list.without(3),
            Err(PlayerError::IndexOutOfRange { index: 3, len: 1 })
        ));
        assert!(matches!(
            list.with_adjusted_boundary(1, Edge::End, 1.0),
            Err(PlayerError::IndexOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn snapshot_is_not_affected_by_later_edits() {
        let mut store = SegmentStore::default();
        store.append();
        let snapshot = store.snapshot();

        store.append();
        store
            .adjust_boundary(0, Edge::End, 1.0)
            .expect("adjust should succeed");

        assert_eq!(snapshot.to_pairs(), vec![[0.0, 5.0]]);
    }

    #[test]
    fn json_round_trip_preserves_decimals_and_order() {
        let list = SegmentList::from_pairs(&[[0.1, 0.30000000000000004], [12.5, 3.25], [7.0, 7.0]]);

        let json = list.to_json().expect("serialize");
        let parsed = SegmentList::from_json(&json).expect("deserialize");

        assert_eq!(parsed, list);
    }

    #[test]
    fn json_accepts_integer_pairs() {
        let parsed = SegmentList::from_json("[[0,5],[5,12.5]]").expect("deserialize");

        assert_eq!(parsed.to_pairs(), vec![[0.0, 5.0], [5.0, 12.5]]);
    }

    #[test]
    fn json_rejects_non_array_shapes() {
        for input in [r#"{"start":0}"#, "[[0,1,2]]", "[[0]]", r#"[["a",1]]"#, "5"] {
            assert!(
                matches!(
                    SegmentList::from_json(input),
                    Err(PlayerError::InvalidSegmentList { .. })
                ),
                "{input} should be rejected"
            );
        }
    }
}
