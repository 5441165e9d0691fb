use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::Result;
use crate::segment::SegmentList;

/// String key-value storage used for segment lists.
pub trait KeyValueStore {
    fn save(&mut self, key: &str, value: &str) -> Result<()>;

    fn load(&self, key: &str) -> Result<Option<String>>;
}

/// Identifier of the blob currently held by a [`BlobStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobHandle(u64);

/// Single-slot storage for the source media.
pub trait BlobStore {
    type Blob;

    /// Replaces the stored blob.
    fn put(&mut self, blob: Self::Blob) -> Result<BlobHandle>;

    fn get(&self) -> Result<Option<Self::Blob>>;

    fn clear(&mut self) -> Result<()>;
}

/// In-memory [`KeyValueStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: HashMap<String, String>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn save(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }
}

/// In-memory [`BlobStore`]; every `put` issues a new handle.
#[derive(Debug, Clone)]
pub struct MemoryBlobStore<B> {
    blob: Option<(BlobHandle, B)>,
    next_handle: u64,
}

impl<B> Default for MemoryBlobStore<B> {
    fn default() -> Self {
        Self {
            blob: None,
            next_handle: 1,
        }
    }
}

impl<B> MemoryBlobStore<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Option<BlobHandle> {
        self.blob.as_ref().map(|(handle, _)| *handle)
    }
}

impl<B> BlobStore for MemoryBlobStore<B>
where
    B: Clone,
{
    type Blob = B;

    fn put(&mut self, blob: B) -> Result<BlobHandle> {
        let handle = BlobHandle(self.next_handle);
        self.next_handle += 1;
        self.blob = Some((handle, blob));
        Ok(handle)
    }

    fn get(&self) -> Result<Option<B>> {
        Ok(self.blob.as_ref().map(|(_, blob)| blob.clone()))
    }

    fn clear(&mut self) -> Result<()> {
        self.blob = None;
        Ok(())
    }
}

/// Saves and restores segment lists per source, in the JSON pair format.
///
/// # Example
/// ```
/// use seam_engine::SegmentList;
/// use seam_engine::persistence::{MemoryKeyValueStore, SegmentLibrary};
///
/// let mut library = SegmentLibrary::new(MemoryKeyValueStore::new());
/// let segments = SegmentList::from_pairs(&[[0.0, 5.0], [7.5, 9.0]]);
/// library.save("demo.mp4", &segments).expect("save");
///
/// let restored = library.load("demo.mp4").expect("load");
/// assert_eq!(restored, Some(segments));
/// ```
#[derive(Debug)]
pub struct SegmentLibrary<K> {
    store: K,
}

impl<K> SegmentLibrary<K>
where
    K: KeyValueStore,
{
    pub fn new(store: K) -> Self {
        Self { store }
    }

    /// Storage key for the segment list of `source_name`.
    pub fn key(source_name: &str) -> String {
        format!("segments:{source_name}")
    }

    pub fn save(&mut self, source_name: &str, segments: &SegmentList) -> Result<()> {
        let json = segments.to_json()?;
        self.store.save(&Self::key(source_name), &json)?;
        debug!(source = source_name, segment_count = segments.len(), "segments saved");
        Ok(())
    }

    /// Returns `None` when nothing was saved for `source_name`.
    pub fn load(&self, source_name: &str) -> Result<Option<SegmentList>> {
        let Some(json) = self.store.load(&Self::key(source_name))? else {
            return Ok(None);
        };
        let segments = SegmentList::from_json(&json).inspect_err(|error| {
            warn!(source = source_name, %error, "stored segment list is malformed");
        })?;
        Ok(Some(segments))
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn into_inner(self) -> K {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::{BlobStore, KeyValueStore, MemoryBlobStore, MemoryKeyValueStore, SegmentLibrary};
    use crate::error::PlayerError;
    use crate::segment::SegmentList;

    #[test]
    fn segment_lists_are_keyed_by_source_name() {
        let mut library = SegmentLibrary::new(MemoryKeyValueStore::new());
        library
            .save("a.mp4", &SegmentList::from_pairs(&[[0.0, 1.0]]))
            .expect("save a");
        library
            .save("b.mp4", &SegmentList::from_pairs(&[[2.0, 3.0]]))
            .expect("save b");

        let stored = library
            .store()
            .load("segments:a.mp4")
            .expect("load raw")
            .expect("value present");

        assert_eq!(stored, "[[0.0,1.0]]");
        assert_eq!(library.store().len(), 2);
    }

    #[test]
    fn missing_source_loads_as_none() {
        let library = SegmentLibrary::new(MemoryKeyValueStore::new());

        assert_eq!(library.load("missing.mp4").expect("load"), None);
    }

    #[test]
    fn malformed_stored_value_is_an_invalid_segment_list() {
        let mut store = MemoryKeyValueStore::new();
        store
            .save("segments:demo.mp4", "{\"start\": 1}")
            .expect("save raw");
        let library = SegmentLibrary::new(store);

        let result = library.load("demo.mp4");

        assert!(matches!(result, Err(PlayerError::InvalidSegmentList { .. })));
    }

    #[test]
    fn fractional_boundaries_survive_a_save_and_load() {
        let mut library = SegmentLibrary::new(MemoryKeyValueStore::new());
        let segments = SegmentList::from_pairs(&[[0.1, 0.30000000000000004], [1.0 / 3.0, 2.5]]);

        library.save("demo.mp4", &segments).expect("save");

        assert_eq!(library.load("demo.mp4").expect("load"), Some(segments));
    }

    #[test]
    fn blob_store_holds_one_blob_and_issues_fresh_handles() {
        let mut blobs = MemoryBlobStore::new();
        let first = blobs.put(vec![1_u8, 2, 3]).expect("put first");
        let second = blobs.put(vec![4_u8]).expect("put second");

        assert_ne!(first, second);
        assert_eq!(blobs.handle(), Some(second));
        assert_eq!(blobs.get().expect("get"), Some(vec![4_u8]));

        blobs.clear().expect("clear");
        assert_eq!(blobs.get().expect("get"), None);
        assert_eq!(blobs.handle(), None);
    }
}
