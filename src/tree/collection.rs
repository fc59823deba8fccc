//! An ordered set of page trees with a shared update protocol.
//!
//! The collection is the unit external analyzers talk to: each round they
//! produce one [`Prediction`] per *active leaf* (a leaf at the collection's
//! current maximum depth), and [`Collection::update`] distributes the batch
//! positionally. Leaves below the maximum depth were skipped by a previous
//! round; they are frozen and never receive further updates.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

use crate::core::config::LabelFormat;
use crate::core::errors::{QuireError, QuireResult};
use crate::domain::prediction::Prediction;
use crate::export::{self, ExportMetadata, Serializer};
use crate::tree::node::NodeId;
use crate::tree::page::Page;

const DEFAULT_LABEL: &str = "untitled_collection";
const SNAPSHOT_EXTENSION: &str = ".snapshot";

/// An ordered set of page trees plus export and persistence operations.
///
/// Page order is the lexicographic order of the source paths the collection
/// was built from and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pages: Vec<Page>,
    label: String,
    label_format: LabelFormat,
}

impl Collection {
    /// Builds a collection from image file paths.
    ///
    /// Paths are sorted lexicographically before opening. Files that cannot
    /// be read as images are skipped with a logged warning and excluded from
    /// the page list; an all-bad input yields an empty collection, not an
    /// error. The label defaults to the paths' first shared parent directory
    /// name.
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        paths.sort();
        let label = common_basename(&paths).unwrap_or_else(|| DEFAULT_LABEL.to_string());

        let mut pages = Vec::with_capacity(paths.len());
        for path in &paths {
            match Page::open(path) {
                Ok(page) => pages.push(page),
                Err(err) => warn!(path = %path.display(), %err, "skipping unreadable image"),
            }
        }
        info!(%label, pages = pages.len(), "initialized collection");
        Self {
            pages,
            label,
            label_format: LabelFormat::default(),
        }
    }

    /// Builds a collection from every file in a directory, labeled after the
    /// directory's basename.
    ///
    /// # Returns
    ///
    /// * `Ok(Collection)` - Pages for every readable image in the directory.
    /// * `Err(QuireError::Io)` - If the directory cannot be read.
    pub fn from_directory(path: impl AsRef<Path>) -> QuireResult<Self> {
        let path = path.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        let mut collection = Self::new(files);
        if let Some(name) = path.file_name() {
            collection.label = name.to_string_lossy().into_owned();
        }
        Ok(collection)
    }

    /// Sets the collection label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the label format used by the relabeling pass.
    pub fn with_label_format(mut self, label_format: LabelFormat) -> Self {
        self.label_format = label_format;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn pages_mut(&mut self) -> &mut [Page] {
        &mut self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Maximum tree depth across all pages; an empty collection is 0.
    pub fn max_depth(&self) -> usize {
        self.pages
            .iter()
            .map(Page::max_depth)
            .max()
            .unwrap_or(0)
    }

    /// The active leaves as `(page index, node id)` pairs, in page order and
    /// depth-first document order within each page.
    ///
    /// A leaf is active when its depth equals [`Collection::max_depth`],
    /// i.e. it was produced by the most recent segmentation round (or is a
    /// fresh page root). Shallower leaves are frozen and excluded.
    pub fn active_leaves(&self) -> Vec<(usize, NodeId)> {
        if self.pages.is_empty() {
            return Vec::new();
        }
        let max_depth = self.max_depth();
        let mut active = Vec::new();
        for (page_index, page) in self.pages.iter().enumerate() {
            for id in page.leaves() {
                if page.node(id).depth() == max_depth {
                    active.push((page_index, id));
                }
            }
        }
        active
    }

    /// Applies one batch of analyzer predictions to the active leaves,
    /// positionally, then relabels the whole collection.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every prediction was applied to its leaf.
    /// * `Err(QuireError::CountMismatch)` - If `predictions.len()` differs
    ///   from the number of active leaves; nothing is applied.
    pub fn update(&mut self, predictions: Vec<Prediction>) -> QuireResult<()> {
        let leaves = self.active_leaves();
        if leaves.len() != predictions.len() {
            return Err(QuireError::CountMismatch {
                results: predictions.len(),
                leaves: leaves.len(),
            });
        }
        for ((page_index, id), prediction) in leaves.into_iter().zip(predictions) {
            self.pages[page_index].update(id, prediction);
        }
        self.relabel();
        Ok(())
    }

    /// Recomputes every node label across all pages with the configured
    /// label format.
    pub fn relabel(&mut self) {
        for page in &mut self.pages {
            page.relabel(&self.label_format);
        }
    }

    /// Downscales every page to fit within `max_height` x `max_width`,
    /// preserving aspect ratio per page.
    pub fn set_size(&mut self, max_height: u32, max_width: u32) {
        for page in &mut self.pages {
            page.set_size(max_height, max_width);
        }
    }

    /// Rescales every page back to its source dimensions.
    pub fn to_original_size(&mut self) {
        for page in &mut self.pages {
            page.to_original_size();
        }
    }

    /// Materializes and returns the active leaves' images in active-leaf
    /// order; this is the image feed for the next analyzer round.
    pub fn active_images(&mut self) -> QuireResult<Vec<RgbImage>> {
        let leaves = self.active_leaves();
        let mut images = Vec::with_capacity(leaves.len());
        for (page_index, id) in leaves {
            images.push(self.pages[page_index].image(id)?.clone());
        }
        Ok(images)
    }

    /// Frees every cached image across all pages. Call before snapshotting
    /// a large collection to bound snapshot size and memory.
    pub fn clear_images(&mut self) {
        for page in &mut self.pages {
            page.clear_images();
        }
    }

    /// Writes the full collection graph to `{directory}/{filename}` as a
    /// gzip-compressed snapshot, defaulting the filename to
    /// `{label}.snapshot`. Cached images are included unless cleared first.
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - Where the snapshot was written.
    /// * `Err(QuireError::Io)` / `Err(QuireError::Json)` - On write failure.
    pub fn save_snapshot(
        &self,
        directory: impl AsRef<Path>,
        filename: Option<&str>,
    ) -> QuireResult<PathBuf> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory)?;
        let filename = filename
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}{SNAPSHOT_EXTENSION}", self.label));
        let path = directory.join(filename);

        let file = BufWriter::new(File::create(&path)?);
        let mut encoder = GzEncoder::new(file, Compression::default());
        serde_json::to_writer(&mut encoder, self)?;
        encoder.finish()?;
        info!(label = %self.label, path = %path.display(), "wrote collection snapshot");
        Ok(path)
    }

    /// Restores a collection from a snapshot written by
    /// [`Collection::save_snapshot`].
    ///
    /// # Returns
    ///
    /// * `Ok(Collection)` - The restored object graph.
    /// * `Err(QuireError::Snapshot)` - If the blob does not deserialize to a
    ///   collection.
    /// * `Err(QuireError::Io)` - If the file cannot be read.
    pub fn from_snapshot(path: impl AsRef<Path>) -> QuireResult<Self> {
        let path = path.as_ref();
        let file = BufReader::new(File::open(path)?);
        let decoder = GzDecoder::new(file);
        let collection: Self =
            serde_json::from_reader(decoder).map_err(|e| QuireError::snapshot(path, e))?;
        info!(label = %collection.label, path = %path.display(), "restored collection snapshot");
        Ok(collection)
    }

    /// Exports every page through the named format.
    ///
    /// See [`export::save_collection`] for the output layout and the
    /// preconditions it enforces.
    pub fn save(
        &mut self,
        directory: impl AsRef<Path>,
        format_name: &str,
    ) -> QuireResult<Vec<PathBuf>> {
        let serializer = export::get_serializer(format_name)?;
        self.save_with(directory, serializer.as_ref())
    }

    /// Exports every page through a pre-built serializer.
    pub fn save_with(
        &mut self,
        directory: impl AsRef<Path>,
        serializer: &dyn Serializer,
    ) -> QuireResult<Vec<PathBuf>> {
        export::save_collection(self, serializer, directory.as_ref(), &ExportMetadata::default())
    }

    /// Builds a collection around in-memory pages for tests that never touch
    /// pixel data.
    #[cfg(test)]
    pub(crate) fn synthetic(label: &str, pages: Vec<Page>) -> Self {
        Self {
            pages,
            label: label.to_string(),
            label_format: LabelFormat::default(),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "collection label: {}", self.label)?;
        writeln!(f, "collection tree:")?;
        for page in &self.pages {
            write!(f, "{page}")?;
        }
        Ok(())
    }
}

/// The name of the deepest directory shared by every path, or the parent
/// directory for a single path.
fn common_basename(paths: &[PathBuf]) -> Option<String> {
    let first = paths.first()?;
    if paths.len() == 1 {
        return component_name(first.parent()?);
    }
    let mut common: Vec<Component<'_>> = first.components().collect();
    for path in &paths[1..] {
        let mut shared = 0;
        for (a, b) in common.iter().zip(path.components()) {
            if *a == b {
                shared += 1;
            } else {
                break;
            }
        }
        common.truncate(shared);
    }
    match common.last()? {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    }
}

fn component_name(path: &Path) -> Option<String> {
    path.file_name().map(|s| s.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Bbox;
    use crate::domain::prediction::RecognizedText;
    use crate::domain::segment::Segment;

    fn segment_at(x: i32, y: i32, w: i32, h: i32) -> Segment {
        Segment::from_bbox(Bbox::new(x, y, x + w, y + h))
    }

    fn two_page_collection() -> Collection {
        Collection::synthetic(
            "batch",
            vec![
                Page::synthetic("page_a", 100, 100),
                Page::synthetic("page_b", 100, 100),
            ],
        )
    }

    #[test]
    fn fresh_collection_activates_every_root() {
        let collection = two_page_collection();
        assert_eq!(collection.max_depth(), 0);
        let active = collection.active_leaves();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].0, 0);
        assert_eq!(active[1].0, 1);
    }

    #[test]
    fn shallower_leaves_are_frozen() {
        let mut collection = two_page_collection();
        // Segment only page A; its depth-1 leaves become the unique maximum.
        let root = collection.pages[0].root_id();
        collection.pages[0].create_segments(
            root,
            vec![segment_at(0, 0, 10, 10), segment_at(20, 0, 10, 10), segment_at(40, 0, 10, 10)],
        );

        let active = collection.active_leaves();
        assert_eq!(active.len(), 3);
        assert!(active.iter().all(|(page, _)| *page == 0));
    }

    #[test]
    fn update_rejects_mismatched_batch_sizes() {
        let mut collection = two_page_collection();
        let root = collection.pages[0].root_id();
        collection.pages[0].create_segments(
            root,
            vec![segment_at(0, 0, 10, 10), segment_at(20, 0, 10, 10), segment_at(40, 0, 10, 10)],
        );

        // 3 active leaves on page A; 4 predictions is a protocol violation.
        let predictions = vec![Prediction::empty(); 4];
        let err = collection.update(predictions).unwrap_err();
        assert!(matches!(
            err,
            QuireError::CountMismatch {
                results: 4,
                leaves: 3
            }
        ));
    }

    #[test]
    fn aligned_depths_update_all_leaves() {
        let mut collection = two_page_collection();
        let segmentation = vec![
            Prediction::segmentation(vec![
                segment_at(0, 0, 10, 10),
                segment_at(20, 0, 10, 10),
                segment_at(40, 0, 10, 10),
            ]),
            Prediction::segmentation(vec![segment_at(0, 0, 10, 10)]),
        ];
        collection.update(segmentation).unwrap();
        assert_eq!(collection.active_leaves().len(), 4);

        let recognition = (0..4)
            .map(|i| Prediction::recognition(RecognizedText::single(format!("line {i}"), 0.9)))
            .collect();
        collection.update(recognition).unwrap();

        for (page_index, id) in collection.active_leaves() {
            assert!(collection.pages[page_index].node(id).has_text());
        }
        assert!(collection.pages.iter().all(Page::contains_text));
    }

    #[test]
    fn update_relabels_the_whole_collection() {
        let mut collection = two_page_collection();
        collection
            .update(vec![
                Prediction::segmentation(vec![segment_at(0, 0, 10, 10), segment_at(20, 0, 10, 10)]),
                Prediction::segmentation(vec![segment_at(0, 0, 10, 10)]),
            ])
            .unwrap();

        let page = &collection.pages[0];
        let labels: Vec<_> = page
            .root()
            .children()
            .iter()
            .map(|&c| page.node(c).label().to_string())
            .collect();
        assert_eq!(labels, vec!["page_a_node1", "page_a_node2"]);
    }

    #[test]
    fn set_size_forwards_to_every_page() {
        let mut collection = Collection::synthetic(
            "batch",
            vec![
                Page::synthetic("big", 1000, 2000),
                Page::synthetic("small", 100, 100),
            ],
        );
        collection.set_size(800, 800);
        assert_eq!(collection.pages[0].width(), 800);
        assert_eq!(collection.pages[1].width(), 100);
    }

    #[test]
    fn common_basename_picks_shared_parent() {
        let paths = vec![
            PathBuf::from("/data/batch_17/a.png"),
            PathBuf::from("/data/batch_17/b.png"),
        ];
        assert_eq!(common_basename(&paths), Some("batch_17".to_string()));

        let single = vec![PathBuf::from("/data/batch_17/a.png")];
        assert_eq!(common_basename(&single), Some("batch_17".to_string()));

        let diverged = vec![
            PathBuf::from("/data/x/a.png"),
            PathBuf::from("/data/y/b.png"),
        ];
        assert_eq!(common_basename(&diverged), Some("data".to_string()));

        assert_eq!(common_basename(&[]), None);
    }

    #[test]
    fn display_lists_label_and_trees() {
        let collection = two_page_collection();
        let rendered = collection.to_string();
        assert!(rendered.starts_with("collection label: batch"));
        assert!(rendered.contains("page_a"));
        assert!(rendered.contains("page_b"));
    }
}
