// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page source: load a PDF buffer, report page geometry, and copy pages out as
// self-contained bundles that can be attached to any other document.

use std::collections::{BTreeMap, BTreeSet};

use falzwerk_core::{FalzwerkError, PageGeometry, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, instrument, warn};

/// US Letter, used when a page carries no usable box.
const LETTER_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Bound on `/Parent` walks; malformed files can contain cycles.
const MAX_TREE_DEPTH: usize = 64;

/// A loaded, read-only PDF document.
///
/// Loading never mutates the input; copies are independent of the source and
/// of each other.
pub struct PageSource {
    document: Document,
    /// Page object ids in page order.
    page_ids: Vec<ObjectId>,
}

impl PageSource {
    // -- Construction ---------------------------------------------------------

    /// Parse a PDF from memory. Password-protected files are rejected.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data)
            .map_err(|err| FalzwerkError::DocumentLoad(err.to_string()))?;

        if document.is_encrypted() {
            return Err(FalzwerkError::DocumentLoad(
                "document is password protected".to_string(),
            ));
        }

        let source = Self::from_document(document);
        debug!(pages = source.page_count(), "PDF loaded from bytes");
        Ok(source)
    }

    /// Wrap a document that is already in memory.
    pub fn from_document(document: Document) -> Self {
        let page_ids = document.get_pages().into_values().collect();
        Self { document, page_ids }
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Displayed size of page `index` (0-based), after `/Rotate`.
    pub fn page_size(&self, index: usize) -> Result<PageGeometry> {
        let page_id = self.page_id(index)?;
        Ok(self.layout(page_id).geometry())
    }

    /// Displayed sizes of every page, in order.
    pub fn page_sizes(&self) -> Vec<PageGeometry> {
        self.page_ids
            .iter()
            .map(|&id| self.layout(id).geometry())
            .collect()
    }

    // -- Copying --------------------------------------------------------------

    /// Copy the pages at `indices` (0-based, any order, repeats allowed) along
    /// with every object they reference.
    ///
    /// All indices are checked before anything is copied. The page tree is
    /// never followed: `/Parent` is dropped and inherited attributes are
    /// written onto each copy.
    #[instrument(skip_all, fields(requested = indices.len()))]
    pub fn copy_pages(&self, indices: &[usize]) -> Result<PageBundle> {
        let page_ids = indices
            .iter()
            .map(|&index| self.page_id(index))
            .collect::<Result<Vec<_>>>()?;

        let mut closure = Closure::new(&self.document);
        let mut pages = Vec::with_capacity(page_ids.len());

        for (&index, page_id) in indices.iter().zip(page_ids) {
            let mut dictionary = self
                .document
                .get_dictionary(page_id)
                .map_err(|err| {
                    FalzwerkError::DocumentLoad(format!("page {} unreadable: {}", index + 1, err))
                })?
                .clone();

            dictionary.remove(b"Parent");
            for key in INHERITABLE {
                if !dictionary.has(key)
                    && let Some(value) = self.inherited(page_id, key)
                {
                    dictionary.set(key, value.clone());
                }
            }

            closure.collect(&dictionary);
            pages.push(CopiedPage {
                source_number: index as u32 + 1,
                layout: self.layout(page_id),
                dictionary,
            });
        }

        debug!(
            pages = pages.len(),
            objects = closure.objects.len(),
            "Pages copied"
        );

        Ok(PageBundle {
            pages,
            objects: closure.objects,
        })
    }

    // -- Helpers --------------------------------------------------------------

    fn page_id(&self, index: usize) -> Result<ObjectId> {
        self.page_ids
            .get(index)
            .copied()
            .ok_or(FalzwerkError::InvalidPageIndex {
                index,
                page_count: self.page_count(),
            })
    }

    fn layout(&self, page_id: ObjectId) -> PageLayout {
        let bounds = self
            .inherited(page_id, b"CropBox")
            .and_then(|object| self.rect(object))
            .or_else(|| {
                self.inherited(page_id, b"MediaBox")
                    .and_then(|object| self.rect(object))
            })
            .unwrap_or(LETTER_BOX);

        let rotation = self
            .inherited(page_id, b"Rotate")
            .and_then(|object| self.resolve(object))
            .and_then(|object| object.as_i64().ok())
            .map(normalise_rotation)
            .unwrap_or(0);

        PageLayout { bounds, rotation }
    }

    /// Look `key` up on the page, then on each ancestor.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut node = self.document.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Ok(value) = node.get(key) {
                return Some(value);
            }
            let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
            node = self.document.get_dictionary(parent).ok()?;
        }
        None
    }

    fn resolve<'a>(&'a self, object: &'a Object) -> Option<&'a Object> {
        match object {
            Object::Reference(id) => self.document.get_object(*id).ok(),
            other => Some(other),
        }
    }

    /// Parse a rectangle, normalising corner order. Degenerate boxes are ignored.
    fn rect(&self, object: &Object) -> Option<[f32; 4]> {
        let items = self.resolve(object)?.as_array().ok()?;
        if items.len() != 4 {
            return None;
        }
        let mut values = [0.0f32; 4];
        for (slot, item) in values.iter_mut().zip(items) {
            *slot = self.resolve(item)?.as_float().ok()?;
        }
        let [x0, y0, x1, y1] = values;
        let rect = [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)];
        (rect[2] > rect[0] && rect[3] > rect[1]).then_some(rect)
    }
}

/// Visible box and rotation of one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    /// `[llx, lly, urx, ury]` of the crop box (or media box).
    pub bounds: [f32; 4],
    /// Clockwise `/Rotate`, one of 0, 90, 180, 270.
    pub rotation: u16,
}

impl PageLayout {
    /// Unrotated box width.
    pub fn width(&self) -> f32 {
        self.bounds[2] - self.bounds[0]
    }

    /// Unrotated box height.
    pub fn height(&self) -> f32 {
        self.bounds[3] - self.bounds[1]
    }

    /// Size as displayed, with width and height swapped for quarter turns.
    pub fn geometry(&self) -> PageGeometry {
        let unrotated = PageGeometry::new(self.width(), self.height());
        if self.rotation % 180 == 90 {
            unrotated.swapped()
        } else {
            unrotated
        }
    }
}

/// One page detached from its source document.
#[derive(Debug, Clone)]
pub struct CopiedPage {
    /// 1-based page number in the source.
    pub source_number: u32,
    pub layout: PageLayout,
    /// Page dictionary without `/Parent`. Its references point into the
    /// owning bundle until [`PageBundle::attach`] rewrites them.
    dictionary: Dictionary,
}

impl CopiedPage {
    pub fn geometry(&self) -> PageGeometry {
        self.layout.geometry()
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn into_dictionary(self) -> Dictionary {
        self.dictionary
    }
}

/// Pages copied in one call plus the transitive closure of objects they use.
///
/// Owns its objects outright, so the source can be dropped before the bundle
/// is attached anywhere.
#[derive(Debug, Clone)]
pub struct PageBundle {
    pages: Vec<CopiedPage>,
    objects: BTreeMap<ObjectId, Object>,
}

impl PageBundle {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[CopiedPage] {
        &self.pages
    }

    /// Move every object into `target` under fresh ids and return the pages
    /// with their references rewritten to match.
    pub fn attach(self, target: &mut Document) -> Vec<CopiedPage> {
        let ids: BTreeMap<ObjectId, ObjectId> = self
            .objects
            .keys()
            .map(|&old| (old, target.new_object_id()))
            .collect();

        for (old, mut object) in self.objects {
            remap_references(&mut object, &ids);
            target.objects.insert(ids[&old], object);
        }

        self.pages
            .into_iter()
            .map(|mut page| {
                page.dictionary
                    .iter_mut()
                    .for_each(|(_, value)| remap_references(value, &ids));
                page
            })
            .collect()
    }
}

/// Reachability walk over a source document, stopping at page-tree nodes.
struct Closure<'a> {
    document: &'a Document,
    objects: BTreeMap<ObjectId, Object>,
    /// Page-tree nodes and dangling ids; references to these become null.
    excluded: BTreeSet<ObjectId>,
}

impl<'a> Closure<'a> {
    fn new(document: &'a Document) -> Self {
        Self {
            document,
            objects: BTreeMap::new(),
            excluded: BTreeSet::new(),
        }
    }

    fn collect(&mut self, root: &Dictionary) {
        let mut pending = Vec::new();
        root.iter()
            .for_each(|(_, value)| push_references(value, &mut pending));

        while let Some(id) = pending.pop() {
            if self.objects.contains_key(&id) || self.excluded.contains(&id) {
                continue;
            }
            match self.document.get_object(id) {
                Ok(object) if is_page_tree_node(object) => {
                    self.excluded.insert(id);
                }
                Ok(object) => {
                    push_references(object, &mut pending);
                    self.objects.insert(id, object.clone());
                }
                Err(err) => {
                    warn!(?id, %err, "Cannot resolve reference, using Null");
                    self.excluded.insert(id);
                }
            }
        }
    }
}

fn push_references(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => items.iter().for_each(|item| push_references(item, out)),
        Object::Dictionary(dict) => dict.iter().for_each(|(_, value)| push_references(value, out)),
        Object::Stream(stream) => stream
            .dict
            .iter()
            .for_each(|(_, value)| push_references(value, out)),
        _ => {}
    }
}

/// Rewrite references through `ids`; anything unmapped becomes `null`.
fn remap_references(object: &mut Object, ids: &BTreeMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => {
            let replacement = ids
                .get(id)
                .map_or(Object::Null, |&new_id| Object::Reference(new_id));
            *object = replacement;
        }
        Object::Array(items) => items
            .iter_mut()
            .for_each(|item| remap_references(item, ids)),
        Object::Dictionary(dict) => dict
            .iter_mut()
            .for_each(|(_, value)| remap_references(value, ids)),
        Object::Stream(stream) => stream
            .dict
            .iter_mut()
            .for_each(|(_, value)| remap_references(value, ids)),
        _ => {}
    }
}

fn is_page_tree_node(object: &Object) -> bool {
    let Object::Dictionary(dict) = object else {
        return false;
    };
    dict.get(b"Type")
        .and_then(Object::as_name)
        .map(|name| name == b"Page" || name == b"Pages")
        .unwrap_or(false)
}

/// Snap any `/Rotate` value to a clockwise quarter turn in `0..360`.
fn normalise_rotation(degrees: i64) -> u16 {
    let quarter_turns = (degrees.rem_euclid(360) + 45) / 90;
    ((quarter_turns * 90) % 360) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use lopdf::dictionary;

    #[test]
    fn loads_pages_in_order() {
        let data = testutil::pdf_with_pages(&[(300.0, 400.0), (500.0, 200.0)]);
        let source = PageSource::from_bytes(&data).unwrap();
        assert_eq!(source.page_count(), 2);
        assert_eq!(source.page_size(0).unwrap(), PageGeometry::new(300.0, 400.0));
        assert_eq!(source.page_size(1).unwrap(), PageGeometry::new(500.0, 200.0));
    }

    #[test]
    fn garbage_is_a_load_error() {
        let result = PageSource::from_bytes(b"definitely not a pdf");
        assert!(matches!(result, Err(FalzwerkError::DocumentLoad(_))));
    }

    #[test]
    fn quarter_turn_swaps_displayed_size() {
        let mut doc = testutil::document_with_pages(&[(300.0, 400.0)]);
        let page_id = doc.page_iter().next().unwrap();
        doc.get_dictionary_mut(page_id)
            .unwrap()
            .set("Rotate", Object::Integer(-270));
        let source = PageSource::from_document(doc);
        assert_eq!(source.page_size(0).unwrap(), PageGeometry::new(400.0, 300.0));
    }

    #[test]
    fn crop_box_wins_over_media_box() {
        let mut doc = testutil::document_with_pages(&[(600.0, 800.0)]);
        let page_id = doc.page_iter().next().unwrap();
        doc.get_dictionary_mut(page_id).unwrap().set(
            "CropBox",
            vec![50i64.into(), 50i64.into(), 250i64.into(), 150i64.into()],
        );
        let source = PageSource::from_document(doc);
        assert_eq!(source.page_size(0).unwrap(), PageGeometry::new(200.0, 100.0));
    }

    #[test]
    fn missing_box_falls_back_to_letter() {
        let mut doc = testutil::document_with_pages(&[(600.0, 800.0)]);
        let page_id = doc.page_iter().next().unwrap();
        doc.get_dictionary_mut(page_id).unwrap().remove(b"MediaBox");
        let source = PageSource::from_document(doc);
        assert_eq!(source.page_size(0).unwrap(), PageGeometry::new(612.0, 792.0));
    }

    #[test]
    fn inherited_attributes_are_written_onto_copies() {
        let mut doc = testutil::document_with_pages(&[(600.0, 800.0)]);
        let page_id = doc.page_iter().next().unwrap();
        let pages_id = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Parent")
            .and_then(Object::as_reference)
            .unwrap();
        doc.get_dictionary_mut(page_id).unwrap().remove(b"MediaBox");
        let pages = doc.get_dictionary_mut(pages_id).unwrap();
        pages.set("MediaBox", vec![0i64.into(), 0i64.into(), 420i64.into(), 595i64.into()]);
        pages.set("Rotate", Object::Integer(90));

        let source = PageSource::from_document(doc);
        assert_eq!(source.page_size(0).unwrap(), PageGeometry::new(595.0, 420.0));

        let bundle = source.copy_pages(&[0]).unwrap();
        let copy = &bundle.pages()[0];
        assert!(copy.dictionary().has(b"MediaBox"));
        assert!(copy.dictionary().has(b"Resources"));
        assert!(!copy.dictionary().has(b"Parent"));
        assert_eq!(copy.layout.rotation, 90);
    }

    #[test]
    fn copy_rejects_out_of_range_before_copying() {
        let data = testutil::pdf_with_pages(&[(100.0, 100.0), (100.0, 100.0)]);
        let source = PageSource::from_bytes(&data).unwrap();
        let result = source.copy_pages(&[0, 5]);
        assert!(matches!(
            result,
            Err(FalzwerkError::InvalidPageIndex {
                index: 5,
                page_count: 2
            })
        ));
    }

    #[test]
    fn zero_page_document_loads_but_cannot_copy() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0i64,
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let data = testutil::save(&mut doc);

        let source = PageSource::from_bytes(&data).unwrap();
        assert_eq!(source.page_count(), 0);
        assert!(source.copy_pages(&[0]).is_err());
    }

    #[test]
    fn attached_bundle_is_self_contained() {
        let data = testutil::pdf_with_pages(&[(200.0, 300.0), (400.0, 500.0)]);
        let source = PageSource::from_bytes(&data).unwrap();
        let bundle = source.copy_pages(&[1, 0]).unwrap();
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.pages()[0].source_number, 2);
        drop(source);

        let mut target = Document::with_version("1.5");
        let pages = bundle.attach(&mut target);
        for page in &pages {
            for (_, value) in page.dictionary().iter() {
                if let Object::Reference(id) = value {
                    assert!(target.objects.contains_key(id), "dangling {id:?}");
                }
            }
        }
        assert_eq!(pages[0].geometry(), PageGeometry::new(400.0, 500.0));
    }

    #[test]
    fn rotation_snaps_to_quarter_turns() {
        assert_eq!(normalise_rotation(0), 0);
        assert_eq!(normalise_rotation(-90), 270);
        assert_eq!(normalise_rotation(450), 90);
        assert_eq!(normalise_rotation(359), 0);
    }
}
