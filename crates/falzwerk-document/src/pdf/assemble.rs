// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document assembler: compose copied pages and image pages into one new
// document under a page-size policy.

use falzwerk_core::{
    FalzwerkError, PageGeometry, PageSizePolicy, ProgressTracker, RenderConfig, Result,
    SkippedInput,
};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, info, instrument, warn};

use super::source::{CopiedPage, PageBundle, PageLayout};
use crate::image::ImageEmbedder;

/// Resource name of the wrapped page on a fixed canvas.
const PAGE_XOBJECT: &str = "Pg0";
/// Resource name of the image on an image page.
const IMAGE_XOBJECT: &str = "Im0";

/// Builds a document page by page, in contribution order.
pub struct DocumentAssembler {
    document: Document,
    /// Reserved id of the single `/Pages` node, written on [`Self::finish`].
    pages_id: ObjectId,
    kids: Vec<Object>,
    policy: PageSizePolicy,
    margin: f32,
    skipped: Vec<SkippedInput>,
}

/// A finished, not yet serialised document.
#[derive(Debug)]
pub struct AssembledDocument {
    pub document: Document,
    pub page_count: usize,
    /// Inputs left out because they could not be used.
    pub skipped: Vec<SkippedInput>,
}

impl DocumentAssembler {
    // -- Construction ---------------------------------------------------------

    pub fn new(policy: PageSizePolicy, margin: f32) -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        Self {
            document,
            pages_id,
            kids: Vec::new(),
            policy,
            margin,
            skipped: Vec::new(),
        }
    }

    /// Assembler using the layout settings of a validated `RenderConfig`.
    pub fn from_config(config: &RenderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.page_size, config.margin_pt))
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    // -- Contributions --------------------------------------------------------

    /// Append every page of `bundle`, in bundle order. One progress unit per
    /// page.
    #[instrument(skip_all, fields(pages = bundle.len()))]
    pub fn push_pages(&mut self, bundle: PageBundle, progress: &mut ProgressTracker) -> Result<()> {
        progress.check()?;
        for page in bundle.attach(&mut self.document) {
            let dictionary = match self.policy.canvas_for(page.geometry()) {
                None => page.into_dictionary(),
                Some(canvas) => self.wrap_on_canvas(page, canvas)?,
            };
            self.add_page(dictionary);
            progress.step()?;
        }
        Ok(())
    }

    /// Append one image page, or record input `index` as skipped when the
    /// image is unsupported or undecodable. One progress unit either way.
    pub fn push_image(
        &mut self,
        index: usize,
        data: &[u8],
        quality: Option<f32>,
        progress: &mut ProgressTracker,
    ) -> Result<()> {
        match self.try_push_image(data, quality, progress) {
            Err(err) if err.is_bad_image() => {
                warn!(index, %err, "Skipping image");
                self.skipped.push(SkippedInput {
                    index,
                    reason: err.to_string(),
                });
                progress.step()
            }
            other => other,
        }
    }

    /// Append one image page, failing on bad input instead of skipping it.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn try_push_image(
        &mut self,
        data: &[u8],
        quality: Option<f32>,
        progress: &mut ProgressTracker,
    ) -> Result<()> {
        progress.check()?;
        let image = ImageEmbedder::decode(data)?;

        let natural = PageGeometry::new(
            image.width() as f32 + 2.0 * self.margin,
            image.height() as f32 + 2.0 * self.margin,
        );
        let canvas = self.policy.canvas_for(natural).unwrap_or(natural);
        let placement = ImageEmbedder::place(image.width(), image.height(), canvas, self.margin);

        let xobject = image.to_xobject(quality)?;
        let mut stream = xobject.image;
        if let Some(mask) = xobject.soft_mask {
            let mask_id = self.document.add_object(mask);
            stream.dict.set("SMask", mask_id);
        }
        let image_id = self.document.add_object(stream);

        debug!(
            width = canvas.width,
            height = canvas.height,
            scale = placement.scale,
            "Image page placed"
        );
        let page = self.canvas_page(canvas, IMAGE_XOBJECT, image_id, placement.matrix())?;
        self.add_page(page);
        progress.step()
    }

    // -- Completion -----------------------------------------------------------

    /// Write the page tree and catalog. Fails when no page was added.
    #[instrument(skip_all, fields(pages = self.kids.len(), skipped = self.skipped.len()))]
    pub fn finish(mut self) -> Result<AssembledDocument> {
        if self.kids.is_empty() {
            return Err(FalzwerkError::NothingToAssemble);
        }

        let page_count = self.kids.len();
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => page_count as i64,
            }),
        );
        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.document.add_object(dictionary! {
            "Producer" => Object::string_literal("Falzwerk"),
        });
        self.document.trailer.set("Root", catalog_id);
        self.document.trailer.set("Info", info_id);

        info!(page_count, skipped = self.skipped.len(), "Document assembled");
        Ok(AssembledDocument {
            document: self.document,
            page_count,
            skipped: self.skipped,
        })
    }

    // -- Helpers --------------------------------------------------------------

    fn add_page(&mut self, mut page: Dictionary) {
        page.set("Parent", self.pages_id);
        let page_id = self.document.add_object(page);
        self.kids.push(page_id.into());
    }

    /// Turn a copied page into a Form XObject drawn scaled, centered and
    /// upright on `canvas`.
    fn wrap_on_canvas(&mut self, page: CopiedPage, canvas: PageGeometry) -> Result<Dictionary> {
        let layout = page.layout;
        let displayed = layout.geometry();
        let scale = ((canvas.width - 2.0 * self.margin).max(1.0) / displayed.width)
            .min((canvas.height - 2.0 * self.margin).max(1.0) / displayed.height);
        let x = (canvas.width - displayed.width * scale) / 2.0;
        let y = (canvas.height - displayed.height * scale) / 2.0;

        let source = page.into_dictionary();
        if source.has(b"Annots") {
            debug!("Annotations dropped from page placed on a fixed canvas");
        }

        let mut form = self.content_of(&source)?;
        let bbox: Vec<Object> = layout.bounds.iter().map(|&v| v.into()).collect();
        let resources = source
            .get(b"Resources")
            .cloned()
            .unwrap_or_else(|_| Object::Dictionary(Dictionary::new()));
        form.dict.set("Type", "XObject");
        form.dict.set("Subtype", "Form");
        form.dict.set("FormType", 1i64);
        form.dict.set("BBox", bbox);
        form.dict.set("Resources", resources);
        let form_id = self.document.add_object(form);

        self.canvas_page(
            canvas,
            PAGE_XOBJECT,
            form_id,
            placement_matrix(&layout, scale, x, y),
        )
    }

    /// A page of size `canvas` whose only content draws XObject `xobject`
    /// through `matrix`.
    fn canvas_page(
        &mut self,
        canvas: PageGeometry,
        name: &str,
        xobject: ObjectId,
        matrix: [f32; 6],
    ) -> Result<Dictionary> {
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new("cm", matrix.iter().map(|&v| v.into()).collect()),
                Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|err| FalzwerkError::Encoding(format!("page content: {}", err)))?;
        let content_id = self.document.add_object(Stream::new(dictionary! {}, encoded));

        let mut xobjects = Dictionary::new();
        xobjects.set(name, xobject);
        Ok(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0i64.into(), 0i64.into(), canvas.width.into(), canvas.height.into()],
            "Resources" => dictionary! { "XObject" => xobjects },
            "Contents" => content_id,
        })
    }

    /// The page's content as one stream. A single stream keeps its filter;
    /// several are decoded and joined.
    fn content_of(&self, page: &Dictionary) -> Result<Stream> {
        let ids: Vec<ObjectId> = match page.get(b"Contents") {
            Ok(Object::Reference(id)) => vec![*id],
            Ok(Object::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_reference().ok())
                .collect(),
            _ => Vec::new(),
        };
        let streams: Vec<&Stream> = ids
            .iter()
            .filter_map(|id| self.document.get_object(*id).ok()?.as_stream().ok())
            .collect();

        if let [single] = streams.as_slice() {
            let mut dict = Dictionary::new();
            for key in [b"Filter".as_slice(), b"DecodeParms".as_slice()] {
                if let Ok(value) = single.dict.get(key) {
                    dict.set(key, value.clone());
                }
            }
            let filtered = dict.has(b"Filter");
            return Ok(Stream::new(dict, single.content.clone()).with_compression(!filtered));
        }

        let mut joined = Vec::new();
        for stream in streams {
            let decoded = if stream.dict.has(b"Filter") {
                stream.decompressed_content().map_err(|err| {
                    FalzwerkError::Encoding(format!("undecodable page content: {}", err))
                })?
            } else {
                stream.content.clone()
            };
            joined.extend_from_slice(&decoded);
            joined.push(b'\n');
        }
        Ok(Stream::new(Dictionary::new(), joined))
    }
}

/// Matrix drawing a form with bounding box `layout.bounds` scaled by `scale`
/// with its displayed lower-left corner at `(x, y)`, undoing the page's
/// clockwise `/Rotate`.
fn placement_matrix(layout: &PageLayout, scale: f32, x: f32, y: f32) -> [f32; 6] {
    let [llx, lly, urx, ury] = layout.bounds;
    let s = scale;
    match layout.rotation {
        90 => [0.0, -s, s, 0.0, x - s * lly, y + s * urx],
        180 => [-s, 0.0, 0.0, -s, x + s * urx, y + s * ury],
        270 => [0.0, s, -s, 0.0, x + s * ury, y - s * llx],
        _ => [s, 0.0, 0.0, s, x - s * llx, y - s * lly],
    }
}
