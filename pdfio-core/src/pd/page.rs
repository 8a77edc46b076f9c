//! Lazy view over one page

use super::page_objects::{self, PageObject};
use super::page_tree::PageNode;
use crate::common::CDRect;
use crate::cos::{CosArray, CosDoc, CosObject, CosStream, ObjectId};
use crate::error::{PdfError, Result};
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

/// US Letter, used when a page has no usable `/MediaBox`
pub const DEFAULT_MEDIA_BOX: CDRect = CDRect {
    llx: 0.0,
    lly: 0.0,
    urx: 612.0,
    ury: 792.0,
};

/// A page of a [`PDDoc`](super::PDDoc)
///
/// Attributes are looked up on the page dictionary first and then on its
/// ancestors in the page tree. `/Contents`, `/Resources` and `/MediaBox` are
/// resolved on first use and kept.
pub struct PDPage<'a> {
    doc: &'a CosDoc,
    number: u32,
    node: &'a PageNode,
    contents: OnceCell<Rc<CosObject>>,
    resources: OnceCell<Rc<CosObject>>,
    media_box: OnceCell<CDRect>,
}

impl<'a> PDPage<'a> {
    pub(crate) fn new(doc: &'a CosDoc, number: u32, node: &'a PageNode) -> Self {
        PDPage {
            doc,
            number,
            node,
            contents: OnceCell::new(),
            resources: OnceCell::new(),
            media_box: OnceCell::new(),
        }
    }

    /// 1-based page number
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Object id of the page dictionary
    pub fn id(&self) -> Option<ObjectId> {
        self.node.id
    }

    /// The page dictionary itself
    pub fn get_cos_object(&self) -> Rc<CosObject> {
        Rc::clone(&self.node.dict)
    }

    fn resolved_attribute(&self, key: &str) -> Rc<CosObject> {
        match self.node.attribute(key) {
            Some(value) => self.doc.get_object(value),
            None => Rc::new(CosObject::Null),
        }
    }

    /// The `/Contents` entry: a stream, an array of streams or Null
    pub fn get_contents(&self) -> Rc<CosObject> {
        Rc::clone(
            self.contents
                .get_or_init(|| self.resolved_attribute("Contents")),
        )
    }

    /// Content streams in order, with references resolved
    fn content_streams(&self) -> Vec<Rc<CosObject>> {
        let contents = self.get_contents();
        match contents.as_ref() {
            CosObject::Stream(_) => vec![contents],
            CosObject::Array(parts) => parts
                .iter()
                .map(|part| self.doc.get_object(part))
                .filter(|part| {
                    let is_stream = part.as_stream().is_some();
                    if !is_stream {
                        debug!("Skipping {} in /Contents", part.type_name());
                    }
                    is_stream
                })
                .collect(),
            CosObject::Null => Vec::new(),
            other => {
                warn!("Page {} /Contents is a {}", self.number, other.type_name());
                Vec::new()
            }
        }
    }

    /// Decoded content bytes; streams of an array are joined with a newline
    ///
    /// A stream that fails to decode contributes nothing.
    pub fn content_bytes(&self) -> Result<Vec<u8>> {
        if self.doc.is_encrypted() {
            return Err(PdfError::Encrypted);
        }
        let mut content = Vec::new();
        for (i, part) in self.content_streams().iter().enumerate() {
            if i > 0 {
                content.push(b'\n');
            }
            if let Some(stream) = part.as_stream() {
                content.extend_from_slice(self.doc.decoded_data(stream));
            }
        }
        Ok(content)
    }

    /// Parse the page content into a page object tree
    pub fn get_content_objects(&self) -> Result<Vec<PageObject>> {
        let content = self.content_bytes()?;
        Ok(page_objects::build_page_objects(&content))
    }

    /// Text of every text run on the page, one run per line
    pub fn extract_text(&self) -> Result<String> {
        Ok(page_objects::extract_text(&self.get_content_objects()?))
    }

    /// Whether the page has no content beyond whitespace
    ///
    /// Streams that fail to decode are judged by their raw bytes.
    pub fn is_empty(&self) -> bool {
        let blank = |bytes: &[u8]| bytes.iter().all(u8::is_ascii_whitespace);
        self.content_streams().iter().all(|part| {
            part.as_stream().map_or(true, |stream: &CosStream| {
                match self.doc.decode_stream(stream) {
                    Ok(data) => blank(data),
                    Err(_) => blank(stream.raw_data()),
                }
            })
        })
    }

    /// The `/Resources` dictionary, Null when absent
    pub fn resources(&self) -> Rc<CosObject> {
        Rc::clone(
            self.resources
                .get_or_init(|| self.resolved_attribute("Resources")),
        )
    }

    fn rect_attribute(&self, key: &str) -> Option<CDRect> {
        let value = self.node.attribute(key)?;
        let resolved = self.doc.get_object(value);
        match resolved.as_array() {
            Some(array) => CDRect::from_array(&resolved_array(self.doc, array)),
            None => None,
        }
    }

    pub fn media_box(&self) -> CDRect {
        *self.media_box.get_or_init(|| {
            self.rect_attribute("MediaBox").unwrap_or_else(|| {
                warn!("Page {} has no usable /MediaBox, assuming Letter", self.number);
                DEFAULT_MEDIA_BOX
            })
        })
    }

    /// Visible region, clipped to the media box
    pub fn crop_box(&self) -> CDRect {
        let media_box = self.media_box();
        self.rect_attribute("CropBox")
            .and_then(|crop| crop.intersect(&media_box))
            .unwrap_or(media_box)
    }

    /// Clockwise rotation in degrees: 0, 90, 180 or 270
    pub fn rotation(&self) -> i64 {
        let rotate = self
            .resolved_attribute("Rotate")
            .as_integer()
            .unwrap_or(0)
            .rem_euclid(360);
        if rotate % 90 != 0 {
            warn!("Page {} has /Rotate {rotate}, using 0", self.number);
            return 0;
        }
        rotate
    }

    pub fn width(&self) -> f64 {
        self.media_box().width()
    }

    pub fn height(&self) -> f64 {
        self.media_box().height()
    }
}

/// Array with indirect elements resolved
fn resolved_array(doc: &CosDoc, array: &CosArray) -> CosArray {
    CosArray(
        array
            .iter()
            .map(|item| doc.get_object(item).as_ref().clone())
            .collect(),
    )
}

impl fmt::Debug for PDPage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PDPage")
            .field("number", &self.number)
            .field("id", &self.node.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pd::page_tree::flatten_page_tree;
    use crate::test_helpers::{create_minimal_pdf, PdfBuilder};

    fn nodes(doc: &CosDoc) -> Vec<PageNode> {
        let catalog = doc.get_object(doc.get_root().get("Root").unwrap());
        flatten_page_tree(doc, catalog.as_dict().unwrap().get("Pages").unwrap())
    }

    #[test]
    fn test_minimal_page() {
        let doc = CosDoc::from_bytes(create_minimal_pdf()).unwrap();
        let nodes = nodes(&doc);
        let page = PDPage::new(&doc, 1, &nodes[0]);

        assert_eq!(page.id(), Some((3, 0)));
        assert!(page.get_contents().as_stream().is_some());
        assert_eq!(page.content_bytes().unwrap(), crate::test_helpers::HELLO_CONTENT);
        assert!(!page.is_empty());
        assert_eq!(page.media_box(), CDRect::new(0.0, 0.0, 612.0, 792.0));
        assert_eq!(page.crop_box(), page.media_box());
        assert_eq!(page.rotation(), 0);
        assert!(page.resources().as_dict().unwrap().contains_key("Font"));
        assert_eq!(page.extract_text().unwrap(), "Hello");
    }

    #[test]
    fn test_contents_array_and_attributes() {
        let mut pdf = PdfBuilder::new();
        pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(
                2,
                "<< /Type /Pages /Kids [3 0 R] /Count 1 /Rotate -90 /MediaBox 6 0 R >>",
            )
            .object(
                3,
                "<< /Type /Page /Parent 2 0 R /CropBox [-10 -10 100 100] /Contents [4 0 R 9 0 R 5 0 R] >>",
            )
            .stream(4, "", b"BT (a) Tj")
            .stream(5, "", b"ET")
            .object(6, "[0 0 200 7 0 R]")
            .object(7, "300");
        let doc = CosDoc::from_bytes(pdf.finish_with_table("/Root 1 0 R")).unwrap();
        let nodes = nodes(&doc);
        let page = PDPage::new(&doc, 1, &nodes[0]);

        assert_eq!(page.content_bytes().unwrap(), b"BT (a) Tj\nET".to_vec());
        assert_eq!(page.rotation(), 270);
        assert_eq!(page.media_box(), CDRect::new(0.0, 0.0, 200.0, 300.0));
        assert_eq!(page.crop_box(), CDRect::new(0.0, 0.0, 100.0, 100.0));
        assert!(page.resources().is_null());

        let objects = page.get_content_objects().unwrap();
        assert!(matches!(&objects[0], PageObject::TextObject(g) if g.end.is_some()));
    }

    #[test]
    fn test_empty_pages() {
        let mut pdf = PdfBuilder::new();
        pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>")
            .object(3, "<< /Type /Page /Parent 2 0 R >>")
            .object(4, "<< /Type /Page /Parent 2 0 R /Contents 5 0 R >>")
            .stream(5, "", b" \r\n\t ");
        let doc = CosDoc::from_bytes(pdf.finish_with_table("/Root 1 0 R")).unwrap();
        let nodes = nodes(&doc);

        let without_contents = PDPage::new(&doc, 1, &nodes[0]);
        assert!(without_contents.is_empty());
        assert!(without_contents.get_content_objects().unwrap().is_empty());
        assert_eq!(without_contents.media_box(), DEFAULT_MEDIA_BOX);

        assert!(PDPage::new(&doc, 2, &nodes[1]).is_empty());
    }

    #[test]
    fn test_undecodable_stream_not_empty() {
        let mut pdf = PdfBuilder::new();
        pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
            .object(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>")
            .stream(4, "/Filter /FlateDecode", b"not zlib data");
        let doc = CosDoc::from_bytes(pdf.finish_with_table("/Root 1 0 R")).unwrap();
        let nodes = nodes(&doc);
        let page = PDPage::new(&doc, 1, &nodes[0]);

        assert!(!page.is_empty());
        assert!(page.content_bytes().unwrap().is_empty());
    }
}
