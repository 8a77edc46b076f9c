//! PD document: the logical view of a PDF
//!
//! [`PDDoc`] sits on top of a [`CosDoc`] and interprets the catalog: the page
//! tree, page labels, the document information dictionary and the name
//! dictionary. The catalog, the flattened page list and the page labels are
//! read once, on first use.
//!
//! # Example
//!
//! ```rust,no_run
//! use pdfio::PDDoc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = PDDoc::open("document.pdf")?;
//! println!("Pages: {}", doc.page_count()?);
//!
//! let info = doc.get_info()?;
//! println!("Title: {:?}", info.title());
//!
//! for page in doc.get_page_range(1..=2)? {
//!     println!("Page {}: {}", page.number(), page.extract_text()?);
//! }
//! # Ok(())
//! # }
//! ```

use super::page::PDPage;
use super::page_labels::PageLabelTree;
use super::page_tree::{flatten_page_tree, PageNode};
use crate::common::CDDate;
use crate::cos::{CosDoc, CosObject, ParseOptions, PdfVersion};
use crate::error::{PdfError, Result};
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::io::Read;
use std::ops::RangeInclusive;
use std::path::Path;
use std::rc::Rc;
use tracing::warn;

/// Pages to select by number or by label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSelector {
    /// 1-based inclusive page numbers
    Range(RangeInclusive<u32>),
    /// A page label or label prefix, see [`PDDoc::get_page_numbers_for_label`]
    Label(String),
}

impl From<RangeInclusive<u32>> for PageSelector {
    fn from(range: RangeInclusive<u32>) -> Self {
        PageSelector::Range(range)
    }
}

impl From<&str> for PageSelector {
    fn from(label: &str) -> Self {
        PageSelector::Label(label.to_string())
    }
}

impl From<String> for PageSelector {
    fn from(label: String) -> Self {
        PageSelector::Label(label)
    }
}

/// Value of a document information entry
#[derive(Debug, Clone, PartialEq)]
pub enum InfoValue {
    Text(String),
    Date(CDDate),
    Object(CosObject),
}

impl InfoValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            InfoValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&CDDate> {
        match self {
            InfoValue::Date(date) => Some(date),
            _ => None,
        }
    }
}

/// The trailer's `/Info` dictionary with strings decoded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentInfo {
    entries: BTreeMap<String, InfoValue>,
}

impl DocumentInfo {
    pub fn get(&self, key: &str) -> Option<&InfoValue> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &InfoValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(InfoValue::as_text)
    }

    pub fn title(&self) -> Option<&str> {
        self.text("Title")
    }

    pub fn author(&self) -> Option<&str> {
        self.text("Author")
    }

    pub fn subject(&self) -> Option<&str> {
        self.text("Subject")
    }

    pub fn keywords(&self) -> Option<&str> {
        self.text("Keywords")
    }

    pub fn creator(&self) -> Option<&str> {
        self.text("Creator")
    }

    pub fn producer(&self) -> Option<&str> {
        self.text("Producer")
    }

    pub fn creation_date(&self) -> Option<&CDDate> {
        self.get("CreationDate").and_then(InfoValue::as_date)
    }

    pub fn modification_date(&self) -> Option<&CDDate> {
        self.get("ModDate").and_then(InfoValue::as_date)
    }
}

/// A PDF document
pub struct PDDoc {
    cos: CosDoc,
    catalog: OnceCell<Rc<CosObject>>,
    pages: OnceCell<Vec<PageNode>>,
    labels: OnceCell<PageLabelTree>,
}

impl PDDoc {
    /// Open a PDF file with lenient parsing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_cos_doc(CosDoc::open(path)?))
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> Result<Self> {
        Ok(Self::from_cos_doc(CosDoc::open_with_options(path, options)?))
    }

    /// Read a whole PDF from `reader`
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(Self::from_cos_doc(CosDoc::from_reader(reader)?))
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Ok(Self::from_cos_doc(CosDoc::from_bytes(data)?))
    }

    pub fn from_cos_doc(cos: CosDoc) -> Self {
        PDDoc {
            cos,
            catalog: OnceCell::new(),
            pages: OnceCell::new(),
            labels: OnceCell::new(),
        }
    }

    /// Release the document and everything cached for it
    pub fn close(self) {}

    pub fn get_cos_doc(&self) -> &CosDoc {
        &self.cos
    }

    pub fn version(&self) -> PdfVersion {
        self.cos.version()
    }

    /// The document catalog (`/Root`)
    pub fn get_catalog(&self) -> Result<Rc<CosObject>> {
        if let Some(catalog) = self.catalog.get() {
            return Ok(Rc::clone(catalog));
        }
        let root = self
            .cos
            .get_root()
            .get("Root")
            .ok_or_else(|| PdfError::InvalidStructure("trailer has no /Root".to_string()))?;
        let catalog = self.cos.get_object(root);
        if catalog.as_dict().is_none() {
            return Err(PdfError::InvalidStructure(format!(
                "catalog is a {}, not a dictionary",
                catalog.type_name()
            )));
        }
        Ok(Rc::clone(self.catalog.get_or_init(|| catalog)))
    }

    /// Resolved catalog entry, Null when absent
    fn catalog_entry(&self, key: &str) -> Result<Rc<CosObject>> {
        let catalog = self.get_catalog()?;
        Ok(match catalog.as_dict().and_then(|dict| dict.get(key)) {
            Some(value) => self.cos.get_object(value),
            None => Rc::new(CosObject::Null),
        })
    }

    fn page_nodes(&self) -> Result<&[PageNode]> {
        if let Some(pages) = self.pages.get() {
            return Ok(pages);
        }
        let catalog = self.get_catalog()?;
        let root = catalog
            .as_dict()
            .and_then(|dict| dict.get("Pages"))
            .ok_or_else(|| PdfError::InvalidStructure("catalog has no /Pages".to_string()))?;
        let nodes = flatten_page_tree(&self.cos, root);

        let declared = self.cos.get_object(root).as_dict().and_then(|d| d.get_integer("Count"));
        if declared.is_some_and(|count| count != nodes.len() as i64) {
            warn!(
                "Page tree /Count {:?} differs from {} pages found",
                declared,
                nodes.len()
            );
        }
        Ok(self.pages.get_or_init(|| nodes))
    }

    /// Number of leaf pages in the page tree
    pub fn page_count(&self) -> Result<u32> {
        Ok(self.page_nodes()?.len() as u32)
    }

    /// Page by 1-based number
    pub fn get_page(&self, number: u32) -> Result<PDPage<'_>> {
        let nodes = self.page_nodes()?;
        let count = nodes.len() as u32;
        if number == 0 || number > count {
            return Err(PdfError::InvalidPageNumber {
                requested: number,
                count,
            });
        }
        Ok(PDPage::new(&self.cos, number, &nodes[number as usize - 1]))
    }

    /// Pages by number range or label
    pub fn get_page_range(&self, selector: impl Into<PageSelector>) -> Result<Vec<PDPage<'_>>> {
        let range = match selector.into() {
            PageSelector::Range(range) => range,
            PageSelector::Label(label) => self.get_page_numbers_for_label(&label)?,
        };
        let count = self.page_count()?;
        for bound in [*range.start(), *range.end()] {
            if bound == 0 || bound > count {
                return Err(PdfError::InvalidPageNumber {
                    requested: bound,
                    count,
                });
            }
        }
        range.map(|number| self.get_page(number)).collect()
    }

    fn page_labels(&self) -> &PageLabelTree {
        self.labels.get_or_init(|| match self.catalog_entry("PageLabels") {
            Ok(root) if !root.is_null() => PageLabelTree::from_number_tree(&self.cos, &root),
            _ => PageLabelTree::new(),
        })
    }

    /// Label of a 1-based page; the decimal page number when unlabeled
    pub fn get_page_label(&self, number: u32) -> Result<String> {
        let count = self.page_count()?;
        if number == 0 || number > count {
            return Err(PdfError::InvalidPageNumber {
                requested: number,
                count,
            });
        }
        Ok(self
            .page_labels()
            .get_label(number - 1)
            .unwrap_or_else(|| number.to_string()))
    }

    /// Page numbers matching `label`
    ///
    /// A page whose full label equals `label` gives that single page.
    /// Otherwise a label section whose prefix equals `label` gives the whole
    /// section. Without `/PageLabels` every page is labeled by its number.
    pub fn get_page_numbers_for_label(&self, label: &str) -> Result<RangeInclusive<u32>> {
        let count = self.page_count()?;
        for number in 1..=count {
            if self.get_page_label(number)? == label {
                return Ok(number..=number);
            }
        }
        let section = self
            .page_labels()
            .sections(count)
            .into_iter()
            .find(|(_, section)| section.prefix.as_deref() == Some(label));
        match section {
            Some((range, _)) => Ok(range),
            None => Err(PdfError::PageLabelNotFound(label.to_string())),
        }
    }

    /// The document information dictionary
    pub fn get_info(&self) -> Result<DocumentInfo> {
        if self.cos.is_encrypted() {
            return Err(PdfError::Encrypted);
        }
        let mut info = DocumentInfo::default();
        let Some(reference) = self.cos.get_root().get("Info") else {
            return Ok(info);
        };
        let dict = self.cos.get_object(reference);
        let Some(dict) = dict.as_dict() else {
            warn!("/Info is a {}, ignoring", dict.type_name());
            return Ok(info);
        };

        for (key, value) in dict.iter() {
            let value = self.cos.get_object(value);
            let entry = match value.as_string() {
                Some(string) => {
                    let text = string.to_text();
                    let date = (key.as_str().ends_with("Date") || text.starts_with("D:"))
                        .then(|| CDDate::parse(&text))
                        .flatten();
                    match date {
                        Some(date) => InfoValue::Date(date),
                        None => InfoValue::Text(text),
                    }
                }
                None => InfoValue::Object(value.as_ref().clone()),
            };
            info.entries.insert(key.as_str().to_string(), entry);
        }
        Ok(info)
    }

    /// The catalog's `/Names` dictionary, Null when absent
    pub fn get_names_dict(&self) -> Result<Rc<CosObject>> {
        self.catalog_entry("Names")
    }
}

impl std::fmt::Debug for PDDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PDDoc")
            .field("version", &self.version())
            .field("pages_loaded", &self.pages.get().map(Vec::len))
            .finish()
    }
}
