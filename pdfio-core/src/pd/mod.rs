//! PD layer
//!
//! The logical document model on top of the COS layer: the catalog, the page
//! tree with inherited attributes, page labels, and page content parsed into
//! a tree of page objects.

pub mod content;
pub mod document;
pub mod page;
pub mod page_labels;
pub mod page_objects;
pub mod page_tree;

pub use self::content::{ContentItem, ContentTokenizer, InlineImage, PageElement};
pub use self::document::{DocumentInfo, InfoValue, PDDoc, PageSelector};
pub use self::page::PDPage;
pub use self::page_labels::{PageLabel, PageLabelStyle, PageLabelTree};
pub use self::page_objects::{
    build_page_objects, extract_text, text_runs, PageObject, PageObjectBuilder, PageObjectGroup,
    TextRun, TextState,
};
pub use self::page_tree::{flatten_page_tree, PageNode};
