//! Page tree flattening
//!
//! The page tree (ISO 32000-1 Section 7.7.3) nests `/Pages` nodes to any
//! depth; only leaves are pages. `Resources`, `MediaBox`, `CropBox` and
//! `Rotate` may be set on an intermediate node and apply to every page below
//! it unless a nearer node sets them again.

use crate::cos::{CosDict, CosDoc, CosObject, ObjectId};
use std::collections::HashSet;
use std::rc::Rc;
use tracing::warn;

/// Attributes a page may take from its ancestors
pub const INHERITABLE_KEYS: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// Values of the inheritable attributes, nearest ancestor first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InheritedAttributes {
    pub resources: Option<CosObject>,
    pub media_box: Option<CosObject>,
    pub crop_box: Option<CosObject>,
    pub rotate: Option<CosObject>,
}

impl InheritedAttributes {
    /// Attributes seen by the children of `node`
    fn extended_by(&self, node: &CosDict) -> Self {
        let pick = |key: &str, current: &Option<CosObject>| {
            node.get(key).cloned().or_else(|| current.clone())
        };
        InheritedAttributes {
            resources: pick("Resources", &self.resources),
            media_box: pick("MediaBox", &self.media_box),
            crop_box: pick("CropBox", &self.crop_box),
            rotate: pick("Rotate", &self.rotate),
        }
    }

    pub fn get(&self, key: &str) -> Option<&CosObject> {
        match key {
            "Resources" => self.resources.as_ref(),
            "MediaBox" => self.media_box.as_ref(),
            "CropBox" => self.crop_box.as_ref(),
            "Rotate" => self.rotate.as_ref(),
            _ => None,
        }
    }
}

/// One leaf of the page tree
#[derive(Debug, Clone)]
pub struct PageNode {
    /// Object id of the page dictionary, `None` for a direct kid
    pub id: Option<ObjectId>,
    /// The page dictionary
    pub dict: Rc<CosObject>,
    /// Attributes set by ancestors
    pub inherited: InheritedAttributes,
}

impl PageNode {
    /// Own value of `key`, else the inherited one for inheritable keys
    pub fn attribute(&self, key: &str) -> Option<&CosObject> {
        self.dict
            .as_dict()
            .and_then(|dict| dict.get(key))
            .or_else(|| self.inherited.get(key))
    }
}

fn is_pages_node(dict: &CosDict) -> bool {
    match dict.get_type() {
        Some("Pages") => true,
        Some("Page") => false,
        _ => dict.contains_key("Kids"),
    }
}

/// Collect every leaf page below `root`, in document order
///
/// Nodes reached twice and trees deeper than `max_recursion_depth` are
/// skipped with a warning.
pub fn flatten_page_tree(doc: &CosDoc, root: &CosObject) -> Vec<PageNode> {
    let max_depth = doc.options().max_recursion_depth;
    let mut pages = Vec::new();
    let mut visited: HashSet<ObjectId> = HashSet::new();
    let mut pending = vec![(root.clone(), InheritedAttributes::default(), 0usize)];

    while let Some((node, inherited, depth)) = pending.pop() {
        let id = node.as_reference();
        if let Some(id) = id {
            if !visited.insert(id) {
                warn!("Page tree visits {} {} twice, skipping", id.0, id.1);
                continue;
            }
        }
        if depth > max_depth {
            warn!("Page tree deeper than {max_depth}, skipping subtree");
            continue;
        }

        let resolved = doc.get_object(&node);
        let Some(dict) = resolved.as_dict() else {
            warn!("Page tree node is a {}, skipping", resolved.type_name());
            continue;
        };

        if is_pages_node(dict) {
            let inherited = inherited.extended_by(dict);
            let kids = doc.get_object(dict.get("Kids").unwrap_or(&CosObject::Null));
            let Some(kids) = kids.as_array() else {
                warn!("Pages node without /Kids array");
                continue;
            };
            for kid in kids.iter().rev() {
                pending.push((kid.clone(), inherited.clone(), depth + 1));
            }
        } else {
            pages.push(PageNode {
                id,
                dict: Rc::clone(&resolved),
                inherited,
            });
        }
    }

    pages
}
