//! Page object tree
//!
//! Folds the flat operator sequence of a content stream into nested groups:
//! text objects (`BT`/`ET`), marked content (`BMC`/`BDC` ... `EMC`) and saved
//! graphics states (`q`/`Q`). Consecutive text-showing operators inside a text
//! object are merged into one [`TextRun`].

use super::content::{ContentItem, ContentTokenizer, InlineImage, PageElement};
use crate::common::decode_text_string;
use crate::cos::CosObject;
use tracing::debug;

/// Node of the page object tree
#[derive(Debug, Clone, PartialEq)]
pub enum PageObject {
    /// Any operator that is not part of a group or text run
    Element(PageElement),
    /// `BT` ... `ET`
    TextObject(PageObjectGroup),
    /// Consecutive `Tj`, `TJ`, `'` and `"` operators
    TextRun(TextRun),
    /// `BMC`/`BDC` ... `EMC`
    MarkedContent(PageObjectGroup),
    /// `BI` ... `ID` ... `EI`
    InlineImage(InlineImage),
    /// `q` ... `Q`
    SavedState(PageObjectGroup),
}

/// A group with its opening operator, closing operator and contents
///
/// `end` is `None` when the group was closed implicitly, either by an outer
/// closer or by the end of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct PageObjectGroup {
    pub begin: PageElement,
    pub end: Option<PageElement>,
    pub children: Vec<PageObject>,
}

/// Text state parameters (ISO 32000-1 Section 9.3)
#[derive(Debug, Clone, PartialEq)]
pub struct TextState {
    /// Font resource name and size from `Tf`
    pub font: Option<(String, f64)>,
    pub char_spacing: f64,
    pub word_spacing: f64,
    /// Percent, 100 is normal
    pub horizontal_scaling: f64,
    pub leading: f64,
    pub rise: f64,
    pub render_mode: i64,
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            font: None,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 100.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: 0,
        }
    }
}

impl TextState {
    /// Apply a text state operator; other operators are ignored
    fn apply(&mut self, element: &PageElement) {
        let number = |i: usize| element.operands.get(i).and_then(CosObject::as_real);
        match element.operator.as_str() {
            "Tf" => {
                let name = element.operands.first().and_then(CosObject::as_name);
                if let (Some(name), Some(size)) = (name, number(1)) {
                    self.font = Some((name.as_str().to_string(), size));
                }
            }
            "Tc" => self.char_spacing = number(0).unwrap_or(self.char_spacing),
            "Tw" => self.word_spacing = number(0).unwrap_or(self.word_spacing),
            "Tz" => self.horizontal_scaling = number(0).unwrap_or(self.horizontal_scaling),
            "TL" => self.leading = number(0).unwrap_or(self.leading),
            "Ts" => self.rise = number(0).unwrap_or(self.rise),
            "Tr" => {
                if let Some(mode) = element.operands.first().and_then(CosObject::as_integer) {
                    self.render_mode = mode;
                }
            }
            "\"" => {
                self.word_spacing = number(0).unwrap_or(self.word_spacing);
                self.char_spacing = number(1).unwrap_or(self.char_spacing);
            }
            _ => {}
        }
    }
}

/// Merged text-showing operators
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub elements: Vec<PageElement>,
    /// Decoded text of every string shown, in order
    pub text: String,
    /// Text state when the run started
    pub state: TextState,
}

impl TextRun {
    fn push(&mut self, element: PageElement) {
        self.text.push_str(&shown_text(&element));
        self.elements.push(element);
    }
}

fn is_text_showing(operator: &str) -> bool {
    matches!(operator, "Tj" | "TJ" | "'" | "\"")
}

/// Text shown by one text-showing operator
fn shown_text(element: &PageElement) -> String {
    // Tj, ' and " take the string as their last operand.
    match element.operands.last() {
        Some(CosObject::Array(items)) if element.operator == "TJ" => items
            .iter()
            .filter_map(CosObject::as_string)
            .map(|s| decode_text_string(s.as_bytes()))
            .collect(),
        Some(obj) => obj
            .as_string()
            .map(|s| decode_text_string(s.as_bytes()))
            .unwrap_or_default(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Text,
    Marked,
    State,
}

impl GroupKind {
    fn opened_by(operator: &str) -> Option<Self> {
        match operator {
            "BT" => Some(GroupKind::Text),
            "BMC" | "BDC" => Some(GroupKind::Marked),
            "q" => Some(GroupKind::State),
            _ => None,
        }
    }

    fn closed_by(operator: &str) -> Option<Self> {
        match operator {
            "ET" => Some(GroupKind::Text),
            "EMC" => Some(GroupKind::Marked),
            "Q" => Some(GroupKind::State),
            _ => None,
        }
    }
}

struct OpenGroup {
    kind: GroupKind,
    begin: PageElement,
    children: Vec<PageObject>,
    /// Text state to restore when a `q` group closes
    saved_state: Option<TextState>,
}

/// Stack machine that builds the page object tree
#[derive(Default)]
pub struct PageObjectBuilder {
    stack: Vec<OpenGroup>,
    top_level: Vec<PageObject>,
    text_state: TextState,
    run: Option<TextRun>,
}

impl PageObjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current text state
    pub fn text_state(&self) -> &TextState {
        &self.text_state
    }

    pub fn push_item(&mut self, item: ContentItem) {
        match item {
            ContentItem::Element(element) => self.push_element(element),
            ContentItem::InlineImage(image) => {
                self.flush_run();
                self.attach(PageObject::InlineImage(image));
            }
        }
    }

    pub fn push_element(&mut self, element: PageElement) {
        if is_text_showing(&element.operator) && self.in_text_object() {
            self.text_state.apply(&element);
            let state = &self.text_state;
            self.run
                .get_or_insert_with(|| TextRun {
                    elements: Vec::new(),
                    text: String::new(),
                    state: state.clone(),
                })
                .push(element);
            return;
        }
        self.flush_run();

        if let Some(kind) = GroupKind::opened_by(&element.operator) {
            let saved_state = (kind == GroupKind::State).then(|| self.text_state.clone());
            self.stack.push(OpenGroup {
                kind,
                begin: element,
                children: Vec::new(),
                saved_state,
            });
        } else if let Some(kind) = GroupKind::closed_by(&element.operator) {
            self.close(kind, element);
        } else {
            self.text_state.apply(&element);
            self.attach(PageObject::Element(element));
        }
    }

    /// Close every open group and return the tree
    pub fn finish(mut self) -> Vec<PageObject> {
        self.flush_run();
        while !self.stack.is_empty() {
            self.close_top(None);
        }
        self.top_level
    }

    fn in_text_object(&self) -> bool {
        self.stack.iter().any(|g| g.kind == GroupKind::Text)
    }

    fn close(&mut self, kind: GroupKind, end: PageElement) {
        let Some(index) = self.stack.iter().rposition(|g| g.kind == kind) else {
            debug!("Dropping unmatched '{}'", end.operator);
            return;
        };
        while self.stack.len() > index + 1 {
            self.close_top(None);
        }
        self.close_top(Some(end));
    }

    fn close_top(&mut self, end: Option<PageElement>) {
        let Some(group) = self.stack.pop() else {
            return;
        };
        if let Some(state) = group.saved_state {
            self.text_state = state;
        }
        let group_object = PageObjectGroup {
            begin: group.begin,
            end,
            children: group.children,
        };
        self.attach(match group.kind {
            GroupKind::Text => PageObject::TextObject(group_object),
            GroupKind::Marked => PageObject::MarkedContent(group_object),
            GroupKind::State => PageObject::SavedState(group_object),
        });
    }

    fn flush_run(&mut self) {
        if let Some(run) = self.run.take() {
            self.attach(PageObject::TextRun(run));
        }
    }

    fn attach(&mut self, object: PageObject) {
        match self.stack.last_mut() {
            Some(group) => group.children.push(object),
            None => self.top_level.push(object),
        }
    }
}

/// Build the page object tree of decoded content bytes
pub fn build_page_objects(content: &[u8]) -> Vec<PageObject> {
    let mut builder = PageObjectBuilder::new();
    for item in ContentTokenizer::new(content) {
        builder.push_item(item);
    }
    builder.finish()
}

impl PageObject {
    /// Child objects of a group
    pub fn children(&self) -> &[PageObject] {
        match self {
            PageObject::TextObject(group)
            | PageObject::MarkedContent(group)
            | PageObject::SavedState(group) => &group.children,
            _ => &[],
        }
    }

    /// Every text run in this subtree, in content order
    pub fn text_runs(&self) -> Vec<&TextRun> {
        let mut runs = Vec::new();
        collect_runs(std::slice::from_ref(self), &mut runs);
        runs
    }
}

fn collect_runs<'a>(objects: &'a [PageObject], runs: &mut Vec<&'a TextRun>) {
    for object in objects {
        match object {
            PageObject::TextRun(run) => runs.push(run),
            other => collect_runs(other.children(), runs),
        }
    }
}

/// Every text run of a page object list, in content order
pub fn text_runs(objects: &[PageObject]) -> Vec<&TextRun> {
    let mut runs = Vec::new();
    collect_runs(objects, &mut runs);
    runs
}

/// Text of every run, one run per line
pub fn extract_text(objects: &[PageObject]) -> String {
    text_runs(objects)
        .iter()
        .map(|run| run.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
