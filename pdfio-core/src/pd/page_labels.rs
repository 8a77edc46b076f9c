//! Page labels (ISO 32000-1 Section 12.4.2)
//!
//! The catalog's `/PageLabels` number tree maps 0-based page indices to
//! label dictionaries; each entry applies from its index up to the next one.

use crate::cos::{CosDict, CosDoc, CosObject};
use std::collections::{BTreeMap, HashSet};
use std::ops::RangeInclusive;
use tracing::warn;

/// Numbering style from a label dictionary's `/S` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLabelStyle {
    /// `/S /D`
    Decimal,
    /// `/S /R`
    RomanUpper,
    /// `/S /r`
    RomanLower,
    /// `/S /A`
    LettersUpper,
    /// `/S /a`
    LettersLower,
    /// No `/S`: the label is the prefix alone
    PrefixOnly,
}

/// Largest value written in roman numerals; larger ones fall back to decimal
const MAX_ROMAN: u32 = 3999;

/// Longest letter label; values needing more repeats fall back to decimal
const MAX_LETTER_REPEAT: u32 = 100;

impl PageLabelStyle {
    pub fn from_pdf_name(name: Option<&str>) -> Self {
        match name {
            Some("D") => Self::Decimal,
            Some("R") => Self::RomanUpper,
            Some("r") => Self::RomanLower,
            Some("A") => Self::LettersUpper,
            Some("a") => Self::LettersLower,
            _ => Self::PrefixOnly,
        }
    }

    /// Numeric portion of a label for `number`
    pub fn format(&self, number: u32) -> String {
        let roman = |upper| match roman_numeral(number) {
            Some(text) if upper => text.to_ascii_uppercase(),
            Some(text) => text,
            None => number.to_string(),
        };
        let letters = |upper| letter_label(number, upper).unwrap_or_else(|| number.to_string());
        match self {
            Self::Decimal => number.to_string(),
            Self::RomanUpper => roman(true),
            Self::RomanLower => roman(false),
            Self::LettersUpper => letters(true),
            Self::LettersLower => letters(false),
            Self::PrefixOnly => String::new(),
        }
    }
}

/// One `/PageLabels` entry, applying from its page index to the next entry
#[derive(Debug, Clone, PartialEq)]
pub struct PageLabel {
    pub style: PageLabelStyle,
    /// `/P`, written before the number
    pub prefix: Option<String>,
    /// `/St`, the number given to the first page of the range
    pub start: u32,
}

impl PageLabel {
    /// Read a page label dictionary
    pub fn from_dict(dict: &CosDict) -> Self {
        let start = dict
            .get_integer("St")
            .and_then(|st| u32::try_from(st).ok())
            .filter(|st| *st >= 1)
            .unwrap_or(1);
        PageLabel {
            style: PageLabelStyle::from_pdf_name(dict.get_name("S")),
            prefix: dict
                .get("P")
                .and_then(|p| p.as_string())
                .map(|p| p.to_text()),
            start,
        }
    }

    /// Label of the page `offset` pages into this range
    pub fn format_label(&self, offset: u32) -> String {
        let mut label = self.prefix.clone().unwrap_or_default();
        if self.style != PageLabelStyle::PrefixOnly {
            label.push_str(&self.style.format(self.start.saturating_add(offset)));
        }
        label
    }
}

/// Label ranges of a document, keyed by 0-based first page index
#[derive(Debug, Clone, Default)]
pub struct PageLabelTree {
    ranges: BTreeMap<u32, PageLabel>,
}

impl PageLabelTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_range(&mut self, start_page: u32, label: PageLabel) {
        self.ranges.insert(start_page, label);
    }

    /// Read a `/PageLabels` number tree
    pub fn from_number_tree(doc: &CosDoc, root: &CosObject) -> Self {
        let mut tree = PageLabelTree::new();
        let mut visited = HashSet::new();
        let mut pending = vec![(root.clone(), 0usize)];
        let max_depth = doc.options().max_recursion_depth;

        while let Some((node, depth)) = pending.pop() {
            if let Some(id) = node.as_reference() {
                if !visited.insert(id) {
                    warn!("Page label tree revisits {} {}", id.0, id.1);
                    continue;
                }
            }
            if depth > max_depth {
                warn!("Page label tree deeper than {max_depth}");
                continue;
            }
            let node = doc.get_object(&node);
            let Some(dict) = node.as_dict() else {
                continue;
            };

            if let Some(nums) = doc.get_object(dict.get("Nums").unwrap_or(&CosObject::Null)).as_array() {
                for pair in nums.0.chunks_exact(2) {
                    let Some(index) = pair[0].as_integer().and_then(|i| u32::try_from(i).ok())
                    else {
                        continue;
                    };
                    let label = doc.get_object(&pair[1]);
                    if let Some(label) = label.as_dict() {
                        tree.add_range(index, PageLabel::from_dict(label));
                    }
                }
            }
            if let Some(kids) = doc.get_object(dict.get("Kids").unwrap_or(&CosObject::Null)).as_array() {
                for kid in kids.iter().rev() {
                    pending.push((kid.clone(), depth + 1));
                }
            }
        }
        tree
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Label of the page at 0-based `page_index`
    pub fn get_label(&self, page_index: u32) -> Option<String> {
        self.ranges
            .range(..=page_index)
            .next_back()
            .map(|(&start, label)| label.format_label(page_index - start))
    }

    /// Every label section as a 1-based inclusive page range
    pub fn sections(&self, page_count: u32) -> Vec<(RangeInclusive<u32>, &PageLabel)> {
        let starts: Vec<(&u32, &PageLabel)> = self
            .ranges
            .iter()
            .filter(|(start, _)| **start < page_count)
            .collect();
        starts
            .iter()
            .enumerate()
            .map(|(i, (start, label))| {
                let end = starts
                    .get(i + 1)
                    .map_or(page_count, |(next, _)| **next);
                (**start + 1..=end, *label)
            })
            .collect()
    }
}

/// Lowercase roman numeral, `None` past [`MAX_ROMAN`]
fn roman_numeral(number: u32) -> Option<String> {
    if number > MAX_ROMAN {
        return None;
    }
    const PLACES: [[&str; 10]; 4] = [
        ["", "i", "ii", "iii", "iv", "v", "vi", "vii", "viii", "ix"],
        ["", "x", "xx", "xxx", "xl", "l", "lx", "lxx", "lxxx", "xc"],
        ["", "c", "cc", "ccc", "cd", "d", "dc", "dcc", "dccc", "cm"],
        ["", "m", "mm", "mmm", "", "", "", "", "", ""],
    ];
    let digits = [number % 10, number / 10 % 10, number / 100 % 10, number / 1000];
    Some(
        digits
            .iter()
            .zip(PLACES.iter())
            .rev()
            .map(|(digit, place)| place[*digit as usize])
            .collect(),
    )
}

/// `a..z`, then `aa..zz`, and so on; `None` past [`MAX_LETTER_REPEAT`] letters
fn letter_label(number: u32, upper: bool) -> Option<String> {
    let Some(index) = number.checked_sub(1) else {
        return Some(String::new());
    };
    let repeat = index / 26 + 1;
    if repeat > MAX_LETTER_REPEAT {
        return None;
    }
    let base = if upper { b'A' } else { b'a' };
    let letter = char::from(base + (index % 26) as u8);
    Some(std::iter::repeat(letter).take(repeat as usize).collect())
}
