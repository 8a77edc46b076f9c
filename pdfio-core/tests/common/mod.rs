//! Shared helpers for integration tests: a small PDF writer with correct
//! cross-reference offsets

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Write;
use tempfile::NamedTempFile;

pub struct TestPdf {
    buf: Vec<u8>,
    offsets: BTreeMap<u32, usize>,
}

impl TestPdf {
    pub fn new() -> Self {
        let mut buf = b"%PDF-1.5\n".to_vec();
        buf.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            offsets: BTreeMap::new(),
        }
    }

    pub fn object(&mut self, num: u32, body: &str) -> &mut Self {
        self.offsets.insert(num, self.buf.len());
        self.buf
            .extend_from_slice(format!("{num} 0 obj\n{body}\nendobj\n").as_bytes());
        self
    }

    pub fn stream(&mut self, num: u32, dict_entries: &str, data: &[u8]) -> &mut Self {
        self.offsets.insert(num, self.buf.len());
        self.buf.extend_from_slice(
            format!(
                "{num} 0 obj\n<< /Length {} {dict_entries} >>\nstream\n",
                data.len()
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        self
    }

    /// xref section for the given objects; returns its offset
    pub fn xref_for(&mut self, nums: &[u32], trailer: &str) -> usize {
        let start = self.buf.len();
        let size = self.offsets.keys().max().map_or(1, |max| max + 1);
        let mut out = String::from("xref\n0 1\n0000000000 65535 f \n");
        for num in nums {
            out.push_str(&format!("{num} 1\n{:010} 00000 n \n", self.offsets[num]));
        }
        out.push_str(&format!("trailer\n<< /Size {size} {trailer} >>\n"));
        self.buf.extend_from_slice(out.as_bytes());
        start
    }

    pub fn startxref(&mut self, offset: usize) -> &mut Self {
        self.buf
            .extend_from_slice(format!("startxref\n{offset}\n%%EOF\n").as_bytes());
        self
    }

    /// Every object in one xref section, then the trailer
    pub fn finish(&mut self, trailer: &str) -> Vec<u8> {
        let nums: Vec<u32> = self.offsets.keys().copied().collect();
        let xref = self.xref_for(&nums, trailer);
        self.startxref(xref);
        self.bytes()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

/// Write `data` to a temporary file that lives as long as the handle
pub fn write_temp(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

/// Page tree shape used by the page count tests
#[derive(Debug, Clone)]
pub enum TreeNode {
    Page,
    Pages(Vec<TreeNode>),
}

impl TreeNode {
    pub fn leaf_count(&self) -> usize {
        match self {
            TreeNode::Page => 1,
            TreeNode::Pages(kids) => kids.iter().map(TreeNode::leaf_count).sum(),
        }
    }
}

/// A document whose page tree root has `kids`
pub fn pdf_with_tree(kids: &[TreeNode]) -> Vec<u8> {
    let mut pdf = TestPdf::new();
    let mut next = 3;
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    write_pages_node(&mut pdf, 2, None, kids, &mut next);
    pdf.finish("/Root 1 0 R")
}

fn write_pages_node(
    pdf: &mut TestPdf,
    num: u32,
    parent: Option<u32>,
    kids: &[TreeNode],
    next: &mut u32,
) -> usize {
    let mut refs = Vec::new();
    let mut count = 0;
    for kid in kids {
        let kid_num = *next;
        *next += 1;
        refs.push(format!("{kid_num} 0 R"));
        count += match kid {
            TreeNode::Page => {
                pdf.object(
                    kid_num,
                    &format!("<< /Type /Page /Parent {num} 0 R /MediaBox [0 0 200 200] >>"),
                );
                1
            }
            TreeNode::Pages(grandkids) => {
                write_pages_node(pdf, kid_num, Some(num), grandkids, next)
            }
        };
    }
    let parent = parent.map(|p| format!("/Parent {p} 0 R")).unwrap_or_default();
    pdf.object(
        num,
        &format!(
            "<< /Type /Pages {parent} /Kids [{}] /Count {count} >>",
            refs.join(" ")
        ),
    );
    count
}
