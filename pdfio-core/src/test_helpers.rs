//! Helper functions for creating valid test PDFs with correct offsets

use std::collections::BTreeMap;

/// Incrementally writes a PDF file, tracking object offsets
pub struct PdfBuilder {
    buf: Vec<u8>,
    offsets: BTreeMap<u32, (usize, u16)>,
    compressed: BTreeMap<u32, (u32, u32)>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::with_version("1.7")
    }

    pub fn with_version(version: &str) -> Self {
        let mut buf = format!("%PDF-{version}\n").into_bytes();
        buf.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            offsets: BTreeMap::new(),
            compressed: BTreeMap::new(),
        }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn offset_of(&self, num: u32) -> usize {
        self.offsets[&num].0
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn object(&mut self, num: u32, body: &str) -> &mut Self {
        self.object_gen(num, 0, body)
    }

    pub fn object_gen(&mut self, num: u32, gen: u16, body: &str) -> &mut Self {
        self.offsets.insert(num, (self.buf.len(), gen));
        self.buf
            .extend_from_slice(format!("{num} {gen} obj\n{body}\nendobj\n").as_bytes());
        self
    }

    /// A stream object with a correct direct `/Length`
    pub fn stream(&mut self, num: u32, dict_entries: &str, data: &[u8]) -> &mut Self {
        self.offsets.insert(num, (self.buf.len(), 0));
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

    /// An uncompressed object stream holding `members`
    pub fn object_stream(&mut self, num: u32, members: &[(u32, &str)]) -> &mut Self {
        let mut header = String::new();
        let mut body = String::new();
        for (index, (member, text)) in members.iter().enumerate() {
            header.push_str(&format!("{member} {} ", body.len()));
            body.push_str(text);
            body.push(' ');
            self.compressed.insert(*member, (num, index as u32));
        }
        let first = header.len();
        let data = format!("{header}{body}");
        self.stream(
            num,
            &format!("/Type /ObjStm /N {} /First {first}", members.len()),
            data.as_bytes(),
        )
    }

    /// Classic xref section covering every object written so far
    ///
    /// Returns the section offset; the trailer gets `/Size` prepended.
    pub fn xref_table(&mut self, trailer: &str) -> usize {
        let nums: Vec<u32> = self.offsets.keys().copied().collect();
        self.xref_table_for(&nums, trailer, true)
    }

    /// Classic xref section for `nums`, one subsection per contiguous run
    pub fn xref_table_for(&mut self, nums: &[u32], trailer: &str, with_free_head: bool) -> usize {
        let start = self.buf.len();
        let size = self.offsets.keys().max().map_or(1, |max| max + 1);
        let mut out = String::from("xref\n");

        let mut runs: Vec<Vec<u32>> = Vec::new();
        if with_free_head {
            runs.push(vec![0]);
        }
        for &num in nums {
            match runs.last_mut() {
                Some(run) if run.last().is_some_and(|last| last + 1 == num) => run.push(num),
                _ => runs.push(vec![num]),
            }
        }
        for run in runs {
            out.push_str(&format!("{} {}\n", run[0], run.len()));
            for num in run {
                match self.offsets.get(&num) {
                    Some((offset, gen)) if num != 0 => {
                        out.push_str(&format!("{offset:010} {gen:05} n \n"))
                    }
                    _ => out.push_str("0000000000 65535 f \n"),
                }
            }
        }
        out.push_str(&format!("trailer\n<< /Size {size} {trailer} >>\n"));
        self.buf.extend_from_slice(out.as_bytes());
        start
    }

    /// Cross-reference stream covering every object written so far
    pub fn xref_stream(&mut self, num: u32, trailer: &str) -> usize {
        let start = self.buf.len();
        self.offsets.insert(num, (start, 0));
        let max = self
            .offsets
            .keys()
            .chain(self.compressed.keys())
            .max()
            .copied()
            .unwrap_or(0);

        let mut data = Vec::new();
        for n in 0..=max {
            let (kind, field2, field3) = if let Some((stm, index)) = self.compressed.get(&n) {
                (2u8, *stm, *index as u16)
            } else if let Some((offset, gen)) = self.offsets.get(&n) {
                (1u8, *offset as u32, *gen)
            } else {
                (0u8, 0, if n == 0 { 65535 } else { 0 })
            };
            data.push(kind);
            data.extend_from_slice(&field2.to_be_bytes());
            data.extend_from_slice(&field3.to_be_bytes());
        }

        self.buf.extend_from_slice(
            format!(
                "{num} 0 obj\n<< /Type /XRef /W [1 4 2] /Size {} /Length {} {trailer} >>\nstream\n",
                max + 1,
                data.len()
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(&data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        start
    }

    pub fn startxref(&mut self, offset: usize) -> &mut Self {
        self.buf
            .extend_from_slice(format!("startxref\n{offset}\n%%EOF\n").as_bytes());
        self
    }

    pub fn finish(&self) -> Vec<u8> {
        self.buf.clone()
    }

    /// Append a classic xref table, startxref and `%%EOF`
    pub fn finish_with_table(&mut self, trailer: &str) -> Vec<u8> {
        let xref = self.xref_table(trailer);
        self.startxref(xref);
        self.finish()
    }
}

/// Page content used by [`create_minimal_pdf`]
pub const HELLO_CONTENT: &[u8] = b"BT /F1 12 Tf 72 712 Td (Hello) Tj ET";

/// Catalog, page tree and one page with a text content stream
pub fn create_minimal_pdf() -> Vec<u8> {
    let mut pdf = PdfBuilder::new();
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>",
        )
        .stream(4, "", HELLO_CONTENT)
        .object(5, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>");
    pdf.finish_with_table("/Root 1 0 R")
}

/// A flat page tree with `count` empty pages
pub fn create_pdf_with_pages(count: u32) -> Vec<u8> {
    let mut pdf = PdfBuilder::new();
    let kids: Vec<String> = (0..count).map(|i| format!("{} 0 R", i + 3)).collect();
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>").object(
        2,
        &format!(
            "<< /Type /Pages /Kids [{}] /Count {count} /MediaBox [0 0 612 792] >>",
            kids.join(" ")
        ),
    );
    for i in 0..count {
        pdf.object(i + 3, "<< /Type /Page /Parent 2 0 R >>");
    }
    pdf.finish_with_table("/Root 1 0 R")
}

/// Catalog and info dictionary only
pub fn create_pdf_with_info() -> Vec<u8> {
    let mut pdf = PdfBuilder::new();
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object(
            3,
            "<< /Title (Test PDF) /Author (Test Author) /CreationDate (D:20230115103000+01'00') >>",
        );
    pdf.finish_with_table("/Root 1 0 R /Info 3 0 R")
}
