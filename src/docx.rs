//! Minimal WordprocessingML package writer.
//!
//! [`OutputDocument`] collects paragraphs, page breaks and tables. It can be
//! saved as a fresh `.docx`, or appended to the body of an existing one. An
//! append only inserts new elements after the last body element and before
//! the trailing section properties; everything already in the package is
//! copied through untouched.

use crate::engine::ExtractedTable;
use anyhow::{Context, Result, anyhow};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DOCUMENT_PART: &str = "word/document.xml";
const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
/// A4 text width in twentieths of a point, with one-inch margins.
const TEXT_WIDTH_TWIPS: usize = 9026;

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph { text: String, bold: bool },
    PageBreak,
    Table(ExtractedTable),
}

#[derive(Debug, Clone, Default)]
pub struct OutputDocument {
    blocks: Vec<Block>,
}

impl OutputDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_paragraph(&mut self, text: impl Into<String>) {
        self.blocks.push(Block::Paragraph {
            text: text.into(),
            bold: false,
        });
    }

    pub fn push_bold_paragraph(&mut self, text: impl Into<String>) {
        self.blocks.push(Block::Paragraph {
            text: text.into(),
            bold: true,
        });
    }

    pub fn push_page_break(&mut self) {
        self.blocks.push(Block::PageBreak);
    }

    pub fn push_table(&mut self, table: ExtractedTable) {
        self.blocks.push(Block::Table(table));
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Writes a new package at `path`, replacing whatever was there.
    pub fn save(&self, path: &Path) -> Result<()> {
        let body = self.body_xml()?;
        let document = wrap_document(&body)?;
        let created = crate::util::now_rfc3339();
        let core = CORE_XML.replace("{created}", &created);

        let parts: [(&str, &[u8]); 7] = [
            ("[Content_Types].xml", CONTENT_TYPES_XML.as_bytes()),
            ("_rels/.rels", ROOT_RELS_XML.as_bytes()),
            ("docProps/app.xml", APP_XML.as_bytes()),
            ("docProps/core.xml", core.as_bytes()),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS_XML.as_bytes()),
            ("word/styles.xml", STYLES_XML.as_bytes()),
            (DOCUMENT_PART, &document),
        ];
        write_package(path, parts.iter().map(|(n, b)| PackagePart::File(n, b)))
            .with_context(|| format!("writing docx: {}", path.display()))
    }

    /// Appends every block to the body of the existing package at `path`.
    /// The file is rewritten through a sibling temp file, so a failure leaves
    /// the original untouched.
    pub fn append_to(&self, path: &Path) -> Result<()> {
        if self.blocks.is_empty() {
            return Ok(());
        }
        let fragment = self.body_xml()?;

        let file = File::open(path).with_context(|| format!("opening docx: {}", path.display()))?;
        let mut archive = ZipArchive::new(file)
            .with_context(|| format!("reading docx archive: {}", path.display()))?;

        let mut entries = Vec::with_capacity(archive.len());
        let mut found = false;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            if entry.is_dir() {
                entries.push((name, None));
                continue;
            }
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut bytes)
                .with_context(|| format!("reading part {name}"))?;
            if name == DOCUMENT_PART {
                let xml = String::from_utf8(bytes).with_context(|| "document.xml is not UTF-8")?;
                bytes = splice_into_body(&xml, &String::from_utf8_lossy(&fragment))?.into_bytes();
                found = true;
            }
            entries.push((name, Some(bytes)));
        }
        if !found {
            return Err(anyhow!("{} has no {DOCUMENT_PART}", path.display()));
        }

        write_package(
            path,
            entries.iter().map(|(name, bytes)| match bytes {
                Some(b) => PackagePart::File(name, b),
                None => PackagePart::Dir(name),
            }),
        )
        .with_context(|| format!("rewriting docx: {}", path.display()))
    }

    fn body_xml(&self) -> Result<Vec<u8>> {
        let mut w = Writer::new(Vec::new());
        for block in &self.blocks {
            match block {
                Block::Paragraph { text, bold } => write_paragraph(&mut w, text, *bold)?,
                Block::PageBreak => write_page_break(&mut w)?,
                Block::Table(t) => {
                    write_table(&mut w, t)?;
                    w.write_event(Event::Empty(BytesStart::new("w:p")))?;
                }
            }
        }
        Ok(w.into_inner())
    }
}

/// Counts what a package's body holds. Paragraph texts exclude empty
/// paragraphs and everything inside tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocxSummary {
    pub paragraphs: Vec<String>,
    pub bold_paragraphs: Vec<String>,
    pub page_breaks: usize,
    /// (rows, columns) per table, in document order.
    pub tables: Vec<(usize, usize)>,
}

pub fn inspect(path: &Path) -> Result<DocxSummary> {
    let xml = read_document_xml(path)?;
    summarize(&xml)
}

pub fn read_document_xml(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("opening docx: {}", path.display()))?;
    let mut archive = ZipArchive::new(file)?;
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .with_context(|| format!("{} has no {DOCUMENT_PART}", path.display()))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}

fn summarize(xml: &str) -> Result<DocxSummary> {
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    let mut summary = DocxSummary::default();
    let mut table_depth = 0usize;
    let mut in_text = false;
    let mut para: Option<(String, bool)> = None;
    let mut rows = 0usize;
    let mut cols = 0usize;
    let mut row_cells = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        rows = 0;
                        cols = 0;
                    }
                }
                b"w:tr" if table_depth == 1 => {
                    rows += 1;
                    row_cells = 0;
                }
                b"w:tc" if table_depth == 1 => row_cells += 1,
                b"w:p" if table_depth == 0 => para = Some((String::new(), false)),
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:br" => {
                    let is_page = e
                        .try_get_attribute("w:type")?
                        .is_some_and(|a| a.value.as_ref() == b"page");
                    if is_page && table_depth == 0 {
                        summary.page_breaks += 1;
                    }
                }
                b"w:b" => {
                    if let Some((_, bold)) = para.as_mut() {
                        *bold = true;
                    }
                }
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some((text, _)) = para.as_mut() {
                    text.push_str(&t.unescape()?);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:tr" if table_depth == 1 => cols = cols.max(row_cells),
                b"w:tbl" => {
                    if table_depth == 1 {
                        summary.tables.push((rows, cols));
                    }
                    table_depth = table_depth.saturating_sub(1);
                }
                b"w:p" if table_depth == 0 => {
                    if let Some((text, bold)) = para.take() {
                        if !text.is_empty() {
                            if bold {
                                summary.bold_paragraphs.push(text.clone());
                            }
                            summary.paragraphs.push(text);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(summary)
}

/// Inserts `fragment` after the last body element, ahead of a body-level
/// `<w:sectPr>` when there is one.
fn splice_into_body(xml: &str, fragment: &str) -> Result<String> {
    if !xml.contains("xmlns:w=") {
        return Err(anyhow!("document.xml does not bind the w: namespace"));
    }
    let body_end = xml
        .rfind("</w:body>")
        .ok_or_else(|| anyhow!("document.xml has no </w:body>"))?;
    let head = &xml[..body_end];

    let at = body_sect_pr(head).unwrap_or(body_end);

    let mut out = String::with_capacity(xml.len() + fragment.len());
    out.push_str(&xml[..at]);
    out.push_str(fragment);
    out.push_str(&xml[at..]);
    Ok(out)
}

/// Start of the `<w:sectPr>` that is the body's last child. Paragraph-level
/// ones sit inside `<w:pPr>`, and `<w:sectPrChange>` nests another sectPr
/// inside the body-level one.
fn body_sect_pr(head: &str) -> Option<usize> {
    const OPEN: &str = "<w:sectPr";
    const CLOSE: &str = "</w:sectPr>";
    let body = head.trim_end();
    let mut depth = 0usize;
    if body.ends_with(CLOSE) {
        // Walk opening tags backwards until the closing tag at the end is matched.
        for (i, _) in body.rmatch_indices(OPEN) {
            let rest = &body[i + OPEN.len()..];
            if !matches!(rest.chars().next(), Some('>' | '/' | ' ' | '\t' | '\r' | '\n')) {
                continue;
            }
            let tag_end = rest.find('>')?;
            let self_closing = rest[..tag_end].ends_with('/');
            if self_closing {
                continue;
            }
            depth += 1;
            if depth == body[i..].matches(CLOSE).count() {
                return Some(i);
            }
        }
        None
    } else if body.ends_with("/>") {
        let i = body.rfind(OPEN)?;
        let rest = &body[i + OPEN.len()..];
        let plain = matches!(rest.chars().next(), Some('/' | ' ' | '\t' | '\r' | '\n'));
        (plain && rest.find('>')? == rest.len() - 1).then_some(i)
    } else {
        None
    }
}

fn xml_safe(text: &str) -> String {
    text.chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || c >= ' ')
        .collect()
}

fn write_paragraph(w: &mut Writer<Vec<u8>>, text: &str, bold: bool) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new("w:p")))?;
    w.write_event(Event::Start(BytesStart::new("w:r")))?;
    if bold {
        w.write_event(Event::Start(BytesStart::new("w:rPr")))?;
        w.write_event(Event::Empty(BytesStart::new("w:b")))?;
        w.write_event(Event::End(BytesEnd::new("w:rPr")))?;
    }
    write_text(w, text)?;
    w.write_event(Event::End(BytesEnd::new("w:r")))?;
    w.write_event(Event::End(BytesEnd::new("w:p")))?;
    Ok(())
}

fn write_text(w: &mut Writer<Vec<u8>>, text: &str) -> Result<()> {
    let clean = xml_safe(text);
    w.write_event(Event::Start(
        BytesStart::new("w:t").with_attributes([("xml:space", "preserve")]),
    ))?;
    w.write_event(Event::Text(BytesText::new(&clean)))?;
    w.write_event(Event::End(BytesEnd::new("w:t")))?;
    Ok(())
}

fn write_page_break(w: &mut Writer<Vec<u8>>) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new("w:p")))?;
    w.write_event(Event::Start(BytesStart::new("w:r")))?;
    w.write_event(Event::Empty(
        BytesStart::new("w:br").with_attributes([("w:type", "page")]),
    ))?;
    w.write_event(Event::End(BytesEnd::new("w:r")))?;
    w.write_event(Event::End(BytesEnd::new("w:p")))?;
    Ok(())
}

fn write_table(w: &mut Writer<Vec<u8>>, table: &ExtractedTable) -> Result<()> {
    let cols = table.col_count().max(1);
    let col_width = (TEXT_WIDTH_TWIPS / cols).to_string();

    w.write_event(Event::Start(BytesStart::new("w:tbl")))?;
    w.write_event(Event::Start(BytesStart::new("w:tblPr")))?;
    w.write_event(Event::Empty(
        BytesStart::new("w:tblStyle").with_attributes([("w:val", "TableGrid")]),
    ))?;
    w.write_event(Event::Empty(
        BytesStart::new("w:tblW").with_attributes([("w:w", "0"), ("w:type", "auto")]),
    ))?;
    // Explicit borders: the target package may not define TableGrid.
    w.write_event(Event::Start(BytesStart::new("w:tblBorders")))?;
    for edge in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
        w.write_event(Event::Empty(BytesStart::new(edge).with_attributes([
            ("w:val", "single"),
            ("w:sz", "4"),
            ("w:space", "0"),
            ("w:color", "auto"),
        ])))?;
    }
    w.write_event(Event::End(BytesEnd::new("w:tblBorders")))?;
    w.write_event(Event::End(BytesEnd::new("w:tblPr")))?;

    w.write_event(Event::Start(BytesStart::new("w:tblGrid")))?;
    for _ in 0..table.col_count() {
        w.write_event(Event::Empty(
            BytesStart::new("w:gridCol").with_attributes([("w:w", col_width.as_str())]),
        ))?;
    }
    w.write_event(Event::End(BytesEnd::new("w:tblGrid")))?;

    for row in table.rows() {
        w.write_event(Event::Start(BytesStart::new("w:tr")))?;
        for cell in row {
            w.write_event(Event::Start(BytesStart::new("w:tc")))?;
            w.write_event(Event::Start(BytesStart::new("w:tcPr")))?;
            w.write_event(Event::Empty(
                BytesStart::new("w:tcW")
                    .with_attributes([("w:w", col_width.as_str()), ("w:type", "dxa")]),
            ))?;
            w.write_event(Event::End(BytesEnd::new("w:tcPr")))?;
            w.write_event(Event::Start(BytesStart::new("w:p")))?;
            w.write_event(Event::Start(BytesStart::new("w:r")))?;
            write_text(w, cell.as_deref().unwrap_or(""))?;
            w.write_event(Event::End(BytesEnd::new("w:r")))?;
            w.write_event(Event::End(BytesEnd::new("w:p")))?;
            w.write_event(Event::End(BytesEnd::new("w:tc")))?;
        }
        w.write_event(Event::End(BytesEnd::new("w:tr")))?;
    }
    w.write_event(Event::End(BytesEnd::new("w:tbl")))?;
    Ok(())
}

fn wrap_document(body: &[u8]) -> Result<Vec<u8>> {
    let mut w = Writer::new(Vec::new());
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    w.write_event(Event::Start(
        BytesStart::new("w:document").with_attributes([("xmlns:w", W_NS), ("xmlns:r", R_NS)]),
    ))?;
    w.write_event(Event::Start(BytesStart::new("w:body")))?;
    w.get_mut().extend_from_slice(body);
    w.get_mut().extend_from_slice(SECT_PR_XML.as_bytes());
    w.write_event(Event::End(BytesEnd::new("w:body")))?;
    w.write_event(Event::End(BytesEnd::new("w:document")))?;
    Ok(w.into_inner())
}

enum PackagePart<'a> {
    File(&'a str, &'a [u8]),
    Dir(&'a str),
}

fn write_package<'a>(path: &Path, parts: impl Iterator<Item = PackagePart<'a>>) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::Builder::new()
        .prefix(".docx-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("creating temp file in {}", parent.display()))?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(tmp.reopen()?);
    for part in parts {
        match part {
            PackagePart::File(name, bytes) => {
                zip.start_file(name, options)?;
                zip.write_all(bytes)?;
            }
            PackagePart::Dir(name) => zip.add_directory(name, options)?,
        }
    }
    zip.finish()?;

    tmp.persist(path)
        .map_err(|e| anyhow!("replacing {}: {}", path.display(), e.error))?;
    Ok(())
}

const SECT_PR_XML: &str = r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/><w:cols w:space="708"/></w:sectPr>"#;

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/><Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/></Relationships>"#;

const DOCUMENT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const APP_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes"><Application>pdf2word</Application><DocSecurity>0</DocSecurity><ScaleCrop>false</ScaleCrop><LinksUpToDate>false</LinksUpToDate><SharedDoc>false</SharedDoc><HyperlinksChanged>false</HyperlinksChanged><AppVersion>1.0000</AppVersion></Properties>"#;

const CORE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title></dc:title><dc:creator>pdf2word</dc:creator><cp:lastModifiedBy>pdf2word</cp:lastModifiedBy><cp:revision>1</cp:revision><dcterms:created xsi:type="dcterms:W3CDTF">{created}</dcterms:created><dcterms:modified xsi:type="dcterms:W3CDTF">{created}</dcterms:modified></cp:coreProperties>"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:eastAsia="Calibri" w:hAnsi="Calibri" w:cs="Times New Roman"/><w:sz w:val="22"/><w:szCs w:val="22"/><w:lang w:val="en-US" w:eastAsia="en-US" w:bidi="ar-SA"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after="160" w:line="259" w:lineRule="auto"/></w:pPr></w:pPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style><w:style w:type="character" w:default="1" w:styleId="DefaultParagraphFont"><w:name w:val="Default Paragraph Font"/><w:uiPriority w:val="1"/><w:semiHidden/><w:unhideWhenUsed/></w:style><w:style w:type="table" w:default="1" w:styleId="TableNormal"><w:name w:val="Normal Table"/><w:uiPriority w:val="99"/><w:semiHidden/><w:unhideWhenUsed/><w:tblPr><w:tblInd w:w="0" w:type="dxa"/><w:tblCellMar><w:top w:w="0" w:type="dxa"/><w:left w:w="108" w:type="dxa"/><w:bottom w:w="0" w:type="dxa"/><w:right w:w="108" w:type="dxa"/></w:tblCellMar></w:tblPr></w:style><w:style w:type="table" w:styleId="TableGrid"><w:name w:val="Table Grid"/><w:basedOn w:val="TableNormal"/><w:uiPriority w:val="39"/><w:pPr><w:spacing w:after="0" w:line="240" w:lineRule="auto"/></w:pPr><w:tblPr><w:tblBorders><w:top w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:left w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:bottom w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:right w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:insideH w:val="single" w:sz="4" w:space="0" w:color="auto"/><w:insideV w:val="single" w:sz="4" w:space="0" w:color="auto"/></w:tblBorders></w:tblPr></w:style></w:styles>"#;
