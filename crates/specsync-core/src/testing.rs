//! Builders for small, valid .docx / .xlsx packages used as test fixtures

use std::collections::BTreeMap;
use std::path::Path;

use crate::ooxml::xlsx::CellRef;
use crate::ooxml::xml::{Element, XmlDocument};
use crate::ooxml::Package;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const SS_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CT_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const OFFICE_DOC_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const WORKSHEET_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const SHARED_STRINGS_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";

#[derive(Debug, Clone)]
enum Block {
    Paragraph(Vec<String>),
    Bookmark {
        prefix: String,
        name: String,
        content: String,
    },
    Table(Vec<Vec<String>>),
}

/// Content of a test Word document
#[derive(Debug, Clone, Default)]
pub struct DocxSpec {
    blocks: Vec<Block>,
}

impl DocxSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// A paragraph with a single run
    pub fn paragraph(self, text: &str) -> Self {
        self.runs(&[text])
    }

    /// A paragraph whose text is split over several runs (bold/plain alternating)
    pub fn runs(mut self, runs: &[&str]) -> Self {
        self.blocks
            .push(Block::Paragraph(runs.iter().map(|r| r.to_string()).collect()));
        self
    }

    /// `prefix` followed by a bookmark named `name` wrapping `content`
    pub fn bookmark(mut self, prefix: &str, name: &str, content: &str) -> Self {
        self.blocks.push(Block::Bookmark {
            prefix: prefix.to_string(),
            name: name.to_string(),
            content: content.to_string(),
        });
        self
    }

    pub fn table(mut self, rows: Vec<Vec<&str>>) -> Self {
        self.blocks.push(Block::Table(
            rows.into_iter()
                .map(|r| r.into_iter().map(|c| c.to_string()).collect())
                .collect(),
        ));
        self
    }
}

fn run(text: &str, bold: bool) -> Element {
    let mut r = Element::new("w:r");
    if bold {
        r = r.with_child(Element::new("w:rPr").with_child(Element::new("w:b")));
    }
    r.with_child(
        Element::new("w:t")
            .with_attr("xml:space", "preserve")
            .with_text(text),
    )
}

fn paragraph(runs: &[String]) -> Element {
    runs.iter()
        .enumerate()
        .fold(Element::new("w:p"), |p, (i, text)| p.with_child(run(text, i % 2 == 1)))
}

fn xml_bytes(root: Element) -> Vec<u8> {
    XmlDocument::new(root)
        .to_bytes()
        .expect("fixture XML always serializes")
}

fn content_types(overrides: &[(&str, &str)]) -> Vec<u8> {
    let mut types = Element::new("Types")
        .with_attr("xmlns", CT_NS)
        .with_child(
            Element::new("Default")
                .with_attr("Extension", "rels")
                .with_attr("ContentType", "application/vnd.openxmlformats-package.relationships+xml"),
        )
        .with_child(
            Element::new("Default")
                .with_attr("Extension", "xml")
                .with_attr("ContentType", "application/xml"),
        );
    for (part, content_type) in overrides {
        types = types.with_child(
            Element::new("Override")
                .with_attr("PartName", *part)
                .with_attr("ContentType", *content_type),
        );
    }
    xml_bytes(types)
}

fn relationships(rels: &[(&str, &str, &str)]) -> Vec<u8> {
    let root = rels.iter().fold(
        Element::new("Relationships").with_attr("xmlns", PKG_RELS_NS),
        |root, (id, kind, target)| {
            root.with_child(
                Element::new("Relationship")
                    .with_attr("Id", *id)
                    .with_attr("Type", *kind)
                    .with_attr("Target", *target),
            )
        },
    );
    xml_bytes(root)
}

/// Serialize a Word document
pub fn docx_bytes(spec: &DocxSpec) -> Vec<u8> {
    let mut body = Element::new("w:body");
    for (index, block) in spec.blocks.iter().enumerate() {
        let element = match block {
            Block::Paragraph(runs) => paragraph(runs),
            Block::Bookmark {
                prefix,
                name,
                content,
            } => {
                let id = index.to_string();
                Element::new("w:p")
                    .with_child(run(prefix, false))
                    .with_child(
                        Element::new("w:bookmarkStart")
                            .with_attr("w:id", id.clone())
                            .with_attr("w:name", name.clone()),
                    )
                    .with_child(run(content, false))
                    .with_child(Element::new("w:bookmarkEnd").with_attr("w:id", id))
            }
            Block::Table(rows) => rows.iter().fold(Element::new("w:tbl"), |table, row| {
                table.with_child(row.iter().fold(Element::new("w:tr"), |tr, cell| {
                    tr.with_child(Element::new("w:tc").with_child(paragraph(&[cell.clone()])))
                }))
            }),
        };
        body = body.with_child(element);
    }
    let document = Element::new("w:document")
        .with_attr("xmlns:w", W_NS)
        .with_attr("xmlns:r", R_NS)
        .with_child(body);

    let mut package = Package::new();
    package.insert(
        "[Content_Types].xml",
        content_types(&[(
            "/word/document.xml",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
        )]),
    );
    package.insert(
        "_rels/.rels",
        relationships(&[("rId1", OFFICE_DOC_REL, "word/document.xml")]),
    );
    package.insert("word/document.xml", xml_bytes(document));
    package.to_bytes().expect("fixture package always serializes")
}

/// Write a Word document to disk
pub fn write_docx(path: &Path, spec: &DocxSpec) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture dir");
    }
    std::fs::write(path, docx_bytes(spec)).expect("write fixture docx");
}

#[derive(Debug, Clone)]
enum CellSpec {
    Shared(String),
    Inline(String),
    Number(String),
}

/// Content of a test workbook
#[derive(Debug, Clone)]
pub struct XlsxSpec {
    sheets: Vec<(String, Vec<(CellRef, CellSpec)>)>,
}

impl XlsxSpec {
    pub fn new(first_sheet: &str) -> Self {
        Self {
            sheets: vec![(first_sheet.to_string(), Vec::new())],
        }
    }

    /// Start another sheet; following cells go there
    pub fn sheet(mut self, name: &str) -> Self {
        self.sheets.push((name.to_string(), Vec::new()));
        self
    }

    fn push(mut self, reference: &str, cell: CellSpec) -> Self {
        let reference = CellRef::parse(reference).expect("fixture cell reference");
        if let Some((_, cells)) = self.sheets.last_mut() {
            cells.push((reference, cell));
        }
        self
    }

    pub fn shared(self, reference: &str, text: &str) -> Self {
        self.push(reference, CellSpec::Shared(text.to_string()))
    }

    pub fn inline(self, reference: &str, text: &str) -> Self {
        self.push(reference, CellSpec::Inline(text.to_string()))
    }

    pub fn number(self, reference: &str, number: &str) -> Self {
        self.push(reference, CellSpec::Number(number.to_string()))
    }
}

/// Serialize a workbook
pub fn xlsx_bytes(spec: &XlsxSpec) -> Vec<u8> {
    let mut shared: Vec<String> = Vec::new();
    let mut package = Package::new();
    let mut overrides = vec![(
        "/xl/workbook.xml".to_string(),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml".to_string(),
    )];
    let mut workbook_rels = Vec::new();
    let mut sheets = Element::new("sheets");
    let mut sheet_parts = Vec::new();

    for (index, (name, cells)) in spec.sheets.iter().enumerate() {
        let number = index + 1;
        let rel_id = format!("rId{}", number);
        sheets = sheets.with_child(
            Element::new("sheet")
                .with_attr("name", name.clone())
                .with_attr("sheetId", number.to_string())
                .with_attr("r:id", rel_id.clone()),
        );
        workbook_rels.push((rel_id, WORKSHEET_REL, format!("worksheets/sheet{}.xml", number)));
        overrides.push((
            format!("/xl/worksheets/sheet{}.xml", number),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml".to_string(),
        ));

        let mut rows: BTreeMap<u32, Vec<(CellRef, &CellSpec)>> = BTreeMap::new();
        for (reference, cell) in cells {
            rows.entry(reference.row).or_default().push((*reference, cell));
        }
        let mut data = Element::new("sheetData");
        for (row_number, mut row_cells) in rows {
            row_cells.sort_by_key(|(r, _)| r.col);
            let mut row = Element::new("row").with_attr("r", row_number.to_string());
            for (reference, cell) in row_cells {
                let c = Element::new("c").with_attr("r", reference.to_string());
                let c = match cell {
                    CellSpec::Shared(text) => {
                        shared.push(text.clone());
                        c.with_attr("t", "s")
                            .with_child(Element::new("v").with_text((shared.len() - 1).to_string()))
                    }
                    CellSpec::Inline(text) => c
                        .with_attr("t", "inlineStr")
                        .with_child(Element::new("is").with_child(Element::new("t").with_text(text.clone()))),
                    CellSpec::Number(n) => c.with_child(Element::new("v").with_text(n.clone())),
                };
                row = row.with_child(c);
            }
            data = data.with_child(row);
        }
        let worksheet = Element::new("worksheet")
            .with_attr("xmlns", SS_NS)
            .with_attr("xmlns:r", R_NS)
            .with_child(data);
        sheet_parts.push((format!("xl/worksheets/sheet{}.xml", number), xml_bytes(worksheet)));
    }

    let shared_id = format!("rId{}", spec.sheets.len() + 1);
    workbook_rels.push((shared_id, SHARED_STRINGS_REL, "sharedStrings.xml".to_string()));
    overrides.push((
        "/xl/sharedStrings.xml".to_string(),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml".to_string(),
    ));

    let workbook = Element::new("workbook")
        .with_attr("xmlns", SS_NS)
        .with_attr("xmlns:r", R_NS)
        .with_child(sheets);
    let sst = shared.iter().fold(
        Element::new("sst")
            .with_attr("xmlns", SS_NS)
            .with_attr("count", shared.len().to_string())
            .with_attr("uniqueCount", shared.len().to_string()),
        |sst, text| sst.with_child(Element::new("si").with_child(Element::new("t").with_text(text.clone()))),
    );

    let override_refs: Vec<(&str, &str)> = overrides
        .iter()
        .map(|(a, b)| (a.as_str(), b.as_str()))
        .collect();
    let rel_refs: Vec<(&str, &str, &str)> = workbook_rels
        .iter()
        .map(|(a, b, c)| (a.as_str(), *b, c.as_str()))
        .collect();

    package.insert("[Content_Types].xml", content_types(&override_refs));
    package.insert(
        "_rels/.rels",
        relationships(&[("rId1", OFFICE_DOC_REL, "xl/workbook.xml")]),
    );
    package.insert("xl/workbook.xml", xml_bytes(workbook));
    package.insert("xl/_rels/workbook.xml.rels", relationships(&rel_refs));
    for (part, bytes) in sheet_parts {
        package.insert(part, bytes);
    }
    package.insert("xl/sharedStrings.xml", xml_bytes(sst));
    package.to_bytes().expect("fixture package always serializes")
}

/// Write a workbook to disk
pub fn write_xlsx(path: &Path, spec: &XlsxSpec) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture dir");
    }
    std::fs::write(path, xlsx_bytes(spec)).expect("write fixture xlsx");
}
