//! SpreadsheetML (.xlsx) reading and editing

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::package::Package;
use super::xml::{Element, Node, XmlDocument};
use crate::error::{Result, SpecSyncError};
use crate::ssot;
use crate::token::{self, Substitution};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// A1-style cell reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    /// 1-based column
    pub col: u32,
    /// 1-based row
    pub row: u32,
}

impl CellRef {
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = || SpecSyncError::InvalidCellRef(reference.to_string());
        let cleaned: String = reference.trim().chars().filter(|c| *c != '$').collect();
        let split = cleaned
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (letters, digits) = cleaned.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid());
        }
        let row: u32 = digits.parse().map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid());
        }
        let col = letters
            .chars()
            .try_fold(0u32, |acc, c| {
                acc.checked_mul(26)?
                    .checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)
            })
            .ok_or_else(invalid)?;
        Ok(Self { col, row })
    }

    pub fn column_name(col: u32) -> String {
        let mut n = col;
        let mut name = Vec::new();
        while n > 0 {
            let rem = ((n - 1) % 26) as u8;
            name.push((b'A' + rem) as char);
            n = (n - 1) / 26;
        }
        name.iter().rev().collect()
    }
}

impl std::fmt::Display for CellRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", Self::column_name(self.col), self.row)
    }
}

/// Typed value to store in a cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(String),
    Bool(bool),
    Text(String),
}

impl From<&Value> for CellValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Number(n) => CellValue::Number(n.to_string()),
            Value::Bool(b) => CellValue::Bool(*b),
            other => CellValue::Text(ssot::render(other)),
        }
    }
}

#[derive(Debug, Clone)]
struct Sheet {
    name: String,
    part: String,
    doc: XmlDocument,
    dirty: bool,
}

/// An opened workbook
#[derive(Debug, Clone)]
pub struct XlsxWorkbook {
    package: Package,
    sheets: Vec<Sheet>,
    shared: Vec<String>,
}

impl XlsxWorkbook {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_package(Package::open(path)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?)
    }

    pub fn from_package(package: Package) -> Result<Self> {
        let workbook = XmlDocument::parse(package.require(WORKBOOK_PART)?)?;
        let targets = relationship_targets(&package)?;

        let mut sheets = Vec::new();
        if let Some(list) = workbook.root.find_child("sheets") {
            for entry in list.child_elements().filter(|e| e.is("sheet")) {
                let name = entry.attr("name").unwrap_or_default().to_string();
                let rel = entry.attr_exact("r:id").or_else(|| entry.attr("id"));
                let part = rel
                    .and_then(|id| targets.get(id))
                    .cloned()
                    .ok_or_else(|| {
                        SpecSyncError::InvalidDocument(format!("sheet {} has no part", name))
                    })?;
                let doc = XmlDocument::parse(package.require(&part)?)?;
                sheets.push(Sheet {
                    name,
                    part,
                    doc,
                    dirty: false,
                });
            }
        }

        let shared = match package.get(SHARED_STRINGS_PART) {
            Some(bytes) => parse_shared_strings(&XmlDocument::parse(bytes)?),
            None => Vec::new(),
        };

        Ok(Self {
            package,
            sheets,
            shared,
        })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s.name == name)
    }

    fn sheet(&self, name: &str) -> Result<&Sheet> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SpecSyncError::SheetNotFound(name.to_string()))
    }

    fn sheet_mut(&mut self, name: &str) -> Result<&mut Sheet> {
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| SpecSyncError::SheetNotFound(name.to_string()))
    }

    /// String form of a cell's value, `None` for an empty or absent cell
    pub fn cell_value(&self, sheet: &str, reference: &str) -> Result<Option<String>> {
        let target = CellRef::parse(reference)?.to_string();
        let sheet = self.sheet(sheet)?;
        let mut cells = Vec::new();
        sheet.doc.root.collect("c", &mut cells);
        Ok(cells
            .into_iter()
            .find(|c| c.attr("r").map(|r| r.eq_ignore_ascii_case(&target)) == Some(true))
            .and_then(|c| read_cell(c, &self.shared)))
    }

    /// Every non-empty cell of a sheet as `(reference, value)`
    pub fn cells(&self, sheet: &str) -> Result<Vec<(String, String)>> {
        let sheet = self.sheet(sheet)?;
        let mut cells = Vec::new();
        sheet.doc.root.collect("c", &mut cells);
        Ok(cells
            .into_iter()
            .filter_map(|c| {
                let reference = c.attr("r")?.to_string();
                read_cell(c, &self.shared).map(|v| (reference, v))
            })
            .collect())
    }

    /// All cell values of all sheets joined by newlines
    pub fn full_text(&self) -> String {
        let mut lines = Vec::new();
        for sheet in &self.sheets {
            if let Ok(cells) = self.cells(&sheet.name) {
                lines.extend(cells.into_iter().map(|(_, v)| v));
            }
        }
        lines.join("\n")
    }

    /// Tokens in the given sheets (all sheets when `None`)
    pub fn scan_tokens(&self, sheet: Option<&str>) -> Result<BTreeSet<String>> {
        let mut found = BTreeSet::new();
        for name in self.target_sheets(sheet)? {
            for (_, value) in self.cells(&name)? {
                token::scan_into(&value, &mut found);
            }
        }
        Ok(found)
    }

    fn target_sheets(&self, sheet: Option<&str>) -> Result<Vec<String>> {
        match sheet {
            Some(name) => {
                self.sheet(name)?;
                Ok(vec![name.to_string()])
            }
            None => Ok(self.sheet_names()),
        }
    }

    /// Write a value into a cell, creating the row and cell when needed
    pub fn set_cell(&mut self, sheet: &str, reference: &str, value: &CellValue) -> Result<()> {
        let target = CellRef::parse(reference)?;
        let sheet = self.sheet_mut(sheet)?;
        let data = sheet
            .doc
            .root
            .find_child_mut("sheetData")
            .ok_or_else(|| SpecSyncError::InvalidDocument("worksheet has no sheetData".into()))?;
        let cell = ensure_cell(data, target);
        write_cell(cell, value);
        sheet.dirty = true;
        Ok(())
    }

    /// Rewrite string cells for which `edit` returns new text. Returns the count.
    pub fn edit_text_cells<F>(&mut self, sheet: Option<&str>, mut edit: F) -> Result<usize>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let names = self.target_sheets(sheet)?;
        let shared = self.shared.clone();
        let mut changed = 0;
        for sheet in self.sheets.iter_mut().filter(|s| names.contains(&s.name)) {
            let mut sheet_changed = 0;
            sheet.doc.root.visit_mut("c", &mut |c: &mut Element| {
                if !is_text_cell(c) {
                    return;
                }
                let Some(current) = read_cell(c, &shared) else {
                    return;
                };
                if let Some(next) = edit(&current) {
                    if next != current {
                        write_cell(c, &CellValue::Text(next));
                        sheet_changed += 1;
                    }
                }
            });
            if sheet_changed > 0 {
                sheet.dirty = true;
                changed += sheet_changed;
            }
        }
        Ok(changed)
    }

    /// Replace a literal string in text cells. Returns cells changed.
    pub fn replace_literal(&mut self, sheet: Option<&str>, needle: &str, value: &str) -> Result<usize> {
        if needle.is_empty() {
            return Ok(0);
        }
        self.edit_text_cells(sheet, |text| {
            text.contains(needle).then(|| text.replace(needle, value))
        })
    }

    /// Substitute resolvable tokens in text cells
    pub fn substitute_tokens<F>(&mut self, sheet: Option<&str>, mut resolve: F) -> Result<Substitution>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut outcome = Substitution::default();
        self.edit_text_cells(sheet, |text| {
            if !token::has_tokens(text) {
                return None;
            }
            let (next, partial) = token::substitute(text, &mut resolve);
            outcome.merge(partial);
            Some(next)
        })?;
        Ok(outcome)
    }

    fn updated_package(&self) -> Result<Package> {
        let mut package = self.package.clone();
        for sheet in self.sheets.iter().filter(|s| s.dirty) {
            package.insert(sheet.part.clone(), sheet.doc.to_bytes()?);
        }
        Ok(package)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.updated_package()?.to_bytes()
    }

    /// Save as a new file; the source file is never touched
    pub fn save(&self, path: &Path) -> Result<()> {
        self.updated_package()?.save(path)
    }
}

fn relationship_targets(package: &Package) -> Result<BTreeMap<String, String>> {
    let mut targets = BTreeMap::new();
    let Some(bytes) = package.get(WORKBOOK_RELS_PART) else {
        return Ok(targets);
    };
    let rels = XmlDocument::parse(bytes)?;
    for rel in rels.root.child_elements().filter(|e| e.is("Relationship")) {
        if let (Some(id), Some(target)) = (rel.attr("Id"), rel.attr("Target")) {
            let part = match target.strip_prefix('/') {
                Some(absolute) => absolute.to_string(),
                None => format!("xl/{}", target),
            };
            targets.insert(id.to_string(), part);
        }
    }
    Ok(targets)
}

fn rich_text(element: &Element) -> String {
    let mut out = String::new();
    for child in element.child_elements() {
        if child.is("t") {
            out.push_str(&child.text());
        } else if child.is("r") {
            if let Some(t) = child.find_child("t") {
                out.push_str(&t.text());
            }
        }
    }
    out
}

fn parse_shared_strings(doc: &XmlDocument) -> Vec<String> {
    doc.root
        .child_elements()
        .filter(|e| e.is("si"))
        .map(rich_text)
        .collect()
}

fn is_text_cell(cell: &Element) -> bool {
    matches!(cell.attr("t"), Some("s") | Some("inlineStr") | Some("str"))
}

fn read_cell(cell: &Element, shared: &[String]) -> Option<String> {
    let raw = cell.find_child("v").map(|v| v.text());
    match cell.attr("t") {
        Some("s") => {
            let index: usize = raw?.trim().parse().ok()?;
            shared.get(index).cloned()
        }
        Some("inlineStr") => cell.find_child("is").map(rich_text),
        Some("b") => raw.map(|v| (v.trim() == "1").to_string()),
        _ => raw,
    }
}

fn write_cell(cell: &mut Element, value: &CellValue) {
    let prefix = cell
        .name
        .rsplit_once(':')
        .map(|(p, _)| format!("{}:", p))
        .unwrap_or_default();
    cell.remove_attr("t");
    cell.children.clear();
    match value {
        CellValue::Number(n) => {
            cell.children
                .push(Node::Element(Element::new(format!("{}v", prefix)).with_text(n.clone())));
        }
        CellValue::Bool(b) => {
            cell.set_attr("t", "b");
            cell.children.push(Node::Element(
                Element::new(format!("{}v", prefix)).with_text(if *b { "1" } else { "0" }),
            ));
        }
        CellValue::Text(text) => {
            cell.set_attr("t", "inlineStr");
            cell.children.push(Node::Element(
                Element::new(format!("{}is", prefix)).with_child(
                    Element::new(format!("{}t", prefix))
                        .with_attr("xml:space", "preserve")
                        .with_text(text.clone()),
                ),
            ));
        }
    }
}

fn row_number(row: &Element, position: usize) -> u32 {
    row.attr("r")
        .and_then(|r| r.parse().ok())
        .unwrap_or(position as u32 + 1)
}

fn ensure_cell(data: &mut Element, target: CellRef) -> &mut Element {
    let prefix = data
        .name
        .rsplit_once(':')
        .map(|(p, _)| format!("{}:", p))
        .unwrap_or_default();

    // Locate the row, or the index where it should be inserted.
    let mut row_index = None;
    let mut insert_at = data.children.len();
    let mut position = 0;
    for (index, node) in data.children.iter().enumerate() {
        if let Node::Element(row) = node {
            if !row.is("row") {
                continue;
            }
            let number = row_number(row, position);
            position += 1;
            if number == target.row {
                row_index = Some(index);
                break;
            }
            if number > target.row {
                insert_at = index;
                break;
            }
        }
    }
    let row_index = row_index.unwrap_or_else(|| {
        let row = Element::new(format!("{}row", prefix)).with_attr("r", target.row.to_string());
        data.children.insert(insert_at, Node::Element(row));
        insert_at
    });

    let Node::Element(row) = &mut data.children[row_index] else {
        unreachable!("row index always points at an element");
    };

    let reference = target.to_string();
    let mut cell_index = None;
    let mut insert_at = row.children.len();
    for (index, node) in row.children.iter().enumerate() {
        if let Node::Element(cell) = node {
            if !cell.is("c") {
                continue;
            }
            match cell.attr("r").and_then(|r| CellRef::parse(r).ok()) {
                Some(existing) if existing == target => {
                    cell_index = Some(index);
                    break;
                }
                Some(existing) if existing.col > target.col => {
                    insert_at = index;
                    break;
                }
                _ => {}
            }
        }
    }
    let cell_index = cell_index.unwrap_or_else(|| {
        let cell = Element::new(format!("{}c", prefix)).with_attr("r", reference);
        row.children.insert(insert_at, Node::Element(cell));
        insert_at
    });

    match &mut row.children[cell_index] {
        Node::Element(cell) => cell,
        _ => unreachable!("cell index always points at an element"),
    }
}
