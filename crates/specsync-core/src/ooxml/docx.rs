//! WordprocessingML (.docx) reading and editing
//!
//! Text is addressed per paragraph: a paragraph's text is the concatenation of
//! its `w:t` runs. When a paragraph's text is rewritten, the whole new text goes
//! into its first run and the other runs are emptied, so any formatting that
//! differed between runs of that paragraph is lost. Paragraphs that are not
//! rewritten are left exactly as they were.

use std::collections::BTreeSet;
use std::path::Path;

use super::package::Package;
use super::xml::{Element, Node, XmlDocument};
use crate::error::{Result, SpecSyncError};
use crate::token::{self, Substitution};

const DOCUMENT_PART: &str = "word/document.xml";

/// An opened Word document
#[derive(Debug, Clone)]
pub struct DocxDocument {
    package: Package,
    document: XmlDocument,
}

impl DocxDocument {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_package(Package::open(path)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?)
    }

    pub fn from_package(package: Package) -> Result<Self> {
        let document = XmlDocument::parse(package.require(DOCUMENT_PART)?)?;
        if document.root.find_child("body").is_none() {
            return Err(SpecSyncError::InvalidDocument(
                "word/document.xml has no body".to_string(),
            ));
        }
        Ok(Self { package, document })
    }

    fn body(&self) -> &Element {
        // Presence checked in from_package.
        self.document
            .root
            .find_child("body")
            .unwrap_or(&self.document.root)
    }

    /// Every paragraph in document order, including those inside table cells
    pub fn paragraph_texts(&self) -> Vec<String> {
        let mut paragraphs = Vec::new();
        self.body().collect("p", &mut paragraphs);
        paragraphs.into_iter().map(paragraph_text).collect()
    }

    /// Paragraphs that sit directly in the body (not in tables)
    pub fn body_paragraph_texts(&self) -> Vec<String> {
        self.body()
            .child_elements()
            .filter(|e| e.is("p"))
            .map(paragraph_text)
            .collect()
    }

    /// Top-level tables as rows of cell texts
    pub fn tables(&self) -> Vec<Vec<Vec<String>>> {
        self.body()
            .child_elements()
            .filter(|e| e.is("tbl"))
            .map(|table| {
                table
                    .child_elements()
                    .filter(|e| e.is("tr"))
                    .map(|row| {
                        row.child_elements()
                            .filter(|e| e.is("tc"))
                            .map(cell_text)
                            .collect()
                    })
                    .collect()
            })
            .collect()
    }

    /// All paragraph text joined by newlines
    pub fn full_text(&self) -> String {
        self.paragraph_texts().join("\n")
    }

    /// All `{dotted.key}` tokens in the document
    pub fn scan_tokens(&self) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        for text in self.paragraph_texts() {
            token::scan_into(&text, &mut found);
        }
        found
    }

    /// Rewrite paragraphs for which `edit` returns new text. Returns the count.
    pub fn edit_paragraphs<F>(&mut self, mut edit: F) -> usize
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut changed = 0;
        if let Some(body) = self.document.root.find_child_mut("body") {
            body.visit_mut("p", &mut |p: &mut Element| {
                let current = paragraph_text(p);
                if let Some(next) = edit(&current) {
                    if next != current {
                        set_paragraph_text(p, &next);
                        changed += 1;
                    }
                }
            });
        }
        changed
    }

    /// Replace a literal string everywhere. Returns paragraphs changed.
    pub fn replace_literal(&mut self, needle: &str, value: &str) -> usize {
        if needle.is_empty() {
            return 0;
        }
        self.edit_paragraphs(|text| {
            text.contains(needle)
                .then(|| text.replace(needle, value))
        })
    }

    /// Substitute every resolvable `{dotted.key}` token in the document
    pub fn substitute_tokens<F>(&mut self, mut resolve: F) -> Substitution
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut outcome = Substitution::default();
        self.edit_paragraphs(|text| {
            if !token::has_tokens(text) {
                return None;
            }
            let (next, partial) = token::substitute(text, &mut resolve);
            outcome.merge(partial);
            Some(next)
        });
        outcome
    }

    pub fn bookmark_names(&self) -> Vec<String> {
        let mut starts = Vec::new();
        self.body().collect("bookmarkStart", &mut starts);
        starts
            .into_iter()
            .filter_map(|b| b.attr("name").map(|n| n.to_string()))
            .collect()
    }

    pub fn has_bookmark(&self, name: &str) -> bool {
        self.bookmark_names().iter().any(|n| n == name)
    }

    /// Replace the content of a bookmark that starts inside a paragraph.
    ///
    /// The runs between the bookmark start and its end (or the end of the
    /// paragraph) are replaced by one run holding `value`. Returns false when
    /// no such bookmark exists.
    pub fn set_bookmark_text(&mut self, name: &str, value: &str) -> bool {
        let mut done = false;
        if let Some(body) = self.document.root.find_child_mut("body") {
            body.visit_mut("p", &mut |p: &mut Element| {
                if !done {
                    done = fill_bookmark(p, name, value);
                }
            });
        }
        done
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut package = self.package.clone();
        package.insert(DOCUMENT_PART, self.document.to_bytes()?);
        package.to_bytes()
    }

    /// Save as a new file; the source file is never touched
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut package = self.package.clone();
        package.insert(DOCUMENT_PART, self.document.to_bytes()?);
        package.save(path)
    }
}

fn prefix_of(element: &Element) -> &str {
    element
        .name
        .rsplit_once(':')
        .map(|(prefix, _)| prefix)
        .unwrap_or("")
}

fn qualified(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for child in element.child_elements() {
        if child.is("t") {
            out.push_str(&child.text());
        } else if !child.is("p") {
            collect_text(child, out);
        }
    }
}

fn paragraph_text(p: &Element) -> String {
    let mut out = String::new();
    collect_text(p, &mut out);
    out
}

fn cell_text(cell: &Element) -> String {
    let mut paragraphs = Vec::new();
    cell.collect("p", &mut paragraphs);
    paragraphs
        .into_iter()
        .map(paragraph_text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn text_nodes_mut<'a>(element: &'a mut Element, out: &mut Vec<&'a mut Element>) {
    for child in element.child_elements_mut() {
        if child.is("t") {
            out.push(child);
        } else if !child.is("p") {
            text_nodes_mut(child, out);
        }
    }
}

fn text_run(prefix: &str, properties: Option<Element>, value: &str) -> Element {
    let mut run = Element::new(qualified(prefix, "r"));
    if let Some(rpr) = properties {
        run.children.push(Node::Element(rpr));
    }
    run.with_child(
        Element::new(qualified(prefix, "t"))
            .with_attr("xml:space", "preserve")
            .with_text(value),
    )
}

fn set_paragraph_text(p: &mut Element, value: &str) {
    let written = {
        let mut texts = Vec::new();
        text_nodes_mut(p, &mut texts);
        match texts.split_first_mut() {
            Some((first, rest)) => {
                first.set_text(value);
                first.set_attr("xml:space", "preserve");
                for t in rest {
                    t.set_text("");
                }
                true
            }
            None => false,
        }
    };
    if !written {
        let prefix = prefix_of(p).to_string();
        p.children.push(Node::Element(text_run(&prefix, None, value)));
    }
}

fn fill_bookmark(p: &mut Element, name: &str, value: &str) -> bool {
    let start = p.children.iter().position(|n| {
        matches!(n, Node::Element(e) if e.is("bookmarkStart") && e.attr("name") == Some(name))
    });
    let Some(start) = start else {
        return false;
    };
    let id = match &p.children[start] {
        Node::Element(e) => e.attr("id").map(|s| s.to_string()),
        _ => None,
    };

    let mut runs = Vec::new();
    for (index, node) in p.children.iter().enumerate().skip(start + 1) {
        if let Node::Element(e) = node {
            if e.is("bookmarkEnd") && e.attr("id").map(|s| s.to_string()) == id {
                break;
            }
            if e.is("r") {
                runs.push(index);
            }
        }
    }

    let properties = runs.first().and_then(|&i| match &p.children[i] {
        Node::Element(run) => run.find_child("rPr").cloned(),
        _ => None,
    });
    let prefix = prefix_of(p).to_string();

    // Remove old runs back to front so indices stay valid.
    for &index in runs.iter().rev() {
        p.children.remove(index);
    }
    p.children
        .insert(start + 1, Node::Element(text_run(&prefix, properties, value)));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{docx_bytes, DocxSpec};

    fn open(spec: DocxSpec) -> DocxDocument {
        DocxDocument::from_bytes(&docx_bytes(&spec)).unwrap()
    }

    #[test]
    fn test_paragraphs_and_tables() {
        let doc = open(
            DocxSpec::new()
                .paragraph("Name: {product.name}, Ver: {product.version}")
                .table(vec![vec!["CPU", "{product.cpu.model}"]]),
        );
        assert_eq!(doc.body_paragraph_texts().len(), 1);
        assert_eq!(doc.paragraph_texts().len(), 3);
        assert_eq!(doc.tables()[0][0], vec!["CPU", "{product.cpu.model}"]);

        let tokens: Vec<_> = doc.scan_tokens().into_iter().collect();
        assert_eq!(tokens, vec!["product.cpu.model", "product.name", "product.version"]);
    }

    #[test]
    fn test_split_runs_are_matched_and_collapsed() {
        let mut doc = open(DocxSpec::new().runs(&["Ver: {product.", "version}", " end"]));
        assert!(doc.scan_tokens().contains("product.version"));

        let outcome = doc.substitute_tokens(|key| (key == "product.version").then(|| "2.1".into()));
        assert_eq!(outcome.replaced["product.version"], "2.1");
        assert_eq!(doc.paragraph_texts(), vec!["Ver: 2.1 end"]);

        let reopened = DocxDocument::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(reopened.full_text(), "Ver: 2.1 end");
    }

    #[test]
    fn test_replace_literal_counts_paragraphs() {
        let mut doc = open(DocxSpec::new().paragraph("{A} and {A}").paragraph("none").paragraph("{A}"));
        assert_eq!(doc.replace_literal("{A}", "x"), 2);
        assert_eq!(doc.paragraph_texts(), vec!["x and x", "none", "x"]);
        assert_eq!(doc.replace_literal("{A}", "x"), 0);
    }

    #[test]
    fn test_bookmark_fill() {
        let mut doc = open(DocxSpec::new().bookmark("Model: ", "ProductName", "______"));
        assert!(doc.has_bookmark("ProductName"));
        assert!(doc.set_bookmark_text("ProductName", "Widget"));
        assert_eq!(doc.full_text(), "Model: Widget");
        assert!(!doc.set_bookmark_text("Missing", "x"));
    }

    #[test]
    fn test_not_a_word_document() {
        let mut package = Package::new();
        package.insert("xl/workbook.xml", b"<workbook/>".to_vec());
        assert!(DocxDocument::from_package(package).is_err());
    }
}
