//! Zip package holding the parts of a .docx / .xlsx file

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{FileKind, Result, SpecSyncError};

/// All parts of a package, in their original order
#[derive(Debug, Clone, Default)]
pub struct Package {
    order: Vec<String>,
    parts: BTreeMap<String, Vec<u8>>,
}

impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SpecSyncError::NotFound {
                kind: FileKind::Template,
                path: path.to_path_buf(),
            });
        }
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut package = Package::new();
        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            package.insert(file.name().to_string(), data);
        }
        Ok(package)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(|p| p.as_slice())
    }

    pub fn require(&self, name: &str) -> Result<&[u8]> {
        self.get(name)
            .ok_or_else(|| SpecSyncError::InvalidDocument(format!("missing part {}", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    /// Insert or replace a part; new parts go to the end
    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) {
        let name = name.into();
        if !self.parts.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.parts.insert(name, data);
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for name in &self.order {
            writer.start_file(name.as_str(), options)?;
            writer.write_all(&self.parts[name])?;
        }
        Ok(writer.finish()?.into_inner())
    }

    /// Write the package to a new file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_keeps_order_and_content() {
        let mut package = Package::new();
        package.insert("[Content_Types].xml", b"<Types/>".to_vec());
        package.insert("word/document.xml", b"<doc/>".to_vec());
        package.insert("[Content_Types].xml", b"<Types2/>".to_vec());

        let bytes = package.to_bytes().unwrap();
        let reopened = Package::from_bytes(&bytes).unwrap();
        let names: Vec<_> = reopened.part_names().collect();
        assert_eq!(names, vec!["[Content_Types].xml", "word/document.xml"]);
        assert_eq!(reopened.get("[Content_Types].xml"), Some(&b"<Types2/>"[..]));
        assert!(reopened.require("missing.xml").is_err());
    }

    #[test]
    fn test_garbage_is_not_a_package() {
        let err = Package::from_bytes(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, SpecSyncError::Package(_)));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Package::open(&dir.path().join("x.docx")).unwrap_err();
        assert!(err.is_not_found());
    }
}
