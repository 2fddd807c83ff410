//! Office Open XML packages: just enough of .docx and .xlsx to fill and read
//! them without an office suite.

pub mod docx;
pub mod package;
pub mod xlsx;
pub mod xml;

pub use docx::DocxDocument;
pub use package::Package;
pub use xlsx::{CellRef, CellValue, XlsxWorkbook};
