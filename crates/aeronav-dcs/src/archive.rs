use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::ZipWriter;

use crate::error::Result;

pub const ARCHIVE_MEDIA_TYPE: &str = "application/zip";

/// Entry name for the 1-based `index`th page.
pub fn entry_name(index: usize) -> String {
    format!("file_{index}.pdf")
}

/// Bundle page extracts into one zip, named `file_1.pdf`, `file_2.pdf`, ...
pub fn build_zip(pages: &[Vec<u8>]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (i, page) in pages.iter().enumerate() {
        writer.start_file(entry_name(i + 1), FileOptions::default())?;
        writer.write_all(page)?;
    }
    Ok(writer.finish()?.into_inner())
}
