use lopdf::Document;

use crate::error::{DcsError, Result};

/// Split a PDF into one standalone document per page, in page order.
///
/// Each output keeps only the objects its page still references.
pub fn split_pages(pdf: &[u8]) -> Result<Vec<Vec<u8>>> {
    let source = Document::load_mem(pdf)?;
    let page_numbers: Vec<u32> = source.get_pages().keys().copied().collect();

    let mut pages = Vec::with_capacity(page_numbers.len());
    for &keep in &page_numbers {
        let mut single = source.clone();
        let drop: Vec<u32> = page_numbers.iter().copied().filter(|&n| n != keep).collect();
        single.delete_pages(&drop);
        single.prune_objects();

        let mut out = Vec::new();
        single
            .save_to(&mut out)
            .map_err(|e| DcsError::Pdf(format!("failed to write page {keep}: {e}")))?;
        pages.push(out);
    }
    Ok(pages)
}
