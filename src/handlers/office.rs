// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Zip-based office documents (OOXML and OpenDocument)

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read;
use std::path::Path;

use crate::task::extension_of;
use crate::{Result, SmartParseError};

const MAX_SHEET_ROWS: usize = 20;

/// Extract readable text from an office document
pub fn extract(path: &Path) -> Result<String> {
    match extension_of(path).as_str() {
        "docx" => xml_parts(path, |name| name == "word/document.xml"),
        "pptx" => xml_parts(path, |name| {
            name.starts_with("ppt/slides/slide") && name.ends_with(".xml")
        }),
        "odt" | "odp" => xml_parts(path, |name| name == "content.xml"),
        "xlsx" | "ods" => spreadsheet(path),
        other => Err(SmartParseError::UnsupportedType(other.to_string())),
    }
}

/// Concatenate the text of every archive member selected by `wanted`
fn xml_parts(path: &Path, wanted: impl Fn(&str) -> bool) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| SmartParseError::Office(format!("Failed to open archive: {}", e)))?;

    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| wanted(name))
        .map(String::from)
        .collect();
    // slide10 sorts after slide9
    names.sort_by_key(|name| (name.len(), name.clone()));

    if names.is_empty() {
        return Err(SmartParseError::Office("No document content found".to_string()));
    }

    let mut text = String::new();
    for name in names {
        let mut member = archive
            .by_name(&name)
            .map_err(|e| SmartParseError::Office(format!("Failed to read {}: {}", name, e)))?;
        let mut xml = String::new();
        member.read_to_string(&mut xml)?;
        text.push_str(&xml_text(&xml)?);
        text.push('\n');
    }

    Ok(text)
}

/// Collect the character data of an XML document
fn xml_text(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut text = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Text(e)) => {
                let chunk = e
                    .unescape()
                    .map_err(|e| SmartParseError::Office(format!("Bad XML text: {}", e)))?;
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&chunk);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SmartParseError::Office(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(text)
}

/// First rows of the first sheet, tab separated
fn spreadsheet(path: &Path) -> Result<String> {
    use calamine::{open_workbook_auto, Reader as _};

    let mut workbook = open_workbook_auto(path)
        .map_err(|e| SmartParseError::Office(format!("Failed to open spreadsheet: {}", e)))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let mut text = format!("Sheets: {}\n", sheet_names.join(", "));

    if let Some(sheet_name) = sheet_names.first() {
        if let Ok(range) = workbook.worksheet_range(sheet_name) {
            for row in range.rows().take(MAX_SHEET_ROWS) {
                let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
                text.push_str(&cells.join("\t"));
                text.push('\n');
            }
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, members: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_docx_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("letter.docx");
        write_zip(
            &path,
            &[(
                "word/document.xml",
                r#"<w:document><w:body><w:p><w:r><w:t>Dear Landlord</w:t></w:r></w:p><w:p><w:r><w:t>Rent &amp; deposit</w:t></w:r></w:p></w:body></w:document>"#,
            )],
        );

        assert_eq!(extract(&path).unwrap().trim(), "Dear Landlord Rent & deposit");
    }

    #[test]
    fn test_pptx_slides_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        write_zip(
            &path,
            &[
                ("ppt/slides/slide10.xml", "<p:sld><a:t>ten</a:t></p:sld>"),
                ("ppt/slides/slide2.xml", "<p:sld><a:t>two</a:t></p:sld>"),
                ("ppt/presentation.xml", "<p:presentation/>"),
            ],
        );

        let text = extract(&path).unwrap();
        assert_eq!(text.split_whitespace().collect::<Vec<_>>(), vec!["two", "ten"]);
    }

    #[test]
    fn test_archive_without_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.docx");
        write_zip(&path, &[("other.xml", "<x/>")]);

        assert!(matches!(extract(&path), Err(SmartParseError::Office(_))));
    }
}
