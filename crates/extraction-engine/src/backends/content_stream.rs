//! Last-resort extraction that walks page content streams directly.
//!
//! No font decoding happens here: string operands are read as UTF-16BE when
//! they carry a byte-order mark and as Latin-1 otherwise. That is enough for
//! the plain Type1 fonts most report generators embed.

use lopdf::content::{Content, Operation};
use lopdf::Object;
use shared_types::BackendKind;

use super::{load_document, BackendError, BackendOutput, TextBackend};

/// `TJ` kerning offsets below this (in thousandths of an em) read as a word gap
const TJ_SPACE_THRESHOLD: f32 = -200.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct ContentStreamBackend;

impl TextBackend for ContentStreamBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ContentStream
    }

    fn extract(&self, bytes: &[u8]) -> Result<BackendOutput, BackendError> {
        let doc = load_document(bytes)?;
        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(BackendError::NoPages);
        }

        let mut texts = Vec::with_capacity(pages.len());
        let mut notes = Vec::new();

        for (page_number, page_id) in &pages {
            let content = doc
                .get_page_content(*page_id)
                .map_err(|e| e.to_string())
                .and_then(|raw| Content::decode(&raw).map_err(|e| e.to_string()));

            match content {
                Ok(content) => texts.push(render_operations(&content.operations)),
                Err(e) => notes.push(format!("page {}: {}", page_number, e)),
            }
        }

        if texts.is_empty() {
            return Err(BackendError::Failed(format!(
                "no decodable content streams ({})",
                notes.join("; ")
            )));
        }

        Ok(BackendOutput {
            text: texts.join("\n"),
            page_count: pages.len(),
            notes,
        })
    }
}

fn render_operations(operations: &[Operation]) -> String {
    let mut out = String::new();

    for op in operations {
        match op.operator.as_str() {
            "Tj" => push_strings(&mut out, &op.operands),
            "'" | "\"" => {
                newline(&mut out);
                push_strings(&mut out, &op.operands);
            }
            "TJ" => {
                for operand in &op.operands {
                    let Object::Array(parts) = operand else {
                        continue;
                    };
                    for part in parts {
                        match part {
                            Object::String(raw, _) => out.push_str(&decode_pdf_string(raw)),
                            other => {
                                if let Ok(offset) = other.as_float() {
                                    if offset < TJ_SPACE_THRESHOLD && !out.ends_with(' ') {
                                        out.push(' ');
                                    }
                                }
                            }
                        }
                    }
                }
            }
            "Td" | "TD" => {
                let moves_down = op
                    .operands
                    .get(1)
                    .and_then(|ty| ty.as_float().ok())
                    .map(|ty| ty != 0.0)
                    .unwrap_or(false);
                if moves_down {
                    newline(&mut out);
                }
            }
            "T*" | "Tm" | "ET" => newline(&mut out),
            _ => {}
        }
    }

    out
}

fn push_strings(out: &mut String, operands: &[Object]) {
    for operand in operands {
        if let Object::String(raw, _) = operand {
            out.push_str(&decode_pdf_string(raw));
        }
    }
}

fn newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn decode_pdf_string(raw: &[u8]) -> String {
    if raw.len() >= 2 && raw[0] == 0xFE && raw[1] == 0xFF {
        let units: Vec<u16> = raw[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    raw.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::fixtures::pdf_with_lines;
    use lopdf::StringFormat;
    use pretty_assertions::assert_eq;

    fn literal(s: &str) -> Object {
        Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
    }

    #[test]
    fn test_lines_follow_text_positioning() {
        let pdf = pdf_with_lines(&[&["REGION 01", "AGENCY 123"]]);
        let output = ContentStreamBackend.extract(&pdf).unwrap();

        let lines: Vec<&str> = output.text.lines().collect();
        assert_eq!(lines, vec!["REGION 01", "AGENCY 123"]);
        assert_eq!(output.page_count, 1);
    }

    #[test]
    fn test_tj_arrays_insert_word_gaps() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    literal("NSF"),
                    Object::Integer(-50),
                    literal("X"),
                    Object::Real(-450.0),
                    literal("RETURN"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ];
        assert_eq!(render_operations(&ops), "NSFX RETURN\n");
    }

    #[test]
    fn test_utf16_strings_are_decoded() {
        let raw = [0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE9];
        assert_eq!(decode_pdf_string(&raw), "Aé");
        assert_eq!(decode_pdf_string(b"plain"), "plain");
    }

    #[test]
    fn test_horizontal_moves_stay_on_line() {
        let ops = vec![
            Operation::new("Tj", vec![literal("A")]),
            Operation::new("Td", vec![Object::Integer(30), Object::Integer(0)]),
            Operation::new("Tj", vec![literal("B")]),
            Operation::new("T*", vec![]),
            Operation::new("Tj", vec![literal("C")]),
        ];
        assert_eq!(render_operations(&ops), "AB\nC");
    }
}
