use super::{pdf::PdfBuilder, Rendered};
use crate::config::{Config, Overflow};
use crate::error::ConvertError;
use lopdf::{
    content::{Content, Operation},
    dictionary, Object,
};
use std::path::Path;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Courier advance width as a fraction of the font size.
const COURIER_ADVANCE: f32 = 0.6;

#[derive(Debug, Clone)]
pub struct TextLayout {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    pub font_size: f32,
    pub line_height: f32,
    pub tab_width: usize,
    pub overflow: Overflow,
}

impl TextLayout {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            page_width: cfg.page.width,
            page_height: cfg.page.height,
            margin: cfg.page.margin,
            font_size: cfg.text.font_size,
            line_height: cfg.text.line_height,
            tab_width: cfg.text.tab_width,
            overflow: cfg.text.overflow,
        }
    }

    pub fn columns(&self) -> usize {
        let usable = self.page_width - 2.0 * self.margin;
        let cols = (usable / (COURIER_ADVANCE * self.font_size)).floor();
        if cols.is_finite() && cols >= 1.0 {
            cols as usize
        } else {
            1
        }
    }

    pub fn rows_per_page(&self) -> usize {
        let usable = self.page_height - 2.0 * self.margin - self.font_size;
        let rows = (usable / self.line_height).floor() + 1.0;
        if rows.is_finite() && rows >= 1.0 {
            rows as usize
        } else {
            1
        }
    }

    fn first_baseline(&self) -> f32 {
        self.page_height - self.margin - self.font_size
    }
}

/// Splits text into pages of encoded rows. Always returns at least one page.
pub fn paginate(text: &str, layout: &TextLayout) -> Vec<Vec<Vec<u8>>> {
    let columns = layout.columns();
    let rows_per_page = layout.rows_per_page();

    let rows = text.lines().flat_map(|line| {
        let expanded = expand_tabs(line.trim_end(), layout.tab_width);
        fit_row(&encode_win_ansi(&expanded), columns, layout.overflow)
    });

    let mut pages: Vec<Vec<Vec<u8>>> = vec![Vec::new()];
    for row in rows {
        if pages.last().is_some_and(|p| p.len() >= rows_per_page) {
            pages.push(Vec::new());
        }
        if let Some(page) = pages.last_mut() {
            page.push(row);
        }
    }
    pages
}

pub fn render_text(path: &Path, cfg: &Config) -> Result<Rendered, ConvertError> {
    let raw = std::fs::read(path).map_err(|e| ConvertError::read(path, e))?;
    let text = String::from_utf8_lossy(&raw);
    let layout = TextLayout::from_config(cfg);
    let pages = paginate(&text, &layout);

    let mut pdf = PdfBuilder::new();
    let font_id = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });

    for rows in &pages {
        let resources = dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        };
        pdf.add_page(
            layout.page_width,
            layout.page_height,
            page_content(rows, &layout),
            resources,
        )?;
    }

    let pages = pdf.page_count();
    Ok(Rendered {
        bytes: pdf.finish()?,
        pages,
    })
}

fn page_content(rows: &[Vec<u8>], layout: &TextLayout) -> Content {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), layout.font_size.into()]),
        Operation::new("TL", vec![layout.line_height.into()]),
        Operation::new(
            "Td",
            vec![layout.margin.into(), layout.first_baseline().into()],
        ),
    ];
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            operations.push(Operation::new("T*", vec![]));
        }
        if !row.is_empty() {
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(row.clone())],
            ));
        }
    }
    operations.push(Operation::new("ET", vec![]));
    Content { operations }
}

fn fit_row(row: &[u8], columns: usize, overflow: Overflow) -> Vec<Vec<u8>> {
    if row.len() <= columns {
        return vec![row.to_vec()];
    }
    match overflow {
        Overflow::Clip => vec![row[..columns].to_vec()],
        Overflow::Wrap => {
            let mut out = Vec::new();
            let mut rest = row;
            while rest.len() > columns {
                // A space exactly at the limit still counts as a break point.
                let window = &rest[..=columns];
                match window.iter().rposition(|&b| b == b' ').filter(|&i| i > 0) {
                    Some(i) => {
                        // A run of spaces is one break; none of it carries over.
                        let head = trim_end_spaces(&rest[..i]);
                        if !head.is_empty() {
                            out.push(head.to_vec());
                        }
                        rest = trim_start_spaces(&rest[i + 1..]);
                    }
                    None => {
                        out.push(rest[..columns].to_vec());
                        rest = &rest[columns..];
                    }
                }
            }
            if !rest.is_empty() || out.is_empty() {
                out.push(rest.to_vec());
            }
            out
        }
    }
}

fn trim_end_spaces(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    &bytes[..end]
}

fn trim_start_spaces(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    &bytes[start..]
}

fn expand_tabs(line: &str, tab_width: usize) -> String {
    if !line.contains('\t') {
        return line.to_string();
    }
    if tab_width == 0 {
        return line.replace('\t', " ");
    }
    let mut out = String::with_capacity(line.len() + tab_width);
    let mut col = 0;
    for ch in line.chars() {
        if ch == '\t' {
            let pad = tab_width - col % tab_width;
            out.extend(std::iter::repeat_n(' ', pad));
            col += pad;
        } else {
            out.push(ch);
            col += 1;
        }
    }
    out
}

/// WinAnsi code points 0x80..=0x9F that differ from Latin-1.
const WIN_ANSI_HIGH: &[(char, u8)] = &[
    ('€', 0x80),
    ('‚', 0x82),
    ('ƒ', 0x83),
    ('„', 0x84),
    ('…', 0x85),
    ('†', 0x86),
    ('‡', 0x87),
    ('ˆ', 0x88),
    ('‰', 0x89),
    ('Š', 0x8A),
    ('‹', 0x8B),
    ('Œ', 0x8C),
    ('Ž', 0x8E),
    ('‘', 0x91),
    ('’', 0x92),
    ('“', 0x93),
    ('”', 0x94),
    ('•', 0x95),
    ('–', 0x96),
    ('—', 0x97),
    ('˜', 0x98),
    ('™', 0x99),
    ('š', 0x9A),
    ('›', 0x9B),
    ('œ', 0x9C),
    ('ž', 0x9E),
    ('Ÿ', 0x9F),
];

fn win_ansi_byte(c: char) -> Option<u8> {
    let cp = c as u32;
    match cp {
        0x20..=0x7E | 0xA0..=0xFF => Some(cp as u8),
        _ => WIN_ANSI_HIGH
            .iter()
            .find(|(ch, _)| *ch == c)
            .map(|(_, b)| *b),
    }
}

/// Encodes for a WinAnsi standard font. Characters outside the encoding fall back to
/// their compatibility decomposition without combining marks, then to `?`.
pub fn encode_win_ansi(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for c in s.chars() {
        if let Some(b) = win_ansi_byte(c) {
            out.push(b);
            continue;
        }
        let decomposed: Option<Vec<u8>> = std::iter::once(c)
            .nfkd()
            .filter(|d| !is_combining_mark(*d))
            .map(win_ansi_byte)
            .collect();
        match decomposed {
            Some(bytes) if !bytes.is_empty() => out.extend(bytes),
            _ => out.push(b'?'),
        }
    }
    out
}
