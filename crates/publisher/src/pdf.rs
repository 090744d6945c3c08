//! Article PDF rendering
//!
//! Renders an article (masthead, title block, abstract, HTML body, per-page
//! footer) into A4 pages using the standard Type1 Times family, so the text
//! stays selectable. The output carries no timestamps or random ids: the
//! same input always produces the same bytes.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, StringFormat};
use scholarmint_common::errors::{AppError, Result};
use tracing::{debug, warn};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN_X: f32 = 56.0;
const MARGIN_TOP: f32 = 64.0;
const MARGIN_BOTTOM: f32 = 72.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN_X;

const BODY_SIZE: f32 = 11.0;
const LIST_INDENT: f32 = 16.0;
const ABSTRACT_INDENT: f32 = 14.0;

/// Rendered in place of an empty body
pub const EMPTY_BODY: &str = "No content provided.";

/// Everything printed on the article
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfDocumentInput {
    pub title: String,
    pub author_name: String,
    pub orcid_id: Option<String>,
    pub keywords: Vec<String>,
    pub abstract_text: String,
    pub content_html: String,
    pub license: String,
    pub journal_name: String,
    pub year: i32,
}

#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// Render the article to PDF bytes
pub fn render_article(input: &PdfDocumentInput) -> Result<RenderedPdf> {
    let mut writer = PageWriter::new(
        format!("\u{a9} {} {}. All rights reserved.", input.year, input.journal_name),
        format!("Licensed under {}", input.license),
    );

    write_front_matter(&mut writer, input);

    let mut blocks = parse_blocks(&input.content_html);
    if blocks.is_empty() {
        blocks.push(Block::Paragraph {
            runs: vec![Run::plain(EMPTY_BODY)],
        });
    }
    for block in &blocks {
        write_block(&mut writer, block);
    }

    let pages = writer.finish();
    let page_count = pages.len();
    let bytes = assemble(pages)?;

    debug!(
        blocks = blocks.len(),
        pages = page_count,
        size = bytes.len(),
        "Rendered article PDF"
    );

    Ok(RenderedPdf { bytes, page_count })
}

fn render_err(e: impl std::fmt::Display) -> AppError {
    AppError::Render {
        message: format!("PDF assembly failed: {}", e),
    }
}

// ============================================================================
// HTML subset
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Style {
    bold: bool,
    italic: bool,
    underline: bool,
}

/// Styled text; `"\n"` is a forced line break
#[derive(Debug, Clone, PartialEq, Eq)]
struct Run {
    text: String,
    style: Style,
}

impl Run {
    fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            style: Style::default(),
        }
    }

    fn is_break(&self) -> bool {
        self.text == "\n"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Heading { level: u8, runs: Vec<Run> },
    Paragraph { runs: Vec<Run> },
    ListItem { marker: String, depth: usize, runs: Vec<Run> },
    TableRow { cells: Vec<Vec<Run>>, header: bool },
    Image { caption: String },
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Open { name: String, attrs: Vec<(String, String)> },
    Close(String),
    Text(String),
}

fn tokenize(html: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = html;

    while !rest.is_empty() {
        if let Some(comment) = rest.strip_prefix("<!--") {
            rest = match comment.find("-->") {
                Some(end) => &comment[end + 3..],
                None => "",
            };
            continue;
        }

        if let Some(after) = rest.strip_prefix('<') {
            let starts_tag = after
                .chars()
                .next()
                .map_or(false, |c| c.is_ascii_alphabetic() || c == '/' || c == '!');
            match after.find('>') {
                Some(end) if starts_tag => {
                    if let Some(token) = parse_tag(&after[..end]) {
                        tokens.push(token);
                    }
                    rest = &after[end + 1..];
                }
                _ => {
                    tokens.push(Token::Text("<".to_string()));
                    rest = after;
                }
            }
            continue;
        }

        let end = rest.find('<').unwrap_or(rest.len());
        tokens.push(Token::Text(decode_entities(&rest[..end])));
        rest = &rest[end..];
    }

    tokens
}

fn parse_tag(inner: &str) -> Option<Token> {
    let inner = inner.trim();
    if inner.starts_with('!') || inner.starts_with('?') {
        return None;
    }

    if let Some(name) = inner.strip_prefix('/') {
        return Some(Token::Close(name.trim().to_ascii_lowercase()));
    }

    let inner = inner.trim_end_matches('/');
    let name_end = inner
        .find(|c: char| c.is_whitespace())
        .unwrap_or(inner.len());
    let name = inner[..name_end].to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }

    Some(Token::Open {
        name,
        attrs: parse_attrs(&inner[name_end..]),
    })
}

fn parse_attrs(s: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = s.trim_start();

    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let key = rest[..key_end].to_ascii_lowercase();
        rest = rest[key_end..].trim_start();

        let mut value = String::new();
        if let Some(after) = rest.strip_prefix('=') {
            let after = after.trim_start();
            match after.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after[1..];
                    let close = body.find(quote).unwrap_or(body.len());
                    value = decode_entities(&body[..close]);
                    rest = body.get(close + 1..).unwrap_or("");
                }
                _ => {
                    let end = after.find(char::is_whitespace).unwrap_or(after.len());
                    value = decode_entities(&after[..end]);
                    rest = &after[end..];
                }
            }
        }

        if !key.is_empty() {
            attrs.push((key, value));
        }
        rest = rest.trim_start();
    }

    attrs
}

fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let decoded = tail
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let numeric = entity.strip_prefix('#')?;
            let hex = numeric
                .strip_prefix('x')
                .or_else(|| numeric.strip_prefix('X'));
            let code = match hex {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    Paragraph,
    Heading(u8),
    ListItem { marker: String, depth: usize },
}

struct ListFrame {
    ordered: bool,
    next: u32,
}

/// Turns the token stream into layout blocks
struct BlockBuilder {
    blocks: Vec<Block>,
    runs: Vec<Run>,
    pending: Pending,
    bold: u32,
    italic: u32,
    underline: u32,
    lists: Vec<ListFrame>,
    row: Option<Vec<Vec<Run>>>,
    cell: Option<Vec<Run>>,
    header_row: bool,
    in_thead: bool,
}

impl BlockBuilder {
    fn new() -> Self {
        Self {
            blocks: Vec::new(),
            runs: Vec::new(),
            pending: Pending::Paragraph,
            bold: 0,
            italic: 0,
            underline: 0,
            lists: Vec::new(),
            row: None,
            cell: None,
            header_row: false,
            in_thead: false,
        }
    }

    fn style(&self) -> Style {
        Style {
            bold: self.bold > 0,
            italic: self.italic > 0,
            underline: self.underline > 0,
        }
    }

    fn target(&mut self) -> &mut Vec<Run> {
        match self.cell.as_mut() {
            Some(cell) => cell,
            None => &mut self.runs,
        }
    }

    fn push_text(&mut self, text: &str) {
        let mut collapsed = String::with_capacity(text.len());
        let mut last_space = false;
        for c in text.chars() {
            if c.is_ascii_whitespace() {
                if !last_space {
                    collapsed.push(' ');
                }
                last_space = true;
            } else {
                collapsed.push(c);
                last_space = false;
            }
        }
        if collapsed.is_empty() {
            return;
        }

        let style = self.style();
        let target = self.target();
        match target.last_mut() {
            Some(last) if last.style == style && !last.is_break() => last.text.push_str(&collapsed),
            _ => target.push(Run {
                text: collapsed,
                style,
            }),
        }
    }

    fn push_break(&mut self) {
        let style = self.style();
        self.target().push(Run {
            text: "\n".to_string(),
            style,
        });
    }

    fn flush(&mut self) {
        let runs = trim_runs(std::mem::take(&mut self.runs));
        let pending = std::mem::replace(&mut self.pending, Pending::Paragraph);
        if runs.is_empty() {
            return;
        }

        self.blocks.push(match pending {
            Pending::Paragraph => Block::Paragraph { runs },
            Pending::Heading(level) => Block::Heading { level, runs },
            Pending::ListItem { marker, depth } => Block::ListItem {
                marker,
                depth,
                runs,
            },
        });
    }

    fn close_cell(&mut self) {
        if let Some(cell) = self.cell.take() {
            self.row.get_or_insert_with(Vec::new).push(trim_runs(cell));
        }
    }

    fn close_row(&mut self) {
        self.close_cell();
        if let Some(cells) = self.row.take() {
            if !cells.is_empty() {
                self.blocks.push(Block::TableRow {
                    cells,
                    header: self.header_row,
                });
            }
        }
        self.header_row = false;
    }

    fn open(&mut self, name: &str, attrs: &[(String, String)]) {
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                let level = name[1..].parse::<u8>().unwrap_or(3).min(3);
                self.pending = Pending::Heading(level);
            }
            "p" => {
                self.flush();
            }
            "strong" | "b" => self.bold += 1,
            "em" | "i" => self.italic += 1,
            "u" => self.underline += 1,
            "ul" | "ol" => {
                self.flush();
                self.lists.push(ListFrame {
                    ordered: name == "ol",
                    next: 1,
                });
            }
            "li" => {
                self.flush();
                let depth = self.lists.len().max(1);
                let marker = match self.lists.last_mut() {
                    Some(frame) if frame.ordered => {
                        let marker = format!("{}.", frame.next);
                        frame.next += 1;
                        marker
                    }
                    _ => "\u{2022}".to_string(),
                };
                self.pending = Pending::ListItem { marker, depth };
            }
            "br" => self.push_break(),
            "img" => {
                let attr = |key: &str| {
                    attrs
                        .iter()
                        .find(|(k, v)| k == key && !v.trim().is_empty())
                        .map(|(_, v)| v.trim().to_string())
                };
                let label = attr("alt")
                    .or_else(|| attr("src"))
                    .unwrap_or_else(|| "image".to_string());
                let caption = format!("[Image: {}]", label);

                if self.cell.is_some() {
                    self.push_text(&caption);
                } else {
                    self.flush();
                    self.blocks.push(Block::Image { caption });
                }
            }
            "table" => {
                self.flush();
                self.row = None;
            }
            "thead" => self.in_thead = true,
            "tr" => {
                self.flush();
                self.close_row();
                self.row = Some(Vec::new());
                self.header_row = self.in_thead;
            }
            "th" | "td" => {
                self.close_cell();
                if name == "th" {
                    self.header_row = true;
                }
                self.cell = Some(Vec::new());
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &str) {
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "p" | "li" => self.flush(),
            "strong" | "b" => self.bold = self.bold.saturating_sub(1),
            "em" | "i" => self.italic = self.italic.saturating_sub(1),
            "u" => self.underline = self.underline.saturating_sub(1),
            "ul" | "ol" => {
                self.flush();
                self.lists.pop();
            }
            "th" | "td" => self.close_cell(),
            "tr" => self.close_row(),
            "thead" => self.in_thead = false,
            "table" => self.close_row(),
            _ => {}
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.close_row();
        self.flush();
        self.blocks
    }
}

/// Drop leading/trailing whitespace and breaks; empty if nothing visible
fn trim_runs(mut runs: Vec<Run>) -> Vec<Run> {
    while runs.first().map_or(false, Run::is_break) {
        runs.remove(0);
    }
    while runs.last().map_or(false, Run::is_break) {
        runs.pop();
    }
    if let Some(first) = runs.first_mut() {
        first.text = first.text.trim_start_matches(' ').to_string();
    }
    if let Some(last) = runs.last_mut() {
        last.text = last.text.trim_end_matches(' ').to_string();
    }
    runs.retain(|r| !r.text.is_empty());

    let visible = runs
        .iter()
        .any(|r| !r.is_break() && !r.text.trim().is_empty());
    if visible {
        runs
    } else {
        Vec::new()
    }
}

fn parse_blocks(html: &str) -> Vec<Block> {
    let mut builder = BlockBuilder::new();
    for token in tokenize(html) {
        match token {
            Token::Open { name, attrs } => builder.open(&name, &attrs),
            Token::Close(name) => builder.close(&name),
            Token::Text(text) => builder.push_text(&text),
        }
    }
    builder.finish()
}

// ============================================================================
// Fonts and text measurement
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl Font {
    const ALL: [Font; 4] = [Font::Regular, Font::Bold, Font::Italic, Font::BoldItalic];

    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Italic => "F3",
            Font::BoldItalic => "F4",
        }
    }

    fn base_name(self) -> &'static str {
        match self {
            Font::Regular => "Times-Roman",
            Font::Bold => "Times-Bold",
            Font::Italic => "Times-Italic",
            Font::BoldItalic => "Times-BoldItalic",
        }
    }

    fn from_style(style: Style) -> Self {
        match (style.bold, style.italic) {
            (true, true) => Font::BoldItalic,
            (true, false) => Font::Bold,
            (false, true) => Font::Italic,
            (false, false) => Font::Regular,
        }
    }

    fn is_bold(self) -> bool {
        matches!(self, Font::Bold | Font::BoldItalic)
    }
}

/// Approximate advance width in em units
fn char_width(c: char) -> f32 {
    match c {
        ' ' | '\u{a0}' => 0.25,
        'i' | 'j' | 'l' | '.' | ',' | ';' | ':' | '\'' | '!' | '|' | 'I' => 0.28,
        'f' | 'r' | 't' | '(' | ')' | '[' | ']' | '-' => 0.33,
        'm' | 'w' | 'M' | 'W' => 0.78,
        'A'..='Z' => 0.67,
        '0'..='9' => 0.5,
        _ => 0.47,
    }
}

fn text_width(text: &str, font: Font, size: f32) -> f32 {
    let ems: f32 = text.chars().map(char_width).sum();
    let factor = if font.is_bold() { 1.05 } else { 1.0 };
    ems * size * factor
}

/// Map to WinAnsiEncoding for the standard Type 1 fonts
///
/// Lossy: characters outside WinAnsi (CJK, Cyrillic, Greek, most symbols)
/// and C1 control characters become `?` in the rendered and selectable
/// text. The pinned article JSON keeps the exact UTF-8 text.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20ac}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            c if matches!(c as u32, 0x20..=0x7e | 0xa0..=0xff) => c as u8,
            _ => b'?',
        })
        .collect()
}

// ============================================================================
// Line wrapping
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Span {
    text: String,
    font: Font,
    underline: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Line {
    spans: Vec<Span>,
    width: f32,
}

impl Line {
    fn is_empty(&self) -> bool {
        self.spans.iter().all(|s| s.text.trim().is_empty())
    }

    fn push(&mut self, text: &str, font: Font, underline: bool, size: f32) {
        if text.is_empty() {
            return;
        }
        self.width += text_width(text, font, size);
        match self.spans.last_mut() {
            Some(last) if last.font == font && last.underline == underline => {
                last.text.push_str(text)
            }
            _ => self.spans.push(Span {
                text: text.to_string(),
                font,
                underline,
            }),
        }
    }

    fn trim_end(&mut self, size: f32) {
        if let Some(last) = self.spans.last_mut() {
            let trimmed = last.text.trim_end_matches(' ').len();
            let removed = &last.text[trimmed..];
            self.width -= text_width(removed, last.font, size);
            last.text.truncate(trimmed);
        }
        self.spans.retain(|s| !s.text.is_empty());
    }
}

/// Greedy word wrap; `force_bold` renders every run bold
fn wrap(runs: &[Run], size: f32, max_width: f32, force_bold: bool) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut line = Line::default();

    for run in runs {
        if run.is_break() {
            line.trim_end(size);
            lines.push(std::mem::take(&mut line));
            continue;
        }

        let style = Style {
            bold: run.style.bold || force_bold,
            ..run.style
        };
        let font = Font::from_style(style);

        for piece in run.text.split_inclusive(' ') {
            let word = piece.trim_end_matches(' ');
            let word_width = text_width(word, font, size);

            if line.width + word_width > max_width && !line.is_empty() {
                line.trim_end(size);
                lines.push(std::mem::take(&mut line));
            }

            let piece = if line.is_empty() {
                piece.trim_start_matches(' ')
            } else {
                piece
            };

            if word_width > max_width {
                // Hard-split words wider than the column
                let mut chunk = String::new();
                for c in piece.chars() {
                    if !chunk.is_empty()
                        && line.width + text_width(&chunk, font, size) + text_width(&c.to_string(), font, size)
                            > max_width
                    {
                        line.push(&chunk, font, style.underline, size);
                        lines.push(std::mem::take(&mut line));
                        chunk.clear();
                    }
                    chunk.push(c);
                }
                line.push(&chunk, font, style.underline, size);
            } else {
                line.push(piece, font, style.underline, size);
            }
        }
    }

    line.trim_end(size);
    if !line.is_empty() {
        lines.push(line);
    }
    lines.retain(|l| !l.spans.is_empty());
    lines
}

fn text_lines(text: &str, font: Font, size: f32, max_width: f32) -> Vec<Line> {
    let style = Style {
        bold: font.is_bold(),
        italic: matches!(font, Font::Italic | Font::BoldItalic),
        underline: false,
    };
    wrap(
        &[Run {
            text: text.to_string(),
            style,
        }],
        size,
        max_width,
        false,
    )
}

// ============================================================================
// Page layout
// ============================================================================

fn num(value: f32) -> Object {
    Object::Real(value.into())
}

struct PageWriter {
    pages: Vec<Vec<Operation>>,
    ops: Vec<Operation>,
    y: f32,
    copyright: String,
    license: String,
}

impl PageWriter {
    fn new(copyright: String, license: String) -> Self {
        Self {
            pages: Vec::new(),
            ops: Vec::new(),
            y: PAGE_HEIGHT - MARGIN_TOP,
            copyright,
            license,
        }
    }

    /// Start a new page unless `height` still fits
    fn ensure(&mut self, height: f32) {
        if self.y - height < MARGIN_BOTTOM {
            self.break_page();
        }
    }

    fn break_page(&mut self) {
        self.write_footer();
        self.pages.push(std::mem::take(&mut self.ops));
        self.y = PAGE_HEIGHT - MARGIN_TOP;
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn write_footer(&mut self) {
        for (text, y) in [(self.copyright.clone(), 40.0), (self.license.clone(), 28.0)] {
            for line in text_lines(&text, Font::Regular, 8.0, CONTENT_WIDTH) {
                let x = (PAGE_WIDTH - line.width) / 2.0;
                self.show(&line, x, y, 8.0);
            }
        }
    }

    fn show(&mut self, line: &Line, x: f32, y: f32, size: f32) {
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(Operation::new("Td", vec![num(x), num(y)]));
        for span in &line.spans {
            self.ops.push(Operation::new(
                "Tf",
                vec![Object::Name(span.font.resource().as_bytes().to_vec()), num(size)],
            ));
            self.ops.push(Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(&span.text), StringFormat::Literal)],
            ));
        }
        self.ops.push(Operation::new("ET", vec![]));

        let mut offset = x;
        for span in &line.spans {
            let width = text_width(&span.text, span.font, size);
            if span.underline {
                self.rule(offset, y - 1.5, offset + width, y - 1.5, 0.5);
            }
            offset += width;
        }
    }

    fn rule(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, width: f32) {
        self.ops.push(Operation::new("w", vec![num(width)]));
        self.ops.push(Operation::new("m", vec![num(x1), num(y1)]));
        self.ops.push(Operation::new("l", vec![num(x2), num(y2)]));
        self.ops.push(Operation::new("S", vec![]));
    }

    /// Write wrapped lines at `x`, paginating as needed
    fn lines(&mut self, lines: &[Line], x: f32, size: f32, leading: f32) {
        for line in lines {
            self.ensure(leading);
            self.y -= leading;
            self.show(line, x, self.y, size);
        }
    }

    fn centered(&mut self, lines: &[Line], size: f32, leading: f32) {
        for line in lines {
            self.ensure(leading);
            self.y -= leading;
            let x = MARGIN_X + (CONTENT_WIDTH - line.width).max(0.0) / 2.0;
            self.show(line, x, self.y, size);
        }
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.break_page();
        }
        self.pages
    }
}

fn write_front_matter(writer: &mut PageWriter, input: &PdfDocumentInput) {
    let masthead = text_lines(
        &input.journal_name.to_uppercase(),
        Font::Bold,
        10.0,
        CONTENT_WIDTH,
    );
    writer.centered(&masthead, 10.0, 12.0);
    writer.gap(6.0);
    let y = writer.y;
    writer.rule(MARGIN_X, y, PAGE_WIDTH - MARGIN_X, y, 0.75);
    writer.gap(18.0);

    let title = text_lines(&input.title, Font::Bold, 20.0, CONTENT_WIDTH);
    writer.centered(&title, 20.0, 24.0);
    writer.gap(6.0);

    let author = match &input.orcid_id {
        Some(orcid) => format!("{} (ORCID: {})", input.author_name, orcid),
        None => input.author_name.clone(),
    };
    writer.centered(&text_lines(&author, Font::Regular, 11.0, CONTENT_WIDTH), 11.0, 15.0);

    if !input.keywords.is_empty() {
        let keywords = format!("Keywords: {}", input.keywords.join(", "));
        writer.centered(&text_lines(&keywords, Font::Italic, 9.0, CONTENT_WIDTH), 9.0, 13.0);
    }
    writer.gap(14.0);

    writer.lines(
        &text_lines("Abstract", Font::Bold, 11.0, CONTENT_WIDTH),
        MARGIN_X,
        11.0,
        15.0,
    );
    writer.gap(2.0);

    let abstract_lines = text_lines(
        input.abstract_text.trim(),
        Font::Italic,
        10.0,
        CONTENT_WIDTH - ABSTRACT_INDENT,
    );
    let leading = 13.0;
    for line in &abstract_lines {
        writer.ensure(leading);
        let top = writer.y;
        writer.y -= leading;
        let y = writer.y;
        writer.rule(MARGIN_X + 4.0, top, MARGIN_X + 4.0, y - 3.0, 1.0);
        writer.show(line, MARGIN_X + ABSTRACT_INDENT, y, 10.0);
    }
    writer.gap(20.0);
}

fn write_block(writer: &mut PageWriter, block: &Block) {
    match block {
        Block::Heading { level, runs } => {
            let size = match level {
                1 => 16.0,
                2 => 14.0,
                _ => 12.0,
            };
            writer.gap(8.0);
            let lines = wrap(runs, size, CONTENT_WIDTH, true);
            writer.lines(&lines, MARGIN_X, size, size * 1.3);
            writer.gap(4.0);
        }
        Block::Paragraph { runs } => {
            let lines = wrap(runs, BODY_SIZE, CONTENT_WIDTH, false);
            writer.lines(&lines, MARGIN_X, BODY_SIZE, 14.5);
            writer.gap(8.0);
        }
        Block::ListItem {
            marker,
            depth,
            runs,
        } => {
            let indent = LIST_INDENT * *depth as f32;
            let text_x = MARGIN_X + indent + 8.0;
            let lines = wrap(runs, BODY_SIZE, CONTENT_WIDTH - indent - 8.0, false);

            for (i, line) in lines.iter().enumerate() {
                writer.ensure(14.5);
                writer.y -= 14.5;
                let y = writer.y;
                if i == 0 {
                    let marker_line = text_lines(marker, Font::Regular, BODY_SIZE, indent);
                    if let Some(marker_line) = marker_line.first() {
                        let x = text_x - 4.0 - marker_line.width;
                        writer.show(marker_line, x, y, BODY_SIZE);
                    }
                }
                writer.show(line, text_x, y, BODY_SIZE);
            }
            writer.gap(3.0);
        }
        Block::TableRow { cells, header } => {
            let mut runs = Vec::new();
            for (i, cell) in cells.iter().enumerate() {
                if i > 0 {
                    runs.push(Run::plain(" | "));
                }
                runs.extend(cell.iter().cloned());
            }
            let lines = wrap(&runs, 10.0, CONTENT_WIDTH, *header);
            writer.lines(&lines, MARGIN_X, 10.0, 13.0);
            writer.gap(2.0);
        }
        Block::Image { caption } => {
            let lines = text_lines(caption, Font::Italic, 10.0, CONTENT_WIDTH);
            writer.gap(4.0);
            writer.lines(&lines, MARGIN_X, 10.0, 13.0);
            writer.gap(8.0);
        }
    }
}

fn assemble(pages: Vec<Vec<Operation>>) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut fonts = lopdf::Dictionary::new();
    for font in Font::ALL {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_name(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(font.resource(), font_id);
    }
    let resources_id = doc.add_object(dictionary! {
        "Font" => fonts,
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let encoded = Content { operations }.encode().map_err(render_err)?;
        let content_id = doc.add_object(lopdf::Stream::new(lopdf::Dictionary::new(), encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![num(0.0), num(0.0), num(PAGE_WIDTH), num(PAGE_HEIGHT)],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(render_err)?;
    Ok(bytes)
}

// ============================================================================
// Text extraction
// ============================================================================

/// Page count and text of a rendered PDF
#[derive(Debug, Clone)]
pub struct PdfSummary {
    pub page_count: usize,
    pub text: String,
}

/// Read back the text a renderer wrote, page by page
pub fn extract_text(bytes: &[u8]) -> Result<PdfSummary> {
    let doc = Document::load_mem(bytes).map_err(|e| AppError::Render {
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages = doc.get_pages();
    let mut text = String::new();

    for (page_num, page_id) in &pages {
        match doc.get_page_content(*page_id) {
            Ok(content) => {
                text.push_str(&extract_text_from_content(&content));
                text.push('\n');
            }
            Err(e) => warn!(page = page_num, error = %e, "Unreadable page content, skipping"),
        }
    }

    Ok(PdfSummary {
        page_count: pages.len(),
        text: text.split_whitespace().collect::<Vec<_>>().join(" "),
    })
}

/// Text between BT and ET, one text object per line of output
fn extract_text_from_content(content: &[u8]) -> String {
    // WinAnsi bytes read back as Latin-1
    let content: String = content.iter().map(|&b| b as char).collect();
    let mut text = String::new();
    let mut current = String::new();
    let mut in_text_block = false;

    for line in content.lines() {
        let trimmed = line.trim();
        match trimmed {
            "BT" => in_text_block = true,
            "ET" => {
                in_text_block = false;
                if !current.is_empty() {
                    text.push_str(&current);
                    text.push(' ');
                    current.clear();
                }
            }
            _ if in_text_block && trimmed.ends_with("Tj") => {
                if let (Some(start), Some(end)) = (trimmed.find('('), trimmed.rfind(')')) {
                    if start < end {
                        current.push_str(&decode_pdf_string(&trimmed[start + 1..end]));
                    }
                }
            }
            _ => {}
        }
    }

    text
}

fn decode_pdf_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some(d @ '0'..='7') => {
                let mut code = d.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(next) => {
                            code = code * 8 + next;
                            chars.next();
                        }
                        None => break,
                    }
                }
                if let Some(c) = char::from_u32(code) {
                    result.push(c);
                }
            }
            Some(c) => result.push(c),
            None => {}
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(content_html: &str) -> PdfDocumentInput {
        PdfDocumentInput {
            title: "Krump as Embodied Research".to_string(),
            author_name: "Tight Eyez".to_string(),
            orcid_id: Some("0000-0002-1825-0097".to_string()),
            keywords: vec!["krump".to_string(), "dance".to_string()],
            abstract_text: "A study of stomps, chest pops and arm swings.".to_string(),
            content_html: content_html.to_string(),
            license: "CC BY 4.0".to_string(),
            journal_name: "Krump Journal".to_string(),
            year: 2026,
        }
    }

    #[test]
    fn test_render_basic_article() {
        let pdf = render_article(&input("<h1>Intro</h1><p>Hello <b>world</b></p>")).unwrap();
        assert!(pdf.bytes.starts_with(b"%PDF"));
        assert_eq!(pdf.page_count, 1);

        let summary = extract_text(&pdf.bytes).unwrap();
        assert_eq!(summary.page_count, 1);
        assert!(summary.text.contains("Krump as Embodied Research"));
        assert!(summary.text.contains("KRUMP JOURNAL"));
        assert!(summary.text.contains("Hello world"));
        assert!(summary.text.contains("ORCID: 0000-0002-1825-0097"));
        assert!(summary.text.contains("Keywords: krump, dance"));
        assert!(summary.text.contains("Krump Journal. All rights reserved."));
        assert!(summary.text.contains("Licensed under CC BY 4.0"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let html = "<p>Same &amp; same</p><ul><li>one</li><li>two</li></ul>";
        let a = render_article(&input(html)).unwrap();
        let b = render_article(&input(html)).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_empty_body_placeholder() {
        let pdf = render_article(&input("  <p> </p> ")).unwrap();
        let summary = extract_text(&pdf.bytes).unwrap();
        assert!(summary.text.contains(EMPTY_BODY));
    }

    #[test]
    fn test_long_body_paginates() {
        let paragraph = "<p>".to_string() + &"stomp ".repeat(400) + "</p>";
        let pdf = render_article(&input(&paragraph.repeat(6))).unwrap();
        assert!(pdf.page_count > 1);

        let summary = extract_text(&pdf.bytes).unwrap();
        assert_eq!(summary.page_count, pdf.page_count);
        assert_eq!(
            summary.text.matches("All rights reserved.").count(),
            pdf.page_count
        );
    }

    #[test]
    fn test_parse_blocks() {
        let blocks = parse_blocks(
            "<h2>Method</h2><p>Text <em>here</em></p>\
             <ol><li>first</li><li>second</li></ol>\
             <table><thead><tr><th>Move</th><th>Count</th></tr></thead>\
             <tbody><tr><td>stomp</td><td>3</td></tr></tbody></table>\
             <img src=\"ipfs://fig\" alt=\"Figure 1\"><div>loose <span>text</span></div>",
        );

        assert!(matches!(&blocks[0], Block::Heading { level: 2, runs } if runs[0].text == "Method"));
        assert!(matches!(&blocks[1], Block::Paragraph { runs } if runs.len() == 2 && runs[1].style.italic));
        assert!(matches!(&blocks[2], Block::ListItem { marker, .. } if marker == "1."));
        assert!(matches!(&blocks[3], Block::ListItem { marker, .. } if marker == "2."));
        assert!(matches!(&blocks[4], Block::TableRow { cells, header: true } if cells.len() == 2));
        assert!(matches!(&blocks[5], Block::TableRow { cells, header: false } if cells[0][0].text == "stomp"));
        assert_eq!(
            blocks[6],
            Block::Image {
                caption: "[Image: Figure 1]".to_string()
            }
        );
        assert!(matches!(&blocks[7], Block::Paragraph { runs } if runs[0].text == "loose text"));
    }

    #[test]
    fn test_image_falls_back_to_src() {
        let blocks = parse_blocks("<img src='ipfs://QmFig' />");
        assert_eq!(
            blocks,
            vec![Block::Image {
                caption: "[Image: ipfs://QmFig]".to_string()
            }]
        );
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(
            decode_entities("a &amp; b &lt;c&gt; &quot;d&quot; &#39;e&#39; &#x41;&#66;"),
            "a & b <c> \"d\" 'e' AB"
        );
        assert_eq!(decode_entities("x&nbsp;y"), "x\u{a0}y");
        assert_eq!(decode_entities("fish & chips"), "fish & chips");
    }

    #[test]
    fn test_stray_angle_bracket_is_text() {
        let blocks = parse_blocks("<p>a < b</p>");
        assert!(matches!(&blocks[0], Block::Paragraph { runs } if runs[0].text == "a < b"));
    }

    #[test]
    fn test_wrap_respects_width() {
        let runs = vec![Run::plain(&"word ".repeat(50))];
        let lines = wrap(&runs, BODY_SIZE, 200.0, false);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.width <= 200.0 + 0.01));
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("\u{a9} \u{2019}"), vec![0xa9, b' ', 0x92]);
        assert_eq!(encode_win_ansi("\u{4e2d}"), vec![b'?']);
        assert_eq!(encode_win_ansi("\u{6f22}\u{5b57} Krump"), b"?? Krump".to_vec());
        assert_eq!(encode_win_ansi("\u{0416}\u{03a9}"), b"??".to_vec());
        assert_eq!(encode_win_ansi("\u{0085}\u{00e9}"), vec![b'?', 0xe9]);
    }

    #[test]
    fn test_decode_pdf_string() {
        assert_eq!(decode_pdf_string("Hello\\nWorld"), "Hello\nWorld");
        assert_eq!(decode_pdf_string("Test\\(paren\\)"), "Test(paren)");
        assert_eq!(decode_pdf_string("\\251 2026"), "\u{a9} 2026");
    }
}
