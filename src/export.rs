//! Broadsheet spreadsheet export.
//!
//! Produces a single-sheet Office Open XML workbook by writing the package parts
//! straight into a zip archive. The cell layout is consumed programmatically
//! downstream, so row/column positions here are a compatibility surface.

use crate::broadsheet::Broadsheet;
use anyhow::Context;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const SHEET_NAME: &str = "Broadsheet";
pub const SUB_HEADERS: [&str; 4] = ["C/A", "S/T", "Exam", "Total"];
pub const COLUMNS_PER_STUDENT: usize = 4;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

// cellXfs indices in styles.xml
const STYLE_BODY_LEFT: u32 = 1;
const STYLE_BODY_CENTER: u32 = 2;
const STYLE_HEAD_LEFT: u32 = 3;
const STYLE_HEAD_CENTER: u32 = 4;
const STYLE_TITLE: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
}

impl CellValue {
    fn blank() -> Self {
        CellValue::Text(String::new())
    }

    fn opt_int(v: Option<i64>) -> Self {
        match v {
            Some(n) => CellValue::Number(n as f64),
            None => CellValue::blank(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub style: u32,
}

/// Grid of cells plus merged ranges, before serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    pub rows: Vec<Vec<Cell>>,
    pub merges: Vec<String>,
}

impl SheetLayout {
    pub fn width(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }
}

/// `0 -> "A"`, `25 -> "Z"`, `26 -> "AA"`.
pub fn column_name(mut idx: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn cell_ref(col: usize, row: usize) -> String {
    format!("{}{}", column_name(col), row + 1)
}

fn range_ref(c0: usize, r0: usize, c1: usize, r1: usize) -> String {
    format!("{}:{}", cell_ref(c0, r0), cell_ref(c1, r1))
}

pub fn title_line(sheet: &Broadsheet, generated_at: &str) -> String {
    format!(
        "Broadsheet for {} - {} Term, {} Session - Generated on: {}",
        sheet.class_name, sheet.term, sheet.session_name, generated_at
    )
}

pub fn layout(sheet: &Broadsheet, generated_at: &str) -> SheetLayout {
    let n = sheet.rows.len();
    let width = 1 + COLUMNS_PER_STUDENT * n + 1;
    let last = width - 1;

    let row_of = |label: &str, head: bool| -> Vec<Cell> {
        (0..width)
            .map(|c| Cell {
                value: if c == 0 {
                    CellValue::Text(label.to_string())
                } else {
                    CellValue::blank()
                },
                style: match (c == 0, head) {
                    (true, true) => STYLE_HEAD_LEFT,
                    (false, true) => STYLE_HEAD_CENTER,
                    (true, false) => STYLE_BODY_LEFT,
                    (false, false) => STYLE_BODY_CENTER,
                },
            })
            .collect()
    };

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    let mut merges: Vec<String> = Vec::new();

    let mut title = row_of(&title_line(sheet, generated_at), true);
    title[0].style = STYLE_TITLE;
    rows.push(title);
    if last > 0 {
        merges.push(range_ref(0, 0, last, 0));
    }

    let mut names = row_of("Subjects", true);
    let mut subs = row_of("", true);
    for (i, r) in sheet.rows.iter().enumerate() {
        let start = 1 + COLUMNS_PER_STUDENT * i;
        names[start].value = CellValue::Text(r.display_name.clone());
        merges.push(range_ref(start, 1, start + COLUMNS_PER_STUDENT - 1, 1));
        for (j, h) in SUB_HEADERS.iter().enumerate() {
            subs[start + j].value = CellValue::Text((*h).to_string());
        }
    }
    names[last].value = CellValue::Text("Class Average".to_string());
    merges.push(range_ref(0, 1, 0, 2));
    merges.push(range_ref(last, 1, last, 2));
    rows.push(names);
    rows.push(subs);

    for (col, subject) in sheet.subjects.iter().enumerate() {
        let mut row = row_of(&subject.name, false);
        for (i, r) in sheet.rows.iter().enumerate() {
            let start = 1 + COLUMNS_PER_STUDENT * i;
            if let Some(cell) = r.cells.get(col).and_then(Option::as_ref) {
                row[start].value = CellValue::opt_int(cell.class_assessment);
                row[start + 1].value = CellValue::opt_int(cell.summative_test);
                row[start + 2].value = CellValue::opt_int(cell.exam);
                row[start + 3].value = CellValue::opt_int(cell.total);
            }
        }
        if let Some(avg) = sheet.subject_averages.get(col) {
            row[last].value = CellValue::Number(avg.average);
        }
        rows.push(row);
    }

    let mut grand = row_of("Grand Total", false);
    let mut average = row_of("Average", false);
    let mut position = row_of("Position", false);
    for (i, r) in sheet.rows.iter().enumerate() {
        let total_col = COLUMNS_PER_STUDENT * (i + 1);
        grand[total_col].value = CellValue::Number(r.grand_total as f64);
        average[total_col].value = CellValue::Number(r.term_average);
        position[total_col].value = CellValue::Text(r.position.clone().unwrap_or_default());
    }
    rows.push(grand);
    rows.push(average);
    rows.push(position);

    SheetLayout { rows, merges }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r' => {}
            c => out.push(c),
        }
    }
    out
}

#[derive(Default)]
struct SharedStrings {
    items: Vec<String>,
    index: HashMap<String, usize>,
    refs: usize,
}

impl SharedStrings {
    fn intern(&mut self, s: &str) -> usize {
        self.refs += 1;
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.items.len();
        self.items.push(s.to_string());
        self.index.insert(s.to_string(), i);
        i
    }

    fn to_xml(&self) -> String {
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<sst xmlns=\"{NS_MAIN}\" count=\"{}\" uniqueCount=\"{}\">",
            self.refs,
            self.items.len()
        );
        for s in &self.items {
            xml.push_str("<si><t xml:space=\"preserve\">");
            xml.push_str(&escape_xml(s));
            xml.push_str("</t></si>");
        }
        xml.push_str("</sst>");
        xml
    }
}

fn sheet_xml(layout: &SheetLayout, strings: &mut SharedStrings) -> String {
    let width = layout.width().max(1);
    let height = layout.rows.len().max(1);
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<worksheet xmlns=\"{NS_MAIN}\" xmlns:r=\"{NS_REL}\"><dimension ref=\"{}\"/>",
        range_ref(0, 0, width - 1, height - 1)
    );

    xml.push_str("<cols><col min=\"1\" max=\"1\" width=\"24\" customWidth=\"1\"/>");
    if width > 2 {
        xml.push_str(&format!(
            "<col min=\"2\" max=\"{}\" width=\"8\" customWidth=\"1\"/>",
            width - 1
        ));
    }
    if width > 1 {
        xml.push_str(&format!(
            "<col min=\"{w}\" max=\"{w}\" width=\"14\" customWidth=\"1\"/>",
            w = width
        ));
    }
    xml.push_str("</cols><sheetData>");

    for (r, row) in layout.rows.iter().enumerate() {
        xml.push_str(&format!("<row r=\"{}\">", r + 1));
        for (c, cell) in row.iter().enumerate() {
            let at = cell_ref(c, r);
            match &cell.value {
                CellValue::Text(s) => {
                    let i = strings.intern(s);
                    xml.push_str(&format!(
                        "<c r=\"{at}\" s=\"{}\" t=\"s\"><v>{i}</v></c>",
                        cell.style
                    ));
                }
                CellValue::Number(v) => {
                    xml.push_str(&format!(
                        "<c r=\"{at}\" s=\"{}\"><v>{v}</v></c>",
                        cell.style
                    ));
                }
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData>");

    if !layout.merges.is_empty() {
        xml.push_str(&format!("<mergeCells count=\"{}\">", layout.merges.len()));
        for m in &layout.merges {
            xml.push_str(&format!("<mergeCell ref=\"{m}\"/>"));
        }
        xml.push_str("</mergeCells>");
    }
    xml.push_str(
        "<pageMargins left=\"0.5\" right=\"0.5\" top=\"0.75\" bottom=\"0.75\" header=\"0.3\" footer=\"0.3\"/>\
         <pageSetup orientation=\"landscape\"/></worksheet>",
    );
    xml
}

fn styles_xml() -> String {
    let thin = "<border><left style=\"thin\"><color auto=\"1\"/></left><right style=\"thin\"><color auto=\"1\"/></right>\
                <top style=\"thin\"><color auto=\"1\"/></top><bottom style=\"thin\"><color auto=\"1\"/></bottom><diagonal/></border>";
    let xf = |font: u32, horizontal: &str| {
        format!(
            "<xf numFmtId=\"0\" fontId=\"{font}\" fillId=\"0\" borderId=\"1\" xfId=\"0\" applyFont=\"1\" applyBorder=\"1\" applyAlignment=\"1\">\
             <alignment horizontal=\"{horizontal}\" vertical=\"center\"/></xf>"
        )
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<styleSheet xmlns=\"{NS_MAIN}\">\
         <fonts count=\"3\">\
         <font><sz val=\"12\"/><name val=\"Times New Roman\"/></font>\
         <font><b/><sz val=\"12\"/><name val=\"Times New Roman\"/></font>\
         <font><b/><sz val=\"14\"/><name val=\"Times New Roman\"/></font>\
         </fonts>\
         <fills count=\"2\"><fill><patternFill patternType=\"none\"/></fill><fill><patternFill patternType=\"gray125\"/></fill></fills>\
         <borders count=\"2\"><border><left/><right/><top/><bottom/><diagonal/></border>{thin}</borders>\
         <cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>\
         <cellXfs count=\"6\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/>{}{}{}{}{}</cellXfs>\
         <cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles>\
         </styleSheet>",
        xf(0, "left"),
        xf(0, "center"),
        xf(1, "left"),
        xf(1, "center"),
        xf(2, "left"),
    )
}

fn content_types_xml() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
     <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
     <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
     <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
     <Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>\
     <Override PartName=\"/xl/worksheets/sheet1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>\
     <Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>\
     <Override PartName=\"/xl/sharedStrings.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml\"/>\
     </Types>"
        .to_string()
}

fn root_rels_xml() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"{NS_PKG_REL}\">\
         <Relationship Id=\"rId1\" Type=\"{NS_REL}/officeDocument\" Target=\"xl/workbook.xml\"/>\
         </Relationships>"
    )
}

fn workbook_xml() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<workbook xmlns=\"{NS_MAIN}\" xmlns:r=\"{NS_REL}\">\
         <sheets><sheet name=\"{SHEET_NAME}\" sheetId=\"1\" r:id=\"rId1\"/></sheets></workbook>"
    )
}

fn workbook_rels_xml() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"{NS_PKG_REL}\">\
         <Relationship Id=\"rId1\" Type=\"{NS_REL}/worksheet\" Target=\"worksheets/sheet1.xml\"/>\
         <Relationship Id=\"rId2\" Type=\"{NS_REL}/styles\" Target=\"styles.xml\"/>\
         <Relationship Id=\"rId3\" Type=\"{NS_REL}/sharedStrings\" Target=\"sharedStrings.xml\"/>\
         </Relationships>"
    )
}

pub fn encode_broadsheet_xlsx(sheet: &Broadsheet, generated_at: &str) -> anyhow::Result<Vec<u8>> {
    let layout = layout(sheet, generated_at);
    let mut strings = SharedStrings::default();
    let sheet_part = sheet_xml(&layout, &mut strings);

    let parts: [(&str, String); 7] = [
        ("[Content_Types].xml", content_types_xml()),
        ("_rels/.rels", root_rels_xml()),
        ("xl/workbook.xml", workbook_xml()),
        ("xl/_rels/workbook.xml.rels", workbook_rels_xml()),
        ("xl/styles.xml", styles_xml()),
        ("xl/sharedStrings.xml", strings.to_xml()),
        ("xl/worksheets/sheet1.xml", sheet_part),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    // Fixed entry timestamps keep the digest stable for identical input.
    let opts = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());
    for (name, body) in &parts {
        zip.start_file(*name, opts)
            .with_context(|| format!("failed to start workbook part {}", name))?;
        zip.write_all(body.as_bytes())
            .with_context(|| format!("failed to write workbook part {}", name))?;
    }
    let cursor = zip.finish().context("failed to finalize workbook archive")?;
    Ok(cursor.into_inner())
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bytes: usize,
    pub sha256: String,
    pub rows: usize,
    pub cols: usize,
}

pub fn write_broadsheet_xlsx(
    out_path: &Path,
    sheet: &Broadsheet,
    generated_at: &str,
) -> anyhow::Result<ExportSummary> {
    let bytes = encode_broadsheet_xlsx(sheet, generated_at)?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let mut f = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    f.write_all(&bytes)
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?;

    let digest = Sha256::digest(&bytes);
    let sha256 = digest.iter().map(|b| format!("{:02x}", b)).collect::<String>();
    let shape = layout(sheet, generated_at);
    Ok(ExportSummary {
        bytes: bytes.len(),
        sha256,
        rows: shape.rows.len(),
        cols: shape.width(),
    })
}
