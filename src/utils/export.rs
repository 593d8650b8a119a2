use chrono::TimeZone;
use csv::{Writer, WriterBuilder};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet, XlsxError};
use std::fmt::Display;

use crate::model::time_entry::TimeEntryDetail;

pub const CSV_HEADER: [&str; 7] = [
    "Employee",
    "Date",
    "Clock In",
    "Clock Out",
    "Duration",
    "Manual",
    "Notes",
];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Spreadsheet-friendly CSV: BOM first so Excel picks UTF-8, `;` between fields,
/// times rendered in `tz`.
pub struct CsvExport<Tz: TimeZone> {
    writer: Writer<Vec<u8>>,
    tz: Tz,
}

impl<Tz> CsvExport<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    pub fn new(tz: Tz) -> Result<Self, csv::Error> {
        let mut writer = WriterBuilder::new()
            .delimiter(b';')
            .from_writer(UTF8_BOM.to_vec());
        writer.write_record(CSV_HEADER)?;
        Ok(Self { writer, tz })
    }

    pub fn push(&mut self, row: &TimeEntryDetail) -> Result<(), csv::Error> {
        let entry = &row.entry;
        let check_in = entry.check_in.with_timezone(&self.tz);
        let check_out = entry
            .check_out
            .map(|out| out.with_timezone(&self.tz).format("%H:%M").to_string())
            .unwrap_or_default();

        self.writer.write_record([
            row.employee_name().to_string(),
            check_in.format("%d/%m/%Y").to_string(),
            check_in.format("%H:%M").to_string(),
            check_out,
            entry.duration_display(),
            if entry.is_manual { "Yes" } else { "No" }.to_string(),
            entry.notes.clone(),
        ])
    }

    pub fn finish(self) -> Result<Vec<u8>, csv::Error> {
        self.writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }
}

pub const XLSX_HEADER: [&str; 8] = [
    "Employee",
    "Date",
    "Clock In",
    "Clock Out",
    "Duration (min)",
    "Location",
    "Manual",
    "Notes",
];

const MAX_COLUMN_WIDTH: usize = 50;

/// Single-sheet workbook with a styled header row. Column widths follow the
/// longest value in each column, capped at 50 characters.
pub struct XlsxExport<Tz: TimeZone> {
    workbook: Workbook,
    tz: Tz,
    row: u32,
    widths: [usize; XLSX_HEADER.len()],
}

impl<Tz> XlsxExport<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    pub fn new(tz: Tz) -> Result<Self, XlsxError> {
        let mut workbook = Workbook::new();
        let header = Format::new()
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(Color::RGB(0x2C3E50))
            .set_align(FormatAlign::Center);

        let sheet = workbook.add_worksheet();
        sheet.set_name("Time entries")?;
        sheet.set_freeze_panes(1, 0)?;

        let mut widths = [0; XLSX_HEADER.len()];
        for (col, title) in XLSX_HEADER.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *title, &header)?;
            widths[col] = title.chars().count();
        }

        Ok(Self {
            workbook,
            tz,
            row: 0,
            widths,
        })
    }

    fn sheet(&mut self) -> Result<&mut Worksheet, XlsxError> {
        self.workbook.worksheet_from_index(0)
    }

    pub fn push(&mut self, detail: &TimeEntryDetail) -> Result<(), XlsxError> {
        let entry = &detail.entry;
        let check_in = entry.check_in.with_timezone(&self.tz);
        let cells = [
            detail.employee_name().to_string(),
            check_in.format("%d/%m/%Y").to_string(),
            check_in.format("%H:%M").to_string(),
            entry
                .check_out
                .map(|out| out.with_timezone(&self.tz).format("%H:%M").to_string())
                .unwrap_or_default(),
            String::new(),
            detail.location_name.clone(),
            if entry.is_manual { "Yes" } else { "No" }.to_string(),
            entry.notes.clone(),
        ];

        self.row += 1;
        let row = self.row;
        // open entries leave the duration cell empty
        let minutes = entry.duration_minutes();
        let sheet = self.sheet()?;
        for (col, value) in cells.iter().enumerate() {
            match (col, minutes) {
                (4, Some(m)) => {
                    sheet.write_number(row, col as u16, m as f64)?;
                }
                (4, None) => {}
                _ => {
                    sheet.write_string(row, col as u16, value.as_str())?;
                }
            }
        }

        for (col, value) in cells.iter().enumerate() {
            let len = match (col, minutes) {
                (4, Some(m)) => m.to_string().len(),
                _ => value.chars().count(),
            };
            self.widths[col] = self.widths[col].max(len);
        }
        Ok(())
    }

    pub fn rows(&self) -> u32 {
        self.row
    }

    pub fn finish(mut self) -> Result<Vec<u8>, XlsxError> {
        let widths = self.widths;
        let sheet = self.sheet()?;
        for (col, width) in widths.iter().enumerate() {
            sheet.set_column_width(col as u16, (width + 2).min(MAX_COLUMN_WIDTH) as f64)?;
        }
        self.workbook.save_to_buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::time_entry::sample_entry;
    use chrono::{FixedOffset, Utc};

    fn detail(minutes: Option<i64>, notes: &str) -> TimeEntryDetail {
        let mut entry = sample_entry(minutes);
        entry.notes = notes.to_string();
        entry.is_manual = !notes.is_empty();
        TimeEntryDetail {
            entry,
            username: "jdoe".to_string(),
            full_name: "Jane Doe".to_string(),
            location_name: "Main Shop".to_string(),
        }
    }

    fn export(rows: &[TimeEntryDetail]) -> String {
        let mut csv = CsvExport::new(Utc).unwrap();
        for row in rows {
            csv.push(row).unwrap();
        }
        let bytes = csv.finish().unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap()
    }

    #[test]
    fn header_only_when_empty() {
        let out = export(&[]);
        assert_eq!(out, "Employee;Date;Clock In;Clock Out;Duration;Manual;Notes\n");
    }

    #[test]
    fn rows_use_semicolons_and_local_formats() {
        let out = export(&[detail(Some(90), ""), detail(None, "forgot; badge")]);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "Jane Doe;02/03/2026;08:00;09:30;1h 30m;No;");
        // fields containing the delimiter are quoted
        assert_eq!(lines[2], "Jane Doe;02/03/2026;08:00;;In progress;Yes;\"forgot; badge\"");
    }

    #[test]
    fn workbook_is_a_zip_with_one_row_per_entry() {
        let mut xlsx = XlsxExport::new(Utc).unwrap();
        xlsx.push(&detail(Some(90), "")).unwrap();
        xlsx.push(&detail(None, "forgot to clock out")).unwrap();
        assert_eq!(xlsx.rows(), 2);

        let bytes = xlsx.finish().unwrap();
        // xlsx files are zip archives
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn empty_workbook_still_has_a_header() {
        let xlsx = XlsxExport::new(Utc).unwrap();
        assert_eq!(xlsx.rows(), 0);
        assert!(xlsx.finish().unwrap().starts_with(b"PK"));
    }

    #[test]
    fn times_follow_the_export_timezone() {
        let mut csv = CsvExport::new(FixedOffset::east_opt(3600).unwrap()).unwrap();
        csv.push(&detail(Some(30), "")).unwrap();
        let out = String::from_utf8(csv.finish().unwrap()).unwrap();
        assert!(out.contains(";09:00;09:30;0h 30m;"));
    }
}
