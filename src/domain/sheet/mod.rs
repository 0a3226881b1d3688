// ============================================================
// SHEET DOMAIN LAYER
// ============================================================
// Cell and sheet value objects shared by readers and the pipeline
// No I/O, no async

mod cell;
mod raw_sheet;

pub use cell::{excel_serial_to_date, CellValue};
pub use raw_sheet::{non_empty_count, occupied_width, row_is_blank, RawRow, RawSheet};
