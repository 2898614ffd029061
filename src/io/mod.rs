pub mod input;
pub mod output;

pub use input::{parse_fcsv, parse_transform, read_fcsv, read_transform_txt, CoordinateSystem};
pub use output::{write_report_json, write_table_csv};
