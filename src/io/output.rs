use anyhow::{Context, Result};
use csv::Writer;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::entry::GuidanceReport;
use crate::table::TargetRow;

fn opt_to_string<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map_or(String::new(), |v| v.to_string())
}

/// Write the targets table, one row per target.
pub fn write_table_csv<P: AsRef<Path>>(path: P, rows: &[TargetRow]) -> Result<()> {
    let mut wtr = Writer::from_path(path.as_ref())
        .with_context(|| format!("failed to create table file {:?}", path.as_ref()))?;

    wtr.write_record([
        "label",
        "needle_type",
        "x",
        "y",
        "z",
        "hole",
        "depth",
        "in_range",
        "planning_hole",
        "planning_depth",
        "hole_matches",
        "depth_matches",
        "cursor_distance",
    ])?;

    for row in rows {
        let planning = row.planning.as_ref();
        let record = vec![
            row.label.clone(),
            row.needle_type.to_string(),
            row.position[0].to_string(),
            row.position[1].to_string(),
            row.position[2].to_string(),
            opt_to_string(&row.hole),
            opt_to_string(&row.depth_text),
            opt_to_string(&row.in_range),
            planning.map_or(String::new(), |p| p.hole.clone()),
            planning.map_or(String::new(), |p| format!("{:.1}", p.depth)),
            planning.map_or(String::new(), |p| p.hole_matches.to_string()),
            planning.map_or(String::new(), |p| p.depth_matches.to_string()),
            row.cursor_distance
                .map_or(String::new(), |d| format!("{:.2}", d)),
        ];
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    log::info!("Targets table written to {:?}", path.as_ref());
    Ok(())
}

/// Write the full guidance report as pretty-printed JSON.
pub fn write_report_json<P: AsRef<Path>>(path: P, report: &GuidanceReport) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("failed to create report file {:?}", path.as_ref()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, report)
        .with_context(|| format!("failed to serialize report to {:?}", path.as_ref()))?;
    log::info!("Guidance report written to {:?}", path.as_ref());
    Ok(())
}
