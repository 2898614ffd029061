use anyhow::{anyhow, bail, Context, Result};
use csv::ReaderBuilder;
use nalgebra::{Matrix4, Point3};
use std::fs;
use std::path::Path;

use crate::targets::{NeedleType, TargetList, TargetPoint};

/// Coordinate system declared in a markups file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSystem {
    Ras,
    Lps,
}

/// Column positions of the fields we need from a markups row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FcsvColumns {
    x: usize,
    y: usize,
    z: usize,
    label: usize,
    desc: Option<usize>,
}

impl Default for FcsvColumns {
    fn default() -> Self {
        // id,x,y,z,ow,ox,oy,oz,vis,sel,lock,label,desc,associatedNodeID
        Self {
            x: 1,
            y: 2,
            z: 3,
            label: 11,
            desc: Some(12),
        }
    }
}

impl FcsvColumns {
    fn from_header(names: &str) -> Result<Self> {
        let names: Vec<&str> = names.split(',').map(|n| n.trim()).collect();
        let find = |name: &str| names.iter().position(|n| *n == name);
        Ok(Self {
            x: find("x").ok_or_else(|| anyhow!("markups header has no 'x' column"))?,
            y: find("y").ok_or_else(|| anyhow!("markups header has no 'y' column"))?,
            z: find("z").ok_or_else(|| anyhow!("markups header has no 'z' column"))?,
            label: find("label").ok_or_else(|| anyhow!("markups header has no 'label' column"))?,
            desc: find("desc"),
        })
    }
}

fn parse_coordinate_system(value: &str) -> Result<CoordinateSystem> {
    match value.trim().to_uppercase().as_str() {
        "0" | "RAS" => Ok(CoordinateSystem::Ras),
        "1" | "LPS" => Ok(CoordinateSystem::Lps),
        other => bail!("unsupported markups coordinate system '{}'", other),
    }
}

/// Parse a Slicer markups fiducial list (`.fcsv`) into a target list.
///
/// The `desc` column, when present, carries the needle type. LPS files are
/// converted to RAS. Rows that cannot be parsed are skipped with a warning.
pub fn parse_fcsv(name: &str, content: &str) -> Result<TargetList> {
    let mut columns = FcsvColumns::default();
    let mut system = CoordinateSystem::Ras;

    for line in content.lines().take_while(|l| l.starts_with('#')) {
        let header = line.trim_start_matches('#').trim();
        if let Some(value) = header.strip_prefix("CoordinateSystem =") {
            system = parse_coordinate_system(value)?;
        } else if let Some(value) = header.strip_prefix("columns =") {
            columns = FcsvColumns::from_header(value)?;
        }
    }

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut list = TargetList::new(name);
    for (row, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Skipping invalid markups row {}: {:?}", row, e);
                continue;
            }
        };
        let coord = |i: usize| -> Option<f64> {
            record
                .get(i)?
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
        };
        let (x, y, z) = match (coord(columns.x), coord(columns.y), coord(columns.z)) {
            (Some(x), Some(y), Some(z)) => (x, y, z),
            _ => {
                log::warn!("Skipping markups row {} without valid coordinates", row);
                continue;
            }
        };
        let position = match system {
            CoordinateSystem::Ras => Point3::new(x, y, z),
            CoordinateSystem::Lps => Point3::new(-x, -y, z),
        };

        let label = match record.get(columns.label) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => generated_label(&list, name),
        };
        let needle_type = columns
            .desc
            .and_then(|i| record.get(i))
            .map(|d| d.parse::<NeedleType>().unwrap_or_default())
            .unwrap_or_default();

        list.push(TargetPoint::new(label, position, needle_type))
            .with_context(|| format!("markups row {}", row))?;
    }
    Ok(list)
}

// "<name>-<n>" with the first n past the list length that is still free
fn generated_label(list: &TargetList, name: &str) -> String {
    (list.len() + 1..)
        .map(|n| format!("{}-{}", name, n))
        .find(|label| list.index_of(label).is_none())
        .unwrap_or_else(|| name.to_string())
}

pub fn read_fcsv<P: AsRef<Path>>(path: P) -> Result<TargetList> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to open markups file {:?}", path.as_ref()))?;
    let name = path
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "targets".to_string());
    let list = parse_fcsv(&name, &content)
        .with_context(|| format!("failed to parse markups file {:?}", path.as_ref()))?;
    log::info!("Loaded {} targets from {:?}", list.len(), path.as_ref());
    Ok(list)
}

/// Parse a homogeneous transform written as four rows of four numbers
/// (a trailing `0 0 0 1` row may be omitted). Values may be separated by
/// commas or whitespace; `#` starts a comment.
pub fn parse_transform(content: &str) -> Result<Matrix4<f64>> {
    let mut values = Vec::with_capacity(16);
    for (line_no, line) in content.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("");
        for token in line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let value: f64 = token.parse().with_context(|| {
                format!("invalid number '{}' on line {}", token, line_no + 1)
            })?;
            values.push(value);
        }
    }

    match values.len() {
        16 => Ok(Matrix4::from_row_slice(&values)),
        12 => {
            values.extend_from_slice(&[0.0, 0.0, 0.0, 1.0]);
            Ok(Matrix4::from_row_slice(&values))
        }
        n => bail!("expected 12 or 16 transform values, found {}", n),
    }
}

pub fn read_transform_txt<P: AsRef<Path>>(path: P) -> Result<Matrix4<f64>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to open transform file {:?}", path.as_ref()))?;
    parse_transform(&content)
        .with_context(|| format!("failed to parse transform file {:?}", path.as_ref()))
}

#[cfg(test)]
mod input_tests {
    use super::*;
    use approx::assert_relative_eq;

    const FCSV: &str = "\
# Markups fiducial file version = 4.11
# CoordinateSystem = 0
# columns = id,x,y,z,ow,ox,oy,oz,vis,sel,lock,label,desc,associatedNodeID
vtkMRMLMarkupsFiducialNode_0,10.5,-3.25,40,0,0,0,1,1,1,0,T1,ICEROD,
vtkMRMLMarkupsFiducialNode_1,0,0,60,0,0,0,1,1,1,0,T2,iceseed,
vtkMRMLMarkupsFiducialNode_2,1,2,3,0,0,0,1,1,1,0,,,
";

    #[test]
    fn test_parse_fcsv() {
        let list = parse_fcsv("intraop", FCSV).unwrap();
        assert_eq!(list.len(), 3);
        let t1 = list.get(0).unwrap();
        assert_eq!(t1.label, "T1");
        assert_relative_eq!(t1.position(), Point3::new(10.5, -3.25, 40.0));
        assert_eq!(t1.needle_type, NeedleType::IceRod);
        assert_eq!(list.get(1).unwrap().needle_type, NeedleType::IceSeed);
        // unlabelled rows get a generated label
        assert_eq!(list.get(2).unwrap().label, "intraop-3");
        assert_eq!(list.get(2).unwrap().needle_type, NeedleType::Unspecified);
    }

    #[test]
    fn test_parse_fcsv_lps_and_custom_columns() {
        let content = "\
# CoordinateSystem = LPS
# columns = label,x,y,z
A,1,2,3
B,-4,5,6
";
        let list = parse_fcsv("lps", content).unwrap();
        assert_relative_eq!(list.get(0).unwrap().position(), Point3::new(-1.0, -2.0, 3.0));
        assert_relative_eq!(list.get(1).unwrap().position(), Point3::new(4.0, -5.0, 6.0));
    }

    #[test]
    fn test_parse_fcsv_skips_bad_rows() {
        let content = "\
# columns = id,x,y,z,ow,ox,oy,oz,vis,sel,lock,label,desc
n0,abc,0,0,0,0,0,1,1,1,0,BAD,
n1,1,1,1,0,0,0,1,1,1,0,GOOD,
";
        let list = parse_fcsv("t", content).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0).unwrap().label, "GOOD");
    }

    #[test]
    fn test_parse_fcsv_skips_non_finite_rows() {
        let content = "\
n0,nan,0,0,0,0,0,1,1,1,0,NAN,
n1,0,inf,0,0,0,0,1,1,1,0,INF,
n2,0,0,-infinity,0,0,0,1,1,1,0,NEGINF,
n3,1,1,1,0,0,0,1,1,1,0,GOOD,
";
        let list = parse_fcsv("t", content).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0).unwrap().label, "GOOD");
    }

    #[test]
    fn test_generated_label_avoids_explicit_labels() {
        let content = "\
n0,1,1,1,0,0,0,1,1,1,0,t-2,
n1,2,2,2,0,0,0,1,1,1,0,,
n2,3,3,3,0,0,0,1,1,1,0,,
";
        let list = parse_fcsv("t", content).unwrap();
        let labels: Vec<&str> = list.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["t-2", "t-3", "t-4"]);
    }

    #[test]
    fn test_parse_fcsv_duplicate_labels_fail() {
        let content = "\
n0,1,1,1,0,0,0,1,1,1,0,T1,
n1,2,2,2,0,0,0,1,1,1,0,T1,
";
        assert!(parse_fcsv("t", content).is_err());
    }

    #[test]
    fn test_parse_transform() {
        let content = "\
# Z-frame registration result
1 0 0 10
0 1 0 -5.5
0 0 1 30
0 0 0 1
";
        let m = parse_transform(content).unwrap();
        assert_relative_eq!(m[(0, 3)], 10.0);
        assert_relative_eq!(m[(1, 3)], -5.5);
        assert_relative_eq!(m[(3, 3)], 1.0);

        let short = parse_transform("1,0,0,1\n0,1,0,2\n0,0,1,3\n").unwrap();
        assert_relative_eq!(short[(2, 3)], 3.0);
        assert_relative_eq!(short[(3, 3)], 1.0);
    }

    #[test]
    fn test_parse_transform_errors() {
        assert!(parse_transform("1 0 0\n").is_err());
        assert!(parse_transform("1 0 0 x\n0 1 0 0\n0 0 1 0\n").is_err());
    }

    #[test]
    fn test_read_files() {
        let dir = tempfile::tempdir().unwrap();
        let fcsv = dir.path().join("planning.fcsv");
        std::fs::write(&fcsv, FCSV).unwrap();
        let list = read_fcsv(&fcsv).unwrap();
        assert_eq!(list.name(), "planning");
        assert_eq!(list.len(), 3);

        assert!(read_transform_txt(dir.path().join("missing.txt")).is_err());
    }
}
