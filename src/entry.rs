use anyhow::{anyhow, Context, Result};
use crossbeam::thread;
use nalgebra::Point3;
use serde::Serialize;

use crate::config::GuidanceConfig;
use crate::geometry::TemplateGeometry;
use crate::guidance::{compute_all, GuidanceRecord, GuidanceSession};
use crate::io::{read_fcsv, read_transform_txt};
use crate::needle::NeedlePath;
use crate::table::{build_rows, TargetRow};
use crate::targets::TargetList;

/// Needle geometry of one target for the visualization layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeedleRecord {
    pub label: String,
    pub entry: [f64; 3],
    pub direction: [f64; 3],
    pub tip: [f64; 3],
    pub tube_end: [f64; 3],
    pub zone_centre: Option<[f64; 3]>,
    pub zone_radii: Option<[f64; 3]>,
}

fn arr(p: &Point3<f64>) -> [f64; 3] {
    [p.x, p.y, p.z]
}

#[derive(Debug, Clone, Serialize)]
pub struct GuidanceReport {
    pub frame_version: u64,
    pub template: TemplateGeometry,
    pub targets: Vec<TargetRow>,
    pub guidance: Vec<GuidanceRecord>,
    pub planning: Option<Vec<TargetRow>>,
    pub needles: Vec<NeedleRecord>,
}

/// Needle paths for every target of `targets` against the active frame.
pub fn needle_records(
    session: &GuidanceSession,
    targets: &TargetList,
    config: &GuidanceConfig,
) -> Result<Vec<NeedleRecord>> {
    let mut records = Vec::with_capacity(targets.len());
    for (index, target) in targets.iter().enumerate() {
        let result = session
            .guidance(targets, index)
            .with_context(|| format!("guidance for target {}", target.label))?;
        let path = NeedlePath::from_result(
            &result,
            &config.needle,
            config.ice_ball.radii(target.needle_type),
        );
        records.push(NeedleRecord {
            label: target.label.clone(),
            entry: arr(&path.entry),
            direction: [path.direction.x, path.direction.y, path.direction.z],
            tip: arr(&path.tip),
            tube_end: arr(&path.tube_end),
            zone_centre: path.zone.map(|z| arr(&z.centre)),
            zone_radii: path.zone.map(|z| [z.radii.x, z.radii.y, z.radii.z]),
        });
    }
    Ok(records)
}

/// Build the report for a registered session. The intra-procedural table,
/// the planning table and the raw guidance records are computed on
/// separate threads.
pub fn build_report(
    session: &GuidanceSession,
    config: &GuidanceConfig,
    targets: &TargetList,
    planning: Option<&TargetList>,
) -> Result<GuidanceReport> {
    let frame = session.frame().context("cannot build a guidance report")?;

    let (rows, planning_rows, guidance) = thread::scope(|s| -> Result<_> {
        let current_handle = s.spawn(|_| -> Result<_> {
            build_rows(session, targets, planning, None, &config.table)
                .context("building targets table failed")
        });

        let planning_handle = s.spawn(|_| -> Result<_> {
            planning
                .map(|p| {
                    build_rows(session, p, None, None, &config.table)
                        .context("building planning table failed")
                })
                .transpose()
        });

        let guidance_handle = s.spawn(|_| -> Result<Vec<GuidanceRecord>> {
            compute_all(&frame, targets)
                .iter()
                .map(|r| r.as_ref().map(GuidanceRecord::from).map_err(|e| anyhow!(e.clone())))
                .collect::<Result<Vec<_>>>()
                .context("computing guidance records failed")
        });

        let rows = current_handle
            .join()
            .map_err(|e| anyhow!("targets table thread panicked: {:?}", e))??;
        let planning_rows = planning_handle
            .join()
            .map_err(|e| anyhow!("planning table thread panicked: {:?}", e))??;
        let guidance = guidance_handle
            .join()
            .map_err(|e| anyhow!("guidance thread panicked: {:?}", e))??;
        Ok((rows, planning_rows, guidance))
    })
    .map_err(|panic_payload| anyhow!("Parallel table threads panicked: {:?}", panic_payload))??;

    let needles = needle_records(session, targets, config)?;

    Ok(GuidanceReport {
        frame_version: frame.version(),
        template: frame.geometry().clone(),
        targets: rows,
        guidance,
        planning: planning_rows,
        needles,
    })
}

/// Load config, registration transform and target lists from disk and
/// compute the guidance report.
///
/// Without `config_path` the default template configuration is used.
pub fn run_guidance(
    config_path: Option<&str>,
    transform_path: &str,
    targets_path: &str,
    planning_path: Option<&str>,
) -> Result<GuidanceReport> {
    let config = match config_path {
        Some(path) => GuidanceConfig::from_file(path)?,
        None => GuidanceConfig::default(),
    };
    let transform = read_transform_txt(transform_path)?;
    let targets = read_fcsv(targets_path)?;
    let planning = planning_path.map(read_fcsv).transpose()?;

    let session = GuidanceSession::new();
    session
        .register(transform, config.template.clone())
        .with_context(|| format!("registration from {} rejected", transform_path))?;

    build_report(&session, &config, &targets, planning.as_ref())
}

#[cfg(test)]
mod entry_tests {
    use super::*;
    use crate::targets::{NeedleType, TargetPoint};
    use crate::utils::test_utils::{registered_session, sample_targets};
    use approx::assert_relative_eq;

    #[test]
    fn test_report_requires_registration() {
        let session = GuidanceSession::new();
        let targets = sample_targets();
        assert!(build_report(&session, &GuidanceConfig::default(), &targets, None).is_err());
    }

    #[test]
    fn test_build_report_with_planning() {
        let session = registered_session();
        let targets = sample_targets();
        let planning = TargetList::from_targets(
            "planning",
            vec![TargetPoint::new(
                "T1",
                Point3::new(0.0, 0.0, 61.0),
                NeedleType::IceRod,
            )],
        )
        .unwrap();

        let report =
            build_report(&session, &GuidanceConfig::default(), &targets, Some(&planning)).unwrap();
        assert_eq!(report.frame_version, 1);
        assert_eq!(report.template.rows, 7);
        assert_eq!(report.targets.len(), 3);
        assert_eq!(report.guidance[1].hole, "F-4");
        assert_relative_eq!(report.guidance[2].depth, -5.0);
        let comparison = report.targets[0].planning.as_ref().unwrap();
        assert!(comparison.hole_matches);
        assert!(!comparison.depth_matches);
        assert_eq!(report.planning.as_ref().unwrap().len(), 1);

        // T1 is an IceRod: 60 + 5 - 20
        let needle = &report.needles[0];
        assert_eq!(needle.tip, [0.0, 0.0, 60.0]);
        assert_relative_eq!(needle.zone_centre.unwrap()[2], 45.0);
        // T3 has no needle type, hence no zone
        assert!(report.needles[2].zone_centre.is_none());
    }

    #[test]
    fn test_run_guidance_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("guidance.toml");
        let transform = dir.path().join("zframe.txt");
        let targets = dir.path().join("intraop.fcsv");
        std::fs::write(&config, "[template]\nrows = 7\ncolumns = 7\nmax_depth = 120.0\n").unwrap();
        std::fs::write(&transform, "1 0 0 0\n0 1 0 0\n0 0 1 10\n0 0 0 1\n").unwrap();
        std::fs::write(
            &targets,
            "# columns = id,x,y,z,ow,ox,oy,oz,vis,sel,lock,label,desc\n\
             n0,12,0,70,0,0,0,1,1,1,0,T1,ICESEED\n",
        )
        .unwrap();

        let report = run_guidance(
            Some(config.to_str().unwrap()),
            transform.to_str().unwrap(),
            targets.to_str().unwrap(),
            None,
        )
        .unwrap();
        assert_eq!(report.targets[0].hole.as_deref(), Some("F-4"));
        assert_eq!(report.targets[0].depth_text.as_deref(), Some("60.0"));
        assert!(report.planning.is_none());

        let json = dir.path().join("report.json");
        crate::io::write_report_json(&json, &report).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(value["targets"][0]["hole"], "F-4");
    }
}
