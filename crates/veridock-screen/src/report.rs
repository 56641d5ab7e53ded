//! Final tabular report: one CSV row per docked compound with its decision.

use anyhow::Context;
use std::path::Path;
use tracing::info;

use crate::admet::{CompoundRecord, Decision};
use crate::Result;

const COLUMNS: [&str; 11] = [
    "Filename",
    "Chain",
    "Docking Score",
    "Final Decision",
    "SA Score",
    "QED",
    "hERG",
    "Ames",
    "CYP3A4 Inhibition",
    "CYP2D6 Inhibition",
    "Developability Score",
];

/// Write the screening report. Row order follows the input slice; callers
/// rank by docking score before handing the rows over.
pub fn write_report(path: &Path, rows: &[(CompoundRecord, Decision)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating report file {}", path.display()))?;
    writer.write_record(COLUMNS)?;

    for (record, decision) in rows {
        writer.write_record([
            record.filename.as_str(),
            record.chain.as_str(),
            &format!("{:.2}", record.docking_score),
            decision.label.as_str(),
            &record.physchem.sa_score.display(),
            &record.toxicity.qed.display(),
            &record.toxicity.herg.display(),
            &record.toxicity.ames.display(),
            &record.toxicity.cyp3a4_inhibition.display(),
            &record.toxicity.cyp2d6_inhibition.display(),
            &decision.score.to_string(),
        ])?;
    }

    writer.flush()?;
    info!(rows = rows.len(), path = %path.display(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admet::decide;
    use crate::properties::PropertyValue;
    use tempfile::tempdir;

    fn sample_row() -> (CompoundRecord, Decision) {
        let mut record = CompoundRecord::new("mol1_pocket2_ligand.pdb", "Chain_A", -8.456);
        record.physchem.lipinski = PropertyValue::Categorical("Pass".to_string());
        record.physchem.sa_score = PropertyValue::Numeric(3.25);
        record.toxicity.qed = PropertyValue::Numeric(0.812);
        record.toxicity.herg = PropertyValue::Numeric(0.12);
        record.toxicity.ames = PropertyValue::Categorical("Negative".to_string());
        let decision = decide(&record);
        (record, decision)
    }

    #[test]
    fn test_report_header_and_rounding() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("screening_report.csv");
        write_report(&path, &[sample_row()]).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let mut lines = body.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Filename,Chain,Docking Score,Final Decision,SA Score,QED,hERG,\
             Ames,CYP3A4 Inhibition,CYP2D6 Inhibition,Developability Score"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("mol1_pocket2_ligand.pdb,Chain_A,-8.46,ACCEPT,"));
        assert!(row.contains("3.25"));
        assert!(row.contains("0.81"));
        assert!(row.ends_with(",100"));
    }

    #[test]
    fn test_absent_properties_leave_blank_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let record = CompoundRecord::new("orphan_ligand.pdb", "Unknown", -6.0);
        let decision = decide(&record);
        write_report(&path, &[(record, decision)]).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let row = body.lines().nth(1).unwrap();
        // SA, QED, hERG, Ames, CYP columns all empty
        assert!(row.contains("ACCEPT,,,,,,"));
    }

    #[test]
    fn test_empty_rows_still_write_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("report.csv");
        write_report(&path, &[]).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body.lines().count(), 1);
    }
}
