//! Binding pocket prediction: P2Rank and Fpocket, merged into one table.
//!
//! Each tool degrades independently. A failed run contributes zero rows and
//! a diagnostic; the merged table carries whatever the other tool found.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// One predicted binding pocket, from either prediction method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pocket {
    pub name: String,
    pub rank: u32,
    pub score: f64,
    pub probability: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub center_z: f64,
    pub method: String,
}

/// Runs both pocket predictors and merges their output.
pub struct PocketPredictor {
    prank_exe: String,
    fpocket_exe: String,
    output_dir: PathBuf,
}

impl PocketPredictor {
    pub fn new<P: AsRef<Path>>(prank_exe: &str, fpocket_exe: &str, output_dir: P) -> Self {
        Self {
            prank_exe: prank_exe.to_string(),
            fpocket_exe: fpocket_exe.to_string(),
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// Run both predictors on a PDB file, merge the results, and write the
    /// combined table to `combined_pockets.csv` in the output directory.
    pub async fn predict(&self, pdb_path: &Path) -> Result<Vec<Pocket>> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let mut pockets = Vec::new();

        match self.run_p2rank(pdb_path).await {
            Ok(mut found) => {
                info!("P2Rank found {} pockets", found.len());
                pockets.append(&mut found);
            }
            Err(e) => warn!("P2Rank failed, continuing with Fpocket only: {}", e),
        }

        match self.run_fpocket(pdb_path).await {
            Ok(mut found) => {
                info!("Fpocket found {} pockets", found.len());
                pockets.append(&mut found);
            }
            Err(e) => warn!("Fpocket failed, continuing with P2Rank only: {}", e),
        }

        if pockets.is_empty() {
            warn!("No pockets predicted for {:?}", pdb_path);
        }

        let csv_path = self.output_dir.join("combined_pockets.csv");
        write_pocket_csv(&csv_path, &pockets)?;
        debug!("Combined pocket table written to {:?}", csv_path);

        Ok(pockets)
    }

    async fn run_p2rank(&self, pdb_path: &Path) -> Result<Vec<Pocket>> {
        let output = Command::new(&self.prank_exe)
            .arg("predict")
            .arg("-f")
            .arg(pdb_path)
            .arg("-o")
            .arg(&self.output_dir)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("prank exited with error: {}", stderr);
        }

        // P2Rank writes <input>_predictions.csv into the output directory.
        let mut predictions_csv = None;
        let mut entries = tokio::fs::read_dir(&self.output_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with("_predictions.csv") {
                predictions_csv = Some(entry.path());
                break;
            }
        }

        let csv_path = predictions_csv
            .ok_or_else(|| anyhow::anyhow!("P2Rank predictions CSV not found"))?;
        parse_p2rank_csv(&csv_path)
    }

    async fn run_fpocket(&self, pdb_path: &Path) -> Result<Vec<Pocket>> {
        let output = Command::new(&self.fpocket_exe)
            .arg("-f")
            .arg(pdb_path)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("fpocket exited with error: {}", stderr);
        }

        // fpocket creates a directory named <stem>_out next to the input
        let stem = pdb_path
            .file_stem()
            .ok_or_else(|| anyhow::anyhow!("input path has no file stem"))?
            .to_string_lossy();
        let out_dir = pdb_path.with_file_name(format!("{}_out", stem));

        if !out_dir.exists() {
            anyhow::bail!("fpocket output directory not found: {:?}", out_dir);
        }

        let info_file = out_dir.join(format!("{}_info.txt", stem));
        parse_fpocket_output(&out_dir, &info_file)
    }
}

/// Parse the P2Rank predictions CSV. Headers and values carry padding
/// whitespace, so every field is trimmed. Pocket names are prefixed with
/// `p2rank_` so they stay unique after the Fpocket merge.
pub fn parse_p2rank_csv(path: &Path) -> Result<Vec<Pocket>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let index_of = |col: &str| headers.iter().position(|h| h == col);

    let name_idx = index_of("name")
        .ok_or_else(|| anyhow::anyhow!("P2Rank CSV missing 'name' column"))?;
    let rank_idx = index_of("rank");
    let score_idx = index_of("score");
    let prob_idx = index_of("probability");
    let cx_idx = index_of("center_x")
        .ok_or_else(|| anyhow::anyhow!("P2Rank CSV missing 'center_x' column"))?;
    let cy_idx = index_of("center_y")
        .ok_or_else(|| anyhow::anyhow!("P2Rank CSV missing 'center_y' column"))?;
    let cz_idx = index_of("center_z")
        .ok_or_else(|| anyhow::anyhow!("P2Rank CSV missing 'center_z' column"))?;

    let field_f64 = |record: &csv::StringRecord, idx: Option<usize>| -> f64 {
        idx.and_then(|i| record.get(i))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0)
    };

    let mut pockets = Vec::new();
    for record in reader.records() {
        let record = record?;
        let raw_name = record.get(name_idx).unwrap_or("").to_string();
        let name = if raw_name.contains("pocket") {
            raw_name.replace("pocket", "p2rank_pocket")
        } else {
            format!("p2rank_{}", raw_name)
        };

        pockets.push(Pocket {
            name,
            rank: field_f64(&record, rank_idx) as u32,
            score: field_f64(&record, score_idx),
            probability: field_f64(&record, prob_idx),
            center_x: field_f64(&record, Some(cx_idx)),
            center_y: field_f64(&record, Some(cy_idx)),
            center_z: field_f64(&record, Some(cz_idx)),
            method: "P2Rank".to_string(),
        });
    }

    Ok(pockets)
}

/// Parse fpocket output: pocket centers from the per-pocket atom files,
/// scores from the `_info.txt` report, merged by pocket number.
pub fn parse_fpocket_output(out_dir: &Path, info_file: &Path) -> Result<Vec<Pocket>> {
    let pockets_dir = out_dir.join("pockets");
    let search_dir = if pockets_dir.exists() {
        pockets_dir
    } else {
        out_dir.to_path_buf()
    };

    let mut centers: Vec<(u32, [f64; 3])> = Vec::new();
    for entry in std::fs::read_dir(&search_dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(num) = pocket_number(&file_name) else {
            continue;
        };
        if let Some(center) = pocket_center(&entry.path())? {
            centers.push((num, center));
        }
    }
    centers.sort_by_key(|(num, _)| *num);

    let scores = parse_fpocket_info(info_file)?;

    let mut pockets = Vec::new();
    for (num, center) in centers {
        let (score, probability) = scores
            .iter()
            .find(|(n, _, _)| *n == num)
            .map(|(_, s, d)| (*s, *d))
            .unwrap_or((0.0, 0.0));

        pockets.push(Pocket {
            name: format!("fpocket_pocket{}", num),
            rank: num,
            score,
            probability,
            center_x: center[0],
            center_y: center[1],
            center_z: center[2],
            method: "Fpocket".to_string(),
        });
    }

    Ok(pockets)
}

/// Pocket number from a `pocket<N>_atm.pdb` file name.
fn pocket_number(file_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix("pocket")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if !rest[digits.len()..].starts_with("_atm") {
        return None;
    }
    digits.parse().ok()
}

/// Geometric center of the ATOM/HETATM records in a pocket atom file.
/// PDB coordinates live in fixed columns 31-54.
fn pocket_center(path: &Path) -> Result<Option<[f64; 3]>> {
    let content = std::fs::read_to_string(path)?;
    let (mut x_sum, mut y_sum, mut z_sum) = (0.0, 0.0, 0.0);
    let mut count = 0usize;

    for line in content.lines() {
        if !(line.starts_with("ATOM") || line.starts_with("HETATM")) || line.len() < 54 {
            continue;
        }
        let parse = |range: std::ops::Range<usize>| line[range].trim().parse::<f64>();
        match (parse(30..38), parse(38..46), parse(46..54)) {
            (Ok(x), Ok(y), Ok(z)) => {
                x_sum += x;
                y_sum += y;
                z_sum += z;
                count += 1;
            }
            _ => continue,
        }
    }

    if count == 0 {
        return Ok(None);
    }
    let n = count as f64;
    Ok(Some([x_sum / n, y_sum / n, z_sum / n]))
}

/// Parse `(pocket_number, score, druggability)` triples from fpocket's
/// `_info.txt` report. Blocks look like:
///
/// ```text
/// Pocket 1 :
///     Score :              0.345
///     Druggability Score : 0.801
/// ```
fn parse_fpocket_info(path: &Path) -> Result<Vec<(u32, f64, f64)>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Ok(Vec::new()),
    };

    let mut results = Vec::new();
    let mut current: Option<(u32, f64, f64)> = None;

    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Pocket ") {
            if let Some(num_str) = rest.strip_suffix(":").map(str::trim) {
                if let Ok(num) = num_str.parse::<u32>() {
                    if let Some(done) = current.take() {
                        results.push(done);
                    }
                    current = Some((num, 0.0, 0.0));
                    continue;
                }
            }
        }

        if let Some((_, score, druggability)) = current.as_mut() {
            if let Some(value) = line.strip_prefix("Druggability Score :") {
                if let Ok(v) = value.trim().parse() {
                    *druggability = v;
                }
            } else if let Some(value) = line.strip_prefix("Score :") {
                if let Ok(v) = value.trim().parse() {
                    *score = v;
                }
            }
        }
    }

    if let Some(done) = current.take() {
        results.push(done);
    }

    Ok(results)
}

/// Write the merged pocket table in the column order the docking stage reads.
pub fn write_pocket_csv(path: &Path, pockets: &[Pocket]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "name",
        "rank",
        "score",
        "probability",
        "center_x",
        "center_y",
        "center_z",
        "method",
    ])?;

    for p in pockets {
        writer.write_record([
            p.name.clone(),
            p.rank.to_string(),
            format!("{:.4}", p.score),
            format!("{:.4}", p.probability),
            format!("{:.3}", p.center_x),
            format!("{:.3}", p.center_y),
            format!("{:.3}", p.center_z),
            p.method.clone(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_atom_line(x: f64, y: f64, z: f64) -> String {
        format!(
            "ATOM      1  CA  ALA A   1    {:8.3}{:8.3}{:8.3}  1.00  0.00           C",
            x, y, z
        )
    }

    #[test]
    fn test_pocket_number_parsing() {
        assert_eq!(pocket_number("pocket1_atm.pdb"), Some(1));
        assert_eq!(pocket_number("pocket12_atm.pdb"), Some(12));
        assert_eq!(pocket_number("pocket1_vert.pqr"), None);
        assert_eq!(pocket_number("receptor.pdb"), None);
    }

    #[test]
    fn test_pocket_center_is_coordinate_mean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pocket1_atm.pdb");
        let content = format!(
            "{}\n{}\nTER\n",
            fake_atom_line(0.0, 0.0, 0.0),
            fake_atom_line(2.0, 4.0, 6.0)
        );
        std::fs::write(&path, content).unwrap();

        let center = pocket_center(&path).unwrap().unwrap();
        assert_eq!(center, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_pocket_center_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pocket1_atm.pdb");
        std::fs::write(&path, "HEADER\nEND\n").unwrap();
        assert!(pocket_center(&path).unwrap().is_none());
    }

    #[test]
    fn test_parse_fpocket_info_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protein_info.txt");
        std::fs::write(
            &path,
            "Pocket 1 :\n\tScore : \t0.345\n\tDruggability Score : \t0.801\n\n\
             Pocket 2 :\n\tScore : \t-0.010\n\tDruggability Score : \t0.100\n",
        )
        .unwrap();

        let scores = parse_fpocket_info(&path).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], (1, 0.345, 0.801));
        assert_eq!(scores[1], (2, -0.010, 0.100));
    }

    #[test]
    fn test_parse_fpocket_output_merges_centers_and_scores() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("protein_out");
        let pockets_dir = out_dir.join("pockets");
        std::fs::create_dir_all(&pockets_dir).unwrap();

        std::fs::write(
            pockets_dir.join("pocket1_atm.pdb"),
            format!("{}\n", fake_atom_line(10.0, 20.0, 30.0)),
        )
        .unwrap();
        let info = out_dir.join("protein_info.txt");
        std::fs::write(
            &info,
            "Pocket 1 :\n\tScore : 0.5\n\tDruggability Score : 0.9\n",
        )
        .unwrap();

        let pockets = parse_fpocket_output(&out_dir, &info).unwrap();
        assert_eq!(pockets.len(), 1);
        assert_eq!(pockets[0].name, "fpocket_pocket1");
        assert_eq!(pockets[0].method, "Fpocket");
        assert_eq!(pockets[0].score, 0.5);
        assert_eq!(pockets[0].probability, 0.9);
        assert!((pockets[0].center_x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_p2rank_csv_prefixes_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protein_predictions.csv");
        std::fs::write(
            &path,
            "name, rank, score, probability, center_x, center_y, center_z\n\
             pocket1, 1, 15.2, 0.87, 1.5, -2.0, 3.25\n\
             pocket2, 2, 4.1, 0.31, 0.0, 0.0, 1.0\n",
        )
        .unwrap();

        let pockets = parse_p2rank_csv(&path).unwrap();
        assert_eq!(pockets.len(), 2);
        assert_eq!(pockets[0].name, "p2rank_pocket1");
        assert_eq!(pockets[0].rank, 1);
        assert_eq!(pockets[0].probability, 0.87);
        assert_eq!(pockets[1].center_z, 1.0);
        assert_eq!(pockets[1].method, "P2Rank");
    }

    #[test]
    fn test_write_pocket_csv_roundtrip_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combined_pockets.csv");
        let pockets = vec![Pocket {
            name: "fpocket_pocket3".to_string(),
            rank: 3,
            score: 0.25,
            probability: 0.6,
            center_x: 1.0,
            center_y: 2.0,
            center_z: 3.0,
            method: "Fpocket".to_string(),
        }];

        write_pocket_csv(&path, &pockets).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("name,rank,score,probability,center_x,center_y,center_z,method"));
        assert!(content.contains("fpocket_pocket3"));
    }
}
