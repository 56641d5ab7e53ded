//! Molecular docking with AutoDock Vina, one receptor chain at a time.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::pocket::Pocket;

const CHAIN_LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A retained docking pose for one ligand against one receptor chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockedPose {
    pub chain: String,
    pub ligand: String,
    pub pocket: String,
    pub pose_number: u32,
    pub binding_energy: f64,
    /// Ligand-only PDB written for this (ligand, pocket) pair.
    pub pdb_file: PathBuf,
}

/// Split a prepared receptor PDBQT into per-chain receptor files on
/// TER/ENDMDL records. Returns `(chain_name, receptor_path)` pairs.
pub fn split_pdbqt_chains(pdbqt_path: &Path, output_base_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let content = std::fs::read_to_string(pdbqt_path)?;

    let mut chains = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut chain_idx = 0usize;

    let mut save_chain = |lines: &[&str], idx: usize| -> Result<Option<(String, PathBuf)>> {
        if lines.is_empty() {
            return Ok(None);
        }
        let letter = CHAIN_LETTERS[idx % CHAIN_LETTERS.len()] as char;
        let mut name = format!("Chain_{}", letter);
        if idx >= CHAIN_LETTERS.len() {
            name.push_str(&(idx / CHAIN_LETTERS.len()).to_string());
        }
        let chain_dir = output_base_dir.join(&name);
        std::fs::create_dir_all(&chain_dir)?;
        let path = chain_dir.join("receptor.pdbqt");
        std::fs::write(&path, format!("{}\n", lines.join("\n")))?;
        Ok(Some((name, path)))
    };

    for line in content.lines() {
        if line.starts_with("TER") || line.starts_with("ENDMDL") {
            if let Some(chain) = save_chain(&current, chain_idx)? {
                chains.push(chain);
            }
            current.clear();
            chain_idx += 1;
        } else {
            current.push(line);
        }
    }
    if let Some(chain) = save_chain(&current, chain_idx)? {
        chains.push(chain);
    }

    Ok(chains)
}

/// Parse Vina's stdout affinity table. Rows look like
/// `   1       -7.5      0.000      0.000`; the leading integer is the mode
/// number and the second column the binding energy in kcal/mol.
pub fn parse_vina_stdout(stdout: &str) -> Vec<(u32, f64)> {
    let mut modes = Vec::new();
    for line in stdout.lines() {
        let mut parts = line.split_whitespace();
        let (Some(first), Some(second)) = (parts.next(), parts.next()) else {
            continue;
        };
        let (Ok(mode), Ok(energy)) = (first.parse::<u32>(), second.parse::<f64>()) else {
            continue;
        };
        modes.push((mode, energy));
    }
    modes
}

/// Extract the docking score from a docked ligand PDB's
/// `REMARK VINA RESULT:` line. Falls back to -7.0 when the remark is
/// missing or unparseable.
pub fn extract_docking_score(pdb_path: &Path) -> f64 {
    let Ok(content) = std::fs::read_to_string(pdb_path) else {
        return -7.0;
    };
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("REMARK VINA RESULT:") {
            if let Some(score) = rest.split_whitespace().next().and_then(|v| v.parse().ok()) {
                return score;
            }
        }
    }
    -7.0
}

/// Wrapper for AutoDock Vina plus the obabel post-conversion of poses.
pub struct VinaRunner {
    vina_exe: String,
    obabel_exe: String,
    box_size: f64,
    exhaustiveness: u32,
    num_modes: u32,
    poses_per_ligand: usize,
}

impl VinaRunner {
    pub fn new(vina_exe: &str, obabel_exe: &str) -> Self {
        Self {
            vina_exe: vina_exe.to_string(),
            obabel_exe: obabel_exe.to_string(),
            box_size: 25.0,
            exhaustiveness: 8,
            num_modes: 10,
            poses_per_ligand: 3,
        }
    }

    pub fn with_params(mut self, box_size: f64, exhaustiveness: u32, num_modes: u32, poses_per_ligand: usize) -> Self {
        self.box_size = box_size;
        self.exhaustiveness = exhaustiveness;
        self.num_modes = num_modes;
        self.poses_per_ligand = poses_per_ligand;
        self
    }

    /// Dock every ligand against every pocket of every receptor chain.
    /// Keeps poses with binding energy <= 0.0, at most `poses_per_ligand`
    /// best poses per ligand per chain. A failed Vina invocation skips that
    /// (ligand, pocket) pair only.
    pub async fn dock_all(
        &self,
        chains: &[(String, PathBuf)],
        ligand_files: &[PathBuf],
        pockets: &[Pocket],
    ) -> Result<Vec<DockedPose>> {
        let mut retained = Vec::new();

        for (chain_name, receptor) in chains {
            let chain_dir = receptor
                .parent()
                .ok_or_else(|| anyhow::anyhow!("receptor path has no parent"))?;
            let pdbqt_dir = chain_dir.join("docked_pdbqt");
            let pdb_dir = chain_dir.join("docked_pdb");
            tokio::fs::create_dir_all(&pdbqt_dir).await?;
            tokio::fs::create_dir_all(&pdb_dir).await?;

            for ligand in ligand_files {
                let ligand_name = ligand
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "ligand".to_string());

                let mut best_poses: Vec<DockedPose> = Vec::new();

                for pocket in pockets {
                    let out_pdbqt = pdbqt_dir.join(format!("{}_{}_poses.pdbqt", ligand_name, pocket.name));
                    let ligand_pdb = pdb_dir.join(format!("{}_{}_ligand.pdb", ligand_name, pocket.name));

                    let modes = match self
                        .dock_one(receptor, ligand, pocket, &out_pdbqt)
                        .await
                    {
                        Ok(m) => m,
                        Err(e) => {
                            warn!(
                                "Docking {} into {} on {} failed: {}",
                                ligand_name, pocket.name, chain_name, e
                            );
                            continue;
                        }
                    };

                    for (mode, energy) in modes {
                        if energy <= 0.0 {
                            best_poses.push(DockedPose {
                                chain: chain_name.clone(),
                                ligand: ligand_name.clone(),
                                pocket: pocket.name.clone(),
                                pose_number: mode,
                                binding_energy: energy,
                                pdb_file: ligand_pdb.clone(),
                            });
                        }
                    }

                    // Ligand-only PDB for downstream SMILES extraction.
                    // Conversion failure leaves the pose entry pointing at a
                    // missing file, which the extractor treats as a skip.
                    if out_pdbqt.exists() {
                        self.convert_to_pdb(&out_pdbqt, &ligand_pdb).await;
                    }
                }

                if !best_poses.is_empty() {
                    best_poses.sort_by(|a, b| {
                        a.binding_energy
                            .partial_cmp(&b.binding_energy)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    best_poses.truncate(self.poses_per_ligand);
                    retained.extend(best_poses);
                }
            }
        }

        info!("Docking retained {} poses", retained.len());
        Ok(retained)
    }

    async fn dock_one(
        &self,
        receptor: &Path,
        ligand: &Path,
        pocket: &Pocket,
        out_pdbqt: &Path,
    ) -> Result<Vec<(u32, f64)>> {
        debug!("Docking {:?} into {} at ({:.2}, {:.2}, {:.2})",
            ligand, pocket.name, pocket.center_x, pocket.center_y, pocket.center_z);

        let output = Command::new(&self.vina_exe)
            .arg("--receptor")
            .arg(receptor)
            .arg("--ligand")
            .arg(ligand)
            .arg("--center_x")
            .arg(pocket.center_x.to_string())
            .arg("--center_y")
            .arg(pocket.center_y.to_string())
            .arg("--center_z")
            .arg(pocket.center_z.to_string())
            .arg("--size_x")
            .arg(self.box_size.to_string())
            .arg("--size_y")
            .arg(self.box_size.to_string())
            .arg("--size_z")
            .arg(self.box_size.to_string())
            .arg("--exhaustiveness")
            .arg(self.exhaustiveness.to_string())
            .arg("--num_modes")
            .arg(self.num_modes.to_string())
            .arg("--out")
            .arg(out_pdbqt)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("vina failed: {}", stderr);
        }

        Ok(parse_vina_stdout(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn convert_to_pdb(&self, pdbqt: &Path, pdb: &Path) {
        let result = Command::new(&self.obabel_exe)
            .arg(pdbqt)
            .arg("-O")
            .arg(pdb)
            .arg("-h")
            .output()
            .await;
        if let Err(e) = result {
            warn!("obabel pose conversion failed for {:?}: {}", pdbqt, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_single_chain() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("receptor.pdbqt");
        std::fs::write(&input, "ATOM      1\nATOM      2\nTER\n").unwrap();

        let chains = split_pdbqt_chains(&input, dir.path()).unwrap();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].0, "Chain_A");
        let written = std::fs::read_to_string(&chains[0].1).unwrap();
        assert!(written.contains("ATOM      1"));
        assert!(!written.contains("TER"));
    }

    #[test]
    fn test_split_multiple_chains() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("receptor.pdbqt");
        std::fs::write(
            &input,
            "ATOM      1\nTER\nATOM      2\nENDMDL\nATOM      3\n",
        )
        .unwrap();

        let chains = split_pdbqt_chains(&input, dir.path()).unwrap();
        let names: Vec<_> = chains.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Chain_A", "Chain_B", "Chain_C"]);
    }

    #[test]
    fn test_split_skips_empty_segments() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("receptor.pdbqt");
        std::fs::write(&input, "TER\nATOM      1\nTER\n").unwrap();

        let chains = split_pdbqt_chains(&input, dir.path()).unwrap();
        // The leading TER closes an empty segment; only one chain is saved,
        // but it takes the second letter since the index still advanced.
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].0, "Chain_B");
    }

    #[test]
    fn test_parse_vina_stdout_table() {
        let stdout = "\
mode |   affinity | dist from best mode
-----+------------+---------------------
   1       -7.5      0.000      0.000
   2       -6.9      1.722      2.510
   3        0.4      3.001      5.102
";
        let modes = parse_vina_stdout(stdout);
        assert_eq!(modes, vec![(1, -7.5), (2, -6.9), (3, 0.4)]);
    }

    #[test]
    fn test_extract_docking_score_from_remark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pose.pdb");
        std::fs::write(
            &path,
            "REMARK VINA RESULT:    -8.2      0.000      0.000\nATOM      1\n",
        )
        .unwrap();
        assert_eq!(extract_docking_score(&path), -8.2);
    }

    #[test]
    fn test_extract_docking_score_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pose.pdb");
        std::fs::write(&path, "ATOM      1\n").unwrap();
        assert_eq!(extract_docking_score(&path), -7.0);

        // Missing file also falls back
        assert_eq!(extract_docking_score(&dir.path().join("absent.pdb")), -7.0);
    }
}
