//! Receptor preparation for docking (Meeko-style CLI wrapper).

use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Wrapper for the receptor preparation tool. Produces a PDBQT with
/// Gasteiger charges, keeping altloc A for disordered residues.
pub struct ReceptorPrep {
    executable: String,
    output_dir: PathBuf,
}

impl ReceptorPrep {
    pub fn new<P: AsRef<Path>>(executable: &str, output_dir: P) -> Self {
        Self {
            executable: executable.to_string(),
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// Prepare a receptor PDB for docking. Returns the path to the PDBQT.
    pub async fn prepare(&self, pdb_path: &Path) -> Result<PathBuf> {
        info!("Preparing receptor {:?}", pdb_path);
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let output_base = self.output_dir.join("prepared_protein");

        let output = Command::new(&self.executable)
            .arg("-i")
            .arg(pdb_path)
            .arg("-o")
            .arg(&output_base)
            .arg("-p")
            .arg("--charge_model")
            .arg("gasteiger")
            .arg("--default_altloc")
            .arg("A")
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Receptor preparation failed: {}", stderr);
        }

        let pdbqt_path = output_base.with_extension("pdbqt");
        if !pdbqt_path.exists() {
            anyhow::bail!("PDBQT file not generated at {:?}", pdbqt_path);
        }

        debug!("Receptor prepared at {:?}", pdbqt_path);
        Ok(pdbqt_path)
    }
}
