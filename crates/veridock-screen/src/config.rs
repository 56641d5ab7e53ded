//! Configuration loading for Veridock.
//! Reads veridock.toml from the current directory or path in VERIDOCK_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub directories: DirectoriesConfig,
    #[serde(default)]
    pub docking: DockingParams,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub predictors: PredictorsConfig,
}

/// Paths to the external binaries the pipeline shells out to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_vina")]
    pub vina: String,
    #[serde(default = "default_obabel")]
    pub obabel: String,
    #[serde(default = "default_fpocket")]
    pub fpocket: String,
    #[serde(default = "default_prank")]
    pub prank: String,
    #[serde(default = "default_receptor_prep")]
    pub receptor_prep: String,
}

fn default_vina() -> String { "vina".to_string() }
fn default_obabel() -> String { "obabel".to_string() }
fn default_fpocket() -> String { "fpocket".to_string() }
fn default_prank() -> String { "prank".to_string() }
fn default_receptor_prep() -> String { "mk_prepare_receptor.py".to_string() }

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            vina: default_vina(),
            obabel: default_obabel(),
            fpocket: default_fpocket(),
            prank: default_prank(),
            receptor_prep: default_receptor_prep(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoriesConfig {
    #[serde(default = "default_proteins_dir")]
    pub proteins: String,
    #[serde(default = "default_ligand_dir")]
    pub ligands: String,
    #[serde(default = "default_prepared_dir")]
    pub prepared: String,
    #[serde(default = "default_pockets_dir")]
    pub pockets: String,
    #[serde(default = "default_docking_dir")]
    pub docking_results: String,
    #[serde(default = "default_results_dir")]
    pub results: String,
}

fn default_proteins_dir() -> String { "proteins".to_string() }
fn default_ligand_dir() -> String { "ligands".to_string() }
fn default_prepared_dir() -> String { "prepared_protein".to_string() }
fn default_pockets_dir() -> String { "pocket_results".to_string() }
fn default_docking_dir() -> String { "docking_results".to_string() }
fn default_results_dir() -> String { "results".to_string() }

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            proteins: default_proteins_dir(),
            ligands: default_ligand_dir(),
            prepared: default_prepared_dir(),
            pockets: default_pockets_dir(),
            docking_results: default_docking_dir(),
            results: default_results_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockingParams {
    #[serde(default = "default_box_size")]
    pub box_size: f64,
    #[serde(default = "default_exhaustiveness")]
    pub exhaustiveness: u32,
    #[serde(default = "default_num_modes")]
    pub num_modes: u32,
    #[serde(default = "default_poses_per_ligand")]
    pub poses_per_ligand: usize,
}

fn default_box_size() -> f64 { 25.0 }
fn default_exhaustiveness() -> u32 { 8 }
fn default_num_modes() -> u32 { 10 }
fn default_poses_per_ligand() -> usize { 3 }

impl Default for DockingParams {
    fn default() -> Self {
        Self {
            box_size: default_box_size(),
            exhaustiveness: default_exhaustiveness(),
            num_modes: default_num_modes(),
            poses_per_ligand: default_poses_per_ligand(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_converter_timeout")]
    pub converter_timeout_secs: u64,
}

fn default_converter_timeout() -> u64 { 10 }

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            converter_timeout_secs: default_converter_timeout(),
        }
    }
}

/// Endpoints of the local property-prediction services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorsConfig {
    #[serde(default = "default_physchem_endpoint")]
    pub physchem_endpoint: String,
    #[serde(default = "default_toxicity_endpoint")]
    pub toxicity_endpoint: String,
}

fn default_physchem_endpoint() -> String {
    "http://127.0.0.1:8001/properties".to_string()
}
fn default_toxicity_endpoint() -> String {
    "http://127.0.0.1:8002/admet".to_string()
}

impl Default for PredictorsConfig {
    fn default() -> Self {
        Self {
            physchem_endpoint: default_physchem_endpoint(),
            toxicity_endpoint: default_toxicity_endpoint(),
        }
    }
}

impl Config {
    /// Load configuration from veridock.toml.
    /// Checks VERIDOCK_CONFIG env var first, then current directory.
    /// A missing file yields the built-in defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("VERIDOCK_CONFIG")
            .unwrap_or_else(|_| "veridock.toml".to_string());

        if !Path::new(&path).exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
