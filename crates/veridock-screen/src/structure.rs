//! Protein structure intake: UniProt search, PDB cross-references, and
//! structure download from RCSB or AlphaFold.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use veridock_common::sandbox::SandboxClient;

/// A resolved structure ready for preparation.
#[derive(Debug, Clone)]
pub struct ResolvedStructure {
    pub structure_id: String,
    pub path: PathBuf,
}

/// Client for locating and fetching protein structures.
pub struct StructureFetcher {
    client: SandboxClient,
    cache_dir: PathBuf,
}

#[derive(Deserialize)]
struct UniProtSearchResponse {
    #[serde(default)]
    results: Vec<UniProtEntry>,
}

#[derive(Deserialize)]
struct UniProtEntry {
    #[serde(rename = "primaryAccession")]
    primary_accession: String,
}

#[derive(Deserialize)]
struct UniProtRecord {
    #[serde(rename = "uniProtKBCrossReferences", default)]
    cross_references: Vec<UniProtCrossRef>,
}

#[derive(Deserialize)]
struct UniProtCrossRef {
    database: String,
    id: String,
}

#[derive(Deserialize)]
struct RcsbEntry {
    #[serde(default)]
    exptl: Vec<RcsbExptl>,
    #[serde(rename = "rcsb_entry_info")]
    entry_info: Option<RcsbEntryInfo>,
}

#[derive(Deserialize)]
struct RcsbExptl {
    #[serde(default)]
    method: String,
}

#[derive(Deserialize)]
struct RcsbEntryInfo {
    resolution_combined: Option<Vec<f64>>,
}

impl StructureFetcher {
    pub fn new<P: AsRef<Path>>(client: SandboxClient, cache_dir: P) -> Self {
        Self {
            client,
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    /// Search UniProt for reviewed human entries matching a protein name.
    /// Returns up to `limit` accession IDs; an empty list on service failure.
    pub async fn search_uniprot(&self, protein_name: &str, limit: usize) -> Vec<String> {
        let url = format!(
            "https://rest.uniprot.org/uniprotkb/search?query=(protein_name:{})+AND+(organism_id:9606)+AND+(reviewed:true)&format=json&size={}",
            protein_name, limit
        );

        let request = match self.client.get(&url) {
            Ok(r) => r,
            Err(e) => {
                warn!("UniProt search blocked: {}", e);
                return Vec::new();
            }
        };

        match request.send().await {
            Ok(resp) => match resp.json::<UniProtSearchResponse>().await {
                Ok(body) => body
                    .results
                    .into_iter()
                    .map(|r| r.primary_accession)
                    .collect(),
                Err(e) => {
                    warn!("UniProt search returned malformed JSON: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!("UniProt search error: {}", e);
                Vec::new()
            }
        }
    }

    /// Get all PDB IDs cross-referenced by a UniProt entry.
    pub async fn pdb_ids_for(&self, uniprot_id: &str) -> Result<Vec<String>> {
        let url = format!("https://rest.uniprot.org/uniprotkb/{}.json", uniprot_id);
        let resp = self.client.get(&url)?.send().await?.error_for_status()?;
        let record: UniProtRecord = resp.json().await?;

        Ok(record
            .cross_references
            .into_iter()
            .filter(|r| r.database == "PDB")
            .map(|r| r.id)
            .collect())
    }

    /// X-ray resolution of a PDB entry from the RCSB data API.
    /// Returns None for non-X-ray entries (NMR, cryo-EM) or missing data.
    pub async fn resolution_of(&self, pdb_id: &str) -> Option<f64> {
        let url = format!("https://data.rcsb.org/rest/v1/core/entry/{}", pdb_id);
        let resp = self.client.get(&url).ok()?.send().await.ok()?;
        let entry: RcsbEntry = resp.json().await.ok()?;

        let method = entry.exptl.first().map(|e| e.method.to_uppercase())?;
        if !method.contains("X-RAY") {
            return None;
        }

        entry
            .entry_info
            .and_then(|info| info.resolution_combined)
            .and_then(|r| r.first().copied())
    }

    /// Pick the highest-resolution X-ray structure among a UniProt entry's
    /// PDB cross-references and download it.
    pub async fn fetch_best_structure(&self, uniprot_id: &str) -> Result<ResolvedStructure> {
        let pdb_ids = self.pdb_ids_for(uniprot_id).await.unwrap_or_default();

        let mut best: Option<(String, f64)> = None;
        for id in &pdb_ids {
            if let Some(res) = self.resolution_of(id).await {
                if best.as_ref().map_or(true, |(_, r)| res < *r) {
                    best = Some((id.clone(), res));
                }
            }
        }

        match best {
            Some((pdb_id, res)) => {
                info!("Selected {} at {:.2} A resolution for {}", pdb_id, res, uniprot_id);
                let path = self.fetch_pdb(&pdb_id).await?;
                Ok(ResolvedStructure {
                    structure_id: pdb_id,
                    path,
                })
            }
            None => {
                warn!(
                    "No X-ray structure for {}. Falling back to AlphaFold model",
                    uniprot_id
                );
                let path = self.fetch_alphafold(uniprot_id).await?;
                Ok(ResolvedStructure {
                    structure_id: format!("AF-{}", uniprot_id),
                    path,
                })
            }
        }
    }

    /// Fetch a PDB file by its ID, using the local cache when present.
    pub async fn fetch_pdb(&self, pdb_id: &str) -> Result<PathBuf> {
        let file_name = format!("{}.pdb", pdb_id.to_lowercase());
        let file_path = self.cache_dir.join(&file_name);

        if file_path.exists() {
            debug!("PDB {} found in cache", pdb_id);
            return Ok(file_path);
        }

        info!("Fetching PDB {} from RCSB", pdb_id);
        let url = format!("https://files.rcsb.org/download/{}", file_name);
        let response = self.client.get(&url)?.send().await?.error_for_status()?;
        let content = response.bytes().await?;

        fs::create_dir_all(&self.cache_dir).await?;
        fs::write(&file_path, content).await?;

        Ok(file_path)
    }

    /// Fetch an AlphaFold structure by UniProt ID.
    pub async fn fetch_alphafold(&self, uniprot_id: &str) -> Result<PathBuf> {
        let file_name = format!("AF-{}-F1-model_v4.pdb", uniprot_id);
        let file_path = self.cache_dir.join(&file_name);

        if file_path.exists() {
            debug!("AlphaFold structure for {} found in cache", uniprot_id);
            return Ok(file_path);
        }

        info!("Fetching AlphaFold structure for {} from EBI", uniprot_id);
        let url = format!("https://alphafold.ebi.ac.uk/files/{}", file_name);
        let response = self.client.get(&url)?.send().await?.error_for_status()?;
        let content = response.bytes().await?;

        fs::create_dir_all(&self.cache_dir).await?;
        fs::write(&file_path, content).await?;

        Ok(file_path)
    }
}
