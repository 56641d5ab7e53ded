//! End-to-end screening orchestration. Each stage consumes and extends an
//! explicit `ScreeningContext`; nothing is shared mutably across compounds.

use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::admet::{decide, CompoundRecord, Decision};
use crate::config::Config;
use crate::docking::{extract_docking_score, split_pdbqt_chains, DockedPose, VinaRunner};
use crate::pocket::{Pocket, PocketPredictor};
use crate::prep::ReceptorPrep;
use crate::properties::{predict_batch, PropertyPredictor, ToxicityPredictor};
use crate::report::write_report;
use crate::smiles::{classify_content, duplicate_groups, SmilesExtractor};
use crate::structure::{ResolvedStructure, StructureFetcher};
use crate::Result;

/// Accumulated products of the upstream (structure-to-docking) stages.
#[derive(Debug, Default)]
pub struct ScreeningContext {
    pub structure: Option<ResolvedStructure>,
    pub receptor_pdbqt: Option<PathBuf>,
    pub chains: Vec<(String, PathBuf)>,
    pub pockets: Vec<Pocket>,
    pub poses: Vec<DockedPose>,
}

/// One docked ligand file found at intake.
#[derive(Debug, Clone)]
pub struct DockedLigand {
    pub path: PathBuf,
    pub chain: String,
    pub docking_score: f64,
}

pub struct ScreeningPipeline {
    config: Config,
}

impl ScreeningPipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Structure fetch through docking: resolve the best structure for a
    /// UniProt accession, prepare it, predict pockets, split chains, and
    /// dock every ligand in the configured ligand directory.
    pub async fn run_docking(
        &self,
        fetcher: &StructureFetcher,
        uniprot_id: &str,
    ) -> Result<ScreeningContext> {
        let mut ctx = ScreeningContext::default();

        let structure = fetcher.fetch_best_structure(uniprot_id).await?;
        info!(id = %structure.structure_id, "resolved structure");

        let prep = ReceptorPrep::new(
            &self.config.tools.receptor_prep,
            &self.config.directories.prepared,
        );
        let receptor_pdbqt = prep.prepare(&structure.path).await?;

        let predictor = PocketPredictor::new(
            &self.config.tools.prank,
            &self.config.tools.fpocket,
            &self.config.directories.pockets,
        );
        ctx.pockets = predictor.predict(&structure.path).await?;
        if ctx.pockets.is_empty() {
            warn!("no pockets predicted; docking stage will produce nothing");
        }

        ctx.chains = split_pdbqt_chains(
            &receptor_pdbqt,
            Path::new(&self.config.directories.docking_results),
        )?;

        let ligands = self.collect_ligand_inputs()?;
        info!(
            chains = ctx.chains.len(),
            ligands = ligands.len(),
            pockets = ctx.pockets.len(),
            "starting docking"
        );

        let runner = VinaRunner::new(&self.config.tools.vina, &self.config.tools.obabel)
            .with_params(
                self.config.docking.box_size,
                self.config.docking.exhaustiveness,
                self.config.docking.num_modes,
                self.config.docking.poses_per_ligand,
            );
        ctx.poses = runner.dock_all(&ctx.chains, &ligands, &ctx.pockets).await?;

        ctx.structure = Some(structure);
        ctx.receptor_pdbqt = Some(receptor_pdbqt);
        Ok(ctx)
    }

    /// PDBQT ligand inputs from the configured ligand directory.
    fn collect_ligand_inputs(&self) -> Result<Vec<PathBuf>> {
        let dir = Path::new(&self.config.directories.ligands);
        let mut ligands = Vec::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("reading ligand directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "pdbqt") {
                ligands.push(path);
            }
        }
        ligands.sort();
        Ok(ligands)
    }

    /// Intake for the analysis stages: every `*_ligand.pdb` under a
    /// `docked_pdb` directory in the docking-results tree. Fatal when the
    /// tree yields nothing.
    pub fn collect_docked_ligands(&self) -> Result<Vec<DockedLigand>> {
        let root = Path::new(&self.config.directories.docking_results);
        let mut found = Vec::new();
        if root.is_dir() {
            collect_ligands_recursive(root, &mut found)?;
        }

        if found.is_empty() {
            bail!(
                "no results: no docked ligand files under {}",
                root.display()
            );
        }

        found.sort_by(|a, b| {
            a.docking_score
                .partial_cmp(&b.docking_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        info!(count = found.len(), "intake found docked ligands");
        Ok(found)
    }

    /// Intake plus per-ligand structure perception: ligand class tags and
    /// a SMILES for each docked file that yields one.
    pub async fn build_compound_records(
        &self,
        extractor: &SmilesExtractor,
    ) -> Result<Vec<CompoundRecord>> {
        let ligands = self.collect_docked_ligands()?;

        let mut records: Vec<CompoundRecord> = Vec::with_capacity(ligands.len());
        for ligand in &ligands {
            let filename = ligand
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut record = CompoundRecord::new(&filename, &ligand.chain, ligand.docking_score);
            if let Ok(content) = tokio::fs::read_to_string(&ligand.path).await {
                record.tags = classify_content(&content);
            }
            if !record.tags.is_empty() {
                debug!(file = %filename, tags = ?record.tags, "ligand classified");
            }
            record.smiles = extractor.extract(&ligand.path).await;
            if record.smiles.is_none() {
                warn!(file = %filename, "no SMILES extracted; scoring on defaults");
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Analysis stages: SMILES extraction, batch property prediction,
    /// per-compound decisioning, report. Returns the report path.
    pub async fn analyze(
        &self,
        extractor: &SmilesExtractor,
        physchem: &dyn PropertyPredictor,
        toxicity: &dyn ToxicityPredictor,
    ) -> Result<PathBuf> {
        let mut records = self.build_compound_records(extractor).await?;

        let named: Vec<(String, String)> = records
            .iter()
            .filter_map(|r| r.smiles.clone().map(|s| (r.filename.clone(), s)))
            .collect();
        for (smiles, names) in duplicate_groups(&named) {
            info!("Duplicate structure {} docked as {:?}", smiles, names);
        }

        // One batch call per predictor, covering only compounds with a
        // SMILES; the rest keep their default (absent) property rows.
        let indexed: Vec<usize> = (0..records.len())
            .filter(|&i| records[i].smiles.is_some())
            .collect();
        let smiles: Vec<String> = indexed
            .iter()
            .filter_map(|&i| records[i].smiles.clone())
            .collect();

        if !smiles.is_empty() {
            let (physchem_rows, toxicity_rows) =
                predict_batch(physchem, toxicity, &smiles).await;
            for (slot, (p, t)) in indexed
                .iter()
                .zip(physchem_rows.into_iter().zip(toxicity_rows))
            {
                records[*slot].physchem = p;
                records[*slot].toxicity = t;
            }
        }

        let rows: Vec<(CompoundRecord, Decision)> = records
            .into_iter()
            .map(|record| {
                let decision = decide(&record);
                (record, decision)
            })
            .collect();

        let accepted = rows
            .iter()
            .filter(|(_, d)| d.label.starts_with("ACCEPT") || d.label.starts_with("REVIEW"))
            .count();
        info!(
            total = rows.len(),
            carried = accepted,
            "decisions computed"
        );

        let report_path =
            Path::new(&self.config.directories.results).join("screening_report.csv");
        write_report(&report_path, &rows)?;
        Ok(report_path)
    }

    /// Full run: docking stages followed by analysis.
    pub async fn run(
        &self,
        fetcher: &StructureFetcher,
        uniprot_id: &str,
        extractor: &SmilesExtractor,
        physchem: &dyn PropertyPredictor,
        toxicity: &dyn ToxicityPredictor,
    ) -> Result<PathBuf> {
        let ctx = self.run_docking(fetcher, uniprot_id).await?;
        info!(poses = ctx.poses.len(), "docking stages complete");
        self.analyze(extractor, physchem, toxicity).await
    }
}

fn collect_ligands_recursive(dir: &Path, found: &mut Vec<DockedLigand>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_ligands_recursive(&path, found)?;
            continue;
        }

        let is_docked_ligand = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_ligand.pdb"))
            && path
                .parent()
                .and_then(|p| p.file_name())
                .is_some_and(|n| n == "docked_pdb");
        if !is_docked_ligand {
            continue;
        }

        // <chain>/docked_pdb/<file> layout; anything else is Unknown
        let chain = path
            .parent()
            .and_then(|p| p.parent())
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown".to_string());

        let docking_score = extract_docking_score(&path);
        found.push(DockedLigand {
            path,
            chain,
            docking_score,
        });
    }
    Ok(())
}
