//! Veridock Screen - Structure-based screening and ADMET triage pipeline.
//!
//! This crate covers the screening workflow end to end:
//! 1. Finding and fetching protein structures (UniProt / PDB / AlphaFold)
//! 2. Preparing the receptor for docking
//! 3. Predicting binding pockets (P2Rank + Fpocket, merged)
//! 4. Docking ligands per receptor chain (AutoDock Vina)
//! 5. Extracting SMILES from docked poses (strict parse, lenient fallback)
//! 6. Predicting compound properties (injected collaborators)
//! 7. ADMET decisioning and report generation

pub mod admet;
pub mod config;
pub mod docking;
pub mod pipeline;
pub mod pocket;
pub mod prep;
pub mod properties;
pub mod report;
pub mod smiles;
pub mod structure;

pub type Result<T> = anyhow::Result<T>;
