//! Compound property prediction seams and value normalization.
//!
//! Predictor backends return heterogeneous values: a field may be missing,
//! a category string, a bare number, or a boolean flag. Normalization into
//! `PropertyValue` happens once at ingestion; every downstream rule reads
//! the one tagged representation.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use veridock_common::sandbox::SandboxClient;

/// A per-compound property after ingestion normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum PropertyValue {
    #[default]
    Absent,
    Categorical(String),
    Numeric(f64),
}

impl PropertyValue {
    /// Normalize a raw JSON value. Booleans become Yes/No categories, the
    /// shape the rule tables match on.
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => PropertyValue::Absent,
            Some(Value::Bool(true)) => PropertyValue::Categorical("Yes".to_string()),
            Some(Value::Bool(false)) => PropertyValue::Categorical("No".to_string()),
            Some(Value::Number(n)) => match n.as_f64() {
                Some(f) => PropertyValue::Numeric(f),
                None => PropertyValue::Absent,
            },
            Some(Value::String(s)) if s.trim().is_empty() => PropertyValue::Absent,
            Some(Value::String(s)) => PropertyValue::Categorical(s.trim().to_string()),
            Some(_) => PropertyValue::Absent,
        }
    }

    /// Numeric view: a Numeric value directly, or a Categorical that parses
    /// as a number. `default` covers everything else, so a malformed field
    /// never raises.
    pub fn as_f64_or(&self, default: f64) -> f64 {
        match self {
            PropertyValue::Numeric(f) => *f,
            PropertyValue::Categorical(s) => s.parse().unwrap_or(default),
            PropertyValue::Absent => default,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            PropertyValue::Categorical(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// True when the value matches a category name or, for numeric flag
    /// encodings, equals 1.
    pub fn matches_flag(&self, categories: &[&str]) -> bool {
        match self {
            PropertyValue::Categorical(s) => categories.iter().any(|c| s == c),
            PropertyValue::Numeric(f) => *f == 1.0,
            PropertyValue::Absent => false,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, PropertyValue::Absent)
    }

    /// Display form for the report: numerics as-is, categories verbatim,
    /// absent as an empty cell.
    pub fn display(&self) -> String {
        match self {
            PropertyValue::Numeric(f) => format!("{:.2}", f),
            PropertyValue::Categorical(s) => s.clone(),
            PropertyValue::Absent => String::new(),
        }
    }
}

/// Physicochemical / medicinal-chemistry record, one per SMILES.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhyschemRecord {
    pub mw: PropertyValue,
    pub tpsa: PropertyValue,
    pub hbd: PropertyValue,
    pub hba: PropertyValue,
    pub rotatable_bonds: PropertyValue,
    pub wlogp: PropertyValue,
    pub gi_absorption: PropertyValue,
    pub lipinski: PropertyValue,
    pub pains: PropertyValue,
    pub brenk: PropertyValue,
    pub sa_score: PropertyValue,
}

/// Toxicity / metabolism endpoint record, one per SMILES.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToxicityRecord {
    pub herg: PropertyValue,
    pub ames: PropertyValue,
    pub dili: PropertyValue,
    pub carcinogenicity: PropertyValue,
    pub cyp3a4_inhibition: PropertyValue,
    pub cyp2d6_inhibition: PropertyValue,
    pub caco2: PropertyValue,
    pub bbb: PropertyValue,
    pub ppb: PropertyValue,
    pub qed: PropertyValue,
}

/// Physicochemical predictor capability, invoked once per batch.
#[async_trait]
pub trait PropertyPredictor: Send + Sync {
    async fn predict(&self, smiles: &[String]) -> Result<Vec<PhyschemRecord>>;
}

/// Toxicity endpoint predictor capability, invoked once per batch.
#[async_trait]
pub trait ToxicityPredictor: Send + Sync {
    async fn predict(&self, smiles: &[String]) -> Result<Vec<ToxicityRecord>>;
}

/// HTTP-backed physicochemical predictor. Expects a nested response with
/// `physiochemical`, `medicinal`, `lipophilicity`, `druglikeness`, and
/// `pharmacokinetics` sections per compound.
pub struct HttpPropertyPredictor {
    client: SandboxClient,
    endpoint: String,
}

impl HttpPropertyPredictor {
    pub fn new(client: SandboxClient, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }

    fn parse_record(entry: &Value) -> PhyschemRecord {
        let section = |name: &str| entry.get(name).cloned().unwrap_or(Value::Null);
        let physio = section("physiochemical");
        let medicinal = section("medicinal");
        let lipo = section("lipophilicity");
        let druglikeness = section("druglikeness");
        let pk = section("pharmacokinetics");

        let lipinski = match druglikeness.get("lipinski") {
            Some(Value::Bool(true)) => PropertyValue::Categorical("Pass".to_string()),
            Some(Value::Bool(false)) => PropertyValue::Categorical("Fail".to_string()),
            other => PropertyValue::from_json(other),
        };

        PhyschemRecord {
            mw: PropertyValue::from_json(physio.get("molecular_weight")),
            tpsa: PropertyValue::from_json(physio.get("tpsa")),
            hbd: PropertyValue::from_json(physio.get("num_h_donors")),
            hba: PropertyValue::from_json(physio.get("num_h_acceptors")),
            rotatable_bonds: PropertyValue::from_json(physio.get("num_rotatable_bonds")),
            wlogp: PropertyValue::from_json(lipo.get("wlogp")),
            gi_absorption: PropertyValue::from_json(pk.get("gastrointestinal_absorption")),
            lipinski,
            pains: PropertyValue::from_json(medicinal.get("pains")),
            brenk: PropertyValue::from_json(medicinal.get("brenk")),
            sa_score: PropertyValue::from_json(medicinal.get("synthetic_accessibility")),
        }
    }
}

#[async_trait]
impl PropertyPredictor for HttpPropertyPredictor {
    async fn predict(&self, smiles: &[String]) -> Result<Vec<PhyschemRecord>> {
        info!("Requesting physicochemical properties for {} compounds", smiles.len());
        let resp = self
            .client
            .post(&self.endpoint)?
            .json(&serde_json::json!({ "smiles": smiles }))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = resp.json().await?;
        let entries = body
            .get("results")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(entries.iter().map(Self::parse_record).collect())
    }
}

/// HTTP-backed toxicity predictor. Expects a flat endpoint table per
/// compound, keyed by the upstream model's column names.
pub struct HttpToxicityPredictor {
    client: SandboxClient,
    endpoint: String,
}

impl HttpToxicityPredictor {
    pub fn new(client: SandboxClient, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }

    fn parse_record(entry: &Value) -> ToxicityRecord {
        ToxicityRecord {
            herg: PropertyValue::from_json(entry.get("hERG")),
            ames: PropertyValue::from_json(entry.get("AMES")),
            dili: PropertyValue::from_json(entry.get("DILI")),
            carcinogenicity: PropertyValue::from_json(entry.get("Carcinogens_Lagunin")),
            cyp3a4_inhibition: PropertyValue::from_json(entry.get("CYP3A4_Veith")),
            cyp2d6_inhibition: PropertyValue::from_json(entry.get("CYP2D6_Veith")),
            caco2: PropertyValue::from_json(entry.get("Caco2_Wang")),
            bbb: PropertyValue::from_json(entry.get("BBB_Martins")),
            ppb: PropertyValue::from_json(entry.get("PPBR_AZ")),
            qed: PropertyValue::from_json(entry.get("QED")),
        }
    }
}

#[async_trait]
impl ToxicityPredictor for HttpToxicityPredictor {
    async fn predict(&self, smiles: &[String]) -> Result<Vec<ToxicityRecord>> {
        info!("Requesting toxicity endpoints for {} compounds", smiles.len());
        let resp = self
            .client
            .post(&self.endpoint)?
            .json(&serde_json::json!({ "smiles": smiles }))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = resp.json().await?;
        let entries = body
            .get("results")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(entries.iter().map(Self::parse_record).collect())
    }
}

/// Run both predictors over a batch. A bulk failure of either source
/// degrades to default records for every compound rather than failing the
/// run.
pub async fn predict_batch(
    physchem: &dyn PropertyPredictor,
    toxicity: &dyn ToxicityPredictor,
    smiles: &[String],
) -> (Vec<PhyschemRecord>, Vec<ToxicityRecord>) {
    let physchem_records = match physchem.predict(smiles).await {
        Ok(records) if records.len() == smiles.len() => records,
        Ok(records) => {
            warn!(
                "Physicochemical predictor returned {} records for {} compounds; using defaults",
                records.len(),
                smiles.len()
            );
            vec![PhyschemRecord::default(); smiles.len()]
        }
        Err(e) => {
            warn!("Physicochemical predictor failed, proceeding with defaults: {}", e);
            vec![PhyschemRecord::default(); smiles.len()]
        }
    };

    let toxicity_records = match toxicity.predict(smiles).await {
        Ok(records) if records.len() == smiles.len() => records,
        Ok(records) => {
            warn!(
                "Toxicity predictor returned {} records for {} compounds; using defaults",
                records.len(),
                smiles.len()
            );
            vec![ToxicityRecord::default(); smiles.len()]
        }
        Err(e) => {
            warn!("Toxicity predictor failed, proceeding with defaults: {}", e);
            vec![ToxicityRecord::default(); smiles.len()]
        }
    };

    (physchem_records, toxicity_records)
}
