//! ADMET decision engine: a five-stage filter-and-score policy that turns a
//! compound's property row into an ACCEPT / REVIEW / REJECT verdict with a
//! developability score and a reason trail.
//!
//! The engine is a pure function of one compound record. Stages run in
//! order and short-circuit on a hard reject; missing or malformed fields
//! resolve to documented defaults, never to errors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::properties::{PhyschemRecord, PropertyValue, ToxicityRecord};

/// One docked compound with everything its decision depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundRecord {
    pub filename: String,
    pub chain: String,
    pub smiles: Option<String>,
    /// Ligand class tags (Fragment/Small/Large/Macrocycle) from structure perception.
    pub tags: Vec<String>,
    pub docking_score: f64,
    pub physchem: PhyschemRecord,
    pub toxicity: ToxicityRecord,
}

impl CompoundRecord {
    pub fn new(filename: &str, chain: &str, docking_score: f64) -> Self {
        Self {
            filename: filename.to_string(),
            chain: chain.to_string(),
            smiles: None,
            tags: Vec::new(),
            docking_score,
            physchem: PhyschemRecord::default(),
            toxicity: ToxicityRecord::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accept,
    Review,
    Reject,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accept => write!(f, "ACCEPT"),
            Verdict::Review => write!(f, "REVIEW"),
            Verdict::Reject => write!(f, "REJECT"),
        }
    }
}

/// The final decision for one compound. Computed once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub reasons: Vec<String>,
    pub score: u32,
    /// Display form, e.g. `REJECT (Lipinski Fail)` or bare `ACCEPT`.
    pub label: String,
}

/// Outcome of a filter stage.
#[derive(Debug, Clone, PartialEq)]
enum StageOutcome {
    Pass,
    Review(String),
    Reject(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RiskBand {
    High,
    Medium,
    Low,
}

/// hERG/DILI risk banding: categorical High/Medium, or a probability with
/// >= 0.7 high and [0.3, 0.7) medium.
fn risk_band(value: &PropertyValue) -> RiskBand {
    match value {
        PropertyValue::Categorical(s) if s == "High" => RiskBand::High,
        PropertyValue::Categorical(s) if s == "Medium" => RiskBand::Medium,
        PropertyValue::Numeric(p) if *p >= 0.7 => RiskBand::High,
        PropertyValue::Numeric(p) if *p >= 0.3 => RiskBand::Medium,
        _ => RiskBand::Low,
    }
}

/// Stage 1: primary hard filters, fixed priority, first match wins.
/// A Reject here is terminal; a Review is recorded and later stages run.
fn primary_filters(record: &CompoundRecord) -> StageOutcome {
    if record.physchem.lipinski.as_category() == Some("Fail") {
        return StageOutcome::Reject("Lipinski Fail".to_string());
    }
    if record.physchem.pains.matches_flag(&["Yes"]) {
        return StageOutcome::Reject("PAINS Alert".to_string());
    }
    if record.physchem.brenk.matches_flag(&["Yes"]) {
        return StageOutcome::Reject("Brenk Alert".to_string());
    }
    if record.toxicity.ames.matches_flag(&["Positive"]) {
        return StageOutcome::Reject("Ames Positive".to_string());
    }

    match risk_band(&record.toxicity.herg) {
        RiskBand::High => return StageOutcome::Reject("hERG High Risk".to_string()),
        RiskBand::Medium => return StageOutcome::Review("hERG Medium Risk".to_string()),
        RiskBand::Low => {}
    }

    if record.toxicity.carcinogenicity.matches_flag(&["Yes"]) {
        return StageOutcome::Reject("Carcinogenic".to_string());
    }

    match risk_band(&record.toxicity.dili) {
        RiskBand::High => return StageOutcome::Reject("DILI High Risk".to_string()),
        RiskBand::Medium => return StageOutcome::Review("DILI Medium Risk".to_string()),
        RiskBand::Low => {}
    }

    StageOutcome::Pass
}

/// Defaults applied when a developability descriptor is absent or
/// unparseable. Each sits strictly inside the passing range.
const DEFAULT_SA: f64 = 5.0;
const DEFAULT_QED: f64 = 0.6;
const DEFAULT_MW: f64 = 400.0;
const DEFAULT_TPSA: f64 = 100.0;
const DEFAULT_WLOGP: f64 = 3.0;

/// Stage 2: developability soft filters. Unlike Stage 1 this accumulates
/// every triggered reason before deciding.
fn developability_filters(record: &CompoundRecord) -> StageOutcome {
    let sa = record.physchem.sa_score.as_f64_or(DEFAULT_SA);
    let qed = record.toxicity.qed.as_f64_or(DEFAULT_QED);
    let mw = record.physchem.mw.as_f64_or(DEFAULT_MW);
    let tpsa = record.physchem.tpsa.as_f64_or(DEFAULT_TPSA);
    let wlogp = record.physchem.wlogp.as_f64_or(DEFAULT_WLOGP);

    let mut reject_reasons = Vec::new();
    let mut review_reasons = Vec::new();

    if sa > 6.0 {
        reject_reasons.push("SA > 6.0");
    } else if sa > 5.0 {
        review_reasons.push("SA 5.0-6.0");
    }

    if qed < 0.4 {
        reject_reasons.push("QED < 0.4");
    } else if qed < 0.6 {
        review_reasons.push("QED 0.4-0.6");
    }

    if mw > 550.0 {
        reject_reasons.push("MW > 550");
    } else if mw >= 500.0 {
        review_reasons.push("MW 500-550");
    }

    if tpsa > 160.0 {
        reject_reasons.push("TPSA > 160");
    } else if tpsa >= 140.0 {
        review_reasons.push("TPSA 140-160");
    }

    if wlogp > 6.0 {
        reject_reasons.push("WLogP > 6");
    } else if wlogp >= 5.0 {
        review_reasons.push("WLogP 5-6");
    }

    if !reject_reasons.is_empty() {
        StageOutcome::Reject(reject_reasons.join("; "))
    } else if !review_reasons.is_empty() {
        StageOutcome::Review(review_reasons.join("; "))
    } else {
        StageOutcome::Pass
    }
}

/// Stage 3: ADME penalty accumulation. Every applicable flag contributes;
/// absent fields contribute nothing.
fn adme_penalties(record: &CompoundRecord) -> u32 {
    let mut penalty = 0;

    if record
        .physchem
        .gi_absorption
        .matches_flag(&["Medium", "Moderate"])
    {
        penalty += 5;
    }
    if record.toxicity.caco2.as_category() == Some("Moderate") {
        penalty += 5;
    }
    if record.toxicity.bbb.as_category() == Some("Borderline") {
        penalty += 5;
    }
    if record.toxicity.ppb.as_f64_or(90.0) >= 95.0 {
        penalty += 5;
    }
    if record
        .toxicity
        .cyp3a4_inhibition
        .matches_flag(&["Yes", "Weak"])
    {
        penalty += 5;
    }
    if record
        .toxicity
        .cyp2d6_inhibition
        .matches_flag(&["Yes", "Weak"])
    {
        penalty += 5;
    }
    if risk_band(&record.toxicity.herg) == RiskBand::Medium {
        penalty += 10;
    }

    penalty
}

/// Stage 4: composite developability score. Base 100 minus SA and QED
/// penalties and the full Stage-3 total, clamped at 0.
///
/// The SA > 6.0 zero-out duplicates a Stage-2 reject. This function is
/// public and callable without Stage 2 having run, so the guard stays.
pub fn composite_score(record: &CompoundRecord) -> u32 {
    let sa = record.physchem.sa_score.as_f64_or(DEFAULT_SA);
    if sa > 6.0 {
        return 0;
    }

    let mut penalty: u32 = 0;
    if sa >= 5.0 {
        penalty += 10;
    }

    let qed = record.toxicity.qed.as_f64_or(DEFAULT_QED);
    if qed < 0.6 {
        penalty += 10;
    }

    penalty += adme_penalties(record);

    100u32.saturating_sub(penalty)
}

/// Stage 5: verdict from the composite score.
fn score_verdict(score: u32) -> Verdict {
    if score >= 75 {
        Verdict::Accept
    } else if score >= 60 {
        Verdict::Review
    } else {
        Verdict::Reject
    }
}

/// Run the full five-stage policy for one compound.
pub fn decide(record: &CompoundRecord) -> Decision {
    let primary = primary_filters(record);
    if let StageOutcome::Reject(reason) = &primary {
        return Decision {
            verdict: Verdict::Reject,
            label: format!("REJECT ({})", reason),
            reasons: vec![reason.clone()],
            score: 0,
        };
    }

    let developability = developability_filters(record);
    if let StageOutcome::Reject(reason) = &developability {
        return Decision {
            verdict: Verdict::Reject,
            label: format!("REJECT ({})", reason),
            reasons: vec![reason.clone()],
            score: 0,
        };
    }

    let score = composite_score(record);
    let verdict = score_verdict(score);

    let mut warnings = Vec::new();
    if let StageOutcome::Review(reason) = primary {
        warnings.push(reason);
    }
    if let StageOutcome::Review(reason) = developability {
        warnings.push(reason);
    }

    if warnings.is_empty() {
        return Decision {
            verdict,
            label: verdict.to_string(),
            reasons: Vec::new(),
            score,
        };
    }

    let joined = warnings.join("; ");
    // Accumulated warnings downgrade an ACCEPT to REVIEW; other verdicts
    // keep their severity and carry the warnings as context.
    let (display_verdict, label) = if verdict == Verdict::Accept {
        (Verdict::Review, format!("REVIEW ({})", joined))
    } else {
        (verdict, format!("{} ({})", verdict, joined))
    };

    Decision {
        verdict: display_verdict,
        label,
        reasons: warnings,
        score,
    }
}
