//! Veridock — structure-based screening and ADMET triage.
//! Entry point for the screening binary.

use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use veridock_common::sandbox::SandboxClient;
use veridock_screen::config::Config;
use veridock_screen::pipeline::ScreeningPipeline;
use veridock_screen::properties::{HttpPropertyPredictor, HttpToxicityPredictor};
use veridock_screen::smiles::{ObabelConverter, SmilesExtractor};
use veridock_screen::structure::StructureFetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("veridock=debug,info")),
        )
        .init();

    info!("Veridock starting up...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let analyze_only = args.iter().any(|a| a == "--analyze-only");
    let by_name = args.iter().any(|a| a == "--protein");
    let target = args.iter().find(|a| !a.starts_with("--"));

    let client = SandboxClient::new()?;
    let extractor = SmilesExtractor::new(Box::new(ObabelConverter::new(
        &config.tools.obabel,
        Duration::from_secs(config.extraction.converter_timeout_secs),
    )));
    let physchem = HttpPropertyPredictor::new(
        client.clone(),
        &config.predictors.physchem_endpoint,
    );
    let toxicity = HttpToxicityPredictor::new(
        client.clone(),
        &config.predictors.toxicity_endpoint,
    );

    let pipeline = ScreeningPipeline::new(config.clone());

    let report = if analyze_only {
        info!("Analyzing existing docking results in {}", config.directories.docking_results);
        pipeline.analyze(&extractor, &physchem, &toxicity).await?
    } else {
        let Some(target) = target else {
            anyhow::bail!("usage: veridock <uniprot-accession> | --protein <name> | --analyze-only");
        };
        let fetcher = StructureFetcher::new(client, &config.directories.proteins);

        let accession = if by_name {
            let hits = fetcher.search_uniprot(target, 5).await;
            let Some(first) = hits.first() else {
                anyhow::bail!("no reviewed UniProt entry found for protein '{}'", target);
            };
            info!("Protein '{}' resolved to UniProt accession {}", target, first);
            first.clone()
        } else {
            target.clone()
        };

        pipeline
            .run(&fetcher, &accession, &extractor, &physchem, &toxicity)
            .await?
    };

    info!("Screening report written to {}", report.display());
    Ok(())
}
