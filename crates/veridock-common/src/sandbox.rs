use crate::error::VeridockError;
use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// A sandbox-capped HTTP client that only allows requests to approved hosts.
/// Every network capability in the pipeline goes through this client so that
/// a misconfigured collaborator cannot reach arbitrary endpoints.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a new SandboxClient with the default allowlist of scientific
    /// data services this pipeline consumes.
    pub fn new() -> Result<Self, VeridockError> {
        let mut allowlist = HashSet::new();
        let domains = vec![
            "rest.uniprot.org",       // UniProt search + entry cross-refs
            "data.rcsb.org",          // PDB entry metadata (resolution)
            "files.rcsb.org",         // PDB structure download
            "alphafold.ebi.ac.uk",    // AlphaFold model download
            "www.ebi.ac.uk",          // ChEMBL / EBI services
            "localhost",              // Local predictor services
            "127.0.0.1",              // Localhost alt
        ];

        for d in domains {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VeridockError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Exact match or a subdomain of an allowed domain
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Exposes the inner `reqwest::Client` builder pattern safely for GET requests.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, VeridockError> {
        if !self.is_allowed(url) {
            return Err(VeridockError::Security(format!(
                "Network capabilities capped: domain not in allowlist for URL {}",
                url
            )));
        }

        Ok(self.client.get(url))
    }

    /// Exposes the inner `reqwest::Client` builder pattern safely for POST requests.
    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, VeridockError> {
        if !self.is_allowed(url) {
            return Err(VeridockError::Security(format!(
                "Network capabilities capped: domain not in allowlist for URL {}",
                url
            )));
        }

        Ok(self.client.post(url))
    }
}
