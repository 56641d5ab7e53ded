//! Structure-to-SMILES extraction from docked ligand coordinate files.
//!
//! Docking engines emit poses with hydrogen-laden, aromaticity-inconsistent
//! geometry that strict perception often rejects. Extraction therefore runs
//! an ordered fallback chain: a strict in-crate path (parse coordinates,
//! drop hydrogens, infer bonds, validate valences, write a canonical SMILES)
//! and, when that fails, a lenient external converter under a bounded
//! timeout. Both failing is a defined no-result, never an error.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// A heavy atom parsed from a coordinate file.
#[derive(Debug, Clone)]
pub struct Atom {
    pub element: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A perceived chemical graph: heavy atoms plus inferred bonds.
#[derive(Debug, Clone)]
pub struct MolGraph {
    pub atoms: Vec<Atom>,
    pub bonds: Vec<(usize, usize)>,
}

impl MolGraph {
    pub fn neighbors(&self) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); self.atoms.len()];
        for &(a, b) in &self.bonds {
            adj[a].push(b);
            adj[b].push(a);
        }
        adj
    }

    /// Molecular weight of the heavy-atom skeleton.
    pub fn heavy_atom_weight(&self) -> f64 {
        self.atoms
            .iter()
            .map(|a| atomic_mass(&a.element).unwrap_or(12.011))
            .sum()
    }
}

/// Covalent radius in angstroms, for distance-based bond inference.
fn covalent_radius(element: &str) -> Option<f64> {
    let r = match element {
        "H" => 0.31,
        "B" => 0.84,
        "C" => 0.76,
        "N" => 0.71,
        "O" => 0.66,
        "F" => 0.57,
        "Si" => 1.11,
        "P" => 1.07,
        "S" => 1.05,
        "Cl" => 1.02,
        "Br" => 1.20,
        "I" => 1.39,
        _ => return None,
    };
    Some(r)
}

fn atomic_mass(element: &str) -> Option<f64> {
    let m = match element {
        "H" => 1.008,
        "B" => 10.811,
        "C" => 12.011,
        "N" => 14.007,
        "O" => 15.999,
        "F" => 18.998,
        "Si" => 28.086,
        "P" => 30.974,
        "S" => 32.06,
        "Cl" => 35.45,
        "Br" => 79.904,
        "I" => 126.904,
        _ => return None,
    };
    Some(m)
}

/// Maximum plausible connectivity per element. Exceeding this fails
/// sanitization and pushes the file to the lenient converter.
fn max_valence(element: &str) -> usize {
    match element {
        "H" | "F" | "Cl" | "Br" | "I" => 1,
        "O" => 2,
        "B" => 3,
        "N" => 4,
        "C" | "Si" => 4,
        "P" => 5,
        "S" => 6,
        _ => 6,
    }
}

/// AutoDock atom-type codes from PDBQT files. Aromatic carbon folds to C,
/// polar acceptor/donor variants to their parent element.
fn normalize_autodock_type(raw: &str) -> Option<String> {
    let token = raw.trim();
    if token.is_empty() {
        return None;
    }
    let normalized = match token.to_uppercase().as_str() {
        "A" => "C",
        "OA" => "O",
        "NA" => "N",
        "SA" => "S",
        "HD" | "HS" => "H",
        "CL" => "Cl",
        "BR" => "Br",
        "SI" => "Si",
        other => return element_from_leading_alpha(other),
    };
    Some(normalized.to_string())
}

/// A PDB element-column symbol. Two-letter symbols keep their identity, so
/// a sodium counter-ion stays `Na` instead of folding into nitrogen; as an
/// unsupported element it then fails sanitization and the file takes the
/// lenient path.
fn normalize_element_symbol(raw: &str) -> Option<String> {
    let token = raw.trim();
    if token.is_empty() || token.len() > 2 || !token.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut chars = token.chars();
    let first = chars.next()?.to_ascii_uppercase();
    let rest: String = chars.map(|c| c.to_ascii_lowercase()).collect();
    Some(format!("{}{}", first, rest))
}

/// Element guess from an atom name like `C1` or `O2'`: the leading
/// alphabetic run, accepted only for unambiguous one-letter organics.
fn element_from_leading_alpha(raw: &str) -> Option<String> {
    let first: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    match first.to_uppercase().as_str() {
        "C" | "N" | "O" | "S" | "P" | "H" | "F" | "B" | "I" => Some(first.to_uppercase()),
        _ => None,
    }
}

/// PDBQT files carry torsion-tree records that plain PDB never has; their
/// presence switches element resolution to AutoDock type codes.
fn is_pdbqt(content: &str) -> bool {
    content
        .lines()
        .any(|l| l.starts_with("ROOT") || l.starts_with("BRANCH") || l.starts_with("TORSDOF"))
}

/// Parse ATOM/HETATM records from PDB or PDBQT text, dropping hydrogens.
/// Only the first MODEL of a multi-model file is read.
pub fn parse_heavy_atoms(content: &str) -> Vec<Atom> {
    let mut atoms = Vec::new();
    let mut saw_model = false;
    let pdbqt = is_pdbqt(content);

    for line in content.lines() {
        if line.starts_with("MODEL") {
            if saw_model {
                break;
            }
            saw_model = true;
            continue;
        }
        if line.starts_with("ENDMDL") {
            break;
        }
        if !(line.starts_with("ATOM") || line.starts_with("HETATM")) || line.len() < 54 {
            continue;
        }

        let element_field = if line.len() >= 78 { &line[76..78] } else { "" };
        let name_field = line.get(12..16).unwrap_or("");
        let element = if pdbqt {
            normalize_autodock_type(element_field)
                .or_else(|| normalize_autodock_type(name_field))
        } else {
            normalize_element_symbol(element_field)
                .or_else(|| element_from_leading_alpha(name_field))
        };
        let Some(element) = element else { continue };
        if element == "H" {
            continue;
        }

        let parse = |range: std::ops::Range<usize>| line[range].trim().parse::<f64>();
        if let (Ok(x), Ok(y), Ok(z)) = (parse(30..38), parse(38..46), parse(46..54)) {
            atoms.push(Atom { element, x, y, z });
        }
    }

    atoms
}

/// Infer bonds from interatomic distances against summed covalent radii
/// with a 0.45 A tolerance.
pub fn infer_bonds(atoms: &[Atom]) -> Vec<(usize, usize)> {
    let mut bonds = Vec::new();
    for i in 0..atoms.len() {
        for j in (i + 1)..atoms.len() {
            let (Some(ri), Some(rj)) = (
                covalent_radius(&atoms[i].element),
                covalent_radius(&atoms[j].element),
            ) else {
                continue;
            };
            let dx = atoms[i].x - atoms[j].x;
            let dy = atoms[i].y - atoms[j].y;
            let dz = atoms[i].z - atoms[j].z;
            let dist = (dx * dx + dy * dy + dz * dz).sqrt();
            // Overlapping coordinates are a parse artifact, not a bond
            if dist > 0.4 && dist <= ri + rj + 0.45 {
                bonds.push((i, j));
            }
        }
    }
    bonds
}

/// Valence sanitization: every atom's connectivity must stay within its
/// element's plausible maximum.
pub fn sanitize(graph: &MolGraph) -> Result<()> {
    if graph.atoms.is_empty() {
        anyhow::bail!("no heavy atoms parsed");
    }
    for atom in &graph.atoms {
        if covalent_radius(&atom.element).is_none() {
            anyhow::bail!("unsupported element {}", atom.element);
        }
    }
    let adj = graph.neighbors();
    for (idx, neighbors) in adj.iter().enumerate() {
        let element = &graph.atoms[idx].element;
        if neighbors.len() > max_valence(element) {
            anyhow::bail!(
                "valence violation: {} atom with {} bonds",
                element,
                neighbors.len()
            );
        }
    }
    Ok(())
}

/// Iterative neighborhood refinement to produce deterministic atom ranks,
/// so the same molecule always writes the same SMILES regardless of input
/// atom order.
fn canonical_ranks(graph: &MolGraph) -> Vec<usize> {
    let n = graph.atoms.len();
    let adj = graph.neighbors();

    let mut labels: Vec<(String, usize)> = graph
        .atoms
        .iter()
        .enumerate()
        .map(|(i, a)| (a.element.clone(), adj[i].len()))
        .collect();

    let mut ranks = ranks_of(&labels);
    for _ in 0..n {
        let refined: Vec<(String, usize)> = (0..n)
            .map(|i| {
                let mut neighbor_ranks: Vec<usize> = adj[i].iter().map(|&j| ranks[j]).collect();
                neighbor_ranks.sort_unstable();
                let key = format!(
                    "{}|{}|{:?}",
                    labels[i].0, ranks[i], neighbor_ranks
                );
                (key, labels[i].1)
            })
            .collect();
        let new_ranks = ranks_of(&refined);
        if new_ranks == ranks {
            break;
        }
        ranks = new_ranks;
        labels = refined;
    }
    ranks
}

fn ranks_of(labels: &[(String, usize)]) -> Vec<usize> {
    let mut sorted: Vec<&(String, usize)> = labels.iter().collect();
    sorted.sort();
    sorted.dedup();
    labels
        .iter()
        .map(|l| sorted.iter().position(|s| *s == l).unwrap_or(0))
        .collect()
}

const ORGANIC_SUBSET: &[&str] = &["B", "C", "N", "O", "P", "S", "F", "Cl", "Br", "I"];

/// Write a deterministic connectivity SMILES from the perceived graph.
/// Disconnected fragments are joined with '.'.
pub fn write_smiles(graph: &MolGraph) -> String {
    let n = graph.atoms.len();
    let adj = graph.neighbors();
    let ranks = canonical_ranks(graph);

    let mut visited = vec![false; n];
    let mut ring_bonds: HashMap<(usize, usize), usize> = HashMap::new();
    let mut next_ring_digit = 1usize;

    // Pre-walk to find back edges (ring closures) in rank-deterministic DFS order
    {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| (ranks[i], i));
        let mut seen = vec![false; n];
        for &start in &order {
            if seen[start] {
                continue;
            }
            let mut stack = vec![(start, usize::MAX)];
            while let Some((node, parent)) = stack.pop() {
                if seen[node] {
                    continue;
                }
                seen[node] = true;
                let mut neighbors: Vec<usize> = adj[node].clone();
                neighbors.sort_by_key(|&j| (ranks[j], j));
                for &next in neighbors.iter().rev() {
                    if next == parent {
                        continue;
                    }
                    if seen[next] {
                        let key = bond_key(node, next);
                        ring_bonds.entry(key).or_insert_with(|| {
                            let d = next_ring_digit;
                            next_ring_digit += 1;
                            d
                        });
                    } else {
                        stack.push((next, node));
                    }
                }
            }
        }
    }

    let mut fragments = Vec::new();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| (ranks[i], i));

    for &start in &order {
        if visited[start] {
            continue;
        }
        let mut out = String::new();
        write_atom(graph, &adj, &ranks, &ring_bonds, start, usize::MAX, &mut visited, &mut out);
        fragments.push(out);
    }

    fragments.join(".")
}

fn bond_key(a: usize, b: usize) -> (usize, usize) {
    if a < b { (a, b) } else { (b, a) }
}

fn write_atom(
    graph: &MolGraph,
    adj: &[Vec<usize>],
    ranks: &[usize],
    ring_bonds: &HashMap<(usize, usize), usize>,
    node: usize,
    parent: usize,
    visited: &mut [bool],
    out: &mut String,
) {
    visited[node] = true;
    let element = &graph.atoms[node].element;
    if ORGANIC_SUBSET.contains(&element.as_str()) {
        out.push_str(element);
    } else {
        out.push('[');
        out.push_str(element);
        out.push(']');
    }

    // Ring-closure digits attach to both endpoints of each back edge
    let mut closures: Vec<usize> = adj[node]
        .iter()
        .filter_map(|&next| ring_bonds.get(&bond_key(node, next)).copied())
        .collect();
    closures.sort_unstable();
    for digit in closures {
        if digit < 10 {
            out.push_str(&digit.to_string());
        } else {
            out.push_str(&format!("%{}", digit));
        }
    }

    // Recurse along tree edges only; back edges are already ring closures
    let mut children: Vec<usize> = adj[node]
        .iter()
        .copied()
        .filter(|&next| {
            next != parent
                && !visited[next]
                && !ring_bonds.contains_key(&bond_key(node, next))
        })
        .collect();
    children.sort_by_key(|&j| (ranks[j], j));

    let last = children.len().saturating_sub(1);
    for (pos, &child) in children.iter().enumerate() {
        if visited[child] {
            continue;
        }
        if pos < last {
            out.push('(');
            write_atom(graph, adj, ranks, ring_bonds, child, node, visited, out);
            out.push(')');
        } else {
            write_atom(graph, adj, ranks, ring_bonds, child, node, visited, out);
        }
    }
}

/// Strict extraction path: parse, strip hydrogens, infer bonds, sanitize,
/// and write a canonical SMILES. Any failure falls through to the caller.
pub fn strict_smiles(content: &str) -> Result<String> {
    let atoms = parse_heavy_atoms(content);
    let bonds = infer_bonds(&atoms);
    let graph = MolGraph { atoms, bonds };
    sanitize(&graph)?;
    let smiles = write_smiles(&graph);
    if smiles.is_empty() {
        anyhow::bail!("empty SMILES from perception");
    }
    Ok(smiles)
}

/// Ligand size/shape classification tags, from the perceived graph.
pub fn classify(graph: &MolGraph) -> Vec<String> {
    let mut tags = Vec::new();
    let mw = graph.heavy_atom_weight();
    if mw < 250.0 {
        tags.push("Fragment".to_string());
    } else if mw <= 500.0 {
        tags.push("Small Molecule".to_string());
    } else {
        tags.push("Large Molecule".to_string());
    }
    if has_macrocycle(graph) {
        tags.push("Macrocycle".to_string());
    }
    tags
}

/// A ring of 12 or more atoms marks a macrocycle. Ring sizes come from
/// tree-path distances across DFS back edges.
fn has_macrocycle(graph: &MolGraph) -> bool {
    let n = graph.atoms.len();
    let adj = graph.neighbors();
    let mut parent = vec![usize::MAX; n];
    let mut depth = vec![0usize; n];
    let mut visited = vec![false; n];
    let mut back_edges = Vec::new();

    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut stack = vec![(start, usize::MAX, 0usize)];
        while let Some((node, par, d)) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            parent[node] = par;
            depth[node] = d;
            for &next in &adj[node] {
                if next == par {
                    continue;
                }
                if visited[next] {
                    back_edges.push((node, next));
                } else {
                    stack.push((next, node, d + 1));
                }
            }
        }
    }

    for (mut a, mut b) in back_edges {
        let mut size = 1usize;
        while a != b {
            if depth[a] >= depth[b] {
                a = parent[a];
            } else {
                b = parent[b];
            }
            size += 1;
            if a == usize::MAX || b == usize::MAX {
                size = 0;
                break;
            }
        }
        if size >= 12 {
            return true;
        }
    }
    false
}

/// Classification tags straight from coordinate-file text. Files without
/// parseable heavy atoms yield no tags.
pub fn classify_content(content: &str) -> Vec<String> {
    let atoms = parse_heavy_atoms(content);
    if atoms.is_empty() {
        return Vec::new();
    }
    let bonds = infer_bonds(&atoms);
    classify(&MolGraph { atoms, bonds })
}

/// Group a batch of named compounds by identical SMILES. Only groups with
/// more than one member are returned; singletons are not duplicates.
pub fn duplicate_groups(entries: &[(String, String)]) -> Vec<(String, Vec<String>)> {
    let mut by_smiles: HashMap<&str, Vec<&str>> = HashMap::new();
    for (name, smiles) in entries {
        by_smiles.entry(smiles.as_str()).or_default().push(name.as_str());
    }

    let mut groups: Vec<(String, Vec<String>)> = by_smiles
        .into_iter()
        .filter(|(_, names)| names.len() > 1)
        .map(|(smiles, names)| {
            (
                smiles.to_string(),
                names.into_iter().map(str::to_string).collect(),
            )
        })
        .collect();
    groups.sort_by(|a, b| a.0.cmp(&b.0));
    groups
}

/// Injected lenient-conversion capability, so unit tests can substitute a
/// deterministic fake for the external binary.
#[async_trait]
pub trait StructureConverter: Send + Sync {
    /// Convert a coordinate file to SMILES. An Err means this converter
    /// could not produce a result; the caller decides what that costs.
    async fn convert(&self, path: &Path) -> Result<String>;
}

/// OpenBabel-backed converter. Tolerates mismatched aromaticity and bond
/// orders the strict path rejects.
pub struct ObabelConverter {
    executable: String,
    timeout: Duration,
}

impl ObabelConverter {
    pub fn new(executable: &str, timeout: Duration) -> Self {
        Self {
            executable: executable.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl StructureConverter for ObabelConverter {
    async fn convert(&self, path: &Path) -> Result<String> {
        let run = Command::new(&self.executable)
            .arg(path)
            .arg("-osmi")
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| anyhow::anyhow!("obabel timed out after {:?}", self.timeout))??;

        if !output.status.success() {
            anyhow::bail!(
                "obabel exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        // Output shape is "SMILES\tfilename"; the first token is the SMILES
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .split_whitespace()
            .next()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("obabel produced no output"))
    }
}

/// The two-tier extractor. Strict first, lenient fallback, no-result last.
pub struct SmilesExtractor {
    converter: Box<dyn StructureConverter>,
}

impl SmilesExtractor {
    pub fn new(converter: Box<dyn StructureConverter>) -> Self {
        Self { converter }
    }

    /// Extract a SMILES from a coordinate file. None means the compound is
    /// skipped downstream; no failure here ever propagates.
    pub async fn extract(&self, path: &Path) -> Option<String> {
        if let Ok(content) = tokio::fs::read_to_string(path).await {
            match strict_smiles(&content) {
                Ok(smiles) => return Some(smiles),
                Err(e) => debug!("Strict extraction failed for {:?}: {}", path, e),
            }
        }

        match self.converter.convert(path).await {
            Ok(smiles) if !smiles.is_empty() => Some(smiles),
            Ok(_) => {
                warn!("Lenient converter returned empty SMILES for {:?}", path);
                None
            }
            Err(e) => {
                warn!("Lenient conversion failed for {:?}: {}", path, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom_line(serial: u32, name: &str, x: f64, y: f64, z: f64, element: &str) -> String {
        format!(
            "HETATM{:5} {:<4} LIG A   1    {:8.3}{:8.3}{:8.3}  1.00  0.00          {:>2}",
            serial, name, x, y, z, element
        )
    }

    /// Ethanol heavy-atom skeleton: C-C-O with realistic distances.
    fn ethanol_pdb() -> String {
        [
            atom_line(1, "C1", 0.0, 0.0, 0.0, "C"),
            atom_line(2, "C2", 1.52, 0.0, 0.0, "C"),
            atom_line(3, "O1", 2.24, 1.21, 0.0, "O"),
            "END".to_string(),
        ]
        .join("\n")
    }

    #[test]
    fn test_parse_drops_hydrogens() {
        let content = format!(
            "{}\n{}\n",
            atom_line(1, "C1", 0.0, 0.0, 0.0, "C"),
            atom_line(2, "H1", 1.0, 0.0, 0.0, "H")
        );
        let atoms = parse_heavy_atoms(&content);
        assert_eq!(atoms.len(), 1);
        assert_eq!(atoms[0].element, "C");
    }

    #[test]
    fn test_parse_reads_first_model_only() {
        let content = format!(
            "MODEL 1\n{}\nENDMDL\nMODEL 2\n{}\n{}\nENDMDL\n",
            atom_line(1, "C1", 0.0, 0.0, 0.0, "C"),
            atom_line(2, "C2", 0.0, 0.0, 0.0, "C"),
            atom_line(3, "C3", 0.0, 0.0, 0.0, "C"),
        );
        assert_eq!(parse_heavy_atoms(&content).len(), 1);
    }

    #[test]
    fn test_pdbqt_atom_types_normalize() {
        assert_eq!(normalize_autodock_type("A"), Some("C".to_string()));
        assert_eq!(normalize_autodock_type("OA"), Some("O".to_string()));
        assert_eq!(normalize_autodock_type("NA"), Some("N".to_string()));
        assert_eq!(normalize_autodock_type("HD"), Some("H".to_string()));
        assert_eq!(normalize_autodock_type("Cl"), Some("Cl".to_string()));
        assert_eq!(normalize_autodock_type(""), None);
    }

    #[test]
    fn test_element_symbols_keep_identity() {
        assert_eq!(normalize_element_symbol("C"), Some("C".to_string()));
        assert_eq!(normalize_element_symbol(" N"), Some("N".to_string()));
        assert_eq!(normalize_element_symbol("CL"), Some("Cl".to_string()));
        // Sodium stays sodium; the old AutoDock fold read this as nitrogen
        assert_eq!(normalize_element_symbol("NA"), Some("Na".to_string()));
        assert_eq!(normalize_element_symbol("FE"), Some("Fe".to_string()));
        assert_eq!(normalize_element_symbol("C1"), None);
        assert_eq!(normalize_element_symbol(""), None);
    }

    #[test]
    fn test_sodium_counter_ion_fails_strict_path() {
        let content = [
            atom_line(1, "C1", 0.0, 0.0, 0.0, "C"),
            atom_line(2, "NA", 8.0, 0.0, 0.0, "NA"),
        ]
        .join("\n");

        let atoms = parse_heavy_atoms(&content);
        assert!(atoms.iter().any(|a| a.element == "Na"));

        // Unsupported element fails sanitization, pushing the file to the
        // lenient converter instead of silently misreading the ion.
        let err = strict_smiles(&content).unwrap_err();
        assert!(err.to_string().contains("unsupported element"));
    }

    #[test]
    fn test_pdbqt_na_type_still_reads_as_nitrogen() {
        let content = format!(
            "ROOT\n{}\nENDROOT\nTORSDOF 0\n",
            atom_line(1, "N1", 0.0, 0.0, 0.0, "NA")
        );
        let atoms = parse_heavy_atoms(&content);
        assert_eq!(atoms.len(), 1);
        assert_eq!(atoms[0].element, "N");
    }

    #[test]
    fn test_classify_content_from_raw_text() {
        assert_eq!(
            classify_content(&ethanol_pdb()),
            vec!["Fragment".to_string()]
        );
        assert!(classify_content("HEADER\nEND\n").is_empty());
    }

    #[test]
    fn test_bond_inference_on_ethanol() {
        let atoms = parse_heavy_atoms(&ethanol_pdb());
        let bonds = infer_bonds(&atoms);
        assert_eq!(bonds.len(), 2);
        assert!(bonds.contains(&(0, 1)));
        assert!(bonds.contains(&(1, 2)));
    }

    #[test]
    fn test_strict_smiles_ethanol() {
        let smiles = strict_smiles(&ethanol_pdb()).unwrap();
        // Canonical traversal starts at the lowest-ranked terminal carbon
        assert_eq!(smiles, "CCO");
    }

    #[test]
    fn test_strict_smiles_is_deterministic_under_reordering() {
        let forward = strict_smiles(&ethanol_pdb()).unwrap();
        let reversed = [
            atom_line(1, "O1", 2.24, 1.21, 0.0, "O"),
            atom_line(2, "C2", 1.52, 0.0, 0.0, "C"),
            atom_line(3, "C1", 0.0, 0.0, 0.0, "C"),
        ]
        .join("\n");
        assert_eq!(forward, strict_smiles(&reversed).unwrap());
    }

    #[test]
    fn test_sanitize_rejects_overbonded_carbon() {
        // Five neighbors crowded around one carbon
        let mut lines = vec![atom_line(1, "C0", 0.0, 0.0, 0.0, "C")];
        let offsets = [
            (1.5, 0.0, 0.0),
            (-1.5, 0.0, 0.0),
            (0.0, 1.5, 0.0),
            (0.0, -1.5, 0.0),
            (0.0, 0.0, 1.5),
        ];
        for (i, (x, y, z)) in offsets.iter().enumerate() {
            lines.push(atom_line(i as u32 + 2, "C", *x, *y, *z, "C"));
        }
        let content = lines.join("\n");
        assert!(strict_smiles(&content).is_err());
    }

    #[test]
    fn test_strict_smiles_empty_file_fails() {
        assert!(strict_smiles("HEADER\nEND\n").is_err());
    }

    #[test]
    fn test_disconnected_fragments_join_with_dot() {
        let content = [
            atom_line(1, "C1", 0.0, 0.0, 0.0, "C"),
            atom_line(2, "C2", 50.0, 0.0, 0.0, "C"),
        ]
        .join("\n");
        let smiles = strict_smiles(&content).unwrap();
        assert_eq!(smiles, "C.C");
    }

    #[test]
    fn test_ring_closure_digits_on_cyclopropane() {
        let content = [
            atom_line(1, "C1", 0.0, 0.0, 0.0, "C"),
            atom_line(2, "C2", 1.5, 0.0, 0.0, "C"),
            atom_line(3, "C3", 0.75, 1.3, 0.0, "C"),
        ]
        .join("\n");
        let smiles = strict_smiles(&content).unwrap();
        assert_eq!(smiles, "C1CC1");
    }

    #[test]
    fn test_classification_fragment() {
        let atoms = parse_heavy_atoms(&ethanol_pdb());
        let bonds = infer_bonds(&atoms);
        let graph = MolGraph { atoms, bonds };
        let tags = classify(&graph);
        assert_eq!(tags, vec!["Fragment".to_string()]);
    }

    #[test]
    fn test_macrocycle_detection() {
        // A 12-membered carbon ring laid out on a circle of radius ~2.9 A,
        // giving ~1.5 A between neighbors.
        let radius = 2.9;
        let lines: Vec<String> = (0..12)
            .map(|i| {
                let theta = (i as f64) * std::f64::consts::TAU / 12.0;
                atom_line(
                    i + 1,
                    "C",
                    radius * theta.cos(),
                    radius * theta.sin(),
                    0.0,
                    "C",
                )
            })
            .collect();
        let atoms = parse_heavy_atoms(&lines.join("\n"));
        let bonds = infer_bonds(&atoms);
        assert_eq!(bonds.len(), 12);
        let graph = MolGraph { atoms, bonds };
        assert!(classify(&graph).contains(&"Macrocycle".to_string()));
    }

    #[test]
    fn test_duplicate_groups_by_smiles() {
        let entries = vec![
            ("lig_a".to_string(), "CCO".to_string()),
            ("lig_b".to_string(), "c1ccccc1".to_string()),
            ("lig_c".to_string(), "CCO".to_string()),
        ];
        let groups = duplicate_groups(&entries);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "CCO");
        assert_eq!(groups[0].1, vec!["lig_a".to_string(), "lig_c".to_string()]);
    }

    #[test]
    fn test_no_duplicates_yields_no_groups() {
        let entries = vec![
            ("lig_a".to_string(), "CCO".to_string()),
            ("lig_b".to_string(), "CCN".to_string()),
        ];
        assert!(duplicate_groups(&entries).is_empty());
    }

    struct FixedConverter(Option<String>);

    #[async_trait]
    impl StructureConverter for FixedConverter {
        async fn convert(&self, _path: &Path) -> Result<String> {
            self.0
                .clone()
                .ok_or_else(|| anyhow::anyhow!("converter unavailable"))
        }
    }

    #[tokio::test]
    async fn test_extractor_prefers_strict_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ligand.pdb");
        std::fs::write(&path, ethanol_pdb()).unwrap();

        let extractor = SmilesExtractor::new(Box::new(FixedConverter(Some("XXX".to_string()))));
        assert_eq!(extractor.extract(&path).await, Some("CCO".to_string()));
    }

    #[tokio::test]
    async fn test_extractor_falls_back_to_lenient() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ligand.pdb");
        std::fs::write(&path, "HEADER\nEND\n").unwrap();

        let extractor =
            SmilesExtractor::new(Box::new(FixedConverter(Some("c1ccccc1".to_string()))));
        assert_eq!(extractor.extract(&path).await, Some("c1ccccc1".to_string()));
    }

    #[tokio::test]
    async fn test_extractor_yields_none_when_both_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ligand.pdb");
        std::fs::write(&path, "HEADER\nEND\n").unwrap();

        let extractor = SmilesExtractor::new(Box::new(FixedConverter(None)));
        assert_eq!(extractor.extract(&path).await, None);
    }

    #[tokio::test]
    async fn test_missing_obabel_degrades_to_error_not_panic() {
        let converter = ObabelConverter::new(
            "/nonexistent/obabel-binary",
            Duration::from_secs(1),
        );
        let result = converter.convert(Path::new("whatever.pdb")).await;
        assert!(result.is_err());
    }
}
