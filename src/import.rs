//! Flow-graph export import
//!
//! Reads the flow-graph editor's JSON export (nodes plus their
//! selectable parameters) and populates the catalog database.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::db;
use crate::models::{FlowNode, ParameterSpec};

/// Top-level editor export document
#[derive(Debug, Deserialize)]
pub struct GraphDoc {
    pub nodes: Vec<GraphNode>,
}

/// One node as the editor exports it
#[derive(Debug, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    /// Fixed continuous-phase pump, excluded from generation
    #[serde(default)]
    pub carrier: bool,
    /// End-stage node, excluded from the droplet table
    #[serde(default)]
    pub end_stage: bool,
    #[serde(default)]
    pub parameters: Vec<GraphParameter>,
}

#[derive(Debug, Deserialize)]
pub struct GraphParameter {
    pub name: String,
    /// Falls back to the parameter name when the export carries none
    #[serde(default)]
    pub label: Option<String>,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub ratio: bool,
}

/// Parse one graph export document
pub fn read_graph(path: &Path) -> Result<GraphDoc> {
    let file = File::open(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let doc = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(doc)
}

/// Import a single export file into the catalog
pub fn import_file(conn: &Connection, path: &Path, stats: &mut ImportStats) -> Result<()> {
    let doc = read_graph(path)?;

    for node in &doc.nodes {
        db::upsert_node(
            conn,
            &FlowNode {
                id: node.id.clone(),
                node_type: node.node_type.clone(),
                label: node.label.clone(),
                carrier: node.carrier,
                end_stage: node.end_stage,
            },
        )?;

        for param in &node.parameters {
            db::upsert_parameter(
                conn,
                &ParameterSpec {
                    node_id: node.id.clone(),
                    node_name: node.label.clone(),
                    name: param.name.clone(),
                    label: param.label.clone().unwrap_or_else(|| param.name.clone()),
                    min: param.min,
                    max: param.max,
                    default: param.default,
                    unit: param.unit.clone(),
                    is_ratio: param.ratio,
                },
            )?;
            stats.parameters += 1;
        }

        stats.nodes += 1;
    }

    Ok(())
}

/// Import a graph export file, or every .json file under a directory
pub fn import_path(conn: &Connection, path: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    if path.is_dir() {
        for entry in WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let entry_path = entry.path();
            if entry_path.extension().map_or(false, |ext| ext == "json") {
                match import_file(conn, entry_path, &mut stats) {
                    Ok(()) => println!("  Imported: {}", entry_path.display()),
                    Err(e) => {
                        eprintln!("  Error importing {}: {}", entry_path.display(), e);
                        stats.errors += 1;
                    }
                }
            } else if entry_path.is_file() {
                stats.skipped += 1;
            }
        }
    } else {
        import_file(conn, path, &mut stats)?;
        println!("  Imported: {}", path.display());
    }

    Ok(stats)
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub nodes: usize,
    pub parameters: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} nodes ({} parameters). Skipped: {}, Errors: {}",
            self.nodes, self.parameters, self.skipped, self.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_GRAPH: &str = r#"{
        "nodes": [
            {
                "id": "pump-oil",
                "type": "pump",
                "label": "Oil Carrier",
                "carrier": true,
                "parameters": [
                    { "name": "flow_rate", "min": 0.5, "max": 20.0, "default": 5.0, "unit": "uL/min" }
                ]
            },
            {
                "id": "pump-a",
                "type": "pump",
                "label": "Reagent A",
                "parameters": [
                    { "name": "flow_fraction", "min": 0.0, "max": 1.0, "default": 0.5, "ratio": true }
                ]
            }
        ]
    }"#;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn import_populates_the_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(&path, SAMPLE_GRAPH).unwrap();

        let conn = open();
        let stats = import_path(&conn, &path).unwrap();
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.parameters, 2);

        let catalog = db::load_catalog(&conn).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].node_id, "pump-oil");
        assert_eq!(catalog[0].node_name, "Oil Carrier");
        assert_eq!(catalog[0].unit, "uL/min");
        assert!(!catalog[0].is_ratio);
        assert!(catalog[1].is_ratio);
        // Label falls back to the parameter name when the export has none
        assert_eq!(catalog[1].label, "flow_fraction");

        let excluded = db::excluded_node_ids(&conn).unwrap();
        assert!(excluded.contains("pump-oil"));
        assert!(!excluded.contains("pump-a"));
    }

    #[test]
    fn directory_import_walks_json_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("graph.json"), SAMPLE_GRAPH).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a graph").unwrap();

        let conn = open();
        let stats = import_path(&conn, dir.path()).unwrap();
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn malformed_files_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("graph.json"), SAMPLE_GRAPH).unwrap();

        let conn = open();
        let stats = import_path(&conn, dir.path()).unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.nodes, 2);
    }
}
