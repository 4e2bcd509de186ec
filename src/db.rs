//! Catalog database schema and operations

use std::collections::HashSet;

use anyhow::Result;
use rusqlite::Connection;

use crate::models::{FlowNode, ParameterSpec};

/// Initialize the catalog schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Flow-graph nodes, as imported from the editor export
        CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            node_type TEXT NOT NULL,
            label TEXT NOT NULL,
            carrier INTEGER NOT NULL DEFAULT 0,
            end_stage INTEGER NOT NULL DEFAULT 0
        );

        -- Selectable parameters exposed by each node
        CREATE TABLE IF NOT EXISTS node_parameters (
            node_id TEXT,
            name TEXT,
            label TEXT NOT NULL,
            min REAL NOT NULL,
            max REAL NOT NULL,
            default_value REAL NOT NULL,
            unit TEXT NOT NULL DEFAULT '',
            is_ratio INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (node_id, name)
        );

        CREATE INDEX IF NOT EXISTS idx_node_parameters_node ON node_parameters(node_id);
        "#,
    )?;
    Ok(())
}

/// Insert or replace a node
pub fn upsert_node(conn: &Connection, node: &FlowNode) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO nodes (id, node_type, label, carrier, end_stage)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            &node.id,
            &node.node_type,
            &node.label,
            node.carrier,
            node.end_stage,
        ),
    )?;
    Ok(())
}

/// Insert or replace one parameter of a node
pub fn upsert_parameter(conn: &Connection, spec: &ParameterSpec) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO node_parameters (node_id, name, label, min, max, default_value, unit, is_ratio)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        (
            &spec.node_id,
            &spec.name,
            &spec.label,
            spec.min,
            spec.max,
            spec.default,
            &spec.unit,
            spec.is_ratio,
        ),
    )?;
    Ok(())
}

/// Clear all imported nodes and parameters (for re-import)
pub fn clear_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM node_parameters;
        DELETE FROM nodes;
        "#,
    )?;
    Ok(())
}

/// Load the full parameter catalog in import order
pub fn load_catalog(conn: &Connection) -> Result<Vec<ParameterSpec>> {
    let mut stmt = conn.prepare(
        "SELECT p.node_id, n.label, p.name, p.label, p.min, p.max, p.default_value, p.unit, p.is_ratio
         FROM node_parameters p
         JOIN nodes n ON n.id = p.node_id
         ORDER BY n.rowid, p.rowid",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(ParameterSpec {
            node_id: row.get(0)?,
            node_name: row.get(1)?,
            name: row.get(2)?,
            label: row.get(3)?,
            min: row.get(4)?,
            max: row.get(5)?,
            default: row.get(6)?,
            unit: row.get(7)?,
            is_ratio: row.get(8)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Node ids excluded from generation: carrier pumps and end-stage nodes
pub fn excluded_node_ids(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT id FROM nodes WHERE carrier = 1 OR end_stage = 1")?;

    let rows = stmt.query_map([], |row| row.get(0))?;

    let mut ids = HashSet::new();
    for row in rows {
        ids.insert(row?);
    }
    Ok(ids)
}

/// List all nodes in import order
pub fn list_nodes(conn: &Connection) -> Result<Vec<FlowNode>> {
    let mut stmt = conn
        .prepare("SELECT id, node_type, label, carrier, end_stage FROM nodes ORDER BY rowid")?;

    let rows = stmt.query_map([], |row| {
        Ok(FlowNode {
            id: row.get(0)?,
            node_type: row.get(1)?,
            label: row.get(2)?,
            carrier: row.get(3)?,
            end_stage: row.get(4)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Fetch one node by id
pub fn get_node(conn: &Connection, id: &str) -> Result<Option<FlowNode>> {
    let mut stmt =
        conn.prepare("SELECT id, node_type, label, carrier, end_stage FROM nodes WHERE id = ?1")?;

    let mut rows = stmt.query_map([id], |row| {
        Ok(FlowNode {
            id: row.get(0)?,
            node_type: row.get(1)?,
            label: row.get(2)?,
            carrier: row.get(3)?,
            end_stage: row.get(4)?,
        })
    })?;

    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// Parameters of one node in import order
pub fn node_parameters(conn: &Connection, node_id: &str) -> Result<Vec<ParameterSpec>> {
    let mut stmt = conn.prepare(
        "SELECT p.node_id, n.label, p.name, p.label, p.min, p.max, p.default_value, p.unit, p.is_ratio
         FROM node_parameters p
         JOIN nodes n ON n.id = p.node_id
         WHERE p.node_id = ?1
         ORDER BY p.rowid",
    )?;

    let rows = stmt.query_map([node_id], |row| {
        Ok(ParameterSpec {
            node_id: row.get(0)?,
            node_name: row.get(1)?,
            name: row.get(2)?,
            label: row.get(3)?,
            min: row.get(4)?,
            max: row.get(5)?,
            default: row.get(6)?,
            unit: row.get(7)?,
            is_ratio: row.get(8)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn node(id: &str, carrier: bool, end_stage: bool) -> FlowNode {
        FlowNode {
            id: id.to_string(),
            node_type: "pump".to_string(),
            label: id.to_uppercase(),
            carrier,
            end_stage,
        }
    }

    fn param(node_id: &str, name: &str, default: f64) -> ParameterSpec {
        ParameterSpec {
            node_id: node_id.to_string(),
            node_name: node_id.to_uppercase(),
            name: name.to_string(),
            label: name.to_string(),
            min: 0.0,
            max: 1.0,
            default,
            unit: String::new(),
            is_ratio: false,
        }
    }

    #[test]
    fn catalog_keeps_import_order() {
        let conn = open();
        for id in ["n3", "n1", "n2"] {
            upsert_node(&conn, &node(id, false, false)).unwrap();
            upsert_parameter(&conn, &param(id, "p", 0.5)).unwrap();
        }

        let catalog = load_catalog(&conn).unwrap();
        let ids: Vec<&str> = catalog.iter().map(|s| s.node_id.as_str()).collect();
        assert_eq!(ids, ["n3", "n1", "n2"]);
        assert_eq!(catalog[0].node_name, "N3");
    }

    #[test]
    fn excluded_ids_cover_carrier_and_end_stage() {
        let conn = open();
        upsert_node(&conn, &node("oil", true, false)).unwrap();
        upsert_node(&conn, &node("chiller", false, true)).unwrap();
        upsert_node(&conn, &node("pump-a", false, false)).unwrap();

        let excluded = excluded_node_ids(&conn).unwrap();
        assert!(excluded.contains("oil"));
        assert!(excluded.contains("chiller"));
        assert!(!excluded.contains("pump-a"));
    }

    #[test]
    fn reimport_replaces_rather_than_duplicates() {
        let conn = open();
        upsert_node(&conn, &node("n1", false, false)).unwrap();
        upsert_parameter(&conn, &param("n1", "p", 0.5)).unwrap();
        upsert_parameter(&conn, &param("n1", "p", 0.8)).unwrap();

        let catalog = load_catalog(&conn).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].default, 0.8);
    }

    #[test]
    fn missing_node_lookup_is_none() {
        let conn = open();
        assert!(get_node(&conn, "nope").unwrap().is_none());

        upsert_node(&conn, &node("n1", false, false)).unwrap();
        let found = get_node(&conn, "n1").unwrap().unwrap();
        assert_eq!(found.label, "N1");
    }
}
