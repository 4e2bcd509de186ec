//! Droplet Experiment Designer
//!
//! Generates parameterized droplet batches (experiment conditions) from
//! a microfluidic flow-graph parameter catalog.

mod db;
mod design;
mod generate;
mod import;
mod interpolate;
mod models;
mod normalize;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use regex::Regex;
use rusqlite::Connection;

use crate::models::{Droplet, NormalizationPolicy, ParameterSpec};

#[derive(Parser)]
#[command(name = "droplet-designer")]
#[command(about = "Experiment design generator for microfluidic droplet batches")]
struct Cli {
    /// Path to the SQLite catalog database
    #[arg(short, long, default_value = "flowgraph.db")]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    /// Scale unpinned ratio parameters so each group sums to 1
    Distribute,
    /// One balancing node absorbs the remainder of its group
    SingleBalance,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a flow-graph editor export into the catalog
    Import {
        /// Path to a graph JSON export, or a directory of exports
        path: PathBuf,

        /// Clear the existing catalog before importing
        #[arg(long)]
        clear: bool,
    },

    /// Generate a pairwise factorial design over selected parameters
    Factorial {
        /// Parameters to vary, as node:parameter pairs (at least two)
        #[arg(short, long = "select", value_name = "NODE:PARAM", required = true)]
        select: Vec<String>,

        /// Ratio rebalancing policy
        #[arg(long, value_enum, default_value_t = PolicyArg::Distribute)]
        policy: PolicyArg,

        /// Balancing node id (required for single-balance)
        #[arg(long)]
        balancing_node: Option<String>,

        /// Write the generated droplets to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the full run table
        #[arg(short, long)]
        verbose: bool,
    },

    /// Sweep one parameter linearly across a range
    Sweep {
        /// Node id
        node: String,

        /// Parameter name on that node
        parameter: String,

        /// Sweep start (defaults to the parameter's min)
        #[arg(long)]
        min: Option<f64>,

        /// Sweep end (defaults to the parameter's max)
        #[arg(long)]
        max: Option<f64>,

        /// Number of droplets to spread across the range
        #[arg(short, long, default_value_t = 5)]
        steps: usize,

        /// Ratio rebalancing policy
        #[arg(long, value_enum, default_value_t = PolicyArg::Distribute)]
        policy: PolicyArg,

        /// Balancing node id (required for single-balance)
        #[arg(long)]
        balancing_node: Option<String>,

        /// Write the generated droplets to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the full run table
        #[arg(short, long)]
        verbose: bool,
    },

    /// List all nodes in the catalog
    ListNodes {
        /// Only show nodes whose id or label matches this regex
        #[arg(long)]
        filter: Option<String>,
    },

    /// List all selectable parameters in the catalog
    ListParameters {
        /// Only show parameters whose node, name or label matches this regex
        #[arg(long)]
        filter: Option<String>,
    },

    /// Show details for one node
    Node {
        /// Node id
        id: String,
    },

    /// Reload an exported droplet batch and print it
    Show {
        /// Path to a droplet JSON document
        path: PathBuf,
    },

    /// Initialize an empty catalog database
    Init,

    /// Load a sample flow graph for testing without an editor export
    LoadSample,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let conn = Connection::open(&cli.database)?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Import { path, clear } => {
            if clear {
                println!("Clearing existing catalog...");
                db::clear_catalog(&conn)?;
            }

            let stats = import::import_path(&conn, &path)?;
            println!("\n{}", stats);
        }

        Commands::Factorial {
            select,
            policy,
            balancing_node,
            output,
            verbose,
        } => {
            let catalog = db::load_catalog(&conn)?;
            let excluded = db::excluded_node_ids(&conn)?;
            let policy = build_policy(policy, balancing_node)?;
            let selected = parse_selections(&select)?;

            let run_prefix = Utc::now().timestamp_millis().to_string();
            let droplets =
                generate::factorial_batch(&catalog, &selected, &policy, &excluded, &run_prefix)?;

            report_batch(&droplets, &catalog, output.as_deref(), verbose)?;
        }

        Commands::Sweep {
            node,
            parameter,
            min,
            max,
            steps,
            policy,
            balancing_node,
            output,
            verbose,
        } => {
            let catalog = db::load_catalog(&conn)?;
            let excluded = db::excluded_node_ids(&conn)?;
            let policy = build_policy(policy, balancing_node)?;

            let spec = catalog
                .iter()
                .find(|s| s.node_id == node && s.name == parameter)
                .ok_or_else(|| anyhow!("Parameter '{}:{}' not found in catalog", node, parameter))?;
            let min = min.unwrap_or(spec.min);
            let max = max.unwrap_or(spec.max);

            let run_prefix = Utc::now().timestamp_millis().to_string();
            let droplets = generate::sweep_batch(
                &catalog,
                &node,
                &parameter,
                min,
                max,
                steps,
                &policy,
                &excluded,
                &run_prefix,
            )?;

            report_batch(&droplets, &catalog, output.as_deref(), verbose)?;
        }

        Commands::ListNodes { filter } => {
            let filter = compile_filter(filter.as_deref())?;
            let nodes: Vec<_> = db::list_nodes(&conn)?
                .into_iter()
                .filter(|n| match &filter {
                    Some(re) => re.is_match(&n.id) || re.is_match(&n.label),
                    None => true,
                })
                .collect();

            if nodes.is_empty() {
                println!("No nodes in catalog. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<16} {:<12} {:<24} {:<10}", "Id", "Type", "Label", "Role");
                println!("{}", "-".repeat(64));
                for n in nodes {
                    let role = if n.carrier {
                        "carrier"
                    } else if n.end_stage {
                        "end-stage"
                    } else {
                        ""
                    };
                    println!("{:<16} {:<12} {:<24} {:<10}", n.id, n.node_type, n.label, role);
                }
            }
        }

        Commands::ListParameters { filter } => {
            let filter = compile_filter(filter.as_deref())?;
            let params: Vec<_> = db::load_catalog(&conn)?
                .into_iter()
                .filter(|s| match &filter {
                    Some(re) => {
                        re.is_match(&s.node_id) || re.is_match(&s.name) || re.is_match(&s.label)
                    }
                    None => true,
                })
                .collect();

            if params.is_empty() {
                println!("No parameters in catalog. Run 'import' or 'load-sample' first.");
            } else {
                println!(
                    "{:<28} {:>10} {:>10} {:>10} {:<10} {:<6}",
                    "Parameter", "Min", "Max", "Default", "Unit", "Ratio"
                );
                println!("{}", "-".repeat(80));
                for s in params {
                    println!(
                        "{:<28} {:>10.3} {:>10.3} {:>10.3} {:<10} {:<6}",
                        format!("{}:{}", s.node_id, s.name),
                        s.min,
                        s.max,
                        s.default,
                        s.unit,
                        if s.is_ratio { "yes" } else { "" }
                    );
                }
            }
        }

        Commands::Node { id } => match db::get_node(&conn, &id)? {
            Some(node) => {
                println!("Node: {}", node.label);
                println!("  Id: {}", node.id);
                println!("  Type: {}", node.node_type);
                if node.carrier {
                    println!("  Role: carrier (excluded from generation)");
                }
                if node.end_stage {
                    println!("  Role: end-stage (excluded from the droplet table)");
                }

                let params = db::node_parameters(&conn, &id)?;
                if !params.is_empty() {
                    println!("  Parameters:");
                    for p in params {
                        println!(
                            "    {} [{} .. {}] default {} {}{}",
                            p.name,
                            p.min,
                            p.max,
                            p.default,
                            p.unit,
                            if p.is_ratio { " (ratio)" } else { "" }
                        );
                    }
                }
            }
            None => println!("Node '{}' not found", id),
        },

        Commands::Show { path } => {
            let droplets = generate::load_droplets(&path)?;
            if droplets.is_empty() {
                return Err(generate::ValidationError::NoDropletsGenerated.into());
            }

            let catalog = db::load_catalog(&conn)?;
            println!("Run table:\n");
            print!("{}", generate::format_run_table(&droplets));
            println!();
            println!("{}", generate::summarize_batch(&droplets, &catalog));
        }

        Commands::Init => {
            println!("Catalog initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            load_sample_graph(&conn)?;
            println!("Sample graph loaded successfully!");
        }
    }

    Ok(())
}

/// Build the normalization policy from the CLI flags
fn build_policy(arg: PolicyArg, balancing_node: Option<String>) -> Result<NormalizationPolicy> {
    match arg {
        PolicyArg::Distribute => {
            if balancing_node.is_some() {
                bail!("--balancing-node only applies to --policy single-balance");
            }
            Ok(NormalizationPolicy::Distribute)
        }
        PolicyArg::SingleBalance => match balancing_node {
            Some(balancing_node) => Ok(NormalizationPolicy::SingleBalance { balancing_node }),
            None => bail!("--policy single-balance requires --balancing-node"),
        },
    }
}

/// Parse node:parameter selection pairs
fn parse_selections(args: &[String]) -> Result<Vec<(String, String)>> {
    let mut selections = Vec::with_capacity(args.len());
    for arg in args {
        match arg.split_once(':') {
            Some((node, name)) if !node.is_empty() && !name.is_empty() => {
                selections.push((node.to_string(), name.to_string()));
            }
            _ => bail!("Invalid selection '{}', expected node:parameter", arg),
        }
    }
    Ok(selections)
}

/// Compile the optional --filter regex
fn compile_filter(pattern: Option<&str>) -> Result<Option<Regex>> {
    match pattern {
        Some(p) => {
            let re = Regex::new(p).with_context(|| format!("Invalid filter pattern '{}'", p))?;
            Ok(Some(re))
        }
        None => Ok(None),
    }
}

/// Print the batch summary (and optionally the run table), writing the
/// droplet document when requested
fn report_batch(
    droplets: &[Droplet],
    catalog: &[ParameterSpec],
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    if verbose {
        println!("Run table:\n");
        print!("{}", generate::format_run_table(droplets));
        println!();
    }

    println!("{}", generate::summarize_batch(droplets, catalog));

    if let Some(path) = output {
        generate::save_droplets(path, droplets)?;
        println!("Wrote {} droplets to {}", droplets.len(), path.display());
    }

    Ok(())
}

/// Load a small droplet-generation graph for testing without an editor export
fn load_sample_graph(conn: &Connection) -> Result<()> {
    use crate::models::FlowNode;

    db::clear_catalog(conn)?;

    // Continuous-phase carrier: fixed role, not an experimental factor
    db::upsert_node(
        conn,
        &FlowNode {
            id: "pump-oil".to_string(),
            node_type: "pump".to_string(),
            label: "Oil Carrier".to_string(),
            carrier: true,
            end_stage: false,
        },
    )?;
    db::upsert_parameter(
        conn,
        &ParameterSpec {
            node_id: "pump-oil".to_string(),
            node_name: "Oil Carrier".to_string(),
            name: "flow_rate".to_string(),
            label: "Flow rate".to_string(),
            min: 0.5,
            max: 20.0,
            default: 5.0,
            unit: "uL/min".to_string(),
            is_ratio: false,
        },
    )?;

    // Three aqueous pumps sharing the dispersed phase
    for (id, label, default) in [
        ("pump-a", "Reagent A", 0.4),
        ("pump-b", "Reagent B", 0.35),
        ("pump-c", "Buffer", 0.25),
    ] {
        db::upsert_node(
            conn,
            &FlowNode {
                id: id.to_string(),
                node_type: "pump".to_string(),
                label: label.to_string(),
                carrier: false,
                end_stage: false,
            },
        )?;
        db::upsert_parameter(
            conn,
            &ParameterSpec {
                node_id: id.to_string(),
                node_name: label.to_string(),
                name: "flow_fraction".to_string(),
                label: "Flow fraction".to_string(),
                min: 0.0,
                max: 1.0,
                default,
                unit: String::new(),
                is_ratio: true,
            },
        )?;
    }

    // Droplet-forming junction
    db::upsert_node(
        conn,
        &FlowNode {
            id: "junction-1".to_string(),
            node_type: "junction".to_string(),
            label: "T-Junction".to_string(),
            carrier: false,
            end_stage: false,
        },
    )?;
    db::upsert_parameter(
        conn,
        &ParameterSpec {
            node_id: "junction-1".to_string(),
            node_name: "T-Junction".to_string(),
            name: "droplet_volume".to_string(),
            label: "Droplet volume".to_string(),
            min: 0.05,
            max: 2.0,
            default: 0.5,
            unit: "nL".to_string(),
            is_ratio: false,
        },
    )?;

    // Incubation thermostat
    db::upsert_node(
        conn,
        &FlowNode {
            id: "thermo-1".to_string(),
            node_type: "thermostat".to_string(),
            label: "Incubator".to_string(),
            carrier: false,
            end_stage: false,
        },
    )?;
    db::upsert_parameter(
        conn,
        &ParameterSpec {
            node_id: "thermo-1".to_string(),
            node_name: "Incubator".to_string(),
            name: "temperature".to_string(),
            label: "Temperature".to_string(),
            min: 20.0,
            max: 95.0,
            default: 37.0,
            unit: "C".to_string(),
            is_ratio: false,
        },
    )?;

    // Outlet chiller before collection, excluded from the droplet table
    db::upsert_node(
        conn,
        &FlowNode {
            id: "thermo-out".to_string(),
            node_type: "thermostat".to_string(),
            label: "Outlet Chiller".to_string(),
            carrier: false,
            end_stage: true,
        },
    )?;
    db::upsert_parameter(
        conn,
        &ParameterSpec {
            node_id: "thermo-out".to_string(),
            node_name: "Outlet Chiller".to_string(),
            name: "temperature".to_string(),
            label: "Temperature".to_string(),
            min: 4.0,
            max: 25.0,
            default: 10.0,
            unit: "C".to_string(),
            is_ratio: false,
        },
    )?;

    println!("Loaded {} sample nodes", 6);
    Ok(())
}
