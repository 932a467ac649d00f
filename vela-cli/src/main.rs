use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use vela_core::blueprint;
use vela_core::config::{ConfigOverrides, NetworkStackConfig};
use vela_core::graph::DependencyGraph;
use vela_core::{DeploymentUnit, Severity};
use vela_provider_aws::Template;

#[derive(Parser)]
#[command(name = "vela")]
#[command(about = "Declarative network topology for AWS", long_about = None)]
struct Cli {
    /// Path to a JSON config file; reference values are used when omitted
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Maximum number of availability zones
    #[arg(long, global = true)]
    max_azs: Option<usize>,

    /// Number of NAT gateways
    #[arg(long, global = true)]
    nat_gateways: Option<usize>,

    /// Subnet mask applied to both subnet groups
    #[arg(long, global = true)]
    cidr_mask: Option<u8>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the stack and check it without writing anything
    Validate,
    /// Write the CloudFormation template and a manifest
    Synth {
        /// Output directory
        #[arg(long, short, default_value = "vela.out")]
        out: PathBuf,

        /// Print the template instead of writing files
        #[arg(long)]
        stdout: bool,
    },
    /// Compare an existing template with a fresh synthesis
    Diff {
        /// Path to a previously synthesized template
        template: PathBuf,
    },
    /// Show the resource dependency tree
    Graph,
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

/// Record of one synthesis run, written next to the template
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: String,
    stack: String,
    template_file: String,
    generated_at: DateTime<Utc>,
    resource_count: usize,
    output_count: usize,
    warnings: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let result = match &cli.command {
        Commands::Validate => run_validate(&cli),
        Commands::Synth { out, stdout } => run_synth(&cli, out, *stdout),
        Commands::Diff { template } => run_diff(&cli, template),
        Commands::Graph => run_graph(&cli),
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "vela", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn load_config(cli: &Cli) -> Result<NetworkStackConfig> {
    let mut config = match &cli.config {
        Some(path) => NetworkStackConfig::load(path)?,
        None => NetworkStackConfig::default(),
    };
    config.apply(&ConfigOverrides {
        max_azs: cli.max_azs,
        nat_gateways: cli.nat_gateways,
        cidr_mask: cli.cidr_mask,
    });
    Ok(config)
}

fn build_unit(config: &NetworkStackConfig) -> Result<DeploymentUnit> {
    let stack = blueprint::network_stack(config).context("Failed to build stack")?;
    let unit = stack.synthesize().context("Failed to synthesize stack")?;
    Ok(unit)
}

fn build_template(config: &NetworkStackConfig) -> Result<(DeploymentUnit, Template)> {
    let unit = build_unit(config)?;
    let template = Template::from_unit(&unit)?;
    Ok((unit, template))
}

fn print_diagnostics(unit: &DeploymentUnit) {
    for diagnostic in &unit.diagnostics {
        let label = match diagnostic.severity {
            Severity::Warning => "warning:".yellow().bold(),
            Severity::Notice => "notice:".cyan(),
        };
        eprintln!("{} {}", label, diagnostic.kind);
    }
}

fn run_validate(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    println!("{}", "Validating...".cyan());

    let (unit, _) = build_template(&config)?;
    print_diagnostics(&unit);

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            unit.resources.len()
        )
        .green()
        .bold()
    );
    for resource in &unit.resources {
        println!("  • {}", resource.id);
    }
    println!("{}", unit.summary());

    Ok(())
}

fn run_synth(cli: &Cli, out: &Path, stdout: bool) -> Result<()> {
    let config = load_config(cli)?;
    let (unit, template) = build_template(&config)?;
    print_diagnostics(&unit);

    if stdout {
        println!("{}", template.to_json_pretty()?);
        return Ok(());
    }

    let template_path = write_synth_output(out, &unit, &template, Utc::now())?;
    println!(
        "{} {}",
        "✓ Synthesized".green().bold(),
        template_path.display()
    );
    println!("{}", unit.summary());
    Ok(())
}

/// Write `<Stack>.template.json` and `manifest.json` into `out`
fn write_synth_output(
    out: &Path,
    unit: &DeploymentUnit,
    template: &Template,
    generated_at: DateTime<Utc>,
) -> Result<PathBuf> {
    fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;

    let template_file = format!("{}.template.json", unit.name);
    let template_path = out.join(&template_file);
    fs::write(&template_path, template.to_json_pretty()? + "\n")
        .with_context(|| format!("Failed to write {}", template_path.display()))?;

    let manifest = Manifest {
        version: env!("CARGO_PKG_VERSION").to_string(),
        stack: unit.name.clone(),
        template_file,
        generated_at,
        resource_count: unit.resources.len(),
        output_count: unit.outputs.len(),
        warnings: unit.warnings().map(|d| d.kind.to_string()).collect(),
    };
    let manifest_path = out.join("manifest.json");
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)? + "\n")
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

    log::info!(
        "wrote {} and {}",
        template_path.display(),
        manifest_path.display()
    );
    Ok(template_path)
}

fn run_diff(cli: &Cli, path: &Path) -> Result<()> {
    let existing = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    // Re-serialize so that formatting differences do not show up
    let existing = Template::from_json_str(&existing)
        .with_context(|| format!("{} is not a CloudFormation template", path.display()))?
        .to_json_pretty()?;

    let config = load_config(cli)?;
    let (_, template) = build_template(&config)?;
    let fresh = template.to_json_pretty()?;

    let changes = diff_lines(&existing, &fresh);
    if changes.iter().all(|(tag, _)| *tag == ChangeTag::Equal) {
        println!("{}", "No differences.".green());
        return Ok(());
    }

    println!("\n{} {}:", "Diff for".cyan().bold(), path.display());
    for (tag, line) in &changes {
        let sign = match tag {
            ChangeTag::Delete => "-".red(),
            ChangeTag::Insert => "+".green(),
            ChangeTag::Equal => " ".normal(),
        };
        print!("{}{}", sign, line);
    }
    Ok(())
}

fn diff_lines(old: &str, new: &str) -> Vec<(ChangeTag, String)> {
    TextDiff::from_lines(old, new)
        .iter_all_changes()
        .map(|change| (change.tag(), change.to_string()))
        .collect()
}

fn run_graph(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let unit = build_unit(&config)?;

    if unit.graph.has_cycle() {
        bail!("dependency graph of {} has a cycle", unit.name);
    }

    println!("{}", "Dependency Graph:".cyan().bold());
    println!();
    for line in dependency_tree(&unit.graph) {
        println!("  {}", line);
    }
    Ok(())
}

/// Render the graph as a tree: roots first, each node followed by the
/// resources that depend on it. Nodes are shown once.
fn dependency_tree(graph: &DependencyGraph) -> Vec<String> {
    fn walk(
        node: &str,
        graph: &DependencyGraph,
        printed: &mut HashSet<String>,
        prefix: &str,
        connector: &str,
        lines: &mut Vec<String>,
    ) {
        if !printed.insert(node.to_string()) {
            return;
        }
        lines.push(format!("{}{}{}", prefix, connector, node));

        let children: Vec<_> = graph
            .dependents_of(node)
            .iter()
            .filter(|c| !printed.contains(c.as_str()))
            .collect();
        let child_prefix = match connector {
            "" => prefix.to_string(),
            "└─ " => format!("{}   ", prefix),
            _ => format!("{}│  ", prefix),
        };
        for (i, child) in children.iter().enumerate() {
            let connector = if i + 1 == children.len() { "└─ " } else { "├─ " };
            walk(child, graph, printed, &child_prefix, connector, lines);
        }
    }

    let mut lines = Vec::new();
    let mut printed = HashSet::new();
    for root in graph.root_nodes() {
        walk(root, graph, &mut printed, "", "", &mut lines);
    }
    lines
}
