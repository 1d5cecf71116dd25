//! `verdant`: inspect a persisted notebook history

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use verdant_history::{History, HistoryConfig, SearchKind};
use verdant_nodey::{parse_lineage_or_name, render, sample_line, NodeName, Nodey};
use verdant_stage::NotebookSession;

fn cli() -> Command {
    Command::new("verdant")
        .version(verdant_history::VERSION)
        .about("Inspect a Verdant notebook history file")
        .subcommand_required(true)
        .arg(
            Arg::new("file")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("History file written by a notebook session"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("TOML file with history configuration"),
        )
        .subcommand(
            Command::new("versions")
                .about("Render every version of a lineage")
                .arg(
                    Arg::new("node")
                        .required(true)
                        .help("Lineage (cell.sub) or version name (cell.sub.version)"),
                ),
        )
        .subcommand(
            Command::new("notebook")
                .about("List the cells of a notebook version")
                .arg(
                    Arg::new("version")
                        .value_parser(value_parser!(u32))
                        .help("Notebook version (default: latest)"),
                ),
        )
        .subcommand(
            Command::new("search")
                .about("Search committed versions")
                .arg(Arg::new("query").required(true).help("Whitespace separated keywords"))
                .arg(
                    Arg::new("kind")
                        .long("kind")
                        .default_value("all")
                        .value_parser(["all", "code", "markdown", "output"])
                        .help("Which lineages to search"),
                ),
        )
        .subcommand(
            Command::new("events")
                .about("List the checkpoints of a notebook version")
                .arg(
                    Arg::new("version")
                        .required(true)
                        .value_parser(value_parser!(u32)),
                ),
        )
        .subcommand(
            Command::new("ghost")
                .about("Show a notebook version with deleted cells and outputs")
                .arg(
                    Arg::new("version")
                        .required(true)
                        .value_parser(value_parser!(u32)),
                ),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let matches = cli().get_matches();
    let file = matches
        .get_one::<PathBuf>("file")
        .context("missing history file")?;
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            HistoryConfig::from_toml_str(&text)?
        }
        None => HistoryConfig::default(),
    };

    let session = NotebookSession::open(file, config)
        .await
        .with_context(|| format!("opening {}", file.display()))?;
    info!(path = %file.display(), "history opened");

    match matches.subcommand() {
        Some(("versions", args)) => versions(session.history(), args),
        Some(("notebook", args)) => notebook(session.history(), args.get_one::<u32>("version").copied()),
        Some(("search", args)) => search(session.history(), args),
        Some(("events", args)) => events(session.history(), version_arg(args)?),
        Some(("ghost", args)) => ghost(&session, version_arg(args)?),
        _ => bail!("unknown command"),
    }
}

fn version_arg(args: &ArgMatches) -> anyhow::Result<u32> {
    args.get_one::<u32>("version")
        .copied()
        .context("missing notebook version")
}

fn versions(history: &Arc<History>, args: &ArgMatches) -> anyhow::Result<()> {
    let node = args.get_one::<String>("node").context("missing node")?;
    let lineage = parse_lineage_or_name(node)?;
    let snapshot = history.store().snapshot();
    let versions = snapshot.get_versions_for(lineage);
    if versions.is_empty() {
        bail!("no versions of {lineage}");
    }
    for version in versions {
        println!("── {} (checkpoint {}, notebook {})", version.name(), version.meta().created, version.meta().notebook);
        println!("{}", render(&version, &*snapshot)?);
    }
    Ok(())
}

fn notebook(history: &Arc<History>, version: Option<u32>) -> anyhow::Result<()> {
    let snapshot = history.store().snapshot();
    let notebook = match version {
        Some(version) => snapshot.get_notebook(version)?,
        None => snapshot.current_notebook().context("history has no notebook")?,
    };
    println!("notebook {} ({} cells)", notebook.version, notebook.cells.len());
    for (index, name) in notebook.cells.iter().enumerate() {
        let cell = snapshot.get(name)?;
        let preview = sample_line(&cell, &*snapshot, None)?.map(|s| s.line).unwrap_or_default();
        println!("{index:>4}  {name:<10} {}  {preview}", kind_label(&cell));
    }
    Ok(())
}

fn search(history: &Arc<History>, args: &ArgMatches) -> anyhow::Result<()> {
    let query = args.get_one::<String>("query").context("missing query")?;
    let kinds: &[SearchKind] = match args.get_one::<String>("kind").map(String::as_str) {
        Some("code") => &[SearchKind::Code],
        Some("markdown") => &[SearchKind::Markdown],
        Some("output") => &[SearchKind::Output],
        _ => &[SearchKind::Code, SearchKind::Markdown, SearchKind::Output],
    };
    let snapshot = history.store().snapshot();
    for kind in kinds {
        for group in history.search(*kind, query) {
            let Some(latest) = group.last() else { continue };
            let names: Vec<String> = group.iter().map(|v| v.name().to_string()).collect();
            let preview = sample_line(latest, &*snapshot, Some(query))?.map(|s| s.line).unwrap_or_default();
            println!("{:?} {}  [{}]  {}", kind, latest.lineage(), names.join(", "), preview.trim());
        }
    }
    Ok(())
}

fn events(history: &Arc<History>, version: u32) -> anyhow::Result<()> {
    let checkpoints = history.checkpoints().get_by_notebook(version);
    if checkpoints.is_empty() {
        println!("no checkpoints for notebook {version}");
    }
    for checkpoint in checkpoints {
        println!("#{} {:?} at {}", checkpoint.id, checkpoint.checkpoint_type, checkpoint.timestamp);
        for change in &checkpoint.target_cells {
            let outputs: Vec<String> = change.new_output.iter().map(NodeName::to_string).collect();
            println!("    {:>4} {} {:?} {}", change.index, change.node, change.change_type, outputs.join(" "));
        }
    }
    Ok(())
}

fn ghost(session: &NotebookSession, version: u32) -> anyhow::Result<()> {
    let book = session.ghost_book(version)?;
    println!("notebook {}", book.notebook);
    for cell in book.cells {
        let marker = if cell.deleted { "deleted" } else { "" };
        let prior = cell.prior.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        let output = cell.output.map(|o| o.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4}  {:<10} prior {:<10} output {:<10} events {}  {marker}",
            cell.index,
            cell.name,
            prior,
            output,
            cell.events.len()
        );
    }
    Ok(())
}

fn kind_label(cell: &Nodey) -> &'static str {
    match cell {
        Nodey::CodeCell(_) | Nodey::Code(_) => "code",
        Nodey::Markdown(_) => "markdown",
        Nodey::Output(_) => "output",
    }
}
