//! Stencil CLI - query synthesis and rendering for data-bound pages

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;

use stencil::{
    scan, synthesize, Command, CycleOutcome, Direction, Document, EntityUpdate, FixSuggestion, Pagination,
    Stencil, StencilConfig, StencilError,
};

#[derive(Parser)]
#[command(name = "stencil")]
#[command(about = "Stencil - bind HTML attributes to graph queries")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the query a page would send (no network)
    Query {
        /// Path to the HTML page
        file: PathBuf,

        /// Config file (default: ./stencil.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run the pipeline and print the rendered page
    Render {
        /// Path to the HTML page
        file: PathBuf,

        /// Config file (default: ./stencil.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Activate "next page" this many times after the first render
        #[arg(long, default_value_t = 0)]
        next: usize,

        /// Clear the cache and re-fetch after rendering
        #[arg(long)]
        refresh: bool,
    },

    /// Update fields of one entity (field=<json> ...)
    Update {
        /// Entity typename (e.g. widgets)
        typename: String,

        /// Entity id (number or string)
        id: String,

        /// Assignments like price=12.5 or name='"Widget"'
        #[arg(required = true)]
        fields: Vec<String>,

        /// Config file (default: ./stencil.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List bindings, loops, controls and warnings of a page
    Check {
        /// Path to the HTML page
        file: PathBuf,

        /// Config file (default: ./stencil.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so rendered output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Query { file, config } => print_query(&file, config),
        Commands::Render {
            file,
            config,
            next,
            refresh,
        } => render_page(&file, config, next, refresh).await,
        Commands::Update {
            typename,
            id,
            fields,
            config,
        } => update_entity(typename, &id, &fields, config).await,
        Commands::Check { file, config } => check_page(&file, config),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn load_page(file: &Path) -> Result<Document, StencilError> {
    let html = fs::read_to_string(file)?;
    Document::parse_html(&html)
}

fn load_config(path: Option<PathBuf>) -> Result<StencilConfig, StencilError> {
    Ok(StencilConfig::load(path.as_deref())?.with_env())
}

fn print_query(file: &Path, config: Option<PathBuf>) -> Result<(), StencilError> {
    let config = load_config(config)?;
    let doc = load_page(file)?;
    let table = scan(&doc, &config.schema);

    match synthesize(&table, &Pagination::new(), &config.schema)? {
        Some(query) => print!("{}", query),
        None => eprintln!("{} No data bindings in '{}'", "→".cyan(), file.display()),
    }
    Ok(())
}

async fn render_page(
    file: &Path,
    config: Option<PathBuf>,
    next: usize,
    refresh: bool,
) -> Result<(), StencilError> {
    let config = load_config(config)?;
    let doc = load_page(file)?;

    eprintln!("{} Endpoint: {}", "→".cyan(), config.endpoint.cyan().bold());

    let mut engine = Stencil::from_config(doc, &config)?;
    let mut outcome = engine.run().await;
    for _ in 0..next {
        outcome = engine.dispatch(Command::Paginate(Direction::Next)).await;
    }
    if refresh {
        outcome = engine.dispatch(Command::Refresh).await;
    }

    match outcome {
        CycleOutcome::Rendered {
            scalars,
            replicas,
            placeholders,
        } => eprintln!(
            "{} Rendered {} fields, {} replicas ({} missing) at page {}",
            "✓".green(),
            scalars,
            replicas,
            placeholders,
            engine.pagination().current_page(engine.page_size())
        ),
        other => eprintln!("{} Nothing rendered: {:?}", "!".yellow(), other),
    }

    println!("{}", engine.document().to_html());
    Ok(())
}

async fn update_entity(
    typename: String,
    id: &str,
    fields: &[String],
    config: Option<PathBuf>,
) -> Result<(), StencilError> {
    let config = load_config(config)?;

    // Bare words are string ids
    let id = serde_json::from_str::<Value>(id).unwrap_or_else(|_| Value::String(id.to_string()));
    let mut update = EntityUpdate::new(typename, id);
    for assignment in fields {
        let (field, raw) = assignment
            .split_once('=')
            .ok_or_else(|| StencilError::InvalidPath {
                path: assignment.clone(),
            })?;
        update = update.set(field.trim(), serde_json::from_str(raw)?);
    }

    let mut engine = Stencil::from_config(Document::new(), &config)?;
    let outcome = engine.update_entity(&update).await?;

    println!("{} Updated {}", "✓".green(), outcome.key.to_string().bold());
    println!("{}", serde_json::to_string_pretty(&outcome.entity)?);
    if !outcome.evicted.is_empty() {
        println!("  Evicted: {}", outcome.evicted.join(", "));
    }
    Ok(())
}

fn check_page(file: &Path, config: Option<PathBuf>) -> Result<(), StencilError> {
    let config = load_config(config)?;
    let doc = load_page(file)?;
    let table = scan(&doc, &config.schema);

    println!("{} Page '{}'", "✓".green(), file.display());
    println!("  Bindings: {}", table.bindings.len());
    for binding in &table.bindings {
        println!("    {} {}", "•".cyan(), binding.path);
    }
    println!("  Loops: {}", table.loops.len());
    for lp in &table.loops {
        println!(
            "    {} {} (page size {}, {} item fields)",
            "•".cyan(),
            lp.array_field,
            lp.page_size,
            lp.item_fields.len()
        );
    }
    println!("  Controls: {}", table.controls.len());
    for control in &table.controls {
        println!("    {} {}", "•".cyan(), control.command);
    }
    if !table.warnings.is_empty() {
        println!("  {}: {}", "Warnings".yellow(), table.warnings.len());
        for warning in &table.warnings {
            println!("    {} {}", "!".yellow(), warning);
        }
    }
    Ok(())
}
