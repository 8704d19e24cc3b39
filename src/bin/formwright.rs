use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use formwright::{
    FieldDescriptor, FieldRegistry, FieldState, Record, UiState, interpret, parse_view,
    validate::{self, ValidationResult},
};

#[derive(Parser, Debug)]
#[command(name = "formwright", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interpret a view against a record and print the render plan as JSON.
    Plan(PlanArgs),
    /// Run local (Phase A) validation and print per-field errors.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// View markup file.
    #[arg(long)]
    view: PathBuf,

    /// Field descriptors JSON (array of descriptors).
    #[arg(long)]
    fields: PathBuf,

    /// Record JSON; defaults to an empty record.
    #[arg(long)]
    record: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// View markup file.
    #[arg(long)]
    view: PathBuf,

    /// Field descriptors JSON (array of descriptors).
    #[arg(long)]
    fields: PathBuf,

    /// Record JSON.
    #[arg(long)]
    record: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Plan(args) => cmd_plan(args),
        Command::Check(args) => cmd_check(args),
    }
}

fn read_registry(path: &Path) -> anyhow::Result<FieldRegistry> {
    let f = File::open(path).with_context(|| format!("open descriptors '{}'", path.display()))?;
    let descriptors: Vec<FieldDescriptor> =
        serde_json::from_reader(BufReader::new(f)).with_context(|| "parse descriptors JSON")?;
    Ok(descriptors.into_iter().collect())
}

fn read_record(path: &Path) -> anyhow::Result<Record> {
    let f = File::open(path).with_context(|| format!("open record '{}'", path.display()))?;
    serde_json::from_reader(BufReader::new(f)).with_context(|| "parse record JSON")
}

fn read_view(path: &Path) -> anyhow::Result<formwright::ViewNode> {
    let markup = std::fs::read_to_string(path)
        .with_context(|| format!("open view '{}'", path.display()))?;
    Ok(parse_view(&markup)?)
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let view = read_view(&args.view)?;
    let registry = read_registry(&args.fields)?;
    let record = match &args.record {
        Some(path) => read_record(path)?,
        None => Record::new(),
    };

    let plan = interpret(&view, &registry, &record, &UiState::default());
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let registry = read_registry(&args.fields)?;
    let record = read_record(&args.record)?;
    // The view is parsed so a broken file fails loudly even though Phase A
    // itself works from the descriptors.
    let _ = read_view(&args.view)?;

    let mut result = ValidationResult::default();
    for descriptor in registry.iter() {
        let state = FieldState::evaluate(descriptor, &record);
        if state.invisible || state.readonly {
            continue;
        }
        let outcome =
            validate::check_field(descriptor, record.get(&descriptor.name), state.required);
        result.set_field(&descriptor.name, outcome);
    }

    if result.is_clean() {
        eprintln!("record is locally valid");
        return Ok(());
    }
    for (field, message) in &result.field_errors {
        eprintln!("{field}: {message}");
    }
    std::process::exit(1)
}
