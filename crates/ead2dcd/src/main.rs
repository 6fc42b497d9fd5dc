use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use clap::{builder::ArgAction, Parser, Subcommand};
use console::{style, Emoji};
use ead2dc::{
  clients::ArchivesSpaceClient,
  config::Config,
  database::Database,
  oai::{ResponderSettings, SnapshotStore},
  pipeline::{rebuild, BuildOptions},
};
use errors::Ead2dcdErrors;
use tracing::{debug, trace};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub mod errors;
pub mod server;

static LOOKING_GLASS: Emoji<'_, '_> = Emoji("🔍 ", "");
static BOOKS: Emoji<'_, '_> = Emoji("📚 ", "");
static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✨ ", "");

#[derive(Parser)]
#[command(author, version, about = "Builds and serves the ead2dc OAI-PMH static repository")]
struct Cli {
  /// Verbose mode (-v, -vv, -vvv)
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  /// Configuration file (defaults to the user config directory)
  #[arg(long, short, global = true)]
  config: Option<PathBuf>,

  /// Database path, overriding the configuration
  #[arg(long, global = true)]
  database: Option<PathBuf>,

  /// Static repository path, overriding the configuration
  #[arg(long, global = true)]
  xml: Option<PathBuf>,

  /// Answer every confirmation prompt with yes
  #[arg(long, global = true)]
  accept_defaults: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Initialize a new ead2dc database
  Init,
  /// Rebuild the static repository from ArchivesSpace
  Build {
    /// Only process this many archival objects
    #[arg(long, short)]
    limit: Option<usize>,
  },
  /// Serve the static repository over OAI-PMH
  Serve {
    /// Address to listen on, overriding the configuration
    #[arg(long, short)]
    bind:    Option<String>,
    /// Also write daily-rolling log files to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
  },
  /// Inspect and select the collections that are served
  Collections {
    #[command(subcommand)]
    command: CollectionCommands,
  },
  /// Removes the entire database
  Clean,
}

#[derive(Subcommand)]
enum CollectionCommands {
  /// List collections with their statistics
  List,
  /// Serve the given collections
  Include {
    /// Collection numbers, e.g. 30
    #[arg(required = true)]
    numbers: Vec<String>,
  },
  /// Stop serving the given collections
  Exclude {
    /// Collection numbers, e.g. 30
    #[arg(required = true)]
    numbers: Vec<String>,
  },
  /// Serve exactly the given collections
  Set {
    /// Collection numbers, e.g. 30
    numbers: Vec<String>,
  },
}

/// Setup logging with the specified verbosity level, optionally also to daily files
fn setup_logging(verbosity: u8, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>, Ead2dcdErrors> {
  let filter = match verbosity {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
  let stdout =
    fmt::layer().with_file(true).with_line_number(true).with_thread_ids(true).with_target(true);

  let Some(log_dir) = log_dir else {
    tracing_subscriber::registry().with(filter).with(stdout).init();
    return Ok(None);
  };

  std::fs::create_dir_all(log_dir)?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "ead2dcd.log"));
  let file = fmt::layer()
    .with_writer(writer)
    .with_ansi(false)
    .with_file(true)
    .with_line_number(true)
    .with_thread_ids(true)
    .with_target(true);
  tracing_subscriber::registry().with(filter).with(stdout).with(file).init();
  Ok(Some(guard))
}

/// Asks for a yes/no answer followed by typing `word`, unless `accept` is set.
fn confirm_twice(accept: bool, prompt: &str, word: &str) -> Result<bool, Ead2dcdErrors> {
  if accept {
    return Ok(true);
  }

  if !dialoguer::Confirm::new().with_prompt(prompt).default(false).wait_for_newline(true).interact()? {
    return Ok(false);
  }

  let input = dialoguer::Input::<String>::new()
    .with_prompt(format!("{} Type {} to confirm", style("⚠️").red(), style(word).red().bold()))
    .interact_text()?;
  Ok(input == word)
}

/// Removes the database and its auxiliary files (`-journal`, `-wal`, ...).
fn remove_database(path: &Path) -> Result<(), Ead2dcdErrors> {
  std::fs::remove_file(path)?;
  let auxiliary = glob::glob(&format!("{}*", path.display()))?;
  for file in auxiliary.flatten() {
    std::fs::remove_file(file)?;
  }
  Ok(())
}

/// Opens the configured database, creating its directory if needed.
async fn open_database(path: &Path) -> Result<Database, Ead2dcdErrors> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    trace!("Creating parent directories: {}", parent.display());
    std::fs::create_dir_all(parent)?;
  }
  trace!("Using database at: {}", path.display());
  Ok(Database::open(path).await?)
}

#[tokio::main]
async fn main() -> Result<(), Ead2dcdErrors> {
  let cli = Cli::parse();
  let log_dir = match &cli.command {
    Commands::Serve { log_dir, .. } => log_dir.clone(),
    _ => None,
  };
  let _guard = setup_logging(cli.verbose, log_dir.as_deref())?;

  let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
  let mut config = Config::load(&config_path)?;
  if let Some(database) = cli.database {
    config.paths.database = database;
  }
  if let Some(xml) = cli.xml {
    config.paths.xml = xml;
  }
  debug!("Using configuration: {:?}", config.paths);

  match cli.command {
    Commands::Init => {
      let path = config.paths.database.clone();
      println!("{} Using database path: {}", style(BOOKS).cyan(), style(path.display()).yellow());

      if path.exists() {
        println!(
          "{} Database already exists at: {}",
          style(WARNING).yellow(),
          style(path.display()).yellow()
        );

        if !confirm_twice(
          cli.accept_defaults,
          "Do you want to reinitialize this database? This will erase the collection selection",
          "INIT",
        )? {
          println!("{} Keeping existing database", style("ℹ").blue());
          return Ok(());
        }

        println!("{} Removing existing database", style(WARNING).yellow());
        remove_database(&path)?;
      }

      println!("{} Initializing database at: {}", style(ROCKET).cyan(), style(path.display()).yellow());
      open_database(&path).await?;

      println!("{} Database initialized successfully!", style(SUCCESS).green());
      Ok(())
    },

    Commands::Build { limit } => {
      let db = open_database(&config.paths.database).await?;
      let client = ArchivesSpaceClient::new(&config.archivesspace)?;

      println!(
        "{} Harvesting digital objects from {}",
        style(LOOKING_GLASS).cyan(),
        style(&config.archivesspace.base_url).yellow()
      );

      let report = rebuild(&client, &db, &config, &BuildOptions { limit }).await?;
      debug!("Build report: {:?}", report);

      println!("\n{} Build finished:", style(SAVE).green());
      println!("   {} {}", style("Records:").green().bold(), style(report.records).white());
      println!("   {} {}", style("Skipped:").green().bold(), style(report.skipped).white());
      println!("   {} {}", style("Collections:").green().bold(), style(report.collections).white());
      println!("   {} {}", style("Earliest:").green().bold(), style(&report.earliest).white());
      println!("   {} {}", style("Written to:").green().bold(), style(report.output.display()).yellow());
      Ok(())
    },

    Commands::Serve { bind, .. } => {
      let bind = bind.unwrap_or_else(|| config.server.bind.clone());
      let db = open_database(&config.paths.database).await?;
      if !config.paths.xml.exists() {
        println!(
          "{} No static repository at {} yet; run {} first",
          style(WARNING).yellow(),
          style(config.paths.xml.display()).yellow(),
          style("ead2dcd build").cyan()
        );
      }

      let state = server::AppState {
        store:    Arc::new(SnapshotStore::new(config.paths.xml.clone())),
        db:       Arc::new(db),
        settings: Arc::new(ResponderSettings::from(&config)),
      };
      let listener = tokio::net::TcpListener::bind(&bind).await?;
      println!("{} Serving OAI-PMH on {}", style(ROCKET).cyan(), style(format!("http://{bind}/oai")).yellow());
      server::serve(listener, state).await?;
      Ok(())
    },

    Commands::Collections { command } => {
      let db = open_database(&config.paths.database).await?;
      match command {
        CollectionCommands::List => {
          let collections = db.list_collections().await?;
          if collections.is_empty() {
            println!("{} No collections yet; run {} first", style(WARNING).yellow(), style("ead2dcd build").cyan());
            return Ok(());
          }

          println!(
            "{:>6}  {:<48} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}  {}",
            style("No.").bold(),
            style("Title").bold(),
            style("AOs").bold(),
            style("CLib").bold(),
            style("IA").bold(),
            style("YT").bold(),
            style("Other").bold(),
            style("DOs").bold(),
            style("Incl").bold()
          );
          let (mut archival_objects, mut digital_objects, mut included) = (0, 0, 0);
          for row in &collections {
            use ead2dc::classify::HostCategory;
            let title = row.title.chars().take(48).collect::<String>();
            let marker = if row.included {
              included += 1;
              style("yes").green()
            } else {
              style("no").dim()
            };
            println!(
              "{:>6}  {:<48} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}  {}",
              style(row.number()).yellow(),
              title,
              row.stats.archival_objects,
              row.stats.host_count(HostCategory::CaltechLibrary),
              row.stats.host_count(HostCategory::InternetArchive),
              row.stats.host_count(HostCategory::YouTube),
              row.stats.host_count(HostCategory::Other),
              row.stats.digital_objects(),
              marker
            );
            archival_objects += row.stats.archival_objects;
            digital_objects += row.stats.digital_objects();
          }

          println!(
            "\n{} {} collections ({} included), {} archival objects, {} digital objects",
            style(SUCCESS).green(),
            style(collections.len()).yellow(),
            style(included).yellow(),
            style(archival_objects).yellow(),
            style(digital_objects).yellow()
          );
          if let Some(updated) = db.last_update(ead2dc::database::LAST_UPDATE_XML).await? {
            println!("   {} {}", style("Last build:").green(), style(updated).white());
          }
          if let Some(updated) = db.last_update(ead2dc::database::LAST_UPDATE_COLLECTIONS).await? {
            println!("   {} {}", style("Last selection change:").green(), style(updated).white());
          }
          Ok(())
        },

        CollectionCommands::Include { numbers } => {
          let requested = numbers.len();
          let changed = db.set_included(numbers, true).await?;
          report_selection("Included", changed, requested);
          Ok(())
        },

        CollectionCommands::Exclude { numbers } => {
          let requested = numbers.len();
          let changed = db.set_included(numbers, false).await?;
          report_selection("Excluded", changed, requested);
          Ok(())
        },

        CollectionCommands::Set { numbers } => {
          if numbers.is_empty()
            && !confirm_twice(cli.accept_defaults, "Exclude every collection from the repository?", "NONE")?
          {
            println!("{} Operation cancelled", style("✖").red());
            return Ok(());
          }
          let requested = numbers.len();
          let changed = db.select_collections(numbers).await?;
          report_selection("Selected", changed, requested);
          Ok(())
        },
      }
    },

    Commands::Clean => {
      let path = config.paths.database.clone();
      if path.exists() {
        println!("{} Database found at: {}", style(WARNING).yellow(), style(path.display()).yellow());

        if !confirm_twice(cli.accept_defaults, "Are you sure you want to delete this database?", "DELETE")? {
          println!("{} Operation cancelled", style("✖").red());
          return Ok(());
        }

        println!("{} Removing database: {}", style(WARNING).yellow(), style(path.display()).yellow());
        remove_database(&path)?;
        println!("{} Database files cleaned", style(SUCCESS).green());
      } else {
        println!("{} No database found at: {}", style(WARNING).yellow(), style(path.display()).yellow());
      }
      Ok(())
    },
  }
}

/// Prints the outcome of a selection change.
fn report_selection(action: &str, changed: usize, requested: usize) {
  println!("{} {} {} collections", style(SUCCESS).green(), action, style(changed).yellow());
  if changed < requested {
    println!(
      "{} {} of the given numbers matched no collection",
      style(WARNING).yellow(),
      style(requested - changed).yellow()
    );
  }
}
