use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use photodb::core::duplicate::{MemberRole, read_history};
use photodb::{Catalog, Config, DuplicateGroup, DuplicateResolver, HashAlgorithm, SyncEngine};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "photodb",
    version,
    about = "Catalog a photo tree and remove exact duplicates",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory to synchronize (shorthand for `photodb sync <ROOT>`)
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct Target {
    /// Root of the photo tree
    #[arg(value_name = "ROOT")]
    root: PathBuf,

    /// Catalog file (default: `<ROOT>/photo.db`)
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring the catalog in line with the directory tree
    Sync {
        #[command(flatten)]
        target: Target,
        /// Fingerprint algorithm: sha1, sha256 or blake3. A catalog keeps the
        /// algorithm it was first built with; syncing it with another one fails
        #[arg(long, value_name = "ALG", default_value_t = HashAlgorithm::Sha1)]
        hash: HashAlgorithm,
        /// Only catalog these extensions (comma separated)
        #[arg(long, value_name = "EXT", value_delimiter = ',')]
        ext: Vec<String>,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List duplicate groups without touching anything
    Dupes {
        #[command(flatten)]
        target: Target,
    },

    /// Delete redundant copies, keeping the first cataloged one
    Dedupe {
        #[command(flatten)]
        target: Target,
        /// Only show what would be deleted
        #[arg(long)]
        dry_run: bool,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// List entries not seen by the most recent sync
    Stale {
        #[command(flatten)]
        target: Target,
    },

    /// List past dedupe runs recorded in `<ROOT>/.photodb-history.jsonl`
    History {
        /// Root of the photo tree
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let command = match (cli.command, cli.root) {
        (Some(command), _) => command,
        (None, Some(root)) => Commands::Sync {
            target: Target {
                root,
                catalog: None,
            },
            hash: HashAlgorithm::Sha1,
            ext: Vec::new(),
            json: false,
        },
        (None, None) => {
            anyhow::bail!("Missing ROOT; see `photodb --help`");
        }
    };

    match command {
        Commands::Sync {
            target,
            hash,
            ext,
            json,
        } => {
            let mut config = target.config();
            config.hash_algorithm = hash;
            config.set_extensions(&ext);
            sync(&target.root, &config, json)
        }
        Commands::Dupes { target } => {
            let config = target.config();
            let catalog = open_existing(&target.root, &config)?;
            let groups = DuplicateResolver::new(&catalog).find_groups()?;
            print_groups(&groups);
            Ok(())
        }
        Commands::Dedupe {
            target,
            dry_run,
            yes,
        } => {
            let config = target.config();
            dedupe(&target.root, &config, dry_run, yes)
        }
        Commands::Stale { target } => {
            let config = target.config();
            stale(&target.root, &config)
        }
        Commands::History { root } => history(&root, &Config::default()),
    }
}

impl Target {
    fn config(&self) -> Config {
        Config {
            catalog_path: self.catalog.clone(),
            ..Config::default()
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn open_existing(root: &Path, config: &Config) -> Result<Catalog> {
    let path = config.catalog_path(root);
    if !path.is_file() {
        anyhow::bail!(
            "No catalog at {}; run `photodb sync {}` first",
            path.display(),
            root.display()
        );
    }
    Catalog::open(&path).with_context(|| format!("Failed to open catalog {}", path.display()))
}

fn sync(root: &Path, config: &Config, json: bool) -> Result<()> {
    let catalog_path = config.catalog_path(root);
    let catalog = Catalog::open(&catalog_path)
        .with_context(|| format!("Failed to open catalog {}", catalog_path.display()))?;
    catalog.set_fast_writes(config.fast_writes)?;

    let progress = ProgressBar::new(0);
    progress.set_style(ProgressStyle::with_template(
        "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )?);

    if !json {
        println!("▶ Synchronizing {}", root.display());
    }
    let report = SyncEngine::from_config(&catalog, config, root)
        .with_progress(progress)
        .run(root)
        .with_context(|| format!("Failed to synchronize {}", root.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "✅ {} file(s): {} new, {} already cataloged",
        report.new + report.known,
        report.new,
        report.known
    );
    let problems = report.skipped + report.extraction_failures + report.hash_failures;
    if problems > 0 {
        println!(
            "⚠️  {} unreadable, {} without metadata, {} without fingerprint (see log)",
            report.skipped, report.extraction_failures, report.hash_failures
        );
    }
    Ok(())
}

fn print_groups(groups: &[DuplicateGroup]) {
    if groups.is_empty() {
        println!("No duplicates found.");
        return;
    }

    println!("Found {} duplicate group(s):", groups.len());
    for (i, group) in groups.iter().enumerate() {
        println!("\n✨ Group {}: {} ({})", i + 1, group.file_name, group.checksum);
        for (member, role) in group.roles() {
            let tag = match role {
                MemberRole::Survivor => "keep ",
                MemberRole::Redundant => "rm   ",
                MemberRole::Alias => "same ",
                MemberRole::Gone => "gone ",
            };
            println!("   {} {}", tag, group.path_of(member).display());
        }
    }
}

fn dedupe(root: &Path, config: &Config, dry_run: bool, yes: bool) -> Result<()> {
    let catalog = open_existing(root, config)?;
    let resolver = DuplicateResolver::new(&catalog).with_history(config.history_path(root));

    let groups = resolver.find_groups()?;
    print_groups(&groups);

    let doomed: usize = groups.iter().map(|g| g.redundant().len()).sum();
    if doomed == 0 {
        return Ok(());
    }
    if dry_run {
        println!("\n⚠️  Dry-run only; {} file(s) would be deleted.", doomed);
        return Ok(());
    }

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Permanently delete {} file(s)?", doomed))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let report = resolver.resolve()?;
    for path in &report.deleted {
        println!("   🗑️  Deleted {}", path.display());
    }
    for path in &report.vanished {
        println!("   ⚠️  Already gone {}", path.display());
    }
    for path in &report.failed {
        eprintln!("⚠️  Could not delete {}", path.display());
    }
    println!(
        "\n✅ Deleted {} file(s); history in {}",
        report.deleted.len(),
        config.history_path(root).display()
    );
    Ok(())
}

fn stale(root: &Path, config: &Config) -> Result<()> {
    let catalog = open_existing(root, config)?;
    let photos = catalog.photos();

    let Some(marker) = photos.latest_marker()? else {
        println!("Catalog is empty.");
        return Ok(());
    };

    let entries = photos.stale(marker)?;
    if entries.is_empty() {
        println!("Every entry was seen by the run at {}.", marker);
        return Ok(());
    }

    println!("{} entr(ies) not seen since before {}:", entries.len(), marker);
    for entry in entries {
        println!(
            "   {}  (last seen {})",
            entry.identity.full_path().display(),
            entry
                .last_seen
                .map(|ts| ts.to_string())
                .unwrap_or_else(|| "never".to_string())
        );
    }
    Ok(())
}

fn history(root: &Path, config: &Config) -> Result<()> {
    let path = config.history_path(root);
    if !path.is_file() {
        println!("No dedupe history in {}.", root.display());
        return Ok(());
    }
    let records = read_history(&path)
        .with_context(|| format!("Could not read history file {}", path.display()))?;

    println!("🗂️  Dedupe history:");
    for (i, record) in records.iter().enumerate() {
        println!(
            "[{}] {}  {} ({})\n     kept: {}\n     deleted: {:?}\n",
            i, record.timestamp, record.file_name, record.checksum, record.retained, record.deleted
        );
    }
    Ok(())
}
