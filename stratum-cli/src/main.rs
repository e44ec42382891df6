//! Stratum CLI - Commit-aware symbol queries over git history

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use stratum_core::{
    Config, GitRepo, Indexer, SqliteStore, StratumError, TreeSitterExtractor,
};

#[derive(Parser)]
#[command(name = "stratum")]
#[command(about = "Commit-aware symbol index", long_about = None)]
struct Cli {
    /// Override repo root detection
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .stratum/ and config.toml
    Init,

    /// Index history up to a commit (default HEAD)
    Index {
        /// Commit to index up to
        commit: Option<String>,
    },

    /// List files visible at a commit, optionally filtered by symbol
    Search {
        /// Symbol name to look for
        symbol: Option<String>,

        /// Commit to resolve (default HEAD)
        #[arg(long)]
        commit: Option<String>,
    },

    /// Show index status
    Status,

    /// Print the raw ancestry and blob tables
    Dump,
}

fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Init => cmd_init(cli.root.clone()),
        Commands::Index { commit } => cmd_index(cli.root.clone(), commit.clone(), cli.json),
        Commands::Search { symbol, commit } => cmd_search(
            cli.root.clone(),
            symbol.clone(),
            commit.clone(),
            cli.json,
        ),
        Commands::Status => cmd_status(cli.root.clone(), cli.json),
        Commands::Dump => cmd_dump(cli.root.clone(), cli.json),
    };

    if let Err(e) = result {
        if cli.json {
            let error_json = serde_json::json!({ "error": e.to_string() });
            eprintln!("{}", serde_json::to_string_pretty(&error_json).unwrap());
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn detect_repo(root: Option<PathBuf>) -> stratum_core::Result<GitRepo> {
    match root {
        Some(path) => Ok(GitRepo::open(path)),
        None => GitRepo::discover(&std::env::current_dir()?),
    }
}

/// Load config and open the store under `.stratum/`.
fn open_store(repo: &GitRepo) -> stratum_core::Result<(Config, SqliteStore)> {
    let stratum_dir = repo.root().join(".stratum");
    if !stratum_dir.exists() {
        return Err(StratumError::NotInitialized);
    }

    let config_path = stratum_dir.join("config.toml");
    let config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    let store = SqliteStore::open(&config.db_path(repo.root()))?;
    Ok((config, store))
}

fn resolve_commit(repo: &GitRepo, commit: Option<String>) -> stratum_core::Result<String> {
    match commit {
        Some(commit) => Ok(commit),
        None => repo.head(),
    }
}

fn short(commit: &str) -> &str {
    &commit[..commit.len().min(12)]
}

fn cmd_init(root: Option<PathBuf>) -> stratum_core::Result<()> {
    use colored::Colorize;

    let repo = detect_repo(root)?;
    let stratum_dir = repo.root().join(".stratum");
    let config_path = stratum_dir.join("config.toml");

    if config_path.exists() {
        return Err(StratumError::ConfigExists(config_path));
    }

    std::fs::create_dir_all(&stratum_dir)?;
    std::fs::write(&config_path, stratum_core::config::DEFAULT_CONFIG)?;
    update_gitignore(repo.root())?;

    let config = Config::default();
    SqliteStore::open(&config.db_path(repo.root()))?;

    println!("{} .stratum/config.toml", "Created".green());
    println!("{} .stratum/ to .gitignore", "Added".green());
    Ok(())
}

fn cmd_index(
    root: Option<PathBuf>,
    commit: Option<String>,
    json: bool,
) -> stratum_core::Result<()> {
    use colored::Colorize;
    use indicatif::ProgressBar;

    let repo = detect_repo(root)?;
    let (config, mut store) = open_store(&repo)?;
    let commit = resolve_commit(&repo, commit)?;
    let extractor = TreeSitterExtractor::new(config.extract.max_file_size);

    let spinner = if json {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_message(format!("Indexing {}", short(&commit)));
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        bar
    };

    let stats = Indexer::new(&repo, &extractor).run(&mut store, &commit)?;
    spinner.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats).unwrap());
    } else {
        println!(
            "{}: {} commits ({} blobs added, {} hidden)",
            "Indexed".green(),
            stats.commits_indexed,
            stats.blobs_inserted,
            stats.blobs_hidden
        );
        let status = store.status()?;
        println!(
            "{}: height {} ({:.1} MB)",
            "Tip".blue(),
            status.tip_height,
            status.index_size_bytes as f64 / 1_000_000.0
        );
    }
    Ok(())
}

fn cmd_search(
    root: Option<PathBuf>,
    symbol: Option<String>,
    commit: Option<String>,
    json: bool,
) -> stratum_core::Result<()> {
    use colored::Colorize;

    let repo = detect_repo(root)?;
    let (_config, store) = open_store(&repo)?;
    let commit = resolve_commit(&repo, commit)?;

    let blobs = stratum_core::search(&store, &commit, symbol.as_deref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&blobs).unwrap());
        return Ok(());
    }

    if blobs.is_empty() {
        println!("{} at {}", "No matches".yellow(), short(&commit));
        return Ok(());
    }

    for blob in &blobs {
        let mut symbols = blob.symbols.clone();
        symbols.sort();
        println!("{}  {}", blob.path.green(), symbols.join(" "));
    }
    println!("{} files at {}", blobs.len(), short(&commit));
    Ok(())
}

fn cmd_status(root: Option<PathBuf>, json: bool) -> stratum_core::Result<()> {
    use colored::Colorize;

    let repo = detect_repo(root)?;
    let (_config, store) = open_store(&repo)?;
    let status = store.status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status).unwrap());
        return Ok(());
    }

    match &status.tip_commit {
        Some(tip) => println!("{}: {} (height {})", "Tip".blue(), short(tip), status.tip_height),
        None => println!("{}: empty index", "Tip".blue()),
    }
    println!("{}: {}", "Commits".blue(), status.commits);
    println!("{}: {}", "Blobs".blue(), status.blobs);
    println!(
        "{}: {:.1} MB",
        "Size".blue(),
        status.index_size_bytes as f64 / 1_000_000.0
    );
    Ok(())
}

fn cmd_dump(root: Option<PathBuf>, json: bool) -> stratum_core::Result<()> {
    let repo = detect_repo(root)?;
    let (_config, store) = open_store(&repo)?;
    let dump = store.dump()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&dump).unwrap());
        return Ok(());
    }

    println!("Commit ancestry:");
    for row in &dump.ancestry {
        println!(
            "  height {:>4} commit {} ancestor {}",
            row.height, row.commit, row.ancestor
        );
    }

    println!();
    println!("Blobs:");
    for blob in &dump.blobs {
        println!("  id {} path {}", blob.id, blob.path);
        for added in &blob.added {
            println!("    + {}", added);
        }
        for deleted in &blob.deleted {
            println!("    - {}", deleted);
        }
        if !blob.symbols.is_empty() {
            println!("    symbols: {}", blob.symbols.join(" "));
        }
    }
    Ok(())
}

/// Update .gitignore to include .stratum/
fn update_gitignore(repo_root: &Path) -> stratum_core::Result<()> {
    let gitignore_path = repo_root.join(".gitignore");

    if gitignore_path.exists() {
        let content = std::fs::read_to_string(&gitignore_path)?;
        if !content
            .lines()
            .any(|line| line.trim() == ".stratum" || line.trim() == ".stratum/")
        {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            use std::io::Write;
            writeln!(file, "\n# Stratum index\n.stratum/")?;
        }
    } else {
        std::fs::write(&gitignore_path, "# Stratum index\n.stratum/\n")?;
    }

    Ok(())
}
