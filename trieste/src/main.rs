mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use output::{
    CatOutput, CheckOutput, FileInfo, LsOutput, OutputWriter, SearchOutput, StatsOutput,
    TreeOutput,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use trieste_core::{Store, StoreConfig};

/// Trieste - an in-memory content-addressed file store
#[derive(Parser)]
#[command(name = "trieste")]
#[command(about = "Load files into a prefix-sharing content trie and inspect it", long_about = None)]
#[command(version)]
struct Cli {
    /// Files or directories to load before running the command
    #[arg(short = 'L', long = "load", global = true)]
    load: Vec<PathBuf>,

    /// Store config file (defaults to TRIESTE_CONFIG env var, then built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored files
    Ls {
        /// Show length, digest and node count
        #[arg(short, long)]
        long: bool,
    },

    /// Output a file's content to stdout
    Cat {
        /// Stored file name
        name: String,
    },

    /// List files whose content starts with a prefix
    Search {
        /// Content prefix
        prefix: String,
    },

    /// Show storage and sharing statistics
    Stats,

    /// Print the node graph
    Tree,

    /// Verify the node graph against the path index
    Check,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = OutputWriter::new(cli.json);
    match run(cli, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output.write_error(&err, 1);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run(cli: Cli, output: &OutputWriter) -> Result<()> {
    let config_path = cli
        .config
        .or_else(|| std::env::var("TRIESTE_CONFIG").ok().map(PathBuf::from));
    let store = open_store(config_path.as_deref())?;

    for path in &cli.load {
        let added = store
            .add_path(path)
            .with_context(|| format!("Failed to load path: {}", path.display()))?;
        tracing::info!(path = %path.display(), added, "loaded");
    }

    match cli.command {
        Commands::Ls { long } => cmd_ls(&store, output, long),
        Commands::Cat { name } => cmd_cat(&store, output, &name),
        Commands::Search { prefix } => cmd_search(&store, output, &prefix),
        Commands::Stats => cmd_stats(&store, output),
        Commands::Tree => cmd_tree(&store, output),
        Commands::Check => cmd_check(&store, output),
    }
}

fn open_store(config_path: Option<&Path>) -> Result<Store> {
    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            StoreConfig::parse(&content)
                .with_context(|| format!("Invalid config: {}", path.display()))?
        }
        None => StoreConfig::default(),
    };

    Store::with_config(config).context("Failed to create store")
}

fn cmd_ls(store: &Store, output: &OutputWriter, long: bool) -> Result<()> {
    let files: Vec<FileInfo> = store
        .records()
        .into_iter()
        .map(|(name, record)| FileInfo::new(name, &record))
        .collect();

    let data = LsOutput {
        success: true,
        result_code: 0,
        files,
    };

    output.write(&data, || {
        let mut text = String::new();
        if data.files.is_empty() {
            text.push_str("No files (use --load to add some)\n");
        }
        for file in &data.files {
            if long {
                let _ = writeln!(
                    text,
                    "{:>10} {} {:>3} {}",
                    file.length,
                    file.digest.short(),
                    file.nodes,
                    file.name
                );
            } else {
                let _ = writeln!(text, "{}", file.name);
            }
        }
        text
    })
}

fn cmd_cat(store: &Store, output: &OutputWriter, name: &str) -> Result<()> {
    let content = store
        .get(name)
        .with_context(|| format!("Failed to read file: {}", name))?
        .with_context(|| format!("File not found: {}", name))?;

    if output.is_json() {
        let data = CatOutput {
            success: true,
            result_code: 0,
            name: name.to_string(),
            length: content.len(),
            content: String::from_utf8_lossy(&content).into_owned(),
        };
        output.write(&data, String::new)
    } else {
        output.write_raw(&content)
    }
}

fn cmd_search(store: &Store, output: &OutputWriter, prefix: &str) -> Result<()> {
    let hits = store
        .search(prefix.as_bytes())
        .with_context(|| format!("Failed to search for prefix: {:?}", prefix))?;

    let matches: Vec<FileInfo> = hits
        .into_keys()
        .filter_map(|name| {
            let record = store.record(&name)?;
            Some(FileInfo::new(name, &record))
        })
        .collect();

    let data = SearchOutput {
        success: true,
        result_code: 0,
        prefix: prefix.to_string(),
        matches,
    };

    output.write(&data, || {
        let mut text = String::new();
        if data.matches.is_empty() {
            let _ = writeln!(text, "No files start with {:?}", prefix);
        }
        for file in &data.matches {
            let _ = writeln!(text, "{}", file.name);
        }
        text
    })
}

fn cmd_stats(store: &Store, output: &OutputWriter) -> Result<()> {
    let stats = store.stats();
    let data = StatsOutput {
        success: true,
        result_code: 0,
        saved_bytes: stats.saved_bytes(),
        stats,
    };

    output.write(&data, || {
        let stats = &data.stats;
        let mut text = String::new();
        let _ = writeln!(text, "Files: {}", stats.files);
        let _ = writeln!(text, "Nodes: {}", stats.nodes);
        let _ = writeln!(text, "Logical bytes: {}", stats.logical_bytes);
        let _ = writeln!(text, "Stored bytes: {}", stats.stored_bytes);
        let _ = writeln!(text, "Saved bytes: {}", data.saved_bytes);
        if stats.pending_cleanups > 0 {
            let _ = writeln!(text, "Pending cleanups: {}", stats.pending_cleanups);
        }
        text
    })
}

fn cmd_tree(store: &Store, output: &OutputWriter) -> Result<()> {
    let root = store.snapshot();
    let data = TreeOutput {
        success: true,
        result_code: 0,
        node_count: root.count(),
        root,
    };

    output.write(&data, || data.root.render())
}

fn cmd_check(store: &Store, output: &OutputWriter) -> Result<()> {
    store
        .verify_integrity()
        .context("Integrity check failed")?;

    let stats = store.stats();
    let data = CheckOutput {
        success: true,
        result_code: 0,
        files: stats.files,
        nodes: stats.nodes,
    };

    output.write(&data, || {
        format!("OK: {} files, {} nodes\n", data.files, data.nodes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "trieste", "search", "fn ", "--load", "src", "-L", "docs", "--json", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.load, vec![PathBuf::from("src"), PathBuf::from("docs")]);
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Search { ref prefix } if prefix == "fn "));
    }

    #[test]
    fn test_open_store_with_config_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("trieste.conf");
        std::fs::write(&config_path, "version=1\ncleanup=background\n").unwrap();

        let store = open_store(Some(&config_path)).unwrap();
        assert_eq!(
            store.config().cleanup,
            trieste_core::CleanupPolicy::Background
        );
    }

    #[test]
    fn test_open_store_rejects_bad_config() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("trieste.conf");
        std::fs::write(&config_path, "cleanup=never\n").unwrap();

        assert!(open_store(Some(&config_path)).is_err());
        assert!(open_store(Some(&temp_dir.path().join("missing.conf"))).is_err());
    }
}
