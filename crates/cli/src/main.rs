//! looplit command-line tool.
//!
//! Provides subcommands for inspecting and resolving conflict buffers,
//! injecting edit suggestions, summarising saved state-history snapshots,
//! and generating / validating configuration files.

mod buffer;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing_subscriber::EnvFilter;

use looplit_core::config::AppConfig;
use looplit_core::conflict::{parse_conflicts, Resolution};
use looplit_core::editor::pad_blank_lines;
use looplit_core::StateHistory;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// looplit command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "looplit",
    version,
    about = "Inspect and resolve looplit state canvases from the command line"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "./looplit.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the conflict regions of a buffer file.
    Conflicts {
        /// Buffer file to inspect.
        file: PathBuf,
    },

    /// Resolve conflicts in a buffer file and write it back.
    Resolve {
        /// Buffer file to resolve.
        file: PathBuf,

        /// Side to keep.
        #[arg(long, value_enum)]
        accept: Side,

        /// Resolve only the conflict at this index (0-based); all when omitted.
        #[arg(long)]
        index: Option<usize>,

        /// Print the result instead of writing the file.
        #[arg(long)]
        dry_run: bool,
    },

    /// Inject an edit suggestion into a buffer file as a conflict region.
    Suggest {
        /// Buffer file to edit.
        file: PathBuf,

        /// Text to replace (first occurrence).
        #[arg(long)]
        old: String,

        /// Replacement text.
        #[arg(long)]
        new: String,

        /// Print the result instead of writing the file.
        #[arg(long)]
        dry_run: bool,
    },

    /// Insert a blank line before every conflict header.
    Pad {
        /// Buffer file to pad.
        file: PathBuf,
    },

    /// Summarise a saved state-history snapshot.
    History {
        /// Snapshot JSON file.
        file: PathBuf,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./looplit.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

/// Side of a conflict to keep.
#[derive(ValueEnum, Debug, Clone, Copy)]
enum Side {
    Current,
    Incoming,
}

impl From<Side> for Resolution {
    fn from(side: Side) -> Self {
        match side {
            Side::Current => Resolution::AcceptCurrent,
            Side::Incoming => Resolution::AcceptIncoming,
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    // Minimal logging for CLI
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Conflicts { file } => cmd_conflicts(&file),
        Commands::Resolve {
            file,
            accept,
            index,
            dry_run,
        } => cmd_resolve(&file, accept, index, dry_run),
        Commands::Suggest {
            file,
            old,
            new,
            dry_run,
        } => cmd_suggest(&cli.config, &file, &old, &new, dry_run),
        Commands::Pad { file } => cmd_pad(&file),
        Commands::History { file } => cmd_history(&file),
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Load the config file when present; defaults otherwise.
fn load_config_or_default(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    AppConfig::load_and_resolve(path).context("failed to load configuration file")
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_conflicts(file: &Path) -> Result<()> {
    let text = buffer::read(file)?;
    let conflicts = parse_conflicts(&text);

    if conflicts.is_empty() {
        println!();
        println!("{}", style::success("No conflicts"));
        println!();
        return Ok(());
    }

    println!();
    println!(
        "{}",
        style::header(&format!("Conflicts in {} ({})", file.display(), conflicts.len()))
    );
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "#".to_string(),
        "Header".to_string(),
        "Separator".to_string(),
        "Footer".to_string(),
        style::current_side(),
        style::incoming_side(),
    ]);

    for (index, c) in conflicts.iter().enumerate() {
        // Editors count lines from 1.
        table.add_row(vec![
            Cell::new(index),
            Cell::new(c.header_line + 1),
            Cell::new(c.separator_line + 1),
            Cell::new(c.footer_line + 1),
            Cell::new(format!("{} line(s)", c.current.len())),
            Cell::new(format!("{} line(s)", c.incoming.len())),
        ]);
    }

    println!("{}", table);
    println!();

    Ok(())
}

fn cmd_resolve(file: &Path, accept: Side, index: Option<usize>, dry_run: bool) -> Result<()> {
    let text = buffer::read(file)?;
    let Some(resolved) = buffer::resolve(&text, accept.into(), index)? else {
        println!("{}", style::warn("No conflicts to resolve"));
        return Ok(());
    };

    if dry_run {
        print!("{}", resolved.text);
        return Ok(());
    }

    buffer::write(file, &resolved.text)?;
    let remaining = parse_conflicts(&resolved.text).len();
    let scope = match index {
        Some(i) => format!("Conflict {}", i),
        None => "All conflicts".to_string(),
    };
    println!(
        "{}",
        style::success(&format!("{} resolved ({})", scope, Resolution::from(accept)))
    );
    println!(
        "{}",
        style::dim(&format!(
            "cursor at line {}, column {}; {} conflict(s) remain",
            resolved.cursor.line + 1,
            resolved.cursor.column,
            remaining
        ))
    );
    Ok(())
}

fn cmd_suggest(config: &Path, file: &Path, old: &str, new: &str, dry_run: bool) -> Result<()> {
    let config = load_config_or_default(config)?;
    let text = buffer::read(file)?;
    let out = buffer::suggest(&text, old, new, &config.canvas.labels())?;

    if dry_run {
        print!("{}", out);
        return Ok(());
    }

    buffer::write(file, &out)?;
    println!(
        "{}",
        style::success(&format!(
            "Suggestion added ({} conflict(s) in {})",
            parse_conflicts(&out).len(),
            file.display()
        ))
    );
    Ok(())
}

fn cmd_pad(file: &Path) -> Result<()> {
    let text = buffer::read(file)?;
    let padded = pad_blank_lines(&text);
    if padded == text {
        println!("{}", style::dim("Already padded, nothing to do"));
        return Ok(());
    }
    buffer::write(file, &padded)?;
    println!("{}", style::success(&format!("Padded {}", file.display())));
    Ok(())
}

fn cmd_history(file: &Path) -> Result<()> {
    let history = StateHistory::load(file).context("failed to load state history")?;
    let summary = history.summary();

    println!();
    println!("{}", style::header(&format!("State history: {}", file.display())));
    println!();
    println!("  Lineages    : {}", summary.lineages);
    println!("  States      : {}", summary.states);
    println!("  Tool calls  : {}", summary.tool_calls);
    println!("  Forks       : {}", summary.forks);
    println!();

    if summary.lineages == 0 {
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Lineage", "States", "Messages (latest)", "Tool call"]);

    for (lineage_id, states) in &history.state_history_by_lineage {
        let tool_call = history
            .tool_calls_to_lineage_ids
            .iter()
            .find(|(_, lid)| *lid == lineage_id)
            .map(|(tc, _)| tc.as_str())
            .unwrap_or("—");
        let messages = states.last().map_or(0, |state| state.messages.len());

        table.add_row(vec![
            Cell::new(lineage_id),
            Cell::new(states.len()),
            Cell::new(messages),
            Cell::new(tool_call),
        ]);
    }

    println!("{}", table);
    println!();
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# looplit configuration
# Every setting is optional; the values below are the defaults.

[server]
listen = "127.0.0.1:8000"
# Overrides `listen` when the variable is set.
listen_env = "LOOPLIT_LISTEN"
log_level = "info"
# data_dir = "/var/lib/looplit"

[canvas]
# Labels written on the marker lines of suggested edits.
current_label = "Current"
incoming_label = "AI suggestion"

[web]
max_body_bytes = 8388608
# Empty allows any origin.
allowed_origins = []
broadcast_capacity = 256
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    println!();
    println!("Next steps:");
    println!("  1. Adjust the listen address and labels if needed");
    println!(
        "  2. Validate with: looplit validate --config {}",
        output.display()
    );
    println!(
        "  3. Start the server: looplit-server --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => {
            println!("  [OK] All fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Listen        : {}", config.server.listen);
    println!("  Log level     : {}", config.server.log_level);
    println!("  Data directory: {}", config.server.data_dir.display());
    println!(
        "  Labels        : {} / {}",
        config.canvas.current_label, config.canvas.incoming_label
    );
    println!("  Max body      : {} bytes", config.web.max_body_bytes);
    println!(
        "  CORS origins  : {}",
        if config.web.allowed_origins.is_empty() {
            "any".to_string()
        } else {
            config.web.allowed_origins.join(", ")
        }
    );
    println!();
    println!("{}", style::success("Configuration is valid."));

    Ok(())
}
