mod cargo;
mod commands;
mod core;
mod release;
mod system;
mod ui;
mod utils;

use clap::{Parser, Subcommand};
use core::error::{ConvoyError, print_error};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// All-or-nothing releases for Cargo workspaces
#[derive(Parser)]
#[command(name = "cargo")]
#[command(bin_name = "cargo")]
#[command(styles = get_styles())]
enum CargoCli {
  Convoy(ConvoyCli),
}

#[derive(Parser)]
#[command(name = "convoy")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(styles = get_styles())]
struct ConvoyCli {
  /// Show debug diagnostics on stderr (RUST_LOG overrides)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Write a starter convoy.toml for this workspace
  Init {
    /// Target triples to build (default: host triple)
    #[arg(long = "target", value_name = "TRIPLE")]
    targets: Vec<String>,
    /// Overwrite an existing configuration
    #[arg(long)]
    force: bool,
  },

  /// Run the pipeline: gate, build, package, publish (release tags only)
  ///
  /// Any other ref runs a validation build of every target.
  Release {
    /// Git ref or tag name that triggered the run (default: $GITHUB_REF)
    #[arg(long = "ref", value_name = "REF")]
    reference: Option<String>,
    /// Gate, build and package, but publish nothing
    #[arg(long)]
    dry_run: bool,
    /// Output the run report in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Check that every manifest declares the tag's version
  Gate {
    /// Release tag, e.g. v1.2.0
    #[arg(long)]
    tag: String,
    /// Output results in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Build every configured target (no packaging, no publish)
  Build {
    /// Output results in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Show what a release of TAG would do
  Plan {
    /// Release tag, e.g. v1.2.0
    #[arg(long)]
    tag: String,
    /// Output the plan in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Retry attaching archives to an already published release
  Attach {
    /// Release tag, e.g. v1.2.0
    #[arg(long)]
    tag: String,
  },
}

fn get_styles() -> clap::builder::Styles {
  let yellow = Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow));
  let green = Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green));
  let red = Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red));

  clap::builder::Styles::styled()
    .usage(anstyle::Style::new().bold().underline().fg_color(yellow))
    .header(anstyle::Style::new().bold().underline().fg_color(yellow))
    .literal(anstyle::Style::new().fg_color(green))
    .invalid(anstyle::Style::new().bold().fg_color(red))
    .error(anstyle::Style::new().bold().fg_color(red))
    .valid(anstyle::Style::new().bold().underline().fg_color(green))
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

/// Diagnostics go to stderr; stdout is reserved for status lines and JSON
fn init_tracing(verbose: bool) {
  let default = if verbose { "cargo_convoy=debug" } else { "cargo_convoy=warn" };
  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::registry()
    .with(env_filter)
    .with(
      tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr),
    )
    .try_init()
    .ok();
}

fn main() {
  let CargoCli::Convoy(cli) = CargoCli::parse();
  init_tracing(cli.verbose);

  let workspace_root = match std::env::current_dir() {
    Ok(dir) => dir,
    Err(e) => handle_error(ConvoyError::from(e).context("Failed to get current directory")),
  };

  let result = match cli.command {
    Commands::Init { targets, force } => commands::run_init(&workspace_root, targets, force),
    Commands::Release {
      reference,
      dry_run,
      json,
    } => commands::run_release(&workspace_root, reference, dry_run, json),
    Commands::Gate { tag, json } => commands::run_gate(&workspace_root, &tag, json),
    Commands::Build { json } => commands::run_build(&workspace_root, json),
    Commands::Plan { tag, json } => commands::run_plan(&workspace_root, &tag, json),
    Commands::Attach { tag } => commands::run_attach(&workspace_root, &tag),
  };

  if let Err(err) = result {
    handle_error(err);
  }
}

fn handle_error(err: ConvoyError) -> ! {
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}
