#![forbid(unsafe_code)]

mod cmd;
mod output;
mod session;

use clap::{CommandFactory, Parser, Subcommand};
use engage_core::ErrorCode;
use engage_core::config::{EngageConfig, load_config};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use session::Session;
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "engage: comments, reactions and comment carousels for posts",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit backend timing report to stderr.
    #[arg(long, global = true)]
    timing: bool,

    /// Output format: pretty, text, or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Local backend database, overriding `storage.database`.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Comments",
        about = "Show a post's comment thread",
        long_about = "Load a post's comments and print them as a one-level thread.",
        after_help = "EXAMPLES:\n    # Show the thread for a post\n    engage comments welcome-post\n\n    # Emit machine-readable output\n    engage comments welcome-post --json"
    )]
    Comments(cmd::comments::CommentsArgs),

    #[command(
        next_help_heading = "Comments",
        about = "Post a comment or reply",
        long_about = "Validate and submit a comment on a post, or a reply to a top-level comment.",
        after_help = "EXAMPLES:\n    # Comment on a post\n    engage comment welcome-post --name Ada --email ada@example.com \"Nice write-up\"\n\n    # Reply to a comment\n    engage comment welcome-post --name Ada --email ada@example.com --reply-to c-123 \"Agreed\"\n\n    # Emit machine-readable output\n    engage comment welcome-post --name Ada --email ada@example.com \"Hi\" --json"
    )]
    Comment(cmd::comment::CommentArgs),

    #[command(
        next_help_heading = "Comments",
        about = "Autoplay a post's comment carousel",
        long_about = "Cycle through a post's top-level comments on a timer, one slide per tick.",
        after_help = "EXAMPLES:\n    # Play one full cycle\n    engage carousel welcome-post\n\n    # Six ticks, one per second\n    engage carousel welcome-post --ticks 6 --interval-ms 1000"
    )]
    Carousel(cmd::carousel::CarouselArgs),

    #[command(
        next_help_heading = "Reactions",
        about = "Toggle your reaction on a post",
        long_about = "Add, switch or remove your like/dislike on a post. Repeating your current reaction removes it.",
        after_help = "EXAMPLES:\n    # Like a post\n    engage react welcome-post like\n\n    # Switch to dislike\n    engage react welcome-post dislike\n\n    # Emit machine-readable output\n    engage react welcome-post like --json"
    )]
    React(cmd::react::ReactArgs),

    #[command(
        next_help_heading = "Reactions",
        about = "Show reaction counts for a post",
        long_about = "Fetch aggregate like/dislike counts and your own reaction for a post.",
        after_help = "EXAMPLES:\n    # Show counts\n    engage reactions welcome-post\n\n    # Emit machine-readable output\n    engage reactions welcome-post --json"
    )]
    Reactions(cmd::reactions::ReactionsArgs),

    #[command(
        next_help_heading = "Identity",
        about = "Show the current visitor identity",
        long_about = "Print the persistent visitor id, creating it on first use.",
        after_help = "EXAMPLES:\n    # Show your visitor id\n    engage whoami\n\n    # Emit machine-readable output\n    engage whoami --json"
    )]
    Whoami,

    #[command(
        next_help_heading = "Testing",
        about = "Run deterministic simulations of concurrent visitors"
    )]
    Sim(cmd::sim::SimArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    engage completions bash\n\n    # Generate zsh completions\n    engage completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ENGAGE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "engage=debug,info"
        } else {
            "engage=info,warn"
        })
    });

    let format = env::var("ENGAGE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}

fn timing_enabled_from_env() -> bool {
    env::var("ENGAGE_TIMING")
        .map(|raw| matches!(raw.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn run_with_backend(
    command: &Commands,
    session: &Session,
    output: OutputMode,
) -> anyhow::Result<()> {
    match command {
        Commands::Comments(args) => cmd::comments::run_comments(args, output, session),
        Commands::Comment(args) => cmd::comment::run_comment(args, output, session),
        Commands::Carousel(args) => cmd::carousel::run_carousel(args, output, session),
        Commands::React(args) => cmd::react::run_react(args, output, session),
        Commands::Reactions(args) => cmd::reactions::run_reactions(args, output, session),
        Commands::Whoami => cmd::whoami::run_whoami(output, session),
        Commands::Sim(_) | Commands::Completions(_) => Ok(()),
    }
}

fn load_project_config(cli: &Cli, project_root: &Path) -> anyhow::Result<EngageConfig> {
    load_config(project_root).inspect_err(|err| {
        let output = resolve_output_mode(cli.format, cli.json, None);
        let error = CliError::from_code(ErrorCode::ConfigParseError, format!("{err:#}"));
        // Best effort; the error itself is still returned.
        let _ = render_error(output, &error);
    })
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let timing_enabled = cli.timing || timing_enabled_from_env();

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    match cli.command {
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            return cmd::completions::run_completions(args.shell, &mut command);
        }
        Commands::Sim(ref args) => {
            let output = resolve_output_mode(cli.format, cli.json, None);
            return cmd::sim::run_sim(args, output);
        }
        _ => {}
    }

    let project_root = env::current_dir()?;
    let config = load_project_config(&cli, &project_root)?;
    let output = resolve_output_mode(cli.format, cli.json, config.output.as_deref());
    let session = Session::open(config, cli.db.as_deref(), &project_root, output)?;

    let command_result = run_with_backend(&cli.command, &session, output);

    if timing_enabled {
        let report = session.remote.report();
        if report.is_empty() {
            eprintln!("timing report: no samples recorded");
        } else {
            eprintln!("timing report:");
            eprintln!("{}", report.display_table());
            eprintln!("timing report (json):");
            eprintln!("{}", serde_json::to_string_pretty(&report.to_json())?);
        }
    }

    command_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_core::model::ReactionKind;

    #[test]
    fn timing_flag_parses_before_subcommand() {
        let cli = Cli::parse_from(["engage", "--timing", "whoami"]);
        assert!(cli.timing);
        assert!(matches!(cli.command, Commands::Whoami));
    }

    #[test]
    fn timing_flag_parses_after_subcommand() {
        let cli = Cli::parse_from(["engage", "reactions", "p1", "--timing"]);
        assert!(cli.timing);
        assert!(matches!(cli.command, Commands::Reactions(_)));
    }

    #[test]
    fn json_flag_after_subcommand() {
        let cli = Cli::parse_from(["engage", "comments", "p1", "--json"]);
        assert!(cli.json);
        assert_eq!(resolve_output_mode(cli.format, cli.json, None), OutputMode::Json);
    }

    #[test]
    fn format_flag_parses_value() {
        let cli = Cli::parse_from(["engage", "--format", "text", "whoami"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
    }

    #[test]
    fn db_flag_is_global() {
        let cli = Cli::parse_from(["engage", "whoami", "--db", "/tmp/x.db"]);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
    }

    #[test]
    fn comments_parses_post() {
        let cli = Cli::parse_from(["engage", "comments", "welcome"]);
        let Commands::Comments(args) = cli.command else {
            panic!("expected comments");
        };
        assert_eq!(args.post, "welcome");
    }

    #[test]
    fn comment_parses_reply_target() {
        let cli = Cli::parse_from([
            "engage",
            "comment",
            "welcome",
            "--name",
            "Ada",
            "--email",
            "ada@example.com",
            "--reply-to",
            "c-1",
            "hello",
        ]);
        let Commands::Comment(args) = cli.command else {
            panic!("expected comment");
        };
        assert_eq!(args.name, "Ada");
        assert_eq!(args.reply_to.as_deref(), Some("c-1"));
        assert_eq!(args.content, "hello");
    }

    #[test]
    fn react_parses_kind_aliases() {
        let cli = Cli::parse_from(["engage", "react", "welcome", "up"]);
        let Commands::React(args) = cli.command else {
            panic!("expected react");
        };
        assert_eq!(args.kind, ReactionKind::Like);

        let cli = Cli::parse_from(["engage", "react", "welcome", "dislike"]);
        let Commands::React(args) = cli.command else {
            panic!("expected react");
        };
        assert_eq!(args.kind, ReactionKind::Dislike);
    }

    #[test]
    fn react_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["engage", "react", "welcome", "love"]).is_err());
    }

    #[test]
    fn carousel_parses_ticks_and_interval() {
        let cli = Cli::parse_from([
            "engage",
            "carousel",
            "welcome",
            "--ticks",
            "3",
            "--interval-ms",
            "20",
        ]);
        let Commands::Carousel(args) = cli.command else {
            panic!("expected carousel");
        };
        assert_eq!(args.ticks, Some(3));
        assert_eq!(args.interval_ms, Some(20));
    }

    #[test]
    fn sim_run_parses_flags() {
        let cli = Cli::parse_from([
            "engage", "sim", "run", "--seeds", "10", "--visitors", "3", "--faults", "40",
        ]);
        let Commands::Sim(args) = cli.command else {
            panic!("expected sim");
        };
        let cmd::sim::SimCommand::Run(run) = args.command else {
            panic!("expected sim run");
        };
        assert_eq!(run.seeds, 10);
        assert_eq!(run.world.visitors, 3);
        assert_eq!(run.world.faults, 40);
    }

    #[test]
    fn sim_rejects_fault_rate_over_100() {
        assert!(Cli::try_parse_from(["engage", "sim", "run", "--faults", "101"]).is_err());
    }

    #[test]
    fn sim_replay_requires_seed() {
        assert!(Cli::try_parse_from(["engage", "sim", "replay"]).is_err());
        let cli = Cli::parse_from(["engage", "sim", "replay", "--seed", "42"]);
        assert!(matches!(cli.command, Commands::Sim(_)));
    }

    #[test]
    fn completions_parses_shell() {
        let cli = Cli::parse_from(["engage", "completions", "bash"]);
        assert!(matches!(cli.command, Commands::Completions(_)));
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
