//! matlab-harness CLI - run MATLAB code through a validating session

use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use matlab_harness::error::{FixSuggestion, HarnessError};
use matlab_harness::project::CurrentProject;
use matlab_harness::workspace::{self, ExportFormat};
use matlab_harness::{
    render_execution, EngineKind, ExecutionRequest, Handle, LayoutStrategy, Orchestrator, Session,
    SessionConfig,
};

#[derive(Parser)]
#[command(name = "matlab-harness")]
#[command(about = "Execution orchestration and result validation for MATLAB engine sessions")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/matlab-harness/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Engine binding (matlab, mock)
    #[arg(long, global = true, default_value = "matlab")]
    engine: String,

    /// Log more (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a MATLAB script file
    Run {
        /// Path to .m file
        file: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Run MATLAB code given on the command line
    Exec {
        /// MATLAB code
        code: String,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Interactive session (`:help` lists commands)
    Repl {
        /// Start inside this project
        #[arg(long)]
        project: Option<String>,
    },

    /// Manage project directories
    Projects {
        #[command(subcommand)]
        action: ProjectAction,
    },
}

#[derive(Args)]
struct RunOptions {
    /// Do not capture engine output
    #[arg(long)]
    no_capture: bool,

    /// Skip result validation
    #[arg(long)]
    no_validate: bool,

    /// Leave figure windows where they are
    #[arg(long)]
    no_position: bool,

    /// Archive the script even if auto-save is disabled
    #[arg(long, conflicts_with = "no_save")]
    save: bool,

    /// Never archive the script
    #[arg(long)]
    no_save: bool,

    /// Run inside this project
    #[arg(long)]
    project: Option<String>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Treat warning-tier issues as failures
    #[arg(long)]
    strict: bool,

    /// Window layout (cascade, tile)
    #[arg(long)]
    strategy: Option<LayoutStrategy>,
}

#[derive(Subcommand)]
enum ProjectAction {
    /// List projects under the projects root
    List,

    /// Create (if needed) and show a project directory
    Set {
        /// Project name
        name: String,
    },

    /// Show the current project and workspace
    Current,
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            1
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report_error(e: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), e);
    if let Some(suggestion) = e.downcast_ref::<HarnessError>().and_then(|h| h.fix_suggestion()) {
        eprintln!("  {} {}", "Fix:".yellow(), suggestion);
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = SessionConfig::load(cli.config.as_deref())?.with_env();
    let kind: EngineKind = cli.engine.parse()?;

    match cli.command {
        Commands::Run { file, options } => {
            let code = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            run_code(config, kind, code, options).await
        }
        Commands::Exec { code, options } => run_code(config, kind, code, options).await,
        Commands::Repl { project } => repl(config, kind, project).await,
        Commands::Projects { action } => projects(config, action),
    }
}

async fn run_code(
    mut config: SessionConfig,
    kind: EngineKind,
    code: String,
    options: RunOptions,
) -> anyhow::Result<i32> {
    if options.strict {
        config.strict_validation = true;
    }
    if let Some(strategy) = options.strategy {
        config.layout_strategy = strategy;
    }

    let mut session = Session::new(config)?;
    if let Some(name) = &options.project {
        session.set_project(name)?;
    }
    session.start(kind).await?;

    let mut request = ExecutionRequest::from_config(code, session.config())
        .capture_output(!options.no_capture)
        .auto_save(match (options.save, options.no_save) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        });
    if options.no_validate {
        request = request.validate(false);
    }
    if options.no_position {
        request = request.auto_position(false);
    }

    let mut orchestrator = Orchestrator::new(session);
    let result = orchestrator.execute(request).await;
    orchestrator.session_mut().stop().await;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_execution(&result));
    }

    Ok(if result.success { 0 } else { 1 })
}

fn projects(config: SessionConfig, action: ProjectAction) -> anyhow::Result<i32> {
    let mut session = Session::new(config)?;
    match action {
        ProjectAction::List => print_projects(&session)?,
        ProjectAction::Set { name } => {
            let project = session.set_project(&name)?;
            println!("{} {} ({})", "✓ Project:".green(), project.name.bold(), project.dir.display());
        }
        ProjectAction::Current => print_current(&session),
    }
    Ok(0)
}

fn print_projects(session: &Session) -> anyhow::Result<()> {
    let listing = session.list_projects()?;
    println!("Projects in {}:", listing.root.display());
    if listing.projects.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for name in &listing.projects {
        if listing.current.as_deref() == Some(name.as_str()) {
            println!("  {} {}", "*".green(), name.bold());
        } else {
            println!("    {}", name);
        }
    }
    Ok(())
}

fn print_current(session: &Session) {
    match session.current_project() {
        CurrentProject::Active { name, dir, workspace_dir } => {
            println!("Current project: {} ({})", name.bold(), dir.display());
            println!("Workspace: {}", workspace_dir.display());
        }
        CurrentProject::NoneSet { workspace_dir } => {
            println!("No project set");
            println!("Workspace: {}", workspace_dir.display());
        }
    }
}

// ============================================================================
// REPL
// ============================================================================

const REPL_HELP: &str = "\
Commands:
  :quit                      leave the session
  :vars                      list workspace variables
  :get NAME                  show a variable
  :clear [NAME...]           clear variables (all without names)
  :project NAME              switch to a project
  :projects                  list projects
  :current                   show project and workspace
  :position [cascade|tile]   lay out open figures
  :export [HANDLE] [FILE]    export a figure (format from FILE extension)
  :export-all [FORMAT]       export every open figure
  :latex EXPR                convert a symbolic expression to LaTeX
  :save FILE                 save the last submitted code
Anything else is run as MATLAB code.";

async fn repl(config: SessionConfig, kind: EngineKind, project: Option<String>) -> anyhow::Result<i32> {
    let mut session = Session::new(config)?;
    if let Some(name) = &project {
        session.set_project(name)?;
    }
    let version = session.start(kind).await?;

    let interactive = std::io::stdin().is_terminal();
    if interactive {
        println!("{} {}", "MATLAB".cyan().bold(), version);
        println!("Type :help for commands, :quit to leave.");
    }

    let mut orchestrator = Orchestrator::new(session);
    let mut last_code: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if interactive {
            print!(">> ");
            let _ = std::io::stdout().flush();
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix(':') {
            match repl_command(orchestrator.session_mut(), command, last_code.as_deref()).await {
                Ok(ReplFlow::Continue) => {}
                Ok(ReplFlow::Quit) => break,
                Err(e) => report_error(&e),
            }
            continue;
        }

        let request = ExecutionRequest::from_config(line, orchestrator.session().config());
        let result = orchestrator.execute(request).await;
        print!("{}", render_execution(&result));
        last_code = Some(line.to_string());
    }

    orchestrator.session_mut().stop().await;
    Ok(0)
}

enum ReplFlow {
    Continue,
    Quit,
}

async fn repl_command(
    session: &mut Session,
    command: &str,
    last_code: Option<&str>,
) -> anyhow::Result<ReplFlow> {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match name {
        "q" | "quit" | "exit" => return Ok(ReplFlow::Quit),
        "help" => println!("{}", REPL_HELP),
        "vars" => {
            let listing = workspace::list_workspace(session).await?;
            if listing.variables.is_empty() {
                println!("{}", "(workspace is empty)".dimmed());
            } else {
                println!("{}", listing.variables.join("  "));
            }
            if !listing.details.trim().is_empty() {
                println!("{}", listing.details.trim_end());
            }
        }
        "get" => {
            let [var] = args.as_slice() else {
                bail!("usage: :get NAME");
            };
            let info = workspace::get_variable(session, var).await?;
            println!("{} = {}", info.name.bold(), info.value);
            if let Some(class) = &info.class {
                let size = info
                    .size
                    .as_ref()
                    .map(|dims| dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join("x"))
                    .unwrap_or_else(|| "?".to_string());
                println!("  {} {}", class.dimmed(), size.dimmed());
            }
        }
        "clear" => {
            if args.is_empty() {
                workspace::clear_workspace(session, None).await?;
                println!("Workspace cleared");
            } else {
                let names: Vec<String> = args.iter().map(|s| s.to_string()).collect();
                workspace::clear_workspace(session, Some(&names)).await?;
                println!("Cleared {}", names.join(", "));
            }
        }
        "project" => {
            let [project] = args.as_slice() else {
                bail!("usage: :project NAME");
            };
            let project = session.set_project(project)?;
            println!("{} {} ({})", "✓ Project:".green(), project.name.bold(), project.dir.display());
        }
        "projects" => print_projects(session)?,
        "current" => print_current(session),
        "position" => {
            let strategy = match args.first() {
                Some(s) => Some(s.parse::<LayoutStrategy>().map_err(anyhow::Error::msg)?),
                None => None,
            };
            let outcome = workspace::position_figures(session, strategy).await?;
            println!("Positioned {} figure(s) ({})", outcome.positioned, outcome.strategy);
            if let Some(error) = outcome.error {
                println!("  {} {}", "⚠".yellow(), error);
            }
        }
        "export" => {
            let (handle, file) = match args.as_slice() {
                [] => (None, None),
                [one] => match one.parse::<f64>() {
                    Ok(h) => (Some(Handle::new(h)), None),
                    Err(_) => (None, Some(*one)),
                },
                [h, file, ..] => {
                    let h = h.parse::<f64>().context("invalid figure handle")?;
                    (Some(Handle::new(h)), Some(*file))
                }
            };
            let format = match file.and_then(|f| Path::new(f).extension()).and_then(|e| e.to_str()) {
                Some(ext) => ext.parse::<ExportFormat>()?,
                None => ExportFormat::default(),
            };
            let path = workspace::export_figure(session, handle, file, format, None).await?;
            println!("{} {}", "✓ Exported:".green(), path.display());
        }
        "export-all" => {
            let format = match args.first() {
                Some(f) => f.parse::<ExportFormat>()?,
                None => ExportFormat::default(),
            };
            for export in workspace::export_all_figures(session, format, None).await? {
                match (export.path, export.error) {
                    (Some(path), _) => println!("  Figure {}: {}", export.handle, path.display()),
                    (None, Some(error)) => println!("  Figure {}: {}", export.handle, error.red()),
                    (None, None) => {}
                }
            }
        }
        "latex" => {
            if args.is_empty() {
                bail!("usage: :latex EXPR");
            }
            let latex = workspace::symbolic_latex(session, &args.join(" ")).await?;
            println!("{}", latex);
        }
        "save" => {
            let [file] = args.as_slice() else {
                bail!("usage: :save FILE");
            };
            let Some(code) = last_code else {
                bail!("nothing has been run yet");
            };
            let path = workspace::save_script(session, code, file)?;
            println!("{} {}", "✓ Saved:".green(), path.display());
        }
        other => bail!("unknown command ':{}' (try :help)", other),
    }
    Ok(ReplFlow::Continue)
}
