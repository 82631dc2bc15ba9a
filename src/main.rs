use anyhow::Result;
use clap::Parser;
use orchid::{api, cli, config, gate, store};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orchid", about = "Terminal client for the orchid shop")]
pub struct Args {
    #[arg(long, env = "ORCHID_API_URL", help = "Catalog API base URL")]
    pub base_url: Option<String>,

    #[arg(long, help = "Config file path (applied after the default layers)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Session file (default: ~/.orchid/session.json)")]
    pub session_file: Option<PathBuf>,

    #[arg(long, help = "Keep the session in memory only")]
    pub ephemeral: bool,

    #[arg(
        short = 'c',
        long = "command",
        value_name = "CMD",
        action = clap::ArgAction::Append,
        help = "Run a command and exit (repeatable)"
    )]
    pub commands: Vec<String>,

    #[arg(long, help = "Debug logging to stderr")]
    pub debug: bool,
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("orchid=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.debug);

    let mut cfg = config::Config::load(args.config.as_deref())?;
    if let Some(base_url) = &args.base_url {
        cfg.api.base_url = Some(base_url.clone());
    }
    if let Some(session_file) = &args.session_file {
        cfg.session.file = Some(session_file.clone());
    }

    if let Err(errors) = cfg.validate() {
        for error in &errors {
            eprintln!("config error {}", error);
        }
        return Err(anyhow::anyhow!("invalid configuration ({} problems)", errors.len()));
    }

    let store: Box<dyn store::SessionStore> = if args.ephemeral {
        Box::new(store::MemoryStore::new())
    } else {
        let file = store::FileStore::new(&cfg.session_file());
        debug!("session file {}", file.path().display());
        Box::new(file)
    };
    let gate = gate::SessionGate::new(store);

    let api = api::Client::new(
        cfg.base_url(),
        Box::new(api::HttpTransport::new(cfg.timeout())?),
    );
    debug!(base_url = api.base_url(), timeout = ?cfg.timeout(), "configuration loaded");
    let employees = match cfg.employees_url() {
        Some(url) => Some(api::EmployeeDirectory::new(
            url,
            Box::new(api::HttpTransport::new(cfg.timeout())?),
        )),
        None => None,
    };

    let ctx = cli::Context::new(cfg, gate, api, employees)?;

    if args.commands.is_empty() {
        cli::run_repl(ctx)
    } else {
        cli::run_once(&ctx, &args.commands)
    }
}
