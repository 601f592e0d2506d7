use clap::{Parser, Subcommand};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use prtracker_cli::commands::calc::CalcArgs;
use prtracker_cli::commands::movement::MovementCommands;
use prtracker_cli::commands::pr::PrCommands;
use prtracker_cli::commands::wod::WodCommands;
use prtracker_cli::commands::{account, calc, movement, pr, shell, wod};
use prtracker_cli::config::{ConfigArgs, LogFormat};
use prtracker_cli::error::AppError;
use prtracker_cli::util;

#[derive(Parser)]
#[command(
    name = "prtracker",
    version,
    about = "PR Tracker CLI: personal records, benchmark WODs and an AI coaching assistant"
)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Log output format on stderr
    #[arg(long, env = "PRTRACKER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with e-mail and password
    Login {
        #[arg(long)]
        email: String,
        /// Prompted for when omitted
        #[arg(long, env = "PRTRACKER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        /// Prompted for when omitted
        #[arg(long, env = "PRTRACKER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Movement catalog
    Movement {
        #[command(subcommand)]
        command: MovementCommands,
    },
    /// Personal records
    Pr {
        #[command(subcommand)]
        command: PrCommands,
    },
    /// Benchmark workouts and scores
    Wod {
        #[command(subcommand)]
        command: WodCommands,
    },
    /// Percentage calculator over weight-based records
    Calc(CalcArgs),
    /// Interactive shell with the AI coaching assistant
    Shell,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    let layer = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
    };
    tracing_subscriber::registry().with(filter).with(layer).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => util::report_error(&err),
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = cli.config.resolve()?;
    match cli.command {
        Commands::Login { email, password } => account::login(&config, &email, password).await,
        Commands::Signup { email, password } => account::signup(&config, &email, password).await,
        Commands::Logout => account::logout(&config).await,
        Commands::Whoami => account::whoami(&config).await,
        Commands::Movement { command } => movement::run(&config, command).await,
        Commands::Pr { command } => pr::run(&config, command).await,
        Commands::Wod { command } => wod::run(&config, command).await,
        Commands::Calc(args) => calc::run(&config, args).await,
        Commands::Shell => shell::run(&config).await,
    }
}
