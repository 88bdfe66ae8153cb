//! Sasayaki chat server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin sasayaki-server
//! cargo run --bin sasayaki-server -- serve --host 0.0.0.0 --port 3000
//! cargo run --bin sasayaki-server -- export json-pretty --as-user alice
//! ```

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand};
use sasayaki_server::{
    domain::User,
    infrastructure::{
        export::{ExportFormat, export},
        store::{DurableLog, filter_for_user},
        users::UserDirectory,
    },
    ui::{Server, ServerConfig},
};
use sasayaki_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "sasayaki-server")]
#[command(about = "Multi-room chat server with whispers and live delivery", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Arguments of `serve`, which runs when no subcommand is given
    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server (default)
    Serve(ServeArgs),
    /// Write the stored history to a file or stdout
    Export(ExportArgs),
}

/// File locations shared by every subcommand.
#[derive(Args, Debug)]
struct PathArgs {
    /// Users config file
    #[arg(short = 'u', long, env = "SASAYAKI_USERS", default_value = "users.yaml")]
    users: PathBuf,

    /// Message log file
    #[arg(short = 's', long, env = "SASAYAKI_STORE", default_value = "messages.log")]
    store: PathBuf,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    paths: PathArgs,

    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Number of recent messages kept in memory
    #[arg(long, default_value = "300")]
    max_messages: usize,

    /// Accept users without tokens (development only)
    #[arg(long)]
    disable_token_check: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    paths: PathArgs,

    /// Output format
    #[arg(value_enum, default_value = "log")]
    format: ExportFormat,

    /// Export as seen by this user; `*` for public messages only
    #[arg(long)]
    as_user: Option<String>,

    /// Output file, `-` for stdout
    #[arg(short = 'o', long, default_value = "-")]
    output: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Command::Serve(cli.serve)) {
        Command::Serve(args) => {
            setup_logger(env!("CARGO_BIN_NAME"), "info");
            serve(args).await
        }
        Command::Export(args) => {
            setup_logger(env!("CARGO_BIN_NAME"), "warn");
            run_export(args).await
        }
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig {
        users_path: args.paths.users,
        store_path: args.paths.store,
        max_messages: args.max_messages,
        disable_token_check: args.disable_token_check,
        ..ServerConfig::default()
    };

    if config.disable_token_check {
        tracing::warn!("Token checking is disabled");
    }

    Server::new(config).run(args.host, args.port).await?;
    Ok(())
}

async fn run_export(args: ExportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let reader = match args.as_user.as_deref() {
        None => User::omniscient(),
        Some("*") => User::public_only(),
        Some(name) => {
            let directory = UserDirectory::load(&args.paths.users, false)?;
            let user = directory
                .get(name)
                .ok_or_else(|| format!("User '{}' not found", name))?;
            (*user).clone()
        }
    };

    let msgs = filter_for_user(DurableLog::load_recent(&args.paths.store, None).await?, &reader);

    if args.output == "-" {
        export(args.format, &msgs, io::stdout().lock())?;
    } else {
        let mut out = BufWriter::new(File::create(&args.output)?);
        export(args.format, &msgs, &mut out)?;
        out.flush()?;
    }

    Ok(())
}
