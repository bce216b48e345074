use clap::Parser;
use eyre::WrapErr;
use gradle_tasks_config::{ServerConfig, Transport};
use std::path::PathBuf;

mod serve;

#[derive(Parser)]
#[command(name = "gradle-tasks-server")]
#[command(about = "Run and cancel Gradle project and task operations over JSON-RPC", long_about = None)]
#[command(version)]
struct Cli {
    /// Transport to serve on (unix, stdio)
    #[arg(long, value_parser = ["unix", "stdio"])]
    transport: Option<String>,

    /// Socket path for the unix transport
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Gradle executable (defaults to the project wrapper, then `gradle` on PATH)
    #[arg(long)]
    gradle: Option<PathBuf>,

    /// Replies buffered per operation before the build tool is slowed down
    #[arg(long)]
    reply_buffer: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Environment first, then command-line overrides
    fn into_config(self) -> eyre::Result<ServerConfig> {
        let mut config = ServerConfig::from_env().wrap_err("Invalid environment configuration")?;

        if let Some(transport) = self.transport {
            config.transport = transport.parse::<Transport>()?;
        }
        if let Some(socket) = self.socket {
            config.socket_path = Some(socket);
        }
        if let Some(gradle) = self.gradle {
            config.build_tool.executable = Some(gradle);
        }
        if let Some(reply_buffer) = self.reply_buffer {
            config.reply_buffer = reply_buffer;
        }
        config.verbosity = self.verbose;

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = cli.into_config()?;

    gradle_tasks_utils::init(config.verbosity)
        .map_err(|e| eyre::eyre!("Failed to initialize logging: {e}"))?;

    serve::execute(config).await
}
