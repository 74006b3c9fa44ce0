use clap::{parser::ValueSource, ArgMatches, CommandFactory, FromArgMatches, Parser};
use rowstore_http::serve;

#[derive(Parser)]
#[command(name = "rowstore", about = "Multi-index row store server")]
struct Cli {
    #[arg(long, env = "ROWSTORE_DATA_DIR", default_value = "./data")]
    data_dir: String,
    #[arg(long, env = "ROWSTORE_BIND_ADDR")]
    bind_addr: Option<String>,
    #[arg(long, env = "ROWSTORE_PORT")]
    port: Option<u16>,

    /// Config file to use instead of `rowstore.json` in the data dir.
    #[arg(long, env = "ROWSTORE_CONFIG")]
    config: Option<String>,

    /// Owner for requests that do not name one.
    #[arg(long, env = "ROWSTORE_OWNER")]
    owner: Option<String>,
}

struct RuntimeConfig {
    data_dir: String,
    bind_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    let runtime = resolve_runtime_config(&cli, &matches)
        .map_err(|msg| std::io::Error::new(std::io::ErrorKind::InvalidInput, msg))?;
    std::env::set_var("ROWSTORE_DATA_DIR", &runtime.data_dir);
    if let Some(bind_addr) = &runtime.bind_addr {
        std::env::set_var("ROWSTORE_BIND_ADDR", bind_addr);
    }
    if let Some(config) = &cli.config {
        std::env::set_var("ROWSTORE_CONFIG", config);
    }
    if let Some(owner) = &cli.owner {
        std::env::set_var("ROWSTORE_OWNER", owner);
    }
    serve().await
}

fn resolve_runtime_config(cli: &Cli, matches: &ArgMatches) -> Result<RuntimeConfig, String> {
    if cli.data_dir.trim().is_empty() {
        return Err("--data-dir cannot be empty".to_string());
    }
    Ok(RuntimeConfig {
        data_dir: cli.data_dir.clone(),
        bind_addr: resolve_bind_addr(cli, matches)?,
    })
}

/// `None` leaves the choice to the config file.
fn resolve_bind_addr(cli: &Cli, matches: &ArgMatches) -> Result<Option<String>, String> {
    if is_set_on_command_line(matches, "bind_addr") && is_set_on_command_line(matches, "port") {
        return Err("--bind-addr cannot be used with --port".to_string());
    }
    if is_set_on_command_line(matches, "port") {
        return Ok(cli.port.map(|port| format!("127.0.0.1:{port}")));
    }
    if let Some(bind_addr) = &cli.bind_addr {
        return Ok(Some(bind_addr.clone()));
    }
    Ok(cli.port.map(|port| format!("127.0.0.1:{port}")))
}

fn is_set_on_command_line(matches: &ArgMatches, arg: &str) -> bool {
    matches.value_source(arg) == Some(ValueSource::CommandLine)
}
