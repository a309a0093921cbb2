use ds_gateway::cache::CacheStore;
use ds_gateway::config::Config;
use ds_gateway::datastage::DataStage;
use ds_gateway::exec::ProcessExecutor;
use ds_gateway::gateway::{self, Gateway};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "dsgate", version, about = "DataStage job-control gateway")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the registered operations over HTTP (default)
    Serve {
        /// Listen address, overrides `gateway.bind`
        #[arg(long)]
        bind: Option<String>,
    },
    /// List registered operations
    Tools,
    /// List loaded prompts
    Prompts,
    /// Invoke one operation and print its result as JSON
    Call {
        /// Operation name
        name: String,
        /// Keyword argument as key=value (repeatable)
        #[arg(short = 'a', long = "arg", value_parser = parse_key_value)]
        args: Vec<(String, String)>,
        /// Keyword arguments as a JSON object, merged before --arg values
        #[arg(long)]
        json: Option<String>,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{s}`"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| ds_gateway::gateway_home().join("config.yaml"));
    let config = Config::load(&config_path).await?;

    let missing = config.datastage.missing_settings();
    if !missing.is_empty() {
        warn!(?missing, "datastage connection settings incomplete; affected operations will fail");
    }

    let cache = open_cache(&config);
    let ds = Arc::new(DataStage::new(
        config.datastage.clone(),
        Arc::new(ProcessExecutor),
        cache,
    ));
    let gateway = Arc::new(gateway::bootstrap(&config, ds)?);

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(&config, bind, gateway).await,
        Command::Tools => {
            for op in gateway.operations() {
                let target = gateway.target(&op.name).unwrap_or("?");
                println!("{:<28} {:<40} {}", op.name, target, op.description);
            }
            Ok(())
        }
        Command::Prompts => {
            for p in gateway.prompts() {
                println!("{:<28} {}", p.name, p.description.as_deref().unwrap_or(""));
            }
            Ok(())
        }
        Command::Call { name, args, json } => call(&gateway, &name, args, json.as_deref()).await,
    }
}

/// Open and initialise the cache.  Any failure disables caching instead
/// of aborting startup.
fn open_cache(config: &Config) -> Option<Arc<CacheStore>> {
    if !config.cache.enabled {
        info!("result cache disabled by config");
        return None;
    }
    let path = config.cache.db_path();
    let opened = CacheStore::open_path(&path, config.cache.ttl()).and_then(|store| {
        store.init()?;
        Ok(store)
    });
    match opened {
        Ok(store) => {
            info!(path = %path.display(), ttl_secs = config.cache.ttl_secs, "result cache ready");
            Some(Arc::new(store))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "result cache unavailable, running uncached");
            None
        }
    }
}

async fn serve(config: &Config, bind: Option<String>, gateway: Arc<Gateway>) -> anyhow::Result<()> {
    let bind = bind.unwrap_or_else(|| config.gateway.bind.clone());
    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid listen address `{bind}`"))?;

    let shutdown = CancellationToken::new();
    let server = gateway::start_http(addr, gateway, config.gateway.api_token.clone(), shutdown.clone())
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %server.addr, "dsgate serving, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutdown requested");
    shutdown.cancel();
    server.handle.await.context("http server task panicked")?;
    Ok(())
}

async fn call(
    gateway: &Gateway,
    name: &str,
    pairs: Vec<(String, String)>,
    json: Option<&str>,
) -> anyhow::Result<()> {
    let mut args = match json {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("--json is not valid JSON")? {
            Value::Object(map) => map,
            _ => anyhow::bail!("--json must be a JSON object"),
        },
        None => Map::new(),
    };
    for (k, v) in pairs {
        args.insert(k, Value::String(v));
    }

    match gateway.invoke(name, args).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_body())?);
            Err(anyhow::Error::new(e))
        }
    }
}
