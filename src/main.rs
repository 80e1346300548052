use callsight::cli::{Cli, Commands, ConfigAction};
use callsight::config::Config;
use callsight::error::{CallsightError, Result};
use callsight::llm::OpenAiClient;
use callsight::pipeline::ChatPipeline;
use callsight::retrieval::{QdrantBackend, Retriever};
use callsight::store::RedisStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(cli.config, host, port).await?;
        }
        Commands::Ask { session, query } => {
            cmd_ask(cli.config, &session, &query).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "callsight=debug"
    } else {
        "callsight=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn cmd_serve(
    config_path: Option<std::path::PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = build_pipeline(&config).await?;

    let host = host.unwrap_or(config.server.host);
    let port = port.unwrap_or(config.server.port);

    callsight::server::serve(pipeline, &host, port).await
}

async fn cmd_ask(
    config_path: Option<std::path::PathBuf>,
    session: &str,
    query: &str,
) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = build_pipeline(&config).await?;

    let answer = pipeline.answer(session, query).await?;
    println!("{answer}");
    Ok(())
}

async fn build_pipeline(config: &Config) -> Result<Arc<ChatPipeline>> {
    let store = Arc::new(
        RedisStore::connect(
            &config.conversation.redis_url,
            config.conversation.history_limit,
            config.conversation.timeout_secs,
        )
        .await?,
    );
    let backend = Arc::new(QdrantBackend::from_config(&config.qdrant)?);
    let retriever = Retriever::new(backend, config.retrieval.topn);
    let llm = Arc::new(OpenAiClient::from_config(&config.openai)?);

    Ok(Arc::new(ChatPipeline::new(store, retriever, llm)))
}

fn cmd_config(config_path: Option<std::path::PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| CallsightError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{json}");
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CallsightError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
    }

    Ok(())
}

fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'callsight config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}
