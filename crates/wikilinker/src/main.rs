use std::env;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::info;
use wikilinker_core::client::{MediaWikiHttp, MediaWikiHttpConfig};
use wikilinker_core::config::{DEFAULT_CONFIG_FILENAME, LinkerConfig, load_config};
use wikilinker_core::extract::extract_from_segments;
use wikilinker_core::format::{NEEDS_PREFIX_MESSAGE, format_lookup, format_resolution};
use wikilinker_core::registry::{RegistryBuild, SiteEntry, WikiRegistry};
use wikilinker_core::resolve::Resolver;

#[derive(Debug, Parser)]
#[command(
    name = "wikilinker",
    version,
    about = "Resolve [[wiki links]] in chat messages against configured MediaWiki sites"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "ID",
        help = "Use the default wikis configured for this channel"
    )]
    channel: Option<String>,
    #[arg(
        long = "default-wiki",
        global = true,
        value_name = "PREFIX",
        help = "Override the default wikis (repeatable, in priority order)"
    )]
    default_wikis: Vec<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Resolve every [[reference]] found in the message text")]
    Resolve(ResolveArgs),
    #[command(about = "Resolve a single title and print its URL")]
    Lookup(LookupArgs),
    #[command(about = "Initialize the configured wikis and print their status")]
    Sites,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    #[arg(required = true, value_name = "TEXT")]
    segments: Vec<String>,
}

#[derive(Debug, Args)]
struct LookupArgs {
    title: String,
}

struct Runtime {
    config: LinkerConfig,
    api: MediaWikiHttp,
    build: RegistryBuild,
    channel: Option<String>,
    default_override: Vec<String>,
}

impl Runtime {
    async fn start(cli: &Cli) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = cli
            .config
            .clone()
            .or_else(|| env::var_os("WIKILINKER_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
        let config = load_config(&config_path)?;
        info!(
            path = %config_path.display(),
            wikis = config.wikis.len(),
            "configuration loaded"
        );

        let api = MediaWikiHttp::new(MediaWikiHttpConfig::from_config(&config))?;
        let build = WikiRegistry::build(&api, &config.wikis).await;

        Ok(Self {
            config,
            api,
            build,
            channel: cli.channel.clone(),
            default_override: cli.default_wikis.clone(),
        })
    }

    fn resolver(&self) -> Resolver<'_, MediaWikiHttp> {
        Resolver::new(&self.build.registry, &self.api)
    }

    fn default_wikis(&self) -> Vec<String> {
        if !self.default_override.is_empty() {
            return self.default_override.clone();
        }
        self.config.default_wikis_for(self.channel.as_deref())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wikilinker=info,wikilinker_core=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let Some(command) = &cli.command else {
        let mut command = Cli::command();
        command.print_help()?;
        println!();
        return Ok(());
    };

    let runtime = Runtime::start(&cli).await?;
    match command {
        Commands::Resolve(args) => run_resolve(&runtime, args).await,
        Commands::Lookup(args) => run_lookup(&runtime, args).await,
        Commands::Sites => run_sites(&runtime),
    }
}

async fn run_resolve(runtime: &Runtime, args: &ResolveArgs) -> Result<()> {
    let candidates = extract_from_segments(&args.segments);
    if candidates.is_empty() {
        return Ok(());
    }

    match runtime
        .resolver()
        .resolve(&candidates, || runtime.default_wikis())
        .await
    {
        Some(resolution) => {
            for line in format_resolution(&candidates, &resolution) {
                println!("{line}");
            }
        }
        None => println!("{NEEDS_PREFIX_MESSAGE}"),
    }
    Ok(())
}

async fn run_lookup(runtime: &Runtime, args: &LookupArgs) -> Result<()> {
    let outcome = runtime
        .resolver()
        .lookup(&args.title, || runtime.default_wikis())
        .await;
    println!("{}", format_lookup(args.title.trim(), &outcome));
    Ok(())
}

fn run_sites(runtime: &Runtime) -> Result<()> {
    let registry = &runtime.build.registry;
    if registry.is_empty() {
        println!("no wikis configured");
        return Ok(());
    }
    for (prefix, entry) in registry.prefixes() {
        match entry {
            SiteEntry::Ready { site, .. } => {
                println!("{prefix}: {} ({})", site.site_name(), site.endpoint())
            }
            SiteEntry::Failed => println!("{prefix}: unavailable"),
            SiteEntry::Unregistered => {}
        }
    }
    for failure in &runtime.build.failures {
        println!("failed: {} ({})", failure.endpoint, failure.error);
    }
    for prefix in &runtime.build.duplicate_prefixes {
        println!("duplicate prefix: {prefix}");
    }
    let defaults = runtime.default_wikis();
    println!(
        "default wikis: {}",
        if defaults.is_empty() {
            "<none>".to_string()
        } else {
            defaults.join(", ")
        }
    );
    Ok(())
}
