use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use datapack_forge::archive::archive_filename;
use datapack_forge::cli::{Args, Command, GenerateArgs, ProviderKind};
use datapack_forge::config::Config;
use datapack_forge::log::init_tracing;
use datapack_forge::pipeline::Pipeline;
use datapack_forge::prompt::{build_prompt_with, VersionRuleSet};
use datapack_forge::server::{self, AppState};
use datapack_forge::store::{SqliteStore, Store};
use datapack_forge::validate::validate_value;
use datapack_forge::{ux, wire::GenerateRequest};

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut cfg = Config::load(args.config.as_deref())?;
    if let Some(kind) = args.provider {
        cfg.set_provider(kind);
    }
    if let Some(model) = &args.model {
        cfg.model = model.clone();
    }
    if let Some(secs) = args.timeout_secs {
        cfg.timeout_secs = secs;
    }
    if let Some(policy) = args.repair_policy {
        cfg.repair_policy = policy;
    }
    if let Some(db) = &args.db {
        cfg.db_path = Some(db.clone());
    }
    cfg.save_request |= args.save_request;
    cfg.save_response |= args.save_response;
    cfg.resolve_api_key(|name| std::env::var(name).ok());
    Ok(cfg)
}

async fn run_generate(cfg: &Config, g: GenerateArgs) -> anyhow::Result<()> {
    let req = GenerateRequest { idea: Some(g.idea), version: g.version, owner_id: g.owner }
        .normalize(&cfg.default_version)?;
    let pipeline = Pipeline::from_config(cfg)?;

    let pb = ux::spinner(&format!("generating datapack for {}", req.version));
    let result = pipeline
        .create_datapack(&req.idea, &req.version, req.owner_id.as_deref())
        .await;
    pb.finish_and_clear();
    let created = result?;

    let out = match g.out {
        Some(p) if p.is_dir() => p.join(archive_filename(&created.spec.name)),
        Some(p) => p,
        None => PathBuf::from(archive_filename(&created.spec.name)),
    };
    fs_err::write(&out, &created.archive)?;
    ux::print_created(&created, &out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);
    let cfg = load_config(&args)?;

    match args.command {
        Command::Generate(g) => run_generate(&cfg, g).await?,
        Command::Validate { file } => {
            let text = fs_err::read_to_string(&file)?;
            let value: serde_json::Value =
                serde_json::from_str(&text).with_context(|| format!("{} is not JSON", file.display()))?;
            let result = validate_value(&value);
            ux::print_validation(&result);
            if !result.is_valid() {
                std::process::exit(1);
            }
        }
        Command::Prompt { idea, version } => {
            let rules = VersionRuleSet::load(cfg.version_rules.as_deref())?;
            let version = version.unwrap_or_else(|| cfg.default_version.clone());
            println!("{}", build_prompt_with(&rules, &idea, &version));
        }
        Command::Versions => {
            let rules = VersionRuleSet::load(cfg.version_rules.as_deref())?;
            ux::print_versions(&rules, &cfg.default_version);
        }
        Command::Show { id } => {
            let Some(db) = &cfg.db_path else {
                bail!("no database configured; saved datapacks are only kept in memory");
            };
            let store = SqliteStore::open(db)?;
            match store.load(&id).await? {
                Some(row) => println!("{}", serde_json::to_string_pretty(&row)?),
                None => bail!("no datapack with id {id}"),
            }
        }
        Command::Serve { bind } => {
            if cfg.api_key.is_none() && cfg.provider != ProviderKind::Ollama {
                tracing::warn!("{} is not set; generation requests will fail", cfg.api_key_env);
            }
            let bind = bind.unwrap_or_else(|| cfg.bind.clone());
            let state = AppState {
                pipeline: Arc::new(Pipeline::from_config(&cfg)?),
                default_version: cfg.default_version.clone(),
            };
            server::serve(state, &bind).await?;
        }
    }

    Ok(())
}
