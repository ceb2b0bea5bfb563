use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use config_resolver::{apply_overrides, resolve, split_overrides, ConfigSource, Strictness};
use trainer::extras::{apply_extras, enforce_tags, save_config};
use trainer::resolvers::application_resolvers;
use trainer::{Factory, Trainer};

const OUTPUT_DIR_KEY: &str = "paths.output_dir";

#[derive(Parser)]
#[command(author, version, about = "Resolve a training config and build the trainer", long_about = None)]
struct Cli {
    /// Directory holding the primary config and its groups
    #[arg(long, default_value = "configs")]
    config_dir: PathBuf,

    /// Primary config file name, without `.yaml`
    #[arg(long, default_value = "train")]
    config_name: String,

    /// Warn about unknown keys instead of failing
    #[arg(long)]
    lenient: bool,

    /// Also print the resolved config as JSON
    #[arg(long)]
    json: bool,

    /// Overrides: `key=value`, `+key=value`, `++key=value`, `~key`, `group=option`
    overrides: Vec<String>,
}

fn prompt_tags() -> io::Result<String> {
    print!("Enter a list of comma separated tags: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

fn run(cli: &Cli, output_dir: &mut Option<PathBuf>) -> Result<Trainer> {
    let strictness = if cli.lenient {
        Strictness::Lenient
    } else {
        Strictness::Strict
    };
    let source = ConfigSource::new(&cli.config_dir);

    // 1. Compose the config with group choices from the command line
    let (choices, overrides) = split_overrides(&cli.overrides, &source)?;
    let mut composed = source
        .compose(&cli.config_name, &choices)
        .with_context(|| format!("Failed to load config <{}>", cli.config_name))?;
    apply_overrides(&mut composed, &overrides, strictness)?;
    enforce_tags(&mut composed, strictness, prompt_tags)?;

    // 2. Resolve interpolations
    let cfg = resolve(composed, &application_resolvers())?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&cfg.value)?);
    }

    // 3. Prepare the run directory
    if let Some(dir) = cfg.get(OUTPUT_DIR_KEY).and_then(|v| v.as_str()) {
        let dir = PathBuf::from(dir);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;
        save_config(&cfg, &dir)?;
        *output_dir = Some(dir);
    }
    apply_extras(&cfg, output_dir.as_deref(), strictness)?;

    // 4. Build the trainer
    let factory = Factory::new(strictness);
    let trainer = factory.build_trainer(&cfg)?;
    Ok(trainer)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("LOG_LEVEL", "info")).init();

    if std::env::var_os("PROJECT_ROOT").is_none() {
        std::env::set_var("PROJECT_ROOT", std::env::current_dir()?);
    }

    let cli = Cli::parse();
    let mut output_dir = None;
    let result = run(&cli, &mut output_dir);

    // errors are printed once, by the returned `Result`
    if let Ok(trainer) = &result {
        log::info!("Instantiated trainer:\n{}", trainer.summary());
    }
    match &output_dir {
        Some(dir) => log::info!("Output dir: {}", dir.display()),
        None => log::info!("No output dir configured"),
    }

    result.map(|_| ())
}
