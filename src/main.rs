//! Rewrite engine CLI entry point.
//!
//! Validates rule files and dry-runs requests against them.

use anyhow::{bail, Context, Result};
use clap::Parser;
use rewrite_engine::{RequestInfo, Rewrite, RewriteConfig, RewriteEngine};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "rewrite-engine")]
#[command(author, version, about = "Rule-based URL rewriting engine")]
struct Args {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long, env = "REWRITE_CONFIG")]
    config: Option<PathBuf>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit.
    #[arg(long)]
    example_config: bool,

    /// Validate configuration and exit.
    #[arg(long)]
    validate: bool,

    /// Request URI to run through the rules (may include a query string)
    #[arg(long)]
    request: Option<String>,

    /// HTTP method of the dry-run request
    #[arg(long, default_value = "GET")]
    method: String,

    /// Context path of the dry-run request
    #[arg(long)]
    context_path: Option<String>,

    /// Request header of the dry-run request, as "Name: value" (repeatable)
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,
}

/// Dry-run outcome printed as JSON.
#[derive(Debug, Serialize)]
struct DryRunReport {
    state: String,
    status: u16,
    headers: Vec<(String, String)>,
    values: BTreeMap<String, serde_json::Value>,
}

fn print_example_config() {
    let example = r#"# Rewrite Engine Configuration Example
version: "1"

settings:
  # Context path applied to requests that do not carry one
  context_path: ""
  # Enable debug header (X-Rewrite-Rule)
  debug_headers: false

rules:
  # Permanent redirect of legacy product URLs
  - id: "legacy-product"
    description: "Redirect /product.php/42 to /products/42"
    priority: 100
    match:
      path: "/product.php/{id}"
      methods: ["GET", "HEAD"]
    where:
      id:
        matches: "\\d+"
        converter: integer
        bind_to: [product_id]
    perform:
      redirect:
        location: "/products/#{id}"
        permanent: true

  # Internal forward with a normalized parameter
  - id: "tags"
    priority: 50
    match:
      path: "/tags/{tag}"
      dispatch: request
    where:
      tag:
        transforms: [url_decode, lowercase]
        validator: not_empty
    perform:
      headers:
        - name: "X-Tag"
          value: "{tag}"
      forward: "/search?tag={tag}"
"#;
    println!("{}", example);
}

fn load_config(path: &Path) -> Result<RewriteConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?
    };
    Ok(config)
}

fn build_request(args: &Args, uri: &str) -> Result<RequestInfo> {
    let mut request = RequestInfo::new(args.method.to_uppercase(), uri);
    if let Some(context_path) = &args.context_path {
        request = request.with_context_path(context_path.clone());
    }
    for header in &args.headers {
        let Some((name, value)) = header.split_once(':') else {
            bail!("Invalid header [{}], expected \"Name: value\"", header);
        };
        request = request.with_header(name.trim(), value.trim());
    }
    Ok(request)
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // Print example config if requested
    if args.example_config {
        print_example_config();
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RewriteConfig::default(),
    };

    let engine = RewriteEngine::new(config).context("Invalid rewrite configuration")?;

    if args.validate {
        info!(rules = engine.rules().len(), "Configuration is valid");
        return Ok(());
    }

    let Some(uri) = args.request.as_deref() else {
        bail!("Nothing to do: pass --request <URI>, --validate or --example-config");
    };

    let request = build_request(&args, uri)?;
    let event = engine
        .handle(request)
        .with_context(|| format!("Failed to process request {}", uri))?;

    let report = DryRunReport {
        state: event.state().to_string(),
        status: event.response().status(),
        headers: event.response().headers().to_vec(),
        values: event
            .attributes()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!(stats = ?engine.stats(), "Dry run complete");
    Ok(())
}
