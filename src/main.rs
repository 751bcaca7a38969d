use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use order_escrow_rs::models::{token_identifier, BlockEvent};
use order_escrow_rs::service::datum_info;
use order_escrow_rs::{Config, OrderContext, OrderMirror, OrderService, Reconciler};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct ContextInfo {
    network: String,
    script_address: String,
    policy_id: String,
    control_token: String,
    burn_address: String,
}

fn print_usage(bin: &str) {
    eprintln!("Usage:");
    eprintln!("  {} [--config <file.toml>] <command> [args]", bin);
    eprintln!();
    eprintln!("  info                 → script address, policy id and control token unit");
    eprintln!("  datum <cbor-hex>     → decode an order datum");
    eprintln!("  reload               → full rescan of the script address, print open orders");
    eprintln!("  replay <events.json> → feed recorded blocks through the reconciler");
    eprintln!("  deploy <address>     → build the reference-script deploy transaction");
    eprintln!();
    eprintln!("  Settings come from the config file and ESCROW_* environment variables.");
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let raw_args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut positional = Vec::new();
    let mut i = 1;
    while i < raw_args.len() {
        if raw_args[i] == "--config" {
            i += 1;
            config_path = Some(
                raw_args
                    .get(i)
                    .cloned()
                    .ok_or_else(|| anyhow!("--config needs a path"))?,
            );
        } else {
            positional.push(raw_args[i].clone());
        }
        i += 1;
    }

    let Some(command) = positional.first().cloned() else {
        print_usage(&raw_args[0]);
        return Ok(());
    };
    let config = match &config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    match command.as_str() {
        "info" => {
            let ctx = OrderContext::from_config(&config)?;
            print_json(&ContextInfo {
                network: format!("{:?}", ctx.network).to_lowercase(),
                script_address: ctx.script_address.clone(),
                policy_id: ctx.policy_id.clone(),
                control_token: ctx.control_token.identifier(""),
                burn_address: ctx.burn_address.clone(),
            })?;
        }
        "datum" => {
            let cbor = positional.get(1).ok_or_else(|| anyhow!("datum needs a CBOR hex argument"))?;
            let ctx = OrderContext::from_config(&config)?;
            let info = datum_info(&ctx, cbor)?;
            println!(
                "{} requests {} of {}",
                info.sender_address,
                info.requested_amount,
                token_identifier(&info.requested_asset)
            );
            print_json(&info)?;
        }
        "reload" => {
            let service = OrderService::bootstrap(&config).await?;
            let report = service.reload().await?;
            eprintln!(
                "found {} orders ({} new, {} reopened, {} retired)",
                report.found, report.inserted, report.reopened, report.retired
            );
            print_json(&service.list_open_orders())?;
            if let Some(path) = &config.snapshot_path {
                service.mirror().save(path)?;
            }
        }
        "replay" => {
            let path = positional.get(1).ok_or_else(|| anyhow!("replay needs an events file"))?;
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
            let blocks: Vec<BlockEvent> =
                serde_json::from_str(&text).with_context(|| format!("parsing {}", path))?;

            let ctx = Arc::new(OrderContext::from_config(&config)?);
            let mirror = Arc::new(match &config.snapshot_path {
                Some(p) if std::path::Path::new(p).exists() => OrderMirror::load(p)?,
                _ => OrderMirror::new(),
            });
            let reconciler = Reconciler::new(ctx, mirror.clone(), config.pending_close_budget);
            let report = reconciler.replay(&blocks);
            eprintln!(
                "{} blocks: {} opened, {} closed, {} parked, {} dropped",
                blocks.len(),
                report.opened,
                report.closed,
                report.parked,
                report.dropped
            );
            print_json(&mirror.list_all())?;
            if let Some(p) = &config.snapshot_path {
                mirror.save(p)?;
            }
        }
        "deploy" => {
            let address = positional.get(1).ok_or_else(|| anyhow!("deploy needs a wallet address"))?;
            let service = OrderService::bootstrap(&config).await?;
            let deploy = service.build_deploy(address).await?;
            eprintln!(
                "policy id {} | order address {} | reference {}",
                deploy.policy_id, deploy.order_address, deploy.reference
            );
            println!("{}", deploy.built.cbor_hex()?);
        }
        other => {
            eprintln!("Unknown command: '{}'", other);
            print_usage(&raw_args[0]);
            std::process::exit(1);
        }
    }

    Ok(())
}
