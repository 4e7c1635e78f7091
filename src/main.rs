//! iohid-watch
//!
//! Prints HID devices as they attach and detach, filtered by matching
//! criteria from flags, JSON or a TOML config file.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use iohid::bindings::{
    self, CLOSE, OPEN, SET_CLOSE_CALLBACK, SET_DEVICE_MATCHING_CALLBACK,
    SET_DEVICE_MATCHING_CRITERIA, SET_DEVICE_REMOVAL_CALLBACK,
};
use iohid::native::HidApiBackend;
use iohid::{HostContext, HostFunction, HostValue, WatchConfig};

mod cli;
use cli::{Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("iohid={level}").parse()?)
                .add_directive(format!("iohid_native={level}").parse()?),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            WatchConfig::load(path)?
        }
        None => WatchConfig::default(),
    };
    let criteria = cli.criteria(&config)?;
    let backend = HidApiBackend::new(config.hidapi_config(cli.poll_ms));

    match cli.command.unwrap_or(Commands::Watch) {
        Commands::List => list(&backend, &criteria, cli.json),
        Commands::Watch => watch(&backend, criteria, cli.json).await,
    }
}

fn list(backend: &HidApiBackend, criteria: &HostValue, json: bool) -> Result<()> {
    let devices = iohid::list_devices(backend, criteria)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No matching HID devices");
    }
    for d in &devices {
        println!(
            "{:04X}:{:04X}  usage {:04X}:{:04X}  {:<10} {} ({})",
            d.vendor_id,
            d.product_id,
            d.primary_usage_page,
            d.primary_usage,
            d.transport.as_deref().unwrap_or("-"),
            d.product.as_deref().unwrap_or("Unknown"),
            d.path
        );
    }
    Ok(())
}

async fn watch(backend: &HidApiBackend, criteria: HostValue, json: bool) -> Result<()> {
    let mut ctx = HostContext::new();
    let mut manager = bindings::create_manager(backend, &ctx, &[])?;

    bindings::invoke(&mut manager, SET_DEVICE_MATCHING_CRITERIA, &[criteria])?;
    bindings::invoke(
        &mut manager,
        SET_DEVICE_MATCHING_CALLBACK,
        &[HostFunction::new(move |args| print_event("attached", args, json)).into()],
    )?;
    bindings::invoke(
        &mut manager,
        SET_DEVICE_REMOVAL_CALLBACK,
        &[HostFunction::new(move |args| print_event("removed", args, json)).into()],
    )?;
    bindings::invoke(
        &mut manager,
        SET_CLOSE_CALLBACK,
        &[HostFunction::new(|_| info!("Event loop closed")).into()],
    )?;
    bindings::invoke(&mut manager, OPEN, &[])?;
    info!("Watching for HID devices (Ctrl-C to stop)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res?;
                info!("Interrupted");
                break;
            }
            dispatched = ctx.dispatch_next() => {
                if dispatched.is_none() {
                    break;
                }
            }
        }
    }

    bindings::invoke(&mut manager, CLOSE, &[])?;
    ctx.run_pending();
    Ok(())
}

fn print_event(label: &str, args: &[HostValue], json: bool) {
    let Some(event) = args.first() else {
        return;
    };
    if json {
        let line = serde_json::json!({ "event": label, "device": serde_json::Value::from(event) });
        println!("{line}");
        return;
    }

    let props = event
        .as_object()
        .and_then(|e| e.get("properties"))
        .and_then(HostValue::as_object);
    let int = |key: &str| {
        props
            .and_then(|p| p.get(key))
            .and_then(HostValue::as_f64)
            .unwrap_or(0.0) as u32
    };
    let text = |key: &str| {
        props
            .and_then(|p| p.get(key))
            .and_then(HostValue::as_str)
            .unwrap_or("Unknown")
            .to_owned()
    };
    println!(
        "{:<8} {:04X}:{:04X} {} [{}]",
        label,
        int("VendorID"),
        int("ProductID"),
        text("Product"),
        text("Transport")
    );
}
