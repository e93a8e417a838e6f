pub mod cli;

use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells::Bash};
use log::error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use manykey::keys::{self, KeyName};
use manykey::ops::DeviceList;
use manykey::port;
use manykey::{DeviceProfile, Dispatcher, Outcome, SwitchTable, SystemPorts};

use cli::{Cli, Commands};

enum OutputFormat {
    Plain,
    Json,
}

fn profile_to_json(profile: &DeviceProfile) -> json::JsonValue {
    let mut obj = json::JsonValue::new_object();
    obj["switch_count"] = profile.switch_count.into();
    obj["max_keys"] = profile.max_keys.into();
    obj
}

fn devices_to_string(devices: &DeviceList, fmt: &OutputFormat) -> String {
    match fmt {
        OutputFormat::Plain => devices
            .entries()
            .iter()
            .map(|entry| entry.label.clone())
            .collect::<Vec<String>>()
            .join("\n"),
        OutputFormat::Json => {
            let mut obj = json::JsonValue::new_object();
            for entry in devices.entries() {
                obj[entry.label.as_str()] = entry.path.as_str().into();
            }
            json::stringify(obj)
        }
    }
}

fn table_to_string(table: &SwitchTable, fmt: &OutputFormat) -> String {
    match fmt {
        OutputFormat::Plain => table.to_text(),
        OutputFormat::Json => json::stringify(table.lines()),
    }
}

fn outcome_to_string(outcome: &Outcome, fmt: &OutputFormat) -> String {
    match outcome {
        Outcome::Devices(devices) => devices_to_string(devices, fmt),
        Outcome::Profile { profile, .. } => match fmt {
            OutputFormat::Plain => profile.to_string(),
            OutputFormat::Json => json::stringify(profile_to_json(profile)),
        },
        Outcome::Table { table, .. } | Outcome::Written { table, .. } => {
            table_to_string(table, fmt)
        }
        Outcome::Inspected { profile, table, .. } => match fmt {
            OutputFormat::Plain => format!("{}\n{}", profile, table),
            OutputFormat::Json => {
                let mut obj = profile_to_json(profile);
                obj["switches"] = table.lines().into();
                json::stringify(obj)
            }
        },
        Outcome::Failed { .. } => outcome.status_message(),
    }
}

fn cmd_keys(fmt: OutputFormat) -> String {
    match fmt {
        OutputFormat::Plain => KeyName::ALL
            .iter()
            .map(|&name| format!("0x{:02X} {}", keys::name_to_code(name), name))
            .collect::<Vec<String>>()
            .join("\n"),
        OutputFormat::Json => {
            let mut obj = json::JsonValue::new_object();
            for name in KeyName::ALL {
                obj[name.as_str()] = keys::name_to_code(name).into();
            }
            json::stringify(obj)
        }
    }
}

async fn finish(job: JoinHandle<()>, outcomes: &mut UnboundedReceiver<Outcome>) -> Result<Outcome> {
    job.await?;
    let outcome = outcomes
        .recv()
        .await
        .ok_or_else(|| anyhow!("operation ended without an outcome (this is a bug!)"))?;

    if let Outcome::Failed { message, .. } = &outcome {
        return Err(anyhow!("{}: {}", outcome.status_message(), message));
    }
    Ok(outcome)
}

async fn query_profile(
    dispatcher: &Dispatcher,
    outcomes: &mut UnboundedReceiver<Outcome>,
    handle: &str,
) -> Result<DeviceProfile> {
    match finish(dispatcher.query_device(handle), outcomes).await? {
        Outcome::Profile { profile, .. } => Ok(profile),
        other => Err(anyhow!("unexpected outcome {:?}", other)),
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read key table from stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read key table from {}", input))
    }
}

async fn do_main() -> Result<String> {
    if std::env::var("GENERATE_COMPLETION").is_ok() {
        generate(
            Bash,
            &mut cli::Cli::command(),
            "manykey-tool",
            &mut io::stdout(),
        );

        return Ok(String::default());
    }

    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.debug {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp(None)
    .format_target(false)
    .init();

    let fmt = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Plain
    };

    let provider = Arc::new(SystemPorts::new(cli.session_config()));
    let (dispatcher, mut outcomes) = Dispatcher::new(provider, Handle::current());

    let outcome = match cli.command {
        Commands::Keys => return Ok(cmd_keys(fmt)),
        Commands::List => finish(dispatcher.enumerate_devices(), &mut outcomes).await?,
        _ => {
            let handle = port::resolve_port_name(&cli.port)?;

            match cli.command {
                Commands::Query => finish(dispatcher.query_device(&handle), &mut outcomes).await?,
                Commands::Read { switches } => {
                    let switch_count = match switches {
                        Some(n) => n,
                        None => {
                            query_profile(&dispatcher, &mut outcomes, &handle)
                                .await?
                                .switch_count
                        }
                    };
                    finish(
                        dispatcher.read_switch_table(&handle, switch_count),
                        &mut outcomes,
                    )
                    .await?
                }
                Commands::Write { input } => {
                    let text = read_input(&input)?;
                    let profile = query_profile(&dispatcher, &mut outcomes, &handle).await?;
                    finish(
                        dispatcher.write_switch_table(
                            &handle,
                            &text,
                            profile.switch_count,
                            profile.max_keys,
                        ),
                        &mut outcomes,
                    )
                    .await?
                }
                Commands::Show => {
                    finish(dispatcher.inspect_device(&handle), &mut outcomes).await?
                }
                _ => return Err(anyhow!("unexpected command (this is a bug!)")),
            }
        }
    };

    Ok(outcome_to_string(&outcome, &fmt))
}

#[tokio::main]
async fn main() {
    match do_main().await {
        Ok(s) => println!("{}", s),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
