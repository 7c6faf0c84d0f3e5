mod cli;
mod output;

use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use cli::{Cli, Command, ImageArgs, ManifestArgs};
use output::{
    print_batch, print_manifest, print_notification, print_summary, print_tags, print_verdict,
};
use tagwatch::classifier::update_available;
use tagwatch::config::Config;
use tagwatch::models::{ContainerImage, ContainerReport, ImageDigest, ImageTag};
use tagwatch::tag::parse_semver;
use tagwatch::watch::find_new_version;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json().with_writer(std::io::stderr))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    match cli.command {
        Command::Tags(args) => run_tags(&config, &args).await,
        Command::Manifest(args) => run_manifest(&config, &args).await,
        Command::Check => run_check(&config).await,
    }
}

fn ad_hoc_image(
    config: &Config,
    args: &ImageArgs,
    tag: &str,
    arch: &str,
    os: &str,
    variant: Option<&str>,
) -> Result<ContainerImage> {
    Ok(ContainerImage {
        registry: config.registry_ref(&args.registry)?,
        name: args.image.clone(),
        tag: ImageTag {
            value: tag.to_string(),
            semver: parse_semver(tag).is_some(),
        },
        digest: ImageDigest::default(),
        architecture: arch.to_string(),
        os: os.to_string(),
        variant: variant.map(str::to_string),
        created: None,
    })
}

async fn run_tags(config: &Config, args: &ImageArgs) -> Result<()> {
    let client = config.client_for(&args.registry)?;
    let image = ad_hoc_image(config, args, "latest", "amd64", "linux", None)?;

    let tags = client
        .list_tags(&image)
        .await
        .with_context(|| format!("Failed to list tags for {}", args.image))?;
    print_tags(&args.image, &tags);
    Ok(())
}

async fn run_manifest(config: &Config, args: &ManifestArgs) -> Result<()> {
    let client = config.client_for(&args.image.registry)?;
    let image = ad_hoc_image(
        config,
        &args.image,
        &args.tag,
        &args.arch,
        &args.os,
        args.variant.as_deref(),
    )?;

    let reference = args.reference.as_deref().unwrap_or(&args.tag);
    let descriptor = client
        .resolve_manifest(&image, args.reference.as_deref())
        .await
        .with_context(|| format!("Failed to resolve {}:{}", args.image.image, reference))?;
    print_manifest(&args.image.image, reference, &descriptor);
    Ok(())
}

async fn run_check(config: &Config) -> Result<()> {
    let containers = config.containers()?;
    let triggers = config.triggers();

    if containers.is_empty() {
        println!("No containers configured.");
        return Ok(());
    }

    let mut reports: Vec<ContainerReport> = Vec::new();
    let mut total_errors: usize = 0;

    println!("\nContainers:");
    for container in &containers {
        debug!(container = %container.name, image = %container.image.name, "checking");

        let client = config.client_for(&container.image.registry.name)?;
        let outcome = match find_new_version(&client, container).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(container = %container.name, error = %e, "watch failed");
                total_errors += 1;
                continue;
            }
        };

        let updated = outcome.apply(container);
        let changed = updated.result_changed(Some(container));
        print_verdict(&updated);
        reports.push(ContainerReport {
            container: updated,
            changed,
        });
    }

    let mut notifications: usize = 0;
    for trigger in &triggers {
        for report in &reports {
            if trigger.should_notify(report) {
                print_notification(
                    trigger,
                    &trigger.render_simple_title(&report.container),
                    &trigger.render_simple_body(&report.container),
                );
                notifications += 1;
            }
        }

        let batch = trigger.select_batch(&reports);
        if !batch.is_empty() {
            print_batch(trigger, &trigger.render_batch_title(&batch), &batch);
            notifications += 1;
        }
    }

    let available = reports
        .iter()
        .filter(|r| update_available(&r.container))
        .count();
    print_summary(reports.len(), available, notifications, total_errors);

    if total_errors > 0 {
        process::exit(1);
    }

    Ok(())
}
