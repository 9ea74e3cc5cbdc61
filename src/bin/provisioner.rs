use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use clap::Parser;
use ec2_alarms::{
    config::{RunConfig, read_config_file},
    orchestrator::{Provisioner, RunReport, RunSummary, Services},
    services::{aws::AwsServices, memory::MemoryCloud},
};
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(about = "Create CloudWatch alarms for EC2 instances")]
struct Args {
    /// Config file (JSON)
    #[arg(short)]
    file: Option<String>,

    /// AWS region
    #[arg(long)]
    region: Option<String>,

    /// Name of the SNS topic alarms notify
    #[arg(long)]
    topic: Option<String>,

    /// Instance to create alarms for (repeatable)
    #[arg(long = "instance-id")]
    instance_ids: Vec<String>,

    /// Select instances carrying this tag
    #[arg(long)]
    tag_name: Option<String>,

    /// Value of the selection tag
    #[arg(long)]
    tag_value: Option<String>,

    /// Prefix of every alarm name
    #[arg(long)]
    prefix: Option<String>,

    /// Key of the provenance tag attached to created alarms
    #[arg(long)]
    tag_key: Option<String>,

    /// Derive alarms but do not create them
    #[arg(long)]
    dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Also write the log to this file
    #[arg(long)]
    log_file: Option<String>,
}

impl Args {
    fn apply(self, mut config: RunConfig) -> RunConfig {
        if let Some(region) = self.region {
            config.region = region;
        }
        if let Some(topic) = self.topic {
            config.topic_name = topic;
        }
        if !self.instance_ids.is_empty() {
            config.instance_ids = self.instance_ids;
        }
        if let Some(name) = self.tag_name {
            config.instance_tag_name = Some(name);
        }
        if let Some(value) = self.tag_value {
            config.instance_tag_value = Some(value);
        }
        if let Some(prefix) = self.prefix {
            config.alarm_prefix = prefix;
        }
        if let Some(tag_key) = self.tag_key {
            config.tag_key = tag_key;
        }
        config
    }
}

fn init(log_file: Option<&str>) -> anyhow::Result<()> {
    let filter = filter::Targets::new().with_target("ec2_alarms", LevelFilter::INFO);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(file_layer)
        .with(filter)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_file.as_deref())?;
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => RunConfig::default(),
    };
    let (dry_run, json) = (args.dry_run, args.json);
    let config = args.apply(config);

    // fail before any client is built
    config.validate()?;

    let aws = Arc::new(AwsServices::connect(&config.region).await);
    let mut services = Services::uniform(aws);
    if dry_run {
        warn!("dry run: alarms are derived but not created");
        services = services.with_monitoring(Arc::new(MemoryCloud::new()));
    }

    let report = match Provisioner::new(config, services).run().await {
        Ok(report) => report,
        Err(e) => {
            error!("error creating alarms: {e}");
            return Err(e.into());
        }
    };

    print_report(&report, dry_run, json)?;
    Ok(())
}

fn print_report(report: &RunReport, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let summary = report.summary();

    if dry_run {
        println!("{}", serde_json::to_string_pretty(&report.alarms)?);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    for failure in &summary.failures {
        error!("{} ({}): {}", failure.subject, failure.stage, failure.error);
    }

    let headline = headline(&summary, dry_run);
    if summary.failures.is_empty() {
        info!("{headline}");
    } else {
        warn!("{headline}");
    }

    Ok(())
}

fn headline(summary: &RunSummary, dry_run: bool) -> String {
    if dry_run {
        format!(
            "{} alarms derived for {} instances (dry run, nothing created)",
            summary.alarms, summary.instances
        )
    } else if summary.failures.is_empty() {
        format!(
            "alarms created successfully: {} alarms for {} instances",
            summary.created, summary.instances
        )
    } else {
        format!(
            "run finished with {} failures: {}/{} alarms created, {} tagged",
            summary.failures.len(),
            summary.created,
            summary.alarms,
            summary.tagged
        )
    }
}
