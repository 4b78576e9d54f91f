mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands, SendArgs};
use notifybox::attachment::{Attachment, FileAttachment};
use notifybox::config::{Settings, TelemetryConfig};
use notifybox::dispatch::{
    DispatchExecutor, DispatchReport, DispatchSet, SkipReason, TagExpression,
};
use notifybox::handlers::{self, HandlerRegistry, NotifyRequest};
use notifybox::observability::init_tracing;
use tokio::io::AsyncReadExt;
use tracing::{error, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const EXIT_FAILED: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_NO_MATCH: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::load_from_path(path.clone()),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            init_tracing(&TelemetryConfig::default().log_filter);
            error!(error = %e, "Failed to load settings");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    init_tracing(&settings.telemetry.log_filter);

    let registry = match handlers::install_builtins() {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "Failed to register built-in handlers");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match cli.command {
        Commands::Send(args) => send(registry, &settings, args).await,
        Commands::Services { json } => services(&registry, json),
    }
}

async fn send(registry: Arc<HandlerRegistry>, settings: &Settings, args: SendArgs) -> ExitCode {
    let mut options = settings.dispatch_options();
    options.dry_run = args.dry_run;

    let mut set = DispatchSet::new(registry)
        .with_overrides(settings.handler_overrides())
        .with_executor(DispatchExecutor::new(options));

    let mut rejected = 0;
    for entry in settings.url_entries() {
        if let Err(e) = set.add(&entry.url, entry.tags) {
            warn!(entry = entry.line, error = %e, "Skipping settings URL");
            rejected += 1;
        }
    }
    for path in &args.configs {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => rejected += set.load_text(&content).errors.len(),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read configuration");
                return ExitCode::from(EXIT_CONFIG);
            }
        }
    }
    let report = set.extend(&args.urls);
    for failure in &report.errors {
        error!(error = %failure, "Rejected URL");
    }
    rejected += report.errors.len();

    if set.is_empty() {
        error!(rejected, "No usable notification URLs");
        return ExitCode::from(EXIT_CONFIG);
    }

    let request = match build_request(&args).await {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Failed to build notification");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let tags: TagExpression = args.tags.join(" | ").parse().unwrap_or_default();
    let report = set.notify(&request, &tags).await;

    if args.json {
        match serde_json::to_string_pretty(report.outcomes()) {
            Ok(json) => println!("{json}"),
            Err(e) => error!(error = %e, "Failed to serialize outcomes"),
        }
    } else {
        println!("{report}");
    }

    exit_code(&report)
}

async fn build_request(args: &SendArgs) -> Result<NotifyRequest, BoxError> {
    let body = match &args.body {
        Some(body) => body.clone(),
        None => {
            let mut body = String::new();
            tokio::io::stdin().read_to_string(&mut body).await?;
            body
        }
    };

    let mut attachments: Vec<Arc<dyn Attachment>> = Vec::with_capacity(args.attachments.len());
    for path in &args.attachments {
        attachments.push(Arc::new(FileAttachment::open(path.clone()).await?));
    }

    Ok(NotifyRequest::builder()
        .body(body)
        .title(args.title.clone())
        .notify_type(args.notify_type)
        .format(args.format)
        .attachments(attachments)
        .build())
}

/// 0 when every selected handler delivered, 3 when the tags matched
/// nothing.
fn exit_code(report: &DispatchReport) -> ExitCode {
    let matched = report.outcomes().iter().any(|outcome| {
        !matches!(
            outcome.skip_reason,
            Some(SkipReason::TagMismatch | SkipReason::Disabled)
        )
    });

    if !matched {
        ExitCode::from(EXIT_NO_MATCH)
    } else if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    }
}

fn services(registry: &HandlerRegistry, json: bool) -> ExitCode {
    if json {
        let services: Vec<_> = registry
            .all()
            .iter()
            .map(|descriptor| {
                let caps = &descriptor.capabilities;
                serde_json::json!({
                    "service": descriptor.service_name,
                    "url": descriptor.service_url,
                    "schemes": descriptor.schemes,
                    "secure_schemes": descriptor.secure_schemes,
                    "max_body_length": caps.max_body_length,
                    "title_maxlen": caps.title_maxlen,
                    "body_formats": caps.body_formats,
                    "attachments": caps.attachment_support,
                })
            })
            .collect();
        match serde_json::to_string_pretty(&services) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!(error = %e, "Failed to serialize services");
                return ExitCode::from(EXIT_FAILED);
            }
        }
        return ExitCode::SUCCESS;
    }

    for descriptor in registry.all() {
        let caps = &descriptor.capabilities;
        let schemes: Vec<_> = descriptor.all_schemes().collect();
        let formats: Vec<_> = caps.body_formats.iter().map(|f| f.as_str()).collect();
        println!(
            "{:<12} {:<24} body={} title={} formats={} attachments={}",
            descriptor.service_name,
            schemes.join(","),
            caps.max_body_length,
            caps.title_maxlen,
            formats.join(","),
            if caps.attachment_support { "yes" } else { "no" },
        );
    }
    ExitCode::SUCCESS
}
