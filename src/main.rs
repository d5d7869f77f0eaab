use std::{process, sync::Arc, time::Instant};

use folio::{
    application::{ContentServices, error::AppError, options::FetchOptions},
    cache::CacheConfig,
    config::{self, Command, PageArgs, Settings, WarmArgs},
    infra::{error::InfraError, github::GitHubSource, markdown::MarkdownCompiler, telemetry},
};
use futures::stream::{self, StreamExt};
use metrics::histogram;
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;
    let services = build_services(&settings)?;

    match cli_args.command {
        Command::Page(args) => run_page(&services, args).await,
        Command::Search(args) => {
            let files = services.search.find(&args.term).await?;
            print_json(&files)
        }
        Command::List(args) => {
            let slugs = services.pages.list_slugs(&args.content_dir).await?;
            print_json(&slugs)
        }
        Command::Warm(args) => run_warm(&services, args).await,
    }
}

fn build_services(settings: &Settings) -> Result<ContentServices, AppError> {
    let source = GitHubSource::new(&settings.source)
        .map_err(|err| InfraError::http(format!("failed to build GitHub client: {err}")))?;
    info!(
        owner = %settings.source.owner,
        repo = %settings.source.repo,
        branch = %settings.source.branch,
        capacity = settings.cache.capacity.get(),
        "content services configured"
    );

    Ok(ContentServices::new(
        &CacheConfig::from(&settings.cache),
        Arc::new(source),
        Arc::new(MarkdownCompiler::new()),
        settings.pages.edit_base_url.clone(),
    ))
}

async fn run_page(services: &ContentServices, args: PageArgs) -> Result<(), AppError> {
    let options = if args.fresh {
        FetchOptions::fresh()
    } else {
        FetchOptions::default()
    };

    match services
        .pages
        .get_page(&args.content_dir, &args.slug, &options)
        .await?
    {
        Some(page) => print_json(page.as_ref()),
        None => Err(AppError::not_found(&args.content_dir, &args.slug)),
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct WarmReport {
    resolved: usize,
    missing: Vec<String>,
    failed: Vec<String>,
}

async fn run_warm(services: &ContentServices, args: WarmArgs) -> Result<(), AppError> {
    let started = Instant::now();
    let slugs = services.pages.list_slugs(&args.content_dir).await?;
    let total = slugs.len();

    let outcomes: Vec<_> = stream::iter(slugs)
        .map(|slug| {
            let pages = services.pages.clone();
            let content_dir = args.content_dir.clone();
            async move {
                let outcome = pages
                    .get_page(&content_dir, &slug, &FetchOptions::default())
                    .await;
                (slug, outcome)
            }
        })
        .buffer_unordered(args.concurrency.max(1))
        .collect()
        .await;

    let mut report = WarmReport::default();
    for (slug, outcome) in outcomes {
        match outcome {
            Ok(Some(_)) => report.resolved += 1,
            Ok(None) => report.missing.push(slug),
            Err(err) => {
                warn!(slug = %slug, error = %err, "failed to warm page");
                report.failed.push(slug);
            }
        }
    }

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    histogram!("folio_warm_ms").record(elapsed_ms);
    info!(
        content_dir = %args.content_dir,
        total,
        resolved = report.resolved,
        missing = report.missing.len(),
        failed = report.failed.len(),
        elapsed_ms,
        "cache warm complete"
    );

    print_json(&report)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to serialise output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
