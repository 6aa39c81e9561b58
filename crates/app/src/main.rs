mod cli;
mod db;
mod render;

use chrono::Duration;
use clap::Parser;

use progress_core::filter::FilterSet;
use progress_core::model::OverviewSettings;
use progress_core::sql::{Initials, PageRequest, SortDirection, SortOrder};
use services::{AppServices, Clock, OverviewRequest, OverviewService, Viewer, seed_demo_course};

use cli::{Cli, Commands, ENV_LOG, SeedArgs, ShowArgs};

fn init_logging() {
    let filter = std::env::var(ENV_LOG)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "warn,storage=info,services=info".to_owned());

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_env_filter(filter)
        .init();
}

fn settings_from(cli: &Cli) -> OverviewSettings {
    OverviewSettings {
        show_inactive: cli.show_inactive,
        refresh: cli.refresh,
        stale_after: Duration::minutes(i64::from(cli.stale_after_mins)),
        ..OverviewSettings::default()
    }
}

async fn show(app: &AppServices, args: ShowArgs) -> Result<(), Box<dyn std::error::Error>> {
    let overview = app.overview();
    let viewer = Viewer::new(args.viewer, !args.own_groups);

    if args.options {
        let types = overview.filter_options(args.course, &viewer).await?;
        print!("{}", render::filter_options(&types));
        return Ok(());
    }

    let filters = match args.filters.as_deref() {
        Some(raw) => FilterSet::from_json(raw)?,
        None => OverviewService::default_filterset(args.course, args.block),
    };
    let direction = if args.desc {
        SortDirection::Desc
    } else {
        SortDirection::Asc
    };
    let request = OverviewRequest::new(filters)
        .with_sort(SortOrder::new(args.sort, direction))
        .with_page(PageRequest::new(args.page, args.per_page))
        .with_initials(Initials {
            first: args.first,
            last: args.last,
        });

    let page = overview.load_page(&request, &viewer).await?;
    if args.json {
        println!("{}", page.to_json()?);
    } else {
        print!(
            "{}",
            render::page_table(&page, overview.settings().show_last_access)
        );
    }
    Ok(())
}

async fn seed(app: &AppServices, args: SeedArgs) -> Result<(), Box<dyn std::error::Error>> {
    let demo = seed_demo_course(app.repository(), app.clock(), args.context).await?;
    println!(
        "Seeded course {} with block {} and {} learners.",
        demo.course_id, demo.block_instance_id, demo.learners
    );
    println!(
        "Try: overview show --course {} --block {}",
        demo.course_id, demo.block_instance_id
    );
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging();

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    let db_url = db::normalize_sqlite_url(&cli.db)?;
    db::prepare_sqlite_file(&db_url)?;
    tracing::debug!(db = %db_url, refresh = %cli.refresh, "opening overview database");
    let app = AppServices::new_sqlite(&db_url, Clock::default(), settings_from(&cli)).await?;

    match cli.command {
        Commands::Show(args) => show(&app, args).await,
        Commands::Seed(args) => seed(&app, args).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
