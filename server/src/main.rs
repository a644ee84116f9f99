mod config;
mod graphql;
mod http;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use migration::{Migrator, MigratorTrait};
use platform_db::{DbPool, connect, seed_demo_pipeline};
use platform_obs::{ObsConfig, init_tracing};
use products_crm::{
    Board, DealFilter, DealStore, FunnelStore, InMemoryRepository, PipelineRepository,
    SeaOrmRepository,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    http::{AppState, ServeConfig},
};

#[derive(Parser, Debug)]
#[command(name = "pipeline-server", version, about = "Real-estate sales pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP + GraphQL server.
    Serve(ServeCommand),
    /// Run database migrations.
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Insert a demo funnel with stages and deals.
    Seed,
    /// Print the kanban board of a funnel.
    Board(BoardCommand),
    /// Print the GraphQL schema snapshot.
    #[command(name = "schema:print")]
    SchemaPrint {
        #[arg(long, value_name = "FILE", help = "Destination file path")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations.
    Up,
    /// Rollback the most recent migration.
    Down,
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, help = "Allow starting even when migrations are pending")]
    allow_dirty: bool,
}

impl From<&ServeCommand> for ServeConfig {
    fn from(value: &ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[derive(Args, Debug)]
struct BoardCommand {
    #[arg(long, help = "Funnel to show; defaults to the first active funnel")]
    funnel: Option<Uuid>,
    #[arg(long, help = "Only show deals whose name or e-mail contains this text")]
    search: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing(ObsConfig::from_env())?;
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(cmd) => run_server(cmd).await,
        Command::Migrate(action) => match action {
            MigrateCommand::Up => migrate_up().await,
            MigrateCommand::Down => migrate_down().await,
        },
        Command::Seed => run_seed().await,
        Command::Board(cmd) => print_board(cmd).await,
        Command::SchemaPrint { output } => schema_print(output),
    }
}

async fn setup_pool(config: &AppConfig) -> Result<DbPool> {
    connect(&config.database)
        .await
        .context("failed to connect to the database")
}

async fn run_server(cmd: ServeCommand) -> Result<()> {
    let config = Arc::new(AppConfig::load()?);
    let pool = Arc::new(setup_pool(&config).await?);
    ensure_migrations(&pool, cmd.allow_dirty).await?;
    let repo: Arc<dyn PipelineRepository> = Arc::new(SeaOrmRepository::new(pool.clone()));
    let state = AppState {
        schema: graphql::build_schema(repo),
        pool,
        config,
    };
    http::serve((&cmd).into(), state).await
}

async fn ensure_migrations(pool: &DbPool, allow_dirty: bool) -> Result<()> {
    let pending = Migrator::get_pending_migrations(pool).await?;
    if !pending.is_empty() && !allow_dirty {
        anyhow::bail!(
            "pending migrations detected; run `cargo run -p server -- migrate up` or pass --allow-dirty"
        );
    }
    Ok(())
}

async fn migrate_up() -> Result<()> {
    let pool = setup_pool(&AppConfig::load()?).await?;
    Migrator::up(&pool, None).await?;
    info!("database migrations applied");
    Ok(())
}

async fn migrate_down() -> Result<()> {
    let pool = setup_pool(&AppConfig::load()?).await?;
    Migrator::down(&pool, Some(1)).await?;
    info!("most recent migration rolled back");
    Ok(())
}

async fn run_seed() -> Result<()> {
    let pool = setup_pool(&AppConfig::load()?).await?;
    ensure_migrations(&pool, false).await?;
    let seeded = seed_demo_pipeline(&pool).await?;
    println!("seeded funnel {}", seeded.funnel_id);
    Ok(())
}

async fn print_board(cmd: BoardCommand) -> Result<()> {
    let pool = Arc::new(setup_pool(&AppConfig::load()?).await?);
    ensure_migrations(&pool, false).await?;
    let repo: Arc<dyn PipelineRepository> = Arc::new(SeaOrmRepository::new(pool));
    let funnels = FunnelStore::new(repo.clone());
    let deals = DealStore::new(repo, &funnels);
    let mut board = Board::new(funnels, deals);
    board.load().await?;
    if let Some(funnel_id) = cmd.funnel {
        board.switch_funnel(funnel_id).await?;
    }
    board.set_filter(DealFilter {
        search: cmd.search,
        ..DealFilter::default()
    });
    print!("{}", board.render());
    Ok(())
}

fn schema_print(path: Option<PathBuf>) -> Result<()> {
    let target = path.unwrap_or_else(|| PathBuf::from("schema.graphql"));
    // The SDL does not depend on the backing store.
    let repo: Arc<dyn PipelineRepository> = Arc::new(InMemoryRepository::new());
    let sdl = graphql::build_schema(repo).sdl();
    std::fs::write(&target, sdl)
        .map_err(|err| anyhow!("failed to write {}: {err}", target.display()))?;
    info!(path = %target.display(), "GraphQL schema written");
    Ok(())
}
