use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gather_recommender::{
    config::Config,
    db::{self, PgEventStore},
    routes::{create_router, AppState},
    services::{Recommender, RecommenderSettings},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gather_recommender=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url, config.max_connections)?;
    if config.run_migrations {
        db::run_migrations(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let recommender = Recommender::new(
        Arc::new(PgEventStore::new(pool)),
        RecommenderSettings::from(&config),
    );
    tracing::info!(
        single = ?config.single_strategy,
        group = ?config.group_strategy,
        population_sample = config.population_sample_size.get(),
        "Recommender ready"
    );

    let app = create_router(Arc::new(AppState { recommender }));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Server running on http://{}", address);
    axum::serve(listener, app).await?;

    Ok(())
}
