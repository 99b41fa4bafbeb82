use anyhow::Result;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lusia_quiz::{
    api::{create_router, AppState},
    config::{Config, LoggingConfig},
    log_system_event, AssignmentService, Database, QuestionService,
};

const LOG_FILE_NAME: &str = "lusia-quiz.log";

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _guard = setup_logging(&config.logging)?;
    config.validate()?;

    log_system_event!(startup, component = "server", "Starting LUSIA quiz server");

    // Initialize database
    let db = Database::new(&config.database.url).await?;
    info!("Database initialized successfully");

    // Initialize services
    let question_service = QuestionService::new(db.clone());
    let assignment_service = AssignmentService::new(db, question_service.clone());

    let state = AppState {
        question_service,
        assignment_service,
    };

    let app = Router::new()
        .merge(create_router(state))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = config.server.address();
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Console and daily-rotated file output, each optional. The returned guard
/// flushes the file writer when dropped.
fn setup_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use std::fs;
    use tracing_subscriber::fmt;

    let env_filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = logging.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
    });

    let (file_layer, guard) = if logging.file_enabled {
        fs::create_dir_all(&logging.log_directory).unwrap_or_else(|e| {
            eprintln!("Warning: Could not create logs directory: {}", e);
        });

        let file_appender = tracing_appender::rolling::daily(&logging.log_directory, LOG_FILE_NAME);
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

        // No ANSI colors in files
        let layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(non_blocking_file);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if logging.file_enabled {
        info!(
            "Logging initialized - writing to {}/{} with daily rotation",
            logging.log_directory, LOG_FILE_NAME
        );
    }

    Ok(guard)
}
