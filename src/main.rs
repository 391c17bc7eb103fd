use std::{process, sync::Arc};

use quill::{
    application::{auth::AuthService, error::AppError},
    config::{self, CreateUserArgs, Settings},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpSettings, HttpState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::CreateUser(args) => run_create_user(settings, args).await,
    }
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = HttpState {
        store: repositories.clone(),
        auth: Arc::new(auth_service(&repositories, &settings)),
        health: repositories,
        settings: Arc::new(HttpSettings::from_settings(&settings)),
    };

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(settings.server.addr, err)))?;
    info!(addr = %settings.server.addr, "listening");

    axum::serve(listener, http::build_router(state).into_make_service())
        .await
        .map_err(|err| AppError::from(InfraError::Serve(err)))
}

async fn run_create_user(settings: Settings, args: CreateUserArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let auth = auth_service(&repositories, &settings);

    let user = auth.register(&args.username, &args.password).await?;
    info!(user_id = %user.id, username = %user.username, "user created");
    Ok(())
}

fn auth_service(repositories: &Arc<PostgresRepositories>, settings: &Settings) -> AuthService {
    AuthService::new(
        repositories.clone(),
        repositories.clone(),
        settings.auth.session_ttl,
    )
}

async fn init_repositories(settings: &Settings) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::Connect(err)))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::Migrate(err)))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}
