use actix_web::{web, App, HttpServer};
use clap::Parser;
use dotenv::dotenv;
use relay_server::{routes, AppError, AppState, Hub, Settings};
use std::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "relay-server")]
#[command(about = "Websocket broadcast relay")]
#[command(version)]
struct Cli {
    /// http service address (host:port)
    #[arg(long)]
    addr: Option<String>,
}

#[actix_web::main]
async fn main() -> relay_server::Result<()> {
    dotenv().ok();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    let cli = Cli::parse();

    let mut config = Settings::new()?;
    if let Some(addr) = cli.addr.as_deref() {
        config.override_addr(addr)?;
    }
    info!("Configuration loaded successfully");

    // One hub for the life of the process; every session gets a handle to it.
    let (hub, hub_handle) = Hub::new(&config.hub);
    actix_rt::spawn(hub.run());

    let addr = config.listen_addr();
    let workers = config.server.workers as usize;
    let state = web::Data::new(AppState::new(&config, hub_handle)?);

    let listener = TcpListener::bind(&addr).map_err(|e| {
        error!("ListenAndServe: {}", e);
        AppError::BindError { addr: addr.clone(), reason: e.to_string() }
    })?;

    info!("Relay listening on http://{} (websocket at ws://{}/ws)", addr, addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(routes)
    })
    .listen(listener)?
    .workers(workers)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(())
}
