use clap::Parser;
use log::{error, info};
use tcr_server::accounts::AccountStore;
use tcr_server::config::ServerConfig;
use tcr_server::context::ServerContext;
use tcr_server::network::Server;
use tcr_server::specs::SpecStore;

/// Main-method of the application.
/// Parses command-line arguments, loads the spec tables and runs the server
/// until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Hint: set RUST_LOG=info (or debug) to see server logs");
    }
    env_logger::init();

    let config = ServerConfig::parse();

    // Without spec tables there is nothing to play
    let specs = match SpecStore::load(&config.specs_file) {
        Ok(specs) => specs,
        Err(e) => {
            error!("Cannot load specs: {}", e);
            return Err(e.into());
        }
    };
    info!(
        "Loaded {} towers and {} troops from {}",
        specs.towers().len(),
        specs.troops().len(),
        config.specs_file.display()
    );

    let accounts = AccountStore::new(config.users_file.clone());
    let ctx = ServerContext::new(specs, accounts, config.enhanced_settings());
    let server = Server::bind(&config.address(), ctx).await?;

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
