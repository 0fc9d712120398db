//! ember-server — the server binary.
//!
//! Reads a JSON configuration (first argument, default `ember.json`),
//! loads the RSA keypair, and runs the three services until one of them
//! fails. Logging: `RUST_LOG=ember_server=debug cargo run -p ember-server`.

use std::sync::Arc;

use tokio::net::{TcpListener, UdpSocket};
use tracing::info;

use ember_server::auth::AuthService;
use ember_server::config::ServerConfig;
use ember_server::game::state::SharedState;
use ember_server::game::{GameService, TokenRegistry};
use ember_server::login::LoginService;
use ember_server::store::NullStore;
use ember_server::title;

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        // SAFETY: single-threaded at this point, no other threads reading env
        unsafe { std::env::set_var("RUST_LOG", "ember_server=info"); }
    }
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("✗ {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "ember.json".into());
    let config = Arc::new(ServerConfig::load(&config_path)?);

    let private_key = ember_crypto::load_private_key_pem(&config.server_private_key)?;
    info!(
        fingerprint = %private_key.public_key().fingerprint(),
        "server keypair loaded"
    );

    let registry = Arc::new(TokenRegistry::new());
    let shared = Arc::new(SharedState::new(config.clone(), Arc::new(NullStore)));
    let dispatcher = Arc::new(title::dispatcher());

    let host = config.server_hostname.as_str();
    let login_listener = TcpListener::bind((host, config.login_port)).await?;
    let auth_listener = TcpListener::bind((host, config.auth_port)).await?;
    let game_socket = UdpSocket::bind((host, config.game_port)).await?;

    let login = Arc::new(LoginService::new(config.clone(), private_key.clone()));
    let auth = Arc::new(AuthService::new(config.clone(), private_key, registry.clone()));
    let game = Arc::new(GameService::new(config.clone(), registry, shared, dispatcher));

    tokio::try_join!(
        login.serve(login_listener),
        auth.serve(auth_listener),
        game.serve(game_socket),
    )?;
    Ok(())
}
