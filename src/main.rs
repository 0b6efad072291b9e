use campus_vote::AppContext;
use campus_vote::config::Config;
use campus_vote::notify::notifier_from_config;
use campus_vote::store::MemoryStore;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    campus_vote::init_with(&config.logging)?;

    let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse()?;

    let notifier = notifier_from_config(&config.mail)?;
    let app = Arc::new(AppContext::new(config, Arc::new(MemoryStore::new()), notifier)?);

    campus_vote::http::serve(app, addr).await?;
    Ok(())
}
