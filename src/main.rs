use tracing::error;
use tracing_subscriber::EnvFilter;

use redstream::server::RedisServer;

/// Entry point: parse the command line, set up logging and run the server.
///
/// The log filter honours `RUST_LOG` and defaults to `info`.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server = match RedisServer::new(std::env::args()) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "failed to parse command line");
            std::process::exit(1);
        }
    };

    server.run().await;
}
