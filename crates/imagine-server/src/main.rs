use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use imagine_server::build_app;
use imagine_server::config::{Device, ServerConfig};
use imagine_server::pipeline::ProceduralFactory;
use imagine_server::state::AppState;

/// SD image generator server
#[derive(Parser, Debug)]
#[command(name = "imagine-server", version)]
struct Args {
    /// Server host address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// SD models path (literal; a leading ~ is not expanded)
    #[arg(short, long, default_value = "models")]
    models: PathBuf,

    /// Model compute device
    #[arg(short, long, value_enum, default_value_t = Device::Cpu)]
    device: Device,

    /// Use full (float32) floating point precision instead of float16
    #[arg(short, long)]
    full_prec: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        models_dir: args.models,
        device: args.device,
        full_precision: args.full_prec,
    };

    let factory = Arc::new(ProceduralFactory::new(config.device, config.full_precision));
    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config, factory));
    let app = build_app(state);

    log::info!("Starting server on http://{addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
