use dotenvy::dotenv;
use kiosk_server::{cli::handle_command_line_args, config::ServerConfig, server::run_server};
use log::*;

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    if handle_command_line_args() {
        return;
    }
    let config = ServerConfig::from_env_or_default();
    info!("🚀️ Starting kiosk server on {}:{}", config.host, config.port);
    if let Err(e) = run_server(config).await {
        error!("🚀️ The kiosk server stopped. {e}");
        eprintln!("{e}");
        std::process::exit(1);
    }
    info!("🚀️ Kiosk server shut down. Bye!");
}
