use std::{net::SocketAddr, sync::Arc};
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hakayat::{
    config::Config,
    services::{JsonFileStorage, MemoryStorage, Storage},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Hakayat service...");

    // 选择存储后端
    let storage: Arc<dyn Storage> = if config.uses_memory_storage() {
        warn!("Using in-memory storage; data will be lost on restart");
        Arc::new(MemoryStorage::new())
    } else {
        Arc::new(JsonFileStorage::open(&config.data_dir)?)
    };

    let app_state = Arc::new(AppState::new(config.clone(), storage)?);
    if app_state.is_production() && config.session_secret == Config::default().session_secret {
        warn!("SESSION_SECRET is set to the development default in production");
    }
    if !app_state.generator.is_configured() {
        warn!("GEMINI_API_KEY is not set; story generation will answer 503");
    }
    if config.trust_proxy_headers {
        info!("Client IPs are read from X-Forwarded-For / X-Real-IP");
    }

    // 启动后台任务
    start_background_tasks(app_state.clone()).await;

    let app = hakayat::app(app_state);

    // 启动主服务器
    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!("Starting server on http://{}", addr);

    axum::Server::bind(&addr.parse()?)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}

async fn start_background_tasks(app_state: Arc<AppState>) {
    info!("Starting background tasks...");

    // 清理过期会话任务
    let session_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;
            if let Err(e) = session_state.store.prune_expired_sessions() {
                error!("Failed to prune expired sessions: {}", e);
            }
        }
    });
}
