use crate::{
    config::Config,
    error::Result,
    services::{SessionTokens, Storage, Store, StoryGenerator},
};
use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};
use std::{num::NonZeroU32, sync::Arc};

pub type KeyedRateLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

/// 应用程序的共享状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Config,

    /// 数据存储
    pub store: Store,

    /// 会话令牌签发与校验
    pub tokens: SessionTokens,

    /// AI 故事生成
    pub generator: StoryGenerator,

    /// 生成接口的按 IP 限流
    pub rate_limiter: Arc<KeyedRateLimiter>,
}

impl AppState {
    pub fn new(config: Config, storage: Arc<dyn Storage>) -> Result<Self> {
        let store = Store::open(storage, &config)?;
        let tokens = SessionTokens::new(&config);
        let generator = StoryGenerator::new(&config)?;

        let per_minute = NonZeroU32::new(config.rate_limit_requests).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::dashmap(Quota::per_minute(per_minute)));

        Ok(Self {
            config,
            store,
            tokens,
            generator,
            rate_limiter,
        })
    }

    /// 检查是否为生产环境
    pub fn is_production(&self) -> bool {
        self.config.is_production()
    }
}
