//! Flashguard
//!
//! Runs a flash-sale burst against the caching and coordination layer and
//! optionally keeps serving health and metrics endpoints afterwards.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Flashguard                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  Shop reads  │───▶│ Cache client │───▶│ Atomic store │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! │  ┌──────────────┐    ┌──────────────┐           ▲               │
//! │  │ Seckill burst│───▶│ Lock + ids   │───────────┘               │
//! │  └──────────────┘    └──────────────┘                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, ValueEnum};
use tokio::task::JoinSet;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flashguard::adapters::{InMemoryDatabase, InMemoryStore, LoggingEventPublisher};
#[cfg(feature = "redis")]
use flashguard::adapters::RedisStore;
use flashguard::config::{
    CacheClientConfig, RebuildPoolConfig, SeckillConfig, CACHE_NULL_TTL, CACHE_SHOP_TTL,
};
use flashguard::domain::model::{SeckillVoucher, Shop, ShopId, ShopType, UserContext, UserId, VoucherId};
use flashguard::domain::ports::AtomicStore;
use flashguard::{
    CacheClient, CachePolicy, IdGenerator, KeySpace, LockService, MetricsRegistry,
    SeckillService, ShopService,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Cache read strategy for the shop key-space
#[derive(ValueEnum, Clone, Copy, Debug)]
enum ShopStrategy {
    PassThrough,
    LogicalExpire,
    Mutex,
}

/// Flashguard - flash-sale cache, lock and id generator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Redis URL; the in-memory store is used when absent
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Cache strategy for shop lookups
    #[arg(long, env = "SHOP_STRATEGY", value_enum, default_value = "pass-through")]
    shop_strategy: ShopStrategy,

    /// Background rebuild workers
    #[arg(long, env = "REBUILD_WORKERS", default_value = "10")]
    rebuild_workers: usize,

    /// Per-user order lock TTL in seconds
    #[arg(long, env = "ORDER_LOCK_TTL_SECS", default_value = "30")]
    order_lock_ttl_secs: u64,

    /// Simulated users
    #[arg(long, env = "USERS", default_value = "200")]
    users: u64,

    /// Concurrent attempts per user
    #[arg(long, env = "ATTEMPTS_PER_USER", default_value = "3")]
    attempts_per_user: u32,

    /// Voucher stock for the simulated sale
    #[arg(long, env = "STOCK", default_value = "100")]
    stock: u32,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Keep serving health and metrics after the simulation until Ctrl-C
    #[arg(long, env = "SERVE")]
    serve: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn shop_policy(&self) -> CachePolicy {
        match self.shop_strategy {
            ShopStrategy::PassThrough => CachePolicy::PassThrough {
                null_ttl: CACHE_NULL_TTL,
                ttl: CACHE_SHOP_TTL,
            },
            ShopStrategy::LogicalExpire => CachePolicy::LogicalExpire {
                ttl: CACHE_SHOP_TTL,
            },
            ShopStrategy::Mutex => CachePolicy::Mutex {
                null_ttl: CACHE_NULL_TTL,
                ttl: CACHE_SHOP_TTL,
            },
        }
    }
}

// =============================================================================
// Main
// =============================================================================

const SALE_VOUCHER: u64 = 1;
const DEMO_SHOPS: u64 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Flashguard");
    info!("  Store: {}", args.redis_url.as_deref().unwrap_or("in-memory"));
    info!("  Shop strategy: {}", args.shop_policy());
    info!("  Rebuild workers: {}", args.rebuild_workers);
    info!(
        "  Sale: {} users x {} attempts, stock {}",
        args.users, args.attempts_per_user, args.stock
    );

    let store = connect_store(&args).await?;
    let db = Arc::new(seed_database(args.stock).await);
    let events = Arc::new(LoggingEventPublisher::new(Level::DEBUG));
    let metrics = Arc::new(MetricsRegistry::new()?);

    let cache = CacheClient::new(
        store.clone(),
        CacheClientConfig::default(),
        RebuildPoolConfig {
            workers: args.rebuild_workers,
            ..Default::default()
        },
    );
    let ids = IdGenerator::new(store.clone());

    let shops = ShopService::new(
        cache.clone(),
        db.clone(),
        events.clone(),
        KeySpace::shops(args.shop_policy()),
    );
    let seckill = Arc::new(
        SeckillService::new(
            db.clone(),
            db.clone(),
            LockService::new(store.clone()),
            ids.clone(),
            events.clone(),
            SeckillConfig {
                lock_ttl: Duration::from_secs(args.order_lock_ttl_secs),
                ..Default::default()
            },
        )
        .with_metrics(metrics.clone()),
    );

    // Start health server
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr).await {
            error!("Health server error: {:#}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let scrape = ScrapeState {
        registry: metrics.clone(),
        cache: cache.clone(),
        ids: ids.clone(),
    };
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, scrape).await {
            error!("Metrics server error: {:#}", e);
        }
    });

    browse_shops(&shops).await?;
    run_sale(&args, seckill, &db, &metrics).await?;

    let cache_stats = cache.metrics().snapshot();
    info!(
        hits = cache_stats.hits,
        null_hits = cache_stats.null_hits,
        misses = cache_stats.misses,
        fallback_calls = cache_stats.fallback_calls,
        hit_ratio = cache_stats.hit_ratio(),
        "Cache summary"
    );

    if args.serve {
        info!("Serving health and metrics, press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
    }

    cache.shutdown().await;
    info!("Flashguard shutdown complete");
    Ok(())
}

async fn connect_store(args: &Args) -> anyhow::Result<Arc<dyn AtomicStore>> {
    match &args.redis_url {
        None => Ok(Arc::new(InMemoryStore::new())),
        #[cfg(feature = "redis")]
        Some(url) => {
            let store = RedisStore::connect(url)
                .await
                .with_context(|| format!("failed to connect to {}", url))?;
            info!("Connected to Redis");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => anyhow::bail!("--redis-url needs a build with the `redis` feature"),
    }
}

async fn seed_database(stock: u32) -> InMemoryDatabase {
    let db = InMemoryDatabase::new();

    for id in 1..=DEMO_SHOPS {
        let mut shop = Shop::new(ShopId::new(id), format!("Shop {}", id));
        shop.type_id = 1 + id % 2;
        shop.address = format!("{} Market Street", id * 10);
        db.insert_shop(shop).await;
    }
    for (id, name, sort) in [(1, "Food", 1), (2, "KTV", 2)] {
        db.insert_shop_type(ShopType {
            id,
            name: name.to_string(),
            icon: format!("/types/{}.png", id),
            sort,
        })
        .await;
    }

    let now = Utc::now();
    db.insert_voucher(SeckillVoucher::new(
        VoucherId::new(SALE_VOUCHER),
        stock,
        now - chrono::Duration::minutes(1),
        now + chrono::Duration::hours(1),
    ))
    .await;

    db
}

// =============================================================================
// Simulation
// =============================================================================

async fn browse_shops(shops: &ShopService) -> anyhow::Result<()> {
    if matches!(shops.key_space().policy, CachePolicy::LogicalExpire { .. }) {
        for id in 1..=DEMO_SHOPS {
            shops.warm_up(ShopId::new(id), CACHE_SHOP_TTL).await?;
        }
    }

    // Includes one id that does not exist
    for round in 0..3 {
        for id in 1..=DEMO_SHOPS + 1 {
            let found = shops.query_by_id(ShopId::new(id)).await?;
            if round == 0 {
                info!(shop_id = id, found = found.is_some(), "Shop lookup");
            }
        }
    }

    let types = shops.list_types().await?;
    info!(count = types.len(), "Loaded shop types");
    Ok(())
}

async fn run_sale(
    args: &Args,
    seckill: Arc<SeckillService>,
    db: &InMemoryDatabase,
    metrics: &MetricsRegistry,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let mut join_set = JoinSet::new();

    for user in 1..=args.users {
        for _ in 0..args.attempts_per_user {
            let seckill = seckill.clone();
            join_set.spawn(async move {
                let ctx = UserContext::new(UserId::new(user));
                seckill
                    .seckill_voucher(&ctx, VoucherId::new(SALE_VOUCHER))
                    .await
            });
        }
    }

    let mut failures = 0usize;
    while let Some(result) = join_set.join_next().await {
        match result.context("purchase task panicked")? {
            Ok(_) => {}
            Err(e) => {
                failures += 1;
                warn!(error = %e, "Purchase attempt failed");
            }
        }
    }

    let left = db.stock_of(VoucherId::new(SALE_VOUCHER)).await.unwrap_or(0);
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        created = metrics.seckill_count("created"),
        sold_out = metrics.seckill_count("sold_out"),
        in_progress = metrics.seckill_count("in_progress"),
        already_purchased = metrics.seckill_count("already_purchased"),
        orders = db.order_count().await,
        stock_left = left,
        failures,
        "Sale finished"
    );
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "redis=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str) -> anyhow::Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn health_handler(
        req: Request<hyper::body::Incoming>,
    ) -> std::result::Result<Response<Full<Bytes>>, std::convert::Infallible> {
        let mut response = Response::new(Full::new(Bytes::from("ok")));
        if !matches!(req.uri().path(), "/healthz" | "/livez" | "/readyz") {
            *response.body_mut() = Full::new(Bytes::from("not found"));
            *response.status_mut() = StatusCode::NOT_FOUND;
        }
        Ok(response)
    }

    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid health server address {}", addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind health server")?;

    info!("Health server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .context("health server accept error")?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(health_handler))
                .await
            {
                error!("Health server connection error: {}", e);
            }
        });
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

/// Sources refreshed into the registry on every scrape
#[derive(Clone)]
struct ScrapeState {
    registry: Arc<MetricsRegistry>,
    cache: CacheClient,
    ids: IdGenerator,
}

async fn run_metrics_server(addr: &str, state: ScrapeState) -> anyhow::Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    fn metrics_handler(
        req: Request<hyper::body::Incoming>,
        state: &ScrapeState,
    ) -> Response<Full<Bytes>> {
        if req.uri().path() != "/metrics" {
            let mut response = Response::new(Full::new(Bytes::from("not found")));
            *response.status_mut() = StatusCode::NOT_FOUND;
            return response;
        }

        state.registry.observe_cache(&state.cache.metrics().snapshot());
        state.registry.observe_ids_issued(state.ids.issued());

        match state.registry.encode() {
            Ok(text) => {
                let mut response = Response::new(Full::new(Bytes::from(text)));
                if let Ok(content_type) = "text/plain; version=0.0.4".parse() {
                    response
                        .headers_mut()
                        .insert(hyper::header::CONTENT_TYPE, content_type);
                }
                response
            }
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                let mut response = Response::new(Full::new(Bytes::from("encode error")));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        }
    }

    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid metrics server address {}", addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind metrics server")?;

    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .context("metrics server accept error")?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let response = metrics_handler(req, &state);
                async move { Ok::<_, std::convert::Infallible>(response) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}
