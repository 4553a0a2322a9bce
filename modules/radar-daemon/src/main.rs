//! The radar daemon: wires the scheduler, the three fetch pools, the
//! organizer/scoring pipeline and the periodic sweepers into one process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use radar_common::{reasons, Config, PoolKind};
use radar_engine::alerts::AlertDispatcher;
use radar_engine::engine::{EngineConfig, EventEngine};
use radar_engine::maintenance::{MaintenanceConfig, StateMaintenance};
use radar_engine::{Broadcaster, Pipeline};
use radar_ingest::fetcher::Fetcher;
use radar_ingest::pools::run_pool;
use radar_ingest::render::RenderClient;
use radar_ingest::starvation::YieldMonitor;
use radar_ingest::{ProfileRegistry, Scheduler};
use radar_organizer::{Canonicalizer, Organizer};
use radar_store::{CounterStore, MemoryCounters, RedisCounters, Store};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("radar=info".parse()?))
        .init();

    let config = Config::from_env();
    let store = Store::connect(&config.database_url).await?;

    let counters: Arc<dyn CounterStore> = match &config.redis_url {
        Some(url) => {
            info!("using redis counter store");
            Arc::new(RedisCounters::connect(url).await?)
        }
        None => {
            info!("no REDIS_URL set, using in-process counter store");
            Arc::new(MemoryCounters::new())
        }
    };

    let registry = ProfileRegistry::new(store.clone(), config.user_agent.clone());
    let fetcher = Arc::new(Fetcher::new(
        store.clone(),
        counters,
        RenderClient::new(),
        config.data_dir.clone(),
        config.breaker_threshold,
        Duration::from_secs(config.breaker_cooldown_secs),
    )?);

    let broadcaster = Arc::new(Broadcaster::new(store.clone()));
    let alerts = AlertDispatcher::new(store.clone(), config.alert_cooldown_secs);
    let engine = Arc::new(EventEngine::new(
        store.clone(),
        broadcaster.clone(),
        alerts,
        EngineConfig {
            hot_threshold: config.hot_threshold,
            viral_velocity: config.viral_velocity,
            decay_half_life_hours: config.decay_half_life_hours,
            ..EngineConfig::default()
        },
    ));

    let organizer = Organizer::new(
        store.clone(),
        config.near_dup_threshold,
        config.same_event_threshold,
        config.cluster_window_hours,
        config.blacklist_domains.clone(),
    );
    let pipeline = Arc::new(Pipeline::new(
        store.clone(),
        organizer,
        engine.clone(),
        config.user_agent.clone(),
    ));

    // Scheduler loop.
    let scheduler = Scheduler::new(
        store.clone(),
        registry.clone(),
        config.queue_high_water as i64,
    );
    tokio::spawn(async move {
        loop {
            if let Err(e) = scheduler.tick().await {
                error!(error = %e, "scheduler tick failed");
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    });

    // Fetch pools.
    for (pool, workers) in [
        (PoolKind::Fast, config.fast_pool_workers),
        (PoolKind::HeavyRender, config.render_pool_workers),
        (PoolKind::DeepExtract, config.deep_pool_workers),
    ] {
        let store = store.clone();
        let fetcher = fetcher.clone();
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            run_pool(pool, workers, store, fetcher, pipeline).await;
        });
    }

    // Deferred canonicalisation sweep.
    {
        let canonicalizer = Canonicalizer::new(store.clone(), config.cluster_window_hours);
        let engine = engine.clone();
        tokio::spawn(async move {
            loop {
                match canonicalizer.sweep().await {
                    Ok(outcomes) => {
                        if let Err(e) = engine
                            .apply_merges(&outcomes, reasons::DEFERRED_CANONICALIZATION)
                            .await
                        {
                            error!(error = %e, "merge broadcast failed");
                        }
                    }
                    Err(e) => error!(error = %e, "canonicalisation sweep failed"),
                }
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });
    }

    // Gate timeouts, quarantine TTL, inactivity expiry.
    {
        let maintenance = StateMaintenance::new(
            store.clone(),
            engine.clone(),
            MaintenanceConfig {
                gate_fast_secs: config.gate_fast_secs,
                gate_render_secs: config.gate_render_secs,
                quarantine_ttl_secs: config.quarantine_ttl_secs,
                inactivity_horizon_secs: config.inactivity_horizon_secs,
            },
        );
        tokio::spawn(async move {
            loop {
                if let Err(e) = maintenance.sweep().await {
                    error!(error = %e, "state maintenance failed");
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });
    }

    // Stale job reaper: lets the scheduler re-dispatch sources whose
    // worker died mid-job.
    {
        let store = store.clone();
        tokio::spawn(async move {
            loop {
                match store.fail_stale_jobs(chrono::Duration::minutes(30)).await {
                    Ok(failed) if failed > 0 => info!(failed, "reaped stale jobs"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "stale job reaper failed"),
                }
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });
    }

    // Yield monitor.
    let monitor = YieldMonitor::new(store.clone(), registry);
    tokio::spawn(async move {
        loop {
            if let Err(e) = monitor.sweep().await {
                error!(error = %e, "yield monitor sweep failed");
            }
            tokio::time::sleep(Duration::from_secs(900)).await;
        }
    });

    info!("radar daemon up");
    tokio::signal::ctrl_c().await?;
    info!("radar daemon shutting down");
    Ok(())
}
