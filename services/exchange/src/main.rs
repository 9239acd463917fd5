use anyhow::Context;
use exchange::{Exchange, ExchangeConfig, SyntheticFeed, CONFIG_ENV};
use scheduler::{SharedClock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match ExchangeConfig::locate(std::env::var(CONFIG_ENV).ok(), std::env::args().skip(1)) {
        Some(path) => ExchangeConfig::load(&path).with_context(|| format!("loading {}", path.display()))?,
        None => {
            warn!("no config file given, running with defaults");
            ExchangeConfig::default()
        }
    };

    let clock: SharedClock = Arc::new(SystemClock);
    let exchange = Exchange::build(config, clock.clone()).context("assembling exchange")?;
    let scheduler = exchange.start().context("starting periodic tasks")?;

    let feed_config = exchange.config().feed.clone();
    let mut feed = match exchange.account_id(&feed_config.trader) {
        Some(trader) if !feed_config.instruments.is_empty() => Some(SyntheticFeed::new(feed_config.clone(), trader)),
        _ => None,
    };
    let deadline = feed_config.run_for_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut ticker = tokio::time::interval(feed_config.tick());
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    info!(feed = feed.is_some(), "exchange running");
    loop {
        tokio::select! {
            _ = &mut interrupted => {
                info!("interrupted, shutting down");
                break;
            }
            _ = ticker.tick() => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }
                let Some(feed) = feed.as_mut() else { continue };
                let step = feed.step(clock.now_nanos());
                for sample in step.samples {
                    exchange.publish(sample);
                }
                for order in step.orders {
                    if let Err(e) = exchange.submit(order) {
                        debug!(error = %e, "trader order rejected");
                    }
                }
            }
        }
    }

    for (task, stats) in scheduler.shutdown().await? {
        info!(%task, ticks = stats.ticks, overruns = stats.overruns, "task finished");
    }
    exchange.route_trades();
    info!(trades = exchange.trades_routed(), "trades routed");
    if let Some(report) = exchange.settlement().latest_report() {
        info!(
            settled = report.completed,
            failed = report.failed,
            efficiency = report.netting_efficiency,
            "last clearing batch"
        );
    }
    if let Some(report) = exchange.risk().latest() {
        info!(
            equity = %report.metrics.equity,
            var = report.metrics.value_at_risk,
            alerts = report.alerts.len(),
            "last risk report"
        );
    }
    Ok(())
}
