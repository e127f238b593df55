//! Demo for hubbub
//!
//! Loads settings, starts a broker carrying JSON payloads and walks through a
//! short session: a regular subscriber, a one-shot subscriber, a publish to
//! two topics, an unsubscribe and a shutdown. Received messages are printed as
//! JSON lines.

use hubbub::config::{BrokerSettings, load_config};
use hubbub::utils::logging;
use hubbub::{Broker, Subscription};
use serde_json::{Value, json};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.log.level);

    if let Err(e) = run(&config.broker).await {
        error!("Demo failed: {e}");
        std::process::exit(1);
    }
}

async fn run(settings: &BrokerSettings) -> Result<(), Box<dyn std::error::Error>> {
    let broker: Broker<Value> = Broker::from_settings(settings)?;
    info!("Broker started (capacity {})", broker.capacity());

    let ticker = broker.subscribe(["prices", "news"]).await?;
    let first_alert = broker.subscribe_once(["alerts"]).await?;
    let audit = broker.subscribe(["prices"]).await?;
    let audit_id = audit.id();

    let ticker_task = tokio::spawn(drain("ticker", ticker));
    let alert_task = tokio::spawn(drain("first-alert", first_alert));
    let audit_task = tokio::spawn(drain("audit", audit));

    broker.publish(json!({ "symbol": "ACME", "price": 42.5 }), ["prices"])?;
    // audit only sees the first price
    broker.unsubscribe(audit_id)?;
    broker.publish(json!({ "headline": "ACME beats estimates" }), ["news", "alerts"])?;
    broker.publish(json!({ "headline": "second alert" }), ["alerts"])?;

    let report = broker
        .publish_with_report(json!({ "symbol": "ACME", "price": 43.0 }), ["prices"])
        .await?;
    info!(
        "Last publish: {} delivered, {} dropped",
        report.delivered, report.dropped
    );

    let stats = broker.stats().await?;
    info!(
        "Topics: {}, subscribers: {}, published: {}, delivered: {}, dropped: {}",
        stats.topics, stats.subscribers, stats.published, stats.delivered, stats.dropped
    );

    broker.shutdown().await;

    let received = ticker_task.await? + alert_task.await? + audit_task.await?;
    info!("Session finished; {received} messages received");
    Ok(())
}

/// Print every message until the broker closes the subscription.
async fn drain(name: &'static str, mut sub: Subscription<Value>) -> usize {
    let mut count = 0;
    while let Some(msg) = sub.recv().await {
        match serde_json::to_string(&msg) {
            Ok(line) => println!("[{name}] {line}"),
            Err(e) => error!("Failed to serialize message: {e}"),
        }
        count += 1;
    }
    info!("{name} ({}) closed", sub.id());
    count
}
