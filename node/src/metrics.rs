//! # Prometheus Metrics
//!
//! Operational metrics for the ledger node, scraped at `/metrics` on the
//! metrics port. Everything lives in a dedicated [`prometheus::Registry`]
//! under the `taconomics` prefix.
//!
//! Token amounts are exported in whole tacos (and whole native units) as
//! floats; an `i64` counter cannot hold an 18-decimal supply.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use taconomics_contracts::host::Taconomics;
use taconomics_protocol::config::UNIT;
use taconomics_protocol::events::LedgerEvent;
use taconomics_protocol::types::Amount;

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// RPC calls by method.
    pub rpc_calls_total: IntCounterVec,
    /// Contract rejections by error code.
    pub rejected_calls_total: IntCounterVec,
    pub crunches_total: IntCounter,
    pub purchases_total: IntCounter,
    pub journal_events: IntGauge,
    pub total_supply_tacos: Gauge,
    pub reserve_tacos: Gauge,
    pub total_crunched_tacos: Gauge,
    pub wei_raised_units: Gauge,
    /// 1 while the token is paused.
    pub token_paused: IntGauge,
    pub call_latency_seconds: Histogram,
}

fn whole(amount: Amount) -> f64 {
    amount as f64 / UNIT as f64
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("taconomics".into()), None)?;

        let rpc_calls_total = IntCounterVec::new(
            Opts::new("rpc_calls_total", "JSON-RPC calls received, by method"),
            &["method"],
        )?;
        registry.register(Box::new(rpc_calls_total.clone()))?;

        let rejected_calls_total = IntCounterVec::new(
            Opts::new("rejected_calls_total", "Contract calls rejected, by error code"),
            &["code"],
        )?;
        registry.register(Box::new(rejected_calls_total.clone()))?;

        let crunches_total = IntCounter::new("crunches_total", "Committed reserve crunches")?;
        registry.register(Box::new(crunches_total.clone()))?;

        let purchases_total = IntCounter::new("purchases_total", "Committed crowdsale purchases")?;
        registry.register(Box::new(purchases_total.clone()))?;

        let journal_events = IntGauge::new("journal_events", "Records in the event journal")?;
        registry.register(Box::new(journal_events.clone()))?;

        let total_supply_tacos = Gauge::new("total_supply_tacos", "Current $TACO supply")?;
        registry.register(Box::new(total_supply_tacos.clone()))?;

        let reserve_tacos = Gauge::new("reserve_tacos", "$TACO held by the reserve")?;
        registry.register(Box::new(reserve_tacos.clone()))?;

        let total_crunched_tacos =
            Gauge::new("total_crunched_tacos", "$TACO taken from the reserve by crunches")?;
        registry.register(Box::new(total_crunched_tacos.clone()))?;

        let wei_raised_units =
            Gauge::new("wei_raised_units", "Native value accepted by the crowdsale")?;
        registry.register(Box::new(wei_raised_units.clone()))?;

        let token_paused = IntGauge::new("token_paused", "1 while transfers are paused")?;
        registry.register(Box::new(token_paused.clone()))?;

        let call_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "call_latency_seconds",
                "Time to apply and persist one JSON-RPC call",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0]),
        )?;
        registry.register(Box::new(call_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            rpc_calls_total,
            rejected_calls_total,
            crunches_total,
            purchases_total,
            journal_events,
            total_supply_tacos,
            reserve_tacos,
            total_crunched_tacos,
            wei_raised_units,
            token_paused,
            call_latency_seconds,
        })
    }

    /// Counts a freshly committed event.
    pub fn record_event(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::PoolCrunched { .. } => self.crunches_total.inc(),
            LedgerEvent::TokensPurchased { .. } => self.purchases_total.inc(),
            _ => {}
        }
    }

    /// Refreshes the gauges from the host.
    pub fn observe(&self, host: &Taconomics) {
        let token = host.token();
        self.journal_events.set(host.journal().len() as i64);
        self.total_supply_tacos.set(whole(token.total_supply()));
        self.reserve_tacos
            .set(whole(token.reserve().map_or(0, |r| token.balance_of(r))));
        self.total_crunched_tacos.set(whole(token.total_crunched()));
        self.wei_raised_units.set(whole(host.sale().wei_raised()));
        self.token_paused.set(i64::from(token.is_paused()));
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Renders `/metrics`. HTTP 500 if encoding fails.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taconomics_contracts::allowlist::StaticReputation;
    use taconomics_contracts::host::GenesisConfig;
    use taconomics_contracts::liquidity::LockedPool;
    use taconomics_protocol::clock::ManualClock;

    #[test]
    fn gauges_follow_the_host() {
        let metrics = NodeMetrics::new().unwrap();
        let host = Taconomics::deploy(
            &GenesisConfig::default(),
            Arc::new(ManualClock::new(1_596_000_000)),
            Arc::new(StaticReputation::default()),
            Arc::new(LockedPool::new()),
        )
        .unwrap();

        metrics.observe(&host);
        assert_eq!(metrics.token_paused.get(), 1);
        assert_eq!(metrics.journal_events.get(), host.journal().len() as i64);
        assert!((metrics.total_supply_tacos.get() - 15_624_000.0).abs() < 1e-6);

        let text = metrics.encode().unwrap();
        assert!(text.contains("taconomics_total_supply_tacos"));
    }

    #[test]
    fn events_are_counted_by_kind() {
        let metrics = NodeMetrics::new().unwrap();
        let caller = taconomics_protocol::types::Address::new("taquero").unwrap();
        metrics.record_event(&LedgerEvent::PoolCrunched {
            caller,
            amount: 10,
            reward: 1,
            burned: 9,
        });
        metrics.record_event(&LedgerEvent::Unpaused {
            by: taconomics_protocol::types::Address::new("pauser").unwrap(),
        });
        assert_eq!(metrics.crunches_total.get(), 1);
        assert_eq!(metrics.purchases_total.get(), 0);
    }
}
