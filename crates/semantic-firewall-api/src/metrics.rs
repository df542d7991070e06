//! Rolling metrics store
//!
//! Thread-safe ring buffer of the most recent events plus per-session
//! aggregates. The buffer never exceeds its configured capacity; the
//! oldest entries are evicted on insertion. Session counters accumulate
//! on insertion and are not decremented by eviction.

use chrono::{DateTime, Duration, Utc};
use semantic_firewall_core::{EventAction, FirewallEvent, RiskCategory, RiskLabel};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

/// Per-session analytics
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,
    pub total_requests: u64,
    pub malicious_count: u64,
    pub suspicious_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Average per-stage latencies
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AvgLatency {
    pub preprocessing: f64,
    pub ml: f64,
    pub policy: f64,
    pub backend: f64,
    pub total: f64,
}

/// Executive KPI snapshot
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_prompts: usize,
    pub benign_count: usize,
    pub suspicious_count: usize,
    pub malicious_count: usize,
    pub benign_pct: f64,
    pub suspicious_pct: f64,
    pub malicious_pct: f64,
    pub blocked_count: usize,
    pub allowed_count: usize,
    pub block_allow_ratio: String,
    pub prompts_per_minute: f64,
    /// `increasing`, `decreasing` or `stable`
    pub risk_trend: String,
    pub avg_latency_ms: AvgLatency,
    pub risk_breakdown: BTreeMap<String, usize>,
}

/// Per-minute risk-category buckets
#[derive(Debug, Clone, Serialize)]
pub struct TemporalBreakdown {
    pub timestamps: Vec<String>,
    pub categories: BTreeMap<String, Vec<usize>>,
}

struct Inner {
    events: VecDeque<FirewallEvent>,
    sessions: HashMap<String, SessionStats>,
}

/// Bounded in-memory event store
pub struct RollingMetricsStore {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl RollingMetricsStore {
    pub fn new(capacity: usize) -> Self {
        tracing::info!(capacity, "Rolling metrics store initialized");
        Self {
            capacity,
            inner: Mutex::new(Inner {
                events: VecDeque::with_capacity(capacity),
                sessions: HashMap::new(),
            }),
        }
    }

    /// O(1) insert; evicts the oldest event beyond capacity
    pub fn add(&self, event: FirewallEvent) {
        let mut inner = self.inner.lock().unwrap();

        if let Some(session_id) = &event.session_id {
            let session = inner
                .sessions
                .entry(session_id.clone())
                .or_insert_with(|| SessionStats {
                    session_id: session_id.clone(),
                    total_requests: 0,
                    malicious_count: 0,
                    suspicious_count: 0,
                    first_seen: event.timestamp,
                    last_seen: event.timestamp,
                });
            session.total_requests += 1;
            session.last_seen = event.timestamp;
            match event.risk_level {
                RiskLabel::Malicious => session.malicious_count += 1,
                RiskLabel::Suspicious => session.suspicious_count += 1,
                RiskLabel::Benign => {}
            }
        }

        inner.events.push_back(event);
        if inner.events.len() > self.capacity {
            inner.events.pop_front();
        }
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Executive KPIs over the buffered events
    pub fn stats(&self) -> StatsSnapshot {
        let inner = self.inner.lock().unwrap();
        let events = &inner.events;
        let total = events.len();

        if total == 0 {
            return Self::empty_stats();
        }

        let benign = events
            .iter()
            .filter(|e| e.risk_level == RiskLabel::Benign)
            .count();
        let suspicious = events
            .iter()
            .filter(|e| e.risk_level == RiskLabel::Suspicious)
            .count();
        let malicious = events
            .iter()
            .filter(|e| e.risk_level == RiskLabel::Malicious)
            .count();
        let blocked = events
            .iter()
            .filter(|e| e.action == EventAction::Block)
            .count();
        let allowed = total - blocked;

        let pct = |count: usize| round1(count as f64 / total as f64 * 100.0);

        let block_allow_ratio = if blocked > 0 {
            format!("1:{}", allowed / blocked)
        } else {
            format!("1:{}", allowed)
        };

        // Prompts per minute over the trailing five minutes of event time
        let five_min_ago = Utc::now() - Duration::minutes(5);
        let recent = events.iter().filter(|e| e.timestamp > five_min_ago).count();
        let prompts_per_minute = round2(recent as f64 / 5.0);

        let sum_latency = |f: fn(&FirewallEvent) -> f64| {
            events.iter().map(f).sum::<f64>() / total as f64
        };
        let avg_latency_ms = AvgLatency {
            preprocessing: sum_latency(|e| e.latency_ms.preprocessing),
            ml: sum_latency(|e| e.latency_ms.ml),
            policy: sum_latency(|e| e.latency_ms.policy),
            backend: sum_latency(|e| e.latency_ms.backend),
            total: sum_latency(|e| e.latency_ms.total),
        };

        // Risk trend: average of the newest 10% of events vs the remainder
        let split_point = (total / 10).max(1);
        let recent_avg = trend_average(events.iter().skip(total - split_point));
        let previous_avg = if total > split_point {
            trend_average(events.iter().take(total - split_point))
        } else {
            0.0
        };
        let risk_trend = if recent_avg > previous_avg {
            "increasing"
        } else if recent_avg < previous_avg {
            "decreasing"
        } else {
            "stable"
        };

        let mut risk_breakdown = empty_breakdown();
        for event in events {
            *risk_breakdown
                .get_mut(event.risk_category.as_str())
                .unwrap() += 1;
        }

        StatsSnapshot {
            total_prompts: total,
            benign_count: benign,
            suspicious_count: suspicious,
            malicious_count: malicious,
            benign_pct: pct(benign),
            suspicious_pct: pct(suspicious),
            malicious_pct: pct(malicious),
            blocked_count: blocked,
            allowed_count: allowed,
            block_allow_ratio,
            prompts_per_minute,
            risk_trend: risk_trend.to_string(),
            avg_latency_ms,
            risk_breakdown,
        }
    }

    /// Most recent events, newest first
    pub fn recent(&self, limit: usize) -> Vec<FirewallEvent> {
        let inner = self.inner.lock().unwrap();
        inner.events.iter().rev().take(limit).cloned().collect()
    }

    /// Sessions sorted by malicious + suspicious activity, descending
    pub fn session_analytics(&self, top_n: usize) -> Vec<SessionStats> {
        let inner = self.inner.lock().unwrap();
        let mut sessions: Vec<SessionStats> = inner.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| {
            (b.malicious_count + b.suspicious_count).cmp(&(a.malicious_count + a.suspicious_count))
        });
        sessions.truncate(top_n);
        sessions
    }

    /// Per-minute risk-category buckets over the last N minutes
    pub fn temporal_breakdown(&self, minutes: i64) -> TemporalBreakdown {
        let inner = self.inner.lock().unwrap();
        let cutoff = Utc::now() - Duration::minutes(minutes);

        let mut buckets: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        for event in &inner.events {
            if event.timestamp <= cutoff {
                continue;
            }
            let minute = event.timestamp.format("%Y-%m-%d %H:%M").to_string();
            let bucket = buckets.entry(minute).or_insert_with(|| {
                RiskCategory::ALL
                    .iter()
                    .map(|c| (c.as_str().to_string(), 0))
                    .collect()
            });
            *bucket.get_mut(event.risk_category.as_str()).unwrap() += 1;
        }

        let timestamps: Vec<String> = buckets.keys().cloned().collect();
        let categories = RiskCategory::ALL
            .iter()
            .map(|category| {
                let series = timestamps
                    .iter()
                    .map(|ts| buckets[ts][category.as_str()])
                    .collect();
                (category.as_str().to_string(), series)
            })
            .collect();

        TemporalBreakdown {
            timestamps,
            categories,
        }
    }

    fn empty_stats() -> StatsSnapshot {
        StatsSnapshot {
            total_prompts: 0,
            benign_count: 0,
            suspicious_count: 0,
            malicious_count: 0,
            benign_pct: 0.0,
            suspicious_pct: 0.0,
            malicious_pct: 0.0,
            blocked_count: 0,
            allowed_count: 0,
            block_allow_ratio: "1:0".to_string(),
            prompts_per_minute: 0.0,
            risk_trend: "stable".to_string(),
            avg_latency_ms: AvgLatency::default(),
            risk_breakdown: empty_breakdown(),
        }
    }
}

fn empty_breakdown() -> BTreeMap<String, usize> {
    RiskCategory::ALL
        .iter()
        .map(|category| (category.as_str().to_string(), 0))
        .collect()
}

fn trend_average<'a, I: Iterator<Item = &'a FirewallEvent>>(events: I) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for event in events {
        sum += event.risk_level.trend_score();
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use semantic_firewall_core::{EventLatency, EventPolicy};

    fn event(id: usize, risk: RiskLabel, category: RiskCategory, blocked: bool) -> FirewallEvent {
        let action = if blocked {
            EventAction::Block
        } else {
            EventAction::Allow
        };
        FirewallEvent {
            id: format!("req-{}", id),
            timestamp: Utc::now(),
            prompt: format!("prompt {}", id),
            response: String::new(),
            risk_level: risk,
            risk_category: category,
            scores: Default::default(),
            heuristics: Vec::new(),
            policy: EventPolicy {
                matched_rule: None,
                decision: action,
            },
            action,
            latency_ms: EventLatency {
                preprocessing: 1.0,
                ml: 2.0,
                policy: 3.0,
                backend: 4.0,
                total: 10.0,
            },
            session_id: None,
            preprocessing_info: None,
            detector_config: None,
        }
    }

    fn benign(id: usize) -> FirewallEvent {
        event(id, RiskLabel::Benign, RiskCategory::Clean, false)
    }

    #[test]
    fn test_capacity_enforced() {
        let store = RollingMetricsStore::new(500);
        for i in 0..600 {
            store.add(benign(i));
        }

        assert_eq!(store.len(), 500);
        assert_eq!(store.stats().total_prompts, 500);

        // recent(50) returns events 600..551, newest first
        let recent = store.recent(50);
        assert_eq!(recent.len(), 50);
        assert_eq!(recent[0].id, "req-599");
        assert_eq!(recent[49].id, "req-550");
    }

    #[test]
    fn test_empty_stats() {
        let store = RollingMetricsStore::new(10);
        let stats = store.stats();
        assert_eq!(stats.total_prompts, 0);
        assert_eq!(stats.block_allow_ratio, "1:0");
        assert_eq!(stats.risk_trend, "stable");
        assert_eq!(stats.risk_breakdown["clean"], 0);
    }

    #[test]
    fn test_counts_and_percentages() {
        let store = RollingMetricsStore::new(100);
        for i in 0..6 {
            store.add(benign(i));
        }
        for i in 6..8 {
            store.add(event(i, RiskLabel::Suspicious, RiskCategory::Injection, false));
        }
        for i in 8..10 {
            store.add(event(i, RiskLabel::Malicious, RiskCategory::Leak, true));
        }

        let stats = store.stats();
        assert_eq!(stats.total_prompts, 10);
        assert_eq!(stats.benign_count, 6);
        assert_eq!(stats.suspicious_count, 2);
        assert_eq!(stats.malicious_count, 2);
        assert_eq!(stats.benign_pct, 60.0);
        assert_eq!(stats.blocked_count, 2);
        assert_eq!(stats.allowed_count, 8);
        assert_eq!(stats.block_allow_ratio, "1:4");
        assert_eq!(stats.risk_breakdown["injection"], 2);
        assert_eq!(stats.risk_breakdown["leak"], 2);
        assert_eq!(stats.risk_breakdown["clean"], 6);
    }

    #[test]
    fn test_average_latencies() {
        let store = RollingMetricsStore::new(10);
        store.add(benign(1));
        store.add(benign(2));

        let stats = store.stats();
        assert_eq!(stats.avg_latency_ms.preprocessing, 1.0);
        assert_eq!(stats.avg_latency_ms.ml, 2.0);
        assert_eq!(stats.avg_latency_ms.backend, 4.0);
        assert_eq!(stats.avg_latency_ms.total, 10.0);
    }

    #[test]
    fn test_risk_trend_increasing() {
        let store = RollingMetricsStore::new(100);
        // 18 benign then 2 malicious: the newest 10% (2 events) are riskier
        for i in 0..18 {
            store.add(benign(i));
        }
        for i in 18..20 {
            store.add(event(i, RiskLabel::Malicious, RiskCategory::Injection, true));
        }
        assert_eq!(store.stats().risk_trend, "increasing");
    }

    #[test]
    fn test_risk_trend_decreasing() {
        let store = RollingMetricsStore::new(100);
        for i in 0..18 {
            store.add(event(i, RiskLabel::Malicious, RiskCategory::Injection, true));
        }
        for i in 18..20 {
            store.add(benign(i));
        }
        assert_eq!(store.stats().risk_trend, "decreasing");
    }

    #[test]
    fn test_risk_trend_small_buffer_uses_one_event() {
        let store = RollingMetricsStore::new(100);
        store.add(benign(0));
        store.add(benign(1));
        store.add(event(2, RiskLabel::Malicious, RiskCategory::Pii, true));
        // split point is max(1, 3/10) = 1, so only the newest event counts
        assert_eq!(store.stats().risk_trend, "increasing");
    }

    #[test]
    fn test_session_analytics_ordering() {
        let store = RollingMetricsStore::new(100);

        let mut quiet = benign(1);
        quiet.session_id = Some("quiet".to_string());
        store.add(quiet);

        for i in 2..5 {
            let mut noisy = event(i, RiskLabel::Malicious, RiskCategory::Injection, true);
            noisy.session_id = Some("noisy".to_string());
            store.add(noisy);
        }

        let sessions = store.session_analytics(5);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "noisy");
        assert_eq!(sessions[0].malicious_count, 3);
        assert_eq!(sessions[0].total_requests, 3);
        assert_eq!(sessions[1].session_id, "quiet");

        let top_one = store.session_analytics(1);
        assert_eq!(top_one.len(), 1);
        assert_eq!(top_one[0].session_id, "noisy");
    }

    #[test]
    fn test_temporal_breakdown_buckets() {
        let store = RollingMetricsStore::new(100);
        store.add(event(1, RiskLabel::Malicious, RiskCategory::Injection, true));
        store.add(benign(2));

        let breakdown = store.temporal_breakdown(10);
        assert_eq!(breakdown.timestamps.len(), 1);
        let injection = &breakdown.categories["injection"];
        let clean = &breakdown.categories["clean"];
        assert_eq!(injection.iter().sum::<usize>(), 1);
        assert_eq!(clean.iter().sum::<usize>(), 1);
        assert_eq!(breakdown.categories.len(), 6);
    }

    #[test]
    fn test_temporal_breakdown_cutoff() {
        let store = RollingMetricsStore::new(100);
        let mut old = benign(1);
        old.timestamp = Utc::now() - Duration::minutes(30);
        store.add(old);
        store.add(benign(2));

        let breakdown = store.temporal_breakdown(10);
        assert_eq!(breakdown.timestamps.len(), 1);
    }

    #[test]
    fn test_prompts_per_minute() {
        let store = RollingMetricsStore::new(100);
        for i in 0..10 {
            store.add(benign(i));
        }
        let mut stale = benign(99);
        stale.timestamp = Utc::now() - Duration::minutes(20);
        store.add(stale);

        // 10 events in the window / 5 minutes
        assert_eq!(store.stats().prompts_per_minute, 2.0);
    }
}
