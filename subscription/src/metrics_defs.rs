use shared::metrics_defs::{MetricDef, MetricType};

pub const ARTIFACT_CACHE_HIT: MetricDef = MetricDef {
    name: "artifact_cache.hit",
    metric_type: MetricType::Counter,
    description: "Subscription served from a fresh cached artifact",
};

pub const ARTIFACT_CACHE_MISS: MetricDef = MetricDef {
    name: "artifact_cache.miss",
    metric_type: MetricType::Counter,
    description: "No cached artifact existed for the token",
};

pub const ARTIFACT_CACHE_STALE: MetricDef = MetricDef {
    name: "artifact_cache.stale",
    metric_type: MetricType::Counter,
    description: "Cached artifact predates the latest record update",
};

pub const ARTIFACT_CACHE_CORRUPT: MetricDef = MetricDef {
    name: "artifact_cache.corrupt",
    metric_type: MetricType::Counter,
    description: "Cached artifact could not be parsed and was regenerated",
};

pub const UPSTREAM_FETCH_DURATION: MetricDef = MetricDef {
    name: "upstream.fetch.duration",
    metric_type: MetricType::Histogram,
    description: "Upstream subscription fetch duration in seconds. Tagged with status.",
};

pub const UPSTREAM_FETCH_FAILURES: MetricDef = MetricDef {
    name: "upstream.fetch.failures",
    metric_type: MetricType::Counter,
    description: "Upstream fetches that failed. Tagged with reason.",
};

pub const CONVERSION_DURATION: MetricDef = MetricDef {
    name: "conversion.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent converting a subscription document in seconds. Tagged with variant.",
};

pub const GEOSITE_DOWNLOADS: MetricDef = MetricDef {
    name: "geosite.downloads",
    metric_type: MetricType::Counter,
    description: "Geosite dataset downloads that bypassed the in-process cache",
};

pub const ALL_METRICS: &[MetricDef] = &[
    ARTIFACT_CACHE_HIT,
    ARTIFACT_CACHE_MISS,
    ARTIFACT_CACHE_STALE,
    ARTIFACT_CACHE_CORRUPT,
    UPSTREAM_FETCH_DURATION,
    UPSTREAM_FETCH_FAILURES,
    CONVERSION_DURATION,
    GEOSITE_DOWNLOADS,
];
