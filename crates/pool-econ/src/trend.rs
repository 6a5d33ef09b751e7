//! KPI trend tracking.

use crate::metrics::MetricsSnapshot;
use pool_core::{KpiKey, KpiSet};
use tracing::debug;

/// Relative change from `old` to `new`; 0 when `old` is 0 or the result is not finite.
pub fn trend(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        return 0.0;
    }
    let t = (new - old) / old;
    if t.is_finite() {
        t
    } else {
        0.0
    }
}

/// Overwrite a KPI value, keeping the replaced value as `previous_value`.
///
/// Returns the new trend, or `None` if the set has no such KPI.
pub fn update_kpi(kpis: &mut KpiSet, key: KpiKey, new_value: f64) -> Option<f64> {
    let kpi = kpis.get_mut(key)?;
    let t = trend(kpi.value, new_value);
    kpi.previous_value = kpi.value;
    kpi.value = new_value;
    kpi.trend = t;
    debug!(?key, value = new_value, trend = t, "kpi updated");
    Some(t)
}

/// The value each KPI takes from a metrics snapshot.
pub fn kpi_values(metrics: &MetricsSnapshot) -> [(KpiKey, f64); 4] {
    [
        (KpiKey::PcRatio, metrics.pc_ratio),
        (KpiKey::Roe, metrics.roe),
        (KpiKey::Exposure, metrics.exposure.current),
        (KpiKey::Efficiency, metrics.efficiency.operational),
    ]
}

/// Update every KPI from a snapshot.
pub fn apply_snapshot(kpis: &mut KpiSet, metrics: &MetricsSnapshot) {
    for (key, value) in kpi_values(metrics) {
        update_kpi(kpis, key, value);
    }
}
