//! Derived-metric processors
//!
//! A processor turns one raw batch into derived sequences. It only ever sees
//! the incoming batch, never the accumulated session, and its output must
//! line up positionally with the batch's own samples.

use crate::types::{DerivedSession, GpsSample, RawSession};

/// Mean Earth radius used for great-circle distances (metres)
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Capability: raw batch in, derived batch out
pub trait MetricsProcessor: Send + Sync {
    fn transform(&self, batch: &RawSession) -> DerivedSession;
}

/// Reference processor
///
/// - speed: receiver-reported GPS speed, one value per fix
/// - distance: cumulative haversine distance along the batch's fixes,
///   starting at 0 for the first fix
/// - heart rate: copied through
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveProcessor;

impl MetricsProcessor for NaiveProcessor {
    fn transform(&self, batch: &RawSession) -> DerivedSession {
        let speed = batch.gps.iter().map(|fix| fix.speed).collect();

        let mut distance = Vec::with_capacity(batch.gps.len());
        let mut travelled = 0.0;
        let mut previous: Option<&GpsSample> = None;
        for fix in &batch.gps {
            if let Some(prev) = previous {
                travelled += haversine_m(prev, fix);
            }
            distance.push(travelled);
            previous = Some(fix);
        }

        DerivedSession {
            speed,
            distance,
            heart_rate: batch.heart_rate.clone(),
        }
    }
}

/// Great-circle distance between two fixes in metres
pub fn haversine_m(a: &GpsSample, b: &GpsSample) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}
