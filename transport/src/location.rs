use anyhow::bail;
use std::fmt::{Display, Formatter};

/// A point in the overlay's circular keyspace `[0, 1)`, representing a node's specialization.
///
/// The reliability layer treats locations as opaque: it only ever compares them and measures
///  distance. Routing policy lives in a different layer.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Location(f64);

impl Location {
    pub fn new(value: f64) -> anyhow::Result<Location> {
        if !(0.0..1.0).contains(&value) {
            bail!("keyspace location must be in [0, 1), was {}", value);
        }
        Ok(Location(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Distance on the keyspace circle, i.e. the shorter way around.
    pub fn distance(&self, other: Location) -> f64 {
        let d = (self.0 - other.0).abs();
        d.min(1.0 - d)
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{:.6}", self.0)
    }
}
