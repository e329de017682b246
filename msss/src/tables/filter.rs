//! Row selection predicates.
//!
//! A [`RowFilter`] has two renderings that must agree: `accepts` evaluates
//! it in-process, `to_taql` expresses it as a TaQL `WHERE` clause (Python
//! style, 0-based indices).

/// The columns of a visibility row that filters look at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisRow {
    pub antenna1: usize,
    pub antenna2: usize,
    pub uvw: [f64; 3],
}

/// Which rows to keep when copying a measurement set.
#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    /// Keep every row.
    All,
    /// Drop rows where either antenna is one of these stations.
    ExcludeStations(Vec<String>),
    /// Keep rows whose projected baseline is strictly shorter than this
    /// many metres.
    MaxBaseline(f64),
}

impl RowFilter {
    /// Station filter; an empty list keeps everything.
    pub fn exclude_stations(stations: &[String]) -> Self {
        if stations.is_empty() {
            Self::All
        } else {
            Self::ExcludeStations(stations.to_vec())
        }
    }

    pub fn accepts(&self, row: &VisRow, antenna_names: &[String]) -> bool {
        match self {
            Self::All => true,
            Self::ExcludeStations(stations) => {
                let is_bad = |antenna: usize| {
                    antenna_names
                        .get(antenna)
                        .is_some_and(|name| stations.contains(name))
                };
                !is_bad(row.antenna1) && !is_bad(row.antenna2)
            }
            Self::MaxBaseline(max) => {
                let [u, v, _] = row.uvw;
                u * u + v * v < max * max
            }
        }
    }

    /// TaQL predicate, or `None` when every row is kept.
    pub fn to_taql(&self) -> Option<String> {
        match self {
            Self::All => None,
            Self::ExcludeStations(stations) => {
                let names: Vec<String> = stations.iter().map(|s| format!("'{}'", s)).collect();
                Some(format!(
                    "all([ANTENNA1, ANTENNA2] not in [select rowid() from ::ANTENNA where NAME in [{}]])",
                    names.join(", ")
                ))
            }
            // `{:e}` prints the shortest representation that round-trips, so
            // the boundary is exact.
            Self::MaxBaseline(max) => Some(format!("sumsqr(UVW[:2]) < {:e}", max * max)),
        }
    }
}

/// How the selected rows are materialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Independent plain table; survives deletion of the source.
    Deep,
    /// Reference table pointing into the source.
    Shallow,
}
