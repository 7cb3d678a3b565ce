use serde::{Deserialize, Serialize};

/// Ordinal of a station within a train's stop list. Strictly increasing along
/// the direction of travel.
pub type RoutePosition = i32;

/// The portion of a route a passenger occupies, `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub from: RoutePosition,
    pub to: RoutePosition,
}

impl Segment {
    pub fn new(from: RoutePosition, to: RoutePosition) -> Result<Self, RouteError> {
        if from >= to {
            return Err(RouteError::NotForward { from, to });
        }
        Ok(Self { from, to })
    }

    /// Half-open interval intersection. Segments that only touch at a station
    /// (e.g. 0..5 and 5..9) do not overlap.
    pub fn overlaps(&self, other: &Segment) -> bool {
        other.from < self.to && other.to > self.from
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stop {
    pub station_code: String,
    pub position: RoutePosition,
}

impl Stop {
    pub fn new(station_code: impl Into<String>, position: RoutePosition) -> Self {
        Self {
            station_code: station_code.into(),
            position,
        }
    }
}

/// Ordered stops of one train, as returned by the timetable provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopSequence {
    pub train_id: String,
    pub stops: Vec<Stop>,
}

impl StopSequence {
    pub fn new(train_id: impl Into<String>, stops: Vec<Stop>) -> Self {
        Self {
            train_id: train_id.into(),
            stops,
        }
    }

    /// Build a sequence whose positions are the stop indexes.
    pub fn from_codes(train_id: impl Into<String>, codes: &[&str]) -> Self {
        let stops = codes
            .iter()
            .enumerate()
            .map(|(idx, code)| Stop::new(*code, idx as RoutePosition))
            .collect();
        Self::new(train_id, stops)
    }

    pub fn resolve_position(&self, station_code: &str) -> Option<RoutePosition> {
        let wanted = normalize_code(station_code);
        self.stops
            .iter()
            .find(|stop| normalize_code(&stop.station_code) == wanted)
            .map(|stop| stop.position)
    }

    pub fn resolve_segment(&self, source: &str, destination: &str) -> Result<Segment, RouteError> {
        let from = self
            .resolve_position(source)
            .ok_or_else(|| RouteError::StationNotOnRoute {
                station: source.to_string(),
                train_id: self.train_id.clone(),
            })?;
        let to = self
            .resolve_position(destination)
            .ok_or_else(|| RouteError::StationNotOnRoute {
                station: destination.to_string(),
                train_id: self.train_id.clone(),
            })?;

        Segment::new(from, to)
    }
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("Unknown train: {0}")]
    UnknownTrain(String),
    #[error("Station {station} is not on the route of train {train_id}")]
    StationNotOnRoute { station: String, train_id: String },
    #[error("Source position {from} is not before destination position {to}")]
    NotForward {
        from: RoutePosition,
        to: RoutePosition,
    },
}
