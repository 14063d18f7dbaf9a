use crate::error::{invalid_argument, BridgeResult};

/// Geographic coordinate pair with validated ranges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> BridgeResult<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(invalid_argument(
                "Latitude must be between -90 and 90 degrees.",
            ));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(invalid_argument(
                "Longitude must be between -180 and 180 degrees.",
            ));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_coordinates() {
        let point = GeoPoint::new(45.5, -122.6).unwrap();
        assert_eq!(point.latitude(), 45.5);
        assert_eq!(point.longitude(), -122.6);
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        let err = GeoPoint::new(0.0, 200.0).unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }
}
