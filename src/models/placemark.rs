//! Placemark and geometry types produced by the KML parser

use serde::{Deserialize, Serialize};

use super::Coordinate;

/// A KML geometry, flattened out of any `MultiGeometry`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Coordinate),
    LineString(Vec<Coordinate>),
    Polygon {
        outer: Vec<Coordinate>,
        inner: Vec<Vec<Coordinate>>,
    },
}

impl Geometry {
    /// Short geometry label used in generated point names
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon { .. } => "Polygon",
        }
    }
}

/// A KML placemark with its own name, description and geometries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Placemark {
    pub name: Option<String>,
    pub description: Option<String>,
    pub geometries: Vec<Geometry>,
}

impl Placemark {
    pub fn points(&self) -> impl Iterator<Item = &Coordinate> {
        self.geometries.iter().filter_map(|g| match g {
            Geometry::Point(c) => Some(c),
            _ => None,
        })
    }

    pub fn line_strings(&self) -> impl Iterator<Item = &[Coordinate]> {
        self.geometries.iter().filter_map(|g| match g {
            Geometry::LineString(coords) => Some(coords.as_slice()),
            _ => None,
        })
    }

    pub fn polygons(&self) -> impl Iterator<Item = (&[Coordinate], &[Vec<Coordinate>])> {
        self.geometries.iter().filter_map(|g| match g {
            Geometry::Polygon { outer, inner } => Some((outer.as_slice(), inner.as_slice())),
            _ => None,
        })
    }

    /// Non-empty trimmed name, if any
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_accessors() {
        let placemark = Placemark {
            name: Some("  ".to_string()),
            description: None,
            geometries: vec![
                Geometry::Point(Coordinate::new(1.0, 2.0)),
                Geometry::LineString(vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)]),
            ],
        };

        assert_eq!(placemark.points().count(), 1);
        assert_eq!(placemark.line_strings().next().map(<[_]>::len), Some(2));
        assert_eq!(placemark.polygons().count(), 0);
        assert_eq!(placemark.display_name(), None);
    }
}
