//! Main file (`.shp`) and index (`.shx`) encoding
//!
//! Header and record-header integers are big-endian, everything else is
//! little-endian. Lengths and offsets are counted in 16-bit words.

use geo::{BoundingRect, Geometry, GeometryCollection, MultiLineString, Point, Rect};

use crate::{GeoKitError, Result};

const FILE_CODE: i32 = 9994;
const VERSION: i32 = 1000;
const HEADER_LEN: usize = 100;
const RECORD_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeType {
    Point = 1,
    PolyLine = 3,
    Polygon = 5,
}

impl ShapeType {
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// One record's geometry, `x` = longitude and `y` = latitude
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point(Point<f64>),
    /// Parts of a polyline, or rings of a polygon
    Parts(MultiLineString<f64>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        BoundingBox {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        }
    }
}

impl BoundingBox {
    fn write_le(&self, out: &mut Vec<u8>) {
        for v in [self.min_x, self.min_y, self.max_x, self.max_y] {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}

impl Shape {
    #[must_use]
    pub fn bbox(&self) -> Option<BoundingBox> {
        match self {
            Shape::Point(point) => Some(point.bounding_rect().into()),
            Shape::Parts(parts) => parts.bounding_rect().map(BoundingBox::from),
        }
    }

    fn to_geometry(&self) -> Geometry<f64> {
        match self {
            Shape::Point(point) => Geometry::Point(*point),
            Shape::Parts(parts) => Geometry::MultiLineString(parts.clone()),
        }
    }

    fn num_points(&self) -> usize {
        match self {
            Shape::Point(_) => 1,
            Shape::Parts(parts) => parts.0.iter().map(|part| part.0.len()).sum(),
        }
    }

    /// Content length in bytes, without the record header
    fn content_len(&self) -> usize {
        match self {
            Shape::Point(..) => 4 + 16,
            Shape::Parts(parts) => 4 + 32 + 4 + 4 + 4 * parts.0.len() + 16 * self.num_points(),
        }
    }

    fn matches(&self, shape_type: ShapeType) -> bool {
        matches!(
            (self, shape_type),
            (Shape::Point(..), ShapeType::Point)
                | (Shape::Parts(_), ShapeType::PolyLine | ShapeType::Polygon)
        )
    }

    fn write_content(&self, shape_type: ShapeType, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&shape_type.code().to_le_bytes());
        match self {
            Shape::Point(point) => {
                out.extend_from_slice(&point.x().to_le_bytes());
                out.extend_from_slice(&point.y().to_le_bytes());
            }
            Shape::Parts(parts) => {
                let bbox = self
                    .bbox()
                    .ok_or_else(|| GeoKitError::validation("shape without points"))?;
                bbox.write_le(out);

                out.extend_from_slice(&to_i32(parts.0.len())?.to_le_bytes());
                out.extend_from_slice(&to_i32(self.num_points())?.to_le_bytes());

                let mut start = 0;
                for part in &parts.0 {
                    out.extend_from_slice(&to_i32(start)?.to_le_bytes());
                    start += part.0.len();
                }
                for coord in parts.0.iter().flat_map(|part| part.coords()) {
                    out.extend_from_slice(&coord.x.to_le_bytes());
                    out.extend_from_slice(&coord.y.to_le_bytes());
                }
            }
        }
        Ok(())
    }
}

fn to_i32(value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| GeoKitError::validation("shapefile exceeds the 2 GB format limit"))
}

fn words(bytes: usize) -> Result<i32> {
    to_i32(bytes / 2)
}

fn write_header(out: &mut Vec<u8>, shape_type: ShapeType, file_len: usize, bbox: BoundingBox) -> Result<()> {
    out.extend_from_slice(&FILE_CODE.to_be_bytes());
    out.extend_from_slice(&[0u8; 20]);
    out.extend_from_slice(&words(file_len)?.to_be_bytes());
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&shape_type.code().to_le_bytes());
    bbox.write_le(out);
    // Z and M ranges
    out.extend_from_slice(&[0u8; 32]);
    Ok(())
}

/// Encode shapes into `(shp, shx)` byte buffers
pub fn encode(shape_type: ShapeType, shapes: &[Shape]) -> Result<(Vec<u8>, Vec<u8>)> {
    if let Some(bad) = shapes.iter().position(|s| !s.matches(shape_type)) {
        return Err(GeoKitError::validation(format!(
            "shape {} does not match layer type {:?}",
            bad + 1,
            shape_type
        )));
    }

    let layer: GeometryCollection<f64> = shapes.iter().map(Shape::to_geometry).collect();
    let bbox = layer
        .bounding_rect()
        .map(BoundingBox::from)
        .unwrap_or(BoundingBox {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 0.0,
            max_y: 0.0,
        });

    let shp_len = HEADER_LEN
        + shapes
            .iter()
            .map(|s| RECORD_HEADER_LEN + s.content_len())
            .sum::<usize>();
    let shx_len = HEADER_LEN + RECORD_HEADER_LEN * shapes.len();

    let mut shp = Vec::with_capacity(shp_len);
    let mut shx = Vec::with_capacity(shx_len);
    write_header(&mut shp, shape_type, shp_len, bbox)?;
    write_header(&mut shx, shape_type, shx_len, bbox)?;

    for (i, shape) in shapes.iter().enumerate() {
        let offset = shp.len();
        let content_len = shape.content_len();

        shp.extend_from_slice(&to_i32(i + 1)?.to_be_bytes());
        shp.extend_from_slice(&words(content_len)?.to_be_bytes());
        shape.write_content(shape_type, &mut shp)?;

        shx.extend_from_slice(&words(offset)?.to_be_bytes());
        shx.extend_from_slice(&words(content_len)?.to_be_bytes());
    }

    debug_assert_eq!(shp.len(), shp_len);
    Ok((shp, shx))
}
