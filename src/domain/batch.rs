use crate::domain::Point;

/// Points derived from one request, addressed to one database.
///
/// Points keep the order they were added in; duplicates are kept as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    database: String,
    points: Vec<Point>,
}

impl Batch {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            points: Vec::new(),
        }
    }

    pub fn add_point(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Newline separated line protocol body for the write endpoint.
    pub fn to_line_protocol(&self) -> String {
        self.points
            .iter()
            .map(Point::to_line_protocol)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
