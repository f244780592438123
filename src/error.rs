//! Error types and handling for `geokit`

use thiserror::Error;

/// Main error type for the `geokit` library
#[derive(Error, Debug)]
pub enum GeoKitError {
    /// Malformed content inside an otherwise readable file
    #[error("Parse error: {0}")]
    Parse(String),

    /// XML syntax errors reported by the KML reader
    #[error("XML error at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Input validation errors
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The input was readable but contained nothing to export
    #[error("{0}")]
    NoFeatures(String),

    /// Elevation service answered with an error or unusable payload
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Archive error: {source}")]
    Archive {
        #[from]
        source: zip::result::ZipError,
    },

    #[error("CSV error: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },
}

impl GeoKitError {
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn no_features<S: Into<String>>(message: S) -> Self {
        Self::NoFeatures(message.into())
    }

    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api(message.into())
    }

    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache(message.into())
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            GeoKitError::FileNotFound(path) => {
                format!("File not found: {path}. Please check the path and try again.")
            }
            GeoKitError::UnsupportedFormat(_) => {
                "File must be .kml or .kmz".to_string()
            }
            GeoKitError::Xml { .. } | GeoKitError::Parse(_) => {
                format!("Could not read the input file ({self})")
            }
            GeoKitError::Api(_) | GeoKitError::Network(_) => {
                "Unable to reach the elevation service. Please check your internet connection."
                    .to_string()
            }
            GeoKitError::Cache(_) => {
                "Cache operation failed. You may need to clear your cache.".to_string()
            }
            GeoKitError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
            GeoKitError::Validation(message) => format!("Invalid input: {message}"),
            GeoKitError::NoFeatures(message) | GeoKitError::Config(message) => message.clone(),
            GeoKitError::Archive { source } => format!("Invalid KMZ file: {source}"),
            GeoKitError::Csv { source } => format!("Invalid CSV file: {source}"),
        }
    }
}

impl From<quick_xml::Error> for GeoKitError {
    fn from(err: quick_xml::Error) -> Self {
        GeoKitError::Xml {
            position: 0,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = GeoKitError::validation("latitude out of range");
        assert!(matches!(err, GeoKitError::Validation(_)));

        let err = GeoKitError::no_features("No polygons found in KML file");
        assert_eq!(err.to_string(), "No polygons found in KML file");
    }

    #[test]
    fn test_user_messages() {
        let err = GeoKitError::UnsupportedFormat("data.gpx".to_string());
        assert_eq!(err.user_message(), "File must be .kml or .kmz");

        let err = GeoKitError::api("HTTP 500");
        assert!(err.user_message().contains("elevation service"));

        let err = GeoKitError::validation("row 3");
        assert!(err.user_message().contains("row 3"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: GeoKitError = io_err.into();
        assert!(matches!(err, GeoKitError::Io { .. }));
    }
}
