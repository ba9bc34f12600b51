use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

use super::value::{Feature, Value};

#[derive(Debug, thiserror::Error)]
pub enum FeatureSourceError {
    #[error("failed to read feature source: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("expected a Feature or FeatureCollection, found '{0}'")]
    UnsupportedType(String),
    #[error("FeatureCollection is missing a 'features' array")]
    MissingFeatures,
}

/// Ordered set of features loaded from GeoJSON or a CSV table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "JsonValue")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Load by extension: `.csv` as a table, anything else as GeoJSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FeatureSourceError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            Self::from_csv_reader(reader)
        } else {
            Self::from_geojson_reader(reader)
        }
    }

    pub fn from_geojson_reader<R: Read>(reader: R) -> Result<Self, FeatureSourceError> {
        let document: JsonValue = serde_json::from_reader(reader)?;
        Self::from_geojson(document)
    }

    /// Accepts a `FeatureCollection` or a lone `Feature`.
    pub fn from_geojson(document: JsonValue) -> Result<Self, FeatureSourceError> {
        let kind = document
            .get("type")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        match kind.as_str() {
            "FeatureCollection" => {
                let features = document
                    .get("features")
                    .and_then(JsonValue::as_array)
                    .ok_or(FeatureSourceError::MissingFeatures)?;
                Ok(Self::new(features.iter().map(feature_from_json).collect()))
            }
            "Feature" => Ok(Self::new(vec![feature_from_json(&document)])),
            _ => Err(FeatureSourceError::UnsupportedType(kind)),
        }
    }

    /// Each row becomes a feature without geometry; cells stay text until classified.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, FeatureSourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let headers = reader.headers()?.clone();

        let mut features = Vec::new();
        for record in reader.records() {
            let record = record?;
            let properties = headers
                .iter()
                .zip(record.iter())
                .map(|(header, cell)| {
                    let value = if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::Text(cell.to_string())
                    };
                    (header.to_string(), value)
                })
                .collect();
            features.push(Feature::new(properties));
        }
        Ok(Self::new(features))
    }
}

impl TryFrom<JsonValue> for FeatureCollection {
    type Error = FeatureSourceError;

    fn try_from(document: JsonValue) -> Result<Self, Self::Error> {
        Self::from_geojson(document)
    }
}

impl Serialize for FeatureCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FeatureCollection", 2)?;
        state.serialize_field("type", "FeatureCollection")?;
        state.serialize_field("features", &self.features)?;
        state.end()
    }
}

// ArcGIS exports put the columns under "attributes" instead of "properties".
fn feature_from_json(raw: &JsonValue) -> Feature {
    let properties = [raw.get("properties"), raw.get("attributes")]
        .into_iter()
        .flatten()
        .filter_map(JsonValue::as_object)
        .find(|object| !object.is_empty())
        .map(|object| {
            object
                .iter()
                .map(|(key, value)| (key.clone(), Value::from(value.clone())))
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    Feature {
        properties,
        geometry: raw.get("geometry").cloned().unwrap_or(JsonValue::Null),
    }
}
