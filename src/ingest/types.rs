use serde::Deserialize;

/// One value list as posted by collectd's `write_http` plugin in JSON format.
///
/// Missing keys decode to their empty value; a key holding the wrong JSON
/// type fails the whole body. collectd writes NaN samples as `null`, so a
/// sample may be absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ValueList {
    pub values: Vec<Option<f64>>,
    pub dstypes: Vec<String>,
    pub dsnames: Vec<String>,
    pub time: f64,
    pub interval: f64,
    pub host: String,
    pub plugin: String,
    pub plugin_instance: String,
    pub r#type: String,
    pub type_instance: String,
}
