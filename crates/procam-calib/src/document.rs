use std::fs;
use std::path::Path;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// File-level failures while reading or writing a calibration document.
#[derive(thiserror::Error, Debug)]
pub enum DocumentError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failures while serializing a calibration.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    /// The calibration is incomplete; nothing was written. Serializing an
    /// invalid calibration is a checked error, not an assertion, so callers
    /// can surface it without corrupting the target document.
    #[error("calibration `{kind}` is not valid and cannot be serialized")]
    NotValid { kind: &'static str },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Failures while loading a calibration from a document.
///
/// Loading never corrupts the in-memory calibration: fields are only
/// committed once the whole node parsed.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationLoadError {
    #[error("missing calibration node `{key}`")]
    MissingNode { key: &'static str },

    #[error("malformed calibration node `{key}`: {source}")]
    MalformedNode {
        key: &'static str,
        source: serde_json::Error,
    },

    #[error("no device with index {index} in the calibration document (count {count})")]
    DeviceIndexOutOfRange { index: usize, count: usize },

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// A hierarchical calibration document: named top-level nodes, each an
/// arbitrary JSON subtree owned by one calibration variant.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalibrationDocument {
    nodes: Map<String, Value>,
}

impl CalibrationDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn has_node(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    /// Serialize `node` under `key`, replacing any previous node.
    pub fn insert_node<T: Serialize>(&mut self, key: &str, node: &T) -> Result<(), CalibrationError> {
        let value = serde_json::to_value(node)?;
        self.nodes.insert(key.to_owned(), value);
        Ok(())
    }

    /// Two-phase node access: locate the node by its fixed key, then
    /// populate the typed representation.
    pub fn node<T: DeserializeOwned>(&self, key: &'static str) -> Result<T, CalibrationLoadError> {
        let Some(value) = self.nodes.get(key) else {
            debug!("calibration node `{key}` not found in document");
            return Err(CalibrationLoadError::MissingNode { key });
        };
        serde_json::from_value(value.clone()).map_err(|source| {
            debug!("calibration node `{key}` failed to parse: {source}");
            CalibrationLoadError::MalformedNode { key, source }
        })
    }

    /// Merge every node of `other` into this document, node-wise, replacing
    /// nodes that share a key.
    pub fn merge_from(&mut self, other: &CalibrationDocument) {
        for (key, value) in &other.nodes {
            self.nodes.insert(key.clone(), value.clone());
        }
    }

    /// Load a document from pretty or compact JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let raw = fs::read_to_string(path)?;
        let nodes = serde_json::from_str(&raw)?;
        Ok(Self { nodes })
    }

    /// Write this document to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let json = serde_json::to_string_pretty(&self.nodes)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// A named calibration fragment that can be validated, persisted into a
/// [`CalibrationDocument`], and reloaded from one.
pub trait Calibration {
    /// Whether the calibration is complete enough to persist.
    fn is_valid(&self) -> bool;

    /// Write this calibration's node(s) into the document. Must fail with
    /// [`CalibrationError::NotValid`] when `is_valid()` is false, leaving
    /// the document untouched.
    fn serialize_into(&self, doc: &mut CalibrationDocument) -> Result<(), CalibrationError>;

    /// Populate this calibration from the document's node(s).
    fn deserialize_from(&mut self, doc: &CalibrationDocument) -> Result<(), CalibrationLoadError>;

    /// Persist into a fresh document at `path`.
    fn save_to(&self, path: impl AsRef<Path>) -> Result<(), CalibrationError>
    where
        Self: Sized,
    {
        let mut doc = CalibrationDocument::new();
        self.serialize_into(&mut doc)?;
        doc.write_json(path).map_err(CalibrationError::from)
    }

    /// Replace this calibration's node(s) inside an existing document file,
    /// preserving unrelated nodes.
    fn replace_in(&self, path: impl AsRef<Path>) -> Result<(), CalibrationError>
    where
        Self: Sized,
    {
        let mut doc = CalibrationDocument::load_json(&path)?;
        self.serialize_into(&mut doc)?;
        doc.write_json(path).map_err(CalibrationError::from)
    }

    /// Load from a document file at `path`.
    fn load_from(&mut self, path: impl AsRef<Path>) -> Result<(), CalibrationLoadError>
    where
        Self: Sized,
    {
        let doc = CalibrationDocument::load_json(path)?;
        self.deserialize_from(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Probe {
        value: f64,
    }

    #[test]
    fn missing_node_names_the_key() {
        let doc = CalibrationDocument::new();
        let err = doc.node::<Probe>("Plane").unwrap_err();
        assert!(matches!(err, CalibrationLoadError::MissingNode { key: "Plane" }));
        assert!(err.to_string().contains("Plane"));
    }

    #[test]
    fn insert_then_read_round_trips() {
        let mut doc = CalibrationDocument::new();
        doc.insert_node("Probe", &Probe { value: 2.5 }).expect("serializable");
        assert_eq!(doc.node::<Probe>("Probe").expect("present"), Probe { value: 2.5 });
    }

    #[test]
    fn malformed_node_reports_key() {
        let mut doc = CalibrationDocument::new();
        doc.insert_node("Probe", &"not an object").expect("serializable");
        let err = doc.node::<Probe>("Probe").unwrap_err();
        assert!(matches!(err, CalibrationLoadError::MalformedNode { key: "Probe", .. }));
    }

    #[test]
    fn failed_node_lookup_emits_a_debug_record() {
        use log::{Level, LevelFilter, Log, Metadata, Record};
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingLogger {
            debug_records: AtomicUsize,
        }

        impl Log for CountingLogger {
            fn enabled(&self, _metadata: &Metadata) -> bool {
                true
            }

            fn log(&self, record: &Record) {
                if record.level() == Level::Debug {
                    self.debug_records.fetch_add(1, Ordering::SeqCst);
                }
            }

            fn flush(&self) {}
        }

        static LOGGER: CountingLogger = CountingLogger {
            debug_records: AtomicUsize::new(0),
        };

        log::set_logger(&LOGGER).expect("only logger in this test binary");
        log::set_max_level(LevelFilter::Debug);

        let doc = CalibrationDocument::new();
        assert!(doc.node::<Probe>("Plane").is_err());
        assert!(LOGGER.debug_records.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn merge_replaces_shared_keys_and_keeps_others() {
        let mut a = CalibrationDocument::new();
        a.insert_node("Keep", &Probe { value: 1.0 }).expect("ok");
        a.insert_node("Shared", &Probe { value: 1.0 }).expect("ok");

        let mut b = CalibrationDocument::new();
        b.insert_node("Shared", &Probe { value: 9.0 }).expect("ok");

        a.merge_from(&b);
        assert_eq!(a.node::<Probe>("Keep").expect("kept").value, 1.0);
        assert_eq!(a.node::<Probe>("Shared").expect("merged").value, 9.0);
    }
}
