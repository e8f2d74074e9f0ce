//! The single output contract of the decoding core.
//!
//! Every decoded entity — packet, section, descriptor, PES unit,
//! codec-specific structure — describes itself as a labeled tree of
//! [`Node`]s. A tree view, a textual dumper and a test assertion all
//! consume the same shape.

use std::ops::Range;

/// Scalar value attached to a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Unsigned(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Unsigned(v as u64)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Unsigned(v as u64)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Unsigned(v as u64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Signed(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// Recoverable decode anomaly, attached to the smallest enclosing node.
///
/// None of these abort the pass; they exist so a viewer can show the
/// problem exactly where it occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum Anomaly {
    /// Continuity counter gap or duplicate on a channel.
    Continuity { expected: u8, got: u8 },
    /// Stored section CRC-32 does not match the computed one.
    CrcMismatch { stored: u32, computed: u32 },
    /// Declared length and bytes actually consumed disagree.
    LengthMismatch { declared: usize, consumed: usize },
    /// Input ended mid-structure.
    Truncated,
    /// No decoder variant matches this tag; raw bytes preserved.
    UnknownTag(u8),
    /// Bytes skipped while searching for a sync pattern.
    SyncLoss { skipped: usize },
}

/// A rendered preview image (subtitle bitmap, teletext page render).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixels, row-major.
    pub pixels: Vec<u8>,
}

/// One labeled entry in the decoded tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub label: String,
    pub value: Option<Value>,
    /// Human-readable annotation ("H.264 video", "running").
    pub note: Option<String>,
    /// Byte range in the capture this node was decoded from.
    pub raw: Option<Range<usize>>,
    pub image: Option<ImageRef>,
    pub anomalies: Vec<Anomaly>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(label: impl Into<String>) -> Self {
        Node {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Shorthand for a leaf with a value.
    pub fn leaf(label: impl Into<String>, value: impl Into<Value>) -> Self {
        Node::new(label).value(value)
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn raw(mut self, range: Range<usize>) -> Self {
        self.raw = Some(range);
        self
    }

    pub fn image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }

    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn anomaly(mut self, anomaly: Anomaly) -> Self {
        self.anomalies.push(anomaly);
        self
    }

    pub fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Depth-first search by label, for tests and exporters.
    pub fn find(&self, label: &str) -> Option<&Node> {
        if self.label == label {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(label))
    }

    /// True if this node or any descendant carries an anomaly.
    pub fn has_anomalies(&self) -> bool {
        !self.anomalies.is_empty() || self.children.iter().any(Node::has_anomalies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_and_find() {
        let node = Node::new("section")
            .value(0x42u8)
            .note("SDT")
            .child(Node::leaf("service_id", 0x2134u16))
            .child(Node::new("descriptors").child(Node::leaf("tag", 0x48u8)));

        assert_eq!(node.find("service_id").unwrap().value, Some(Value::Unsigned(0x2134)));
        assert_eq!(node.find("tag").unwrap().value, Some(Value::Unsigned(0x48)));
        assert!(node.find("missing").is_none());
    }

    #[test]
    fn test_anomaly_propagation() {
        let clean = Node::new("a").child(Node::new("b"));
        assert!(!clean.has_anomalies());

        let dirty = Node::new("a").child(Node::new("b").anomaly(Anomaly::Truncated));
        assert!(dirty.has_anomalies());
    }
}
