//! Broadcast bus primitives.
//!
//! A [`Broadcast`] is the unit every endpoint exchanges with the coordinator.
//! Global broadcasts (no destination) are facts about the system and end up in
//! the snapshot; targeted broadcasts are routed to whoever owns the target.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Value carried by a broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Pair(f64, f64),
    Text(String),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Pair(a, b) => write!(f, "{},{}", a, b),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

/// One message on the bus. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    destination: Option<String>,
    prop: String,
    value: Value,
}

impl Broadcast {
    /// A global state fact keyed by `prop`
    pub fn global(prop: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            destination: None,
            prop: prop.into(),
            value: value.into(),
        }
    }

    /// A message for whoever owns `destination`
    pub fn targeted(
        destination: impl Into<String>,
        prop: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            destination: Some(destination.into()),
            prop: prop.into(),
            value: value.into(),
        }
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn prop(&self) -> &str {
        &self.prop
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_global(&self) -> bool {
        self.destination.is_none()
    }

    /// True for a targeted message matching both `destination` and `prop`
    pub fn is_for(&self, destination: &str, prop: &str) -> bool {
        self.destination.as_deref() == Some(destination) && self.prop == prop
    }
}

impl fmt::Display for Broadcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.destination {
            Some(dest) => write!(f, "{}/{}={}", dest, self.prop, self.value),
            None => write!(f, "*/{}={}", self.prop, self.value),
        }
    }
}

/// Outbound broadcast queue of a single endpoint.
///
/// Any thread may push; the coordinator drains without blocking.
pub struct Outbox {
    tx: mpsc::UnboundedSender<Broadcast>,
    rx: Mutex<mpsc::UnboundedReceiver<Broadcast>>,
}

impl Outbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn push(&self, message: Broadcast) {
        // The receiver lives as long as `self`, so this cannot fail.
        let _ = self.tx.send(message);
    }

    /// A cloneable handle for producers living on another thread
    pub fn sender(&self) -> mpsc::UnboundedSender<Broadcast> {
        self.tx.clone()
    }

    /// Take everything queued so far, oldest first
    pub fn drain(&self) -> Vec<Broadcast> {
        let mut rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut drained = Vec::new();
        while let Ok(message) = rx.try_recv() {
            drained.push(message);
        }
        drained
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_and_targeted() {
        let g = Broadcast::global("Temperature", 21.7);
        assert!(g.is_global());
        assert_eq!(g.value().as_number(), Some(21.7));

        let t = Broadcast::targeted("Light:1", "Mode", "Cff0000");
        assert!(!t.is_global());
        assert!(t.is_for("Light:1", "Mode"));
        assert!(!t.is_for("Light:2", "Mode"));
        assert!(!t.is_for("Light:1", "State"));
    }

    #[test]
    fn test_outbox_is_fifo_and_empty_is_not_an_error() {
        let outbox = Outbox::new();
        assert!(outbox.drain().is_empty());

        outbox.push(Broadcast::global("A", 1.0));
        outbox.sender().send(Broadcast::global("B", 2.0)).unwrap();
        outbox.push(Broadcast::global("C", 3.0));

        let props: Vec<_> = outbox.drain().iter().map(|b| b.prop().to_string()).collect();
        assert_eq!(props, ["A", "B", "C"]);
        assert!(outbox.drain().is_empty());
    }

    #[test]
    fn test_value_json_shape() {
        assert_eq!(serde_json::to_string(&Value::Number(21.7)).unwrap(), "21.7");
        assert_eq!(serde_json::to_string(&Value::Pair(1.5, -2.0)).unwrap(), "[1.5,-2.0]");
        assert_eq!(serde_json::to_string(&Value::from("IO")).unwrap(), "\"IO\"");
    }
}
