/*
   mqe clients (OSS)

   Copyright 2024 Carnegie Mellon University.

   NO WARRANTY. THIS CARNEGIE MELLON UNIVERSITY AND SOFTWARE ENGINEERING INSTITUTE MATERIAL IS
   FURNISHED ON AN "AS-IS" BASIS. CARNEGIE MELLON UNIVERSITY MAKES NO WARRANTIES OF ANY KIND,
   EITHER EXPRESSED OR IMPLIED, AS TO ANY MATTER INCLUDING, BUT NOT LIMITED TO, WARRANTY OF FITNESS
   FOR PURPOSE OR MERCHANTABILITY, EXCLUSIVITY, OR RESULTS OBTAINED FROM USE OF THE MATERIAL.
   CARNEGIE MELLON UNIVERSITY DOES NOT MAKE ANY WARRANTY OF ANY KIND WITH RESPECT TO FREEDOM FROM
   PATENT, TRADEMARK, OR COPYRIGHT INFRINGEMENT.

   Licensed under a MIT-style license, please see license.txt or contact permission@sei.cmu.edu for
   full terms.

   [DISTRIBUTION STATEMENT A] This material has been approved for public release and unlimited
   distribution.  Please see Copyright notice for non-US Government use and distribution.

   This Software includes and/or makes use of Third-Party Software each subject to its own license.

   DM24-0470
*/

//! Protocol neutral message model shared by providers, transports and the formatter.

use serde::Serialize;
use std::fmt;

pub const QUEUE_PREFIX: &str = "queue://";
pub const TOPIC_PREFIX: &str = "topic://";
pub const TEMP_QUEUE_PREFIX: &str = "temp-queue://";

pub const JMSX_USER_ID: &str = "JMSXUserID";
pub const JMSX_GROUP_ID: &str = "JMSXGroupID";
pub const JMSX_GROUP_SEQ: &str = "JMSXGroupSeq";
pub const JMSX_DELIVERY_COUNT: &str = "JMSXDeliveryCount";
pub const AMQP_SUBJECT: &str = "JMS_AMQP_Subject";
pub const AMQP_CONTENT_TYPE: &str = "JMS_AMQP_ContentType";
pub const AMQP_CONTENT_ENCODING: &str = "JMS_AMQP_ContentEncoding";
pub const AMQP_REPLY_TO_GROUP_ID: &str = "JMS_AMQP_ReplyToGroupID";
pub const AMQP_FIRST_ACQUIRER: &str = "JMS_AMQP_FirstAcquirer";

/// Properties the transport manages itself; they are not reported as application properties.
pub const RESERVED_PROPERTIES: [&str; 9] = [
    JMSX_USER_ID,
    JMSX_GROUP_ID,
    JMSX_GROUP_SEQ,
    JMSX_DELIVERY_COUNT,
    AMQP_SUBJECT,
    AMQP_CONTENT_TYPE,
    AMQP_CONTENT_ENCODING,
    AMQP_REPLY_TO_GROUP_ID,
    AMQP_FIRST_ACQUIRER,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationKind {
    Queue,
    Topic,
    TemporaryQueue,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub kind: DestinationKind,
    pub name: String,
}

impl Destination {
    pub fn queue(name: impl Into<String>) -> Self {
        Destination {
            kind: DestinationKind::Queue,
            name: name.into(),
        }
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Destination {
            kind: DestinationKind::Topic,
            name: name.into(),
        }
    }

    pub fn temporary_queue(name: impl Into<String>) -> Self {
        Destination {
            kind: DestinationKind::TemporaryQueue,
            name: name.into(),
        }
    }

    /// `topic://name` is a topic, `queue://name` or a bare name is a queue.
    pub fn parse(address: &str) -> Self {
        if let Some(name) = address.strip_prefix(TOPIC_PREFIX) {
            Destination::topic(name)
        } else {
            Destination::queue(address.strip_prefix(QUEUE_PREFIX).unwrap_or(address))
        }
    }

    pub fn is_topic(&self) -> bool {
        self.kind == DestinationKind::Topic
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            DestinationKind::Queue => QUEUE_PREFIX,
            DestinationKind::Topic => TOPIC_PREFIX,
            DestinationKind::TemporaryQueue => TEMP_QUEUE_PREFIX,
        };
        write!(f, "{prefix}{}", self.name)
    }
}

/// A typed scalar carried in properties, map entries, list items and object bodies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    String(String),
}

impl PropertyValue {
    /// Name of the semantic type, as used by the content type hints.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Int(_) => "Integer",
            PropertyValue::Long(_) => "Long",
            PropertyValue::Float(_) => "Float",
            PropertyValue::Double(_) => "Double",
            PropertyValue::Bool(_) => "Boolean",
            PropertyValue::String(_) => "String",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(i64::from(*v)),
            PropertyValue::Long(v) => Some(*v),
            PropertyValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(v) => Some(f64::from(*v)),
            PropertyValue::Long(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(f64::from(*v)),
            PropertyValue::Double(v) => Some(*v),
            PropertyValue::String(s) => s.parse().ok(),
            PropertyValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            PropertyValue::String(s) => Some(s.eq_ignore_ascii_case("true")),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Long(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v:?}"),
            PropertyValue::Double(v) => write!(f, "{v:?}"),
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::String(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Map(Vec<(String, PropertyValue)>),
    Stream(Vec<PropertyValue>),
    Object(PropertyValue),
}

impl Body {
    pub fn kind(&self) -> &'static str {
        match self {
            Body::Empty => "empty",
            Body::Text(_) => "text",
            Body::Bytes(_) => "bytes",
            Body::Map(_) => "map",
            Body::Stream(_) => "stream",
            Body::Object(_) => "object",
        }
    }

    /// Raw bytes written when a body is saved to a file.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Body::Empty => Vec::new(),
            Body::Text(text) => text.as_bytes().to_vec(),
            Body::Bytes(bytes) => bytes.clone(),
            Body::Object(value) => value.to_string().into_bytes(),
            Body::Stream(items) => items
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
                .into_bytes(),
            Body::Map(entries) => entries
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("\n")
                .into_bytes(),
        }
    }
}

/// A message as seen by the clients.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub id: Option<String>,
    pub correlation_id: Option<String>,
    pub destination: Option<Destination>,
    pub reply_to: Option<Destination>,
    pub durable: bool,
    pub priority: i32,
    /// Absolute expiry in epoch milliseconds, 0 when the message never expires.
    pub expiration: i64,
    /// Creation time in epoch milliseconds, 0 when timestamps are disabled.
    pub timestamp: i64,
    pub redelivered: bool,
    pub jms_type: Option<String>,
    properties: Vec<(String, PropertyValue)>,
    pub body: Body,
}

impl Message {
    pub fn new(body: Body) -> Self {
        Message {
            priority: 4,
            body,
            ..Default::default()
        }
    }

    /// Sets a property, replacing an earlier value with the same name.
    pub fn set_property(&mut self, name: impl Into<String>, value: PropertyValue) {
        let name = name.into();
        match self.properties.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.properties.push((name, value)),
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn string_property(&self, name: &str) -> Option<String> {
        self.property(name).map(ToString::to_string)
    }

    pub fn properties(&self) -> &[(String, PropertyValue)] {
        &self.properties
    }

    /// Properties set by the application, without the transport managed ones.
    pub fn application_properties(&self) -> impl Iterator<Item = &(String, PropertyValue)> {
        self.properties
            .iter()
            .filter(|(k, _)| !RESERVED_PROPERTIES.contains(&k.as_str()))
    }

    pub fn delivery_count(&self) -> i64 {
        self.property(JMSX_DELIVERY_COUNT)
            .and_then(PropertyValue::as_i64)
            .unwrap_or(0)
    }

    /// Time to live derived from expiration and timestamp, 0 unless both are set.
    pub fn ttl(&self) -> i64 {
        if self.expiration != 0 && self.timestamp != 0 {
            self.expiration - self.timestamp
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_prefixes() {
        assert_eq!(Destination::parse("topic://news"), Destination::topic("news"));
        assert_eq!(Destination::parse("queue://orders"), Destination::queue("orders"));
        assert_eq!(Destination::parse("orders"), Destination::queue("orders"));
        assert_eq!(Destination::topic("news").to_string(), "topic://news");
    }

    #[test]
    fn set_property_replaces_existing_value() {
        let mut msg = Message::new(Body::Empty);
        msg.set_property("color", PropertyValue::String("red".into()));
        msg.set_property("color", PropertyValue::String("blue".into()));
        msg.set_property(JMSX_GROUP_ID, PropertyValue::String("g".into()));
        assert_eq!(msg.properties().len(), 2);
        assert_eq!(msg.string_property("color").as_deref(), Some("blue"));
        assert_eq!(msg.application_properties().count(), 1);
    }

    #[test]
    fn ttl_requires_timestamp_and_expiration() {
        let mut msg = Message::new(Body::Empty);
        msg.expiration = 1_500;
        assert_eq!(msg.ttl(), 0);
        msg.timestamp = 1_000;
        assert_eq!(msg.ttl(), 500);
    }

    #[test]
    fn float_display_keeps_fraction() {
        assert_eq!(PropertyValue::Float(1.0).to_string(), "1.0");
        assert_eq!(PropertyValue::Double(2.5).to_string(), "2.5");
        assert_eq!(PropertyValue::Int(7).to_string(), "7");
    }
}
