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

//! Per message output records.
//!
//! A record is an ordered map built from a [`Message`]. It is printed either as a
//! python literal dict or as JSON.

use crate::error::{Error, Result};
use crate::message::{
    Body, Destination, Message, PropertyValue, AMQP_CONTENT_ENCODING, AMQP_CONTENT_TYPE,
    AMQP_FIRST_ACQUIRER, AMQP_REPLY_TO_GROUP_ID, AMQP_SUBJECT, JMSX_GROUP_ID, JMSX_GROUP_SEQ,
    JMSX_USER_ID,
};
use crate::options::{ClientOptions, LOG_MSGS, MSG_CONTENT_HASHED, OUT};
use serde_json::{Map, Number, Value};
use sha1::{Digest, Sha1};

const ID_PREFIX: &str = "ID:";

/// Which fields a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMsgs {
    Dict,
    Body,
    Interop,
    Json,
    Upstream,
    None,
}

impl LogMsgs {
    pub fn parse(value: &str) -> Result<LogMsgs> {
        match value.to_lowercase().as_str() {
            "dict" => Ok(LogMsgs::Dict),
            "body" => Ok(LogMsgs::Body),
            "interop" => Ok(LogMsgs::Interop),
            "json" => Ok(LogMsgs::Json),
            "upstream" => Ok(LogMsgs::Upstream),
            "none" => Ok(LogMsgs::None),
            other => Err(Error::config(format!("unknown log-msgs style '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutFormat {
    Repr,
    Json,
}

impl OutFormat {
    pub fn parse(value: &str) -> Result<OutFormat> {
        match value.to_lowercase().as_str() {
            "repr" => Ok(OutFormat::Repr),
            "json" => Ok(OutFormat::Json),
            other => Err(Error::config(format!("unknown out format '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageFormatter {
    style: LogMsgs,
    out: OutFormat,
    hash_content: bool,
}

impl MessageFormatter {
    pub fn new(style: LogMsgs, out: OutFormat, hash_content: bool) -> Self {
        MessageFormatter {
            style,
            out,
            hash_content,
        }
    }

    pub fn from_options(options: &ClientOptions) -> Result<Self> {
        Ok(Self::new(
            LogMsgs::parse(options.value(LOG_MSGS))?,
            OutFormat::parse(options.value(OUT))?,
            options.bool_value(MSG_CONTENT_HASHED),
        ))
    }

    /// The printable record for `msg`, or `None` when messages are not reported.
    pub fn format(&self, msg: &Message) -> Option<String> {
        let record = match self.style {
            LogMsgs::Dict => self.dict(msg),
            LogMsgs::Body => self.body(msg),
            LogMsgs::Interop | LogMsgs::Json => self.interop(msg),
            LogMsgs::Upstream | LogMsgs::None => return None,
        };
        let record = Value::Object(record);
        if self.style == LogMsgs::Json || self.out == OutFormat::Json {
            Some(record.to_string())
        } else {
            Some(to_repr(&record))
        }
    }

    pub fn body(&self, msg: &Message) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("content".into(), self.content(msg));
        record
    }

    /// Every known field plus `redelivered`.
    pub fn dict(&self, msg: &Message) -> Map<String, Value> {
        let mut record = self.common(msg);
        record.insert("redelivered".into(), Value::Bool(msg.redelivered));
        record
    }

    /// Fields comparable across clients, with `ID:` prefixes removed.
    pub fn interop(&self, msg: &Message) -> Map<String, Value> {
        let mut record = self.common(msg);
        let delivery_count = (msg.delivery_count() - 1).max(0);
        record.insert("delivery-count".into(), Value::from(delivery_count));
        let first_acquirer = msg
            .property(AMQP_FIRST_ACQUIRER)
            .and_then(PropertyValue::as_bool)
            .unwrap_or(false);
        record.insert("first-acquirer".into(), Value::Bool(first_acquirer));
        for key in ["id", "user-id", "correlation-id"] {
            if let Some(Value::String(s)) = record.get_mut(key) {
                if let Some(stripped) = s.strip_prefix(ID_PREFIX) {
                    *s = stripped.to_string();
                }
            }
        }
        record
    }

    fn common(&self, msg: &Message) -> Map<String, Value> {
        let string_prop = |name: &str| msg.string_property(name).map_or(Value::Null, Value::String);
        let group_sequence = msg
            .property(JMSX_GROUP_SEQ)
            .and_then(PropertyValue::as_i64)
            .unwrap_or(0);

        let mut record = Map::new();
        record.insert("durable".into(), Value::Bool(msg.durable));
        record.insert("priority".into(), Value::from(msg.priority));
        record.insert("ttl".into(), Value::from(msg.ttl()));
        record.insert("id".into(), optional_string(msg.id.as_deref()));
        record.insert("user-id".into(), string_prop(JMSX_USER_ID));
        record.insert("address".into(), address(msg.destination.as_ref()));
        record.insert(
            "subject".into(),
            msg.property(AMQP_SUBJECT).map_or(Value::Null, property_value),
        );
        record.insert("reply-to".into(), address(msg.reply_to.as_ref()));
        record.insert(
            "correlation-id".into(),
            optional_string(msg.correlation_id.as_deref()),
        );
        record.insert("content-type".into(), string_prop(AMQP_CONTENT_TYPE));
        record.insert("content-encoding".into(), string_prop(AMQP_CONTENT_ENCODING));
        record.insert("absolute-expiry-time".into(), Value::from(msg.expiration));
        record.insert("creation-time".into(), Value::from(msg.timestamp));
        record.insert("group-id".into(), string_prop(JMSX_GROUP_ID));
        record.insert("group-sequence".into(), Value::from(group_sequence));
        record.insert("reply-to-group-id".into(), string_prop(AMQP_REPLY_TO_GROUP_ID));
        record.insert("properties".into(), Value::Object(properties(msg)));
        record.insert("content".into(), self.content(msg));
        record.insert("type".into(), optional_string(msg.jms_type.as_deref()));
        record
    }

    fn content(&self, msg: &Message) -> Value {
        let content = body_value(&msg.body);
        if !self.hash_content || content.is_null() {
            return content;
        }
        let text = match &content {
            Value::String(s) => s.clone(),
            other => to_repr(other),
        };
        Value::String(hash(&text))
    }
}

fn optional_string(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.to_string()))
}

fn address(destination: Option<&Destination>) -> Value {
    destination.map_or(Value::Null, |d| Value::String(d.name.clone()))
}

fn properties(msg: &Message) -> Map<String, Value> {
    msg.application_properties()
        .map(|(k, v)| (k.clone(), property_value(v)))
        .collect()
}

pub fn property_value(value: &PropertyValue) -> Value {
    match value {
        // through the shortest decimal form so 1.1f stays 1.1
        PropertyValue::Float(v) => v
            .to_string()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number),
        other => serde_json::to_value(other).unwrap_or(Value::Null),
    }
}

pub fn body_value(body: &Body) -> Value {
    match body {
        Body::Empty => Value::Null,
        Body::Text(text) => Value::String(text.clone()),
        Body::Bytes(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        Body::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), property_value(v)))
                .collect(),
        ),
        Body::Stream(items) => Value::Array(items.iter().map(property_value).collect()),
        Body::Object(value) => property_value(value),
    }
}

/// SHA-1 of `text` as lowercase hex without leading zeros.
pub fn hash(text: &str) -> String {
    let digest = Sha1::digest(text.as_bytes());
    let encoded = hex::encode(digest);
    let trimmed = encoded.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Renders a value as a python literal.
pub fn to_repr(value: &Value) -> String {
    let mut out = String::new();
    write_repr(value, &mut out);
    out
}

fn write_repr(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => out.push_str(&i.to_string()),
            (None, Some(u), _) => out.push_str(&u.to_string()),
            (None, None, Some(f)) => out.push_str(&format!("{:?}", f as f32)),
            _ => out.push_str(&n.to_string()),
        },
        Value::String(s) => write_repr_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr_string(key, out);
                out.push_str(": ");
                write_repr(item, out);
            }
            out.push('}');
        }
    }
}

fn write_repr_string(s: &str, out: &mut String) {
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('\'');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::JMSX_DELIVERY_COUNT;
    use serde_json::json;

    fn sample() -> Message {
        let mut msg = Message::new(Body::Text("hello".into()));
        msg.id = Some("ID:abc".into());
        msg.correlation_id = Some("ID:corr".into());
        msg.destination = Some(Destination::queue("orders"));
        msg.reply_to = Some(Destination::topic("replies"));
        msg.durable = true;
        msg.timestamp = 1_000;
        msg.expiration = 6_000;
        msg.set_property("color", PropertyValue::String("red".into()));
        msg.set_property(JMSX_DELIVERY_COUNT, PropertyValue::Int(2));
        msg.set_property(JMSX_GROUP_SEQ, PropertyValue::Int(3));
        msg
    }

    #[test]
    fn repr_literals() {
        let value = json!({"a": null, "b": true, "c": [1, 2.5], "d": "it's\n"});
        assert_eq!(to_repr(&value), r"{'a': None, 'b': True, 'c': [1, 2.5], 'd': 'it\'s\n'}");
    }

    #[test]
    fn dict_record_has_every_field_in_order() {
        let formatter = MessageFormatter::new(LogMsgs::Dict, OutFormat::Repr, false);
        let record = formatter.dict(&sample());
        let keys: Vec<_> = record.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            [
                "durable", "priority", "ttl", "id", "user-id", "address", "subject", "reply-to",
                "correlation-id", "content-type", "content-encoding", "absolute-expiry-time",
                "creation-time", "group-id", "group-sequence", "reply-to-group-id", "properties",
                "content", "type", "redelivered",
            ]
        );
        assert_eq!(record["ttl"], json!(5_000));
        assert_eq!(record["address"], json!("orders"));
        assert_eq!(record["reply-to"], json!("replies"));
        assert_eq!(record["id"], json!("ID:abc"));
        assert_eq!(record["properties"], json!({"color": "red"}));
        assert_eq!(record["group-sequence"], json!(3));
    }

    #[test]
    fn interop_strips_id_prefix_and_counts_deliveries() {
        let formatter = MessageFormatter::new(LogMsgs::Interop, OutFormat::Repr, false);
        let record = formatter.interop(&sample());
        assert_eq!(record["id"], json!("abc"));
        assert_eq!(record["correlation-id"], json!("corr"));
        assert_eq!(record["delivery-count"], json!(1));
        assert_eq!(record["first-acquirer"], json!(false));
        assert!(record.get("redelivered").is_none());
    }

    #[test]
    fn body_style_prints_content_only() {
        let formatter = MessageFormatter::new(LogMsgs::Body, OutFormat::Repr, false);
        assert_eq!(formatter.format(&sample()).unwrap(), "{'content': 'hello'}");
        let json = MessageFormatter::new(LogMsgs::Body, OutFormat::Json, false);
        assert_eq!(json.format(&sample()).unwrap(), r#"{"content":"hello"}"#);
    }

    #[test]
    fn upstream_prints_nothing() {
        let formatter = MessageFormatter::new(LogMsgs::Upstream, OutFormat::Repr, false);
        assert!(formatter.format(&sample()).is_none());
    }

    #[test]
    fn json_style_is_interop_as_json() {
        let formatter = MessageFormatter::new(LogMsgs::Json, OutFormat::Repr, false);
        let line = formatter.format(&sample()).unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["id"], json!("abc"));
    }

    #[test]
    fn hashed_content() {
        assert_eq!(hash("hello"), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        let formatter = MessageFormatter::new(LogMsgs::Body, OutFormat::Repr, true);
        assert_eq!(
            formatter.format(&sample()).unwrap(),
            "{'content': 'aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d'}"
        );
    }

    #[test]
    fn float_content_prints_short_form() {
        let formatter = MessageFormatter::new(LogMsgs::Body, OutFormat::Repr, false);
        let msg = Message::new(Body::Object(PropertyValue::Float(1.1)));
        assert_eq!(formatter.format(&msg).unwrap(), "{'content': 1.1}");
        let msg = Message::new(Body::Stream(vec![PropertyValue::Float(2.0), PropertyValue::Bool(true)]));
        assert_eq!(formatter.format(&msg).unwrap(), "{'content': [2.0, True]}");
    }

    #[test]
    fn property_values_keep_their_json_type() {
        assert_eq!(property_value(&PropertyValue::Int(-3)), json!(-3));
        assert_eq!(property_value(&PropertyValue::Long(1 << 40)), json!(1_099_511_627_776_i64));
        assert_eq!(property_value(&PropertyValue::Float(1.1)), json!(1.1));
        assert_eq!(property_value(&PropertyValue::Double(0.5)), json!(0.5));
        assert_eq!(property_value(&PropertyValue::Double(f64::NAN)), Value::Null);
        assert_eq!(property_value(&PropertyValue::Bool(false)), json!(false));
        assert_eq!(property_value(&PropertyValue::String("red".into())), json!("red"));
    }

    #[test]
    fn unknown_styles_are_rejected() {
        assert!(LogMsgs::parse("xml").is_err());
        assert!(OutFormat::parse("yaml").is_err());
        assert_eq!(LogMsgs::parse("DICT").unwrap(), LogMsgs::Dict);
    }
}
