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

//! Typed values built from raw command line tokens.
//!
//! A token either names its type through an explicit hint, asks for inference with a
//! leading `~`, or stays a plain string. Map and property entries also carry a key,
//! split from the value on `=` or `~`.

use crate::error::{Error, Result};
use crate::message::PropertyValue;
use tracing::trace;

const RETYPE_MARKER: char = '~';
const FORCE_STRING_MARKER: &str = "~~";
const KEY_SEPARATOR: char = '=';

/// Semantic types a token can be coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    Long,
    Float,
    Double,
    Boolean,
    String,
}

impl ValueType {
    /// Order in which inference tries each type.
    pub const INFERENCE_ORDER: [ValueType; 6] = [
        ValueType::Integer,
        ValueType::Long,
        ValueType::Float,
        ValueType::Double,
        ValueType::Boolean,
        ValueType::String,
    ];

    /// Maps a user supplied type name onto a type. Unknown names are strings.
    pub fn normalize(name: &str) -> ValueType {
        match name.to_lowercase().as_str() {
            "int" | "integer" => ValueType::Integer,
            "long" => ValueType::Long,
            "float" => ValueType::Float,
            "double" => ValueType::Double,
            "bool" | "boolean" => ValueType::Boolean,
            _ => ValueType::String,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Integer => "Integer",
            ValueType::Long => "Long",
            ValueType::Float => "Float",
            ValueType::Double => "Double",
            ValueType::Boolean => "Boolean",
            ValueType::String => "String",
        }
    }

    /// Canonical string conversion, `None` when the token does not fit.
    pub fn convert(&self, raw: &str) -> Option<PropertyValue> {
        match self {
            ValueType::Integer => raw.parse().ok().map(PropertyValue::Int),
            ValueType::Long => raw.parse().ok().map(PropertyValue::Long),
            ValueType::Float => raw.parse().ok().map(PropertyValue::Float),
            ValueType::Double => raw.parse().ok().map(PropertyValue::Double),
            ValueType::Boolean => match raw.to_lowercase().as_str() {
                "true" => Some(PropertyValue::Bool(true)),
                "false" => Some(PropertyValue::Bool(false)),
                _ => None,
            },
            ValueType::String => Some(PropertyValue::String(raw.to_string())),
        }
    }
}

/// One coerced value, optionally keyed.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    key: Option<String>,
    value: PropertyValue,
    value_type: ValueType,
    is_map: bool,
}

impl Content {
    /// Coerces `raw` into a typed value.
    ///
    /// `preferred` is an explicit type name. With `is_map` the token is a `key=value`
    /// or `key~value` entry.
    pub fn new(preferred: Option<&str>, raw: &str, is_map: bool) -> Result<Content> {
        if is_map {
            Self::entry(preferred, raw)
        } else {
            let preferred = if raw.starts_with(FORCE_STRING_MARKER) {
                Some("String")
            } else {
                preferred
            };
            let value_type = class_type(preferred, raw, true);
            Ok(Content {
                key: None,
                value: object_value(value_type, raw, true)?,
                value_type,
                is_map: false,
            })
        }
    }

    fn entry(preferred: Option<&str>, raw: &str) -> Result<Content> {
        let equals = raw.find(KEY_SEPARATOR);
        let tilde = raw.find(RETYPE_MARKER);
        let mut allow_retype = true;

        let (splitter, split_value) = match (equals, tilde) {
            (Some(eq), Some(ti)) => {
                if eq < ti {
                    allow_retype = false;
                    (eq, &raw[eq + 1..])
                } else {
                    (eq, "")
                }
            }
            (Some(eq), None) => (eq, &raw[eq + 1..]),
            (None, Some(ti)) => (ti, &raw[ti..]),
            (None, None) => {
                return Err(Error::ContentType(format!(
                    "entry '{raw}' must be written as KEY=VALUE or KEY~VALUE"
                )))
            }
        };

        let value_type = class_type(preferred, split_value, allow_retype);
        let key = &raw[..splitter];
        let val = &raw[splitter + 1..];
        Ok(Content {
            key: Some(key.to_string()),
            value: object_value(value_type, val, allow_retype)?,
            value_type,
            is_map: true,
        })
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    pub fn into_value(self) -> PropertyValue {
        self.value
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_map(&self) -> bool {
        self.is_map
    }
}

/// Picks the type of `value`, inferring it when no type is preferred and the value asks for it.
fn class_type(preferred: Option<&str>, value: &str, allow_retype: bool) -> ValueType {
    match preferred {
        Some(name) => ValueType::normalize(name),
        None => match value.strip_prefix(RETYPE_MARKER) {
            Some(stripped) if allow_retype => {
                trace!("Auto-typecasting {value}");
                ValueType::INFERENCE_ORDER
                    .into_iter()
                    .find(|t| t.convert(stripped).is_some())
                    .unwrap_or(ValueType::String)
            }
            _ => ValueType::String,
        },
    }
}

fn object_value(value_type: ValueType, raw: &str, allow_retype: bool) -> Result<PropertyValue> {
    let raw = match raw.strip_prefix(RETYPE_MARKER) {
        Some(stripped) if allow_retype => stripped,
        _ => raw,
    };
    value_type.convert(raw).ok_or_else(|| {
        Error::ContentType(format!(
            "cannot convert '{raw}' to {}",
            value_type.name()
        ))
    })
}
