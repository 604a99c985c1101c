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

//! Builds the messages a sender puts on the wire.
//!
//! One provider is picked per run from the content options, first match wins:
//! binary, content or content file, list items, map items, nothing.

use crate::content::Content;
use crate::error::{Error, Result};
use crate::message::{
    Body, Destination, Message, PropertyValue, AMQP_CONTENT_TYPE, AMQP_REPLY_TO_GROUP_ID,
    AMQP_SUBJECT, JMSX_GROUP_ID, JMSX_GROUP_SEQ, JMSX_USER_ID,
};
use crate::options::sender::*;
use crate::options::{ClientOptions, MSG_CONTENT_LIST_ITEM, MSG_CONTENT_MAP_ITEM, MSG_CONTENT_STREAM, MSG_PROPERTY};
use regex::Regex;
use std::fs::File;
use std::io::{BufReader, Read};
use tracing::{debug, trace};

const COUNTER_PATTERN: &str = "%([ 0-9]*)d";

/// Message body strategy chosen for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Bytes,
    Text,
    Object,
    Stream,
    Map,
    Empty,
}

impl ProviderKind {
    pub fn select(options: &ClientOptions) -> Result<ProviderKind> {
        if options.bool_value(MSG_CONTENT_BINARY) {
            return Ok(ProviderKind::Bytes);
        }
        if options.has_parsed_value(MSG_CONTENT) || options.has_parsed_value(MSG_CONTENT_FROM_FILE) {
            let content_type = options.value(CONTENT_TYPE).to_lowercase();
            return match content_type.as_str() {
                "string" => Ok(ProviderKind::Text),
                "object" | "int" | "integer" | "long" | "float" | "double" | "bool" => {
                    Ok(ProviderKind::Object)
                }
                other => Err(Error::config(format!(
                    "Message content type of {other} is not supported."
                ))),
            };
        }
        if options.has_parsed_value(MSG_CONTENT_LIST_ITEM) {
            return Ok(ProviderKind::Stream);
        }
        if options.has_parsed_value(MSG_CONTENT_MAP_ITEM) {
            return Ok(ProviderKind::Map);
        }
        trace!("No content option given, sending empty messages");
        Ok(ProviderKind::Empty)
    }
}

pub trait MessageProvider {
    /// The message for iteration `counter`, counting from 0.
    fn provide(&mut self, counter: u64) -> Result<Message>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The provider [`ProviderKind::select`] picks for `options`.
pub fn new_provider(options: &ClientOptions) -> Result<Box<dyn MessageProvider>> {
    let kind = ProviderKind::select(options)?;
    debug!("Using {kind:?} message provider");
    let template = Template::new(options);
    Ok(match kind {
        ProviderKind::Text => Box::new(TextProvider::new(template)?),
        ProviderKind::Bytes => Box::new(BytesProvider { template }),
        ProviderKind::Object => Box::new(ObjectProvider { template }),
        ProviderKind::Stream => Box::new(StreamProvider { template }),
        ProviderKind::Map => Box::new(MapProvider { template }),
        ProviderKind::Empty => Box::new(EmptyProvider { template }),
    })
}

/// Sender options plus the header and property decoration every provider shares.
struct Template {
    options: ClientOptions,
}

impl Template {
    fn new(options: &ClientOptions) -> Self {
        Template {
            options: options.clone(),
        }
    }

    fn parsed(&self, name: &str) -> Option<&str> {
        self.options
            .has_parsed_value(name)
            .then(|| self.options.value(name))
    }

    /// Content type applied to bodies, only when the user chose one.
    fn content_type(&self) -> Option<String> {
        self.parsed(CONTENT_TYPE).map(str::to_lowercase)
    }

    fn items(&self, name: &str) -> &[String] {
        self.options.values(name).unwrap_or(&[])
    }

    fn is_explicitly_empty(&self, name: &str) -> bool {
        self.options
            .get(name)
            .is_some_and(|option| option.is_explicitly_empty())
    }

    fn text_content(&self) -> Result<String> {
        if let Some(content) = self.parsed(MSG_CONTENT) {
            return Ok(content.to_string());
        }
        let bytes = self.file_content()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn file_content(&self) -> Result<Vec<u8>> {
        let path = self.parsed(MSG_CONTENT_FROM_FILE).unwrap_or_default();
        let file = File::open(path)
            .map_err(|e| Error::config(format!("Unable to access file {path}: {e}")))?;
        let mut data = Vec::new();
        if self.options.bool_value(MSG_CONTENT_STREAM) {
            BufReader::new(file).read_to_end(&mut data)?;
        } else {
            let mut file = file;
            file.read_to_end(&mut data)?;
        }
        debug!("ToSend={}", data.len());
        Ok(data)
    }

    fn int_option(&self, name: &str, raw: &str) -> Result<i32> {
        raw.trim()
            .parse()
            .map_err(|_| Error::config(format!("option '{name}' expects an integer, got '{raw}'")))
    }

    /// A message with `body`, its headers and the user properties applied.
    fn message(&self, body: Body) -> Result<Message> {
        let mut message = Message::new(body);

        if let Some(id) = self.parsed(MSG_ID) {
            if id != NO_ID {
                message.id = Some(id.to_string());
            }
        }
        if let Some(correlation) = self.parsed(MSG_CORRELATION_ID) {
            message.correlation_id = Some(correlation.to_string());
        }
        if let Some(user) = self.parsed(MSG_USER_ID) {
            message.set_property(JMSX_USER_ID, PropertyValue::String(user.to_string()));
        }
        if let Some(subject) = self.parsed(MSG_SUBJECT) {
            message.set_property(AMQP_SUBJECT, PropertyValue::String(subject.to_string()));
            message.jms_type = Some(subject.to_string());
        }
        if let Some(reply_to) = self.parsed(MSG_REPLY_TO) {
            message.reply_to = Some(Destination::parse(reply_to));
        }
        if let Some(content_type) = self.parsed(MSG_CONTENT_TYPE) {
            message.set_property(AMQP_CONTENT_TYPE, PropertyValue::String(content_type.to_string()));
        }
        if let Some(priority) = self.parsed(MSG_PRIORITY) {
            message.priority = self.int_option(MSG_PRIORITY, priority)?;
        }
        if let Some(group) = self.parsed(MSG_GROUP_ID) {
            message.set_property(JMSX_GROUP_ID, PropertyValue::String(group.to_string()));
        }
        if let Some(seq) = self.parsed(MSG_GROUP_SEQ) {
            let seq = self.int_option(MSG_GROUP_SEQ, seq)?;
            message.set_property(JMSX_GROUP_SEQ, PropertyValue::Int(seq));
        }
        if let Some(group) = self.parsed(MSG_REPLY_TO_GROUP_ID) {
            message.set_property(AMQP_REPLY_TO_GROUP_ID, PropertyValue::String(group.to_string()));
        }

        let property_type = self.parsed(PROPERTY_TYPE);
        for property in self.items(MSG_PROPERTY) {
            let content = Content::new(property_type, property, true)?;
            trace!("Setting {} property {property}", content.value_type().name());
            let key = content.key().unwrap_or_default().to_string();
            message.set_property(key, content.into_value());
        }
        Ok(message)
    }
}

/// Rewrites every `%d` style placeholder with `counter`. Supports the space and zero flags and a width.
pub fn format_counter(pattern: &Regex, template: &str, counter: u64) -> String {
    pattern
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let flags = &caps[1];
            let unsigned = flags.trim_start_matches(' ');
            let sign = if unsigned.len() < flags.len() { " " } else { "" };
            let zero_pad = unsigned.starts_with('0');
            let width: usize = unsigned.trim_start_matches('0').parse().unwrap_or(0);
            if zero_pad {
                let digits = width.saturating_sub(sign.len());
                format!("{sign}{counter:0>digits$}")
            } else {
                let text = format!("{sign}{counter}");
                format!("{text:>width$}")
            }
        })
        .into_owned()
}

/// Builds the text message once; only the counter placeholders change between sends.
struct TextProvider {
    template: Template,
    pattern: Regex,
    cached: Option<Message>,
    counter_text: Option<String>,
}

impl TextProvider {
    fn new(template: Template) -> Result<Self> {
        let pattern = Regex::new(COUNTER_PATTERN)
            .map_err(|e| Error::config(format!("invalid counter pattern: {e}")))?;
        Ok(TextProvider {
            template,
            pattern,
            cached: None,
            counter_text: None,
        })
    }
}

impl MessageProvider for TextProvider {
    fn provide(&mut self, counter: u64) -> Result<Message> {
        if self.cached.is_none() {
            let raw = self.template.text_content()?;
            let content = Content::new(self.template.content_type().as_deref(), &raw, false)?;
            let text = content.value().to_string();
            if self.pattern.is_match(&text) {
                self.counter_text = Some(text.clone());
            }
            self.cached = Some(self.template.message(Body::Text(text))?);
        }
        let Some(cached) = self.cached.as_mut() else {
            return Err(Error::config("text message was not built"));
        };
        if let Some(text) = &self.counter_text {
            cached.body = Body::Text(format_counter(&self.pattern, text, counter));
        }
        Ok(cached.clone())
    }
}

struct BytesProvider {
    template: Template,
}

impl MessageProvider for BytesProvider {
    fn provide(&mut self, _counter: u64) -> Result<Message> {
        debug!("Filling BytesMessage with binary data");
        let bytes = match self.template.parsed(MSG_CONTENT) {
            Some(content) => content.as_bytes().to_vec(),
            None if self.template.options.has_parsed_value(MSG_CONTENT_FROM_FILE) => {
                self.template.file_content()?
            }
            None => Vec::new(),
        };
        self.template.message(Body::Bytes(bytes))
    }
}

struct ObjectProvider {
    template: Template,
}

impl MessageProvider for ObjectProvider {
    fn provide(&mut self, _counter: u64) -> Result<Message> {
        let raw = self.template.text_content()?;
        let content = Content::new(self.template.content_type().as_deref(), &raw, false)?;
        self.template.message(Body::Object(content.into_value()))
    }
}

struct StreamProvider {
    template: Template,
}

impl MessageProvider for StreamProvider {
    fn provide(&mut self, _counter: u64) -> Result<Message> {
        let mut items = Vec::new();
        if !self.template.is_explicitly_empty(MSG_CONTENT_LIST_ITEM) {
            let content_type = self.template.content_type();
            for item in self.template.items(MSG_CONTENT_LIST_ITEM) {
                items.push(Content::new(content_type.as_deref(), item, false)?.into_value());
            }
        }
        self.template.message(Body::Stream(items))
    }
}

struct MapProvider {
    template: Template,
}

impl MessageProvider for MapProvider {
    fn provide(&mut self, _counter: u64) -> Result<Message> {
        let mut entries: Vec<(String, PropertyValue)> = Vec::new();
        if !self.template.is_explicitly_empty(MSG_CONTENT_MAP_ITEM) {
            let content_type = self.template.content_type();
            for item in self.template.items(MSG_CONTENT_MAP_ITEM) {
                let content = Content::new(content_type.as_deref(), item, true)?;
                trace!("Filling MapMessage with {item} as {}", content.value_type().name());
                let key = content.key().unwrap_or_default().to_string();
                let value = content.into_value();
                match entries.iter_mut().find(|(k, _)| *k == key) {
                    Some(entry) => entry.1 = value,
                    None => entries.push((key, value)),
                }
            }
        }
        self.template.message(Body::Map(entries))
    }
}

struct EmptyProvider {
    template: Template,
}

impl MessageProvider for EmptyProvider {
    fn provide(&mut self, _counter: u64) -> Result<Message> {
        self.template.message(Body::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker_url::ConnectionTranslation;
    use crate::manager::ClientOptionManager;
    use crate::options::Role;
    use std::io::Write;

    fn sender(args: &[&str]) -> ClientOptions {
        let mut options = ClientOptions::for_role(Role::Sender);
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        ClientOptionManager::new(ConnectionTranslation::qpid_jms())
            .apply(&mut options, &args)
            .unwrap();
        options
    }

    fn kind(args: &[&str]) -> ProviderKind {
        ProviderKind::select(&sender(args)).unwrap()
    }

    #[test]
    fn selection_priority() {
        assert_eq!(kind(&[]), ProviderKind::Empty);
        assert_eq!(kind(&["--msg-content-map-item", "a=1"]), ProviderKind::Map);
        assert_eq!(
            kind(&["--msg-content-map-item", "a=1", "--msg-content-list-item", "x"]),
            ProviderKind::Stream
        );
        assert_eq!(
            kind(&["--msg-content-list-item", "x", "--msg-content", "hi"]),
            ProviderKind::Text
        );
        assert_eq!(
            kind(&["--msg-content", "5", "--content-type", "int"]),
            ProviderKind::Object
        );
        assert_eq!(
            kind(&["--msg-content", "hi", "--msg-content-binary", "true", "-M", "a=1"]),
            ProviderKind::Bytes
        );
        assert_eq!(
            kind(&["--msg-content", "hi", "--msg-content-binary", "false"]),
            ProviderKind::Text
        );
    }

    #[test]
    fn unsupported_content_type() {
        let options = sender(&["--msg-content", "hi", "--content-type", "uuid"]);
        assert_eq!(ProviderKind::select(&options).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn counter_placeholders() {
        let pattern = Regex::new(COUNTER_PATTERN).unwrap();
        assert_eq!(format_counter(&pattern, "msg %d", 7), "msg 7");
        assert_eq!(format_counter(&pattern, "[%5d]", 42), "[   42]");
        assert_eq!(format_counter(&pattern, "[%05d]", 42), "[00042]");
        assert_eq!(format_counter(&pattern, "[% 3d]", 5), "[  5]");
        assert_eq!(format_counter(&pattern, "[% d]", 5), "[ 5]");
        assert_eq!(format_counter(&pattern, "no placeholder", 5), "no placeholder");
    }

    #[test]
    fn text_is_cached_and_counted() {
        let mut provider = new_provider(&sender(&["--msg-content", "message %03d"])).unwrap();
        assert_eq!(provider.provide(0).unwrap().body, Body::Text("message 000".into()));
        assert_eq!(provider.provide(12).unwrap().body, Body::Text("message 012".into()));

        let mut plain = new_provider(&sender(&["--msg-content", "hello"])).unwrap();
        assert_eq!(plain.provide(3).unwrap().body, Body::Text("hello".into()));
    }

    #[test]
    fn object_content_is_typed() {
        let mut provider =
            new_provider(&sender(&["--msg-content", "12", "--content-type", "long"])).unwrap();
        assert_eq!(
            provider.provide(0).unwrap().body,
            Body::Object(PropertyValue::Long(12))
        );

        let mut bad =
            new_provider(&sender(&["--msg-content", "twelve", "--content-type", "int"])).unwrap();
        assert!(matches!(bad.provide(0), Err(Error::ContentType(_))));
    }

    #[test]
    fn stream_and_map_bodies() {
        let mut stream =
            new_provider(&sender(&["-L", "~1", "-L", "text", "-L", "~false"])).unwrap();
        assert_eq!(
            stream.provide(0).unwrap().body,
            Body::Stream(vec![
                PropertyValue::Int(1),
                PropertyValue::String("text".into()),
                PropertyValue::Bool(false),
            ])
        );

        let mut map = new_provider(&sender(&["-M", "a~1", "-M", "b=~2", "-M", "a=x"])).unwrap();
        assert_eq!(
            map.provide(0).unwrap().body,
            Body::Map(vec![
                ("a".into(), PropertyValue::String("x".into())),
                ("b".into(), PropertyValue::String("~2".into())),
            ])
        );
    }

    #[test]
    fn explicitly_empty_items_give_empty_containers() {
        let mut stream = new_provider(&sender(&["-L", "''"])).unwrap();
        assert_eq!(stream.provide(0).unwrap().body, Body::Stream(vec![]));
        let mut map = new_provider(&sender(&["-M", "\"\""])).unwrap();
        assert_eq!(map.provide(0).unwrap().body, Body::Map(vec![]));
    }

    #[test]
    fn headers_and_properties() {
        let options = sender(&[
            "--msg-id", "fixed",
            "--msg-correlation-id", "corr",
            "--msg-user-id", "bob",
            "--msg-subject", "subj",
            "--msg-reply-to", "topic://replies",
            "--msg-content-type", "text/plain",
            "--msg-group-id", "g",
            "--msg-group-seq", "3",
            "--msg-reply-to-group-id", "rg",
            "--msg-property", "color=red",
            "--msg-property", "size~5",
        ]);
        let message = new_provider(&options).unwrap().provide(0).unwrap();
        assert_eq!(message.id.as_deref(), Some("fixed"));
        assert_eq!(message.correlation_id.as_deref(), Some("corr"));
        assert_eq!(message.reply_to, Some(Destination::topic("replies")));
        assert_eq!(message.string_property(JMSX_USER_ID).as_deref(), Some("bob"));
        assert_eq!(message.string_property(AMQP_SUBJECT).as_deref(), Some("subj"));
        assert_eq!(message.string_property(AMQP_CONTENT_TYPE).as_deref(), Some("text/plain"));
        assert_eq!(message.property(JMSX_GROUP_SEQ), Some(&PropertyValue::Int(3)));
        assert_eq!(message.string_property(AMQP_REPLY_TO_GROUP_ID).as_deref(), Some("rg"));
        assert_eq!(message.property("color"), Some(&PropertyValue::String("red".into())));
        assert_eq!(message.property("size"), Some(&PropertyValue::Int(5)));
    }

    #[test]
    fn noid_leaves_the_id_unset() {
        let message = new_provider(&sender(&["--msg-id", "noid"]))
            .unwrap()
            .provide(0)
            .unwrap();
        assert_eq!(message.id, None);
    }

    #[test]
    fn declared_property_type() {
        let options = sender(&["--property-type", "double", "--msg-property", "ratio=0.5"]);
        let message = new_provider(&options).unwrap().provide(0).unwrap();
        assert_eq!(message.property("ratio"), Some(&PropertyValue::Double(0.5)));
    }

    #[test]
    fn content_from_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"\x00\x01payload")?;
        let path = file.path().to_string_lossy().into_owned();

        let mut bytes = new_provider(&sender(&[
            "--msg-content-from-file", &path,
            "--msg-content-binary", "true",
            "--msg-content-stream",
        ]))?;
        assert_eq!(bytes.provide(0)?.body, Body::Bytes(b"\x00\x01payload".to_vec()));

        let mut text = new_provider(&sender(&["--msg-content-from-file", &path]))?;
        assert!(matches!(text.provide(0)?.body, Body::Text(t) if t.ends_with("payload")));
        Ok(())
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let mut provider =
            new_provider(&sender(&["--msg-content-from-file", "/nonexistent/mqe/content"])).unwrap();
        assert_eq!(provider.provide(0).unwrap_err().exit_code(), 2);
    }
}
