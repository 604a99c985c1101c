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

//! Option registries for every client role.
//!
//! Each role merges the common option table with its own table. When both define
//! the same name the role specific option is kept.

pub mod connector;
pub mod receiver;
pub mod sender;

use crate::error::{Error, Result};
use crate::option::ClientOption;
use tracing::warn;

pub const HELP: &str = "help";
pub const BROKER: &str = "broker";
pub const BROKER_URI: &str = "broker-uri";
pub const BROKER_HOST: &str = "broker_host";
pub const BROKER_PORT: &str = "broker_port";
pub const BROKER_OPTIONS: &str = "broker_options";
pub const PROTOCOL: &str = "protocol";
pub const FAILOVER_URL: &str = "failover_url";
pub const DESTINATION_TYPE: &str = "destination_type";
pub const TRANSACTED: &str = "transacted";
pub const USERNAME: &str = "conn-username";
pub const PASSWORD: &str = "conn-password";
pub const CONN_RECONNECT: &str = "conn-reconnect";
pub const CONN_HEARTBEAT: &str = "conn-heartbeat";
pub const CONN_URLS: &str = "conn-urls";
pub const LOG_LIB: &str = "log-lib";
pub const LOG_BYTES: &str = "log-bytes";
pub const LOG_MSGS: &str = "log-msgs";
pub const LOG_STATS: &str = "log-stats";
pub const OUT: &str = "out";
pub const SSN_ACK_MODE: &str = "ssn-ack-mode";
pub const CLOSE_SLEEP: &str = "close-sleep";
pub const ADDRESS: &str = "address";
pub const COUNT: &str = "count";
pub const TIMEOUT: &str = "timeout";
pub const DURATION: &str = "duration";
pub const DURATION_MODE: &str = "duration-mode";
pub const TX_SIZE: &str = "tx-size";
pub const TX_ACTION: &str = "tx-action";
pub const TX_ENDLOOP_ACTION: &str = "tx-endloop-action";
pub const SYNC_MODE: &str = "sync-mode";
pub const CAPACITY: &str = "capacity";
pub const MSG_DURABLE: &str = "msg-durable";
pub const MSG_CONTENT_HASHED: &str = "msg-content-hashed";
pub const MSG_CONTENT_STREAM: &str = "msg-content-stream";
pub const MSG_CONTENT_LIST_ITEM: &str = "msg-content-list-item";
pub const MSG_CONTENT_MAP_ITEM: &str = "msg-content-map-item";
pub const MSG_PROPERTY: &str = "msg-property";
pub const TRACE_MESSAGES: &str = "trace-messages";

pub const QUEUE_TYPE: &str = "queue";
pub const TOPIC_TYPE: &str = "topic";

/// Prefix marking options that end up in the connection url query.
pub const CONNECTION_OPTION_PREFIX: &str = "conn-";

/// The client role a registry is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
    Connector,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sender => "sender",
            Role::Receiver => "receiver",
            Role::Connector => "connector",
        }
    }

    pub fn parse(name: &str) -> Option<Role> {
        match name {
            "sender" => Some(Role::Sender),
            "receiver" => Some(Role::Receiver),
            "connector" => Some(Role::Connector),
            _ => None,
        }
    }
}

/// Ordered option registry for one role.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    role: Role,
    options: Vec<ClientOption>,
    updated: Vec<&'static str>,
}

impl ClientOptions {
    /// Builds the full registry for `role`.
    pub fn for_role(role: Role) -> Self {
        let specific = match role {
            Role::Sender => sender::options(),
            Role::Receiver => receiver::options(),
            Role::Connector => connector::options(),
        };
        Self::merge(role, common_options(), specific)
    }

    /// Keeps every role specific option and the common options it does not shadow.
    pub fn merge(role: Role, common: Vec<ClientOption>, specific: Vec<ClientOption>) -> Self {
        let mut options = specific;
        for option in common {
            if options.iter().any(|o| o.name() == option.name()) {
                warn!(
                    "Option '{}' of {} overrides the common default",
                    option.name(),
                    role.as_str()
                );
                continue;
            }
            options.push(option);
        }
        ClientOptions {
            role,
            options,
            updated: Vec::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientOption> {
        self.options.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ClientOption> {
        self.options.iter().find(|o| o.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut ClientOption> {
        self.options
            .iter_mut()
            .find(|o| o.name() == name)
            .ok_or_else(|| Error::config(format!("unknown option '{name}'")))
    }

    /// Resolved value of `name`, empty when the role does not know it.
    pub fn value(&self, name: &str) -> &str {
        self.get(name).map(ClientOption::value).unwrap_or("")
    }

    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.get(name).and_then(ClientOption::values)
    }

    pub fn has_parsed_value(&self, name: &str) -> bool {
        self.get(name).is_some_and(ClientOption::has_parsed_value)
    }

    pub fn set_value(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        self.get_mut(name)?.set_parsed_value(value)
    }

    /// Records that `name` was supplied by the user.
    pub fn mark_updated(&mut self, name: &'static str) {
        if !self.updated.contains(&name) {
            self.updated.push(name);
        }
    }

    pub fn is_updated(&self, name: &str) -> bool {
        self.updated.contains(&name)
    }

    /// Options supplied on the command line, in the order they were processed.
    pub fn updated(&self) -> &[&'static str] {
        &self.updated
    }

    /// Parses the value with boolean semantics: only `true` (any case) is true.
    pub fn bool_value(&self, name: &str) -> bool {
        self.value(name).eq_ignore_ascii_case("true")
    }

    pub fn int_value(&self, name: &str) -> Result<i64> {
        let raw = self.value(name);
        raw.trim()
            .parse::<i64>()
            .map_err(|_| Error::config(format!("option '{name}' expects an integer, got '{raw}'")))
    }

    pub fn float_value(&self, name: &str) -> Result<f64> {
        let raw = self.value(name);
        raw.trim()
            .parse::<f64>()
            .map_err(|_| Error::config(format!("option '{name}' expects a number, got '{raw}'")))
    }
}

/// Options shared by all roles.
pub fn common_options() -> Vec<ClientOption> {
    vec![
        ClientOption::internal(PROTOCOL, "tcp"),
        ClientOption::internal(BROKER_HOST, "localhost"),
        ClientOption::internal(BROKER_PORT, "61616"),
        ClientOption::internal(BROKER_OPTIONS, ""),
        ClientOption::internal(DESTINATION_TYPE, QUEUE_TYPE),
        ClientOption::internal(TRANSACTED, "false"),
        ClientOption::internal(FAILOVER_URL, ""),
        ClientOption::new(HELP, Some('h'), "", "", "show this help"),
        ClientOption::new(BROKER, Some('b'), "HOST:61616", "tcp://localhost:61616", "url broker to connect to, default"),
        ClientOption::new(USERNAME, None, "USERNAME", "", "clients username"),
        ClientOption::new(PASSWORD, None, "PASSWORD", "", "clients password"),
        ClientOption::new(
            BROKER_URI,
            None,
            "<broker-uri>",
            "tcp://localhost:61616[[?conOpt=val]&conOpt=val]",
            "verbatim connection url with connection options",
        ),
        ClientOption::new(LOG_LIB, None, "LEVEL", "info", "client logging level of the library"),
        ClientOption::new(LOG_STATS, None, "INFO", "", "report various statistic/debug information"),
        ClientOption::new(LOG_BYTES, None, "", "false", "trace the bytes sent over the wire"),
        ClientOption::new(SSN_ACK_MODE, None, "ACKMODE", "auto", "session acknowledge mode (auto|client|dups_ok)"),
        ClientOption::new(CLOSE_SLEEP, None, "CLOSESLEEP", "0", "sleep before sender/receiver/session/connection.close() in seconds"),
        ClientOption::new(CONN_HEARTBEAT, None, "SECONDS", "60", "idle timeout of the amqp connection in seconds"),
        ClientOption::new("conn-vhost", None, "VHOST", "", "virtual host name"),
        ClientOption::new("conn-auth-sasl", None, "ENABLED", "true", "enable sasl authentication"),
        ClientOption::new("conn-auth-mechanisms", None, "MECHS", "all", "allowed sasl mechanisms"),
        ClientOption::new("conn-max-frame-size", None, "BYTES", "1048576", "maximum amqp frame size"),
        ClientOption::new("conn-drain-timeout", None, "MS", "60000", "time to wait for a consumer drain"),
        ClientOption::new("conn-clientid", None, "CLIENTID", "", "client identifier of the connection"),
        ClientOption::new("conn-async-send", None, "ENABLED", "false", "send all messages asynchronously"),
        ClientOption::new("conn-sync-send", None, "ENABLED", "false", "send all messages synchronously"),
        ClientOption::new("conn-async-acks", None, "ENABLED", "false", "send acknowledgements asynchronously"),
        ClientOption::new("conn-local-msg-priority", None, "ENABLED", "false", "reorder prefetched messages by priority"),
        ClientOption::new("conn-valid-prop-names", None, "ENABLED", "true", "validate message property names"),
        ClientOption::new("conn-recv-local-only", None, "ENABLED", "false", "receive with timeout checks only the local buffer"),
        ClientOption::new("conn-recv-nowait-local", None, "ENABLED", "false", "receive without wait checks only the local buffer"),
        ClientOption::new("conn-queue-prefix", None, "PREFIX", "", "prefix added to queue names"),
        ClientOption::new("conn-topic-prefix", None, "PREFIX", "", "prefix added to topic names"),
        ClientOption::new("conn-close-timeout", None, "TIMEOUT", "15", "connection close timeout in seconds"),
        ClientOption::new("conn-conn-timeout", None, "TIMEOUT", "15", "connection establishment timeout in seconds"),
        ClientOption::new("conn-clientid-prefix", None, "PREFIX", "ID:", "prefix of generated client ids"),
        ClientOption::new("conn-connid-prefix", None, "PREFIX", "ID:", "prefix of generated connection ids"),
        ClientOption::new("conn-populate-user-id", None, "ENABLED", "false", "populate JMSXUserID with the authenticated user"),
        ClientOption::new("conn-redeliveries-max", None, "COUNT", "-1", "maximum number of redeliveries"),
        ClientOption::new("conn-prefetch-queue", None, "COUNT", "1000", "queue prefetch"),
        ClientOption::new("conn-prefetch-topic", None, "COUNT", "1000", "topic prefetch"),
        ClientOption::new("conn-prefetch-browser", None, "COUNT", "1000", "browser prefetch"),
        ClientOption::new("conn-prefetch-topic-dur", None, "COUNT", "1000", "durable topic prefetch"),
        ClientOption::new("conn-prefetch", None, "COUNT", "1000", "prefetch of every consumer kind"),
        ClientOption::new(CONN_RECONNECT, None, "ENABLED", "false", "enable failover reconnection"),
        ClientOption::new("conn-reconnect-limit", None, "COUNT", "-1", "maximum reconnect attempts"),
        ClientOption::new("conn-reconnect-timeout", None, "MS", "10", "delay between reconnect attempts"),
        ClientOption::new("conn-reconnect-interval", None, "MS", "30", "maximum delay between reconnect attempts"),
        ClientOption::new("conn-reconnect-backoff", None, "ENABLED", "true", "grow the reconnect delay"),
        ClientOption::new("conn-reconnect-backoff-multiplier", None, "MULTIPLIER", "2.0", "reconnect delay multiplier"),
        ClientOption::new("conn-reconnect-start-limit", None, "COUNT", "-1", "reconnect attempts on the first connection"),
        ClientOption::new("conn-reconnect-initial-delay", None, "MS", "0", "delay before the first reconnect attempt"),
        ClientOption::new("conn-reconnect-warn-attempts", None, "COUNT", "10", "warn after this many reconnect attempts"),
        ClientOption::new(CONN_URLS, None, "URLS", "", "additional failover urls, comma separated"),
        ClientOption::new("conn-ssl-keystore-location", None, "PATH", "", "keystore location"),
        ClientOption::new("conn-ssl-keystore-password", None, "PASSWORD", "", "keystore password"),
        ClientOption::new("conn-ssl-truststore-location", None, "PATH", "", "truststore location"),
        ClientOption::new("conn-ssl-truststore-password", None, "PASSWORD", "", "truststore password"),
        ClientOption::new("conn-ssl-store-type", None, "TYPE", "JKS", "keystore and truststore type"),
        ClientOption::new("conn-ssl-context-proto", None, "PROTOCOL", "TLS", "ssl context protocol"),
        ClientOption::new("conn-ssl-ena-ciphered-suites", None, "SUITES", "", "enabled cipher suites"),
        ClientOption::new("conn-ssl-dis-ciphered-suites", None, "SUITES", "", "disabled cipher suites"),
        ClientOption::new("conn-ssl-ena-protos", None, "PROTOCOLS", "", "enabled ssl protocols"),
        ClientOption::new("conn-ssl-dis-protos", None, "PROTOCOLS", "SSLv2Hello,SSLv3", "disabled ssl protocols"),
        ClientOption::new("conn-ssl-trust-all", None, "ENABLED", "false", "trust every server certificate"),
        ClientOption::new("conn-ssl-verify-host", None, "ENABLED", "true", "verify the server host name"),
        ClientOption::new("conn-ssl-key-alias", None, "ALIAS", "", "alias of the client key"),
        ClientOption::new("conn-tcp-buf-size-send", None, "KB", "64", "socket send buffer size"),
        ClientOption::new("conn-tcp-buf-size-recv", None, "KB", "64", "socket receive buffer size"),
        ClientOption::new("conn-tcp-traffic-class", None, "CLASS", "0", "socket traffic class"),
        ClientOption::new("conn-tcp-conn-timeout", None, "SECONDS", "60", "socket connect timeout"),
        ClientOption::new("conn-tcp-sock-timeout", None, "SECONDS", "-1", "socket read timeout"),
        ClientOption::new("conn-tcp-sock-linger", None, "SECONDS", "-1", "socket linger"),
        ClientOption::new("conn-tcp-keep-alive", None, "ENABLED", "false", "enable tcp keep alive"),
        ClientOption::new("conn-tcp-no-delay", None, "ENABLED", "true", "disable nagle"),
        ClientOption::new(MSG_CONTENT_HASHED, None, "", "false", "print the SHA-1 of the content instead of the content"),
        ClientOption::new(MSG_CONTENT_STREAM, None, "", "false", "read binary file content through a buffered stream"),
        ClientOption::new(TRACE_MESSAGES, None, "", "false", "trace each message as it is processed"),
    ]
}
