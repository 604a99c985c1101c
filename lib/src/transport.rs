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

//! What the client loops need from a messaging provider.

use crate::error::{Error, Result, TransportError};
use crate::message::{Destination, Message};
use std::time::Duration;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Session acknowledge mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    Auto,
    Client,
    DupsOk,
}

impl AckMode {
    pub fn parse(value: &str) -> Result<AckMode> {
        match value.to_lowercase().as_str() {
            "auto" => Ok(AckMode::Auto),
            "client" => Ok(AckMode::Client),
            "dups_ok" => Ok(AckMode::DupsOk),
            other => Err(Error::config(format!("unknown ssn-ack-mode '{other}'"))),
        }
    }
}

/// How long a receive may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveTimeout {
    /// Short bounded poll of [`ReceiveTimeout::POLL_INTERVAL`].
    NoWait,
    Bounded(Duration),
    Forever,
}

impl ReceiveTimeout {
    pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

    /// `0` polls, `-1` blocks, anything else waits that many seconds.
    pub fn from_seconds(timeout: i64) -> ReceiveTimeout {
        match timeout {
            0 => ReceiveTimeout::NoWait,
            t if t < 0 => ReceiveTimeout::Forever,
            t => ReceiveTimeout::Bounded(Duration::from_secs(t.unsigned_abs())),
        }
    }

    /// The wait as a duration, `None` for forever.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            ReceiveTimeout::NoWait => Some(Self::POLL_INTERVAL),
            ReceiveTimeout::Bounded(d) => Some(*d),
            ReceiveTimeout::Forever => None,
        }
    }
}

/// Defaults a producer stamps on every message it sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerSettings {
    pub durable: bool,
    pub ttl_ms: i64,
    pub priority: i32,
    pub disable_message_id: bool,
    pub disable_timestamp: bool,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        ProducerSettings {
            durable: true,
            ttl_ms: 0,
            priority: 4,
            disable_message_id: false,
            disable_timestamp: false,
        }
    }
}

pub type MessageListener = Box<dyn FnMut(Message) + Send>;

pub trait ConnectionFactory {
    fn connect(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> TransportResult<Box<dyn Connection>>;
}

pub trait Connection {
    fn create_session(
        &mut self,
        transacted: bool,
        ack_mode: AckMode,
    ) -> TransportResult<Box<dyn Session>>;

    /// Starts message delivery.
    fn start(&mut self) -> TransportResult<()>;

    fn close(&mut self) -> TransportResult<()>;
}

pub trait Session {
    fn is_transacted(&self) -> bool;

    fn ack_mode(&self) -> AckMode;

    /// A producer bound to `destination`, or an anonymous one for `None`.
    fn create_producer(
        &mut self,
        destination: Option<&Destination>,
    ) -> TransportResult<Box<dyn Producer>>;

    fn create_consumer(
        &mut self,
        destination: &Destination,
        selector: Option<&str>,
    ) -> TransportResult<Box<dyn Consumer>>;

    fn create_durable_subscriber(
        &mut self,
        topic: &Destination,
        name: &str,
        selector: Option<&str>,
    ) -> TransportResult<Box<dyn Consumer>>;

    /// A consumer that reads queue messages without removing them.
    fn create_browser(
        &mut self,
        queue: &Destination,
        selector: Option<&str>,
    ) -> TransportResult<Box<dyn Consumer>>;

    fn create_temporary_queue(&mut self) -> TransportResult<Destination>;

    fn unsubscribe(&mut self, name: &str) -> TransportResult<()>;

    /// Acknowledges every message this session delivered so far.
    fn acknowledge(&mut self) -> TransportResult<()>;

    fn commit(&mut self) -> TransportResult<()>;

    fn rollback(&mut self) -> TransportResult<()>;

    fn recover(&mut self) -> TransportResult<()>;

    fn close(&mut self) -> TransportResult<()>;
}

pub trait Producer {
    fn configure(&mut self, settings: ProducerSettings);

    /// Sends to the bound destination. Id, timestamp and expiry are stamped into `message`.
    fn send(&mut self, message: &mut Message) -> TransportResult<()>;

    fn send_to(&mut self, destination: &Destination, message: &mut Message) -> TransportResult<()>;

    fn close(&mut self) -> TransportResult<()>;
}

pub trait Consumer {
    fn receive(&mut self, timeout: ReceiveTimeout) -> TransportResult<Option<Message>>;

    /// Delivers messages to `listener` on a provider thread instead of through `receive`.
    fn set_listener(&mut self, listener: MessageListener) -> TransportResult<()>;

    fn close(&mut self) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_timeout_from_seconds() {
        assert_eq!(ReceiveTimeout::from_seconds(0), ReceiveTimeout::NoWait);
        assert_eq!(ReceiveTimeout::from_seconds(-1), ReceiveTimeout::Forever);
        assert_eq!(
            ReceiveTimeout::from_seconds(3),
            ReceiveTimeout::Bounded(Duration::from_secs(3))
        );
        assert_eq!(
            ReceiveTimeout::NoWait.duration(),
            Some(Duration::from_millis(200))
        );
        assert_eq!(ReceiveTimeout::Forever.duration(), None);
    }

    #[test]
    fn ack_modes() {
        assert_eq!(AckMode::parse("CLIENT").unwrap(), AckMode::Client);
        assert_eq!(AckMode::parse("dups_ok").unwrap(), AckMode::DupsOk);
        assert!(AckMode::parse("sometimes").is_err());
    }
}
