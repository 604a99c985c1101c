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

//! Execution loops of the three client roles and what they share: opening and
//! closing connection objects, transaction actions, iteration pacing and record output.

pub mod connector;
pub mod receiver;
pub mod sender;

use crate::broker_url::ConnectionTranslation;
use crate::error::{Error, Result};
use crate::manager::{connection_url, ClientOptionManager, ParseOutcome};
use crate::message::Destination;
use crate::options::*;
use crate::transport::{
    AckMode, Connection, ConnectionFactory, Consumer, Credentials, Producer, Session,
};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

const PACING_STEP: Duration = Duration::from_millis(100);
const PACING_TOLERANCE_MS: f64 = -0.05;

pub const COMMIT: &str = "commit";
pub const ROLLBACK: &str = "rollback";
pub const RECOVER: &str = "recover";
pub const NONE: &str = "none";

/// Where formatted message records and statistics lines go.
#[derive(Debug, Clone, Default)]
pub struct RecordSink {
    captured: Option<Arc<Mutex<Vec<String>>>>,
}

impl RecordSink {
    pub fn stdout() -> Self {
        RecordSink::default()
    }

    /// A sink that keeps every record in memory.
    pub fn memory() -> Self {
        RecordSink {
            captured: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    pub fn write_record(&self, record: &str) -> Result<()> {
        match &self.captured {
            Some(lines) => {
                lines
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(record.to_string());
                Ok(())
            }
            None => {
                let mut out = std::io::stdout().lock();
                writeln!(out, "{record}")?;
                Ok(())
            }
        }
    }

    /// Records written so far. Always empty for stdout.
    pub fn lines(&self) -> Vec<String> {
        self.captured
            .as_ref()
            .map(|lines| lines.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .unwrap_or_default()
    }
}

/// Everything a client opened, closed in reverse dependency order.
#[derive(Default)]
pub struct ClientObjects {
    pub connections: Vec<Box<dyn Connection>>,
    pub sessions: Vec<Box<dyn Session>>,
    pub producers: Vec<Box<dyn Producer>>,
    pub consumers: Vec<Box<dyn Consumer>>,
}

impl ClientObjects {
    /// Closes producers, consumers, sessions and then connections. Sleeps
    /// `close_sleep` seconds before the producers and consumers and again before
    /// the connections. Every object is closed once; the first failure is returned.
    pub fn close_all(&mut self, close_sleep: f64) -> Result<()> {
        let mut first_error = None;
        let mut record = |result: Result<()>| {
            if let Err(e) = result {
                error!("Close failed: {e}");
                first_error.get_or_insert(e);
            }
        };

        if !self.producers.is_empty() || !self.consumers.is_empty() {
            close_sleep_phase(close_sleep, "producers and consumers");
        }
        for mut producer in self.producers.drain(..) {
            trace!("Closing sender");
            record(producer.close().map_err(Error::from));
        }
        for mut consumer in self.consumers.drain(..) {
            trace!("Closing receiver");
            record(consumer.close().map_err(Error::from));
        }
        for mut session in self.sessions.drain(..) {
            trace!("Closing session");
            record(session.close().map_err(Error::from));
        }
        close_sleep_phase(close_sleep, "connections");
        for mut connection in self.connections.drain(..) {
            trace!("Closing connection");
            match connection.close() {
                Err(e) if e.is_closed_by_peer() => debug!("Ignoring close error: {e}"),
                other => record(other.map_err(Error::from)),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn close_sleep_phase(close_sleep: f64, phase: &str) {
    if close_sleep > 0.0 {
        debug!("Sleeping before closing {phase} for {close_sleep} seconds.");
        thread::sleep(Duration::from_secs_f64(close_sleep));
    }
}

/// Sleeps until iteration `next` of `count` is due, spreading them over `duration_ms`.
///
/// Does nothing when either `count` or `duration_ms` is zero.
pub fn sleep_until_next_iteration(start: Instant, count: u64, duration_ms: f64, next: u64) {
    if duration_ms <= 0.0 || count == 0 {
        return;
    }
    let cumulative = next as f64 * duration_ms / count as f64;
    while start.elapsed().as_secs_f64() * 1000.0 - cumulative <= PACING_TOLERANCE_MS {
        trace!("sleeping");
        thread::sleep(PACING_STEP);
    }
}

/// Runs one transaction action. Transport failures are logged and the run continues.
pub fn do_transaction(session: &mut dyn Session, action: &str) -> Result<()> {
    let action = action.to_lowercase();
    let (result, performed) = match action.as_str() {
        COMMIT => (session.commit(), "Commit"),
        ROLLBACK => (session.rollback(), "Rollback"),
        RECOVER => (session.recover(), "Recover"),
        NONE => (Ok(()), "None"),
        other => {
            error!("Unknown tx action: '{other}'! Exiting");
            return Err(Error::config(format!("Unknown tx action: '{other}'")));
        }
    };
    match result {
        Ok(()) => trace!("Performed {performed} TX action"),
        Err(e) => error!("{performed} TX action failed: {e}"),
    }
    Ok(())
}

/// Credentials handed to the factory, when a username was given.
pub fn credentials(options: &ClientOptions) -> Option<Credentials> {
    let username = options.value(USERNAME);
    (!username.is_empty()).then(|| Credentials {
        username: username.to_string(),
        password: options.value(PASSWORD).to_string(),
    })
}

/// The destination named by `address` and `destination_type`.
pub fn destination(options: &ClientOptions) -> Destination {
    let address = options.value(ADDRESS);
    if options.value(DESTINATION_TYPE) == TOPIC_TYPE {
        Destination::topic(address)
    } else {
        Destination::queue(address)
    }
}

pub fn ack_mode(options: &ClientOptions) -> Result<AckMode> {
    AckMode::parse(options.value(SSN_ACK_MODE))
}

/// Opens a connection to the resolved url and keeps it in `objects`.
pub fn open_connection(
    options: &ClientOptions,
    factory: &dyn ConnectionFactory,
    objects: &mut ClientObjects,
) -> Result<usize> {
    let url = connection_url(options);
    debug!("Connecting to {url}");
    let connection = factory.connect(url, credentials(options).as_ref())?;
    objects.connections.push(connection);
    Ok(objects.connections.len() - 1)
}

/// Parses `args` into the option registry of `role` with the qpid-jms table.
pub fn configure(role: Role, args: &[String]) -> Result<(ClientOptions, ParseOutcome)> {
    configure_with(role, args, ConnectionTranslation::qpid_jms())
}

/// Parses `args` into the option registry of `role`, translating `conn-*` options with `translation`.
pub fn configure_with(
    role: Role,
    args: &[String],
    translation: ConnectionTranslation,
) -> Result<(ClientOptions, ParseOutcome)> {
    let mut options = ClientOptions::for_role(role);
    debug!("Translating connection options for {}", translation.provider());
    let manager = ClientOptionManager::new(translation);
    let outcome = manager.apply(&mut options, args)?;
    Ok((options, outcome))
}

/// Runs the role `options` were built for.
pub fn start(options: ClientOptions, factory: &dyn ConnectionFactory, sink: &RecordSink) -> Result<()> {
    match options.role() {
        Role::Sender => sender::SenderClient::new(options, sink.clone()).start(factory),
        Role::Receiver => receiver::ReceiverClient::new(options, sink.clone()).start(factory),
        Role::Connector => connector::ConnectorClient::new(options, sink.clone()).start(factory),
    }
}

/// Parses `args` and runs `role` unless help was requested.
pub fn run(
    role: Role,
    args: &[String],
    factory: &dyn ConnectionFactory,
    sink: &RecordSink,
) -> Result<ParseOutcome> {
    let (options, outcome) = configure(role, args)?;
    if outcome == ParseOutcome::Run {
        start(options, factory, sink)?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BrokerEvent, MemoryBroker};

    #[test]
    fn pacing_waits_for_the_iteration_share() {
        let start = Instant::now();
        sleep_until_next_iteration(start, 10, 1000.0, 5);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(450), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(800), "{elapsed:?}");
    }

    #[test]
    fn pacing_is_a_no_op_without_duration_or_count() {
        let start = Instant::now();
        sleep_until_next_iteration(start, 0, 1000.0, 5);
        sleep_until_next_iteration(start, 10, 0.0, 5);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn transaction_actions() {
        let broker = MemoryBroker::new();
        let mut connection = broker.connect("amqp://h:1", None).unwrap();
        let mut session = connection.create_session(true, AckMode::Auto).unwrap();
        do_transaction(session.as_mut(), "COMMIT").unwrap();
        do_transaction(session.as_mut(), "rollback").unwrap();
        do_transaction(session.as_mut(), "none").unwrap();
        do_transaction(session.as_mut(), "recover").unwrap();
        assert!(do_transaction(session.as_mut(), "abort").is_err());

        let actions: Vec<_> = broker
            .events()
            .into_iter()
            .filter(|e| matches!(e, BrokerEvent::Committed { .. } | BrokerEvent::RolledBack { .. }))
            .collect();
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn close_runs_in_dependency_order_and_ignores_peer_close() {
        let broker = MemoryBroker::new();
        let mut objects = ClientObjects::default();
        let mut connection = broker.connect("amqp://h:1", None).unwrap();
        let mut session = connection.create_session(false, AckMode::Auto).unwrap();
        let queue = Destination::queue("q");
        objects.producers.push(session.create_producer(Some(&queue)).unwrap());
        objects.consumers.push(session.create_consumer(&queue, None).unwrap());
        objects.sessions.push(session);
        objects.connections.push(connection);

        broker.set_closed_by_peer(true);
        objects.close_all(0.0).unwrap();

        let closes: Vec<_> = broker
            .events()
            .into_iter()
            .filter_map(|e| match e {
                BrokerEvent::ProducerClosed { .. } => Some("producer"),
                BrokerEvent::ConsumerClosed { .. } => Some("consumer"),
                BrokerEvent::SessionClosed { .. } => Some("session"),
                BrokerEvent::ConnectionClosed { .. } => Some("connection"),
                _ => None,
            })
            .collect();
        assert_eq!(closes, ["producer", "consumer", "session", "connection"]);
        assert!(objects.connections.is_empty());
    }

    #[test]
    fn close_sleep_runs_twice() {
        let broker = MemoryBroker::new();
        let mut objects = ClientObjects::default();
        let mut connection = broker.connect("amqp://h:1", None).unwrap();
        let mut session = connection.create_session(false, AckMode::Auto).unwrap();
        let queue = Destination::queue("q");
        objects.producers.push(session.create_producer(Some(&queue)).unwrap());
        objects.consumers.push(session.create_consumer(&queue, None).unwrap());
        objects.sessions.push(session);
        objects.connections.push(connection);

        let start = Instant::now();
        objects.close_all(0.2).unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(400), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");
    }

    #[test]
    fn memory_sink_captures_records() {
        let sink = RecordSink::memory();
        sink.write_record("{'a': 1}").unwrap();
        assert_eq!(sink.lines(), vec!["{'a': 1}".to_string()]);
        assert!(RecordSink::stdout().lines().is_empty());
    }

    #[test]
    fn credentials_only_with_a_username() {
        let (options, _) = configure(Role::Sender, &[]).unwrap();
        assert_eq!(credentials(&options), None);
        let args: Vec<String> = ["--conn-username", "alice", "--conn-password", "pw"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (options, _) = configure(Role::Sender, &args).unwrap();
        assert_eq!(
            credentials(&options),
            Some(Credentials {
                username: "alice".into(),
                password: "pw".into()
            })
        );
    }
}
