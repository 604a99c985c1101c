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

//! An in-process broker implementing the transport traits.
//!
//! Queues are FIFO. Topics fan out to one subscription per consumer, durable
//! subscriptions outlive their consumer. Transacted sessions hold sends and
//! deliveries until commit, client acknowledged sessions hold deliveries until
//! acknowledge. Everything the clients do is recorded as a [`BrokerEvent`].

use crate::error::{TransportError, TransportErrorKind};
use crate::message::{Destination, DestinationKind, Message, PropertyValue, JMSX_DELIVERY_COUNT};
use crate::transport::{
    AckMode, Connection, ConnectionFactory, Consumer, Credentials, MessageListener, Producer,
    ProducerSettings, ReceiveTimeout, Session, TransportResult,
};
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};
use uuid::Uuid;

const LISTENER_WAIT: Duration = Duration::from_millis(50);

/// Something a client did against the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    ConnectionOpened {
        connection: u64,
        url: String,
        username: Option<String>,
    },
    ConnectionStarted { connection: u64 },
    ConnectionClosed { connection: u64 },
    SessionOpened {
        session: u64,
        connection: u64,
        transacted: bool,
    },
    SessionClosed { session: u64 },
    ProducerOpened { producer: u64, session: u64 },
    ProducerClosed { producer: u64 },
    ConsumerOpened { consumer: u64, session: u64 },
    ConsumerClosed { consumer: u64 },
    /// A message reached its destination.
    Sent { session: u64, address: String },
    Acknowledged { session: u64 },
    Committed { session: u64 },
    RolledBack { session: u64 },
    Recovered { session: u64 },
    Unsubscribed { name: String },
}

#[derive(Debug, Clone)]
struct Stored {
    message: Message,
    delivery_count: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Source {
    Queue(Destination),
    Subscription(String),
}

#[derive(Debug)]
struct Subscription {
    topic: String,
    durable: bool,
    messages: VecDeque<Stored>,
}

#[derive(Debug)]
struct ConnectionState {
    started: bool,
    closed: bool,
}

#[derive(Debug)]
struct SessionState {
    connection: u64,
    transacted: bool,
    ack_mode: AckMode,
    pending: Vec<(Destination, Message)>,
    delivered: Vec<(Source, Stored)>,
    closed: bool,
}

#[derive(Debug)]
struct ConsumerState {
    session: u64,
    source: Source,
    selector: Option<Selector>,
    browse_cursor: Option<usize>,
    closed: bool,
}

#[derive(Debug, Default)]
struct BrokerState {
    next_id: u64,
    queues: HashMap<Destination, VecDeque<Stored>>,
    subscriptions: HashMap<String, Subscription>,
    connections: HashMap<u64, ConnectionState>,
    sessions: HashMap<u64, SessionState>,
    consumers: HashMap<u64, ConsumerState>,
    releases: HashMap<String, usize>,
    failing_connects: usize,
    closed_by_peer: bool,
    events: Vec<BrokerEvent>,
}

impl BrokerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn session(&mut self, id: u64) -> TransportResult<&mut SessionState> {
        match self.sessions.get_mut(&id) {
            Some(session) if !session.closed => Ok(session),
            _ => Err(TransportError::other(format!("session {id} is closed"))),
        }
    }

    /// Puts an accepted message on its queue or on every subscription of its topic.
    fn route(&mut self, destination: &Destination, message: Message) {
        let stored = Stored {
            message,
            delivery_count: 0,
        };
        match destination.kind {
            DestinationKind::Topic => {
                for subscription in self.subscriptions.values_mut() {
                    if subscription.topic == destination.name {
                        subscription.messages.push_back(stored.clone());
                    }
                }
            }
            DestinationKind::Queue | DestinationKind::TemporaryQueue => {
                self.queues
                    .entry(destination.clone())
                    .or_default()
                    .push_back(stored);
            }
        }
    }

    /// Returns deliveries to the front of their source, oldest first, marked redelivered.
    fn requeue(&mut self, delivered: Vec<(Source, Stored)>) {
        for (source, mut stored) in delivered.into_iter().rev() {
            stored.message.redelivered = true;
            match source {
                Source::Queue(destination) => self
                    .queues
                    .entry(destination)
                    .or_default()
                    .push_front(stored),
                Source::Subscription(name) => {
                    if let Some(subscription) = self.subscriptions.get_mut(&name) {
                        subscription.messages.push_front(stored);
                    }
                }
            }
        }
    }

    fn messages_mut(&mut self, source: &Source) -> Option<&mut VecDeque<Stored>> {
        match source {
            Source::Queue(destination) => Some(self.queues.entry(destination.clone()).or_default()),
            Source::Subscription(name) => self.subscriptions.get_mut(name).map(|s| &mut s.messages),
        }
    }

    /// Next message for `consumer`, if its connection is started and one matches.
    fn take(&mut self, consumer_id: u64) -> TransportResult<Option<Message>> {
        let (session_id, source, selector, browse_cursor) = match self.consumers.get(&consumer_id) {
            Some(c) if !c.closed => (c.session, c.source.clone(), c.selector.clone(), c.browse_cursor),
            _ => return Err(TransportError::other(format!("consumer {consumer_id} is closed"))),
        };
        let (connection, keeps_delivery) = {
            let session = self.session(session_id)?;
            (
                session.connection,
                session.transacted || session.ack_mode == AckMode::Client,
            )
        };
        if !self.connections.get(&connection).is_some_and(|c| c.started && !c.closed) {
            return Ok(None);
        }
        let matches = |stored: &Stored| selector.as_ref().map_or(true, |s| s.matches(&stored.message));
        let Some(messages) = self.messages_mut(&source) else {
            return Ok(None);
        };

        if let Some(cursor) = browse_cursor {
            let found = messages
                .iter()
                .enumerate()
                .skip(cursor)
                .find(|(_, stored)| matches(stored))
                .map(|(index, stored)| (index, delivered_copy(stored)));
            return Ok(found.map(|(index, message)| {
                if let Some(consumer) = self.consumers.get_mut(&consumer_id) {
                    consumer.browse_cursor = Some(index + 1);
                }
                message
            }));
        }

        let Some(position) = messages.iter().position(|stored| matches(stored)) else {
            return Ok(None);
        };
        let Some(mut stored) = messages.remove(position) else {
            return Ok(None);
        };
        stored.delivery_count += 1;
        let message = delivered_copy(&stored);
        if keeps_delivery {
            self.session(session_id)?.delivered.push((source, stored));
        }
        Ok(Some(message))
    }
}

fn delivered_copy(stored: &Stored) -> Message {
    let mut message = stored.message.clone();
    let count = stored.delivery_count.max(1);
    message.set_property(JMSX_DELIVERY_COUNT, PropertyValue::Int(count));
    message.redelivered = message.redelivered || count > 1;
    message
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BrokerState>,
    available: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to an in-memory broker. Clones share the same broker.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `message` on `destination` as if a client had sent it.
    pub fn publish(&self, destination: &Destination, mut message: Message) {
        message.destination = Some(destination.clone());
        let mut state = self.shared.lock();
        state.route(destination, message);
        self.shared.available.notify_all();
    }

    /// Messages waiting on a queue.
    pub fn queue_depth(&self, destination: &Destination) -> usize {
        self.shared
            .lock()
            .queues
            .get(destination)
            .map_or(0, VecDeque::len)
    }

    pub fn queue_messages(&self, destination: &Destination) -> Vec<Message> {
        self.shared
            .lock()
            .queues
            .get(destination)
            .map(|q| q.iter().map(|s| s.message.clone()).collect())
            .unwrap_or_default()
    }

    /// Messages waiting on a named subscription.
    pub fn subscription_depth(&self, name: &str) -> Option<usize> {
        self.shared
            .lock()
            .subscriptions
            .get(name)
            .map(|s| s.messages.len())
    }

    pub fn subscription_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.shared.lock().subscriptions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn events(&self) -> Vec<BrokerEvent> {
        self.shared.lock().events.clone()
    }

    /// The next `count` sends to `address` are released instead of accepted.
    pub fn release_next(&self, address: &str, count: usize) {
        *self
            .shared
            .lock()
            .releases
            .entry(address.to_string())
            .or_default() += count;
    }

    /// The next `count` connection attempts are refused.
    pub fn fail_next_connections(&self, count: usize) {
        self.shared.lock().failing_connects += count;
    }

    /// Connection closes report that the peer already closed the connection.
    pub fn set_closed_by_peer(&self, closed: bool) {
        self.shared.lock().closed_by_peer = closed;
    }
}

impl ConnectionFactory for MemoryBroker {
    fn connect(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> TransportResult<Box<dyn Connection>> {
        let mut state = self.shared.lock();
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(TransportError::other(format!("Connection refused: {url}")));
        }
        let id = state.next_id();
        state.connections.insert(
            id,
            ConnectionState {
                started: false,
                closed: false,
            },
        );
        state.events.push(BrokerEvent::ConnectionOpened {
            connection: id,
            url: url.to_string(),
            username: credentials.map(|c| c.username.clone()),
        });
        debug!("Opened connection {id} to {url}");
        Ok(Box::new(MemoryConnection {
            shared: self.shared.clone(),
            id,
        }))
    }
}

struct MemoryConnection {
    shared: Arc<Shared>,
    id: u64,
}

impl Connection for MemoryConnection {
    fn create_session(
        &mut self,
        transacted: bool,
        ack_mode: AckMode,
    ) -> TransportResult<Box<dyn Session>> {
        let mut state = self.shared.lock();
        if state.connections.get(&self.id).map_or(true, |c| c.closed) {
            return Err(TransportError::other("connection is closed"));
        }
        let id = state.next_id();
        state.sessions.insert(
            id,
            SessionState {
                connection: self.id,
                transacted,
                ack_mode,
                pending: Vec::new(),
                delivered: Vec::new(),
                closed: false,
            },
        );
        state.events.push(BrokerEvent::SessionOpened {
            session: id,
            connection: self.id,
            transacted,
        });
        Ok(Box::new(MemorySession {
            shared: self.shared.clone(),
            id,
            transacted,
            ack_mode,
        }))
    }

    fn start(&mut self) -> TransportResult<()> {
        let mut state = self.shared.lock();
        match state.connections.get_mut(&self.id) {
            Some(connection) if !connection.closed => connection.started = true,
            _ => return Err(TransportError::other("connection is closed")),
        }
        state.events.push(BrokerEvent::ConnectionStarted {
            connection: self.id,
        });
        self.shared.available.notify_all();
        Ok(())
    }

    fn close(&mut self) -> TransportResult<()> {
        let mut state = self.shared.lock();
        let Some(connection) = state.connections.get_mut(&self.id) else {
            return Ok(());
        };
        if connection.closed {
            return Ok(());
        }
        connection.closed = true;
        state.events.push(BrokerEvent::ConnectionClosed {
            connection: self.id,
        });
        if state.closed_by_peer {
            return Err(TransportError::new(
                TransportErrorKind::ConnectionClosedByPeer,
                format!("connection {} was closed by the remote peer", self.id),
            ));
        }
        Ok(())
    }
}

struct MemorySession {
    shared: Arc<Shared>,
    id: u64,
    transacted: bool,
    ack_mode: AckMode,
}

impl MemorySession {
    fn open_consumer(
        &mut self,
        source: Source,
        selector: Option<&str>,
        browse: bool,
    ) -> TransportResult<Box<dyn Consumer>> {
        let selector = match selector.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => Some(Selector::parse(text)?),
            None => None,
        };
        let mut state = self.shared.lock();
        state.session(self.id)?;
        let id = state.next_id();
        state.consumers.insert(
            id,
            ConsumerState {
                session: self.id,
                source,
                selector,
                browse_cursor: browse.then_some(0),
                closed: false,
            },
        );
        state.events.push(BrokerEvent::ConsumerOpened {
            consumer: id,
            session: self.id,
        });
        Ok(Box::new(MemoryConsumer {
            shared: self.shared.clone(),
            id,
            listener: None,
        }))
    }
}

impl Session for MemorySession {
    fn is_transacted(&self) -> bool {
        self.transacted
    }

    fn ack_mode(&self) -> AckMode {
        self.ack_mode
    }

    fn create_producer(
        &mut self,
        destination: Option<&Destination>,
    ) -> TransportResult<Box<dyn Producer>> {
        let mut state = self.shared.lock();
        state.session(self.id)?;
        let id = state.next_id();
        state.events.push(BrokerEvent::ProducerOpened {
            producer: id,
            session: self.id,
        });
        Ok(Box::new(MemoryProducer {
            shared: self.shared.clone(),
            id,
            session: self.id,
            destination: destination.cloned(),
            settings: ProducerSettings::default(),
            closed: false,
        }))
    }

    fn create_consumer(
        &mut self,
        destination: &Destination,
        selector: Option<&str>,
    ) -> TransportResult<Box<dyn Consumer>> {
        let source = if destination.is_topic() {
            let name = format!("subscription-{}", Uuid::new_v4());
            self.shared.lock().subscriptions.insert(
                name.clone(),
                Subscription {
                    topic: destination.name.clone(),
                    durable: false,
                    messages: VecDeque::new(),
                },
            );
            Source::Subscription(name)
        } else {
            Source::Queue(destination.clone())
        };
        self.open_consumer(source, selector, false)
    }

    fn create_durable_subscriber(
        &mut self,
        topic: &Destination,
        name: &str,
        selector: Option<&str>,
    ) -> TransportResult<Box<dyn Consumer>> {
        {
            let mut state = self.shared.lock();
            let reuse = state
                .subscriptions
                .get(name)
                .is_some_and(|s| s.durable && s.topic == topic.name);
            if !reuse {
                state.subscriptions.insert(
                    name.to_string(),
                    Subscription {
                        topic: topic.name.clone(),
                        durable: true,
                        messages: VecDeque::new(),
                    },
                );
            }
        }
        self.open_consumer(Source::Subscription(name.to_string()), selector, false)
    }

    fn create_browser(
        &mut self,
        queue: &Destination,
        selector: Option<&str>,
    ) -> TransportResult<Box<dyn Consumer>> {
        self.open_consumer(Source::Queue(queue.clone()), selector, true)
    }

    fn create_temporary_queue(&mut self) -> TransportResult<Destination> {
        let mut state = self.shared.lock();
        state.session(self.id)?;
        let destination = Destination::temporary_queue(format!("TempQueue-{}", Uuid::new_v4()));
        state.queues.insert(destination.clone(), VecDeque::new());
        trace!("Created {destination}");
        Ok(destination)
    }

    fn unsubscribe(&mut self, name: &str) -> TransportResult<()> {
        let mut state = self.shared.lock();
        let in_use = state
            .consumers
            .values()
            .any(|c| !c.closed && c.source == Source::Subscription(name.to_string()));
        if in_use {
            return Err(TransportError::other(format!(
                "durable subscription {name} has an active consumer"
            )));
        }
        match state.subscriptions.get(name) {
            Some(subscription) if subscription.durable => {
                state.subscriptions.remove(name);
                state.events.push(BrokerEvent::Unsubscribed {
                    name: name.to_string(),
                });
                Ok(())
            }
            _ => Err(TransportError::other(format!(
                "no durable subscription named {name}"
            ))),
        }
    }

    fn acknowledge(&mut self) -> TransportResult<()> {
        let mut state = self.shared.lock();
        let session = state.session(self.id)?;
        if session.transacted || session.ack_mode != AckMode::Client {
            return Ok(());
        }
        session.delivered.clear();
        state.events.push(BrokerEvent::Acknowledged { session: self.id });
        Ok(())
    }

    fn commit(&mut self) -> TransportResult<()> {
        let mut state = self.shared.lock();
        let session = state.session(self.id)?;
        if !session.transacted {
            return Err(TransportError::other("commit called on a non transacted session"));
        }
        let pending = std::mem::take(&mut session.pending);
        session.delivered.clear();
        for (destination, message) in pending {
            state.route(&destination, message);
            state.events.push(BrokerEvent::Sent {
                session: self.id,
                address: destination.name.clone(),
            });
        }
        state.events.push(BrokerEvent::Committed { session: self.id });
        self.shared.available.notify_all();
        Ok(())
    }

    fn rollback(&mut self) -> TransportResult<()> {
        let mut state = self.shared.lock();
        let session = state.session(self.id)?;
        if !session.transacted {
            return Err(TransportError::other("rollback called on a non transacted session"));
        }
        session.pending.clear();
        let delivered = std::mem::take(&mut session.delivered);
        state.requeue(delivered);
        state.events.push(BrokerEvent::RolledBack { session: self.id });
        self.shared.available.notify_all();
        Ok(())
    }

    fn recover(&mut self) -> TransportResult<()> {
        let mut state = self.shared.lock();
        let session = state.session(self.id)?;
        if session.transacted {
            return Err(TransportError::other("Cannot call recover() on a transacted session"));
        }
        let delivered = std::mem::take(&mut session.delivered);
        state.requeue(delivered);
        state.events.push(BrokerEvent::Recovered { session: self.id });
        self.shared.available.notify_all();
        Ok(())
    }

    fn close(&mut self) -> TransportResult<()> {
        let mut state = self.shared.lock();
        let Some(session) = state.sessions.get_mut(&self.id) else {
            return Ok(());
        };
        if session.closed {
            return Ok(());
        }
        session.closed = true;
        session.pending.clear();
        let delivered = std::mem::take(&mut session.delivered);
        state.requeue(delivered);
        state.events.push(BrokerEvent::SessionClosed { session: self.id });
        self.shared.available.notify_all();
        Ok(())
    }
}

struct MemoryProducer {
    shared: Arc<Shared>,
    id: u64,
    session: u64,
    destination: Option<Destination>,
    settings: ProducerSettings,
    closed: bool,
}

impl Producer for MemoryProducer {
    fn configure(&mut self, settings: ProducerSettings) {
        self.settings = settings;
    }

    fn send(&mut self, message: &mut Message) -> TransportResult<()> {
        let destination = self
            .destination
            .clone()
            .ok_or_else(|| TransportError::other("producer has no destination"))?;
        self.send_to(&destination, message)
    }

    fn send_to(&mut self, destination: &Destination, message: &mut Message) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::other(format!("producer {} is closed", self.id)));
        }
        let mut state = self.shared.lock();
        let transacted = state.session(self.session)?.transacted;

        if let Some(remaining) = state.releases.get_mut(&destination.name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::new(
                    TransportErrorKind::DeliveryReleased,
                    format!("message to {} was released", destination.name),
                ));
            }
        }

        let now = now_ms();
        message.destination = Some(destination.clone());
        message.durable = self.settings.durable;
        message.priority = self.settings.priority;
        message.timestamp = if self.settings.disable_timestamp { 0 } else { now };
        message.expiration = if self.settings.ttl_ms > 0 {
            now + self.settings.ttl_ms
        } else {
            0
        };
        if self.settings.disable_message_id {
            message.id = None;
        } else if message.id.is_none() {
            message.id = Some(format!("ID:{}", Uuid::new_v4()));
        }

        if transacted {
            state
                .session(self.session)?
                .pending
                .push((destination.clone(), message.clone()));
        } else {
            state.route(destination, message.clone());
            state.events.push(BrokerEvent::Sent {
                session: self.session,
                address: destination.name.clone(),
            });
            self.shared.available.notify_all();
        }
        Ok(())
    }

    fn close(&mut self) -> TransportResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.shared
            .lock()
            .events
            .push(BrokerEvent::ProducerClosed { producer: self.id });
        Ok(())
    }
}

struct ListenerHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

struct MemoryConsumer {
    shared: Arc<Shared>,
    id: u64,
    listener: Option<ListenerHandle>,
}

impl Consumer for MemoryConsumer {
    fn receive(&mut self, timeout: ReceiveTimeout) -> TransportResult<Option<Message>> {
        let deadline = timeout.duration().map(|d| Instant::now() + d);
        let mut state = self.shared.lock();
        loop {
            if let Some(message) = state.take(self.id)? {
                return Ok(Some(message));
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.shared
                        .available
                        .wait_timeout(state, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|e| e.into_inner().0)
                }
                None => self
                    .shared
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn set_listener(&mut self, mut listener: MessageListener) -> TransportResult<()> {
        if self.listener.is_some() {
            return Err(TransportError::other("a listener is already installed"));
        }
        let stop = Arc::new(AtomicBool::new(false));
        let shared = self.shared.clone();
        let id = self.id;
        let flag = stop.clone();
        let thread = std::thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                let next = {
                    let mut state = shared.lock();
                    let taken = state.take(id);
                    match taken {
                        Ok(Some(message)) => Some(message),
                        Ok(None) => {
                            let _ = shared.available.wait_timeout(state, LISTENER_WAIT);
                            None
                        }
                        Err(_) => break,
                    }
                };
                if let Some(message) = next {
                    listener(message);
                }
            }
        });
        self.listener = Some(ListenerHandle { stop, thread });
        Ok(())
    }

    fn close(&mut self) -> TransportResult<()> {
        if let Some(handle) = self.listener.take() {
            handle.stop.store(true, Ordering::SeqCst);
            self.shared.available.notify_all();
            if handle.thread.join().is_err() {
                debug!("Listener of consumer {} panicked", self.id);
            }
        }
        let mut state = self.shared.lock();
        let Some(consumer) = state.consumers.get_mut(&self.id) else {
            return Ok(());
        };
        if consumer.closed {
            return Ok(());
        }
        consumer.closed = true;
        if let Source::Subscription(name) = consumer.source.clone() {
            if state.subscriptions.get(&name).is_some_and(|s| !s.durable) {
                state.subscriptions.remove(&name);
            }
        }
        state
            .events
            .push(BrokerEvent::ConsumerClosed { consumer: self.id });
        Ok(())
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        if let Some(handle) = &self.listener {
            handle.stop.store(true, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    identifier: String,
    op: Op,
    literal: Literal,
}

/// `ident op literal` clauses joined with `AND`.
#[derive(Debug, Clone, PartialEq)]
struct Selector {
    clauses: Vec<Clause>,
}

impl Selector {
    fn parse(text: &str) -> TransportResult<Selector> {
        let invalid = || TransportError::new(TransportErrorKind::InvalidSelector, text);
        let conjunction = Regex::new(r"(?i)\s+AND\s+").map_err(|_| invalid())?;
        let clause = Regex::new(
            r"(?i)^\s*([A-Za-z_$][\w$.]*)\s*(<>|<=|>=|=|<|>)\s*('(?:[^']|'')*'|-?\d+(?:\.\d+)?|TRUE|FALSE)\s*$",
        )
        .map_err(|_| invalid())?;

        let mut clauses = Vec::new();
        for part in conjunction.split(text) {
            let caps = clause.captures(part).ok_or_else(invalid)?;
            let op = match &caps[2] {
                "=" => Op::Eq,
                "<>" => Op::Ne,
                "<" => Op::Lt,
                ">" => Op::Gt,
                "<=" => Op::Le,
                _ => Op::Ge,
            };
            let raw = &caps[3];
            let literal = if let Some(inner) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
                Literal::Str(inner.replace("''", "'"))
            } else if raw.eq_ignore_ascii_case("true") {
                Literal::Bool(true)
            } else if raw.eq_ignore_ascii_case("false") {
                Literal::Bool(false)
            } else {
                Literal::Num(raw.parse().map_err(|_| invalid())?)
            };
            clauses.push(Clause {
                identifier: caps[1].to_string(),
                op,
                literal,
            });
        }
        Ok(Selector { clauses })
    }

    fn matches(&self, message: &Message) -> bool {
        self.clauses.iter().all(|clause| {
            lookup(message, &clause.identifier)
                .is_some_and(|actual| compare(&actual, clause.op, &clause.literal))
        })
    }
}

fn lookup(message: &Message, identifier: &str) -> Option<Literal> {
    let header = match identifier {
        "JMSPriority" => Some(Literal::Num(f64::from(message.priority))),
        "JMSMessageID" => message.id.clone().map(Literal::Str),
        "JMSCorrelationID" => message.correlation_id.clone().map(Literal::Str),
        "JMSType" => message.jms_type.clone().map(Literal::Str),
        "JMSTimestamp" => Some(Literal::Num(message.timestamp as f64)),
        "JMSRedelivered" => Some(Literal::Bool(message.redelivered)),
        "JMSDeliveryMode" => Some(Literal::Str(
            if message.durable { "PERSISTENT" } else { "NON_PERSISTENT" }.to_string(),
        )),
        _ => None,
    };
    if header.is_some() {
        return header;
    }
    message.property(identifier).map(|value| match value {
        PropertyValue::Bool(b) => Literal::Bool(*b),
        PropertyValue::String(s) => Literal::Str(s.clone()),
        numeric => Literal::Num(numeric.as_f64().unwrap_or(f64::NAN)),
    })
}

fn compare(actual: &Literal, op: Op, expected: &Literal) -> bool {
    match (actual, expected) {
        (Literal::Num(a), Literal::Num(b)) => match op {
            Op::Eq => a == b,
            Op::Ne => a != b,
            Op::Lt => a < b,
            Op::Gt => a > b,
            Op::Le => a <= b,
            Op::Ge => a >= b,
        },
        (Literal::Str(a), Literal::Str(b)) => match op {
            Op::Eq => a == b,
            Op::Ne => a != b,
            _ => false,
        },
        (Literal::Bool(a), Literal::Bool(b)) => match op {
            Op::Eq => a == b,
            Op::Ne => a != b,
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Body;

    fn text(body: &str) -> Message {
        Message::new(Body::Text(body.to_string()))
    }

    fn started_session(
        broker: &MemoryBroker,
        transacted: bool,
        ack: AckMode,
    ) -> (Box<dyn Connection>, Box<dyn Session>) {
        let mut connection = broker.connect("amqp://localhost:5672", None).unwrap();
        let session = connection.create_session(transacted, ack).unwrap();
        connection.start().unwrap();
        (connection, session)
    }

    fn body_of(message: Option<Message>) -> Option<String> {
        message.and_then(|m| match m.body {
            Body::Text(t) => Some(t),
            _ => None,
        })
    }

    #[test]
    fn queue_is_fifo() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("q");
        let (_c, mut session) = started_session(&broker, false, AckMode::Auto);
        let mut producer = session.create_producer(Some(&queue)).unwrap();
        for body in ["a", "b"] {
            producer.send(&mut text(body)).unwrap();
        }
        let mut consumer = session.create_consumer(&queue, None).unwrap();
        assert_eq!(body_of(consumer.receive(ReceiveTimeout::NoWait).unwrap()).as_deref(), Some("a"));
        assert_eq!(body_of(consumer.receive(ReceiveTimeout::NoWait).unwrap()).as_deref(), Some("b"));
        assert!(consumer.receive(ReceiveTimeout::NoWait).unwrap().is_none());
    }

    #[test]
    fn send_stamps_headers() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("q");
        let (_c, mut session) = started_session(&broker, false, AckMode::Auto);
        let mut producer = session.create_producer(Some(&queue)).unwrap();
        producer.configure(ProducerSettings {
            ttl_ms: 1_000,
            priority: 7,
            ..ProducerSettings::default()
        });
        let mut message = text("x");
        producer.send(&mut message).unwrap();
        assert!(message.id.as_deref().is_some_and(|id| id.starts_with("ID:")));
        assert_eq!(message.priority, 7);
        assert_eq!(message.ttl(), 1_000);
        assert_eq!(message.destination, Some(queue));
    }

    #[test]
    fn consumers_wait_for_connection_start() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("q");
        broker.publish(&queue, text("x"));
        let mut connection = broker.connect("amqp://h:1", None).unwrap();
        let mut session = connection.create_session(false, AckMode::Auto).unwrap();
        let mut consumer = session.create_consumer(&queue, None).unwrap();
        assert!(consumer.receive(ReceiveTimeout::NoWait).unwrap().is_none());
        connection.start().unwrap();
        assert!(consumer.receive(ReceiveTimeout::NoWait).unwrap().is_some());
    }

    #[test]
    fn transacted_sends_wait_for_commit() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("q");
        let (_c, mut session) = started_session(&broker, true, AckMode::Auto);
        let mut producer = session.create_producer(Some(&queue)).unwrap();
        producer.send(&mut text("a")).unwrap();
        assert_eq!(broker.queue_depth(&queue), 0);
        session.commit().unwrap();
        assert_eq!(broker.queue_depth(&queue), 1);

        producer.send(&mut text("b")).unwrap();
        session.rollback().unwrap();
        assert_eq!(broker.queue_depth(&queue), 1);
    }

    #[test]
    fn rollback_redelivers_received_messages() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("q");
        broker.publish(&queue, text("a"));
        let (_c, mut session) = started_session(&broker, true, AckMode::Auto);
        let mut consumer = session.create_consumer(&queue, None).unwrap();

        let first = consumer.receive(ReceiveTimeout::NoWait).unwrap().unwrap();
        assert!(!first.redelivered);
        assert_eq!(first.delivery_count(), 1);
        session.rollback().unwrap();

        let again = consumer.receive(ReceiveTimeout::NoWait).unwrap().unwrap();
        assert!(again.redelivered);
        assert_eq!(again.delivery_count(), 2);
        session.commit().unwrap();
        assert_eq!(broker.queue_depth(&queue), 0);
    }

    #[test]
    fn client_ack_recover_and_close() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("q");
        broker.publish(&queue, text("a"));
        broker.publish(&queue, text("b"));
        let (_c, mut session) = started_session(&broker, false, AckMode::Client);
        let mut consumer = session.create_consumer(&queue, None).unwrap();

        consumer.receive(ReceiveTimeout::NoWait).unwrap().unwrap();
        session.acknowledge().unwrap();
        consumer.receive(ReceiveTimeout::NoWait).unwrap().unwrap();
        session.recover().unwrap();
        assert_eq!(broker.queue_depth(&queue), 1);

        consumer.receive(ReceiveTimeout::NoWait).unwrap().unwrap();
        consumer.close().unwrap();
        session.close().unwrap();
        assert_eq!(broker.queue_depth(&queue), 1);
    }

    #[test]
    fn topics_fan_out_and_durable_subscriptions_persist() {
        let broker = MemoryBroker::new();
        let topic = Destination::topic("news");
        let (_c, mut session) = started_session(&broker, false, AckMode::Auto);
        let mut plain = session.create_consumer(&topic, None).unwrap();
        let mut durable = session.create_durable_subscriber(&topic, "sub1", None).unwrap();
        durable.close().unwrap();

        broker.publish(&topic, text("hello"));
        assert!(plain.receive(ReceiveTimeout::NoWait).unwrap().is_some());
        assert_eq!(broker.subscription_depth("sub1"), Some(1));

        plain.close().unwrap();
        assert_eq!(broker.subscription_names(), vec!["sub1".to_string()]);
        session.unsubscribe("sub1").unwrap();
        assert!(broker.subscription_names().is_empty());
        assert!(session.unsubscribe("sub1").is_err());
    }

    #[test]
    fn browser_does_not_consume() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("q");
        broker.publish(&queue, text("a"));
        broker.publish(&queue, text("b"));
        let (_c, mut session) = started_session(&broker, false, AckMode::Auto);
        let mut browser = session.create_browser(&queue, None).unwrap();
        assert!(browser.receive(ReceiveTimeout::NoWait).unwrap().is_some());
        assert!(browser.receive(ReceiveTimeout::NoWait).unwrap().is_some());
        assert!(browser.receive(ReceiveTimeout::NoWait).unwrap().is_none());
        assert_eq!(broker.queue_depth(&queue), 2);
    }

    #[test]
    fn selectors_filter_messages() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("q");
        let mut red = text("red");
        red.set_property("color", PropertyValue::String("red".into()));
        red.set_property("size", PropertyValue::Int(3));
        let mut blue = text("blue");
        blue.set_property("color", PropertyValue::String("blue".into()));
        broker.publish(&queue, blue);
        broker.publish(&queue, red);

        let (_c, mut session) = started_session(&broker, false, AckMode::Auto);
        let mut consumer = session
            .create_consumer(&queue, Some("color = 'red' AND size >= 2"))
            .unwrap();
        assert_eq!(body_of(consumer.receive(ReceiveTimeout::NoWait).unwrap()).as_deref(), Some("red"));
        assert!(consumer.receive(ReceiveTimeout::NoWait).unwrap().is_none());
        assert_eq!(broker.queue_depth(&queue), 1);
    }

    #[test]
    fn malformed_selector_is_reported() {
        let broker = MemoryBroker::new();
        let (_c, mut session) = started_session(&broker, false, AckMode::Auto);
        let err = session
            .create_consumer(&Destination::queue("q"), Some("color =="))
            .err()
            .unwrap();
        assert_eq!(err.kind, TransportErrorKind::InvalidSelector);
    }

    #[test]
    fn released_sends_fail_until_exhausted() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("q");
        broker.release_next("q", 1);
        let (_c, mut session) = started_session(&broker, false, AckMode::Auto);
        let mut producer = session.create_producer(Some(&queue)).unwrap();
        let err = producer.send(&mut text("a")).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::DeliveryReleased);
        producer.send(&mut text("a")).unwrap();
        assert_eq!(broker.queue_depth(&queue), 1);
    }

    #[test]
    fn listener_receives_on_its_own_thread() {
        let broker = MemoryBroker::new();
        let queue = Destination::queue("q");
        let (_c, mut session) = started_session(&broker, false, AckMode::Auto);
        let mut consumer = session.create_consumer(&queue, None).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        consumer
            .set_listener(Box::new(move |m| {
                let _ = tx.send(m);
            }))
            .unwrap();
        broker.publish(&queue, text("async"));
        let received = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(body_of(Some(received)).as_deref(), Some("async"));
        consumer.close().unwrap();
    }

    #[test]
    fn refused_connections_and_peer_close() {
        let broker = MemoryBroker::new();
        broker.fail_next_connections(1);
        assert!(broker.connect("amqp://h:1", None).is_err());
        let mut connection = broker.connect("amqp://h:1", None).unwrap();
        broker.set_closed_by_peer(true);
        assert!(connection.close().unwrap_err().is_closed_by_peer());
    }
}
