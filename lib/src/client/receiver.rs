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

use super::{
    ack_mode, destination, do_transaction, open_connection, sleep_until_next_iteration,
    ClientObjects, RecordSink,
};
use crate::error::{Error, Result};
use crate::formatter::MessageFormatter;
use crate::message::{Body, Message};
use crate::options::receiver::*;
use crate::options::*;
use crate::transport::{AckMode, ConnectionFactory, Consumer, ReceiveTimeout, Session};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};
use uuid::Uuid;

const LISTENER_IDLE: Duration = Duration::from_millis(50);
const DEFAULT_SUBSCRIPTION_PREFIX: &str = "qpid-jms-";

/// Where received bodies are written, one file per message.
#[derive(Debug, Clone, Default)]
struct BodyFiles {
    binary_prefix: String,
    content_prefix: String,
}

impl BodyFiles {
    fn path(prefix: &str, index: u64) -> PathBuf {
        PathBuf::from(format!("{prefix}_{index}"))
    }

    fn write(&self, message: &Message, index: u64) -> Result<()> {
        if !self.binary_prefix.is_empty() {
            if let Body::Bytes(bytes) = &message.body {
                let path = Self::path(&self.binary_prefix, index);
                debug!("Write binary content to file '{}'.", path.display());
                std::fs::write(path, bytes)?;
            }
        }
        if !self.content_prefix.is_empty() {
            let path = Self::path(&self.content_prefix, index);
            debug!("Write content to file '{}'.", path.display());
            std::fs::write(path, message.body.to_bytes())?;
        }
        Ok(())
    }
}

/// Progress shared with the listener thread.
#[derive(Clone)]
struct ListenerState {
    received: Arc<AtomicU64>,
    last: Arc<Mutex<Instant>>,
}

impl ListenerState {
    fn new() -> Self {
        ListenerState {
            received: Arc::new(AtomicU64::new(0)),
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    fn touch(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn quiet_for(&self) -> Duration {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).elapsed()
    }
}

pub struct ReceiverClient {
    options: ClientOptions,
    sink: RecordSink,
}

impl ReceiverClient {
    pub fn new(options: ClientOptions, sink: RecordSink) -> Self {
        ReceiverClient { options, sink }
    }

    fn count(&self) -> Result<u64> {
        Ok(self.options.int_value(COUNT)?.max(0) as u64)
    }

    fn timeout(&self) -> Result<ReceiveTimeout> {
        if self.options.bool_value(FOREVER) {
            return Ok(ReceiveTimeout::Forever);
        }
        Ok(ReceiveTimeout::from_seconds(self.options.int_value(TIMEOUT)?))
    }

    fn selector(&self) -> Option<&str> {
        Some(self.options.value(MSG_SELECTOR)).filter(|s| !s.is_empty())
    }

    fn body_files(&self) -> BodyFiles {
        BodyFiles {
            binary_prefix: self.options.value(MSG_BINARY_CONTENT_TO_FILE).to_string(),
            content_prefix: self.options.value(MSG_CONTENT_TO_FILE).to_string(),
        }
    }

    /// The configured durable subscription name, or a generated one.
    fn subscription_name(&self) -> String {
        let name = self.options.value(DURABLE_SUBSCRIBER_NAME);
        if !name.is_empty() {
            return name.to_string();
        }
        let prefix = match self.options.value(DURABLE_SUBSCRIBER_PREFIX) {
            "" => DEFAULT_SUBSCRIPTION_PREFIX,
            custom => custom,
        };
        let name = format!("{prefix}{}", Uuid::new_v4());
        debug!("DurableSubscriptionName={name}");
        name
    }

    pub fn start(&self, factory: &dyn ConnectionFactory) -> Result<()> {
        let mut objects = ClientObjects::default();
        let outcome = if self.options.bool_value(UNSUBSCRIBE)
            && !self.options.value(DURABLE_SUBSCRIBER_NAME).is_empty()
        {
            self.unsubscribe(factory, &mut objects)
        } else {
            self.consume_messages(factory, &mut objects)
        };
        match &outcome {
            Err(Error::InvalidSelector(selector)) => {
                error!("Invalid selector \"{selector}\" has been specified.")
            }
            Err(e) => error!("Exception while consuming message! {e}"),
            Ok(()) => {}
        }
        let close_sleep = self.options.float_value(CLOSE_SLEEP)?;
        let closed = objects.close_all(close_sleep);
        outcome.and(closed)
    }

    fn open_session(
        &self,
        factory: &dyn ConnectionFactory,
        objects: &mut ClientObjects,
    ) -> Result<usize> {
        let connection = open_connection(&self.options, factory, objects)?;
        let transacted = self.options.bool_value(TRANSACTED);
        let session = objects.connections[connection].create_session(transacted, ack_mode(&self.options)?)?;
        objects.sessions.push(session);
        Ok(connection)
    }

    fn unsubscribe(&self, factory: &dyn ConnectionFactory, objects: &mut ClientObjects) -> Result<()> {
        self.open_session(factory, objects)?;
        let name = self.options.value(DURABLE_SUBSCRIBER_NAME);
        if let Err(e) = objects.sessions[0].unsubscribe(name) {
            error!("Error while unsubscribing durable subscriptor {name}: {e}");
        }
        Ok(())
    }

    fn consume_messages(&self, factory: &dyn ConnectionFactory, objects: &mut ClientObjects) -> Result<()> {
        let options = &self.options;
        let connection = self.open_session(factory, objects)?;
        let target = destination(options);
        let selector = self.selector();

        let session = objects.sessions[0].as_mut();
        let consumer = if options.bool_value(BROWSER) {
            session.create_browser(&target, selector)?
        } else if options.bool_value(DURABLE_SUBSCRIBER) && target.is_topic() {
            session.create_durable_subscriber(&target, &self.subscription_name(), selector)?
        } else {
            session.create_consumer(&target, selector)?
        };
        objects.consumers.push(consumer);

        let formatter = MessageFormatter::from_options(options)?;
        if options.bool_value(MSG_LISTENER) {
            let state = ListenerState::new();
            self.install_listener(objects.consumers[0].as_mut(), formatter, state.clone())?;
            objects.connections[connection].start()?;
            let received = self.idle_while_listening(&state)?;
            debug!("Listener received {received} messages");
            if objects.sessions[0].is_transacted() {
                do_transaction(objects.sessions[0].as_mut(), options.value(TX_ENDLOOP_ACTION))?;
            }
            return Ok(());
        }

        objects.connections[connection].start()?;
        let session = objects.sessions[0].as_mut();
        let consumer = objects.consumers[0].as_mut();
        if options.bool_value(BROWSER) {
            return self.browse(consumer, &formatter);
        }
        self.receive_loop(session, consumer, &formatter)?;

        if session.is_transacted() {
            trace!("Performing tx-endloop-action {}", options.value(TX_ENDLOOP_ACTION));
            do_transaction(session, options.value(TX_ENDLOOP_ACTION))?;
        }
        Ok(())
    }

    fn report(&self, formatter: &MessageFormatter, message: &Message) -> Result<()> {
        if let Some(record) = formatter.format(message) {
            self.sink.write_record(&record)?;
        }
        Ok(())
    }

    fn receive_loop(
        &self,
        session: &mut dyn Session,
        consumer: &mut dyn Consumer,
        formatter: &MessageFormatter,
    ) -> Result<()> {
        let options = &self.options;
        let count = self.count()?;
        let timeout = self.timeout()?;
        let duration = options.float_value(DURATION)? * 1000.0;
        let duration_mode = options.value(DURATION_MODE).to_lowercase();
        let tx_size = options.int_value(TX_SIZE)?.max(0) as u64;
        let tx_action = options.value(TX_ACTION);
        let process_reply_to = options.bool_value(PROCESS_REPLY_TO);
        let files = self.body_files();

        let start = Instant::now();
        let mut received: u64 = 0;
        loop {
            if duration_mode == SLEEP_BEFORE_RECEIVE {
                trace!("Sleeping before receive");
                sleep_until_next_iteration(start, count, duration, received + 1);
            }

            let message = consumer.receive(timeout)?;

            if duration_mode == SLEEP_AFTER_RECEIVE {
                trace!("Sleeping after receive");
                sleep_until_next_iteration(start, count, duration, received + 1);
            }

            match &message {
                Some(message) => {
                    if session.ack_mode() == AckMode::Client && !session.is_transacted() {
                        session.acknowledge()?;
                    }
                    files.write(message, received)?;
                    received += 1;
                    self.report(formatter, message)?;
                    if duration_mode == SLEEP_AFTER_RECEIVE_ACTION {
                        trace!("Sleeping after receive action");
                        sleep_until_next_iteration(start, count, duration, received + 1);
                    }
                    if session.is_transacted() && tx_size != 0 && received % tx_size == 0 {
                        do_transaction(session, tx_action)?;
                        if duration_mode == SLEEP_AFTER_RECEIVE_TX {
                            trace!("Sleeping after transaction");
                            sleep_until_next_iteration(start, count, duration, received + 1);
                        }
                    }
                }
                None => trace!("Did not receive any message!"),
            }

            if process_reply_to {
                if let Some(mut reply) = message.clone() {
                    if let Some(reply_to) = reply.reply_to.take() {
                        let mut producer = session.create_producer(Some(&reply_to))?;
                        producer.send(&mut reply)?;
                        producer.close()?;
                    }
                }
            }

            if received == count || message.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Reads the queue without consuming, stopping when it is exhausted or at `count`.
    fn browse(&self, browser: &mut dyn Consumer, formatter: &MessageFormatter) -> Result<()> {
        let count = self.count()?;
        let files = self.body_files();
        let mut browsed: u64 = 0;
        while let Some(message) = browser.receive(ReceiveTimeout::NoWait)? {
            files.write(&message, browsed)?;
            browsed += 1;
            self.report(formatter, &message)?;
            if browsed == count {
                break;
            }
        }
        debug!("Browsed {browsed} messages");
        Ok(())
    }

    fn install_listener(
        &self,
        consumer: &mut dyn Consumer,
        formatter: MessageFormatter,
        state: ListenerState,
    ) -> Result<()> {
        let count = self.count()?;
        let sink = self.sink.clone();
        let files = self.body_files();
        consumer.set_listener(Box::new(move |message: Message| {
            let index = state.received.fetch_add(1, Ordering::SeqCst);
            state.touch();
            if count != 0 && index >= count {
                trace!("Ignoring message beyond count");
                return;
            }
            if let Err(e) = files.write(&message, index) {
                error!("Error while writing message {index} to file: {e}");
            }
            if let Some(record) = formatter.format(&message) {
                if let Err(e) = sink.write_record(&record) {
                    error!("Error while printing message {index}: {e}");
                }
            }
        }))?;
        Ok(())
    }

    /// Waits until `count` messages arrived or none arrived within the timeout.
    fn idle_while_listening(&self, state: &ListenerState) -> Result<u64> {
        let count = self.count()?;
        let window = self.timeout()?.duration();
        state.touch();
        loop {
            thread::sleep(LISTENER_IDLE);
            let received = state.received.load(Ordering::SeqCst);
            if count != 0 && received >= count {
                return Ok(count);
            }
            let quiet = state.quiet_for();
            if window.is_some_and(|window| quiet >= window) {
                return Ok(received);
            }
        }
    }
}
