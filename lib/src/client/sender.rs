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
    ClientObjects, RecordSink, NONE,
};
use crate::error::{Error, Result, TransportErrorKind};
use crate::formatter::MessageFormatter;
use crate::options::sender::*;
use crate::options::*;
use crate::provider::{new_provider, MessageProvider};
use crate::transport::{ConnectionFactory, ProducerSettings};
use std::time::Instant;
use tracing::{error, trace, warn};

const RETRY: &str = "retry";
const FAIL: &str = "fail";

pub struct SenderClient {
    options: ClientOptions,
    sink: RecordSink,
}

impl SenderClient {
    pub fn new(options: ClientOptions, sink: RecordSink) -> Self {
        SenderClient { options, sink }
    }

    /// The action run at every batch boundary, present when transactions were asked for.
    fn transaction(&self) -> Option<String> {
        let options = &self.options;
        if !(options.has_parsed_value(TX_SIZE) || options.has_parsed_value(TX_ENDLOOP_ACTION)) {
            return None;
        }
        let action = if options.has_parsed_value(TX_ACTION) {
            options.value(TX_ACTION)
        } else {
            options.value(TX_ENDLOOP_ACTION)
        };
        Some(action.to_lowercase())
    }

    fn producer_settings(&self) -> Result<ProducerSettings> {
        let options = &self.options;
        let durable = options.value(MSG_DURABLE).to_lowercase();
        let mut settings = ProducerSettings {
            durable: durable == "true" || durable == "yes",
            disable_timestamp: options.bool_value(MSG_NO_TIMESTAMP),
            ..ProducerSettings::default()
        };
        if options.has_parsed_value(MSG_TTL) {
            settings.ttl_ms = options.int_value(MSG_TTL)?;
        }
        if options.has_parsed_value(MSG_PRIORITY) {
            let raw = options.int_value(MSG_PRIORITY)?;
            let priority = i32::try_from(raw)
                .map_err(|_| Error::config(format!("option '{MSG_PRIORITY}' is out of range: {raw}")))?;
            if !(0..=9).contains(&priority) {
                warn!("Message priority is not in JMS interval <0, 9>.");
            }
            settings.priority = priority;
        }
        if options.has_parsed_value(MSG_ID) && options.value(MSG_ID) == NO_ID {
            settings.disable_message_id = true;
        }
        Ok(settings)
    }

    pub fn start(&self, factory: &dyn ConnectionFactory) -> Result<()> {
        let mut objects = ClientObjects::default();
        let outcome = self.send_messages(factory, &mut objects);
        if let Err(e) = &outcome {
            error!("Error while sending a message! {e}");
        }
        let close_sleep = self.options.float_value(CLOSE_SLEEP)?;
        let closed = objects.close_all(close_sleep);
        outcome.and(closed)
    }

    fn send_messages(&self, factory: &dyn ConnectionFactory, objects: &mut ClientObjects) -> Result<()> {
        let options = &self.options;
        let connection = open_connection(options, factory, objects)?;

        let transaction = self.transaction();
        let transaction_size = match &transaction {
            Some(_) => options.int_value(TX_SIZE)?.max(0) as u64,
            None => 0,
        };
        let transacted = transaction.as_deref().is_some_and(|t| t != NONE);

        let session = objects.connections[connection].create_session(transacted, ack_mode(options)?)?;
        objects.sessions.push(session);
        objects.connections[connection].start()?;

        let target = destination(options);
        let mut producer = objects.sessions[0].create_producer(Some(&target))?;
        producer.configure(self.producer_settings()?);
        objects.producers.push(producer);

        let formatter = MessageFormatter::from_options(options)?;
        let on_release = options.value(ON_RELEASE).to_lowercase();
        if on_release != FAIL && on_release != RETRY {
            return Err(Error::config(format!("unknown on-release action '{on_release}'")));
        }

        let start = Instant::now();
        let count = options.int_value(COUNT)?.max(0) as u64;
        let duration = options.float_value(DURATION)? * 1000.0;
        let duration_mode = options.value(DURATION_MODE).to_string();

        let mut provider = new_provider(options)?;
        let session = objects.sessions[0].as_mut();
        let producer = objects.producers[0].as_mut();
        let mut counter: u64 = 0;
        loop {
            let mut message = provider.provide(counter)?;

            if duration_mode == SLEEP_BEFORE_SEND {
                trace!("Sleeping before send");
                sleep_until_next_iteration(start, count, duration, counter + 1);
            }

            match producer.send(&mut message) {
                Ok(()) => {}
                Err(e) if e.kind == TransportErrorKind::DeliveryReleased => {
                    trace!("Message released [action: {on_release}]");
                    if on_release == RETRY {
                        continue;
                    }
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
            counter += 1;
            if let Some(record) = formatter.format(&message) {
                self.sink.write_record(&record)?;
            }
            provider.close()?;

            if duration_mode == SLEEP_AFTER_SEND {
                trace!("Sleeping after send");
                sleep_until_next_iteration(start, count, duration, counter + 1);
            }
            if let Some(action) = &transaction {
                if transaction_size != 0 && counter % transaction_size == 0 {
                    do_transaction(session, action)?;
                }
            }
            if duration_mode == SLEEP_AFTER_SEND_TX {
                trace!("Sleeping after send & tx action");
                sleep_until_next_iteration(start, count, duration, counter + 1);
            }
            if count != 0 && counter == count {
                break;
            }
        }

        if transaction.is_some() {
            do_transaction(session, options.value(TX_ENDLOOP_ACTION))?;
        }
        Ok(())
    }
}
