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

use super::{ack_mode, destination, open_connection, ClientObjects, RecordSink};
use crate::error::{Error, Result};
use crate::options::connector::*;
use crate::options::*;
use crate::transport::ConnectionFactory;
use tracing::{debug, error, trace};

const ADDRESS_OBJECTS: &str = "CESR";

/// Which objects to open besides connections, one letter each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ObjectControl {
    sessions: bool,
    producers: bool,
    consumers: bool,
    temporary_queues: bool,
}

impl ObjectControl {
    fn parse(letters: &str) -> Self {
        let letters = letters.to_uppercase();
        ObjectControl {
            sessions: letters.contains('E'),
            producers: letters.contains('S'),
            consumers: letters.contains('R'),
            temporary_queues: letters.contains('Q'),
        }
    }
}

pub struct ConnectorClient {
    options: ClientOptions,
    sink: RecordSink,
}

impl ConnectorClient {
    pub fn new(options: ClientOptions, sink: RecordSink) -> Self {
        ConnectorClient { options, sink }
    }

    fn object_control(&self) -> ObjectControl {
        if self.options.has_parsed_value(ADDRESS) {
            ObjectControl::parse(ADDRESS_OBJECTS)
        } else {
            ObjectControl::parse(self.options.value(OBJ_CTRL))
        }
    }

    /// Opens everything, prints `opened exceptions count` and fails with the
    /// number of collected exceptions when there are any.
    pub fn start(&self, factory: &dyn ConnectionFactory) -> Result<()> {
        let count = self.options.int_value(COUNT)?.max(0) as u64;
        debug!("sync-mode {}", self.options.value(SYNC_MODE));

        let mut objects = ClientObjects::default();
        let mut exceptions: Vec<Error> = Vec::new();
        if let Err(e) = self.create_objects(factory, count, &mut objects) {
            error!("Failed to create connection objects: {e}");
            exceptions.push(e);
        }

        let mut opened: u64 = 0;
        for connection in objects.connections.iter_mut() {
            match connection.start() {
                Ok(()) => opened += 1,
                Err(e) => {
                    error!("Failed to start a connection: {e}");
                    exceptions.push(e.into());
                }
            }
        }
        self.sink
            .write_record(&format!("{opened} {} {count}", exceptions.len()))?;

        let close_sleep = self.options.float_value(CLOSE_SLEEP)?;
        connector_outcome(exceptions.len(), objects.close_all(close_sleep))
    }

    fn create_objects(
        &self,
        factory: &dyn ConnectionFactory,
        count: u64,
        objects: &mut ClientObjects,
    ) -> Result<()> {
        let control = self.object_control();
        for _ in 0..count {
            open_connection(&self.options, factory, objects)?;
        }
        if !control.sessions {
            return Ok(());
        }

        let mode = ack_mode(&self.options)?;
        for connection in objects.connections.iter_mut() {
            objects.sessions.push(connection.create_session(false, mode)?);
        }
        let target = destination(&self.options);
        for session in objects.sessions.iter_mut() {
            if control.producers {
                objects.producers.push(session.create_producer(Some(&target))?);
            }
            if control.consumers {
                objects.consumers.push(session.create_consumer(&target, None)?);
            }
        }
        if control.temporary_queues {
            let queues = self.options.int_value(Q_COUNT)?.max(0) as u64;
            for session in objects.sessions.iter_mut().take(queues.min(count) as usize) {
                let queue = session.create_temporary_queue()?;
                trace!("Created temporary queue {queue}");
            }
        }
        trace!(
            "C={} E={} S={} R={}",
            objects.connections.len(),
            objects.sessions.len(),
            objects.producers.len(),
            objects.consumers.len()
        );
        Ok(())
    }
}

/// Collected exceptions take precedence over a failed close.
fn connector_outcome(exceptions: usize, closed: Result<()>) -> Result<()> {
    match (exceptions, closed) {
        (0, closed) => closed,
        (n, closed) => {
            if let Err(e) = closed {
                error!("Close failed after {n} exceptions: {e}");
            }
            Err(Error::ConnectorExceptions(n.min(i32::MAX as usize) as i32))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_control_letters() {
        assert_eq!(ObjectControl::parse("C"), ObjectControl::default());
        let all = ObjectControl::parse("cesrq");
        assert!(all.sessions && all.producers && all.consumers && all.temporary_queues);
        let cesr = ObjectControl::parse(ADDRESS_OBJECTS);
        assert!(cesr.sessions && cesr.producers && cesr.consumers);
        assert!(!cesr.temporary_queues);
    }

    #[test]
    fn exceptions_outrank_close_failures() {
        let closed = Err(Error::Io(std::io::Error::other("close")));
        let err = connector_outcome(2, closed).unwrap_err();
        assert!(matches!(err, Error::ConnectorExceptions(2)), "{err:?}");

        let closed = Err(Error::Io(std::io::Error::other("close")));
        assert!(matches!(connector_outcome(0, closed), Err(Error::Io(_))));
        assert!(connector_outcome(0, Ok(())).is_ok());
    }

    #[test]
    fn exception_exit_code_fits_a_process_status() {
        let err = connector_outcome(300, Ok(())).unwrap_err();
        assert_eq!(err.exit_code(), 255);
        assert!(err.to_string().contains("300"), "{err}");
    }
}
