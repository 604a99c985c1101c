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

use mqe_lib::broker_url::ConnectionTranslation;
use mqe_lib::client::{self, RecordSink};
use mqe_lib::manager::ParseOutcome;
use mqe_lib::memory::MemoryBroker;
use mqe_lib::options::{Role, LOG_LIB};
use mqe_lib::{init_logging, PROVIDER_ENV, ROLE_ERROR_TXT};
use std::process::exit;
use tracing::error;

fn main() {
    let mut args = std::env::args().skip(1);
    let Some(role) = args.next().as_deref().and_then(Role::parse) else {
        eprintln!("{ROLE_ERROR_TXT}");
        exit(1);
    };
    let args: Vec<String> = args.collect();

    let translation = match std::env::var(PROVIDER_ENV) {
        Ok(name) => ConnectionTranslation::by_name(&name),
        Err(_) => Ok(ConnectionTranslation::qpid_jms()),
    };
    let options = match translation.and_then(|t| client::configure_with(role, &args, t)) {
        Ok((_, ParseOutcome::Help(usage))) => {
            println!("{usage}");
            exit(0);
        }
        Ok((options, ParseOutcome::Run)) => options,
        Err(e) => {
            init_logging("info");
            error!("{e}");
            exit(e.exit_code());
        }
    };

    init_logging(options.value(LOG_LIB));
    // messages live as long as this process
    let broker = MemoryBroker::new();
    if let Err(e) = client::start(options, &broker, &RecordSink::stdout()) {
        exit(e.exit_code());
    }
}
