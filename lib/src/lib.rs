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

//! Configuration and execution engine shared by the sender, receiver and connector
//! messaging test clients.

pub mod broker_url;
pub mod client;
pub mod content;
pub mod error;
pub mod formatter;
pub mod manager;
pub mod memory;
pub mod message;
pub mod option;
pub mod options;
pub mod provider;
pub mod transport;

pub use error::{Error, Result};

/// Environment variable holding a filter directive that overrides `--log-lib`.
pub const LOG_ENV: &str = "MQE_LOG";
/// Environment variable naming the connection option table, `qpid-jms` when unset.
pub const PROVIDER_ENV: &str = "MQE_PROVIDER";
pub const ROLE_ERROR_TXT: &str = "first argument must be sender, receiver OR connector";

/// Installs the glog-formatted stderr subscriber at `level` unless `MQE_LOG` is set.
pub fn init_logging(level: &str) {
    use std::io::stderr;
    use std::io::IsTerminal;
    use tracing_glog::Glog;
    use tracing_glog::GlogFields;
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Registry;

    let fmt = tracing_subscriber::fmt::Layer::default()
        .with_ansi(stderr().is_terminal())
        .with_writer(std::io::stderr)
        .event_format(Glog::default().with_timer(tracing_glog::LocalTime::default()))
        .fmt_fields(GlogFields::default().compact());

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(log_directive(level)));

    if Registry::default().with(filter).with(fmt).try_init().is_err() {
        eprintln!("Logging registry already initialized");
    }
}

/// Maps client log levels onto tracing directives. Unknown levels keep only errors.
fn log_directive(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" | "all" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "off" | "none" => "off",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels() {
        assert_eq!(log_directive("TRACE"), "trace");
        assert_eq!(log_directive("all"), "trace");
        assert_eq!(log_directive("warning"), "warn");
        assert_eq!(log_directive("off"), "off");
        assert_eq!(log_directive("severe"), "error");
    }
}
