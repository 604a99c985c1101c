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

use super::*;

pub const FOREVER: &str = "forever";
pub const ACTION: &str = "action";
pub const MSG_LISTENER: &str = "msg-listener-ena";
pub const DURABLE_SUBSCRIBER: &str = "durable-subscriber";
pub const UNSUBSCRIBE: &str = "subscriber-unsubscribe";
pub const DURABLE_SUBSCRIBER_PREFIX: &str = "durable-subscriber-prefix";
pub const DURABLE_SUBSCRIBER_NAME: &str = "durable-subscriber-name";
pub const MSG_SELECTOR: &str = "msg-selector";
pub const VERBOSE: &str = "verbose";
pub const BROWSER: &str = "recv-browse";
pub const PROCESS_REPLY_TO: &str = "process-reply-to";
pub const MSG_BINARY_CONTENT_TO_FILE: &str = "msg-binary-content-to-file";
pub const MSG_CONTENT_TO_FILE: &str = "msg-content-to-file";

pub const SLEEP_BEFORE_RECEIVE: &str = "before-receive";
pub const SLEEP_AFTER_RECEIVE: &str = "after-receive";
pub const SLEEP_AFTER_RECEIVE_ACTION: &str = "after-receive-action";
pub const SLEEP_AFTER_RECEIVE_TX: &str = "after-receive-action-tx-action";

pub(crate) fn options() -> Vec<ClientOption> {
    vec![
        ClientOption::new(ADDRESS, Some('a'), "QUEUE/TOPIC", "", "queue or topic name"),
        ClientOption::new(TIMEOUT, Some('t'), "TIMEOUT", "0", "timeout in seconds to wait before exiting"),
        ClientOption::new(FOREVER, Some('f'), "", "false", "receive forever, same as --timeout -1"),
        ClientOption::new(ACTION, None, "ACTION", "acknowledge", "action on the acquired message"),
        ClientOption::new(COUNT, Some('c'), "MSG_COUNT", "0", "number of messages to receive, 0 means all"),
        ClientOption::new(DURATION, Some('d'), "DURATION", "0", "message actions total duration in seconds"),
        ClientOption::new(
            DURATION_MODE,
            None,
            "MODE",
            SLEEP_AFTER_RECEIVE,
            "in which phase the duration sleeps happen (before-receive|after-receive|after-receive-action|after-receive-action-tx-action)",
        ),
        ClientOption::new(LOG_MSGS, None, "LOGMSGFMT", "upstream", "message reporting style (dict|body|interop|json|upstream|none)"),
        ClientOption::new(OUT, None, "FORMAT", "repr", "print messages as python repr or json (repr|json)"),
        ClientOption::new(TX_SIZE, None, "TXBSIZE", "0", "transactional mode: batch message count size"),
        ClientOption::new(TX_ACTION, None, "TXACTION", "commit", "transactional action at the end of each batch (commit|rollback|recover|none)"),
        ClientOption::new(TX_ENDLOOP_ACTION, None, "TXACTION", "None", "transactional action after the receiving loop"),
        ClientOption::new(SYNC_MODE, None, "SMODE", "action", "synchronization mode"),
        ClientOption::new(CAPACITY, None, "CAPACITY", "-1", "receiver capacity"),
        ClientOption::new(MSG_LISTENER, None, "ENABLED", "false", "receive through an asynchronous listener"),
        ClientOption::new(DURABLE_SUBSCRIBER, None, "ENABLED", "false", "create a durable topic subscription"),
        ClientOption::new(UNSUBSCRIBE, None, "ENABLED", "false", "unsubscribe the named durable subscription"),
        ClientOption::new(DURABLE_SUBSCRIBER_PREFIX, None, "PREFIX", "", "prefix of the generated durable subscription name"),
        ClientOption::new(DURABLE_SUBSCRIBER_NAME, None, "NAME", "", "name of the durable subscription"),
        ClientOption::new(MSG_SELECTOR, None, "SELECTOR", "", "message selector"),
        ClientOption::new(VERBOSE, None, "", "false", "verbose output"),
        ClientOption::new(BROWSER, None, "ENABLED", "false", "browse messages without consuming them"),
        ClientOption::new(PROCESS_REPLY_TO, None, "", "false", "send each received message to its reply-to destination"),
        ClientOption::new(MSG_BINARY_CONTENT_TO_FILE, None, "FILEPATH", "", "write each binary body to FILEPATH_<n>"),
        ClientOption::new(MSG_CONTENT_TO_FILE, None, "FILEPATH", "", "write each body to FILEPATH_<n>"),
    ]
}
