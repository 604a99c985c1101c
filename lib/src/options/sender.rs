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

pub const MSG_ID: &str = "msg-id";
pub const PROPERTY_TYPE: &str = "property-type";
pub const CONTENT_TYPE: &str = "content-type";
pub const MSG_CONTENT_TYPE: &str = "msg-content-type";
pub const MSG_CONTENT: &str = "msg-content";
pub const MSG_CONTENT_FROM_FILE: &str = "msg-content-from-file";
pub const MSG_CONTENT_BINARY: &str = "msg-content-binary";
pub const MSG_NO_TIMESTAMP: &str = "msg-no-timestamp";
pub const MSG_REPLY_TO: &str = "msg-reply-to";
pub const MSG_SUBJECT: &str = "msg-subject";
pub const MSG_TTL: &str = "msg-ttl";
pub const MSG_PRIORITY: &str = "msg-priority";
pub const MSG_CORRELATION_ID: &str = "msg-correlation-id";
pub const MSG_USER_ID: &str = "msg-user-id";
pub const MSG_GROUP_ID: &str = "msg-group-id";
pub const MSG_GROUP_SEQ: &str = "msg-group-seq";
pub const MSG_REPLY_TO_GROUP_ID: &str = "msg-reply-to-group-id";
pub const ON_RELEASE: &str = "on-release";

/// Value of `msg-id` that disables message ids.
pub const NO_ID: &str = "noid";

pub const SLEEP_BEFORE_SEND: &str = "before-send";
pub const SLEEP_AFTER_SEND: &str = "after-send";
pub const SLEEP_AFTER_SEND_TX: &str = "after-send-tx-action";

pub(crate) fn options() -> Vec<ClientOption> {
    vec![
        ClientOption::new(ADDRESS, Some('a'), "QUEUE/TOPIC", "", "queue or topic name"),
        ClientOption::new(TIMEOUT, Some('t'), "TIMEOUT", "0", "timeout in seconds to wait before exiting"),
        ClientOption::new(COUNT, Some('c'), "MSG_COUNT", "1", "number of messages to send"),
        ClientOption::new(DURATION, Some('d'), "DURATION", "0", "message actions total duration in seconds"),
        ClientOption::new(
            DURATION_MODE,
            None,
            "MODE",
            SLEEP_AFTER_SEND,
            "in which phase the duration sleeps happen (before-send|after-send|after-send-tx-action)",
        ),
        ClientOption::new(MSG_ID, Some('i'), "MSG_ID", "", "use the supplied id instead of generating one, noid disables ids"),
        ClientOption::new(PROPERTY_TYPE, None, "PTYPE", "String", "specify the type of message properties"),
        ClientOption::new(MSG_PROPERTY, None, "KEY=PVALUE", "", "specify a message property, repeatable").multi(),
        ClientOption::new(CONTENT_TYPE, None, "CTYPE", "String", "type of the message content (string|int|long|float|double|bool|object)"),
        ClientOption::new(MSG_CONTENT_TYPE, None, "MSGTYPE", "", "amqp content-type header of the message"),
        ClientOption::new(MSG_CONTENT_FROM_FILE, None, "PATH", "", "read the message content from a file"),
        ClientOption::new(MSG_CONTENT, None, "CONTENT", "", "message content"),
        ClientOption::new(MSG_CONTENT_BINARY, None, "BINARY", "false", "send the content as a bytes message"),
        ClientOption::new(MSG_CONTENT_LIST_ITEM, Some('L'), "VALUE", "", "list item of a stream message, repeatable").multi(),
        ClientOption::new(MSG_CONTENT_MAP_ITEM, Some('M'), "KEY=VALUE", "", "map entry of a map message, repeatable").multi(),
        ClientOption::new(MSG_NO_TIMESTAMP, None, "BOOL", "false", "do not set the message timestamp"),
        ClientOption::new(MSG_REPLY_TO, None, "REPLYTO", "", "reply-to destination of the message"),
        ClientOption::new(MSG_SUBJECT, None, "SUBJECT", "", "subject of the message"),
        ClientOption::new(MSG_DURABLE, None, "DURABLE", "yes", "send persistent messages (yes|no|true|false)"),
        ClientOption::new(MSG_TTL, None, "TTL", "0", "message time to live in milliseconds"),
        ClientOption::new(MSG_PRIORITY, None, "PRIORITY", "4", "message priority (0-9)"),
        ClientOption::new(MSG_CORRELATION_ID, None, "ID", "", "correlation id of the message"),
        ClientOption::new(MSG_USER_ID, None, "USER", "", "JMSXUserID of the message"),
        ClientOption::new(MSG_GROUP_ID, None, "GROUP", "", "JMSXGroupID of the message"),
        ClientOption::new(MSG_GROUP_SEQ, None, "SEQ", "", "JMSXGroupSeq of the message"),
        ClientOption::new(MSG_REPLY_TO_GROUP_ID, None, "GROUP", "", "reply-to group id of the message"),
        ClientOption::new(LOG_MSGS, None, "LOGMSGFMT", "upstream", "message reporting style (dict|body|interop|json|upstream|none)"),
        ClientOption::new(OUT, None, "FORMAT", "repr", "print messages as python repr or json (repr|json)"),
        ClientOption::new(TX_SIZE, None, "TXBSIZE", "0", "transactional mode: batch message count size"),
        ClientOption::new(TX_ACTION, None, "TXACTION", "commit", "transactional action at the end of each batch (commit|rollback|recover|none)"),
        ClientOption::new(TX_ENDLOOP_ACTION, None, "TXACTION", "None", "transactional action after the sending loop"),
        ClientOption::new(SYNC_MODE, None, "SMODE", "action", "synchronization mode"),
        ClientOption::new(CAPACITY, None, "CAPACITY", "-1", "sender capacity"),
        ClientOption::new(ON_RELEASE, None, "ACTION", "fail", "what to do when the broker releases a message (fail|retry)"),
    ]
}
