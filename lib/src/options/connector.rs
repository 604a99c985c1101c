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

pub const OBJ_CTRL: &str = "obj-ctrl";
pub const Q_COUNT: &str = "q-count";

pub(crate) fn options() -> Vec<ClientOption> {
    vec![
        ClientOption::new(ADDRESS, Some('a'), "QUEUE/TOPIC", "", "address used by producers and consumers, forces CESR"),
        ClientOption::new(
            OBJ_CTRL,
            None,
            "OBJCTRL",
            "C",
            "objects to create: C connection, E session, S sender, R receiver, Q temporary queue",
        ),
        ClientOption::new(COUNT, Some('c'), "COUNT", "1", "number of connections"),
        ClientOption::new(Q_COUNT, None, "QCOUNT", "1", "number of temporary queues, at most count"),
        ClientOption::new(SYNC_MODE, None, "SMODE", "action", "synchronization mode"),
    ]
}
