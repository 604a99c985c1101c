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

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Tokens a user may pass as the only item of a multi-valued option to ask for an empty body.
pub const EMPTY_ITEM_TOKENS: [&str; 3] = ["", "\"\"", "''"];

/// Value written into an option by the argument parser.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParsedValue {
    #[default]
    Unset,
    Single(String),
    List(Vec<String>),
}

/// A single named configuration cell with its command line metadata.
#[derive(Debug, Clone)]
pub struct ClientOption {
    name: &'static str,
    short: Option<char>,
    arg_example: &'static str,
    default: &'static str,
    description: &'static str,
    cli: bool,
    multi: bool,
    numeric: bool,
    parsed: ParsedValue,
}

impl ClientOption {
    /// A user facing option. An empty `arg_example` makes it a switch.
    pub fn new(
        name: &'static str,
        short: Option<char>,
        arg_example: &'static str,
        default: &'static str,
        description: &'static str,
    ) -> Self {
        ClientOption {
            name,
            short,
            arg_example,
            default,
            description,
            cli: true,
            multi: false,
            numeric: is_numeric(default),
            parsed: ParsedValue::Unset,
        }
    }

    /// An option derived during resolution that never appears on the command line.
    pub fn internal(name: &'static str, default: &'static str) -> Self {
        ClientOption {
            cli: false,
            ..Self::new(name, None, "", default, "")
        }
    }

    /// Marks the option as accepting repeated occurrences.
    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn short(&self) -> Option<char> {
        self.short
    }

    pub fn arg_example(&self) -> &'static str {
        self.arg_example
    }

    pub fn default_value(&self) -> &'static str {
        self.default
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn is_cli_argument(&self) -> bool {
        self.cli
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric
    }

    pub fn has_argument(&self) -> bool {
        !self.arg_example.is_empty()
    }

    pub fn parsed(&self) -> &ParsedValue {
        &self.parsed
    }

    pub fn has_parsed_value(&self) -> bool {
        self.parsed != ParsedValue::Unset
    }

    /// The parsed single value, or the default.
    pub fn value(&self) -> &str {
        match &self.parsed {
            ParsedValue::Single(v) => v,
            _ => self.default,
        }
    }

    /// The parsed items of a multi-valued option.
    pub fn values(&self) -> Option<&[String]> {
        match &self.parsed {
            ParsedValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// True when the only supplied item is one of the empty tokens.
    pub fn is_explicitly_empty(&self) -> bool {
        match self.values() {
            Some([only]) => EMPTY_ITEM_TOKENS.contains(&only.as_str()),
            _ => false,
        }
    }

    /// Stores one value. Multi-valued options keep it as a one item list.
    pub fn set_parsed_value(&mut self, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        if self.numeric && !is_numeric(&value) {
            return Err(Error::config(format!(
                "option '{}' expects a numeric value, got '{}'",
                self.name, value
            )));
        }
        self.parsed = if self.multi {
            ParsedValue::List(vec![value])
        } else {
            ParsedValue::Single(value)
        };
        Ok(())
    }

    pub fn set_parsed_values(&mut self, values: Vec<String>) -> Result<()> {
        if !self.multi {
            return match values.as_slice() {
                [single] => self.set_parsed_value(single.clone()),
                _ => Err(Error::config(format!(
                    "option '{}' accepts a single value, got {}",
                    self.name,
                    values.len()
                ))),
            };
        }
        self.parsed = ParsedValue::List(values);
        Ok(())
    }
}

static NUMERIC: OnceLock<Option<Regex>> = OnceLock::new();

/// Matches an optionally negative integer or decimal literal.
pub fn is_numeric(value: &str) -> bool {
    NUMERIC
        .get_or_init(|| Regex::new(r"^-?[0-9]+(?:\.[0-9]+)?$").ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_detection() {
        for ok in ["0", "-1", "61616", "2.0", "-0.25"] {
            assert!(is_numeric(ok), "{ok}");
        }
        for bad in ["", "-", "1.", ".5", "1x2", "HOST:61616", "1e5", " 1", "1\n", "\u{661}\u{662}"] {
            assert!(!is_numeric(bad), "{bad}");
        }
    }

    #[test]
    fn value_falls_back_to_default() {
        let mut count = ClientOption::new("count", Some('c'), "MSG_COUNT", "1", "");
        assert!(count.is_numeric());
        assert_eq!(count.value(), "1");
        count.set_parsed_value("10").unwrap();
        assert_eq!(count.value(), "10");
        assert!(count.values().is_none());
    }

    #[test]
    fn numeric_option_rejects_text() {
        let mut count = ClientOption::new("count", Some('c'), "MSG_COUNT", "1", "");
        assert!(matches!(
            count.set_parsed_value("ten"),
            Err(Error::Configuration(_))
        ));
        assert!(!count.has_parsed_value());
    }

    #[test]
    fn multi_valued_options_never_hold_a_single_value() {
        let mut items = ClientOption::new("msg-content-list-item", Some('L'), "VALUE", "", "").multi();
        items.set_parsed_value("a").unwrap();
        assert_eq!(items.parsed(), &ParsedValue::List(vec!["a".to_string()]));
        items
            .set_parsed_values(vec!["a".into(), "b".into()])
            .unwrap();
        assert_eq!(items.values().unwrap().len(), 2);
        assert_eq!(items.value(), "");
    }

    #[test]
    fn single_valued_option_refuses_many_values() {
        let mut address = ClientOption::new("address", Some('a'), "ADDRESS", "", "");
        let err = address
            .set_parsed_values(vec!["q1".into(), "q2".into()])
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn explicit_empty_item_differs_from_unset() {
        for token in EMPTY_ITEM_TOKENS {
            let mut items = ClientOption::new("msg-content-map-item", Some('M'), "KEY=VALUE", "", "").multi();
            assert!(!items.is_explicitly_empty());
            items.set_parsed_values(vec![token.to_string()]).unwrap();
            assert!(items.is_explicitly_empty());
            assert!(items.has_parsed_value());
        }
    }
}
