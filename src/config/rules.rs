//! Rule configuration
//!
//! Turns the `[rules]` section into the composite rule set used by the
//! dispatcher: the command filter AND, when patterns are given, the
//! destination allow-list.

use crate::socks::{AllOf, PermitCommand, PermitDestination, RuleSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_true() -> bool {
    true
}

/// Authorization rule configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RulesConfig {
    /// Allow CONNECT
    #[serde(default = "default_true")]
    pub connect: bool,

    /// Allow BIND
    #[serde(default)]
    pub bind: bool,

    /// Allow UDP ASSOCIATE
    #[serde(default)]
    pub associate: bool,

    /// Destination allow-list; empty allows any destination
    #[serde(default)]
    pub destinations: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            connect: true,
            bind: false,
            associate: false,
            destinations: Vec::new(),
        }
    }
}

impl RulesConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        PermitDestination::from_patterns(&self.destinations).map(|_| ())
    }

    /// Build the rule set described by this section
    pub fn build(&self) -> Result<Arc<dyn RuleSet>, String> {
        let command: Arc<dyn RuleSet> =
            Arc::new(PermitCommand::new(self.connect, self.bind, self.associate));

        if self.destinations.is_empty() {
            return Ok(command);
        }

        let destinations = PermitDestination::from_patterns(&self.destinations)?;
        Ok(Arc::new(AllOf::new(vec![command, Arc::new(destinations)])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socks::{AddrSpec, AuthContext, Command, Request};
    use std::net::Ipv4Addr;

    fn allowed(rules: &Arc<dyn RuleSet>, command: Command, dest: AddrSpec) -> bool {
        rules.allow(AuthContext::default(), &Request::new(command, dest)).1
    }

    #[test]
    fn test_default_rules_allow_connect_only() {
        let rules = RulesConfig::default().build().unwrap();
        let dest = AddrSpec::ipv4(Ipv4Addr::new(1, 1, 1, 1), 443);

        assert_eq!(rules.name(), "permit-command");
        assert!(allowed(&rules, Command::Connect, dest.clone()));
        assert!(!allowed(&rules, Command::Bind, dest.clone()));
        assert!(!allowed(&rules, Command::Associate, dest));
    }

    #[test]
    fn test_destinations_compose_with_commands() {
        let config = RulesConfig {
            destinations: vec!["*.example.com:443".to_string()],
            ..Default::default()
        };
        let rules = config.build().unwrap();

        assert_eq!(rules.name(), "all-of");
        assert!(allowed(
            &rules,
            Command::Connect,
            AddrSpec::domain("www.example.com", 443)
        ));
        assert!(!allowed(
            &rules,
            Command::Connect,
            AddrSpec::domain("www.example.org", 443)
        ));
        assert!(!allowed(
            &rules,
            Command::Bind,
            AddrSpec::domain("www.example.com", 443)
        ));
    }

    #[test]
    fn test_invalid_destination_pattern() {
        let config = RulesConfig {
            destinations: vec!["host:port".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(config.build().is_err());
    }
}
