//! Request authorization rules
//!
//! A [`RuleSet`] decides whether a decoded (and possibly resolved) request
//! may proceed. Rule sets are shared by every connection, so they hold no
//! per-connection state; anything they want to remember about a decision
//! goes into the returned [`AuthContext`].

use crate::socks::context::{AuthContext, CTX_RULE};
use crate::socks::types::{Command, Request};
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

/// Decides whether a request is permitted
pub trait RuleSet: Send + Sync + Debug {
    /// Short name used in logs and context annotations
    fn name(&self) -> &str;

    /// Return the (possibly annotated) context and whether `req` is allowed
    fn allow(&self, ctx: AuthContext, req: &Request) -> (AuthContext, bool);
}

/// Allows every request
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAll;

impl RuleSet for PermitAll {
    fn name(&self) -> &str {
        "permit-all"
    }

    fn allow(&self, ctx: AuthContext, _req: &Request) -> (AuthContext, bool) {
        (ctx, true)
    }
}

/// Denies every request
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitNone;

impl RuleSet for PermitNone {
    fn name(&self) -> &str {
        "permit-none"
    }

    fn allow(&self, ctx: AuthContext, _req: &Request) -> (AuthContext, bool) {
        (ctx, false)
    }
}

/// Allows a request only if its command is enabled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermitCommand {
    /// Allow CONNECT
    pub connect: bool,
    /// Allow BIND
    pub bind: bool,
    /// Allow UDP ASSOCIATE
    pub associate: bool,
}

impl PermitCommand {
    /// Create a command filter
    pub fn new(connect: bool, bind: bool, associate: bool) -> Self {
        PermitCommand {
            connect,
            bind,
            associate,
        }
    }
}

impl RuleSet for PermitCommand {
    fn name(&self) -> &str {
        "permit-command"
    }

    fn allow(&self, ctx: AuthContext, req: &Request) -> (AuthContext, bool) {
        let allowed = match req.command {
            Command::Connect => self.connect,
            Command::Bind => self.bind,
            Command::Associate => self.associate,
            Command::Unknown(_) => false,
        };
        (ctx, allowed)
    }
}

/// A host pattern with an optional port, e.g. `*.example.com:443`
///
/// `*` matches any run of characters and `?` a single one. Host matching is
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationPattern {
    host: String,
    port: Option<u16>,
}

impl DestinationPattern {
    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let pattern = pattern.trim();

        let (host, port) = if let Some(rest) = pattern.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| format!("unterminated '[' in pattern: {}", pattern))?;
            match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if after.is_empty() => (host, None),
                None => return Err(format!("unexpected text after ']' in pattern: {}", pattern)),
            }
        } else if pattern.matches(':').count() == 1 {
            let (host, port) = pattern
                .rsplit_once(':')
                .ok_or_else(|| format!("invalid pattern: {}", pattern))?;
            (host, Some(port))
        } else {
            (pattern, None)
        };

        if host.is_empty() {
            return Err(format!("empty host in pattern: {}", pattern));
        }

        let port = port
            .map(|p| {
                p.parse::<u16>()
                    .map_err(|_| format!("invalid port in pattern: {}", pattern))
            })
            .transpose()?;

        Ok(DestinationPattern {
            host: host.to_ascii_lowercase(),
            port,
        })
    }

    /// Whether the pattern matches `host` on `port`
    pub fn matches(&self, host: &str, port: u16) -> bool {
        if let Some(expected) = self.port {
            if expected != port {
                return false;
            }
        }
        wildcard_match(self.host.as_bytes(), host.to_ascii_lowercase().as_bytes())
    }
}

impl std::fmt::Display for DestinationPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.port {
            Some(port) if self.host.contains(':') => write!(f, "[{}]:{}", self.host, port),
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => write!(f, "{}", self.host),
        }
    }
}

fn wildcard_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == b'?' || pattern[pi] == text[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < pattern.len() && pattern[pi] == b'*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }
    while pi < pattern.len() && pattern[pi] == b'*' {
        pi += 1;
    }
    pi == pattern.len()
}

/// Allows a request only if its destination matches the allow-list
///
/// The domain the client sent and the IP it resolved to (or the literal IP)
/// are both checked. The list can be extended while the server runs.
#[derive(Debug, Default)]
pub struct PermitDestination {
    patterns: RwLock<Vec<DestinationPattern>>,
}

impl PermitDestination {
    /// Create an allow-list from textual patterns
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| DestinationPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PermitDestination {
            patterns: RwLock::new(patterns),
        })
    }

    /// Add a pattern to the allow-list
    pub fn add(&self, pattern: &str) -> Result<(), String> {
        let pattern = DestinationPattern::parse(pattern)?;
        self.patterns
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(pattern);
        Ok(())
    }

    /// Number of patterns in the allow-list
    pub fn len(&self) -> usize {
        self.patterns.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the allow-list is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RuleSet for PermitDestination {
    fn name(&self) -> &str {
        "permit-destination"
    }

    fn allow(&self, ctx: AuthContext, req: &Request) -> (AuthContext, bool) {
        let port = req.dest_addr.port();
        let ip = req.dest_addr.ip().or(req.resolved_ip()).map(|ip| ip.to_string());
        let fqdn = req.dest_addr.fqdn();
        let candidates = fqdn.as_deref().into_iter().chain(ip.as_deref());

        let patterns = self.patterns.read().unwrap_or_else(|e| e.into_inner());
        for host in candidates {
            if let Some(pattern) = patterns.iter().find(|p| p.matches(host, port)) {
                let matched = format!("{}={}", self.name(), pattern);
                return (ctx.with_value(CTX_RULE, matched), true);
            }
        }
        (ctx, false)
    }
}

/// Allows a request only if every inner rule set allows it
///
/// Evaluation stops at the first denial, whose name is recorded in the
/// context.
#[derive(Debug, Default)]
pub struct AllOf {
    rules: Vec<Arc<dyn RuleSet>>,
}

impl AllOf {
    /// Combine rule sets
    pub fn new(rules: Vec<Arc<dyn RuleSet>>) -> Self {
        AllOf { rules }
    }
}

impl RuleSet for AllOf {
    fn name(&self) -> &str {
        "all-of"
    }

    fn allow(&self, mut ctx: AuthContext, req: &Request) -> (AuthContext, bool) {
        for rule in &self.rules {
            let (next, allowed) = rule.allow(ctx, req);
            if !allowed {
                return (next.with_value(CTX_RULE, rule.name()), false);
            }
            ctx = next;
        }
        (ctx, true)
    }
}

/// Allows a request if any inner rule set allows it
#[derive(Debug, Default)]
pub struct AnyOf {
    rules: Vec<Arc<dyn RuleSet>>,
}

impl AnyOf {
    /// Combine rule sets
    pub fn new(rules: Vec<Arc<dyn RuleSet>>) -> Self {
        AnyOf { rules }
    }
}

impl RuleSet for AnyOf {
    fn name(&self) -> &str {
        "any-of"
    }

    fn allow(&self, mut ctx: AuthContext, req: &Request) -> (AuthContext, bool) {
        for rule in &self.rules {
            let (next, allowed) = rule.allow(ctx, req);
            if allowed {
                return (next, true);
            }
            ctx = next;
        }
        (ctx, false)
    }
}
