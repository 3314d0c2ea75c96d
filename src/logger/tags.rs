/// Log tags, one per subsystem
///
/// The debug key is what `DEBUG=scheduler,hub` matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Cache,
    Database,
    Chain,
    Market,
    Risk,
    Validator,
    Pricing,
    Scheduler,
    Hub,
    Webserver,
}

impl LogTag {
    /// Fixed-width label printed in the console prefix.
    pub fn label(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Config => "CONFIG",
            LogTag::Cache => "CACHE",
            LogTag::Database => "DB",
            LogTag::Chain => "CHAIN",
            LogTag::Market => "MARKET",
            LogTag::Risk => "RISK",
            LogTag::Validator => "VALIDATE",
            LogTag::Pricing => "PRICING",
            LogTag::Scheduler => "SCHED",
            LogTag::Hub => "HUB",
            LogTag::Webserver => "WEB",
        }
    }

    /// Key used for per-module debug gating.
    pub fn debug_key(&self) -> &'static str {
        match self {
            LogTag::System => "system",
            LogTag::Config => "config",
            LogTag::Cache => "cache",
            LogTag::Database => "database",
            LogTag::Chain => "chain",
            LogTag::Market => "market",
            LogTag::Risk => "risk",
            LogTag::Validator => "validator",
            LogTag::Pricing => "pricing",
            LogTag::Scheduler => "scheduler",
            LogTag::Hub => "hub",
            LogTag::Webserver => "webserver",
        }
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
