use std::time::Duration;

/// Handshake configuration.
#[derive(Debug, Clone)]
pub struct Config {
    freshness_slack: f64,
    dh_freshness_budget: Duration,
    receive_timeout: Duration,
    max_queue_tx: usize,
    rng_seed: Option<u64>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            freshness_slack: 0.1,
            dh_freshness_budget: Duration::from_secs(2),
            receive_timeout: Duration::from_secs(30),
            max_queue_tx: 8,
            rng_seed: None,
        }
    }

    /// Slack margin added on top of the measured round-trip budget.
    ///
    /// The key-exchange reply must arrive within
    /// `(network + processing) * (1 + slack)` or the round is treated as a
    /// possible replay burst.
    #[inline(always)]
    pub fn freshness_slack(&self) -> f64 {
        self.freshness_slack
    }

    /// Fixed ceiling for the Diffie-Hellman round trip.
    ///
    /// Unlike the key-authentication round, this budget is not derived from
    /// measured latency.
    #[inline(always)]
    pub fn dh_freshness_budget(&self) -> Duration {
        self.dh_freshness_budget
    }

    /// How long to wait for the next datagram mid-handshake before the
    /// session restarts.
    #[inline(always)]
    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    /// Max amount of outgoing packets to buffer.
    #[inline(always)]
    pub fn max_queue_tx(&self) -> usize {
        self.max_queue_tx
    }

    /// Optional seed making all non-key randomness deterministic.
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

/// Builder for handshake configuration.
pub struct ConfigBuilder {
    freshness_slack: f64,
    dh_freshness_budget: Duration,
    receive_timeout: Duration,
    max_queue_tx: usize,
    rng_seed: Option<u64>,
}

impl ConfigBuilder {
    /// Set the slack margin for the measured round-trip budget.
    ///
    /// Defaults to 0.1 (10%).
    pub fn freshness_slack(mut self, slack: f64) -> Self {
        self.freshness_slack = slack;
        self
    }

    /// Set the fixed ceiling for the Diffie-Hellman round trip.
    ///
    /// Defaults to 2 seconds.
    pub fn dh_freshness_budget(mut self, budget: Duration) -> Self {
        self.dh_freshness_budget = budget;
        self
    }

    /// Set the mid-handshake receive timeout.
    ///
    /// An unresponsive peer past this deadline restarts the session.
    /// Defaults to 30 seconds.
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Set the max amount of outgoing packets to buffer.
    ///
    /// Defaults to 8.
    pub fn max_queue_tx(mut self, max_queue_tx: usize) -> Self {
        self.max_queue_tx = max_queue_tx;
        self
    }

    /// Seed the non-key random number generator for deterministic behavior.
    ///
    /// Defaults to unseeded (thread-local randomness).
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        Config {
            freshness_slack: self.freshness_slack,
            dh_freshness_budget: self.dh_freshness_budget,
            receive_timeout: self.receive_timeout,
            max_queue_tx: self.max_queue_tx,
            rng_seed: self.rng_seed,
        }
    }
}
