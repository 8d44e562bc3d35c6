//! Pool options application trait.

use sqlx::postgres::PgPoolOptions;

use crate::ConnectOpts;

/// Trait for applying connection options to pool builders.
pub(crate) trait ApplyPoolOpts {
    /// Apply connection options to the pool builder.
    fn apply(self, opts: &ConnectOpts) -> Self;
}

impl ApplyPoolOpts for PgPoolOptions {
    fn apply(mut self, opts: &ConnectOpts) -> Self {
        self = self.max_connections(opts.max_conns);
        if let Some(t) = opts.acquire_timeout {
            self = self.acquire_timeout(t);
        }
        // sqlx reaps idle connections and recycles old ones by default; both are
        // set explicitly so `None` really means "never".
        self = self.idle_timeout(opts.idle_timeout);
        self = self.max_lifetime(opts.max_lifetime);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn applies_fixed_policy() {
        let o = PgPoolOptions::new().apply(&ConnectOpts::default());
        assert_eq!(o.get_max_connections(), 25);
        assert_eq!(o.get_idle_timeout(), None);
        assert_eq!(o.get_max_lifetime(), Some(Duration::from_secs(300)));
        assert_eq!(o.get_acquire_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn applies_custom_values() {
        let opts = ConnectOpts {
            max_conns: 3,
            acquire_timeout: Some(Duration::from_millis(250)),
            idle_timeout: Some(Duration::from_secs(30)),
            max_lifetime: None,
            statement_timeout: None,
        };
        let o = PgPoolOptions::new().apply(&opts);
        assert_eq!(o.get_max_connections(), 3);
        assert_eq!(o.get_acquire_timeout(), Duration::from_millis(250));
        assert_eq!(o.get_idle_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(o.get_max_lifetime(), None);
    }
}
