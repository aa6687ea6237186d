//! Kerberos Resolution Scenario Suite
//!
//! Exercises the full resolution path in-process: simulated KDCs mint
//! service tickets from real keytab files, providers are registered through
//! the configuration store, and identities land in an in-memory user store.
//!
//! ## Suites
//!
//! - `scenarios`: multi-realm routing, priority and fall-through
//! - `validation`: expired, tampered and foreign tickets, broken keytabs
//! - `materialization`: local user import, refresh and conflicts
//! - `registry`: provider changes during dispatch
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p kerberos-scenario-tests
//! cargo test -p kerberos-scenario-tests scenarios
//! ```

mod harness;
mod materialization;
mod registry;
mod scenarios;
mod validation;
