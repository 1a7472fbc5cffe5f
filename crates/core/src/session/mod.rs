pub mod reconciliation_session;
