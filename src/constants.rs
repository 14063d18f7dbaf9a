/// Database identifier used when the caller does not name one.
pub const DEFAULT_DATABASE_ID: &str = "(default)";

/// Upper bound on the number of writes a single atomic batch may carry.
pub const MAX_BATCH_WRITES: usize = 500;

/// How many times a contended transaction attempt is re-run before the
/// overall transaction is reported as aborted.
pub const MAX_TRANSACTION_ATTEMPTS: usize = 5;

/// Name of the push event carrying transaction lifecycle notifications.
pub const TRANSACTION_EVENT_NAME: &str = "docstore_transaction_event";
