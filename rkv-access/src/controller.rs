//! # Connection Controller
//!
//! Purpose: Own the primary handle and the replica pool, route writes to the
//! primary and spread reads across replicas round-robin.
//!
//! ## Design Principles
//! 1. **Explicit Construction**: Callers build a controller and pass it around;
//!    there is no process-wide instance.
//! 2. **Isolated Endpoints**: Each replica retries on its own; one failure never
//!    aborts construction or affects another endpoint.
//! 3. **Atomic Selection**: `read_handle` selects and advances the cursor in a
//!    single atomic step.
//! 4. **Fixed Membership**: The pool is never changed after `build`.
//!
//! ## Read Selection
//!
//! ```text
//! replicas = [R0, R1, R2]
//! read_handle() -> R0, R1, R2, R0, R1, ...
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use rkv_common::{ControllerConfig, EndpointConfig, KvStore, RkvError, RkvResult};

use crate::connector::{Connector, TcpConnector};
use crate::retry::with_backoff;

/// A connected endpoint and the label used in logs and errors.
pub struct Node {
    label: String,
    store: Arc<dyn KvStore>,
}

impl Node {
    pub fn new(label: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        Node {
            label: label.into(),
            store,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }
}

impl Deref for Node {
    type Target = dyn KvStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("label", &self.label).finish()
    }
}

/// Routes writes to the primary and reads to the replica pool.
#[derive(Debug)]
pub struct Controller {
    primary: Option<Arc<Node>>,
    replicas: Vec<Arc<Node>>,
    /// Index of the replica handed out next; always `< replicas.len()` when non-empty.
    cursor: AtomicUsize,
}

impl Controller {
    /// Connects to every endpoint in `config` over TCP.
    pub fn connect(config: &ControllerConfig) -> RkvResult<Self> {
        Self::builder(config.clone()).build()
    }

    pub fn builder(config: ControllerConfig) -> ControllerBuilder {
        ControllerBuilder::new(config)
    }

    /// Assembles a controller from handles that are already connected.
    pub fn from_nodes(primary: Option<Node>, replicas: Vec<Node>) -> Self {
        Controller {
            primary: primary.map(Arc::new),
            replicas: replicas.into_iter().map(Arc::new).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next replica in round-robin order.
    ///
    /// # Errors
    /// `RkvError::Connection` when the pool is empty.
    pub fn read_handle(&self) -> RkvResult<Arc<Node>> {
        let len = self.replicas.len();
        match len {
            0 => Err(RkvError::connection(
                "replicas",
                "no replica connections available",
            )),
            1 => Ok(Arc::clone(&self.replicas[0])),
            _ => {
                // The closure always returns Some, so both arms carry the previous value.
                let idx = match self
                    .cursor
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| Some((cur + 1) % len))
                {
                    Ok(prev) | Err(prev) => prev,
                };
                Ok(Arc::clone(&self.replicas[idx % len]))
            }
        }
    }

    /// The primary handle.
    ///
    /// # Errors
    /// `RkvError::Connection` when the primary could not be established.
    pub fn write_handle(&self) -> RkvResult<Arc<Node>> {
        self.primary
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| RkvError::connection("primary", "no primary connection established"))
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn replicas(&self) -> &[Arc<Node>] {
        &self.replicas
    }
}

/// Configures how a `Controller` reaches its endpoints.
pub struct ControllerBuilder {
    config: ControllerConfig,
    connector: Arc<dyn Connector>,
    cancel: Option<Arc<AtomicBool>>,
}

impl ControllerBuilder {
    pub fn new(config: ControllerConfig) -> Self {
        ControllerBuilder {
            config,
            connector: Arc::new(TcpConnector),
            cancel: None,
        }
    }

    /// Replaces the TCP connector.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Flag checked between connection attempts; once set, remaining
    /// endpoints are treated as unreachable.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Connects the primary and every replica, each with its own backoff.
    ///
    /// # Errors
    /// `RkvError::Authentication` when the primary rejects its credentials.
    /// Every other failure is absorbed: a missing primary makes writes fail,
    /// a failed replica is left out of the pool.
    pub fn build(self) -> RkvResult<Controller> {
        let primary = match self.open(&self.config.primary) {
            Ok(node) => Some(node),
            Err(err @ RkvError::Authentication { .. }) => {
                error!(endpoint = %self.config.primary.label(), error = %err, "primary rejected credentials");
                return Err(err);
            }
            Err(err) => {
                error!(
                    endpoint = %self.config.primary.label(),
                    error = %err,
                    "primary unreachable, writes will fail"
                );
                None
            }
        };

        let mut replicas = Vec::with_capacity(self.config.replicas.len());
        for endpoint in &self.config.replicas {
            match self.open(endpoint) {
                Ok(node) => replicas.push(node),
                Err(err) => {
                    warn!(endpoint = %endpoint.label(), error = %err, "replica excluded from pool");
                }
            }
        }
        if replicas.is_empty() {
            warn!(
                configured = self.config.replicas.len(),
                "no replica connections available, reads will fail"
            );
        }

        Ok(Controller::from_nodes(primary, replicas))
    }

    fn open(&self, endpoint: &EndpointConfig) -> RkvResult<Node> {
        let label = endpoint.label();
        let (store, attempt) = with_backoff(
            &label,
            &self.config.retry,
            self.cancel.as_deref(),
            || {
                let store = self.connector.connect(endpoint, &self.config.tuning)?;
                store.ping()?;
                Ok(store)
            },
        )?;
        info!(endpoint = %label, addr = %endpoint.addr(), attempt, "connected");
        Ok(Node::new(label, store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkv_common::ScanPage;

    struct Named(&'static str);

    impl KvStore for Named {
        fn ping(&self) -> RkvResult<()> {
            Ok(())
        }

        fn get(&self, _key: &[u8]) -> RkvResult<Option<Vec<u8>>> {
            Ok(Some(self.0.as_bytes().to_vec()))
        }

        fn set(&self, _key: &[u8], _value: &[u8]) -> RkvResult<()> {
            Ok(())
        }

        fn set_ex(&self, _key: &[u8], _value: &[u8], _ttl_seconds: u64) -> RkvResult<()> {
            Ok(())
        }

        fn scan_page(&self, _cursor: u64, _pattern: &[u8], _count: usize) -> RkvResult<ScanPage> {
            Ok(ScanPage::default())
        }
    }

    fn node(label: &'static str) -> Node {
        Node::new(label, Arc::new(Named(label)))
    }

    fn labels(controller: &Controller, calls: usize) -> Vec<String> {
        (0..calls)
            .map(|_| controller.read_handle().unwrap().label().to_string())
            .collect()
    }

    #[test]
    fn round_robin_wraps_after_last_replica() {
        let controller = Controller::from_nodes(None, vec![node("R0"), node("R1"), node("R2")]);
        assert_eq!(labels(&controller, 4), ["R0", "R1", "R2", "R0"]);
    }

    #[test]
    fn two_replicas_alternate() {
        let controller = Controller::from_nodes(None, vec![node("R0"), node("R1")]);
        assert_eq!(labels(&controller, 5), ["R0", "R1", "R0", "R1", "R0"]);
    }

    #[test]
    fn single_replica_never_moves_cursor() {
        let controller = Controller::from_nodes(None, vec![node("R0")]);
        assert_eq!(labels(&controller, 3), ["R0", "R0", "R0"]);
        assert_eq!(controller.cursor.load(Ordering::Acquire), 0);
    }

    #[test]
    fn empty_pool_fails_reads() {
        let controller = Controller::from_nodes(Some(node("P")), Vec::new());
        let err = controller.read_handle().unwrap_err();
        assert!(matches!(err, RkvError::Connection { ref message, .. } if message.contains("no replica")));
        assert_eq!(controller.write_handle().unwrap().label(), "P");
    }

    #[test]
    fn missing_primary_fails_writes() {
        let controller = Controller::from_nodes(None, vec![node("R0")]);
        assert!(!controller.has_primary());
        assert!(matches!(controller.write_handle(), Err(RkvError::Connection { .. })));
    }

    #[test]
    fn node_derefs_to_store() {
        let node = node("R0");
        assert_eq!(node.get(b"any").unwrap(), Some(b"R0".to_vec()));
    }

    #[test]
    fn concurrent_reads_stay_balanced() {
        let controller = Arc::new(Controller::from_nodes(
            None,
            vec![node("R0"), node("R1"), node("R2")],
        ));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let controller = Arc::clone(&controller);
                std::thread::spawn(move || labels(&controller, 300))
            })
            .collect();

        let mut counts = [0usize; 3];
        for handle in handles {
            for label in handle.join().unwrap() {
                let idx: usize = label[1..].parse().unwrap();
                counts[idx] += 1;
            }
        }
        assert_eq!(counts, [300, 300, 300]);
        assert!(controller.cursor.load(Ordering::Acquire) < 3);
    }
}
