//! Opens a `KvStore` handle for one configured endpoint.

use std::sync::Arc;

use rkv_client::{ClientConfig, StoreClient};
use rkv_common::{ClientTuning, EndpointConfig, KvStore, RkvResult};

/// Factory for endpoint handles, swapped out in tests for in-process stores.
///
/// `connect` may be lazy; the controller pings the returned handle before
/// accepting it.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &EndpointConfig, tuning: &ClientTuning) -> RkvResult<Arc<dyn KvStore>>;
}

/// Connects over TCP with the pooled RESP client.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, endpoint: &EndpointConfig, tuning: &ClientTuning) -> RkvResult<Arc<dyn KvStore>> {
        let label = endpoint.label();
        let client = StoreClient::with_config(ClientConfig::from_endpoint(endpoint, tuning))
            .map_err(|err| err.into_rkv(&label))?
            .labeled(label);
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn tcp_connector_is_lazy_and_labels_errors() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let endpoint = EndpointConfig::new(addr.ip().to_string(), addr.port()).with_name("replica-3");
        let store = TcpConnector.connect(&endpoint, &ClientTuning::default()).unwrap();
        match store.ping() {
            Err(rkv_common::RkvError::Connection { endpoint, .. }) => assert_eq!(endpoint, "replica-3"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
