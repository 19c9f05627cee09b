use crate::config::{BrokerAddress, TransportConfig};
use crate::error::PublishError;
use log::{debug, warn};
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration, Transport};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const KEEP_ALIVE: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 10;

/// Delivers one serialized report.
pub trait Publisher {
    fn publish(&self, body: Vec<u8>) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// Publishes each report over a fresh MQTT session.
///
/// Brokers are tried in the configured order and the first one that
/// acknowledges the message wins.
pub struct MqttPublisher {
    config: TransportConfig,
}

impl MqttPublisher {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    async fn publish_to(&self, broker: &BrokerAddress, body: Vec<u8>) -> Result<(), PublishError> {
        let mut options = MqttOptions::new(&self.config.client_id, &broker.host, broker.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        if broker.tls {
            options.set_transport(self.tls_transport()?);
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        client
            .publish(&self.config.topic, QoS::AtLeastOnce, false, body)
            .await?;

        loop {
            match eventloop.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    debug!("Connected to {}:{} ({:?})", broker.host, broker.port, ack.code);
                }
                Event::Incoming(Packet::PubAck(_)) => break,
                _ => {}
            }
        }

        client.disconnect().await?;
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        Ok(())
    }

    fn tls_transport(&self) -> Result<Transport, PublishError> {
        if !self.config.tls_verify {
            let config = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
                .with_no_client_auth();
            return Ok(Transport::tls_with_config(TlsConfiguration::Rustls(Arc::new(config))));
        }

        match &self.config.tls_ca_file {
            Some(path) => {
                let ca = std::fs::read(path).map_err(|source| PublishError::CaFile {
                    path: path.clone(),
                    source,
                })?;
                Ok(Transport::tls_with_config(TlsConfiguration::Simple {
                    ca,
                    alpn: None,
                    client_auth: None,
                }))
            }
            None => Ok(Transport::tls_with_default_config()),
        }
    }
}

impl Publisher for MqttPublisher {
    async fn publish(&self, body: Vec<u8>) -> Result<(), PublishError> {
        let mut last_error = PublishError::NoBroker;

        for broker in &self.config.brokers {
            let attempt = timeout(self.config.publish_timeout, self.publish_to(broker, body.clone()));
            match attempt.await {
                Ok(Ok(())) => {
                    debug!("Published {} bytes to {} on {}:{}", body.len(), self.config.topic, broker.host, broker.port);
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!("Broker {}:{} rejected report: {}", broker.host, broker.port, e);
                    last_error = e;
                }
                Err(_) => {
                    warn!("Broker {}:{} timed out", broker.host, broker.port);
                    last_error = PublishError::Timeout(self.config.publish_timeout);
                }
            }
        }

        Err(last_error)
    }
}

/// Certificate verifier for `--tls-insecure`: any broker certificate is accepted.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::net::TcpListener;

    fn config(brokers: Vec<BrokerAddress>) -> TransportConfig {
        TransportConfig {
            brokers,
            client_id: "push-mtr-test".to_string(),
            topic: "/metrics/mtr".to_string(),
            tls_ca_file: None,
            tls_verify: true,
            publish_timeout: Duration::from_millis(500),
        }
    }

    fn broker(port: u16, tls: bool) -> BrokerAddress {
        BrokerAddress {
            host: "127.0.0.1".to_string(),
            port,
            tls,
        }
    }

    #[tokio::test]
    async fn test_no_brokers() {
        let publisher = MqttPublisher::new(config(Vec::new()));
        let err = publisher.publish(b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, PublishError::NoBroker));
    }

    #[tokio::test]
    async fn test_refused_connection_is_an_error() {
        // bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap().port();
        let publisher = MqttPublisher::new(config(vec![broker(port, false)]));
        let err = publisher.publish(b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, PublishError::Connection(_)));
    }

    #[tokio::test]
    async fn test_silent_broker_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accepting = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let publisher = MqttPublisher::new(config(vec![broker(port, false)]));
        let err = publisher.publish(b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, PublishError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_ca_file() {
        let mut config = config(vec![broker(8883, true)]);
        config.tls_ca_file = Some(PathBuf::from("/nonexistent/ca.pem"));
        let publisher = MqttPublisher::new(config);
        let err = publisher.publish(b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, PublishError::CaFile { .. }));
    }
}
